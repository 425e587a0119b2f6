use clap::Parser;
use color_eyre::eyre::{
    Result,
    eyre,
};
use std::{
    path::PathBuf,
    time::Duration,
};

use crate::deployment::DEFAULT_DEPLOYMENTS_PATH;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_WALLET_WATCH_MS: u64 = 1_000;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Terminal client for the DiveBar betting game", long_about = None)]
pub struct Args {
    /// JSON-RPC endpoint of the wallet that holds your account. Without it
    /// the client runs read-only and asks you to install a wallet.
    #[arg(long, env = "DIVEBAR_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Deployment records written by the contract deploy tooling.
    #[arg(long, default_value = DEFAULT_DEPLOYMENTS_PATH)]
    pub deployments: String,

    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// How often the wallet is asked for its account and chain.
    #[arg(long, default_value_t = DEFAULT_WALLET_WATCH_MS)]
    pub wallet_watch_ms: u64,

    #[arg(long, default_value = ".logs")]
    pub log_dir: String,
}

/// Validated runtime settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub rpc_url: Option<String>,
    pub deployments_path: PathBuf,
    pub poll_interval: Duration,
    pub wallet_watch_interval: Duration,
    pub log_dir: PathBuf,
}

impl AppConfig {
    pub fn from_args(args: Args) -> Result<Self> {
        if args.poll_interval_ms == 0 {
            return Err(eyre!("--poll-interval-ms must be greater than zero"));
        }
        if args.wallet_watch_ms == 0 {
            return Err(eyre!("--wallet-watch-ms must be greater than zero"));
        }
        let rpc_url = args
            .rpc_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        Ok(Self {
            rpc_url,
            deployments_path: expand_path(&args.deployments),
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            wallet_watch_interval: Duration::from_millis(args.wallet_watch_ms),
            log_dir: expand_path(&args.log_dir),
        })
    }
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}
