use clap::Parser;
use color_eyre::eyre::Result;
use divebar_client::{
    client,
    config::{
        AppConfig,
        Args,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let config = AppConfig::from_args(Args::parse())?;
    client::init_tracing(&config.log_dir)?;
    tracing::info!(?config, "starting divebar client");
    client::run_app(config).await
}
