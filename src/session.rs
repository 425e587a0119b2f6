use crate::{
    error::WalletError,
    provider::WalletProvider,
};
use alloy_primitives::Address;
use std::time::Duration;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time,
};
use tracing::{
    info,
    warn,
};

/// Who is connected, and to which chain. Never persisted.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Session {
    pub account: Option<Address>,
    pub chain_id: Option<u64>,
}

/// Notifications coming from the wallet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WalletEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
}

/// Owns the single wallet handle. Everything else works on clones handed
/// out by [`SessionManager::provider`].
#[derive(Clone, Debug)]
pub struct SessionManager<P> {
    provider: Option<P>,
}

impl<P: WalletProvider> SessionManager<P> {
    pub fn new(provider: Option<P>) -> Self {
        if provider.is_none() {
            warn!("no wallet provider configured");
        }
        Self { provider }
    }

    pub fn provider(&self) -> Option<&P> {
        self.provider.as_ref()
    }

    /// Picks up an already authorized account without prompting. A
    /// missing wallet yields an empty session.
    pub async fn restore(&self) -> Result<Session, WalletError> {
        let Some(provider) = self.provider.as_ref() else {
            info!("wallet provider not found; staying disconnected");
            return Ok(Session::default());
        };
        let accounts = provider.accounts().await?;
        let account = accounts.first().copied();
        match account {
            Some(account) => info!(%account, "found an authorized account"),
            None => info!("no authorized account found"),
        }
        let chain_id = provider.chain_id().await?;
        Ok(Session {
            account,
            chain_id: Some(chain_id),
        })
    }

    /// Explicit connect: the only path that asks the wallet for access.
    pub async fn connect(&self) -> Result<Address, WalletError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(WalletError::ProviderMissing)?;
        let accounts = provider.request_accounts().await?;
        let account = accounts.first().copied().ok_or(WalletError::NoAccounts)?;
        info!(%account, "connected");
        Ok(account)
    }

    /// Starts the wallet watcher, or nothing when no wallet is present.
    pub fn spawn_watcher(
        &self,
        every: Duration,
        events: mpsc::UnboundedSender<WalletEvent>,
    ) -> Option<JoinHandle<()>> {
        let provider = self.provider.clone()?;
        Some(tokio::spawn(watch_wallet(provider, every, events)))
    }
}

/// Polls the wallet and reports account or chain changes. The first
/// observation is always reported. Returns once `events` is closed.
pub async fn watch_wallet<P: WalletProvider>(
    provider: P,
    every: Duration,
    events: mpsc::UnboundedSender<WalletEvent>,
) {
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    let mut last_chain: Option<u64> = None;
    let mut last_accounts: Option<Vec<Address>> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = events.closed() => break,
        }

        match provider.chain_id().await {
            Ok(chain_id) if last_chain != Some(chain_id) => {
                last_chain = Some(chain_id);
                if events.send(WalletEvent::ChainChanged(chain_id)).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(err) => warn!(?err, "chain id query failed"),
        }

        match provider.accounts().await {
            Ok(accounts) if last_accounts.as_ref() != Some(&accounts) => {
                last_accounts = Some(accounts.clone());
                if events.send(WalletEvent::AccountsChanged(accounts)).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(err) => warn!(?err, "account query failed"),
        }
    }
}
