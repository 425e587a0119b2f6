//! Background refresh of on-chain game state.
//!
//! At most one worker runs at a time. Restarting the supervisor aborts
//! the previous worker before the new one is spawned, and every result a
//! worker produces is tagged with the token it was started for.

use crate::{
    contract::DiveBar,
    provider::WalletProvider,
    state::{
        Event,
        SyncToken,
    },
};
use alloy_primitives::Address;
use chrono::Utc;
use std::time::Duration;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time,
};
use tracing::{
    debug,
    info,
    warn,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PollCommand {
    FetchNow,
    FetchAccount(Address),
}

#[derive(Debug)]
struct Poller {
    token: SyncToken,
    commands: mpsc::UnboundedSender<PollCommand>,
    handle: JoinHandle<()>,
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug)]
pub struct PollSupervisor<P> {
    provider: P,
    interval: Duration,
    events: mpsc::UnboundedSender<Event>,
    current: Option<Poller>,
}

impl<P: WalletProvider> PollSupervisor<P> {
    pub fn new(provider: P, interval: Duration, events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            provider,
            interval,
            events,
            current: None,
        }
    }

    pub fn active_token(&self) -> Option<SyncToken> {
        self.current.as_ref().map(|poller| poller.token)
    }

    pub fn is_running(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|poller| !poller.handle.is_finished())
    }

    /// Stops the current worker, then starts one for `token`.
    pub fn restart(&mut self, token: SyncToken) {
        self.stop();
        info!(chain_id = token.chain_id, contract = %token.contract, "starting game poller");
        let contract = DiveBar::new(self.provider.clone(), token.contract);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(poll_worker(
            self.interval,
            contract,
            token,
            command_rx,
            self.events.clone(),
        ));
        self.current = Some(Poller {
            token,
            commands,
            handle,
        });
    }

    pub fn stop(&mut self) {
        if let Some(poller) = self.current.take() {
            debug!(token = ?poller.token, "stopping game poller");
        }
    }

    /// Fetches the game right away instead of waiting for the next tick.
    /// Ignored unless `token` is the one currently being polled.
    pub fn fetch_now(&self, token: SyncToken) {
        match &self.current {
            Some(poller) if poller.token == token => {
                let _ = poller.commands.send(PollCommand::FetchNow);
            }
            _ => debug!(?token, "game refresh for inactive token ignored"),
        }
    }

    /// Queues a position and balance refresh. Ignored unless `token` is
    /// the one currently being polled.
    pub fn fetch_account(&self, token: SyncToken, account: Address) {
        match &self.current {
            Some(poller) if poller.token == token => {
                let _ = poller.commands.send(PollCommand::FetchAccount(account));
            }
            _ => debug!(?token, %account, "account fetch for inactive token ignored"),
        }
    }
}

async fn poll_worker<P: WalletProvider>(
    poll_interval: Duration,
    contract: DiveBar<P>,
    token: SyncToken,
    mut command_rx: mpsc::UnboundedReceiver<PollCommand>,
    events: mpsc::UnboundedSender<Event>,
) {
    async fn fetch_game<P: WalletProvider>(
        contract: &DiveBar<P>,
        token: SyncToken,
        events: &mpsc::UnboundedSender<Event>,
    ) -> bool {
        let result = contract.game_info().await.map_err(|err| {
            warn!(?err, "game info fetch failed");
            err.to_string()
        });
        events
            .send(Event::GameFetched {
                token,
                at: Utc::now(),
                result,
            })
            .is_ok()
    }

    async fn fetch_account<P: WalletProvider>(
        contract: &DiveBar<P>,
        token: SyncToken,
        account: Address,
        events: &mpsc::UnboundedSender<Event>,
    ) -> bool {
        // position and balance are independent; one failing leaves the other
        let position = contract.player(account).await.map_err(|err| {
            debug!(?err, %account, "player fetch failed");
            err.to_string()
        });
        let balance = contract.user_balance(account).await.map_err(|err| {
            warn!(?err, %account, "balance fetch failed");
            err.to_string()
        });
        events
            .send(Event::PositionFetched {
                token,
                account,
                result: position,
            })
            .is_ok()
            && events
                .send(Event::BalanceFetched {
                    token,
                    account,
                    result: balance,
                })
                .is_ok()
    }

    let mut ticker = time::interval(poll_interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        let open = tokio::select! {
            _ = ticker.tick() => fetch_game(&contract, token, &events).await,
            cmd = command_rx.recv() => match cmd {
                Some(PollCommand::FetchNow) => fetch_game(&contract, token, &events).await,
                Some(PollCommand::FetchAccount(account)) => {
                    fetch_account(&contract, token, account, &events).await
                }
                None => break,
            },
        };
        if !open {
            debug!("event receiver dropped; poller exiting");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::{
        contract::GameState,
        test_helpers::FakeWallet,
    };
    use alloy_primitives::{
        U256,
        address,
    };

    const CONTRACT: Address = address!("00000000000000000000000000000000000000c0");

    fn token(generation: u64) -> SyncToken {
        SyncToken {
            generation,
            chain_id: 42,
            contract: CONTRACT,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn restart__polls_immediately_then_on_interval() {
        // given
        let wallet = FakeWallet::new(42);
        wallet.set_game(GameState {
            id: U256::from(1u64),
            ..GameState::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut supervisor = PollSupervisor::new(wallet.clone(), Duration::from_secs(2), tx);

        // when
        supervisor.restart(token(1));

        // then
        let first = rx.recv().await.unwrap();
        assert!(matches!(first, Event::GameFetched { token: t, result: Ok(_), .. } if t == token(1)));
        time::advance(Duration::from_secs(2)).await;
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, Event::GameFetched { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn restart__replaces_previous_worker() {
        let wallet = FakeWallet::new(42);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut supervisor = PollSupervisor::new(wallet, Duration::from_secs(2), tx);

        supervisor.restart(token(1));
        supervisor.restart(token(2));
        assert_eq!(supervisor.active_token(), Some(token(2)));

        time::advance(Duration::from_secs(10)).await;
        while let Ok(event) = rx.try_recv() {
            if let Event::GameFetched { token: t, .. } = event {
                assert_eq!(t, token(2));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_account__reports_position_and_balance() {
        let wallet = FakeWallet::new(42);
        let alice = address!("00000000000000000000000000000000000000a1");
        wallet.set_balance(alice, U256::from(7u64));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut supervisor = PollSupervisor::new(wallet, Duration::from_secs(60), tx);
        supervisor.restart(token(1));
        let _initial = rx.recv().await.unwrap();

        supervisor.fetch_account(token(1), alice);

        let position = rx.recv().await.unwrap();
        assert!(matches!(position, Event::PositionFetched { account, .. } if account == alice));
        let balance = rx.recv().await.unwrap();
        assert!(matches!(
            balance,
            Event::BalanceFetched { result: Ok(b), .. } if b == U256::from(7u64)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_account__ignores_inactive_token() {
        let wallet = FakeWallet::new(42);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut supervisor = PollSupervisor::new(wallet, Duration::from_secs(60), tx);
        supervisor.restart(token(2));
        let _initial = rx.recv().await.unwrap();

        supervisor.fetch_account(token(1), address!("00000000000000000000000000000000000000a1"));
        time::advance(Duration::from_secs(1)).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_now__reads_game_before_next_tick() {
        let wallet = FakeWallet::new(42);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut supervisor = PollSupervisor::new(wallet, Duration::from_secs(60), tx);
        supervisor.restart(token(1));
        let _initial = rx.recv().await.unwrap();

        supervisor.fetch_now(token(2));
        supervisor.fetch_now(token(1));

        let refreshed = rx.recv().await.unwrap();
        assert!(matches!(refreshed, Event::GameFetched { token: t, .. } if t == token(1)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stop__ends_polling() {
        let wallet = FakeWallet::new(42);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut supervisor = PollSupervisor::new(wallet.clone(), Duration::from_secs(2), tx);
        supervisor.restart(token(1));
        let _initial = rx.recv().await.unwrap();

        supervisor.stop();
        let calls = wallet.call_count();
        time::advance(Duration::from_secs(20)).await;

        assert!(!supervisor.is_running());
        assert_eq!(wallet.call_count(), calls);
    }
}
