use crate::{
    actions::ActionSubmitter,
    config::AppConfig,
    contract::DiveBar,
    deployment::DeploymentBook,
    error::WalletError,
    network::NetworkTable,
    poller::PollSupervisor,
    provider::{
        JsonRpcProvider,
        WalletProvider,
    },
    session::{
        SessionManager,
        WalletEvent,
    },
    state::{
        Effect,
        Event,
        ViewState,
    },
    ui,
};
use alloy_primitives::Address;
use chrono::Utc;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::{
    path::Path,
    sync::OnceLock,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::{
        JoinHandle,
        JoinSet,
    },
    time,
};
use tracing::{
    debug,
    error,
    info,
    warn,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

const REDRAW_INTERVAL: Duration = Duration::from_millis(100);

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Sends logs to a daily rolling file so they never tear the terminal UI.
/// Filtering follows `RUST_LOG`, defaulting to `info`.
pub fn init_tracing(log_dir: &Path) -> Result<()> {
    let appender = rolling::daily(log_dir, "divebar.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|err| eyre!("tracing init failed: {err}"))?;
    let _ = LOG_GUARD.set(guard);
    Ok(())
}

/// Owns the view snapshot and runs the effects each transition asks for.
pub struct Controller<P: WalletProvider> {
    state: ViewState,
    networks: NetworkTable,
    session: SessionManager<P>,
    poller: Option<PollSupervisor<P>>,
    receipt_poll: Option<Duration>,
    tasks: JoinSet<()>,
    watcher: Option<JoinHandle<()>>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
}

impl<P: WalletProvider> Controller<P> {
    pub fn new(provider: Option<P>, networks: NetworkTable, poll_interval: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let poller = provider
            .clone()
            .map(|provider| PollSupervisor::new(provider, poll_interval, events_tx.clone()));
        Self {
            state: ViewState::new(provider.is_some()),
            networks,
            session: SessionManager::new(provider),
            poller,
            receipt_poll: None,
            tasks: JoinSet::new(),
            watcher: None,
            events_tx,
            events_rx,
        }
    }

    /// Overrides how often transaction receipts are polled.
    pub fn with_receipt_poll(mut self, every: Duration) -> Self {
        self.receipt_poll = Some(every);
        self
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn networks(&self) -> &NetworkTable {
        &self.networks
    }

    pub fn poller(&self) -> Option<&PollSupervisor<P>> {
        self.poller.as_ref()
    }

    /// Looks for an already authorized account in the background.
    pub fn restore(&mut self) {
        let session = self.session.clone();
        let events = self.events_tx.clone();
        self.tasks.spawn(async move {
            let event = match session.restore().await {
                Ok(restored) => Event::Restored(restored),
                Err(err) => Event::RestoreFailed(err.to_string()),
            };
            let _ = events.send(event);
        });
    }

    /// Starts watching the wallet for account and chain changes. Returns
    /// `None` when there is no wallet to watch.
    pub fn spawn_wallet_watcher(
        &mut self,
        every: Duration,
    ) -> Option<mpsc::UnboundedReceiver<WalletEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.session.spawn_watcher(every, tx)?;
        self.watcher = Some(handle);
        Some(rx)
    }

    pub async fn next_event(&mut self) -> Option<Event> {
        self.events_rx.recv().await
    }

    /// Receives and applies one internal event.
    pub async fn step(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => {
                self.dispatch(event);
                true
            }
            None => false,
        }
    }

    /// Steps until `done` holds for the current snapshot.
    pub async fn run_until(&mut self, done: impl Fn(&ViewState) -> bool) {
        while !done(&self.state) {
            if !self.step().await {
                break;
            }
        }
    }

    pub fn dispatch(&mut self, event: Event) {
        while self.tasks.try_join_next().is_some() {}
        let transition = self.state.apply(event, &self.networks);
        self.state = transition.state;
        for effect in transition.effects {
            self.run_effect(effect);
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        debug!(?effect, "running effect");
        match effect {
            Effect::StartPolling(token) => {
                if let Some(poller) = self.poller.as_mut() {
                    poller.restart(token);
                }
            }
            Effect::StopPolling => {
                if let Some(poller) = self.poller.as_mut() {
                    poller.stop();
                }
            }
            Effect::RefreshGame(token) => {
                if let Some(poller) = self.poller.as_ref() {
                    poller.fetch_now(token);
                }
            }
            Effect::FetchAccount { token, account } => {
                if let Some(poller) = self.poller.as_ref() {
                    poller.fetch_account(token, account);
                }
            }
            Effect::Connect => {
                let session = self.session.clone();
                let events = self.events_tx.clone();
                self.tasks.spawn(async move {
                    let event = match session.connect().await {
                        Ok(account) => Event::Connected(account),
                        Err(err) => {
                            warn!(?err, "connect failed");
                            Event::ConnectFailed {
                                missing_wallet: matches!(err, WalletError::ProviderMissing),
                                message: err.to_string(),
                            }
                        }
                    };
                    let _ = events.send(event);
                });
            }
            Effect::SubmitBet {
                token,
                account,
                bet,
            } => {
                let Some(submitter) = self.submitter(token.contract) else {
                    return;
                };
                let events = self.events_tx.clone();
                self.tasks.spawn(async move {
                    let event = match submitter.place_bet(account, bet).await {
                        Ok(_) => Event::BetConfirmed {
                            token,
                            account,
                            round: bet.round(),
                        },
                        Err(err) => {
                            error!(error = %err, "bet failed");
                            Event::BetFailed {
                                token,
                                message: err.to_string(),
                            }
                        }
                    };
                    let _ = events.send(event);
                });
            }
            Effect::SubmitWithdraw { token, account } => {
                let Some(submitter) = self.submitter(token.contract) else {
                    return;
                };
                let events = self.events_tx.clone();
                self.tasks.spawn(async move {
                    let event = match submitter.withdraw(account).await {
                        Ok(_) => Event::WithdrawConfirmed { token, account },
                        Err(err) => {
                            error!(error = %err, "withdraw failed");
                            Event::WithdrawFailed {
                                token,
                                message: err.to_string(),
                            }
                        }
                    };
                    let _ = events.send(event);
                });
            }
        }
    }

    fn submitter(&self, contract: Address) -> Option<ActionSubmitter<P>> {
        let provider = self.session.provider()?.clone();
        let mut contract = DiveBar::new(provider, contract);
        if let Some(every) = self.receipt_poll {
            contract = contract.with_receipt_poll(every);
        }
        Some(ActionSubmitter::new(contract))
    }

    /// Cancels polling, the wallet watcher and any in-flight requests.
    pub fn shutdown(&mut self) {
        if let Some(poller) = self.poller.as_mut() {
            poller.stop();
        }
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        self.tasks.abort_all();
    }
}

impl<P: WalletProvider> Drop for Controller<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let book = DeploymentBook::load(&config.deployments_path)?;
    let networks = book.network_table();
    for network in networks.deployed_networks() {
        info!(%network, "contract deployment known");
    }
    let provider = config
        .rpc_url
        .as_deref()
        .map(JsonRpcProvider::new)
        .transpose()
        .wrap_err("wallet provider setup failed")?;
    if let Some(provider) = &provider {
        info!(url = provider.url(), "using wallet provider");
    }

    let mut controller = Controller::new(provider, networks, config.poll_interval);
    let wallet_events = controller.spawn_wallet_watcher(config.wallet_watch_interval);
    controller.restore();

    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(&mut controller, &mut ui_state, &mut input_events, wallet_events).await;
    controller.shutdown();
    ui::terminal_exit()?;
    res
}

async fn next_wallet_event(
    wallet_events: &mut Option<mpsc::UnboundedReceiver<WalletEvent>>,
) -> Option<WalletEvent> {
    match wallet_events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn run_loop<P: WalletProvider>(
    controller: &mut Controller<P>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEvents,
    mut wallet_events: Option<mpsc::UnboundedReceiver<WalletEvent>>,
) -> Result<()> {
    let mut redraw = time::interval(REDRAW_INTERVAL);
    redraw.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            maybe_event = controller.next_event() => {
                let Some(event) = maybe_event else {
                    warn!("controller event channel closed");
                    break;
                };
                controller.dispatch(event);
            }
            maybe_wallet = next_wallet_event(&mut wallet_events) => {
                match maybe_wallet {
                    Some(event) => controller.dispatch(Event::Wallet(event)),
                    None => {
                        warn!("wallet watcher stopped");
                        wallet_events = None;
                    }
                }
            }
            _ = redraw.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                if let Some(ev) = ui::interpret_event(ui_state, event, controller.state()) {
                    match ev {
                        ui::UserEvent::Quit => break,
                        ui::UserEvent::Redraw => {}
                        ui::UserEvent::Connect => controller.dispatch(Event::ConnectRequested),
                        ui::UserEvent::PlaceBet(input) => controller.dispatch(Event::BetRequested {
                            input,
                            now: Utc::now(),
                        }),
                        ui::UserEvent::Withdraw => controller.dispatch(Event::WithdrawRequested),
                        ui::UserEvent::DismissAlert => controller.dispatch(Event::DismissAlert),
                    }
                }
            }
        }
        ui::draw(ui_state, controller.state(), Utc::now()).wrap_err("draw failed")?;
    }
    Ok(())
}
