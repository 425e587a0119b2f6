//! View snapshot and the single update function every event goes through.
//!
//! [`ViewState::apply`] never mutates in place: it returns the next
//! snapshot plus the side effects the caller has to run. Every fetch
//! result carries the [`SyncToken`] it was started under; results whose
//! token no longer matches the snapshot are dropped.

use crate::{
    actions::{
        ValidatedBet,
        validate_bet,
    },
    contract::{
        GameState,
        PlayerPosition,
    },
    network::{
        ChainResolution,
        NetworkConfig,
        NetworkTable,
    },
    session::{
        Session,
        WalletEvent,
    },
};
use alloy_primitives::{
    Address,
    U256,
};
use chrono::{
    DateTime,
    Utc,
};
use tracing::{
    debug,
    info,
    warn,
};

const MAX_ERRORS: usize = 5;

pub const NO_WALLET_ALERT: &str = "No wallet found. Install or configure a wallet to play.";
pub const BET_FAILED_ALERT: &str = "There was an error placing your bet. Please try again later.";

/// Identity of the (network, contract) pair a fetch was started for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SyncToken {
    pub generation: u64,
    pub chain_id: u64,
    pub contract: Address,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PendingAction {
    Connect,
    Bet,
    Withdraw,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Standing {
    NoBet,
    Winner,
    Loser,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Restored(Session),
    RestoreFailed(String),
    Wallet(WalletEvent),
    ConnectRequested,
    Connected(Address),
    ConnectFailed { missing_wallet: bool, message: String },
    GameFetched {
        token: SyncToken,
        at: DateTime<Utc>,
        result: Result<GameState, String>,
    },
    PositionFetched {
        token: SyncToken,
        account: Address,
        result: Result<PlayerPosition, String>,
    },
    BalanceFetched {
        token: SyncToken,
        account: Address,
        result: Result<U256, String>,
    },
    BetRequested { input: String, now: DateTime<Utc> },
    BetConfirmed { token: SyncToken, account: Address, round: U256 },
    BetFailed { token: SyncToken, message: String },
    WithdrawRequested,
    WithdrawConfirmed { token: SyncToken, account: Address },
    WithdrawFailed { token: SyncToken, message: String },
    DismissAlert,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Effect {
    /// Replace any running poller with one for this token.
    StartPolling(SyncToken),
    StopPolling,
    /// Re-read the game without waiting for the next poll.
    RefreshGame(SyncToken),
    FetchAccount { token: SyncToken, account: Address },
    Connect,
    SubmitBet {
        token: SyncToken,
        account: Address,
        bet: ValidatedBet,
    },
    SubmitWithdraw { token: SyncToken, account: Address },
}

#[derive(Debug)]
pub struct Transition {
    pub state: ViewState,
    pub effects: Vec<Effect>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ViewState {
    pub generation: u64,
    pub wallet_present: bool,
    pub session: Session,
    pub chain: Option<ChainResolution>,
    pub game: Option<GameState>,
    pub position: Option<PlayerPosition>,
    pub claimable: Option<U256>,
    /// Round in which this client saw a bet confirmed.
    pub bet_round: Option<U256>,
    pub last_game_poll: Option<DateTime<Utc>>,
    pub poll_failures: u32,
    pub pending: Option<PendingAction>,
    pub alert: Option<String>,
    pub status: String,
    pub errors: Vec<String>,
}

impl ViewState {
    pub fn new(wallet_present: bool) -> Self {
        Self {
            generation: 0,
            wallet_present,
            session: Session::default(),
            chain: None,
            game: None,
            position: None,
            claimable: None,
            bet_round: None,
            last_game_poll: None,
            poll_failures: 0,
            pending: None,
            alert: None,
            status: String::from("Ready"),
            errors: Vec::new(),
        }
    }

    pub fn contract(&self) -> Option<&NetworkConfig> {
        self.chain.as_ref().and_then(ChainResolution::config)
    }

    /// Token for the current (network, contract) pair, if there is one.
    pub fn token(&self) -> Option<SyncToken> {
        let config = self.contract()?;
        Some(SyncToken {
            generation: self.generation,
            chain_id: config.network.chain_id(),
            contract: config.contract_address,
        })
    }

    pub fn native_token_symbol(&self) -> &'static str {
        self.contract()
            .map(NetworkConfig::native_token_symbol)
            .unwrap_or("")
    }

    pub fn player_has_bet(&self) -> bool {
        let bet_this_round = match (&self.game, self.bet_round) {
            (Some(game), Some(round)) => game.id == round,
            _ => false,
        };
        bet_this_round || self.position.is_some_and(|p| p.has_bet())
    }

    pub fn standing(&self) -> Standing {
        match (&self.position, &self.game) {
            (Some(position), Some(game)) if position.has_bet() => {
                if position.bet >= game.average {
                    Standing::Winner
                } else {
                    Standing::Loser
                }
            }
            _ => Standing::NoBet,
        }
    }

    /// Displayed data may be out of date: the latest game poll failed.
    pub fn is_stale(&self) -> bool {
        self.poll_failures > 0
    }

    pub fn apply(&self, event: Event, networks: &NetworkTable) -> Transition {
        let mut next = self.clone();
        let mut effects = Vec::new();
        match event {
            Event::Restored(session) => match session.chain_id {
                // the wallet watcher may have reported this chain already
                Some(chain_id) if self.session.chain_id != Some(chain_id) => {
                    next.session.account = session.account;
                    next.enter_chain(chain_id, networks, &mut effects);
                }
                _ => {
                    if session.account.is_some() {
                        next.switch_account(session.account, &mut effects);
                    }
                }
            },
            Event::RestoreFailed(message) => {
                next.push_error(format!("Wallet check failed: {message}"));
            }
            Event::Wallet(WalletEvent::ChainChanged(chain_id)) => {
                match self.session.chain_id {
                    Some(current) if current == chain_id => {}
                    Some(previous) => {
                        info!(previous, chain_id, "network changed; resetting view");
                        next = ViewState::new(self.wallet_present);
                        next.generation = self.generation;
                        next.session.account = self.session.account;
                        next.enter_chain(chain_id, networks, &mut effects);
                        next.status = String::from("Network changed");
                    }
                    None => next.enter_chain(chain_id, networks, &mut effects),
                }
            }
            Event::Wallet(WalletEvent::AccountsChanged(accounts)) => {
                next.switch_account(accounts.first().copied(), &mut effects);
            }
            Event::ConnectRequested => {
                if !self.wallet_present {
                    next.alert = Some(String::from(NO_WALLET_ALERT));
                } else if self.pending.is_none() {
                    next.pending = Some(PendingAction::Connect);
                    next.set_status("Waiting for wallet...");
                    effects.push(Effect::Connect);
                }
            }
            Event::Connected(account) => {
                if self.pending == Some(PendingAction::Connect) {
                    next.pending = None;
                }
                next.set_status(format!("Connected {account}"));
                next.switch_account(Some(account), &mut effects);
            }
            Event::ConnectFailed {
                missing_wallet,
                message,
            } => {
                if self.pending == Some(PendingAction::Connect) {
                    next.pending = None;
                }
                if missing_wallet {
                    next.alert = Some(String::from(NO_WALLET_ALERT));
                } else {
                    next.push_error(format!("Connect failed: {message}"));
                }
            }
            Event::GameFetched { token, at, result } => {
                if self.token() != Some(token) {
                    debug!(?token, "dropping stale game state");
                    return Transition {
                        state: next,
                        effects,
                    };
                }
                match result {
                    Ok(game) => {
                        let new_round = self
                            .game
                            .as_ref()
                            .is_some_and(|previous| previous.id != game.id);
                        next.game = Some(game);
                        next.last_game_poll = Some(at);
                        next.poll_failures = 0;
                        if new_round {
                            next.position = None;
                            if let Some(account) = self.session.account {
                                effects.push(Effect::FetchAccount { token, account });
                            }
                        }
                    }
                    Err(message) => {
                        warn!(%message, "game state fetch failed");
                        next.poll_failures = self.poll_failures.saturating_add(1);
                    }
                }
            }
            Event::PositionFetched {
                token,
                account,
                result,
            } => {
                if !self.matches_account(token, account) {
                    debug!(?token, %account, "dropping stale player position");
                } else {
                    match result {
                        Ok(position) => next.position = Some(position),
                        Err(message) => debug!(%message, "player is not in the game"),
                    }
                }
            }
            Event::BalanceFetched {
                token,
                account,
                result,
            } => {
                if !self.matches_account(token, account) {
                    debug!(?token, %account, "dropping stale balance");
                } else {
                    match result {
                        Ok(balance) => next.claimable = Some(balance),
                        Err(message) => warn!(%message, "balance fetch failed"),
                    }
                }
            }
            Event::BetRequested { input, now } => next.request_bet(&input, now, &mut effects),
            Event::BetConfirmed {
                token,
                account,
                round,
            } => {
                next.clear_pending(PendingAction::Bet);
                if self.matches_account(token, account) {
                    next.bet_round = Some(round);
                    next.set_status("Bet placed");
                    effects.push(Effect::RefreshGame(token));
                    effects.push(Effect::FetchAccount { token, account });
                }
            }
            Event::BetFailed { token, message } => {
                next.clear_pending(PendingAction::Bet);
                if self.token() == Some(token) {
                    next.alert = Some(String::from(BET_FAILED_ALERT));
                    next.push_error(format!("Bet failed: {message}"));
                }
            }
            Event::WithdrawRequested => next.request_withdraw(&mut effects),
            Event::WithdrawConfirmed { token, account } => {
                next.clear_pending(PendingAction::Withdraw);
                if self.matches_account(token, account) {
                    next.set_status("Winnings withdrawn");
                    effects.push(Effect::RefreshGame(token));
                    effects.push(Effect::FetchAccount { token, account });
                }
            }
            Event::WithdrawFailed { token, message } => {
                next.clear_pending(PendingAction::Withdraw);
                if self.token() == Some(token) {
                    next.push_error(format!("Withdraw failed: {message}"));
                }
            }
            Event::DismissAlert => next.alert = None,
        }
        Transition {
            state: next,
            effects,
        }
    }

    fn enter_chain(
        &mut self,
        chain_id: u64,
        networks: &NetworkTable,
        effects: &mut Vec<Effect>,
    ) {
        self.generation = self.generation.wrapping_add(1);
        self.session.chain_id = Some(chain_id);
        let resolution = networks.resolve(chain_id);
        if resolution.config().is_none() {
            warn!(chain_id, "network not supported");
        }
        self.chain = Some(resolution);
        self.game = None;
        self.position = None;
        self.claimable = None;
        self.bet_round = None;
        self.last_game_poll = None;
        self.poll_failures = 0;
        effects.push(Effect::StopPolling);
        if let Some(token) = self.token() {
            effects.push(Effect::StartPolling(token));
            if let Some(account) = self.session.account {
                effects.push(Effect::FetchAccount { token, account });
            }
        }
    }

    fn switch_account(&mut self, account: Option<Address>, effects: &mut Vec<Effect>) {
        if self.session.account == account {
            return;
        }
        self.session.account = account;
        self.position = None;
        self.claimable = None;
        self.bet_round = None;
        if let (Some(token), Some(account)) = (self.token(), account) {
            effects.push(Effect::FetchAccount { token, account });
        }
    }

    fn request_bet(&mut self, input: &str, now: DateTime<Utc>, effects: &mut Vec<Effect>) {
        if self.pending.is_some() {
            return;
        }
        let Some(account) = self.session.account else {
            self.alert = Some(String::from("Connect a wallet first"));
            return;
        };
        let Some(token) = self.token() else {
            self.alert = Some(String::from("Switch to a supported network to play"));
            return;
        };
        match validate_bet(input, self.game.as_ref(), self.player_has_bet(), now) {
            Ok(bet) => {
                self.pending = Some(PendingAction::Bet);
                self.set_status("Placing bet...");
                effects.push(Effect::SubmitBet {
                    token,
                    account,
                    bet,
                });
            }
            Err(rejection) => {
                info!(%rejection, "bet blocked locally");
                self.alert = Some(rejection.to_string());
            }
        }
    }

    fn request_withdraw(&mut self, effects: &mut Vec<Effect>) {
        if self.pending.is_some() {
            return;
        }
        let (Some(token), Some(account)) = (self.token(), self.session.account) else {
            debug!("withdraw ignored without contract or account");
            return;
        };
        self.pending = Some(PendingAction::Withdraw);
        self.set_status("Withdrawing...");
        effects.push(Effect::SubmitWithdraw { token, account });
    }

    fn matches_account(&self, token: SyncToken, account: Address) -> bool {
        self.token() == Some(token) && self.session.account == Some(account)
    }

    fn clear_pending(&mut self, action: PendingAction) {
        if self.pending == Some(action) {
            self.pending = None;
        }
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
    }

    fn push_error(&mut self, message: String) {
        warn!("{}", message);
        self.errors.push(message);
        if self.errors.len() > MAX_ERRORS {
            let drain = self.errors.len() - MAX_ERRORS;
            self.errors.drain(0..drain);
        }
    }
}
