//! Terminal client for the DiveBar betting game.
//!
//! The client reads game state from a deployed DiveBar contract through an
//! external wallet, keeps an immutable view snapshot in sync with it, and
//! sends bets and withdrawals back through the same wallet.

pub mod actions;
pub mod client;
pub mod config;
pub mod contract;
pub mod deployment;
pub mod error;
pub mod format;
pub mod network;
pub mod poller;
pub mod provider;
pub mod session;
pub mod state;
pub mod ui;

pub mod test_helpers;

pub use contract::{
    DiveBar,
    GameState,
    PlayerPosition,
};
pub use network::{
    ChainResolution,
    Network,
    NetworkConfig,
    NetworkTable,
};
pub use provider::{
    JsonRpcProvider,
    WalletProvider,
};
pub use state::{
    Event,
    SyncToken,
    ViewState,
};
