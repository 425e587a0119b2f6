use alloy_primitives::U256;
use thiserror::Error;

use crate::format::format_amount;

/// Failures talking to the wallet provider.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("no wallet provider found")]
    ProviderMissing,
    #[error("wallet returned no authorized accounts")]
    NoAccounts,
    #[error("provider request `{method}` failed: {message}")]
    Request {
        method: &'static str,
        message: String,
    },
    #[error("provider rejected `{method}` (code {code}): {message}")]
    Rpc {
        method: &'static str,
        code: i64,
        message: String,
    },
    #[error("provider returned no result for `{method}`")]
    EmptyResult { method: &'static str },
}

/// Failures of a single contract read or write.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error("could not decode `{call}` response: {source}")]
    Decode {
        call: &'static str,
        #[source]
        source: alloy_sol_types::Error,
    },
    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },
}

/// Reasons a bet is blocked before any network call.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum BetRejection {
    #[error("Please enter a bet amount!")]
    ZeroAmount,
    #[error("`{input}` is not a valid amount")]
    Unparsable { input: String },
    #[error(
        "Bet amount must be greater than or equal to the minimum deposit ({})",
        format_amount(.minimum.clone())
    )]
    BelowMinimum { amount: U256, minimum: U256 },
    #[error("Bet cannot be placed after the game has ended")]
    GameEnded,
    #[error("You may only bet once per game")]
    AlreadyBet,
    #[error("Game state has not been loaded yet")]
    NoGame,
}
