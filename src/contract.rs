use crate::{
    error::ContractError,
    provider::{
        CallRequest,
        TransactionReceipt,
        TransactionRequest,
        WalletProvider,
        wait_for_receipt,
    },
};
use alloy_primitives::{
    Address,
    B256,
    U256,
};
use alloy_sol_types::{
    SolCall,
    sol,
};
use std::time::Duration;
use tracing::{
    debug,
    info,
};

pub mod abi {
    use super::sol;

    sol! {
        #[derive(Debug, PartialEq, Eq)]
        struct Average {
            uint256 value;
        }

        #[derive(Debug, PartialEq, Eq)]
        struct Game {
            uint256 id;
            uint256 playersSize;
            uint256 pot;
            Average avg;
            uint256 timeLimit;
            uint256 minDeposit;
            uint256 createdAt;
            uint256 endingAt;
        }

        #[derive(Debug, PartialEq, Eq)]
        struct Player {
            uint256 bet;
            uint256 timestamp;
        }

        function getGameInfo() external view returns (Game memory game);
        function getPlayer(address player) external view returns (Player memory info);
        function getUserBalance(address user) external view returns (uint256 balance);
        function getPayout() external;
    }
}

/// Current round as last read from the contract. Amounts are in base
/// units, times in unix seconds.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GameState {
    pub id: U256,
    pub player_count: U256,
    pub pot: U256,
    pub average: U256,
    pub time_limit: U256,
    pub min_deposit: U256,
    pub created_at: U256,
    pub ending_at: U256,
}

impl From<abi::Game> for GameState {
    fn from(game: abi::Game) -> Self {
        GameState {
            id: game.id,
            player_count: game.playersSize,
            pot: game.pot,
            average: game.avg.value,
            time_limit: game.timeLimit,
            min_deposit: game.minDeposit,
            created_at: game.createdAt,
            ending_at: game.endingAt,
        }
    }
}

impl From<&GameState> for abi::Game {
    fn from(game: &GameState) -> Self {
        abi::Game {
            id: game.id,
            playersSize: game.player_count,
            pot: game.pot,
            avg: abi::Average {
                value: game.average,
            },
            timeLimit: game.time_limit,
            minDeposit: game.min_deposit,
            createdAt: game.created_at,
            endingAt: game.ending_at,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PlayerPosition {
    pub bet: U256,
    pub timestamp: U256,
}

impl PlayerPosition {
    pub fn has_bet(&self) -> bool {
        !self.bet.is_zero()
    }
}

impl From<abi::Player> for PlayerPosition {
    fn from(player: abi::Player) -> Self {
        PlayerPosition {
            bet: player.bet,
            timestamp: player.timestamp,
        }
    }
}

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Typed handle on one deployed DiveBar contract.
#[derive(Clone, Debug)]
pub struct DiveBar<P> {
    provider: P,
    address: Address,
    receipt_poll: Duration,
}

impl<P: WalletProvider> DiveBar<P> {
    pub fn new(provider: P, address: Address) -> Self {
        Self {
            provider,
            address,
            receipt_poll: RECEIPT_POLL_INTERVAL,
        }
    }

    pub fn with_receipt_poll(mut self, every: Duration) -> Self {
        self.receipt_poll = every;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    async fn read<C: SolCall>(&self, call: C) -> Result<C::Return, ContractError> {
        let data = self
            .provider
            .call(CallRequest {
                to: self.address,
                data: call.abi_encode().into(),
            })
            .await?;
        C::abi_decode_returns(&data, true).map_err(|source| ContractError::Decode {
            call: C::SIGNATURE,
            source,
        })
    }

    pub async fn game_info(&self) -> Result<GameState, ContractError> {
        let ret = self.read(abi::getGameInfoCall {}).await?;
        Ok(ret.game.into())
    }

    pub async fn player(&self, account: Address) -> Result<PlayerPosition, ContractError> {
        let ret = self.read(abi::getPlayerCall { player: account }).await?;
        Ok(ret.info.into())
    }

    pub async fn user_balance(&self, account: Address) -> Result<U256, ContractError> {
        let ret = self.read(abi::getUserBalanceCall { user: account }).await?;
        Ok(ret.balance)
    }

    /// Sends `value` base units to the contract, which records it as a bet.
    pub async fn deposit(
        &self,
        from: Address,
        value: U256,
    ) -> Result<TransactionReceipt, ContractError> {
        self.transact(TransactionRequest {
            from,
            to: self.address,
            value: Some(value),
            data: None,
        })
        .await
    }

    /// Claims everything owed to `from`. Reverts when nothing is owed.
    pub async fn claim_payout(
        &self,
        from: Address,
    ) -> Result<TransactionReceipt, ContractError> {
        self.transact(TransactionRequest {
            from,
            to: self.address,
            value: None,
            data: Some(abi::getPayoutCall {}.abi_encode().into()),
        })
        .await
    }

    async fn transact(
        &self,
        request: TransactionRequest,
    ) -> Result<TransactionReceipt, ContractError> {
        let tx_hash: B256 = self.provider.send_transaction(request).await?;
        debug!(%tx_hash, contract = %self.address, "transaction submitted");
        let receipt = wait_for_receipt(&self.provider, tx_hash, self.receipt_poll).await?;
        if !receipt.succeeded() {
            return Err(ContractError::Reverted {
                tx_hash: tx_hash.to_string(),
            });
        }
        info!(%tx_hash, "transaction confirmed");
        Ok(receipt)
    }
}
