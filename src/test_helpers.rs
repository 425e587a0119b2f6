//! In-memory wallet and DiveBar contract used by unit and integration
//! tests. Transactions are mined instantly; reverts show up as receipts
//! with status `0x0`, the way a node reports them.

use crate::{
    contract::{
        GameState,
        PlayerPosition,
        abi,
    },
    error::WalletError,
    provider::{
        CallRequest,
        TransactionReceipt,
        TransactionRequest,
        WalletProvider,
    },
};
use alloy_primitives::{
    Address,
    B256,
    Bytes,
    U64,
    U256,
};
use alloy_sol_types::SolCall;
use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    time::Duration,
};
use tokio::time;

/// Wallet error code for a request the user declined.
pub const USER_REJECTED: i64 = 4001;

#[derive(Debug, Default)]
struct FakeChain {
    chain_id: u64,
    accounts: Vec<Address>,
    authorized: bool,
    deny_connect: bool,
    gas_price: U256,
    now: u64,
    game: GameState,
    players: HashMap<Address, PlayerPosition>,
    balances: HashMap<Address, U256>,
    transactions: Vec<TransactionRequest>,
    receipts: HashMap<B256, TransactionReceipt>,
    fail_reads: bool,
    reject_transactions: bool,
    calls: usize,
}

/// Shared handle; clones see the same chain.
#[derive(Clone, Debug, Default)]
pub struct FakeWallet {
    chain: Arc<Mutex<FakeChain>>,
}

impl FakeWallet {
    pub fn new(chain_id: u64) -> Self {
        let wallet = Self::default();
        {
            let mut chain = wallet.chain();
            chain.chain_id = chain_id;
            chain.gas_price = U256::from(1_000_000_000u64);
        }
        wallet
    }

    /// Wallet holding `account`, already authorized for this client.
    pub fn with_account(chain_id: u64, account: Address) -> Self {
        let wallet = Self::new(chain_id);
        {
            let mut chain = wallet.chain();
            chain.accounts = vec![account];
            chain.authorized = true;
        }
        wallet
    }

    fn chain(&self) -> MutexGuard<'_, FakeChain> {
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_accounts(&self, accounts: Vec<Address>) {
        self.chain().accounts = accounts;
    }

    pub fn set_authorized(&self, authorized: bool) {
        self.chain().authorized = authorized;
    }

    pub fn deny_connect(&self, deny: bool) {
        self.chain().deny_connect = deny;
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.chain().chain_id = chain_id;
    }

    /// Block time, in unix seconds, the contract checks deadlines against.
    pub fn set_now(&self, unix_seconds: u64) {
        self.chain().now = unix_seconds;
    }

    pub fn set_game(&self, game: GameState) {
        self.chain().game = game;
    }

    pub fn game(&self) -> GameState {
        self.chain().game.clone()
    }

    pub fn set_player(&self, account: Address, position: PlayerPosition) {
        self.chain().players.insert(account, position);
    }

    pub fn set_balance(&self, account: Address, balance: U256) {
        self.chain().balances.insert(account, balance);
    }

    pub fn balance(&self, account: Address) -> U256 {
        self.chain()
            .balances
            .get(&account)
            .copied()
            .unwrap_or_default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.chain().fail_reads = fail;
    }

    pub fn reject_transactions(&self, reject: bool) {
        self.chain().reject_transactions = reject;
    }

    /// Every transaction the wallet was asked to send, reverted or not.
    pub fn transactions(&self) -> Vec<TransactionRequest> {
        self.chain().transactions.clone()
    }

    /// Number of `eth_call` requests served.
    pub fn call_count(&self) -> usize {
        self.chain().calls
    }
}

impl FakeChain {
    fn answer_call(&self, request: &CallRequest) -> Result<Bytes, String> {
        let data = request.data.as_ref();
        let selector = data.get(..4).ok_or("calldata too short")?;
        let encoded = if selector == abi::getGameInfoCall::SELECTOR {
            let game = abi::Game::from(&self.game);
            abi::getGameInfoCall::abi_encode_returns(&(game,))
        } else if selector == abi::getPlayerCall::SELECTOR {
            let call = abi::getPlayerCall::abi_decode(data, true).map_err(|e| e.to_string())?;
            let position = self.players.get(&call.player).copied().unwrap_or_default();
            let info = abi::Player {
                bet: position.bet,
                timestamp: position.timestamp,
            };
            abi::getPlayerCall::abi_encode_returns(&(info,))
        } else if selector == abi::getUserBalanceCall::SELECTOR {
            let call =
                abi::getUserBalanceCall::abi_decode(data, true).map_err(|e| e.to_string())?;
            let balance = self.balances.get(&call.user).copied().unwrap_or_default();
            abi::getUserBalanceCall::abi_encode_returns(&(balance,))
        } else {
            return Err(String::from("unknown selector"));
        };
        Ok(encoded.into())
    }

    /// Applies a transaction the way the contract would. `false` means it
    /// reverted and nothing changed.
    fn execute(&mut self, request: &TransactionRequest) -> bool {
        match &request.data {
            None => self.deposit(request.from, request.value.unwrap_or_default()),
            Some(data) if data.starts_with(&abi::getPayoutCall::SELECTOR) => {
                self.pay_out(request.from)
            }
            Some(_) => false,
        }
    }

    fn deposit(&mut self, from: Address, value: U256) -> bool {
        let already_bet = self.players.get(&from).is_some_and(PlayerPosition::has_bet);
        if value < self.game.min_deposit
            || U256::from(self.now) >= self.game.ending_at
            || already_bet
        {
            return false;
        }
        self.players.insert(
            from,
            PlayerPosition {
                bet: value,
                timestamp: U256::from(self.now),
            },
        );
        self.game.pot += value;
        self.game.player_count += U256::from(1u64);
        self.game.average = self.game.pot / self.game.player_count;
        true
    }

    fn pay_out(&mut self, to: Address) -> bool {
        match self.balances.get_mut(&to) {
            Some(balance) if !balance.is_zero() => {
                *balance = U256::ZERO;
                true
            }
            _ => false,
        }
    }
}

impl WalletProvider for FakeWallet {
    async fn accounts(&self) -> Result<Vec<Address>, WalletError> {
        let chain = self.chain();
        Ok(if chain.authorized {
            chain.accounts.clone()
        } else {
            Vec::new()
        })
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        let mut chain = self.chain();
        if chain.deny_connect {
            return Err(WalletError::Rpc {
                method: "eth_requestAccounts",
                code: USER_REJECTED,
                message: String::from("User rejected the request."),
            });
        }
        chain.authorized = true;
        Ok(chain.accounts.clone())
    }

    async fn chain_id(&self) -> Result<u64, WalletError> {
        Ok(self.chain().chain_id)
    }

    async fn gas_price(&self) -> Result<U256, WalletError> {
        Ok(self.chain().gas_price)
    }

    async fn call(&self, request: CallRequest) -> Result<Bytes, WalletError> {
        let mut chain = self.chain();
        chain.calls += 1;
        if chain.fail_reads {
            return Err(WalletError::Request {
                method: "eth_call",
                message: String::from("connection refused"),
            });
        }
        chain.answer_call(&request).map_err(|message| WalletError::Rpc {
            method: "eth_call",
            code: -32000,
            message,
        })
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<B256, WalletError> {
        let mut chain = self.chain();
        if chain.reject_transactions {
            return Err(WalletError::Rpc {
                method: "eth_sendTransaction",
                code: USER_REJECTED,
                message: String::from("User denied transaction signature."),
            });
        }
        chain.transactions.push(request.clone());
        let transaction_hash = B256::left_padding_from(&(chain.transactions.len() as u64).to_be_bytes());
        let succeeded = chain.execute(&request);
        chain.receipts.insert(
            transaction_hash,
            TransactionReceipt {
                transaction_hash,
                status: Some(U64::from(u64::from(succeeded))),
            },
        );
        Ok(transaction_hash)
    }

    async fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionReceipt>, WalletError> {
        Ok(self.chain().receipts.get(&tx_hash).cloned())
    }
}

/// Runs `future` under a generous deadline so a hung test fails instead of
/// stalling the suite.
pub async fn settle<F: Future>(future: F) -> F::Output {
    match time::timeout(Duration::from_secs(30), future).await {
        Ok(output) => output,
        Err(_) => panic!("future did not settle in time"),
    }
}
