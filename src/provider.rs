//! Wallet provider boundary.
//!
//! Signing never happens in this crate. Accounts, chain id, transaction
//! submission and receipts are all requested from an external wallet that
//! speaks Ethereum JSON-RPC.

use crate::error::WalletError;
use alloy_primitives::{
    Address,
    B256,
    Bytes,
    U64,
    U256,
};
use serde::{
    Deserialize,
    Serialize,
    de::DeserializeOwned,
};
use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{
            AtomicU64,
            Ordering,
        },
    },
    time::Duration,
};
use tokio::time;
use tracing::debug;

/// Read-only contract call.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CallRequest {
    pub to: Address,
    pub data: Bytes,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub status: Option<U64>,
}

impl TransactionReceipt {
    /// Receipts without a status field predate status codes and count as
    /// successful.
    pub fn succeeded(&self) -> bool {
        self.status.is_none_or(|status| status == U64::from(1u64))
    }
}

/// Operations the client needs from a wallet. Implementations must be
/// cheap to clone; clones share the same underlying connection.
pub trait WalletProvider: Clone + Send + Sync + 'static {
    /// Accounts already authorized for this client (`eth_accounts`).
    fn accounts(&self) -> impl Future<Output = Result<Vec<Address>, WalletError>> + Send;

    /// Asks the wallet to authorize an account (`eth_requestAccounts`).
    fn request_accounts(
        &self,
    ) -> impl Future<Output = Result<Vec<Address>, WalletError>> + Send;

    fn chain_id(&self) -> impl Future<Output = Result<u64, WalletError>> + Send;

    fn gas_price(&self) -> impl Future<Output = Result<U256, WalletError>> + Send;

    fn call(
        &self,
        request: CallRequest,
    ) -> impl Future<Output = Result<Bytes, WalletError>> + Send;

    fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> impl Future<Output = Result<B256, WalletError>> + Send;

    fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = Result<Option<TransactionReceipt>, WalletError>> + Send;
}

/// Polls for the receipt of `tx_hash` until the wallet reports one.
/// There is no deadline; callers cancel by dropping the future.
pub async fn wait_for_receipt<P: WalletProvider>(
    provider: &P,
    tx_hash: B256,
    poll_every: Duration,
) -> Result<TransactionReceipt, WalletError> {
    loop {
        if let Some(receipt) = provider.transaction_receipt(tx_hash).await? {
            return Ok(receipt);
        }
        debug!(%tx_hash, "transaction pending");
        time::sleep(poll_every).await;
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Wallet reached over HTTP JSON-RPC.
#[derive(Clone, Debug)]
pub struct JsonRpcProvider {
    url: String,
    http: reqwest::Client,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcProvider {
    pub fn new(url: impl Into<String>) -> Result<Self, WalletError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| WalletError::Request {
                method: "connect",
                message: err.to_string(),
            })?;
        Ok(Self {
            url: url.into(),
            http,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<Option<T>, WalletError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params: &params,
        };
        let request_failed = |err: reqwest::Error| WalletError::Request {
            method,
            message: err.to_string(),
        };
        let response: RpcResponse<T> = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(request_failed)?
            .json()
            .await
            .map_err(request_failed)?;
        if let Some(error) = response.error {
            return Err(WalletError::Rpc {
                method,
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result)
    }

    async fn request_some<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<T, WalletError> {
        self.request(method, params)
            .await?
            .ok_or(WalletError::EmptyResult { method })
    }
}

impl WalletProvider for JsonRpcProvider {
    async fn accounts(&self) -> Result<Vec<Address>, WalletError> {
        self.request_some("eth_accounts", serde_json::json!([])).await
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        self.request_some("eth_requestAccounts", serde_json::json!([]))
            .await
    }

    async fn chain_id(&self) -> Result<u64, WalletError> {
        let id: U64 = self
            .request_some("eth_chainId", serde_json::json!([]))
            .await?;
        Ok(id.to::<u64>())
    }

    async fn gas_price(&self) -> Result<U256, WalletError> {
        self.request_some("eth_gasPrice", serde_json::json!([])).await
    }

    async fn call(&self, request: CallRequest) -> Result<Bytes, WalletError> {
        self.request_some("eth_call", serde_json::json!([request, "latest"]))
            .await
    }

    async fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<B256, WalletError> {
        self.request_some("eth_sendTransaction", serde_json::json!([request]))
            .await
    }

    async fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionReceipt>, WalletError> {
        self.request("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
            .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use alloy_primitives::address;

    #[test]
    fn transaction_request__serializes_hex_quantities() {
        let request = TransactionRequest {
            from: address!("00000000000000000000000000000000000000a1"),
            to: address!("00000000000000000000000000000000000000b2"),
            value: Some(U256::from(255u64)),
            data: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["value"], "0xff");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn receipt__status_zero_is_failure() {
        let json = serde_json::json!({
            "transactionHash": B256::ZERO,
            "status": "0x0",
        });
        let receipt: TransactionReceipt = serde_json::from_value(json).unwrap();
        assert!(!receipt.succeeded());
    }

    #[test]
    fn receipt__missing_status_counts_as_success() {
        let json = serde_json::json!({ "transactionHash": B256::ZERO });
        let receipt: TransactionReceipt = serde_json::from_value(json).unwrap();
        assert!(receipt.succeeded());
    }
}
