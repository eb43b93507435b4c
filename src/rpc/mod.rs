//! # JSON-RPC Gateway
//!
//! [`RpcProvider`] is the seam between the scraper and the node. The production
//! implementation, [`EthereumJsonRpcClient`], owns its HTTP client and its request-id
//! counter, so independent runs never share mutable state.

use std::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::sleep;
use tracing::{error, warn};

use crate::{
    errors::{IndexError, Result},
    types::{BlockNumber, TransactionHash},
    utils::convert_hex_string_to_u64,
};

pub mod types;

#[cfg(test)]
mod tests;

pub use types::{
    BlockTimestampHeader, Log, LogFilter, Receipt, RewardType, RpcErrorObject, RpcResponse,
    Trace, TraceAction, TraceEntry, TraceResult,
};
use types::RpcRequest;

pub trait RpcProvider {
    /// Latest block known to the node (`eth_blockNumber`)
    fn get_latest_block_number(&self) -> impl Future<Output = Result<BlockNumber>> + Send;

    /// Parity-style traces of every transaction in the block (`trace_block`)
    fn trace_block(&self, block: BlockNumber) -> impl Future<Output = Result<Vec<Trace>>> + Send;

    /// Logs emitted in exactly one block (`eth_getLogs`)
    fn get_logs(&self, block: BlockNumber) -> impl Future<Output = Result<Vec<Log>>> + Send;

    fn get_transaction_receipt(
        &self,
        tx_hash: &TransactionHash,
    ) -> impl Future<Output = Result<Receipt>> + Send;

    /// Unix timestamp of the block header
    fn get_block_timestamp(&self, block: BlockNumber) -> impl Future<Output = Result<u64>> + Send;
}

pub struct EthereumJsonRpcClient {
    client: Client,
    url: String,
    timeout: Option<Duration>,
    max_retries: u32,
    next_id: AtomicU64,
}

impl EthereumJsonRpcClient {
    #[must_use]
    pub fn new(url: String, max_retries: u32) -> Self {
        Self {
            client: Client::new(),
            url,
            timeout: None,
            max_retries,
            next_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout = Some(Duration::from_secs(timeout_seconds));
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Next request id. Ids increase monotonically and are safe across concurrent callers.
    pub fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn make_rpc_call<T: Serialize + Sync, R: DeserializeOwned + Send>(
        &self,
        method: &str,
        params: &T,
    ) -> Result<Option<R>> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_request_id(),
            method,
            params,
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let raw_response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("HTTP request error calling {}: {:?}", method, e);
                if e.is_timeout() {
                    return Err(IndexError::rpc_timeout(
                        self.timeout.map_or(0, |t| t.as_secs()),
                    ));
                }
                return Err(e.into());
            }
        };

        let text = raw_response.text().await.map_err(|e| {
            error!("Failed to read response body of {}: {:?}", method, e);
            IndexError::from(e)
        })?;

        let parsed = serde_json::from_str::<RpcResponse<R>>(&text).map_err(|e| {
            error!(
                "Deserialization error for {}: {:?}\nResponse snippet: {:?}",
                method,
                e,
                text.chars().take(512).collect::<String>()
            );
            IndexError::from(e)
        })?;

        if let Some(err) = parsed.error {
            return Err(IndexError::rpc_error(method, err.code, err.message));
        }

        Ok(parsed.result)
    }

    /// Calls `method`, retrying transport failures up to `max_retries` times.
    /// The default of zero retries leaves retry policy to the caller.
    async fn make_retrying_rpc_call<T: Serialize + Sync, R: DeserializeOwned + Send>(
        &self,
        method: &str,
        params: &T,
    ) -> Result<Option<R>> {
        let mut attempts = 0;
        loop {
            match self.make_rpc_call(method, params).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transport() && attempts < self.max_retries => {
                    attempts += 1;
                    let backoff = Duration::from_secs(2_u64.pow(attempts));
                    warn!(
                        "{} failed with error: {}. Retrying in {:?} (Attempt {}/{})",
                        method, e, backoff, attempts, self.max_retries
                    );
                    sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl RpcProvider for EthereumJsonRpcClient {
    async fn get_latest_block_number(&self) -> Result<BlockNumber> {
        let hex: String = self
            .make_retrying_rpc_call("eth_blockNumber", &[0u8; 0])
            .await?
            .ok_or_else(|| IndexError::block_not_found("latest"))?;
        BlockNumber::from_hex(&hex)
    }

    async fn trace_block(&self, block: BlockNumber) -> Result<Vec<Trace>> {
        let traces: Option<Vec<Trace>> = self
            .make_retrying_rpc_call("trace_block", &(block.to_hex(),))
            .await?;
        traces.ok_or_else(|| IndexError::block_not_found(block.to_string()))
    }

    async fn get_logs(&self, block: BlockNumber) -> Result<Vec<Log>> {
        let logs: Option<Vec<Log>> = self
            .make_retrying_rpc_call("eth_getLogs", &(LogFilter::single_block(block),))
            .await?;
        Ok(logs.unwrap_or_default())
    }

    async fn get_transaction_receipt(&self, tx_hash: &TransactionHash) -> Result<Receipt> {
        self.make_retrying_rpc_call("eth_getTransactionReceipt", &(tx_hash.value(),))
            .await?
            .ok_or_else(|| IndexError::transaction_not_found(tx_hash.value()))
    }

    async fn get_block_timestamp(&self, block: BlockNumber) -> Result<u64> {
        let header: BlockTimestampHeader = self
            .make_retrying_rpc_call("eth_getBlockByNumber", &(block.to_hex(), false))
            .await?
            .ok_or_else(|| IndexError::block_not_found(block.to_string()))?;
        convert_hex_string_to_u64(&header.timestamp)
    }
}
