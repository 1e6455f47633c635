//! [`ChainSource`] over an EVM node's HTTP JSON-RPC endpoint.
//!
//! A block is assembled from two calls: `eth_getBlockByNumber` with full
//! transaction objects, then `eth_getLogs` for the same block, whose entries
//! are attached to their transactions. Transport failures are retried with
//! exponential backoff; node errors are not.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use chainql_core::{Block, ChainError, ChainSource, RetryConfig, RetryPolicy};

use crate::convert::{attach_logs, block_from_json, log_from_json, parse_data, parse_u64, to_quantity};
use crate::rpc::{RpcRequest, RpcResponse, TransportError};

/// Configuration for [`JsonRpcChainSource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvmSourceConfig {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 { 30_000 }

impl Default for EvmSourceConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

pub struct JsonRpcChainSource {
    url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl JsonRpcChainSource {
    pub fn new(url: impl Into<String>, config: &EvmSourceConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.into(),
            http,
            retry: RetryPolicy::new(config.retry.clone()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send_once(&self, method: &str, params: &Value) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self
            .http
            .post(&self.url)
            .json(&RpcRequest::new(id, method, params.clone()))
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        let body: RpcResponse = resp
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        Ok(body.into_result()?)
    }

    /// Send `method`, retrying transport failures.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(method, &params).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            method,
                            url = %self.url,
                            "retrying request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(attempt, error = %e, method, url = %self.url, "max retries exceeded");
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl ChainSource for JsonRpcChainSource {
    async fn block_number(&self) -> Result<u64, ChainError> {
        let result = self.request("eth_blockNumber", json!([])).await?;
        let head = result
            .as_str()
            .ok_or_else(|| ChainError::InvalidResponse(format!("eth_blockNumber returned {result}")))?;
        parse_u64(head)
    }

    async fn block(&self, number: u64) -> Result<Option<Block>, ChainError> {
        let tag = to_quantity(number);
        let result = self
            .request("eth_getBlockByNumber", json!([tag, true]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let mut block = block_from_json(&result)?;

        let logs = self
            .request("eth_getLogs", json!([{ "fromBlock": tag, "toBlock": tag }]))
            .await?;
        let logs = logs
            .as_array()
            .ok_or_else(|| ChainError::InvalidResponse("eth_getLogs did not return an array".into()))?
            .iter()
            .map(log_from_json)
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(
            block = number,
            transactions = block.transactions.len(),
            logs = logs.len(),
            "Block fetched"
        );
        attach_logs(&mut block, logs);
        Ok(Some(block))
    }

    async fn call(
        &self,
        contract: &str,
        calldata: Vec<u8>,
        block: Option<u64>,
    ) -> Result<Vec<u8>, ChainError> {
        let tag = block.map(to_quantity).unwrap_or_else(|| "latest".into());
        let params = json!([{ "to": contract, "data": format!("0x{}", hex::encode(calldata)) }, tag]);
        let result = self.request("eth_call", params).await.map_err(|e| match e {
            TransportError::Rpc(err) => ChainError::CallFailed {
                contract: contract.to_string(),
                reason: err.message,
            },
            other => other.into(),
        })?;
        let data = result
            .as_str()
            .ok_or_else(|| ChainError::InvalidResponse(format!("eth_call returned {result}")))?;
        parse_data(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable() -> JsonRpcChainSource {
        JsonRpcChainSource::new(
            "http://127.0.0.1:9",
            &EvmSourceConfig {
                retry: RetryConfig::none(),
                request_timeout_ms: 1_000,
            },
        )
    }

    #[test]
    fn config_defaults() {
        let config: EvmSourceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EvmSourceConfig::default());
        assert_eq!(config.request_timeout_ms, 30_000);
    }

    #[tokio::test]
    async fn transport_failure_is_an_rpc_error() {
        let source = unreachable();
        assert!(matches!(source.block_number().await, Err(ChainError::Rpc(_))));
    }

    #[tokio::test]
    async fn request_ids_increase() {
        let source = unreachable();
        let _ = source.request("eth_chainId", json!([])).await;
        let _ = source.request("eth_chainId", json!([])).await;
        assert_eq!(source.next_id.load(Ordering::Relaxed), 3);
    }
}
