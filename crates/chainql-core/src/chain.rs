//! Chain data model and the data-source boundary.
//!
//! The interpreter never talks to a node directly. It goes through a
//! [`ChainSource`], which the `chainql-evm` crate implements over JSON-RPC and
//! tests implement in memory. Retries and backoff belong to the source.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Data model ───────────────────────────────────────────────────────────────

/// A block with its transactions (and their logs) attached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    /// Block hash (`0x…`).
    pub hash: String,
    pub parent_hash: String,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
    pub miner: String,
    pub gas_used: u128,
    pub gas_limit: u128,
    pub transactions: Vec<Arc<Transaction>>,
}

/// A transaction together with the log entries it emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub block_number: u64,
    pub transaction_index: u64,
    pub from: String,
    /// `None` for contract creations.
    pub to: Option<String>,
    /// Transferred value in wei, as a decimal string.
    pub value: String,
    pub gas: u128,
    pub gas_price: u128,
    pub nonce: u64,
    /// Calldata (`0x…`).
    pub input: String,
    pub logs: Vec<Arc<LogEntry>>,
}

/// A single EVM log entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Emitting contract address.
    pub address: String,
    /// `topics[0]` is the event signature hash for non-anonymous events.
    pub topics: Vec<String>,
    /// Non-indexed parameters, ABI-encoded.
    pub data: Vec<u8>,
    pub block_number: u64,
    pub transaction_hash: String,
    pub transaction_index: u64,
    pub log_index: u64,
    pub removed: bool,
}

// ─── Errors ───────────────────────────────────────────────────────────────────

/// Errors surfaced by a chain data source.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("block {0} not found")]
    BlockNotFound(u64),

    #[error("contract call to {contract} failed: {reason}")]
    CallFailed { contract: String, reason: String },

    #[error("not connected to a chain")]
    NotConnected,

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

// ─── Collaborator traits ──────────────────────────────────────────────────────

/// Read access to a blockchain.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Current chain head.
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// Fetch a block with transactions and logs. `Ok(None)` if it does not
    /// exist yet.
    async fn block(&self, number: u64) -> Result<Option<Block>, ChainError>;

    /// Execute a read-only call (`eth_call`) and return the raw return data.
    /// `block` pins the call to a block; `None` means latest.
    async fn call(
        &self,
        contract: &str,
        calldata: Vec<u8>,
        block: Option<u64>,
    ) -> Result<Vec<u8>, ChainError>;
}

/// Opens a [`ChainSource`] for a `SET CONNECTION` directive.
#[async_trait]
pub trait ChainConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn ChainSource>, ChainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_serde_roundtrip() {
        let block = Block {
            number: 7,
            hash: "0xabc".into(),
            transactions: vec![Arc::new(Transaction {
                hash: "0x01".into(),
                to: None,
                ..Default::default()
            })],
            ..Default::default()
        };
        let json = serde_json::to_string(&block).unwrap();
        let back: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(back, block);
    }
}
