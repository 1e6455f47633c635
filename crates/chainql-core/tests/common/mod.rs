//! Shared fixtures for the interpreter integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chainql_core::{Block, CancellationToken, ChainError, ChainSource, LogEntry, Transaction};

// ─── Mock chain ───────────────────────────────────────────────────────────────

/// In-memory chain. Blocks above `head` are reported as not yet produced.
#[derive(Default)]
pub struct MockChain {
    blocks: BTreeMap<u64, Block>,
    head: u64,
    fetches: AtomicUsize,
    cancel_at: Option<(usize, CancellationToken)>,
    call_results: HashMap<String, Vec<u8>>,
    calls: Mutex<Vec<(String, Option<u64>)>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty blocks `from..=to`, head at `to`.
    pub fn with_empty_blocks(from: u64, to: u64) -> Self {
        let mut chain = Self::new();
        for number in from..=to {
            chain = chain.with_block(block(number, vec![]));
        }
        chain
    }

    pub fn with_block(mut self, block: Block) -> Self {
        self.head = self.head.max(block.number);
        self.blocks.insert(block.number, block);
        self
    }

    /// Cancel `token` while serving the `fetch`-th block request (1-based).
    pub fn cancel_on_fetch(mut self, fetch: usize, token: CancellationToken) -> Self {
        self.cancel_at = Some((fetch, token));
        self
    }

    /// Answer every `eth_call` to `contract` with `data`.
    pub fn with_call_result(mut self, contract: &str, data: Vec<u8>) -> Self {
        self.call_results.insert(contract.to_lowercase(), data);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// `(contract, block)` of every call received.
    pub fn calls(&self) -> Vec<(String, Option<u64>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.head)
    }

    async fn block(&self, number: u64) -> Result<Option<Block>, ChainError> {
        let fetch = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, token)) = &self.cancel_at {
            if fetch >= *at {
                token.cancel();
            }
        }
        Ok(self.blocks.get(&number).cloned())
    }

    async fn call(
        &self,
        contract: &str,
        _calldata: Vec<u8>,
        block: Option<u64>,
    ) -> Result<Vec<u8>, ChainError> {
        self.calls.lock().unwrap().push((contract.to_string(), block));
        self.call_results
            .get(&contract.to_lowercase())
            .cloned()
            .ok_or_else(|| ChainError::CallFailed {
                contract: contract.to_string(),
                reason: "execution reverted".into(),
            })
    }
}

// ─── Builders ─────────────────────────────────────────────────────────────────

pub fn block(number: u64, transactions: Vec<Transaction>) -> Block {
    Block {
        number,
        hash: format!("0x{number:064x}"),
        parent_hash: format!("0x{:064x}", number.saturating_sub(1)),
        timestamp: 1_700_000_000 + number as i64 * 12,
        transactions: transactions.into_iter().map(Arc::new).collect(),
        ..Default::default()
    }
}

pub fn tx(hash: &str, from: &str, to: Option<&str>, value: &str) -> Transaction {
    Transaction {
        hash: hash.to_string(),
        from: from.to_string(),
        to: to.map(str::to_string),
        value: value.to_string(),
        ..Default::default()
    }
}

pub fn with_logs(mut tx: Transaction, logs: Vec<LogEntry>) -> Transaction {
    tx.logs = logs
        .into_iter()
        .enumerate()
        .map(|(i, mut log)| {
            log.transaction_hash = tx.hash.clone();
            log.log_index = i as u64;
            Arc::new(log)
        })
        .collect();
    tx
}

/// A 32-byte big-endian word holding `value`.
pub fn word(value: u64) -> Vec<u8> {
    let mut out = vec![0u8; 24];
    out.extend_from_slice(&value.to_be_bytes());
    out
}

/// An address left-padded into a topic.
pub fn address_topic(address: &str) -> String {
    format!("0x{:0>64}", address.trim_start_matches("0x").to_lowercase())
}

// ─── Files ────────────────────────────────────────────────────────────────────

/// A fresh, empty directory under the system temp dir.
pub fn temp_folder() -> PathBuf {
    let folder = std::env::temp_dir().join(format!("chainql-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&folder).unwrap();
    folder
}

/// `folder` as a query string literal.
pub fn quoted(folder: &std::path::Path) -> String {
    format!("\"{}\"", folder.display())
}

pub fn read(folder: &std::path::Path, file: &str) -> String {
    std::fs::read_to_string(folder.join(file)).unwrap_or_default()
}
