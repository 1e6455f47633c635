use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use super::{execute_all, Instruction};
use crate::abi::{LogEntrySignature, SmartContractQuery};
use crate::accessor::ValueAccessor;
use crate::address::AddressListSpecification;
use crate::chain::{Block, ChainError, ChainSource, LogEntry};
use crate::error::ExecutionError;
use crate::predicate::Predicate;
use crate::range::BlockRange;
use crate::state::RunState;
use crate::value::Value;

// ─── Block range ──────────────────────────────────────────────────────────────

/// Visits every block of a range in ascending order.
#[derive(Debug, Clone)]
pub struct BlockFilter {
    pub range: BlockRange,
    pub body: Vec<Instruction>,
}

impl BlockFilter {
    pub(crate) async fn execute(&self, state: &mut RunState) -> Result<(), ExecutionError> {
        let mut number = self.range.from.resolve_lower(state).await?;
        let mut stop = self.range.to.stop_criterion();
        let continuous = self.range.to.is_continuous();
        let poll_interval = Duration::from_millis(state.config().poll_interval_ms);
        tracing::info!(range = %self.range, from = number, "Block scan started");

        loop {
            if state.cancellation().is_cancelled() {
                tracing::info!(next = number, "Block scan cancelled");
                break;
            }
            if !stop.keep_going(state, number).await? {
                break;
            }

            let chain = state.chain()?;
            match chain.block(number).await {
                Ok(Some(block)) => self.visit(state, Arc::new(block)).await?,
                Ok(None) if continuous => {
                    tracing::trace!(block = number, "Waiting for block");
                    tokio::time::sleep(poll_interval).await;
                    continue;
                }
                Ok(None) => {
                    let err = ChainError::BlockNotFound(number).into();
                    state.handle_error(&format!("block {number}"), err)?;
                }
                Err(err) if continuous => {
                    state.handle_error(&format!("block {number}"), err.into())?;
                    tokio::time::sleep(poll_interval).await;
                    continue;
                }
                Err(err) => state.handle_error(&format!("block {number}"), err.into())?,
            }

            match number.checked_add(1) {
                Some(next) => number = next,
                None => break,
            }
        }
        tracing::info!(range = %self.range, "Block scan finished");
        Ok(())
    }

    /// Run the body for one block, bracketed by the writers' block scope.
    async fn visit(&self, state: &mut RunState, block: Arc<Block>) -> Result<(), ExecutionError> {
        let number = block.number;
        tracing::debug!(block = number, transactions = block.transactions.len(), "Visiting block");
        state.writers_mut().start_block(number);
        state.set_current_block(Some(block));
        let result = execute_all(&self.body, state).await;
        state.set_current_block(None);

        match result {
            Ok(()) => {
                if let Err(err) = state.writers_mut().end_block().await {
                    state.handle_error(&format!("block {number}"), err.into())?;
                }
                Ok(())
            }
            Err(err) => {
                state.writers_mut().discard_block();
                state.handle_error(&format!("block {number}"), err)
            }
        }
    }
}

// ─── Transactions ─────────────────────────────────────────────────────────────

/// Visits the transactions of the current block whose sender and recipient
/// match.
#[derive(Debug, Clone)]
pub struct TransactionFilter {
    pub senders: AddressListSpecification,
    pub recipients: AddressListSpecification,
    pub body: Vec<Instruction>,
}

impl TransactionFilter {
    pub(crate) async fn execute(&self, state: &mut RunState) -> Result<(), ExecutionError> {
        let block = state.current_block().cloned().ok_or_else(|| {
            ExecutionError::Structural("transaction filter outside of a block scope".into())
        })?;

        for tx in &block.transactions {
            let matched = self
                .senders
                .matches(state, Some(&tx.from))
                .and_then(|ok| Ok(ok && self.recipients.matches(state, tx.to.as_deref())?));
            match matched {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    state.handle_error(&format!("transaction {}", tx.hash), err)?;
                    continue;
                }
            }

            tracing::trace!(tx = %tx.hash, "Transaction matched");
            state.set_current_transaction(Some(tx.clone()));
            let result = execute_all(&self.body, state).await;
            state.set_current_transaction(None);
            if let Err(err) = result {
                state.handle_error(&format!("transaction {}", tx.hash), err)?;
            }
        }
        Ok(())
    }
}

// ─── Log entries ──────────────────────────────────────────────────────────────

/// Visits log entries of the current transaction, or of every transaction of
/// the current block, that match the contract criteria and the signature.
#[derive(Debug, Clone)]
pub struct LogEntryFilter {
    pub contracts: AddressListSpecification,
    pub signature: Option<LogEntrySignature>,
    pub body: Vec<Instruction>,
}

impl LogEntryFilter {
    fn candidates(state: &RunState) -> Result<Vec<Arc<LogEntry>>, ExecutionError> {
        if let Some(tx) = state.current_transaction() {
            return Ok(tx.logs.clone());
        }
        if let Some(block) = state.current_block() {
            return Ok(block
                .transactions
                .iter()
                .flat_map(|tx| tx.logs.iter().cloned())
                .collect());
        }
        Err(ExecutionError::Structural(
            "log entry filter outside of a block or transaction scope".into(),
        ))
    }

    pub(crate) async fn execute(&self, state: &mut RunState) -> Result<(), ExecutionError> {
        for log in Self::candidates(state)? {
            let context = || format!("log entry {}:{}", log.transaction_hash, log.log_index);
            match self.contracts.matches(state, Some(&log.address)) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    state.handle_error(&context(), err)?;
                    continue;
                }
            }

            if let Some(signature) = &self.signature {
                if !signature.matches(&log) {
                    continue;
                }
                match signature.decode(&log) {
                    Ok(values) => {
                        for (name, value) in values {
                            state.set_variable(name, value);
                        }
                    }
                    Err(err) => {
                        state.handle_error(&context(), err)?;
                        continue;
                    }
                }
            }

            tracing::trace!(address = %log.address, log_index = log.log_index, "Log entry matched");
            state.set_current_log(Some(log.clone()));
            let result = execute_all(&self.body, state).await;
            state.set_current_log(None);
            if let Err(err) = result {
                state.handle_error(&context(), err)?;
            }
        }
        Ok(())
    }
}

// ─── Smart contracts ──────────────────────────────────────────────────────────

/// Reads values from a contract and runs the body with them bound.
#[derive(Debug, Clone)]
pub struct SmartContractFilter {
    pub contract: ValueAccessor,
    pub queries: Vec<SmartContractQuery>,
    pub body: Vec<Instruction>,
}

async fn read(
    chain: Arc<dyn ChainSource>,
    contract: &str,
    query: &SmartContractQuery,
    calldata: Vec<u8>,
    block: Option<u64>,
) -> Result<Vec<(String, Value)>, ExecutionError> {
    let data = chain.call(contract, calldata, block).await?;
    query.decode_result(&data)
}

impl SmartContractFilter {
    pub(crate) async fn execute(&self, state: &mut RunState) -> Result<(), ExecutionError> {
        let contract = self.contract.get_value(state)?.as_text()?.to_string();
        let context = format!("smart contract {contract}");

        let mut calls = Vec::with_capacity(self.queries.len());
        for query in &self.queries {
            match query.encode_call(state) {
                Ok(calldata) => calls.push((query, calldata)),
                Err(err) => return state.handle_error(&context, err),
            }
        }

        let chain = state.chain()?;
        let block = state.current_block().map(|b| b.number);
        let results = join_all(
            calls
                .into_iter()
                .map(|(query, calldata)| read(chain.clone(), &contract, query, calldata, block)),
        )
        .await;

        let mut bindings = Vec::new();
        for result in results {
            match result {
                Ok(values) => bindings.extend(values),
                Err(err) => return state.handle_error(&context, err),
            }
        }
        tracing::debug!(contract = %contract, values = bindings.len(), "Contract values read");
        for (name, value) in bindings {
            state.set_variable(name, value);
        }
        execute_all(&self.body, state).await
    }
}

// ─── Generic ──────────────────────────────────────────────────────────────────

/// Runs the body if the predicate holds.
#[derive(Debug, Clone)]
pub struct GenericFilter {
    pub predicate: Predicate,
    pub body: Vec<Instruction>,
}

impl GenericFilter {
    pub(crate) async fn execute(&self, state: &mut RunState) -> Result<(), ExecutionError> {
        if self.predicate.evaluate(state)? {
            execute_all(&self.body, state).await?;
        }
        Ok(())
    }
}
