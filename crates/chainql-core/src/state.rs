//! Run state: the mutable context threaded through one program execution.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::chain::{Block, ChainConnector, ChainError, ChainSource, LogEntry, Transaction};
use crate::config::RunConfig;
use crate::error::ExecutionError;
use crate::value::Value;
use crate::writers::DataWriters;

/// Cooperative cancellation flag, checked at block-number boundaries.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Central handler for execution failures.
///
/// Fatal failures always propagate. Other failures are logged and swallowed,
/// so the caller skips the element that triggered them, unless
/// `abort_on_error` is set.
#[derive(Debug)]
pub struct ErrorHandler {
    abort_on_error: bool,
    aborting: bool,
    reported: usize,
    recent: VecDeque<String>,
}

const RECENT_ERRORS: usize = 100;

impl ErrorHandler {
    pub fn new(abort_on_error: bool) -> Self {
        Self {
            abort_on_error,
            aborting: false,
            reported: 0,
            recent: VecDeque::new(),
        }
    }

    /// Record `err`. Returns it back if processing must not continue.
    ///
    /// Once an error has been propagated, later calls pass errors through
    /// without recording them again while the run unwinds.
    pub fn handle(&mut self, context: &str, err: ExecutionError) -> Result<(), ExecutionError> {
        if self.aborting {
            return Err(err);
        }
        self.reported += 1;
        if self.recent.len() == RECENT_ERRORS {
            self.recent.pop_front();
        }
        self.recent.push_back(format!("{context}: {err}"));

        if err.is_fatal() || self.abort_on_error {
            tracing::error!(error = %err, fatal = true, "{context}");
            self.aborting = true;
            return Err(err);
        }
        tracing::error!(error = %err, "{context}");
        Ok(())
    }

    /// Number of failures reported so far.
    pub fn reported(&self) -> usize {
        self.reported
    }

    /// `true` once an error has been propagated.
    pub fn is_aborting(&self) -> bool {
        self.aborting
    }

    /// Messages of the most recent failures, oldest first.
    pub fn recent(&self) -> impl Iterator<Item = &str> {
        self.recent.iter().map(String::as_str)
    }
}

/// Mutable execution context: variable store, cursors, writers, and the
/// chain data source.
pub struct RunState {
    variables: HashMap<String, Value>,
    current_block: Option<Arc<Block>>,
    current_transaction: Option<Arc<Transaction>>,
    current_log: Option<Arc<LogEntry>>,
    chain: Option<Arc<dyn ChainSource>>,
    connector: Option<Arc<dyn ChainConnector>>,
    writers: DataWriters,
    errors: ErrorHandler,
    cancellation: CancellationToken,
    config: RunConfig,
}

impl RunState {
    pub fn new(config: RunConfig) -> Self {
        Self {
            variables: HashMap::new(),
            current_block: None,
            current_transaction: None,
            current_log: None,
            chain: None,
            connector: None,
            writers: DataWriters::new(&config),
            errors: ErrorHandler::new(config.abort_on_error),
            cancellation: CancellationToken::new(),
            config,
        }
    }

    pub fn with_chain(mut self, chain: Arc<dyn ChainSource>) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn ChainConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    // ─── Variables ────────────────────────────────────────────────────────────

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Last write wins.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    // ─── Cursors ──────────────────────────────────────────────────────────────

    pub fn current_block(&self) -> Option<&Arc<Block>> {
        self.current_block.as_ref()
    }

    pub fn set_current_block(&mut self, block: Option<Arc<Block>>) {
        self.current_block = block;
    }

    pub fn current_transaction(&self) -> Option<&Arc<Transaction>> {
        self.current_transaction.as_ref()
    }

    pub fn set_current_transaction(&mut self, tx: Option<Arc<Transaction>>) {
        self.current_transaction = tx;
    }

    pub fn current_log(&self) -> Option<&Arc<LogEntry>> {
        self.current_log.as_ref()
    }

    pub fn set_current_log(&mut self, log: Option<Arc<LogEntry>>) {
        self.current_log = log;
    }

    // ─── Collaborators ────────────────────────────────────────────────────────

    pub fn chain(&self) -> Result<Arc<dyn ChainSource>, ExecutionError> {
        self.chain.clone().ok_or(ExecutionError::Chain(ChainError::NotConnected))
    }

    pub fn set_chain(&mut self, chain: Arc<dyn ChainSource>) {
        self.chain = Some(chain);
    }

    pub fn connector(&self) -> Option<Arc<dyn ChainConnector>> {
        self.connector.clone()
    }

    pub fn writers(&self) -> &DataWriters {
        &self.writers
    }

    pub fn writers_mut(&mut self) -> &mut DataWriters {
        &mut self.writers
    }

    pub fn errors(&self) -> &ErrorHandler {
        &self.errors
    }

    /// Report a failure through the central handler.
    pub fn handle_error(&mut self, context: &str, err: ExecutionError) -> Result<(), ExecutionError> {
        self.errors.handle(context, err)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let state = RunState::new(RunConfig::default()).with_cancellation(token.clone());
        assert!(!state.cancellation().is_cancelled());
        token.cancel();
        assert!(state.cancellation().is_cancelled());
    }

    #[test]
    fn handler_swallows_recoverable_errors() {
        let mut handler = ErrorHandler::new(false);
        assert!(handler.handle("log entry", ExecutionError::Decode("bad".into())).is_ok());
        assert!(handler
            .handle("log filter", ExecutionError::Structural("no scope".into()))
            .is_err());
        assert_eq!(handler.reported(), 2);
        assert_eq!(handler.recent().next(), Some("log entry: decode error: bad"));
    }

    #[test]
    fn handler_aborts_when_configured() {
        let mut handler = ErrorHandler::new(true);
        assert!(handler.handle("x", ExecutionError::Decode("bad".into())).is_err());
        assert!(handler.is_aborting());
        assert!(handler.handle("outer", ExecutionError::Decode("bad".into())).is_err());
        assert_eq!(handler.reported(), 1);
    }

    #[test]
    fn chain_is_required() {
        let state = RunState::new(RunConfig::default());
        assert!(matches!(
            state.chain(),
            Err(ExecutionError::Chain(ChainError::NotConnected))
        ));
    }
}
