//! Error types for query compilation and execution.

use std::fmt;

use thiserror::Error;

use crate::chain::ChainError;
use crate::writers::WriterError;

/// Line/column of the query text that produced a compiler event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

impl SourcePosition {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ln {}, Col {}", self.line, self.column)
    }
}

/// What went wrong while turning compiler events into a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildErrorKind {
    #[error("construction of {found} has not been finished (expected {expected})")]
    UnfinishedConstruction { expected: String, found: String },

    #[error("no open scope to add the instruction to")]
    NoOpenScope,

    #[error("program build was already prepared")]
    ProgramAlreadyPrepared,

    #[error("program is not complete: {open} scope(s) still open")]
    OpenScopes { open: usize },

    #[error("can only compare values, but not boolean expressions")]
    CanOnlyCompareValues,

    #[error("binary boolean expression requires boolean predicates")]
    RequiresPredicate,

    #[error("error in boolean expression tree")]
    BooleanExpressionTree,

    #[error("comparator '{0}' not supported")]
    UnsupportedComparator(String),

    #[error("cannot determine type for literal {0}")]
    UnresolvedLiteral(String),

    #[error("unsupported type: '{0}'")]
    UnsupportedType(String),

    #[error("xes type '{0}' not supported")]
    UnsupportedXesType(String),

    #[error("no built-in method '{name}({signature})'")]
    UnknownMethod { name: String, signature: String },

    #[error("invalid block range: {0}")]
    InvalidRange(String),

    #[error("cannot assign a value of type {actual} to '{name}' of type {declared}")]
    TypeMismatch {
        name: String,
        declared: String,
        actual: String,
    },

    #[error("{0}")]
    Other(String),
}

/// A compile-time failure. Aborts program construction entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildError {
    pub kind: BuildErrorKind,
    pub position: Option<SourcePosition>,
}

impl BuildError {
    pub fn new(kind: BuildErrorKind) -> Self {
        Self { kind, position: None }
    }

    /// Attach a source position unless one is already recorded.
    pub fn at(mut self, position: Option<SourcePosition>) -> Self {
        if self.position.is_none() {
            self.position = position;
        }
        self
    }
}

impl From<BuildErrorKind> for BuildError {
    fn from(kind: BuildErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "{pos}: {}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for BuildError {}

/// A run-time failure raised while interpreting a program.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A structural precondition does not hold. No recovery is defined.
    #[error("structural error: {0}")]
    Structural(String),

    #[error("no current {0} in scope")]
    MissingCursor(&'static str),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("method '{method}' failed: {reason}")]
    Method { method: String, reason: String },

    #[error("writer error: {0}")]
    Writer(#[from] WriterError),
}

impl ExecutionError {
    /// Returns `true` if the run cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Structural(_))
    }

    pub fn type_mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }
}
