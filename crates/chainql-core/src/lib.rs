//! chainql-core: compiler and interpreter for ChainQL blockchain queries.
//!
//! # Architecture
//!
//! ```text
//! parse-tree walker → QueryCompiler
//!                        ├── SpecificationComposer (scope stack → instruction tree)
//!                        └── PredicateBuilder      (operand stack → boolean expression)
//!                                   │
//!                                   ▼
//!                               Program ──execute──▶ RunState
//!                                                      ├── ChainSource  (blocks, eth_call)
//!                                                      ├── variables + cursors
//!                                                      ├── ErrorHandler
//!                                                      └── DataWriters  (CSV / log / XES / HTTP)
//! ```

pub mod abi;
pub mod accessor;
pub mod address;
pub mod chain;
pub mod compiler;
pub mod composer;
pub mod config;
pub mod error;
pub mod instruction;
pub mod methods;
pub mod predicate;
pub mod range;
pub mod retry;
pub mod state;
pub mod telemetry;
pub mod value;
pub mod writers;

pub use abi::{LogEntrySignature, ParameterSpecification, SmartContractQuery};
pub use accessor::{BlockchainVariable, ValueAccessor, ValueMutator};
pub use address::AddressListSpecification;
pub use chain::{Block, ChainConnector, ChainError, ChainSource, LogEntry, Transaction};
pub use compiler::{AddressList, BlockBound, ContractRead, EventParameter, EventSignature, QueryCompiler, ValueExpr, XesField};
pub use composer::{BuildState, SpecificationComposer};
pub use config::{ConfigError, EmissionMode, RunConfig};
pub use error::{BuildError, BuildErrorKind, ExecutionError, SourcePosition};
pub use instruction::{Instruction, Program};
pub use methods::Method;
pub use predicate::{Comparator, Predicate, PredicateBuilder};
pub use range::{BlockNumberSpecification, BlockRange};
pub use retry::{RetryConfig, RetryPolicy};
pub use state::{CancellationToken, ErrorHandler, RunState};
pub use telemetry::{init_tracing, LogConfig};
pub use value::{Value, ValueType};
pub use writers::{DataWriter, DataWriters, WriterError};
