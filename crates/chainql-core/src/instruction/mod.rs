//! The executable program tree and its interpreter.
//!
//! Instructions are built once by the [`SpecificationComposer`] and never
//! mutated afterwards; all state lives in [`RunState`]. Scoped filters own
//! their body and run it once per matching element.
//!
//! [`SpecificationComposer`]: crate::composer::SpecificationComposer

mod emission;
mod filters;
mod statements;

pub use emission::{Emission, XesParameter};
pub use filters::{BlockFilter, GenericFilter, LogEntryFilter, SmartContractFilter, TransactionFilter};
pub use statements::{Assignment, MethodCall};

use std::path::PathBuf;

use futures::future::{BoxFuture, FutureExt};

use crate::error::ExecutionError;
use crate::state::RunState;

#[derive(Debug, Clone)]
pub enum Instruction {
    /// Runs its children in order.
    Sequence(Vec<Instruction>),
    BlockFilter(BlockFilter),
    TransactionFilter(TransactionFilter),
    LogEntryFilter(LogEntryFilter),
    SmartContractFilter(SmartContractFilter),
    GenericFilter(GenericFilter),
    Assignment(Assignment),
    MethodCall(MethodCall),
    Emit(Emission),
    /// Point every file writer at a folder.
    SetOutputFolder(PathBuf),
    /// Open a chain data source through the run's connector.
    Connect(String),
}

impl Instruction {
    pub fn execute<'a>(&'a self, state: &'a mut RunState) -> BoxFuture<'a, Result<(), ExecutionError>> {
        async move {
            match self {
                Self::Sequence(body) => execute_all(body, state).await,
                Self::BlockFilter(filter) => filter.execute(state).await,
                Self::TransactionFilter(filter) => filter.execute(state).await,
                Self::LogEntryFilter(filter) => filter.execute(state).await,
                Self::SmartContractFilter(filter) => filter.execute(state).await,
                Self::GenericFilter(filter) => filter.execute(state).await,
                Self::Assignment(assignment) => assignment.execute(state),
                Self::MethodCall(call) => call.execute(state),
                Self::Emit(emission) => emission.execute(state),
                Self::SetOutputFolder(folder) => statements::set_output_folder(state, folder).await,
                Self::Connect(url) => statements::connect(state, url).await,
            }
        }
        .boxed()
    }

    /// Short label used in log output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sequence(_) => "sequence",
            Self::BlockFilter(_) => "block filter",
            Self::TransactionFilter(_) => "transaction filter",
            Self::LogEntryFilter(_) => "log entry filter",
            Self::SmartContractFilter(_) => "smart contract filter",
            Self::GenericFilter(_) => "generic filter",
            Self::Assignment(_) => "assignment",
            Self::MethodCall(_) => "method call",
            Self::Emit(_) => "emission",
            Self::SetOutputFolder(_) => "output folder",
            Self::Connect(_) => "connection",
        }
    }
}

/// Run `body` in order, stopping at the first failure.
pub(crate) async fn execute_all(body: &[Instruction], state: &mut RunState) -> Result<(), ExecutionError> {
    for instruction in body {
        instruction.execute(state).await?;
    }
    Ok(())
}

/// A compiled query.
#[derive(Debug, Clone)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    pub(crate) fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Execute against `state`, then close all writers.
    ///
    /// A failing top-level instruction is reported and skipped. Fatal
    /// failures stop the run; rows of blocks that already completed are
    /// still flushed.
    pub async fn execute(&self, state: &mut RunState) -> Result<(), ExecutionError> {
        tracing::info!(instructions = self.instructions.len(), "Program started");
        for instruction in &self.instructions {
            if let Err(err) = instruction.execute(state).await {
                if let Err(fatal) = state.handle_error(instruction.kind(), err) {
                    state.writers_mut().discard_block();
                    if let Err(e) = state.writers_mut().end_program().await {
                        tracing::error!(error = %e, "Failed to close writers");
                    }
                    return Err(fatal);
                }
            }
        }
        state.writers_mut().end_program().await?;
        tracing::info!(errors = state.errors().reported(), "Program finished");
        Ok(())
    }
}
