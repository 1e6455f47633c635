//! Specification composer: assembles instructions bottom-up from scope
//! enter/exit events.
//!
//! Every open scope owns an instruction list and a build-state tag. Entering
//! a scope pushes both; closing it pops them, checks the tag, wraps the list
//! into the scope's filter instruction, and appends that to the parent list.

use std::fmt;

use crate::abi::{LogEntrySignature, SmartContractQuery};
use crate::accessor::ValueAccessor;
use crate::address::AddressListSpecification;
use crate::error::{BuildError, BuildErrorKind};
use crate::instruction::{
    BlockFilter, GenericFilter, Instruction, LogEntryFilter, Program, SmartContractFilter,
    TransactionFilter,
};
use crate::predicate::Predicate;
use crate::range::BlockRange;

/// Kind of an open scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Program,
    BlockRangeFilter,
    TransactionFilter,
    LogEntryFilter,
    SmartContractFilter,
    GenericFilter,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Program => "program",
            Self::BlockRangeFilter => "block range filter",
            Self::TransactionFilter => "transaction filter",
            Self::LogEntryFilter => "log entry filter",
            Self::SmartContractFilter => "smart contract filter",
            Self::GenericFilter => "generic filter",
        })
    }
}

#[derive(Debug, Default)]
pub struct SpecificationComposer {
    instruction_lists: Vec<Vec<Instruction>>,
    states: Vec<BuildState>,
}

impl SpecificationComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open scopes, including the program.
    pub fn depth(&self) -> usize {
        self.states.len()
    }

    pub fn current_state(&self) -> Option<BuildState> {
        self.states.last().copied()
    }

    // ─── Scope entry ──────────────────────────────────────────────────────────

    pub fn prepare_program_build(&mut self) -> Result<(), BuildError> {
        if !self.states.is_empty() {
            return Err(BuildErrorKind::ProgramAlreadyPrepared.into());
        }
        self.open(BuildState::Program);
        Ok(())
    }

    pub fn prepare_block_range_build(&mut self) -> Result<(), BuildError> {
        self.open_nested(BuildState::BlockRangeFilter)
    }

    pub fn prepare_transaction_filter_build(&mut self) -> Result<(), BuildError> {
        self.open_nested(BuildState::TransactionFilter)
    }

    pub fn prepare_log_entry_filter_build(&mut self) -> Result<(), BuildError> {
        self.open_nested(BuildState::LogEntryFilter)
    }

    pub fn prepare_smart_contract_filter_build(&mut self) -> Result<(), BuildError> {
        self.open_nested(BuildState::SmartContractFilter)
    }

    pub fn prepare_generic_filter_build(&mut self) -> Result<(), BuildError> {
        self.open_nested(BuildState::GenericFilter)
    }

    fn open_nested(&mut self, state: BuildState) -> Result<(), BuildError> {
        if self.states.is_empty() {
            return Err(BuildErrorKind::NoOpenScope.into());
        }
        self.open(state);
        Ok(())
    }

    fn open(&mut self, state: BuildState) {
        tracing::info!(scope = %state, depth = self.states.len(), "Prepare build");
        self.instruction_lists.push(Vec::new());
        self.states.push(state);
    }

    // ─── Leaves ───────────────────────────────────────────────────────────────

    /// Append an instruction to the innermost open scope.
    pub fn add_instruction(&mut self, instruction: Instruction) -> Result<(), BuildError> {
        let list = self
            .instruction_lists
            .last_mut()
            .ok_or_else(|| BuildError::from(BuildErrorKind::NoOpenScope))?;
        tracing::debug!(instruction = instruction.kind(), "Add instruction");
        list.push(instruction);
        Ok(())
    }

    // ─── Scope exit ───────────────────────────────────────────────────────────

    pub fn build_block_range_filter(&mut self, range: BlockRange) -> Result<(), BuildError> {
        let body = self.close(BuildState::BlockRangeFilter)?;
        self.add_instruction(Instruction::BlockFilter(BlockFilter { range, body }))
    }

    pub fn build_transaction_filter(
        &mut self,
        senders: AddressListSpecification,
        recipients: AddressListSpecification,
    ) -> Result<(), BuildError> {
        let body = self.close(BuildState::TransactionFilter)?;
        self.add_instruction(Instruction::TransactionFilter(TransactionFilter {
            senders,
            recipients,
            body,
        }))
    }

    pub fn build_log_entry_filter(
        &mut self,
        contracts: AddressListSpecification,
        signature: Option<LogEntrySignature>,
    ) -> Result<(), BuildError> {
        let body = self.close(BuildState::LogEntryFilter)?;
        self.add_instruction(Instruction::LogEntryFilter(LogEntryFilter {
            contracts,
            signature,
            body,
        }))
    }

    pub fn build_smart_contract_filter(
        &mut self,
        contract: ValueAccessor,
        queries: Vec<SmartContractQuery>,
    ) -> Result<(), BuildError> {
        let body = self.close(BuildState::SmartContractFilter)?;
        self.add_instruction(Instruction::SmartContractFilter(SmartContractFilter {
            contract,
            queries,
            body,
        }))
    }

    pub fn build_generic_filter(&mut self, predicate: Predicate) -> Result<(), BuildError> {
        let body = self.close(BuildState::GenericFilter)?;
        self.add_instruction(Instruction::GenericFilter(GenericFilter { predicate, body }))
    }

    /// Finish the program. Only the program scope may still be open.
    pub fn build_program(&mut self) -> Result<Program, BuildError> {
        match self.states.len() {
            0 => return Err(BuildErrorKind::NoOpenScope.into()),
            1 => {}
            n => return Err(BuildErrorKind::OpenScopes { open: n - 1 }.into()),
        }
        let instructions = self.close(BuildState::Program)?;
        tracing::info!(instructions = instructions.len(), "Program built");
        Ok(Program::new(instructions))
    }

    /// Pop the innermost scope, which must be `expected`.
    fn close(&mut self, expected: BuildState) -> Result<Vec<Instruction>, BuildError> {
        match self.states.last() {
            Some(found) if *found == expected => {}
            Some(found) => {
                return Err(BuildErrorKind::UnfinishedConstruction {
                    expected: expected.to_string(),
                    found: found.to_string(),
                }
                .into())
            }
            None => return Err(BuildErrorKind::NoOpenScope.into()),
        }
        self.states.pop();
        let list = self
            .instruction_lists
            .pop()
            .ok_or_else(|| BuildError::from(BuildErrorKind::NoOpenScope))?;
        tracing::info!(scope = %expected, instructions = list.len(), "Build");
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::ValueMutator;
    use crate::instruction::Assignment;
    use crate::range::BlockNumberSpecification;

    fn assignment() -> Instruction {
        Instruction::Assignment(Assignment {
            target: ValueMutator::of_variable("x").unwrap(),
            value: ValueAccessor::literal(1i128),
        })
    }

    fn range() -> BlockRange {
        BlockRange::new(
            BlockNumberSpecification::of_earliest(),
            BlockNumberSpecification::of_block_number(ValueAccessor::literal(3u64)),
        )
        .unwrap()
    }

    #[test]
    fn nested_scopes_build_bottom_up() {
        let mut composer = SpecificationComposer::new();
        composer.prepare_program_build().unwrap();
        composer.prepare_block_range_build().unwrap();
        composer.prepare_transaction_filter_build().unwrap();
        composer.add_instruction(assignment()).unwrap();
        composer
            .build_transaction_filter(AddressListSpecification::Any, AddressListSpecification::Any)
            .unwrap();
        composer.build_block_range_filter(range()).unwrap();
        composer.add_instruction(assignment()).unwrap();

        let program = composer.build_program().unwrap();
        assert_eq!(program.instructions().len(), 2);
        let Instruction::BlockFilter(block) = &program.instructions()[0] else {
            panic!("expected a block filter");
        };
        let Instruction::TransactionFilter(tx) = &block.body[0] else {
            panic!("expected a transaction filter");
        };
        assert_eq!(tx.body.len(), 1);
        assert_eq!(composer.depth(), 0);
    }

    #[test]
    fn mismatched_exit_is_rejected() {
        let mut composer = SpecificationComposer::new();
        composer.prepare_program_build().unwrap();
        composer.prepare_block_range_build().unwrap();
        composer.prepare_log_entry_filter_build().unwrap();
        let err = composer.build_block_range_filter(range()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "construction of log entry filter has not been finished (expected block range filter)"
        );
    }

    #[test]
    fn program_requires_all_scopes_closed() {
        let mut composer = SpecificationComposer::new();
        composer.prepare_program_build().unwrap();
        composer.prepare_generic_filter_build().unwrap();
        assert_eq!(
            composer.build_program().unwrap_err().kind,
            BuildErrorKind::OpenScopes { open: 1 }
        );
    }

    #[test]
    fn instructions_need_an_open_scope() {
        let mut composer = SpecificationComposer::new();
        assert_eq!(
            composer.add_instruction(assignment()).unwrap_err().kind,
            BuildErrorKind::NoOpenScope
        );
        assert!(composer.prepare_block_range_build().is_err());
        composer.prepare_program_build().unwrap();
        assert_eq!(
            composer.prepare_program_build().unwrap_err().kind,
            BuildErrorKind::ProgramAlreadyPrepared
        );
    }
}
