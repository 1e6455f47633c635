use crate::accessor::ValueAccessor;
use crate::error::{BuildError, BuildErrorKind};
use crate::value::Value;

use super::{Comparator, Predicate};

/// An entry of the builder's operand stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Value(ValueAccessor),
    Predicate(Predicate),
}

impl Operand {
    /// Turn the operand into a predicate, wrapping a bare accessor as a
    /// boolean accessor. Literals that are not booleans are rejected.
    fn into_predicate(self) -> Result<Predicate, BuildError> {
        match self {
            Operand::Predicate(p) => Ok(p),
            Operand::Value(ValueAccessor::Literal(value)) if !matches!(value, Value::Bool(_)) => {
                Err(BuildErrorKind::RequiresPredicate.into())
            }
            Operand::Value(accessor) => Ok(Predicate::BooleanAccessor(accessor)),
        }
    }
}

/// Assembles a [`Predicate`] bottom-up from exit events of a boolean
/// expression.
///
/// Operands are pushed as they are seen; each exit event reduces the top of
/// the stack. Any failure clears the stack so the builder can be reused.
#[derive(Debug, Default)]
pub struct PredicateBuilder {
    operands: Vec<Operand>,
}

impl PredicateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.operands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operands.is_empty()
    }

    pub fn push_value(&mut self, accessor: ValueAccessor) {
        self.operands.push(Operand::Value(accessor));
    }

    /// Reduce the two topmost operands into a comparison. The operand pushed
    /// first is the left-hand side.
    pub fn exit_comparison(&mut self, op: Comparator) -> Result<(), BuildError> {
        let result = self.pop_pair().and_then(|(left, right)| match (left, right) {
            (Operand::Value(left), Operand::Value(right)) => Ok(Predicate::compare(op, left, right)),
            _ => Err(BuildErrorKind::CanOnlyCompareValues.into()),
        });
        self.reduce(result)
    }

    pub fn exit_and(&mut self) -> Result<(), BuildError> {
        let result = self.pop_predicates().map(|(left, right)| left.and(right));
        self.reduce(result)
    }

    pub fn exit_or(&mut self) -> Result<(), BuildError> {
        let result = self.pop_predicates().map(|(left, right)| left.or(right));
        self.reduce(result)
    }

    pub fn exit_not(&mut self) -> Result<(), BuildError> {
        let result = self
            .pop()
            .and_then(Operand::into_predicate)
            .map(Predicate::negate);
        self.reduce(result)
    }

    /// Take the finished predicate. Exactly one operand must remain.
    pub fn finish(&mut self) -> Result<Predicate, BuildError> {
        if self.operands.len() != 1 {
            tracing::debug!(operands = self.operands.len(), "Unbalanced boolean expression");
            self.operands.clear();
            return Err(BuildErrorKind::BooleanExpressionTree.into());
        }
        let result = self.pop().and_then(Operand::into_predicate);
        if result.is_err() {
            self.operands.clear();
        }
        result
    }

    fn pop(&mut self) -> Result<Operand, BuildError> {
        self.operands
            .pop()
            .ok_or_else(|| BuildErrorKind::BooleanExpressionTree.into())
    }

    fn pop_pair(&mut self) -> Result<(Operand, Operand), BuildError> {
        let right = self.pop()?;
        let left = self.pop()?;
        Ok((left, right))
    }

    fn pop_predicates(&mut self) -> Result<(Predicate, Predicate), BuildError> {
        let (left, right) = self.pop_pair()?;
        Ok((left.into_predicate()?, right.into_predicate()?))
    }

    fn reduce(&mut self, result: Result<Predicate, BuildError>) -> Result<(), BuildError> {
        match result {
            Ok(predicate) => {
                self.operands.push(Operand::Predicate(predicate));
                Ok(())
            }
            Err(err) => {
                self.operands.clear();
                Err(err)
            }
        }
    }
}
