//! Boolean predicates over value accessors.

mod builder;

pub use builder::{Operand, PredicateBuilder};

use std::cmp::Ordering;
use std::fmt;

use crate::accessor::ValueAccessor;
use crate::error::{BuildError, BuildErrorKind, ExecutionError};
use crate::state::RunState;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    /// Left operand is an element of the right (list) operand.
    In,
}

impl Comparator {
    pub fn parse(symbol: &str) -> Result<Self, BuildError> {
        match symbol.trim() {
            "==" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            "in" => Ok(Self::In),
            other => Err(BuildErrorKind::UnsupportedComparator(other.to_string()).into()),
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::In => "in",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A boolean expression tree. Leaves are value accessors; type errors
/// surface at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Comparison {
        op: Comparator,
        left: ValueAccessor,
        right: ValueAccessor,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    /// A boolean-valued accessor used directly as a condition.
    BooleanAccessor(ValueAccessor),
}

impl Predicate {
    pub fn compare(op: Comparator, left: ValueAccessor, right: ValueAccessor) -> Self {
        Self::Comparison { op, left, right }
    }

    pub fn and(self, other: Predicate) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Evaluate against the run state. `And`/`Or` short-circuit.
    pub fn evaluate(&self, state: &RunState) -> Result<bool, ExecutionError> {
        match self {
            Self::Comparison { op, left, right } => {
                let left = left.get_value(state)?;
                let right = right.get_value(state)?;
                match op {
                    Comparator::Eq => left.equals(&right),
                    Comparator::Ne => left.equals(&right).map(|eq| !eq),
                    Comparator::In => right.contains(&left),
                    Comparator::Gt => Ok(left.compare(&right)? == Ordering::Greater),
                    Comparator::Ge => Ok(left.compare(&right)? != Ordering::Less),
                    Comparator::Lt => Ok(left.compare(&right)? == Ordering::Less),
                    Comparator::Le => Ok(left.compare(&right)? != Ordering::Greater),
                }
            }
            Self::And(a, b) => Ok(a.evaluate(state)? && b.evaluate(state)?),
            Self::Or(a, b) => Ok(a.evaluate(state)? || b.evaluate(state)?),
            Self::Not(p) => Ok(!p.evaluate(state)?),
            Self::BooleanAccessor(accessor) => accessor.get_value(state)?.as_bool(),
        }
    }
}
