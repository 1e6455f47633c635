//! Block number specifications: how a scan bound is computed and when a scan
//! stops.

use std::fmt;

use crate::accessor::ValueAccessor;
use crate::error::{BuildError, BuildErrorKind, ExecutionError};
use crate::state::RunState;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockNumberKind {
    /// A literal number or a variable.
    Number,
    /// The chain head.
    Current,
    /// The genesis block.
    Earliest,
    /// Unbounded; follows the chain head.
    Continuous,
}

impl fmt::Display for BlockNumberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Number => "NUMBER",
            Self::Current => "CURRENT",
            Self::Earliest => "EARLIEST",
            Self::Continuous => "CONTINUOUS",
        })
    }
}

/// One bound of a block range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockNumberSpecification {
    kind: BlockNumberKind,
    accessor: Option<ValueAccessor>,
}

impl BlockNumberSpecification {
    pub fn of_block_number(accessor: ValueAccessor) -> Self {
        Self {
            kind: BlockNumberKind::Number,
            accessor: Some(accessor),
        }
    }

    pub fn of_current() -> Self {
        Self {
            kind: BlockNumberKind::Current,
            accessor: None,
        }
    }

    pub fn of_earliest() -> Self {
        Self {
            kind: BlockNumberKind::Earliest,
            accessor: Some(ValueAccessor::literal(0u64)),
        }
    }

    pub fn of_continuous() -> Self {
        Self {
            kind: BlockNumberKind::Continuous,
            accessor: None,
        }
    }

    pub fn kind(&self) -> BlockNumberKind {
        self.kind
    }

    pub fn is_continuous(&self) -> bool {
        self.kind == BlockNumberKind::Continuous
    }

    /// Evaluate the bound. `None` if the accessor yields null.
    ///
    /// CURRENT and CONTINUOUS both resolve to the chain head at the time of
    /// the call.
    async fn evaluate(&self, state: &RunState) -> Result<Option<u64>, ExecutionError> {
        match (&self.kind, &self.accessor) {
            (BlockNumberKind::Current | BlockNumberKind::Continuous, _) => {
                Ok(Some(state.chain()?.block_number().await?))
            }
            (_, Some(accessor)) => match accessor.get_value(state)? {
                Value::Null => Ok(None),
                value => value.as_block_number().map(Some),
            },
            (_, None) => Ok(None),
        }
    }

    /// Resolve the first block number of a scan.
    pub async fn resolve_lower(&self, state: &RunState) -> Result<u64, ExecutionError> {
        self.evaluate(state).await?.ok_or_else(|| {
            ExecutionError::type_mismatch("block number", Value::Null.to_string())
        })
    }

    /// A fresh stop criterion for one scan using this specification as the
    /// upper bound.
    pub fn stop_criterion(&self) -> StopCriterion {
        match self.kind {
            BlockNumberKind::Continuous => StopCriterion::Never,
            _ => StopCriterion::Unresolved(self.clone()),
        }
    }
}

impl fmt::Display for BlockNumberSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.accessor) {
            (BlockNumberKind::Number, Some(ValueAccessor::Literal(value))) => write!(f, "{value}"),
            (BlockNumberKind::Number, Some(accessor)) => {
                write!(f, "{}", accessor.variable_name().unwrap_or("?"))
            }
            (kind, _) => write!(f, "{kind}"),
        }
    }
}

/// Decides per block number whether a scan continues.
///
/// The bound is evaluated on the first call and cached for the rest of the
/// scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopCriterion {
    Never,
    Unresolved(BlockNumberSpecification),
    /// `None` when the bound evaluated to null; the scan stops.
    Resolved(Option<u64>),
}

impl StopCriterion {
    /// `true` while `current` is within the bound.
    pub async fn keep_going(&mut self, state: &RunState, current: u64) -> Result<bool, ExecutionError> {
        let bound = match self {
            Self::Never => return Ok(true),
            Self::Resolved(bound) => *bound,
            Self::Unresolved(spec) => {
                let bound = spec.evaluate(state).await?;
                tracing::debug!(bound = ?bound, spec = %spec, "Resolved upper bound");
                *self = Self::Resolved(bound);
                bound
            }
        };
        Ok(bound.is_some_and(|bound| bound >= current))
    }

    /// The cached bound, once resolved.
    pub fn resolved_bound(&self) -> Option<Option<u64>> {
        match self {
            Self::Resolved(bound) => Some(*bound),
            _ => None,
        }
    }
}

/// The `from`/`to` pair of a block range filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRange {
    pub from: BlockNumberSpecification,
    pub to: BlockNumberSpecification,
}

impl BlockRange {
    pub fn new(from: BlockNumberSpecification, to: BlockNumberSpecification) -> Result<Self, BuildError> {
        if to.kind == BlockNumberKind::Earliest {
            return Err(BuildErrorKind::InvalidRange("EARLIEST cannot be an upper bound".into()).into());
        }
        if let (Some(ValueAccessor::Literal(a)), Some(ValueAccessor::Literal(b))) =
            (&from.accessor, &to.accessor)
        {
            if let (Ok(a), Ok(b)) = (a.as_block_number(), b.as_block_number()) {
                if a > b {
                    return Err(BuildErrorKind::InvalidRange(format!("{a} is after {b}")).into());
                }
            }
        }
        Ok(Self { from, to })
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;

    #[tokio::test]
    async fn bound_is_cached_for_the_scan() {
        let mut state = RunState::new(RunConfig::default());
        state.set_variable("end", Value::Int(10));
        let spec = BlockNumberSpecification::of_block_number(ValueAccessor::of_variable("end"));
        let mut criterion = spec.stop_criterion();

        assert!(criterion.keep_going(&state, 10).await.unwrap());
        state.set_variable("end", Value::Int(1000));
        assert!(!criterion.keep_going(&state, 11).await.unwrap());
        assert_eq!(criterion.resolved_bound(), Some(Some(10)));

        // A new scan re-resolves.
        let mut next = spec.stop_criterion();
        assert!(next.keep_going(&state, 11).await.unwrap());
    }

    #[tokio::test]
    async fn null_bound_stops_immediately() {
        let mut state = RunState::new(RunConfig::default());
        state.set_variable("end", Value::Null);
        let spec = BlockNumberSpecification::of_block_number(ValueAccessor::of_variable("end"));
        let mut criterion = spec.stop_criterion();
        assert!(!criterion.keep_going(&state, 0).await.unwrap());
    }

    #[tokio::test]
    async fn continuous_never_stops() {
        let state = RunState::new(RunConfig::default());
        let mut criterion = BlockNumberSpecification::of_continuous().stop_criterion();
        assert!(criterion.keep_going(&state, u64::MAX).await.unwrap());
        assert_eq!(criterion.resolved_bound(), None);
    }

    #[tokio::test]
    async fn earliest_lower_bound_is_zero() {
        let state = RunState::new(RunConfig::default());
        assert_eq!(
            BlockNumberSpecification::of_earliest().resolve_lower(&state).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn current_requires_a_chain() {
        let state = RunState::new(RunConfig::default());
        assert!(BlockNumberSpecification::of_current().resolve_lower(&state).await.is_err());
    }

    #[test]
    fn invalid_ranges() {
        let n = |i: u64| BlockNumberSpecification::of_block_number(ValueAccessor::literal(i));
        assert!(BlockRange::new(n(1), BlockNumberSpecification::of_earliest()).is_err());
        assert!(BlockRange::new(n(5), n(3)).is_err());
        let range = BlockRange::new(BlockNumberSpecification::of_earliest(), n(3)).unwrap();
        assert_eq!(range.to_string(), "EARLIEST..3");
        assert!(BlockRange::new(BlockNumberSpecification::of_continuous(), BlockNumberSpecification::of_continuous()).is_ok());
    }
}
