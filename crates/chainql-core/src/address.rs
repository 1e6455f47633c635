//! Address list criteria for transaction and log entry filters.

use crate::error::ExecutionError;
use crate::state::RunState;
use crate::value::Value;

/// Which addresses a filter accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressListSpecification {
    /// Every address, including none (contract creations).
    Any,
    Addresses(Vec<String>),
    /// A variable holding one address or a list of addresses.
    Variable(String),
}

impl AddressListSpecification {
    pub fn of_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Addresses(addresses.into_iter().map(Into::into).collect())
    }

    /// Case-insensitive membership test. `None` only matches [`Self::Any`].
    pub fn matches(&self, state: &RunState, address: Option<&str>) -> Result<bool, ExecutionError> {
        let address = match (self, address) {
            (Self::Any, _) => return Ok(true),
            (_, None) => return Ok(false),
            (_, Some(address)) => address,
        };
        match self {
            Self::Addresses(list) => Ok(list.iter().any(|a| a.eq_ignore_ascii_case(address))),
            Self::Variable(name) => {
                let value = state
                    .variable(name)
                    .ok_or_else(|| ExecutionError::UnknownVariable(name.clone()))?;
                match value {
                    Value::List(items) => {
                        for item in items {
                            if item.as_text()?.eq_ignore_ascii_case(address) {
                                return Ok(true);
                            }
                        }
                        Ok(false)
                    }
                    other => Ok(other.as_text()?.eq_ignore_ascii_case(address)),
                }
            }
            Self::Any => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;

    #[test]
    fn literal_list_is_case_insensitive() {
        let state = RunState::new(RunConfig::default());
        let spec = AddressListSpecification::of_addresses(["0xABC"]);
        assert!(spec.matches(&state, Some("0xabc")).unwrap());
        assert!(!spec.matches(&state, Some("0xdef")).unwrap());
        assert!(!spec.matches(&state, None).unwrap());
        assert!(AddressListSpecification::Any.matches(&state, None).unwrap());
    }

    #[test]
    fn variable_holding_list() {
        let mut state = RunState::new(RunConfig::default());
        let spec = AddressListSpecification::Variable("watched".into());
        assert!(spec.matches(&state, Some("0x1")).is_err());

        state.set_variable(
            "watched",
            Value::List(vec![Value::Address("0xAA".into()), Value::Address("0xbb".into())]),
        );
        assert!(spec.matches(&state, Some("0xBB")).unwrap());
        state.set_variable("watched", Value::Int(3));
        assert!(spec.matches(&state, Some("0xBB")).is_err());
    }
}
