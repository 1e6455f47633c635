//! Run-time values and their type keywords.
//!
//! Every accessor, predicate leaf, and built-in method works on [`Value`].
//! Integers that fit in `i128` are kept native; larger ABI integers are kept
//! as decimal strings and widened to 256 bits only when compared.

use std::cmp::Ordering;
use std::fmt;

use alloy_primitives::I256;
use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;

/// A value produced by an accessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i128),
    /// Integers beyond `i128`, as a decimal string.
    BigInt(String),
    Str(String),
    Bytes(Vec<u8>),
    /// 20-byte address, `0x`-prefixed hex. Compared case-insensitively.
    Address(String),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Any,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) | Value::BigInt(_) => ValueType::Int,
            Value::Str(_) => ValueType::Str,
            Value::Bytes(_) => ValueType::Bytes,
            Value::Address(_) => ValueType::Address,
            Value::List(items) => ValueType::List(Box::new(
                items.first().map(Value::value_type).unwrap_or(ValueType::Any),
            )),
        }
    }

    pub fn as_bool(&self) -> Result<bool, ExecutionError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(ExecutionError::type_mismatch("bool", other.value_type().to_string())),
        }
    }

    pub fn as_int(&self) -> Result<i128, ExecutionError> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(ExecutionError::type_mismatch("int", other.value_type().to_string())),
        }
    }

    /// Interpret as a block number.
    pub fn as_block_number(&self) -> Result<u64, ExecutionError> {
        let n = self.as_int()?;
        u64::try_from(n).map_err(|_| ExecutionError::type_mismatch("block number", n.to_string()))
    }

    /// String-like content of `Str` and `Address` values.
    pub fn as_text(&self) -> Result<&str, ExecutionError> {
        match self {
            Value::Str(s) | Value::Address(s) => Ok(s),
            other => Err(ExecutionError::type_mismatch("string", other.value_type().to_string())),
        }
    }

    pub fn as_list(&self) -> Result<&[Value], ExecutionError> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(ExecutionError::type_mismatch("list", other.value_type().to_string())),
        }
    }

    fn as_i256(&self) -> Result<I256, ExecutionError> {
        match self {
            Value::Int(i) => I256::try_from(*i).map_err(|e| ExecutionError::Decode(e.to_string())),
            Value::BigInt(s) => {
                I256::from_dec_str(s).map_err(|e| ExecutionError::Decode(format!("{s}: {e}")))
            }
            other => Err(ExecutionError::type_mismatch("int", other.value_type().to_string())),
        }
    }

    /// Equality as used by `==`, `!=` and `in`.
    ///
    /// Addresses compare case-insensitively (also against strings), integers
    /// compare numerically. `Null` equals only `Null`. Any other pairing of
    /// different types is a type mismatch.
    pub fn equals(&self, other: &Value) -> Result<bool, ExecutionError> {
        match (self, other) {
            (Value::Null, Value::Null) => Ok(true),
            (Value::Null, _) | (_, Value::Null) => Ok(false),
            (Value::Int(a), Value::Int(b)) => Ok(a == b),
            (Value::Int(_) | Value::BigInt(_), Value::Int(_) | Value::BigInt(_)) => {
                Ok(self.as_i256()? == other.as_i256()?)
            }
            (Value::Address(a), Value::Address(b) | Value::Str(b))
            | (Value::Str(a), Value::Address(b)) => Ok(a.eq_ignore_ascii_case(b)),
            (Value::Str(a), Value::Str(b)) => Ok(a == b),
            (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
            (Value::Bytes(a), Value::Bytes(b)) => Ok(a == b),
            (Value::List(a), Value::List(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.iter().zip(b) {
                    if !x.equals(y)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (a, b) => Err(ExecutionError::type_mismatch(
                a.value_type().to_string(),
                b.value_type().to_string(),
            )),
        }
    }

    /// Ordering as used by `<`, `<=`, `>`, `>=`. Defined for integers and strings.
    pub fn compare(&self, other: &Value) -> Result<Ordering, ExecutionError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Int(_) | Value::BigInt(_), Value::Int(_) | Value::BigInt(_)) => {
                Ok(self.as_i256()?.cmp(&other.as_i256()?))
            }
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (a, b) => Err(ExecutionError::type_mismatch(
                a.value_type().to_string(),
                b.value_type().to_string(),
            )),
        }
    }

    /// Membership test for `in`. `self` must be a list.
    pub fn contains(&self, needle: &Value) -> Result<bool, ExecutionError> {
        for item in self.as_list()? {
            if item.equals(needle)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::BigInt(s) => write!(f, "{s}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Value::Address(a) => write!(f, "{a}"),
            Value::List(items) => {
                let parts: Vec<_> = items.iter().map(|x| x.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i128> for Value {
    fn from(i: i128) -> Self {
        Value::Int(i)
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        Value::Int(i as i128)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

// ─── ValueType ────────────────────────────────────────────────────────────────

/// Static type of a value as declared in a query or a built-in signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int,
    Str,
    Bytes,
    Address,
    List(Box<ValueType>),
    /// Wildcard used by built-in signatures.
    Any,
}

impl ValueType {
    /// Parse a type keyword: query keywords (`int`, `string`, ...) and
    /// Solidity type names (`uint256`, `bytes32`, `address[]`, ...).
    pub fn parse(keyword: &str) -> Option<ValueType> {
        let keyword = keyword.trim();
        if let Some(inner) = keyword.strip_suffix(']') {
            let open = inner.rfind('[')?;
            let size = &inner[open + 1..];
            if !size.is_empty() && !size.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            return ValueType::parse(&inner[..open]).map(|t| ValueType::List(Box::new(t)));
        }
        match keyword {
            "bool" => Some(ValueType::Bool),
            "string" => Some(ValueType::Str),
            "address" => Some(ValueType::Address),
            "any" => Some(ValueType::Any),
            "byte" | "bytes" => Some(ValueType::Bytes),
            "int" | "uint" => Some(ValueType::Int),
            k if sized(k, "uint") || sized(k, "int") => Some(ValueType::Int),
            k if sized(k, "bytes") => Some(ValueType::Bytes),
            _ => None,
        }
    }

    /// Returns `true` if an argument of type `actual` may be passed where
    /// `self` is declared.
    pub fn accepts(&self, actual: &ValueType) -> bool {
        match (self, actual) {
            (ValueType::Any, _) | (_, ValueType::Any) => true,
            (ValueType::List(a), ValueType::List(b)) => a.accepts(b),
            (ValueType::Str, ValueType::Address) => true,
            (a, b) => a == b,
        }
    }
}

fn sized(keyword: &str, prefix: &str) -> bool {
    keyword
        .strip_prefix(prefix)
        .map(|bits| !bits.is_empty() && bits.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Bool => write!(f, "bool"),
            ValueType::Int => write!(f, "int"),
            ValueType::Str => write!(f, "string"),
            ValueType::Bytes => write!(f, "bytes"),
            ValueType::Address => write!(f, "address"),
            ValueType::List(inner) => write!(f, "{inner}[]"),
            ValueType::Any => write!(f, "any"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_compare_case_insensitively() {
        let a = Value::Address("0xAbCd".into());
        assert!(a.equals(&Value::Address("0xabcd".into())).unwrap());
        assert!(a.equals(&Value::Str("0xABCD".into())).unwrap());
    }

    #[test]
    fn big_ints_compare_numerically() {
        let big = Value::BigInt("340282366920938463463374607431768211456".into()); // 2^128
        assert_eq!(big.compare(&Value::Int(5)).unwrap(), Ordering::Greater);
        assert!(!big.equals(&Value::Int(5)).unwrap());
    }

    #[test]
    fn mismatched_types_fail() {
        assert!(Value::Int(1).compare(&Value::Str("1".into())).is_err());
        assert!(Value::Bool(true).equals(&Value::Int(1)).is_err());
        assert!(!Value::Null.equals(&Value::Int(1)).unwrap());
    }

    #[test]
    fn membership() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert!(list.contains(&Value::Int(2)).unwrap());
        assert!(!list.contains(&Value::Int(3)).unwrap());
        assert!(Value::Int(1).contains(&Value::Int(1)).is_err());
    }

    #[test]
    fn parse_type_keywords() {
        assert_eq!(ValueType::parse("uint256"), Some(ValueType::Int));
        assert_eq!(ValueType::parse("bytes32"), Some(ValueType::Bytes));
        assert_eq!(
            ValueType::parse("address[]"),
            Some(ValueType::List(Box::new(ValueType::Address)))
        );
        assert_eq!(ValueType::parse("uint8[3]").map(|t| t.to_string()), Some("int[]".into()));
        assert_eq!(ValueType::parse("uintx"), None);
        assert_eq!(ValueType::parse("float"), None);
    }

    #[test]
    fn wildcard_accepts_everything() {
        assert!(ValueType::Any.accepts(&ValueType::Int));
        assert!(ValueType::List(Box::new(ValueType::Any))
            .accepts(&ValueType::List(Box::new(ValueType::Str))));
        assert!(!ValueType::Int.accepts(&ValueType::Str));
    }

    #[test]
    fn display_values() {
        assert_eq!(Value::Bytes(vec![0xde, 0xad]).to_string(), "0xdead");
        assert_eq!(Value::List(vec![Value::Int(1), "a".into()]).to_string(), "[1, a]");
    }
}
