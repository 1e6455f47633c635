//! Value accessors and mutators: the leaves every instruction is built from.

use std::fmt;

use alloy_primitives::U256;

use crate::error::{BuildError, BuildErrorKind, ExecutionError};
use crate::state::RunState;
use crate::value::{Value, ValueType};

/// Reads a value against the run state. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueAccessor {
    /// Fixed value baked in at compile time.
    Literal(Value),
    /// User variable resolved against the variable store.
    Variable(String),
    /// Reserved name resolved against the block/transaction/log cursors.
    Blockchain(BlockchainVariable),
}

impl ValueAccessor {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Accessor for `name`, preferring a blockchain variable when the name is
    /// reserved.
    pub fn of_variable(name: &str) -> Self {
        match BlockchainVariable::from_name(name) {
            Some(var) => Self::Blockchain(var),
            None => Self::Variable(name.to_string()),
        }
    }

    /// Parse `text` as a literal of type `ty`.
    pub fn of_literal(ty: &ValueType, text: &str) -> Result<Self, BuildError> {
        parse_literal(ty, text).map(Self::Literal)
    }

    pub fn get_value(&self, state: &RunState) -> Result<Value, ExecutionError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Variable(name) => state
                .variable(name)
                .cloned()
                .ok_or_else(|| ExecutionError::UnknownVariable(name.clone())),
            Self::Blockchain(var) => var.read(state),
        }
    }

    /// The variable name this accessor reads, if any.
    pub fn variable_name(&self) -> Option<&str> {
        match self {
            Self::Literal(_) => None,
            Self::Variable(name) => Some(name),
            Self::Blockchain(var) => Some(var.name()),
        }
    }
}

/// Writes a value into the variable store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueMutator {
    Variable(String),
}

impl ValueMutator {
    /// Reserved blockchain variable names cannot be assigned.
    pub fn of_variable(name: &str) -> Result<Self, BuildError> {
        if BlockchainVariable::from_name(name).is_some() {
            return Err(BuildErrorKind::Other(format!(
                "cannot assign to blockchain variable '{name}'"
            ))
            .into());
        }
        Ok(Self::Variable(name.to_string()))
    }

    pub fn set_value(&self, state: &mut RunState, value: Value) {
        match self {
            Self::Variable(name) => state.set_variable(name.clone(), value),
        }
    }
}

// ─── Blockchain variables ─────────────────────────────────────────────────────

macro_rules! blockchain_variables {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Reserved variable names bound to the current block, transaction,
        /// or log entry.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum BlockchainVariable {
            $($variant,)*
        }

        impl BlockchainVariable {
            pub const ALL: &'static [BlockchainVariable] = &[$(BlockchainVariable::$variant,)*];

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$variant),)*
                    _ => None,
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }
        }
    };
}

blockchain_variables! {
    BlockNumber => "block.number",
    BlockHash => "block.hash",
    BlockParentHash => "block.parentHash",
    BlockTimestamp => "block.timestamp",
    BlockMiner => "block.miner",
    BlockGasUsed => "block.gasUsed",
    BlockGasLimit => "block.gasLimit",
    BlockTransactionCount => "block.transactionCount",
    TxHash => "tx.hash",
    TxFrom => "tx.from",
    TxTo => "tx.to",
    TxValue => "tx.value",
    TxGas => "tx.gas",
    TxGasPrice => "tx.gasPrice",
    TxNonce => "tx.nonce",
    TxInput => "tx.input",
    TxTransactionIndex => "tx.transactionIndex",
    TxBlockNumber => "tx.blockNumber",
    LogAddress => "log.address",
    LogLogIndex => "log.logIndex",
    LogData => "log.data",
    LogTransactionHash => "log.transactionHash",
    LogBlockNumber => "log.blockNumber",
    LogRemoved => "log.removed",
}

impl BlockchainVariable {
    pub fn read(&self, state: &RunState) -> Result<Value, ExecutionError> {
        use BlockchainVariable::*;
        match self {
            BlockNumber | BlockHash | BlockParentHash | BlockTimestamp | BlockMiner
            | BlockGasUsed | BlockGasLimit | BlockTransactionCount => {
                let block = state.current_block().ok_or(ExecutionError::MissingCursor("block"))?;
                Ok(match self {
                    BlockNumber => Value::from(block.number),
                    BlockHash => Value::Str(block.hash.clone()),
                    BlockParentHash => Value::Str(block.parent_hash.clone()),
                    BlockTimestamp => Value::Int(block.timestamp as i128),
                    BlockMiner => Value::Address(block.miner.clone()),
                    BlockGasUsed => uint(block.gas_used),
                    BlockGasLimit => uint(block.gas_limit),
                    _ => Value::from(block.transactions.len() as u64),
                })
            }
            TxHash | TxFrom | TxTo | TxValue | TxGas | TxGasPrice | TxNonce | TxInput
            | TxTransactionIndex | TxBlockNumber => {
                let tx = state
                    .current_transaction()
                    .ok_or(ExecutionError::MissingCursor("transaction"))?;
                Ok(match self {
                    TxHash => Value::Str(tx.hash.clone()),
                    TxFrom => Value::Address(tx.from.clone()),
                    TxTo => tx.to.clone().map(Value::Address).unwrap_or(Value::Null),
                    TxValue => decimal(&tx.value)?,
                    TxGas => uint(tx.gas),
                    TxGasPrice => uint(tx.gas_price),
                    TxNonce => Value::from(tx.nonce),
                    TxInput => Value::Str(tx.input.clone()),
                    TxTransactionIndex => Value::from(tx.transaction_index),
                    _ => Value::from(tx.block_number),
                })
            }
            LogAddress | LogLogIndex | LogData | LogTransactionHash | LogBlockNumber
            | LogRemoved => {
                let log = state.current_log().ok_or(ExecutionError::MissingCursor("log entry"))?;
                Ok(match self {
                    LogAddress => Value::Address(log.address.clone()),
                    LogLogIndex => Value::from(log.log_index),
                    LogData => Value::Bytes(log.data.clone()),
                    LogTransactionHash => Value::Str(log.transaction_hash.clone()),
                    LogBlockNumber => Value::from(log.block_number),
                    _ => Value::Bool(log.removed),
                })
            }
        }
    }
}

impl fmt::Display for BlockchainVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn uint(v: u128) -> Value {
    match i128::try_from(v) {
        Ok(i) => Value::Int(i),
        Err(_) => Value::BigInt(v.to_string()),
    }
}

fn decimal(s: &str) -> Result<Value, ExecutionError> {
    if let Ok(i) = s.parse::<i128>() {
        return Ok(Value::Int(i));
    }
    U256::from_str_radix(s, 10)
        .map(|u| Value::BigInt(u.to_string()))
        .map_err(|e| ExecutionError::Decode(format!("'{s}' is not a decimal integer: {e}")))
}

// ─── Literal parsing ──────────────────────────────────────────────────────────

/// Parse literal source text into a value of the declared type.
pub fn parse_literal(ty: &ValueType, text: &str) -> Result<Value, BuildError> {
    let text = text.trim();
    let unresolved = || BuildError::from(BuildErrorKind::UnresolvedLiteral(text.to_string()));
    match ty {
        ValueType::Bool => match text {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(unresolved()),
        },
        ValueType::Int => {
            let digits = text.strip_prefix('+').unwrap_or(text);
            if let Ok(i) = digits.parse::<i128>() {
                return Ok(Value::Int(i));
            }
            U256::from_str_radix(digits, 10)
                .map(|u| Value::BigInt(u.to_string()))
                .map_err(|_| unresolved())
        }
        ValueType::Str => unquote(text).ok_or_else(unresolved).map(Value::Str),
        ValueType::Bytes => {
            let hex_digits = text.strip_prefix("0x").ok_or_else(unresolved)?;
            hex::decode(hex_digits).map(Value::Bytes).map_err(|_| unresolved())
        }
        ValueType::Address => {
            let hex_digits = text.strip_prefix("0x").ok_or_else(unresolved)?;
            if hex_digits.len() != 40 || !hex_digits.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(unresolved());
            }
            Ok(Value::Address(text.to_string()))
        }
        ValueType::List(inner) => {
            let body = text
                .strip_prefix('[')
                .and_then(|t| t.strip_suffix(']'))
                .ok_or_else(unresolved)?;
            split_elements(body)
                .into_iter()
                .map(|element| parse_literal(inner, element))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List)
        }
        ValueType::Any => Err(BuildErrorKind::UnsupportedType(ty.to_string()).into()),
    }
}

/// Strip surrounding double quotes and resolve `\"` and `\\` escapes.
fn unquote(text: &str) -> Option<String> {
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(chars.next()?);
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Split a list body on top-level commas, ignoring commas inside strings.
pub(crate) fn split_elements(body: &str) -> Vec<&str> {
    if body.trim().is_empty() {
        return vec![];
    }
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            ',' if !in_string => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Block, Transaction};
    use crate::config::RunConfig;
    use std::sync::Arc;

    #[test]
    fn reserved_names_become_blockchain_variables() {
        assert_eq!(
            ValueAccessor::of_variable("tx.hash"),
            ValueAccessor::Blockchain(BlockchainVariable::TxHash)
        );
        assert_eq!(ValueAccessor::of_variable("amount"), ValueAccessor::Variable("amount".into()));
        assert!(ValueMutator::of_variable("block.number").is_err());
    }

    #[test]
    fn every_blockchain_variable_roundtrips_its_name() {
        for var in BlockchainVariable::ALL {
            assert_eq!(BlockchainVariable::from_name(var.name()), Some(*var));
        }
    }

    #[test]
    fn variables_resolve_against_store() {
        let mut state = RunState::new(RunConfig::default());
        let accessor = ValueAccessor::of_variable("amount");
        assert!(matches!(
            accessor.get_value(&state),
            Err(ExecutionError::UnknownVariable(_))
        ));
        ValueMutator::of_variable("amount").unwrap().set_value(&mut state, Value::Int(150));
        assert_eq!(accessor.get_value(&state).unwrap(), Value::Int(150));
    }

    #[test]
    fn cursor_variables_require_scope() {
        let mut state = RunState::new(RunConfig::default());
        let number = ValueAccessor::of_variable("block.number");
        assert!(matches!(
            number.get_value(&state),
            Err(ExecutionError::MissingCursor("block"))
        ));

        let tx = Arc::new(Transaction {
            hash: "0xfeed".into(),
            value: "1000000000000000000".into(),
            ..Default::default()
        });
        state.set_current_block(Some(Arc::new(Block {
            number: 42,
            transactions: vec![tx.clone()],
            ..Default::default()
        })));
        state.set_current_transaction(Some(tx));
        assert_eq!(number.get_value(&state).unwrap(), Value::Int(42));
        assert_eq!(
            ValueAccessor::of_variable("block.transactionCount").get_value(&state).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            ValueAccessor::of_variable("tx.value").get_value(&state).unwrap(),
            Value::Int(1_000_000_000_000_000_000)
        );
        assert_eq!(ValueAccessor::of_variable("tx.to").get_value(&state).unwrap(), Value::Null);
    }

    #[test]
    fn parse_scalar_literals() {
        assert_eq!(parse_literal(&ValueType::Bool, "true").unwrap(), Value::Bool(true));
        assert_eq!(parse_literal(&ValueType::Int, "-17").unwrap(), Value::Int(-17));
        assert_eq!(
            parse_literal(&ValueType::Int, "340282366920938463463374607431768211456").unwrap(),
            Value::BigInt("340282366920938463463374607431768211456".into())
        );
        assert_eq!(
            parse_literal(&ValueType::Str, r#""say \"hi\"""#).unwrap(),
            Value::Str(r#"say "hi""#.into())
        );
        assert_eq!(parse_literal(&ValueType::Bytes, "0xbeef").unwrap(), Value::Bytes(vec![0xbe, 0xef]));
        assert!(parse_literal(&ValueType::Address, "0x1234").is_err());
        assert!(parse_literal(&ValueType::Int, "12a").is_err());
    }

    #[test]
    fn parse_array_literals() {
        let ty = ValueType::List(Box::new(ValueType::Str));
        assert_eq!(
            parse_literal(&ty, r#"["a,b", "c"]"#).unwrap(),
            Value::List(vec!["a,b".into(), "c".into()])
        );
        let ints = ValueType::List(Box::new(ValueType::Int));
        assert_eq!(parse_literal(&ints, "[]").unwrap(), Value::List(vec![]));
        assert_eq!(
            parse_literal(&ints, "[1, 2,3]").unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }
}
