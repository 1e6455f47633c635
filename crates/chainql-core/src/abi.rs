//! EVM ABI plumbing: event signatures, smart-contract calls, and conversion
//! between [`Value`] and alloy's dynamic ABI values.

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{Address, FixedBytes, I256, U256};
use tiny_keccak::{Hasher, Keccak};

use crate::accessor::ValueAccessor;
use crate::chain::LogEntry;
use crate::error::{BuildError, BuildErrorKind, ExecutionError};
use crate::state::RunState;
use crate::value::{Value, ValueType};

/// keccak256 of `bytes`.
pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(bytes);
    hasher.finalize(&mut output);
    output
}

fn parse_sol_type(solidity_type: &str) -> Result<DynSolType, BuildError> {
    solidity_type
        .trim()
        .parse::<DynSolType>()
        .map_err(|_| BuildErrorKind::UnsupportedType(solidity_type.to_string()).into())
}

/// A named, typed ABI parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpecification {
    pub name: String,
    pub indexed: bool,
    sol_type: DynSolType,
}

impl ParameterSpecification {
    pub fn new(name: &str, solidity_type: &str, indexed: bool) -> Result<Self, BuildError> {
        let sol_type = parse_sol_type(solidity_type)?;
        Ok(Self {
            name: name.to_string(),
            indexed,
            sol_type,
        })
    }

    /// Canonical Solidity type name, e.g. `uint256`.
    pub fn type_name(&self) -> String {
        self.sol_type.sol_type_name().into_owned()
    }

    pub fn value_type(&self) -> ValueType {
        ValueType::parse(&self.type_name()).unwrap_or(ValueType::Any)
    }
}

// ─── Log entry signatures ─────────────────────────────────────────────────────

/// An event signature a log entry filter matches against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntrySignature {
    pub name: String,
    pub parameters: Vec<ParameterSpecification>,
    topic0: String,
}

impl LogEntrySignature {
    pub fn new(name: &str, parameters: Vec<ParameterSpecification>) -> Self {
        let mut signature = Self {
            name: name.to_string(),
            parameters,
            topic0: String::new(),
        };
        signature.topic0 = format!("0x{}", hex::encode(keccak256(signature.canonical().as_bytes())));
        signature
    }

    /// `Name(type1,type2,...)`.
    pub fn canonical(&self) -> String {
        let types: Vec<String> = self.parameters.iter().map(|p| p.type_name()).collect();
        format!("{}({})", self.name, types.join(","))
    }

    /// `0x`-prefixed keccak256 of the canonical signature.
    pub fn topic0(&self) -> &str {
        &self.topic0
    }

    fn indexed_count(&self) -> usize {
        self.parameters.iter().filter(|p| p.indexed).count()
    }

    /// `true` if the log was emitted by this event. Indexed/non-indexed
    /// layouts of the same canonical signature are told apart by the
    /// number of topics.
    pub fn matches(&self, log: &LogEntry) -> bool {
        match log.topics.first() {
            Some(topic) => {
                topic.eq_ignore_ascii_case(&self.topic0) && log.topics.len() == self.indexed_count() + 1
            }
            None => false,
        }
    }

    /// Decode the parameters of a matching log into `(name, value)` pairs in
    /// declaration order.
    ///
    /// Indexed reference types (strings, bytes, arrays, tuples) are stored
    /// hashed in their topic and come back as the raw 32-byte hash.
    pub fn decode(&self, log: &LogEntry) -> Result<Vec<(String, Value)>, ExecutionError> {
        let data_types: Vec<DynSolType> = self
            .parameters
            .iter()
            .filter(|p| !p.indexed)
            .map(|p| p.sol_type.clone())
            .collect();
        let data_values = if data_types.is_empty() {
            Vec::new()
        } else {
            match DynSolType::Tuple(data_types).abi_decode_params(&log.data) {
                Ok(DynSolValue::Tuple(values)) => values,
                Ok(other) => vec![other],
                Err(e) => return Err(ExecutionError::Decode(format!("{}: data: {e}", self.name))),
            }
        };
        let mut data_values = data_values.into_iter();

        let mut topics = log.topics.iter().skip(1);
        let mut decoded = Vec::with_capacity(self.parameters.len());
        for param in &self.parameters {
            let value = if param.indexed {
                let topic = topics.next().ok_or_else(|| {
                    ExecutionError::Decode(format!("{}: missing topic for '{}'", self.name, param.name))
                })?;
                decode_topic(topic, &param.sol_type)?
            } else {
                data_values.next().map(to_value).ok_or_else(|| {
                    ExecutionError::Decode(format!("{}: missing data for '{}'", self.name, param.name))
                })?
            };
            decoded.push((param.name.clone(), value));
        }
        Ok(decoded)
    }
}

fn decode_topic(topic: &str, ty: &DynSolType) -> Result<Value, ExecutionError> {
    let hex_digits = topic.strip_prefix("0x").unwrap_or(topic);
    let bytes =
        hex::decode(hex_digits).map_err(|e| ExecutionError::Decode(format!("invalid topic hex: {e}")))?;
    match ty {
        DynSolType::String
        | DynSolType::Bytes
        | DynSolType::Array(_)
        | DynSolType::FixedArray(..)
        | DynSolType::Tuple(_) => Ok(Value::Bytes(bytes)),
        _ => ty
            .abi_decode(&bytes)
            .map(to_value)
            .map_err(|e| ExecutionError::Decode(format!("topic decode: {e}"))),
    }
}

// ─── Smart-contract queries ───────────────────────────────────────────────────

/// An accessor whose value is ABI-encoded as the given Solidity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedValueAccessor {
    pub accessor: ValueAccessor,
    sol_type: DynSolType,
}

impl TypedValueAccessor {
    pub fn new(solidity_type: &str, accessor: ValueAccessor) -> Result<Self, BuildError> {
        Ok(Self {
            accessor,
            sol_type: parse_sol_type(solidity_type)?,
        })
    }
}

/// One read against a contract: a public function or a public variable
/// getter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartContractQuery {
    pub name: String,
    inputs: Vec<TypedValueAccessor>,
    outputs: Vec<ParameterSpecification>,
    selector: [u8; 4],
}

impl SmartContractQuery {
    pub fn member_function(
        name: &str,
        inputs: Vec<TypedValueAccessor>,
        outputs: Vec<ParameterSpecification>,
    ) -> Result<Self, BuildError> {
        if outputs.is_empty() {
            return Err(BuildErrorKind::Other(format!("function '{name}' declares no outputs")).into());
        }
        let types: Vec<String> = inputs
            .iter()
            .map(|input| input.sol_type.sol_type_name().into_owned())
            .collect();
        let signature = format!("{name}({})", types.join(","));
        let hash = keccak256(signature.as_bytes());
        Ok(Self {
            name: name.to_string(),
            inputs,
            outputs,
            selector: [hash[0], hash[1], hash[2], hash[3]],
        })
    }

    /// A public state variable: a getter named like the variable, without
    /// inputs, whose single output is bound under the variable name.
    pub fn member_variable(output: ParameterSpecification) -> Result<Self, BuildError> {
        let name = output.name.clone();
        Self::member_function(&name, Vec::new(), vec![output])
    }

    pub fn selector(&self) -> [u8; 4] {
        self.selector
    }

    pub fn outputs(&self) -> &[ParameterSpecification] {
        &self.outputs
    }

    /// Selector followed by the ABI-encoded inputs.
    pub fn encode_call(&self, state: &RunState) -> Result<Vec<u8>, ExecutionError> {
        let mut args = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            let value = input.accessor.get_value(state)?;
            args.push(to_dyn(&value, &input.sol_type)?);
        }
        let mut calldata = self.selector.to_vec();
        calldata.extend_from_slice(&DynSolValue::Tuple(args).abi_encode_params());
        Ok(calldata)
    }

    /// Decode return data into `(output name, value)` pairs.
    pub fn decode_result(&self, data: &[u8]) -> Result<Vec<(String, Value)>, ExecutionError> {
        let types = self.outputs.iter().map(|o| o.sol_type.clone()).collect();
        let values = match DynSolType::Tuple(types).abi_decode_params(data) {
            Ok(DynSolValue::Tuple(values)) => values,
            Ok(other) => vec![other],
            Err(e) => return Err(ExecutionError::Decode(format!("{}: {e}", self.name))),
        };
        Ok(self
            .outputs
            .iter()
            .zip(values)
            .map(|(output, value)| (output.name.clone(), to_value(value)))
            .collect())
    }
}

// ─── Value conversion ─────────────────────────────────────────────────────────

/// Convert a decoded ABI value into a [`Value`].
pub fn to_value(value: DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(b),
        DynSolValue::Int(i, _) => match i128::try_from(i) {
            Ok(v) => Value::Int(v),
            Err(_) => Value::BigInt(i.to_string()),
        },
        DynSolValue::Uint(u, _) => match u128::try_from(u).ok().and_then(|v| i128::try_from(v).ok()) {
            Some(v) => Value::Int(v),
            None => Value::BigInt(u.to_string()),
        },
        DynSolValue::FixedBytes(word, size) => Value::Bytes(word[..size.min(32)].to_vec()),
        DynSolValue::Bytes(b) => Value::Bytes(b),
        DynSolValue::String(s) => Value::Str(s),
        DynSolValue::Address(a) => Value::Address(a.to_checksum(None)),
        DynSolValue::Array(values) | DynSolValue::FixedArray(values) | DynSolValue::Tuple(values) => {
            Value::List(values.into_iter().map(to_value).collect())
        }
        DynSolValue::Function(f) => Value::Bytes(f.to_vec()),
    }
}

/// Convert a [`Value`] into an ABI value of type `ty`.
pub fn to_dyn(value: &Value, ty: &DynSolType) -> Result<DynSolValue, ExecutionError> {
    let mismatch = || ExecutionError::type_mismatch(ty.sol_type_name().into_owned(), value.value_type().to_string());
    match (value, ty) {
        (Value::Bool(b), DynSolType::Bool) => Ok(DynSolValue::Bool(*b)),
        (Value::Int(i), DynSolType::Uint(bits)) => u128::try_from(*i)
            .map(|u| DynSolValue::Uint(U256::from(u), *bits))
            .map_err(|_| mismatch()),
        (Value::BigInt(s), DynSolType::Uint(bits)) => U256::from_str_radix(s, 10)
            .map(|u| DynSolValue::Uint(u, *bits))
            .map_err(|_| mismatch()),
        (Value::Int(i), DynSolType::Int(bits)) => I256::try_from(*i)
            .map(|v| DynSolValue::Int(v, *bits))
            .map_err(|_| mismatch()),
        (Value::BigInt(s), DynSolType::Int(bits)) => I256::from_dec_str(s)
            .map(|v| DynSolValue::Int(v, *bits))
            .map_err(|_| mismatch()),
        (Value::Address(s) | Value::Str(s), DynSolType::Address) => s
            .parse::<Address>()
            .map(DynSolValue::Address)
            .map_err(|_| mismatch()),
        (Value::Str(s), DynSolType::String) => Ok(DynSolValue::String(s.clone())),
        (Value::Bytes(b), DynSolType::Bytes) => Ok(DynSolValue::Bytes(b.clone())),
        (Value::Bytes(b), DynSolType::FixedBytes(size)) if b.len() <= *size => {
            Ok(DynSolValue::FixedBytes(FixedBytes::<32>::right_padding_from(b), *size))
        }
        (Value::List(items), DynSolType::Array(inner)) => items
            .iter()
            .map(|item| to_dyn(item, inner))
            .collect::<Result<Vec<_>, _>>()
            .map(DynSolValue::Array),
        (Value::List(items), DynSolType::FixedArray(inner, len)) if items.len() == *len => items
            .iter()
            .map(|item| to_dyn(item, inner))
            .collect::<Result<Vec<_>, _>>()
            .map(DynSolValue::FixedArray),
        (Value::List(items), DynSolType::Tuple(types)) if items.len() == types.len() => items
            .iter()
            .zip(types)
            .map(|(item, ty)| to_dyn(item, ty))
            .collect::<Result<Vec<_>, _>>()
            .map(DynSolValue::Tuple),
        _ => Err(mismatch()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;

    fn param(name: &str, ty: &str, indexed: bool) -> ParameterSpecification {
        ParameterSpecification::new(name, ty, indexed).unwrap()
    }

    fn transfer() -> LogEntrySignature {
        LogEntrySignature::new(
            "Transfer",
            vec![
                param("from", "address", true),
                param("to", "address", true),
                param("value", "uint", false),
            ],
        )
    }

    fn word(value: u64) -> Vec<u8> {
        let mut bytes = vec![0u8; 24];
        bytes.extend_from_slice(&value.to_be_bytes());
        bytes
    }

    fn address_topic(address: &str) -> String {
        format!("0x{}{}", "0".repeat(24), address.trim_start_matches("0x"))
    }

    #[test]
    fn transfer_topic0() {
        let signature = transfer();
        assert_eq!(signature.canonical(), "Transfer(address,address,uint256)");
        assert_eq!(
            signature.topic0(),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn decode_transfer_log() {
        let signature = transfer();
        let from = "0x1111111111111111111111111111111111111111";
        let to = "0x2222222222222222222222222222222222222222";
        let log = LogEntry {
            topics: vec![signature.topic0().to_uppercase().replace("0X", "0x"), address_topic(from), address_topic(to)],
            data: word(1_000),
            ..Default::default()
        };
        assert!(signature.matches(&log));

        let decoded = signature.decode(&log).unwrap();
        assert_eq!(decoded[0].0, "from");
        assert!(decoded[0].1.equals(&Value::Address(from.into())).unwrap());
        assert!(decoded[1].1.equals(&Value::Address(to.into())).unwrap());
        assert_eq!(decoded[2], ("value".to_string(), Value::Int(1_000)));
    }

    #[test]
    fn indexed_layout_must_match_topic_count() {
        let signature = LogEntrySignature::new(
            "Transfer",
            vec![
                param("from", "address", false),
                param("to", "address", false),
                param("value", "uint256", false),
            ],
        );
        let log = LogEntry {
            topics: vec![signature.topic0().to_string(), address_topic("0x01"), address_topic("0x02")],
            ..Default::default()
        };
        assert!(!signature.matches(&log));
    }

    #[test]
    fn indexed_string_is_raw_hash() {
        let signature = LogEntrySignature::new("Named", vec![param("name", "string", true)]);
        let hash = format!("0x{}", "ab".repeat(32));
        let log = LogEntry {
            topics: vec![signature.topic0().to_string(), hash],
            ..Default::default()
        };
        assert_eq!(signature.decode(&log).unwrap()[0].1, Value::Bytes(vec![0xab; 32]));
    }

    #[test]
    fn truncated_data_is_decode_error() {
        let signature = transfer();
        let log = LogEntry {
            topics: vec![signature.topic0().to_string(), address_topic("0x01"), address_topic("0x02")],
            data: vec![0u8; 4],
            ..Default::default()
        };
        assert!(matches!(signature.decode(&log), Err(ExecutionError::Decode(_))));
    }

    #[test]
    fn balance_of_call_roundtrip() {
        let owner = "0x1111111111111111111111111111111111111111";
        let query = SmartContractQuery::member_function(
            "balanceOf",
            vec![TypedValueAccessor::new("address", ValueAccessor::literal(Value::Address(owner.into()))).unwrap()],
            vec![param("balance", "uint256", false)],
        )
        .unwrap();
        assert_eq!(query.selector(), [0x70, 0xa0, 0x82, 0x31]);

        let state = RunState::new(RunConfig::default());
        let calldata = query.encode_call(&state).unwrap();
        assert_eq!(calldata.len(), 4 + 32);
        assert_eq!(&calldata[16..], &hex::decode(owner.trim_start_matches("0x")).unwrap()[..]);

        let decoded = query.decode_result(&word(42)).unwrap();
        assert_eq!(decoded, vec![("balance".to_string(), Value::Int(42))]);
    }

    #[test]
    fn member_variable_uses_getter_selector() {
        let query = SmartContractQuery::member_variable(param("totalSupply", "uint256", false)).unwrap();
        assert_eq!(query.selector(), [0x18, 0x16, 0x0d, 0xdd]);
    }

    #[test]
    fn value_conversion_rejects_mismatches() {
        assert!(to_dyn(&Value::Int(-1), &DynSolType::Uint(256)).is_err());
        assert!(to_dyn(&Value::Str("x".into()), &DynSolType::Bool).is_err());
        assert_eq!(
            to_value(to_dyn(&Value::Bytes(vec![1, 2]), &DynSolType::FixedBytes(2)).unwrap()),
            Value::Bytes(vec![1, 2])
        );
        assert!(ParameterSpecification::new("x", "uint7x", false).is_err());
    }
}
