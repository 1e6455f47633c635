//! Built-in methods callable from queries.
//!
//! Methods are resolved at compile time by name and argument types; an
//! argument whose type is only known at run time is passed as `any`.

use std::fmt;

use alloy_primitives::I256;
use chrono::DateTime;

use crate::error::{BuildError, BuildErrorKind, ExecutionError};
use crate::value::{Value, ValueType};

type MethodFn = fn(&[Value]) -> Result<Value, ExecutionError>;

struct Builtin {
    name: &'static str,
    params: &'static [&'static str],
    call: MethodFn,
}

const BUILTINS: &[Builtin] = &[
    Builtin { name: "add", params: &["int", "int"], call: add },
    Builtin { name: "subtract", params: &["int", "int"], call: subtract },
    Builtin { name: "multiply", params: &["int", "int"], call: multiply },
    Builtin { name: "divide", params: &["int", "int"], call: divide },
    Builtin { name: "concat", params: &["string", "string"], call: concat },
    Builtin { name: "lower", params: &["string"], call: lower },
    Builtin { name: "toString", params: &["any"], call: to_string },
    Builtin { name: "contains", params: &["any[]", "any"], call: contains },
    Builtin { name: "addElement", params: &["any[]", "any"], call: add_element },
    Builtin { name: "removeElement", params: &["any[]", "any"], call: remove_element },
    Builtin { name: "length", params: &["any[]"], call: length },
    Builtin { name: "newList", params: &[], call: new_list },
    Builtin { name: "fromUnix", params: &["int"], call: from_unix },
];

/// A resolved built-in method.
#[derive(Clone, Copy)]
pub struct Method {
    name: &'static str,
    call: MethodFn,
}

impl Method {
    /// Look up the built-in `name` accepting arguments of `arg_types`.
    pub fn resolve(name: &str, arg_types: &[ValueType]) -> Result<Self, BuildError> {
        BUILTINS
            .iter()
            .find(|builtin| {
                builtin.name == name
                    && builtin.params.len() == arg_types.len()
                    && builtin.params.iter().zip(arg_types).all(|(param, actual)| {
                        ValueType::parse(param).is_some_and(|declared| declared.accepts(actual))
                    })
            })
            .map(|builtin| Self {
                name: builtin.name,
                call: builtin.call,
            })
            .ok_or_else(|| {
                let signature: Vec<String> = arg_types.iter().map(ToString::to_string).collect();
                BuildErrorKind::UnknownMethod {
                    name: name.to_string(),
                    signature: signature.join(", "),
                }
                .into()
            })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, ExecutionError> {
        (self.call)(args)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method").field("name", &self.name).finish()
    }
}

fn failure(method: &str, reason: impl Into<String>) -> ExecutionError {
    ExecutionError::Method {
        method: method.to_string(),
        reason: reason.into(),
    }
}

fn arg<'a>(method: &str, args: &'a [Value], index: usize) -> Result<&'a Value, ExecutionError> {
    args.get(index)
        .ok_or_else(|| failure(method, format!("missing argument {}", index + 1)))
}

// ─── Arithmetic ───────────────────────────────────────────────────────────────

fn int(value: &Value) -> Result<I256, ExecutionError> {
    match value {
        Value::Int(i) => I256::try_from(*i).map_err(|e| ExecutionError::Decode(e.to_string())),
        Value::BigInt(s) => I256::from_dec_str(s).map_err(|e| ExecutionError::Decode(format!("{s}: {e}"))),
        other => Err(ExecutionError::type_mismatch("int", other.value_type().to_string())),
    }
}

fn narrow(value: I256) -> Value {
    match i128::try_from(value) {
        Ok(i) => Value::Int(i),
        Err(_) => Value::BigInt(value.to_string()),
    }
}

fn arithmetic(
    method: &str,
    args: &[Value],
    op: fn(I256, I256) -> Option<I256>,
) -> Result<Value, ExecutionError> {
    let a = int(arg(method, args, 0)?)?;
    let b = int(arg(method, args, 1)?)?;
    op(a, b)
        .map(narrow)
        .ok_or_else(|| failure(method, format!("overflow on {a} and {b}")))
}

fn add(args: &[Value]) -> Result<Value, ExecutionError> {
    arithmetic("add", args, I256::checked_add)
}

fn subtract(args: &[Value]) -> Result<Value, ExecutionError> {
    arithmetic("subtract", args, I256::checked_sub)
}

fn multiply(args: &[Value]) -> Result<Value, ExecutionError> {
    arithmetic("multiply", args, I256::checked_mul)
}

fn divide(args: &[Value]) -> Result<Value, ExecutionError> {
    if int(arg("divide", args, 1)?)? == I256::ZERO {
        return Err(failure("divide", "division by zero"));
    }
    arithmetic("divide", args, I256::checked_div)
}

// ─── Strings ──────────────────────────────────────────────────────────────────

fn concat(args: &[Value]) -> Result<Value, ExecutionError> {
    let a = arg("concat", args, 0)?.as_text()?;
    let b = arg("concat", args, 1)?.as_text()?;
    Ok(Value::Str(format!("{a}{b}")))
}

fn lower(args: &[Value]) -> Result<Value, ExecutionError> {
    Ok(Value::Str(arg("lower", args, 0)?.as_text()?.to_lowercase()))
}

fn to_string(args: &[Value]) -> Result<Value, ExecutionError> {
    Ok(Value::Str(arg("toString", args, 0)?.to_string()))
}

fn from_unix(args: &[Value]) -> Result<Value, ExecutionError> {
    let secs = arg("fromUnix", args, 0)?.as_int()?;
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|time| Value::Str(time.to_rfc3339()))
        .ok_or_else(|| failure("fromUnix", format!("{secs} is out of range")))
}

// ─── Lists ────────────────────────────────────────────────────────────────────

fn contains(args: &[Value]) -> Result<Value, ExecutionError> {
    let list = arg("contains", args, 0)?;
    list.contains(arg("contains", args, 1)?).map(Value::Bool)
}

fn add_element(args: &[Value]) -> Result<Value, ExecutionError> {
    let mut items = arg("addElement", args, 0)?.as_list()?.to_vec();
    items.push(arg("addElement", args, 1)?.clone());
    Ok(Value::List(items))
}

fn remove_element(args: &[Value]) -> Result<Value, ExecutionError> {
    let element = arg("removeElement", args, 1)?;
    let mut kept = Vec::new();
    for item in arg("removeElement", args, 0)?.as_list()? {
        if !item.equals(element)? {
            kept.push(item.clone());
        }
    }
    Ok(Value::List(kept))
}

fn length(args: &[Value]) -> Result<Value, ExecutionError> {
    Ok(Value::Int(arg("length", args, 0)?.as_list()?.len() as i128))
}

fn new_list(_args: &[Value]) -> Result<Value, ExecutionError> {
    Ok(Value::List(Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Result<Value, ExecutionError> {
        let types: Vec<ValueType> = args.iter().map(Value::value_type).collect();
        Method::resolve(name, &types).unwrap().invoke(args)
    }

    #[test]
    fn resolves_by_name_and_types() {
        assert!(Method::resolve("add", &[ValueType::Int, ValueType::Int]).is_ok());
        assert!(Method::resolve("add", &[ValueType::Any, ValueType::Int]).is_ok());
        let err = Method::resolve("add", &[ValueType::Str, ValueType::Int]).unwrap_err();
        assert_eq!(err.to_string(), "no built-in method 'add(string, int)'");
        assert!(Method::resolve("sqrt", &[ValueType::Int]).is_err());
        assert!(Method::resolve("length", &[ValueType::List(Box::new(ValueType::Address))]).is_ok());
    }

    #[test]
    fn arithmetic_widens_past_i128() {
        assert_eq!(call("add", &[Value::Int(2), Value::Int(3)]).unwrap(), Value::Int(5));
        assert_eq!(
            call("multiply", &[Value::Int(i128::MAX), Value::Int(2)]).unwrap(),
            Value::BigInt("340282366920938463463374607431768211454".into())
        );
        assert_eq!(call("divide", &[Value::Int(7), Value::Int(2)]).unwrap(), Value::Int(3));
        assert!(matches!(
            call("divide", &[Value::Int(7), Value::Int(0)]),
            Err(ExecutionError::Method { .. })
        ));
    }

    #[test]
    fn strings() {
        assert_eq!(
            call("concat", &["a".into(), "b".into()]).unwrap(),
            Value::Str("ab".into())
        );
        assert_eq!(call("lower", &["0xABC".into()]).unwrap(), Value::Str("0xabc".into()));
        assert_eq!(call("toString", &[Value::Int(12)]).unwrap(), Value::Str("12".into()));
        assert_eq!(
            call("fromUnix", &[Value::Int(86_400)]).unwrap(),
            Value::Str("1970-01-02T00:00:00+00:00".into())
        );
    }

    #[test]
    fn lists() {
        let empty = call("newList", &[]).unwrap();
        let one = call("addElement", &[empty, Value::Int(1)]).unwrap();
        let two = call("addElement", &[one, Value::Int(2)]).unwrap();
        assert_eq!(call("length", &[two.clone()]).unwrap(), Value::Int(2));
        assert_eq!(call("contains", &[two.clone(), Value::Int(2)]).unwrap(), Value::Bool(true));
        let removed = call("removeElement", &[two, Value::Int(1)]).unwrap();
        assert_eq!(removed, Value::List(vec![Value::Int(2)]));
    }
}
