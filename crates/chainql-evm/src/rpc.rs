//! JSON-RPC 2.0 envelopes and transport failures.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use chainql_core::ChainError;

#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> RpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// The `error` member of a failed response.
#[derive(Debug, Clone, PartialEq, Deserialize, Error)]
#[error("JSON-RPC error {code}: {message}")]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    /// The result, `Value::Null` when absent.
    pub fn into_result(self) -> Result<Value, RpcErrorObject> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Why a single request failed.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, timeout, or non-2xx status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The node answered with an error object.
    #[error(transparent)]
    Rpc(#[from] RpcErrorObject),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl TransportError {
    /// Node-side errors are deterministic; only transport failures are
    /// retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

impl From<TransportError> for ChainError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Malformed(msg) => ChainError::InvalidResponse(msg),
            other => ChainError::Rpc(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_envelope() {
        let req = RpcRequest::new(7, "eth_getBlockByNumber", json!(["0x10", true]));
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({ "jsonrpc": "2.0", "id": 7, "method": "eth_getBlockByNumber", "params": ["0x10", true] })
        );
    }

    #[test]
    fn error_response() {
        let resp: RpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32000, "message": "execution reverted" }
        }))
        .unwrap();
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.code, -32000);
        assert!(!TransportError::from(err).is_retryable());
    }

    #[test]
    fn missing_result_is_null() {
        let resp: RpcResponse = serde_json::from_value(json!({ "jsonrpc": "2.0", "id": 1, "result": null })).unwrap();
        assert_eq!(resp.into_result().unwrap(), Value::Null);
    }
}
