//! JSON-RPC 2.0-flavored wire types shared by the HTTP and stdio transports
//! (SPEC_FULL.md §6 External Interfaces).

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INTERNAL_ERROR: i64 = -32603;
pub const INVALID_PARAMS: i64 = -32602;
pub const APPLICATION_ERROR: i64 = -32000;
pub const DAEMON_DEGRADED: i64 = -32001;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcResponse {
    pub fn ok(id: Value, result: Value) -> Self {
        RpcResponse {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Value, code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        RpcResponse {
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data,
            }),
        }
    }

    pub fn method_not_found(id: Value, method: &str) -> Self {
        Self::err(
            id,
            METHOD_NOT_FOUND,
            format!("method not found: {method}"),
            None,
        )
    }

    pub fn invalid_params(id: Value, message: impl Into<String>) -> Self {
        Self::err(id, INVALID_PARAMS, message, None)
    }

    /// Renders a crate-level `orc_core::Error` as a structured RPC error, attaching
    /// `error.kind` to `data` so clients can branch on the stable machine-readable name.
    pub fn from_error(id: Value, err: &crate::Error) -> Self {
        let code = match err {
            crate::Error::DaemonDown(_) => DAEMON_DEGRADED,
            _ => APPLICATION_ERROR,
        };
        Self::err(
            id,
            code,
            err.to_string(),
            Some(serde_json::json!({ "kind": err.kind() })),
        )
    }
}

/// Inbound message on the stdio transport: either a framed RPC call, or the initial
/// auth handshake a stdio subprocess performs before its first call.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IncomingMessage {
    Rpc(RpcRequest),
    Auth { token: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_response_omits_error_field() {
        let resp = RpcResponse::ok(Value::from(1), serde_json::json!({"a": 1}));
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("error").is_none());
    }

    #[test]
    fn method_not_found_uses_canonical_code() {
        let resp = RpcResponse::method_not_found(Value::from(1), "bogus");
        assert_eq!(resp.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[test]
    fn daemon_down_error_maps_to_degraded_code() {
        let err = crate::Error::DaemonDown("timeout".into());
        let resp = RpcResponse::from_error(Value::from(1), &err);
        assert_eq!(resp.error.unwrap().code, DAEMON_DEGRADED);
    }
}
