//! JSON-RPC 2.0 message types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error_codes;

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC ID (string or integer)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum JsonRpcId {
    String(String),
    Number(i64),
}

impl std::fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<i64> for JsonRpcId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for JsonRpcId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// Request carrying an id; expects exactly one response
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcRequest {
    pub id: JsonRpcId,
    pub method: String,
    pub params: Option<Value>,
}

/// Message without an id; never answered
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response
///
/// `id` is always present on the wire; it is `null` when the request's id
/// could not be read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<JsonRpcId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<JsonRpcId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<JsonRpcId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    /// A client's reply to a server request; the server sends none, so these
    /// are ignored
    Response(Option<JsonRpcId>),
}

/// A message that could not be decoded
///
/// Carries the request id when one could be read, so the error can still be
/// correlated.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeFailure {
    pub id: Option<JsonRpcId>,
    pub error: JsonRpcError,
}

impl DecodeFailure {
    fn new(id: Option<JsonRpcId>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            error: JsonRpcError::new(code, message),
        }
    }
}

/// Decode one raw JSON-RPC message
pub fn decode(raw: &str) -> Result<Incoming, DecodeFailure> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| DecodeFailure::new(None, error_codes::PARSE_ERROR, format!("Parse error: {}", e)))?;

    let obj = match value {
        Value::Object(obj) => obj,
        Value::Array(_) => {
            return Err(DecodeFailure::new(
                None,
                error_codes::INVALID_REQUEST,
                "Batch requests are not supported",
            ))
        }
        _ => {
            return Err(DecodeFailure::new(
                None,
                error_codes::INVALID_REQUEST,
                "Message must be a JSON object",
            ))
        }
    };

    let id = match obj.get("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(JsonRpcId::String(s.clone())),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(n) => Some(JsonRpcId::Number(n)),
            None => {
                return Err(DecodeFailure::new(
                    None,
                    error_codes::INVALID_REQUEST,
                    "Request id must be a string or an integer",
                ))
            }
        },
        Some(_) => {
            return Err(DecodeFailure::new(
                None,
                error_codes::INVALID_REQUEST,
                "Request id must be a string or an integer",
            ))
        }
    };

    if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(DecodeFailure::new(
            id,
            error_codes::INVALID_REQUEST,
            "Missing or unsupported jsonrpc version",
        ));
    }

    let params = obj.get("params").cloned().filter(|p| !p.is_null());

    match obj.get("method") {
        Some(Value::String(method)) => match id {
            Some(id) => Ok(Incoming::Request(JsonRpcRequest {
                id,
                method: method.clone(),
                params,
            })),
            None => Ok(Incoming::Notification(JsonRpcNotification::new(method, params))),
        },
        Some(_) => Err(DecodeFailure::new(
            id,
            error_codes::INVALID_REQUEST,
            "Method must be a string",
        )),
        None if obj.contains_key("result") || obj.contains_key("error") => Ok(Incoming::Response(id)),
        None => Err(DecodeFailure::new(
            id,
            error_codes::INVALID_REQUEST,
            "Message has no method",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_request_and_notification() {
        let msg = decode(r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#).unwrap();
        assert_eq!(
            msg,
            Incoming::Request(JsonRpcRequest {
                id: JsonRpcId::Number(7),
                method: "ping".to_string(),
                params: None,
            })
        );

        let msg = decode(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(matches!(msg, Incoming::Notification(n) if n.method == "notifications/initialized"));
    }

    #[test]
    fn test_decode_string_id_and_params() {
        let msg = decode(r#"{"jsonrpc":"2.0","id":"abc","method":"tools/call","params":{"name":"x"}}"#)
            .unwrap();
        match msg {
            Incoming::Request(req) => {
                assert_eq!(req.id, JsonRpcId::from("abc"));
                assert_eq!(req.params, Some(json!({"name": "x"})));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_has_no_id() {
        let failure = decode("{not json").unwrap_err();
        assert_eq!(failure.id, None);
        assert_eq!(failure.error.code, error_codes::PARSE_ERROR);
    }

    #[test]
    fn test_invalid_request_keeps_id() {
        let failure = decode(r#"{"jsonrpc":"1.0","id":3,"method":"ping"}"#).unwrap_err();
        assert_eq!(failure.id, Some(JsonRpcId::Number(3)));
        assert_eq!(failure.error.code, error_codes::INVALID_REQUEST);

        let failure = decode(r#"{"jsonrpc":"2.0","id":"q","method":5}"#).unwrap_err();
        assert_eq!(failure.id, Some(JsonRpcId::from("q")));

        let failure = decode(r#"[{"jsonrpc":"2.0","id":1,"method":"ping"}]"#).unwrap_err();
        assert_eq!(failure.error.code, error_codes::INVALID_REQUEST);
    }

    #[test]
    fn test_client_responses_recognized() {
        let msg = decode(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
        assert_eq!(msg, Incoming::Response(Some(JsonRpcId::Number(1))));
    }

    #[test]
    fn test_response_serializes_null_id() {
        let response = JsonRpcResponse::error(None, JsonRpcError::new(error_codes::PARSE_ERROR, "bad"));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], json!(-32700));
        assert!(value.get("result").is_none());
    }
}
