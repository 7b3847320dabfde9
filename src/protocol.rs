//! Wire codec: translates UTF-8 JSON text into the tagged `Message` union and
//! back. Variant discrimination is structural (presence of `method`/`id`), not
//! a declared `type` tag; see `Message::from_value`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INTERNAL_ERROR: i64 = -32603;

/// Opaque request identifier. Never interpreted, only compared for
/// correlation-table lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: RequestId, error: RpcError) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

fn jsonrpc_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// The tagged message union. Notifications carry no `id`; requests carry both
/// `method` and `id`; responses carry `id` plus exactly one of `result`/`error`.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Notification(Notification),
    Response(Response),
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed JSON-RPC message: {0}")]
    Malformed(String),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Message {
    /// Structural discrimination: `method` + `id` => Request, `method` alone
    /// => Notification, `id` + (`result` xor `error`) => Response.
    pub fn from_value(value: Value) -> Result<Self, CodecError> {
        let obj = value
            .as_object()
            .ok_or_else(|| CodecError::Malformed("top-level value is not an object".into()))?;

        let has_method = obj.contains_key("method");
        let has_id = obj.contains_key("id");
        let has_result = obj.contains_key("result");
        let has_error = obj.contains_key("error");

        if has_method && has_id {
            let req: Request = serde_json::from_value(value)?;
            return Ok(Message::Request(req));
        }
        if has_method && !has_id {
            let notif: Notification = serde_json::from_value(value)?;
            return Ok(Message::Notification(notif));
        }
        if has_id && (has_result ^ has_error) {
            let resp: Response = serde_json::from_value(value)?;
            return Ok(Message::Response(resp));
        }

        Err(CodecError::Malformed(
            "message matches neither Request, Notification nor Response shape".into(),
        ))
    }

    pub fn to_value(&self) -> Result<Value, CodecError> {
        let v = match self {
            Message::Request(r) => serde_json::to_value(r)?,
            Message::Notification(n) => serde_json::to_value(n)?,
            Message::Response(r) => serde_json::to_value(r)?,
        };
        Ok(v)
    }
}

pub fn decode(text: &str) -> Result<Message, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    Message::from_value(value)
}

pub fn encode(message: &Message) -> Result<String, CodecError> {
    let value = message.to_value()?;
    Ok(serde_json::to_string(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_request() {
        let text = r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#;
        match decode(text).unwrap() {
            Message::Request(r) => {
                assert_eq!(r.method, "ping");
                assert_eq!(r.id, RequestId::Number(1));
            }
            other => panic!("expected Request, got {other:?}"),
        }
    }

    #[test]
    fn decodes_notification() {
        let text = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        match decode(text).unwrap() {
            Message::Notification(n) => assert_eq!(n.method, "notifications/initialized"),
            other => panic!("expected Notification, got {other:?}"),
        }
    }

    #[test]
    fn decodes_success_response() {
        let text = r#"{"jsonrpc":"2.0","id":"abc","result":{"ok":true}}"#;
        match decode(text).unwrap() {
            Message::Response(r) => {
                assert_eq!(r.id, RequestId::String("abc".into()));
                assert!(r.error.is_none());
                assert_eq!(r.result, Some(json!({"ok": true})));
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn decodes_error_response() {
        let text = r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"no"}}"#;
        match decode(text).unwrap() {
            Message::Response(r) => {
                assert!(r.result.is_none());
                assert_eq!(r.error.unwrap().code, METHOD_NOT_FOUND);
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn rejects_response_with_both_result_and_error() {
        let text = r#"{"jsonrpc":"2.0","id":2,"result":{},"error":{"code":-1,"message":"x"}}"#;
        assert!(matches!(decode(text), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn rejects_shapeless_message() {
        let text = r#"{"jsonrpc":"2.0","foo":"bar"}"#;
        assert!(matches!(decode(text), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn encode_omits_absent_optional_fields() {
        let msg = Message::Request(Request {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: RequestId::Number(1),
            method: "ping".to_string(),
            params: None,
        });
        let text = encode(&msg).unwrap();
        assert!(!text.contains("params"));
    }

    #[test]
    fn round_trips_request() {
        let original = json!({"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"echo"}});
        let msg = Message::from_value(original.clone()).unwrap();
        let back = msg.to_value().unwrap();
        assert_eq!(original, back);
    }

    #[test]
    fn response_never_serializes_both_result_and_error() {
        let resp = Response::success(RequestId::Number(1), json!({}));
        let value = serde_json::to_value(&resp).unwrap();
        assert!(value.get("error").is_none());
    }
}
