//! holon-rpc envelope types.
//!
//! Every WebSocket text frame carries one JSON-RPC 2.0 object:
//!
//! ```text
//! {"jsonrpc":"2.0","id":"c1","method":"pkg.v1.Svc/Method","params":{...}}   request
//! {"jsonrpc":"2.0","method":"...","params":{...}}                           notification
//! {"jsonrpc":"2.0","id":"c1","result":{...}}                                success
//! {"jsonrpc":"2.0","id":"c1","error":{"code":-32601,"message":"..."}}       failure
//! ```
//!
//! Inbound frames are classified leniently: anything that is not a JSON
//! object carrying `method`, `result` or `error` is not an envelope at all.

use crate::config::ProtocolConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON-RPC 2.0 request or notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    /// Present only when the sender expects a reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    /// Create a request; `id: None` makes it a notification.
    pub fn new(id: Option<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: ProtocolConfig::JSONRPC_VERSION.to_string(),
            id: id.map(Value::String),
            method: method.into(),
            params: as_object(params),
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    /// Create a success response. Non-object results are replaced by `{}`.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: ProtocolConfig::JSONRPC_VERSION.to_string(),
            id,
            result: Some(as_object(result)),
            error: None,
        }
    }

    /// Create an error response.
    pub fn failure(id: Value, error: RpcErrorObject) -> Self {
        Self {
            jsonrpc: ProtocolConfig::JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ProtocolConfig::INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ProtocolConfig::METHOD_NOT_FOUND,
            format!("method \"{}\" not found", method),
        )
    }

    /// Read an error object from an arbitrary JSON value, filling in the
    /// internal-error defaults for missing fields.
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let code = obj
            .get("code")
            .and_then(Value::as_i64)
            .and_then(|c| i32::try_from(c).ok())
            .unwrap_or(ProtocolConfig::INTERNAL_ERROR);
        let message = obj
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("internal error")
            .to_string();
        let data = obj.get("data").filter(|d| !d.is_null()).cloned();
        Some(Self {
            code,
            message,
            data,
        })
    }
}

/// One classified holon-rpc frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request(RpcRequest),
    Response(RpcResponse),
}

impl Envelope {
    /// Classify a text frame.
    ///
    /// Returns `None` for unparsable JSON, non-object payloads, and objects
    /// that carry neither `method` nor `result` / `error`. A request keeps
    /// whatever `jsonrpc` marker and method it arrived with, so that the
    /// dispatcher can reject it with a reply.
    pub fn parse(text: &str) -> Option<Envelope> {
        let value: Value = serde_json::from_str(text).ok()?;
        let obj = value.as_object()?;

        let present = |key: &str| obj.get(key).filter(|v| !v.is_null());

        if let Some(method) = present("method") {
            return Some(Envelope::Request(RpcRequest {
                jsonrpc: obj
                    .get("jsonrpc")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                id: present("id").cloned(),
                method: method.as_str().unwrap_or_default().to_string(),
                params: as_object(obj.get("params").cloned().unwrap_or(Value::Null)),
            }));
        }

        let result = present("result");
        let error = present("error");
        if result.is_none() && error.is_none() {
            return None;
        }

        Some(Envelope::Response(RpcResponse {
            jsonrpc: obj
                .get("jsonrpc")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            id: obj.get("id").cloned().unwrap_or(Value::Null),
            result: result.cloned(),
            error: error.and_then(RpcErrorObject::from_value),
        }))
    }
}

/// Correlation key of an envelope id: strings as-is, numbers rendered.
pub fn id_key(id: &Value) -> Option<String> {
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Coerce a params/result value into a JSON object, `{}` otherwise.
pub fn as_object(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        _ => Value::Object(Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let req = RpcRequest::new(Some("c1".into()), "echo.v1.Echo/Ping", json!({"m": 1}));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            json!({"jsonrpc": "2.0", "id": "c1", "method": "echo.v1.Echo/Ping", "params": {"m": 1}})
        );
    }

    #[test]
    fn test_notification_omits_id() {
        let req = RpcRequest::new(None, "log", json!(null));
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("\"id\""));
        assert!(json.contains("\"params\":{}"));
    }

    #[test]
    fn test_response_success_serialization() {
        let resp = RpcResponse::success(json!("s1"), json!({"ok": true}));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"result\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_response_error_serialization() {
        let resp = RpcResponse::failure(json!("s1"), RpcErrorObject::method_not_found("x"));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["error"]["code"], -32601);
        assert_eq!(json["error"]["message"], "method \"x\" not found");
        assert!(json.get("result").is_none());
        assert!(json["error"].get("data").is_none());
    }

    #[test]
    fn test_parse_request() {
        let env = Envelope::parse(
            r#"{"jsonrpc":"2.0","id":"s1","method":"client.v1.Client/Hello","params":{"name":"go"}}"#,
        )
        .unwrap();
        let Envelope::Request(req) = env else {
            panic!("expected request");
        };
        assert_eq!(req.jsonrpc, "2.0");
        assert_eq!(req.id, Some(json!("s1")));
        assert_eq!(req.method, "client.v1.Client/Hello");
        assert_eq!(req.params, json!({"name": "go"}));
    }

    #[test]
    fn test_parse_request_keeps_bad_marker() {
        let env = Envelope::parse(r#"{"jsonrpc":"1.0","id":"s2","method":"x","params":[1]}"#);
        let Some(Envelope::Request(req)) = env else {
            panic!("expected request");
        };
        assert_eq!(req.jsonrpc, "1.0");
        assert_eq!(req.params, json!({}));
    }

    #[test]
    fn test_parse_response_error_defaults() {
        let env = Envelope::parse(r#"{"jsonrpc":"2.0","id":"c3","error":{"data":[1]}}"#);
        let Some(Envelope::Response(resp)) = env else {
            panic!("expected response");
        };
        let err = resp.error.unwrap();
        assert_eq!(err.code, -32603);
        assert_eq!(err.message, "internal error");
        assert_eq!(err.data, Some(json!([1])));
    }

    #[test]
    fn test_parse_drops_non_envelopes() {
        assert!(Envelope::parse("not json").is_none());
        assert!(Envelope::parse("[1,2,3]").is_none());
        assert!(Envelope::parse(r#"{"jsonrpc":"2.0","id":"c1"}"#).is_none());
        assert!(Envelope::parse(r#"{"jsonrpc":"2.0","id":"c1","result":null}"#).is_none());
    }

    #[test]
    fn test_id_key() {
        assert_eq!(id_key(&json!("c7")), Some("c7".to_string()));
        assert_eq!(id_key(&json!(7)), Some("7".to_string()));
        assert_eq!(id_key(&json!(null)), None);
        assert_eq!(id_key(&json!({"x": 1})), None);
    }
}
