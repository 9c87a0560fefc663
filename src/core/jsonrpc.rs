/// JSON-RPC 2.0 Envelope
///
/// Wire types for the MCP endpoint. Incoming bodies are decoded at the boundary
/// into a [`Message`] (request or notification, distinguished by the presence of
/// `id`); anything that does not fit is turned into a [`Rejection`] carrying the
/// error and whatever `id` could be recovered.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

// Error codes defined by JSON-RPC 2.0
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Client-supplied correlation token. Echoed verbatim in the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(serde_json::Number),
    String(String),
    Null,
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{:?}", s),
            RequestId::Null => f.write_str("null"),
        }
    }
}

/// A decoded JSON-RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Carries an `id`; the client expects exactly one response.
    Request {
        id: RequestId,
        method: String,
        params: Option<Value>,
    },
    /// No `id`; the client expects no response at all.
    Notification {
        method: String,
        params: Option<Value>,
    },
}

/// A body that could not be decoded into a [`Message`].
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// The request id when it could be recovered, `null` otherwise
    pub id: RequestId,
    pub error: JsonRpcError,
}

impl Rejection {
    fn new(id: RequestId, error: JsonRpcError) -> Self {
        Self { id, error }
    }
}

impl Message {
    /// Decode a raw request body.
    ///
    /// Malformed JSON is a parse error with a `null` id. Batches, non-object
    /// bodies, ids that are neither string nor number, a missing or non-string
    /// `method` and a `jsonrpc` tag other than `"2.0"` are invalid requests.
    pub fn decode(body: &[u8]) -> Result<Self, Rejection> {
        let value: Value = serde_json::from_slice(body).map_err(|e| {
            Rejection::new(
                RequestId::Null,
                JsonRpcError::new(PARSE_ERROR, format!("Parse error: {}", e)),
            )
        })?;

        let object = match value {
            Value::Object(object) => object,
            Value::Array(_) => {
                return Err(Rejection::new(
                    RequestId::Null,
                    JsonRpcError::new(INVALID_REQUEST, "Batch requests are not supported"),
                ));
            }
            _ => {
                return Err(Rejection::new(
                    RequestId::Null,
                    JsonRpcError::new(INVALID_REQUEST, "Request must be a JSON object"),
                ));
            }
        };

        let id = match object.get("id") {
            None => None,
            Some(raw) => match serde_json::from_value::<RequestId>(raw.clone()) {
                Ok(id) => Some(id),
                Err(_) => {
                    return Err(Rejection::new(
                        RequestId::Null,
                        JsonRpcError::new(INVALID_REQUEST, "Request id must be a string, number or null"),
                    ));
                }
            },
        };
        let reply_id = id.clone().unwrap_or(RequestId::Null);

        if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(Rejection::new(
                reply_id,
                JsonRpcError::new(INVALID_REQUEST, "Invalid JSON-RPC version, expected \"2.0\""),
            ));
        }

        let method = match object.get("method").and_then(Value::as_str) {
            Some(method) => method.to_string(),
            None => {
                return Err(Rejection::new(
                    reply_id,
                    JsonRpcError::new(INVALID_REQUEST, "Missing or invalid method"),
                ));
            }
        };

        let params = object.get("params").cloned();

        Ok(match id {
            Some(id) => Message::Request { id, method, params },
            None => Message::Notification { method, params },
        })
    }

    pub fn method(&self) -> &str {
        match self {
            Message::Request { method, .. } | Message::Notification { method, .. } => method,
        }
    }
}

/// JSON-RPC 2.0 response. The outcome enum makes `result` and `error`
/// mutually exclusive on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(JsonRpcError),
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            outcome: Outcome::Result(result),
        }
    }

    pub fn failure(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            outcome: Outcome::Error(error),
        }
    }

    pub fn error(&self) -> Option<&JsonRpcError> {
        match &self.outcome {
            Outcome::Error(error) => Some(error),
            Outcome::Result(_) => None,
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
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

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    /// Generic internal error; details stay in the server log.
    pub fn internal_error() -> Self {
        Self::new(INTERNAL_ERROR, "Internal error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_request_with_numeric_id() {
        let message = Message::decode(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        assert_eq!(
            message,
            Message::Request {
                id: RequestId::Number(1.into()),
                method: "ping".to_string(),
                params: None,
            }
        );
    }

    #[test]
    fn missing_id_is_a_notification() {
        let message =
            Message::decode(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(matches!(message, Message::Notification { ref method, .. } if method == "notifications/initialized"));
    }

    #[test]
    fn explicit_null_id_is_still_a_request() {
        let message = Message::decode(br#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#).unwrap();
        assert!(matches!(message, Message::Request { id: RequestId::Null, .. }));
    }

    #[test]
    fn malformed_json_is_a_parse_error_with_null_id() {
        let rejection = Message::decode(b"{not json").unwrap_err();
        assert_eq!(rejection.id, RequestId::Null);
        assert_eq!(rejection.error.code, PARSE_ERROR);
    }

    #[test]
    fn missing_method_keeps_the_id() {
        let rejection = Message::decode(br#"{"jsonrpc":"2.0","id":"abc"}"#).unwrap_err();
        assert_eq!(rejection.id, RequestId::String("abc".to_string()));
        assert_eq!(rejection.error.code, INVALID_REQUEST);
    }

    #[test]
    fn wrong_version_and_batches_are_invalid_requests() {
        let rejection = Message::decode(br#"{"jsonrpc":"1.0","id":7,"method":"ping"}"#).unwrap_err();
        assert_eq!(rejection.error.code, INVALID_REQUEST);
        assert_eq!(rejection.id, RequestId::Number(7.into()));

        let rejection = Message::decode(br#"[{"jsonrpc":"2.0","id":1,"method":"ping"}]"#).unwrap_err();
        assert_eq!(rejection.error.code, INVALID_REQUEST);

        let rejection = Message::decode(br#"{"jsonrpc":"2.0","id":{"a":1},"method":"ping"}"#).unwrap_err();
        assert_eq!(rejection.error.code, INVALID_REQUEST);
    }

    #[test]
    fn response_carries_exactly_one_of_result_or_error() {
        let ok = JsonRpcResponse::success(RequestId::String("x".into()), json!({"pong": true}));
        let err = JsonRpcResponse::failure(RequestId::Number(3.into()), JsonRpcError::method_not_found("nope"));

        for response in [ok, err] {
            let wire = serde_json::to_string(&response).unwrap();
            let parsed: Value = serde_json::from_str(&wire).unwrap();
            let object = parsed.as_object().unwrap();
            assert_eq!(object["jsonrpc"], "2.0");
            assert!(object.contains_key("result") ^ object.contains_key("error"));

            let back: JsonRpcResponse = serde_json::from_str(&wire).unwrap();
            assert_eq!(back, response);
        }
    }

    #[test]
    fn method_not_found_message_names_the_method() {
        let response = JsonRpcResponse::failure(
            RequestId::Number(3.into()),
            JsonRpcError::method_not_found("unknown_method"),
        );
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "jsonrpc": "2.0",
                "id": 3,
                "error": {"code": -32601, "message": "Method not found: unknown_method"}
            })
        );
    }
}
