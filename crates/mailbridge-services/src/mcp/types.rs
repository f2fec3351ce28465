//! JSON-RPC 2.0 messages exchanged with the worker.
//!
//! Requests and notifications only travel to the worker, so they are
//! serialize-only. Responses only travel back and are deserialize-only.

use serde::{Deserialize, Serialize};

const JSONRPC_VERSION: &str = "2.0";

/// Outbound call expecting a response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Correlation id.
    pub id: u64,
    pub method: String,
    pub params: serde_json::Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

/// Outbound message without an id; the worker does not answer it.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    pub method: String,
    /// Omitted from the wire when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    /// Notification without parameters.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params: None,
        }
    }
}

/// Worker answer to one request. Exactly one of `result` and `error` is
/// expected; a response carrying neither resolves to `null`.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    /// Id of the request being answered.
    pub id: u64,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// Error member of a response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    /// Worker-specific details, if any.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// A decoded record read from the worker's stdout.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    /// Answer to one of our requests.
    Response(JsonRpcResponse),
    /// Worker-initiated notification (logging, progress, ...).
    Notification {
        /// Notification method.
        method: String,
    },
    /// Worker-initiated request. This client serves none of them.
    Request {
        /// Request method.
        method: String,
    },
}

impl InboundMessage {
    /// Classify one decoded JSON record.
    ///
    /// Returns a short reason when the record is structurally valid JSON
    /// but not a JSON-RPC message this client understands.
    pub fn classify(value: serde_json::Value) -> Result<Self, String> {
        let Some(obj) = value.as_object() else {
            return Err("record is not a JSON object".into());
        };

        if let Some(method) = obj.get("method").and_then(|m| m.as_str()) {
            let method = method.to_string();
            return if obj.get("id").is_some_and(|id| !id.is_null()) {
                Ok(Self::Request { method })
            } else {
                Ok(Self::Notification { method })
            };
        }

        if !obj.contains_key("result") && !obj.contains_key("error") {
            return Err("record has neither method nor result/error".into());
        }

        let response: JsonRpcResponse = serde_json::from_value(value)
            .map_err(|e| format!("response does not decode: {e}"))?;
        Ok(Self::Response(response))
    }
}
