//! JSON-RPC 2.0 envelope types
//!
//! Every wire message is exactly one line of JSON tagged by the presence of
//! `id`/`method`/`result`/`error`. Inbound values that match none of the
//! envelope shapes are dropped, not surfaced: the stdio channel may carry
//! incidental non-protocol output.

use crate::error::RpcError;
use serde::{Deserialize, Serialize};

/// Error code for handler failures, including unknown methods
pub const ERROR_INTERNAL: i64 = -32603;

/// Error code for a request whose handling was cancelled
pub const ERROR_CANCELLED: i64 = -32800;

/// JSON-RPC 2.0 Request (or, with `id: None`, a Notification)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: method.to_string(),
            params,
        }
    }

    pub fn notification(method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: serde_json::Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC 2.0 Error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Classified inbound envelope
#[derive(Debug)]
pub enum RpcMessage {
    /// Request from the peer; expects exactly one response with this id
    Request {
        id: serde_json::Value,
        method: String,
        params: serde_json::Value,
    },
    /// Notification from the peer; no response channel exists
    Notification {
        method: String,
        params: serde_json::Value,
    },
    /// Response correlating to one of our outbound requests
    Response {
        id: u64,
        outcome: Result<serde_json::Value, RpcError>,
    },
}

impl RpcMessage {
    /// Classify a parsed JSON value as one of the three envelope shapes.
    ///
    /// Returns `None` for anything that is not a `jsonrpc: "2.0"` object
    /// or matches no shape; callers drop those silently.
    pub fn parse(value: &serde_json::Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.get("jsonrpc").and_then(|v| v.as_str()) != Some("2.0") {
            return None;
        }

        let method = obj.get("method").and_then(|v| v.as_str());
        let id = obj.get("id");

        match (method, id) {
            (Some(method), Some(id)) => Some(RpcMessage::Request {
                id: id.clone(),
                method: method.to_string(),
                params: obj.get("params").cloned().unwrap_or(serde_json::Value::Null),
            }),
            (Some(method), None) => Some(RpcMessage::Notification {
                method: method.to_string(),
                params: obj.get("params").cloned().unwrap_or(serde_json::Value::Null),
            }),
            (None, Some(id)) => {
                // Locally issued ids are always integers; anything else is
                // a response we never asked for.
                let id = id.as_u64()?;
                let outcome = if let Some(error) = obj.get("error") {
                    Err(RpcError::ErrorResponse {
                        code: error
                            .get("code")
                            .and_then(|c| c.as_i64())
                            .unwrap_or(ERROR_INTERNAL),
                        message: error
                            .get("message")
                            .and_then(|m| m.as_str())
                            .unwrap_or("")
                            .to_string(),
                    })
                } else {
                    Ok(obj.get("result").cloned().unwrap_or(serde_json::Value::Null))
                };
                Some(RpcMessage::Response { id, outcome })
            }
            (None, None) => None,
        }
    }
}
