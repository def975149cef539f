//! Error types for Sidecar Core

use thiserror::Error;

/// Main error type for Sidecar operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Method not implemented: {0}")]
    MethodNotImplemented(String),

    #[error("Unknown session {0}")]
    UnknownSession(String),

    #[error("cancelled")]
    Cancelled,

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Connection-level RPC errors
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Remote error {code}: {message}")]
    ErrorResponse { code: i64, message: String },
}

impl Error {
    /// Wire representation of a handler failure.
    ///
    /// Cancellation keeps its own error code so clients can tell an
    /// interrupted turn apart from a genuine failure.
    pub fn to_wire(&self) -> crate::types::JsonRpcError {
        match self {
            Error::Cancelled => crate::types::JsonRpcError {
                code: crate::types::ERROR_CANCELLED,
                message: "cancelled".to_string(),
                data: None,
            },
            other => crate::types::JsonRpcError {
                code: crate::types::ERROR_INTERNAL,
                message: other.to_string(),
                data: None,
            },
        }
    }
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;
