//! Error types for the holons SDK.
//!
//! A single error enum covers addressing, protocol, link, call and
//! application failures so that every public operation returns the same
//! `Result` type.

use crate::config::ProtocolConfig;
use crate::rpc::protocol::RpcErrorObject;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the holons SDK.
#[derive(Debug, Error)]
pub enum HolonsError {
    // Addressing errors
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Unsupported transport URI: {uri}")]
    UnsupportedScheme { uri: String },

    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // Protocol errors
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Link errors
    #[error("WebSocket error: {message}")]
    WebSocket { message: String },

    #[error("websocket is not connected")]
    NotConnected,

    // Call errors
    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("holon-rpc connection closed")]
    ConnectionClosed,

    #[error("holon-rpc client closed")]
    ClientClosed,

    #[error("Operation was cancelled")]
    Cancelled,

    /// Error triple carried by a failed response, or raised by a handler
    /// that wants to reply with an explicit code.
    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i32,
        message: String,
        data: Option<Value>,
    },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for holons operations.
pub type Result<T> = std::result::Result<T, HolonsError>;

impl From<std::io::Error> for HolonsError {
    fn from(err: std::io::Error) -> Self {
        HolonsError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for HolonsError {
    fn from(err: serde_json::Error) -> Self {
        HolonsError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for HolonsError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        HolonsError::WebSocket {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for HolonsError {
    fn from(err: url::ParseError) -> Self {
        HolonsError::InvalidArgument {
            message: format!("invalid url: {}", err),
        }
    }
}

impl HolonsError {
    /// Build an explicit error triple, typically returned from a handler.
    pub fn rpc(code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        HolonsError::Rpc {
            code,
            message: message.into(),
            data,
        }
    }

    /// Shorthand for an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        HolonsError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Convert to the error object carried by a failed response.
    ///
    /// `Rpc` keeps its own triple; any other fault is reported with the
    /// generic handler fault code and its display text.
    pub fn to_rpc_error(&self) -> RpcErrorObject {
        match self {
            HolonsError::Rpc {
                code,
                message,
                data,
            } => RpcErrorObject {
                code: *code,
                message: message.clone(),
                data: data.clone(),
            },
            other => RpcErrorObject {
                code: ProtocolConfig::HANDLER_FAULT,
                message: other.to_string(),
                data: None,
            },
        }
    }

    /// Check if the failure is a link or call condition that may succeed
    /// when retried after the connection is re-established.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HolonsError::Timeout(_)
                | HolonsError::ConnectionClosed
                | HolonsError::NotConnected
                | HolonsError::WebSocket { .. }
        )
    }
}
