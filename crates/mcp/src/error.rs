//! Error types for the MCP crate.

use serde_json::Value;
use std::time::Duration;

use switchboard_core::ConfigError;

use crate::types::{error_codes, JsonRpcError};

/// Why a credential was refused. Travels as `data.reason` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("credential expired")]
    Expired,
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

impl AuthError {
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Expired => "token_expired",
            AuthError::InvalidCredential(_) => "invalid_credential",
            AuthError::PermissionDenied(_) => "permission_denied",
        }
    }

    fn detail(&self) -> String {
        match self {
            AuthError::Expired => String::new(),
            AuthError::InvalidCredential(d) | AuthError::PermissionDenied(d) => d.clone(),
        }
    }

    fn from_reason(reason: Option<&str>, detail: String) -> Self {
        match reason {
            Some("token_expired") => AuthError::Expired,
            Some("permission_denied") => AuthError::PermissionDenied(detail),
            _ => AuthError::InvalidCredential(detail),
        }
    }
}

/// Errors that can occur during MCP operations.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// Malformed message, rejected by the validator.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Unknown method or unknown tool/prompt name.
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Params failed to deserialize or violated the input schema.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// A handler failed or panicked.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Process or connection failure.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// No eligible backend; nothing was sent.
    #[error("Circuit open: {0}")]
    CircuitOpen(String),

    #[error("Session limit of {0} reached")]
    SessionLimit(usize),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Transport is not connected")]
    NotConnected,

    /// Failed to parse JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A JSON-RPC error whose code has no dedicated variant.
    #[error("Server error {code}: {message}")]
    Server {
        code: i64,
        message: String,
        data: Option<Value>,
    },
}

impl From<std::io::Error> for McpError {
    fn from(e: std::io::Error) -> Self {
        McpError::Transport(e.to_string())
    }
}

impl McpError {
    /// JSON-RPC error code this error maps to.
    pub fn code(&self) -> i64 {
        match self {
            McpError::Json(_) => error_codes::PARSE_ERROR,
            McpError::Protocol(_) => error_codes::INVALID_REQUEST,
            McpError::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            McpError::InvalidParams(_) => error_codes::INVALID_PARAMS,
            McpError::Auth(_) => error_codes::AUTH_ERROR,
            McpError::Server { code, .. } => *code,
            _ => error_codes::INTERNAL_ERROR,
        }
    }

    /// Convert to a JSON-RPC error object.
    ///
    /// The message carries the detail only, so [`McpError::from_rpc_error`]
    /// on the receiving side rebuilds the same variant.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        let (message, data) = match self {
            McpError::Protocol(m)
            | McpError::MethodNotFound(m)
            | McpError::InvalidParams(m)
            | McpError::Internal(m) => (m.clone(), None),
            McpError::Auth(e) => (
                e.detail(),
                Some(serde_json::json!({ "reason": e.reason() })),
            ),
            McpError::Server { message, data, .. } => (message.clone(), data.clone()),
            other => (other.to_string(), None),
        };
        JsonRpcError {
            code: self.code(),
            message,
            data,
        }
    }

    /// Classify a JSON-RPC error object received from a peer.
    pub fn from_rpc_error(error: JsonRpcError) -> Self {
        let JsonRpcError { code, message, data } = error;
        match code {
            error_codes::PARSE_ERROR | error_codes::INVALID_REQUEST => McpError::Protocol(message),
            error_codes::METHOD_NOT_FOUND => McpError::MethodNotFound(message),
            error_codes::INVALID_PARAMS => McpError::InvalidParams(message),
            error_codes::INTERNAL_ERROR => McpError::Internal(message),
            error_codes::AUTH_ERROR => {
                let reason = data.as_ref().and_then(|d| d.get("reason")).and_then(Value::as_str);
                McpError::Auth(AuthError::from_reason(reason, message))
            }
            _ => McpError::Server { code, message, data },
        }
    }

    /// Whether the failure says something about the backend's health
    /// (as opposed to the request itself being wrong).
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            McpError::Transport(_) | McpError::Timeout(_) | McpError::NotConnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(McpError::MethodNotFound("x".into()).code(), error_codes::METHOD_NOT_FOUND);
        assert_eq!(McpError::InvalidParams("x".into()).code(), error_codes::INVALID_PARAMS);
        assert_eq!(McpError::Internal("x".into()).code(), error_codes::INTERNAL_ERROR);
        assert_eq!(McpError::Protocol("x".into()).code(), error_codes::INVALID_REQUEST);
        assert_eq!(McpError::Timeout(Duration::from_secs(1)).code(), error_codes::INTERNAL_ERROR);
    }

    #[test]
    fn test_roundtrip_through_wire_error() {
        let cases = vec![
            McpError::MethodNotFound("unknown tool 'nope'".into()),
            McpError::InvalidParams("/a: expected number, got string".into()),
            McpError::Internal("division by zero".into()),
        ];
        for err in cases {
            let back = McpError::from_rpc_error(err.to_rpc_error());
            assert_eq!(back.to_string(), err.to_string());
        }
    }

    #[test]
    fn test_auth_reason_travels_in_data() {
        let err = McpError::Auth(AuthError::PermissionDenied("tools:call".into()));
        let wire = err.to_rpc_error();
        assert_eq!(wire.code, error_codes::AUTH_ERROR);
        assert_eq!(wire.data, Some(serde_json::json!({"reason": "permission_denied"})));

        match McpError::from_rpc_error(wire) {
            McpError::Auth(AuthError::PermissionDenied(detail)) => assert_eq!(detail, "tools:call"),
            other => panic!("unexpected {other:?}"),
        }

        let expired = McpError::from_rpc_error(McpError::Auth(AuthError::Expired).to_rpc_error());
        assert!(matches!(expired, McpError::Auth(AuthError::Expired)));
    }

    #[test]
    fn test_unknown_code_is_preserved() {
        let err = McpError::from_rpc_error(JsonRpcError {
            code: -32099,
            message: "custom".into(),
            data: Some(serde_json::json!([1])),
        });
        match err {
            McpError::Server { code, message, data } => {
                assert_eq!(code, -32099);
                assert_eq!(message, "custom");
                assert_eq!(data, Some(serde_json::json!([1])));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_backend_failure_classification() {
        assert!(McpError::Transport("broken pipe".into()).is_backend_failure());
        assert!(McpError::NotConnected.is_backend_failure());
        assert!(!McpError::MethodNotFound("x".into()).is_backend_failure());
        assert!(!McpError::Internal("handler".into()).is_backend_failure());
    }
}
