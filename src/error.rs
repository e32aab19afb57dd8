//! Error types for toolmesh.
//!
//! # Security Note
//!
//! Error messages are carefully crafted to NEVER include credentials.
//! Bearer tokens, session signing keys and raw session tokens never appear
//! in any variant's `Display` output.

use std::path::PathBuf;

use serde_json::{json, Value};
use thiserror::Error;

use crate::mcp::protocol::{ErrorCode, JsonRpcErrorData};

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Uniform tool error shape, whatever the origin of the tool.
///
/// Local handlers, remote endpoints and external providers all fail through
/// this type, so callers of the federation never have to know where a tool
/// lives to interpret its failure.
#[derive(Error, Debug)]
pub enum ToolError {
    /// Arguments did not satisfy the tool's input schema.
    #[error("invalid parameter '{param}': {message}")]
    InvalidParams {
        /// Offending parameter path (e.g. `filter.limit`).
        param: String,
        /// What was wrong with it.
        message: String,
    },

    /// No tool with this name is reachable.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// A business error chosen by the handler (or returned by a remote
    /// endpoint). Forwarded verbatim.
    #[error("tool error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i32,
        /// Error message.
        message: String,
        /// Optional structured detail.
        data: Option<Value>,
    },

    /// Unanticipated handler failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// The remote endpoint could not produce a result.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The call scope was cancelled or its deadline passed.
    #[error("call cancelled")]
    Cancelled,
}

impl ToolError {
    /// Creates a business error with an explicit code.
    pub fn rpc(code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
            data,
        }
    }

    /// Creates an invalid-params error for a named parameter.
    pub fn invalid_param(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParams {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Wraps any displayable failure as an internal error, keeping its text.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    /// Maps this error onto the JSON-RPC error object sent to callers.
    #[must_use]
    pub fn to_error_data(&self) -> JsonRpcErrorData {
        match self {
            Self::InvalidParams { param, message } => JsonRpcErrorData::with_message(
                ErrorCode::InvalidParams,
                format!("Invalid params: {param}: {message}"),
            )
            .with_data(json!({ "param": param })),
            Self::NotFound(name) => JsonRpcErrorData::with_message(
                ErrorCode::InvalidParams,
                format!("Tool not found: {name}"),
            ),
            Self::Rpc {
                code,
                message,
                data,
            } => JsonRpcErrorData {
                code: *code,
                message: message.clone(),
                data: data.clone(),
            },
            Self::Internal(detail) => {
                JsonRpcErrorData::with_message(ErrorCode::InternalError, "Internal error")
                    .with_data(json!({ "detail": detail }))
            }
            Self::Remote(err) => {
                JsonRpcErrorData::with_message(ErrorCode::InternalError, "Remote tool failed")
                    .with_data(json!({ "detail": err.to_string() }))
            }
            Self::Cancelled => {
                JsonRpcErrorData::with_message(ErrorCode::RequestCancelled, "Request cancelled")
            }
        }
    }
}

/// Failures talking to a remote endpoint.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The request could not be sent or the body could not be read.
    #[error("remote request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("remote endpoint returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// An event-stream body carried no usable payload line.
    #[error("event stream contained no payload")]
    Stream,

    /// The body was not a JSON-RPC response of the expected shape.
    #[error("malformed remote response: {0}")]
    Decode(String),

    /// Credentials could not be obtained.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Session manager failures.
///
/// Every variant except [`SessionError::Backend`] means "this session is not
/// acceptable"; `Backend` means the manager itself malfunctioned.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The token is not in the expected format.
    #[error("malformed session token")]
    Malformed,

    /// The token signature does not verify.
    #[error("session token signature mismatch")]
    Signature,

    /// The session is older than the allowed lifetime.
    #[error("session expired")]
    Expired,

    /// No such session is known.
    #[error("unknown session")]
    Unknown,

    /// The session backend failed.
    #[error("session backend failure: {0}")]
    Backend(String),
}

/// Credential acquisition failures.
#[derive(Error, Debug)]
pub enum AuthError {
    /// No credential is currently available.
    #[error("credentials unavailable: {0}")]
    Unavailable(String),

    /// The provider failed to refresh its credential.
    #[error("credential refresh failed: {0}")]
    Refresh(String),

    /// The refresh did not finish within its fixed bound.
    #[error("credential refresh timed out")]
    Timeout,
}
