//! Gateway error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wiregate_core::ConfigError;
use wiregate_crypto::CryptoError;

/// Stable error codes reported to clients in failed call results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Handshake, decryption or signature failure.
    #[serde(rename = "E0000")]
    InvalidEncryptionData,

    /// Unknown handler or method, disallowed path, or missing session.
    #[serde(rename = "E0001")]
    ServiceNotFound,

    /// A required argument is missing.
    #[serde(rename = "E0002")]
    InvalidParameters,

    /// A declared validation rule was violated.
    #[serde(rename = "E0003")]
    ValidationFailed,

    /// Anything else raised while handling a call.
    #[serde(rename = "E9999")]
    GeneralError,
}

impl ErrorCode {
    /// The wire code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidEncryptionData => "E0000",
            Self::ServiceNotFound => "E0001",
            Self::InvalidParameters => "E0002",
            Self::ValidationFailed => "E0003",
            Self::GeneralError => "E9999",
        }
    }

    /// Default client-facing message.
    pub fn message(&self) -> &'static str {
        match self {
            Self::InvalidEncryptionData => "Invalid encryption data",
            Self::ServiceNotFound => "Requested service not found",
            Self::InvalidParameters => "Incoming parameters are invalid",
            Self::ValidationFailed => "Validation failed",
            Self::GeneralError => "General error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Crypto failure.
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Encrypted data arrived without a handshake, or a plain call hit a method
    /// that only accepts encrypted calls.
    #[error("Encryption required: {0}")]
    EncryptionRequired(String),

    /// Handler, method, path or session did not match.
    #[error("Requested service not found")]
    ServiceNotFound,

    /// A required parameter was absent.
    #[error("Missing required parameter: {0}")]
    InvalidParameters(String),

    /// Validation rules reported violations.
    #[error("{message}")]
    ValidationFailed { code: ErrorCode, message: String },

    /// An argument could not be converted to its declared type.
    #[error("{0}")]
    Conversion(String),

    /// A handler reported a failure.
    #[error("{0}")]
    Handler(String),

    /// Malformed frame or request.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Registry construction error.
    #[error("Registration error: {0}")]
    Registration(String),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Create a handler failure with a message for the caller.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    /// Get the client-facing error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Crypto(_) | Self::EncryptionRequired(_) => ErrorCode::InvalidEncryptionData,
            Self::ServiceNotFound => ErrorCode::ServiceNotFound,
            Self::InvalidParameters(_) => ErrorCode::InvalidParameters,
            Self::ValidationFailed { code, .. } => *code,
            _ => ErrorCode::GeneralError,
        }
    }

    /// Message safe to send to a client.
    ///
    /// Handler, conversion and validation messages are always passed through.
    /// Internal detail is only included when `expose` is set.
    pub fn client_message(&self, expose: bool) -> String {
        match self {
            Self::ValidationFailed { message, .. } => message.clone(),
            Self::Conversion(message) | Self::Handler(message) => message.clone(),
            Self::Crypto(_)
            | Self::EncryptionRequired(_)
            | Self::ServiceNotFound
            | Self::InvalidParameters(_) => self.code().message().to_string(),
            other if expose => other.to_string(),
            other => other.code().message().to_string(),
        }
    }
}
