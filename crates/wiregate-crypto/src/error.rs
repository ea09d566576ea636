//! Error types for the crypto engine.

use thiserror::Error;

/// Errors raised by key handling, the handshake and the session cipher.
///
/// Display strings are meant for logs. Callers facing a client report every
/// variant as the same generic encryption failure.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Invalid handshake secret: expected {expected} bytes, got {actual}")]
    InvalidSecretLength { expected: usize, actual: usize },

    #[error("Signing failed")]
    Signing,

    #[error("Signature verification failed")]
    InvalidSignature,

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Convenience result alias for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
