//! Error types for cryptographic operations.

use thiserror::Error;

/// Cryptographic operation errors.
///
/// Variants that guard confidentiality (`KeyGeneration`, `Authentication`,
/// `MalformedPayload`) must never be mapped to a default value by callers.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The secure random source could not produce bytes.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Authentication failed - wrong key, tampered or truncated ciphertext.
    #[error("Authentication failed - payload was tampered with or sealed for another key")]
    Authentication,

    /// Input is not a validly shaped payload.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Recovery string does not decode to a private key.
    #[error("Invalid recovery key: {0}")]
    InvalidRecoveryArtifact(String),

    /// Stored keypair is unreadable or its halves do not match.
    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),

    /// Key derivation failed.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Passphrase too short.
    #[error("Passphrase too short (minimum {0} characters required)")]
    PassphraseTooShort(usize),

    /// Invalid magic bytes.
    #[error("Invalid magic bytes - not a tether vault blob")]
    InvalidMagic,

    /// Invalid format.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CryptoError {
    /// True for failures that mean "this ciphertext cannot be read".
    pub fn is_unreadable_payload(&self) -> bool {
        matches!(
            self,
            CryptoError::Authentication | CryptoError::MalformedPayload(_)
        )
    }
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
