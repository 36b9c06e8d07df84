//! Error types for tether.

use thiserror::Error;

pub use tether_crypto::CryptoError;

/// Result type alias using tether's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for tether operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Local or secure storage could not be read or written.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Network, server, or timeout failure talking to the sync backend.
    #[error("Remote sync error: {0}")]
    RemoteSync(String),

    /// The backend rejected the session token (HTTP 401).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// No keypair on the device although encrypted data exists.
    ///
    /// Generating a fresh keypair here would orphan every existing
    /// ciphertext; the user must restore from the recovery key or
    /// explicitly consent to regeneration.
    #[error("Encryption keys missing but encrypted data exists: {0}")]
    KeyLoss(String),

    /// Cryptographic failure (key generation, authentication, malformed payload, ...).
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True when the failure only affects the remote mirror.
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::RemoteSync(_) | Error::Unauthorized(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::StorageUnavailable(e.to_string())
    }
}
