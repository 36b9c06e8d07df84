//! Recovery key export and restore.
//!
//! The recovery artifact is the raw private key in standard base64 with no
//! extra structure. Possession of it is enough to rebuild the keypair and
//! open every payload ever sealed to the account. Nothing in this module
//! touches storage or the network; persisting a restored keypair is the
//! caller's explicit decision.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};
use crate::format::{base64_decode, KEY_LEN};
use crate::keys::{Keypair, PrivateKey};

/// User-facing recovery secret. Redacted from `Debug`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RecoveryArtifact(String);

impl RecoveryArtifact {
    /// The exact export string (base64 private key).
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RecoveryArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecoveryArtifact([REDACTED])")
    }
}

/// Export the private key as a recovery artifact.
pub fn export_recovery_artifact(keypair: &Keypair) -> RecoveryArtifact {
    RecoveryArtifact(keypair.private.to_base64())
}

/// Rebuild a keypair from a recovery artifact.
///
/// Surrounding whitespace is ignored so pasted keys with trailing newlines
/// still work.
///
/// # Errors
///
/// `CryptoError::InvalidRecoveryArtifact` if the string is not base64 or does
/// not decode to exactly 32 bytes.
pub fn restore_from_recovery_artifact(artifact: &str) -> CryptoResult<Keypair> {
    let trimmed = artifact.trim();
    if trimmed.is_empty() {
        return Err(CryptoError::InvalidRecoveryArtifact(
            "recovery key is empty".to_string(),
        ));
    }

    let mut bytes = base64_decode(trimmed)
        .map_err(|_| CryptoError::InvalidRecoveryArtifact("not valid base64".to_string()))?;

    if bytes.len() != KEY_LEN {
        let len = bytes.len();
        bytes.zeroize();
        return Err(CryptoError::InvalidRecoveryArtifact(format!(
            "expected {} bytes, got {}",
            KEY_LEN, len
        )));
    }

    let mut raw = [0u8; KEY_LEN];
    raw.copy_from_slice(&bytes);
    bytes.zeroize();
    let private = PrivateKey::from_bytes(raw);
    raw.zeroize();

    Ok(Keypair::from_private(private))
}
