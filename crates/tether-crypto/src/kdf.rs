//! Passphrase key derivation using Argon2id.
//!
//! Only the on-disk secure store uses this; the end-to-end keys are random
//! and never derived from a passphrase.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};

/// Minimum passphrase length.
pub const MIN_PASSPHRASE_LENGTH: usize = 12;

/// Argon2id parameters, persisted next to the salt so a store opened later
/// derives with the same cost.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory in KiB.
    pub memory_kib: u32,
    /// Time iterations.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536, // 64 MiB
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    /// Parameters for phones and other memory-constrained devices.
    pub fn low_memory() -> Self {
        Self {
            memory_kib: 19456, // 19 MiB
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Key wrapper with automatic zeroization on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; 32],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { key: bytes }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Derive a 256-bit key from a passphrase using Argon2id.
pub fn derive_key(
    passphrase: &[u8],
    salt: &[u8; 32],
    params: &KdfParams,
) -> CryptoResult<DerivedKey> {
    if passphrase.len() < MIN_PASSPHRASE_LENGTH {
        return Err(CryptoError::PassphraseTooShort(MIN_PASSPHRASE_LENGTH));
    }

    let argon2_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(32),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(passphrase, salt, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(DerivedKey { key })
}

/// Validate passphrase length.
pub fn validate_passphrase(passphrase: &str) -> CryptoResult<()> {
    if passphrase.len() < MIN_PASSPHRASE_LENGTH {
        return Err(CryptoError::PassphraseTooShort(MIN_PASSPHRASE_LENGTH));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kdf_params_default() {
        let params = KdfParams::default();
        assert_eq!(params.memory_kib, 65536);
        assert_eq!(params.iterations, 3);
        assert_eq!(params.parallelism, 4);
    }

    #[test]
    fn test_derive_key_deterministic() {
        let passphrase = b"my-secure-passphrase-123";
        let salt = [42u8; 32];
        let params = KdfParams::low_memory();

        let key1 = derive_key(passphrase, &salt, &params).unwrap();
        let key2 = derive_key(passphrase, &salt, &params).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_salts() {
        let passphrase = b"my-secure-passphrase-123";
        let params = KdfParams::low_memory();

        let key1 = derive_key(passphrase, &[1u8; 32], &params).unwrap();
        let key2 = derive_key(passphrase, &[2u8; 32], &params).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_passphrase_too_short() {
        let result = derive_key(b"short", &[0u8; 32], &KdfParams::default());
        assert!(matches!(result, Err(CryptoError::PassphraseTooShort(_))));
    }

    #[test]
    fn test_validate_passphrase() {
        assert!(validate_passphrase("my-long-passphrase").is_ok());
        assert!(matches!(
            validate_passphrase("short"),
            Err(CryptoError::PassphraseTooShort(12))
        ));
    }

    #[test]
    fn test_derived_key_debug_redacted() {
        let key = DerivedKey::from_bytes([7u8; 32]);
        assert!(format!("{:?}", key).contains("REDACTED"));
    }

    #[test]
    fn test_kdf_params_serialization() {
        let params = KdfParams::low_memory();
        let json = serde_json::to_string(&params).unwrap();
        let parsed: KdfParams = serde_json::from_str(&json).unwrap();
        assert_eq!(params, parsed);
    }
}
