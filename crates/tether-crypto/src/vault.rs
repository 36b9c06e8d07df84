//! Passphrase-protected vault for values at rest.
//!
//! Backs the on-device "secure" key-value store: one Argon2id-derived key per
//! vault, AES-256-GCM per value.
//!
//! # Header (`vault.json`)
//!
//! KDF name and parameters, base64 salt, and a verifier blob (a known
//! constant sealed under the derived key) so a wrong passphrase is reported
//! at unlock time instead of on the first read.
//!
//! # Value format: TTHRVLT1
//!
//! ```text
//! +------------------+
//! | Magic: TTHRVLT1  | 8 bytes
//! +------------------+
//! | Nonce            | 12 bytes
//! +------------------+
//! | Ciphertext + tag | len + 16 bytes
//! +------------------+
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cipher::{aes_gcm_decrypt, aes_gcm_encrypt, generate_gcm_nonce, generate_salt};
use crate::error::{CryptoError, CryptoResult};
use crate::format::{base64_decode, base64_encode};
use crate::kdf::{derive_key, DerivedKey, KdfParams};

/// Magic bytes prefixed to every sealed value.
pub const MAGIC_VAULT: &[u8; 8] = b"TTHRVLT1";

const VERIFIER_PLAINTEXT: &[u8] = b"tether-vault-verifier";
const HEADER_LEN: usize = 8 + 12;

/// Persisted vault parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultHeader {
    /// Format version.
    pub version: u8,
    /// KDF algorithm (always "argon2id").
    pub kdf: String,
    /// KDF parameters.
    pub kdf_params: KdfParams,
    /// Salt for key derivation (base64).
    pub salt: String,
    /// Sealed constant used to check the passphrase (base64).
    pub verifier: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// An unlocked vault.
pub struct Vault {
    key: DerivedKey,
}

impl Vault {
    /// Create a new vault under `passphrase`.
    pub fn create(passphrase: &str, kdf_params: KdfParams) -> CryptoResult<(VaultHeader, Self)> {
        let salt = generate_salt()?;
        let key = derive_key(passphrase.as_bytes(), &salt, &kdf_params)?;
        let vault = Self { key };

        let header = VaultHeader {
            version: 1,
            kdf: "argon2id".to_string(),
            kdf_params,
            salt: base64_encode(&salt),
            verifier: base64_encode(&vault.seal(VERIFIER_PLAINTEXT)?),
            created_at: Utc::now(),
        };
        Ok((header, vault))
    }

    /// Unlock an existing vault.
    ///
    /// # Errors
    ///
    /// `CryptoError::Authentication` for a wrong passphrase.
    pub fn unlock(header: &VaultHeader, passphrase: &str) -> CryptoResult<Self> {
        if header.version != 1 || header.kdf != "argon2id" {
            return Err(CryptoError::InvalidFormat(format!(
                "unsupported vault: version {} kdf {}",
                header.version, header.kdf
            )));
        }

        let salt: [u8; 32] = base64_decode(&header.salt)?
            .try_into()
            .map_err(|_| CryptoError::InvalidFormat("Invalid salt length".to_string()))?;
        let key = derive_key(passphrase.as_bytes(), &salt, &header.kdf_params)?;
        let vault = Self { key };

        let verifier = vault.open(&base64_decode(&header.verifier)?)?;
        if verifier != VERIFIER_PLAINTEXT {
            return Err(CryptoError::Authentication);
        }
        Ok(vault)
    }

    /// Seal a value with a fresh nonce.
    pub fn seal(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let nonce = generate_gcm_nonce()?;
        let ciphertext = aes_gcm_encrypt(self.key.as_bytes(), &nonce, plaintext)?;

        let mut output = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        output.extend_from_slice(MAGIC_VAULT);
        output.extend_from_slice(&nonce);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    /// Open a sealed value.
    pub fn open(&self, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
        if !is_vault_blob(sealed) {
            return Err(CryptoError::InvalidMagic);
        }
        if sealed.len() < HEADER_LEN + 16 {
            return Err(CryptoError::MalformedPayload("vault value truncated".to_string()));
        }

        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&sealed[8..HEADER_LEN]);
        aes_gcm_decrypt(self.key.as_bytes(), &nonce, &sealed[HEADER_LEN..])
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault").field("key", &self.key).finish()
    }
}

/// Check if data starts with the vault magic.
pub fn is_vault_blob(data: &[u8]) -> bool {
    data.len() >= 8 && &data[0..8] == MAGIC_VAULT
}
