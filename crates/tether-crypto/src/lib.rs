//! # tether-crypto
//!
//! End-to-end encryption primitives for tether.
//!
//! Reminder text and location-preset fields are encrypted on the device
//! before they reach the sync backend. The backend only ever stores
//! ciphertext; the private key never leaves the device except as the
//! user-held recovery key.
//!
//! ## Cryptographic Primitives
//!
//! - **Key exchange**: X25519 (Curve25519 ECDH)
//! - **Box cipher**: XChaCha20-Poly1305 (24-byte random nonces)
//! - **Key derivation**: HKDF-SHA256 (box keys), Argon2id (secure store)
//! - **At-rest cipher**: AES-256-GCM (secure store values)
//! - **Fingerprints**: BLAKE3 + Base58
//!
//! ## Sealed Box Format
//!
//! ```text
//! nonce (24) || ephemeral public key (32) || ciphertext + tag (len + 16)
//! ```
//!
//! ## Examples
//!
//! ```rust
//! use tether_crypto::{
//!     export_recovery_artifact, open, restore_from_recovery_artifact, seal, Keypair,
//! };
//!
//! let keypair = Keypair::generate().unwrap();
//! let payload = seal("Call mum when near the station", &keypair.public).unwrap();
//!
//! // Lost device: rebuild the keypair from the exported recovery key.
//! let artifact = export_recovery_artifact(&keypair);
//! let restored = restore_from_recovery_artifact(artifact.as_str()).unwrap();
//!
//! assert_eq!(open(&payload, &restored.private).unwrap(), "Call mum when near the station");
//! ```

pub mod cipher;
pub mod ecdh;
pub mod error;
pub mod format;
pub mod kdf;
pub mod keys;
pub mod recovery;
pub mod sealed;
pub mod secretbox;
pub mod vault;

pub use error::{CryptoError, CryptoResult};
pub use format::{base64_decode, base64_encode, SEALED_MIN_LEN, SECRETBOX_MIN_LEN};
pub use kdf::{validate_passphrase, KdfParams};
pub use keys::{KeyFingerprint, Keypair, PrivateKey, PublicKey};
pub use recovery::{export_recovery_artifact, restore_from_recovery_artifact, RecoveryArtifact};
pub use sealed::{open, open_bytes, seal, seal_bytes};
pub use secretbox::SecretKey;
pub use vault::{Vault, VaultHeader};

#[cfg(test)]
mod integration_tests {
    use super::*;

    /// Full workflow: generate -> seal -> export -> restore -> open.
    #[test]
    fn test_full_recovery_workflow() {
        let original = Keypair::generate().unwrap();
        let sealed = seal("Water the plants", &original.public).unwrap();
        let preset_key = SecretKey::derive(&original.private, "presets");
        let preset = secretbox::seal("Grandma's house", &preset_key).unwrap();

        let artifact = export_recovery_artifact(&original);
        let restored = restore_from_recovery_artifact(artifact.as_str()).unwrap();

        assert_eq!(open(&sealed, &restored.private).unwrap(), "Water the plants");
        let restored_key = SecretKey::derive(&restored.private, "presets");
        assert_eq!(
            secretbox::open(&preset, &restored_key).unwrap(),
            "Grandma's house"
        );
    }

    /// Stored keypairs survive a JSON round trip and still open old payloads.
    #[test]
    fn test_keypair_persistence_format() {
        let original = Keypair::generate().unwrap();
        let sealed = seal("Buy stamps", &original.public).unwrap();

        let loaded = Keypair::from_json(&original.to_json().unwrap()).unwrap();
        assert_eq!(open(&sealed, &loaded.private).unwrap(), "Buy stamps");
    }
}
