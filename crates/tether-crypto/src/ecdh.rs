//! X25519 Diffie-Hellman and HKDF key derivation.
//!
//! For sealing:
//! 1. Sender generates an ephemeral keypair
//! 2. shared = ECDH(ephemeral_private, recipient_public)
//! 3. box key = HKDF-SHA256(shared, salt = ephemeral_public || recipient_public)
//!
//! For opening, the recipient computes ECDH(recipient_private,
//! ephemeral_public) and derives the same box key.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};
use crate::keys::{PrivateKey, PublicKey};

/// Domain separation for sealed-box keys.
const HKDF_INFO_SEALED: &[u8] = b"tether-sealed-box-v1";

/// Raw X25519 output (32 bytes). Never used directly as a cipher key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// 32-byte symmetric key produced by HKDF.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct BoxKey([u8; 32]);

impl BoxKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for BoxKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxKey").field("key", &"[REDACTED]").finish()
    }
}

/// Perform X25519 Diffie-Hellman.
///
/// Fails with `CryptoError::Authentication` when the peer key is a low-order
/// point, which would make the shared secret all zeros.
pub fn ecdh(our_private: &PrivateKey, their_public: &PublicKey) -> CryptoResult<SharedSecret> {
    let shared = our_private
        .to_x25519()
        .diffie_hellman(&their_public.to_x25519());
    if !shared.was_contributory() {
        return Err(CryptoError::Authentication);
    }
    Ok(SharedSecret(*shared.as_bytes()))
}

/// HKDF-SHA256 expand of arbitrary input keying material to 32 bytes.
pub fn hkdf_sha256(ikm: &[u8], salt: Option<&[u8]>, info: &[u8]) -> BoxKey {
    let hkdf = Hkdf::<Sha256>::new(salt, ikm);
    let mut key = [0u8; 32];
    // 32 bytes is far below the 255 * HashLen expand limit.
    let _ = hkdf.expand(info, &mut key);
    BoxKey(key)
}

/// Box key for the sender side of a sealed box.
pub fn derive_seal_key(
    ephemeral_private: &PrivateKey,
    ephemeral_public: &PublicKey,
    recipient_public: &PublicKey,
) -> CryptoResult<BoxKey> {
    let shared = ecdh(ephemeral_private, recipient_public)?;
    Ok(box_key(&shared, ephemeral_public, recipient_public))
}

/// Box key for the recipient side of a sealed box.
pub fn derive_open_key(
    recipient_private: &PrivateKey,
    ephemeral_public: &PublicKey,
) -> CryptoResult<BoxKey> {
    let shared = ecdh(recipient_private, ephemeral_public)?;
    Ok(box_key(
        &shared,
        ephemeral_public,
        &recipient_private.public_key(),
    ))
}

fn box_key(shared: &SharedSecret, ephemeral: &PublicKey, recipient: &PublicKey) -> BoxKey {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral.as_bytes());
    salt[32..].copy_from_slice(recipient.as_bytes());
    hkdf_sha256(shared.as_bytes(), Some(&salt), HKDF_INFO_SEALED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Keypair;

    #[test]
    fn test_ecdh_shared_secret() {
        let alice = Keypair::generate().unwrap();
        let bob = Keypair::generate().unwrap();

        let shared_alice = ecdh(&alice.private, &bob.public).unwrap();
        let shared_bob = ecdh(&bob.private, &alice.public).unwrap();

        assert_eq!(shared_alice.as_bytes(), shared_bob.as_bytes());
    }

    #[test]
    fn test_ecdh_rejects_low_order_point() {
        let alice = Keypair::generate().unwrap();
        let identity = PublicKey::from_bytes([0u8; 32]);

        assert!(matches!(
            ecdh(&alice.private, &identity),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn test_seal_and_open_keys_match() {
        let recipient = Keypair::generate().unwrap();
        let ephemeral = Keypair::generate().unwrap();

        let sender = derive_seal_key(&ephemeral.private, &ephemeral.public, &recipient.public)
            .unwrap();
        let receiver = derive_open_key(&recipient.private, &ephemeral.public).unwrap();

        assert_eq!(sender.as_bytes(), receiver.as_bytes());
    }

    #[test]
    fn test_hkdf_context_separation() {
        let k1 = hkdf_sha256(b"ikm", None, b"context-1");
        let k2 = hkdf_sha256(b"ikm", None, b"context-2");
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_box_key_debug_redacted() {
        let key = hkdf_sha256(b"ikm", None, b"test");
        assert!(format!("{:?}", key).contains("REDACTED"));
    }
}
