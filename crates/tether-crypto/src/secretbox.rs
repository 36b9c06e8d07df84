//! Secret boxes: symmetric authenticated encryption for a single principal.
//!
//! Layout: `nonce(24) || ciphertext + tag(len + 16)`, base64 on the wire.
//! Same freshness and authentication contract as [`crate::sealed`], but with
//! one pre-shared key instead of an ephemeral key exchange.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cipher::generate_random;
use crate::ecdh::hkdf_sha256;
use crate::error::{CryptoError, CryptoResult};
use crate::format::{base64_decode, base64_encode, NONCE_LEN, SECRETBOX_MIN_LEN};
use crate::keys::PrivateKey;

/// 32-byte secret-box key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Fresh random key.
    pub fn generate() -> CryptoResult<Self> {
        generate_random().map(Self)
    }

    /// Derive a key bound to `private` and a context label.
    ///
    /// The result is reproducible from the recovery key alone, so data
    /// protected with it survives a device restore.
    pub fn derive(private: &PrivateKey, context: &str) -> Self {
        let key = hkdf_sha256(private.as_bytes(), None, context.as_bytes());
        Self(*key.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Encrypt bytes under `key` with a fresh nonce.
pub fn seal_bytes(plaintext: &[u8], key: &SecretKey) -> CryptoResult<Vec<u8>> {
    let nonce: [u8; NONCE_LEN] = generate_random()?;
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encryption("secret box encryption failed".into()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a binary secret-box payload.
pub fn open_bytes(payload: &[u8], key: &SecretKey) -> CryptoResult<Vec<u8>> {
    if payload.len() < SECRETBOX_MIN_LEN {
        return Err(CryptoError::MalformedPayload(format!(
            "secret box is {} bytes, minimum is {}",
            payload.len(),
            SECRETBOX_MIN_LEN
        )));
    }
    let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
    let cipher =
        XChaCha20Poly1305::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::Authentication)?;
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Authentication)
}

/// Encrypt a UTF-8 string and base64-encode the payload.
pub fn seal(plaintext: &str, key: &SecretKey) -> CryptoResult<String> {
    seal_bytes(plaintext.as_bytes(), key).map(|bytes| base64_encode(&bytes))
}

/// Decode and decrypt a base64 secret-box payload as UTF-8 text.
pub fn open(payload: &str, key: &SecretKey) -> CryptoResult<String> {
    let bytes = base64_decode(payload.trim())?;
    let plaintext = open_bytes(&bytes, key)?;
    String::from_utf8(plaintext)
        .map_err(|_| CryptoError::MalformedPayload("plaintext is not UTF-8".to_string()))
}
