//! Sealed boxes: anonymous public-key encryption of text fields.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────┬────────────────────────┬──────────────────────────────┐
//! │ nonce (24)   │ ephemeral pubkey (32)  │ ciphertext + tag (len + 16)  │
//! └──────────────┴────────────────────────┴──────────────────────────────┘
//! ```
//!
//! A fresh ephemeral keypair and a fresh nonce are drawn for every call, so
//! sealing the same text twice never yields the same payload. Only the
//! holder of the recipient private key can open the box.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};

use crate::cipher::generate_random;
use crate::ecdh::{derive_open_key, derive_seal_key};
use crate::error::{CryptoError, CryptoResult};
use crate::format::{base64_decode, base64_encode, KEY_LEN, NONCE_LEN, SEALED_MIN_LEN};
use crate::keys::{Keypair, PrivateKey, PublicKey};

/// Seal raw bytes to `recipient`. Returns the binary payload.
pub fn seal_bytes(plaintext: &[u8], recipient: &PublicKey) -> CryptoResult<Vec<u8>> {
    let ephemeral = Keypair::generate()?;
    let nonce: [u8; NONCE_LEN] = generate_random()?;

    let key = derive_seal_key(&ephemeral.private, &ephemeral.public, recipient)?;
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encryption("sealed box encryption failed".into()))?;

    let mut out = Vec::with_capacity(SEALED_MIN_LEN + plaintext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(ephemeral.public.as_bytes());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a binary sealed-box payload with the recipient's private key.
///
/// # Errors
///
/// - `MalformedPayload` if shorter than the fixed header plus tag
/// - `Authentication` if the tag does not verify (tampered, truncated
///   ciphertext, or sealed to a different key)
pub fn open_bytes(payload: &[u8], recipient: &PrivateKey) -> CryptoResult<Vec<u8>> {
    if payload.len() < SEALED_MIN_LEN {
        return Err(CryptoError::MalformedPayload(format!(
            "sealed box is {} bytes, minimum is {}",
            payload.len(),
            SEALED_MIN_LEN
        )));
    }

    let (nonce, rest) = payload.split_at(NONCE_LEN);
    let (ephemeral_bytes, ciphertext) = rest.split_at(KEY_LEN);
    let mut ephemeral = [0u8; KEY_LEN];
    ephemeral.copy_from_slice(ephemeral_bytes);
    let ephemeral = PublicKey::from_bytes(ephemeral);

    let key = derive_open_key(recipient, &ephemeral)?;
    let cipher =
        XChaCha20Poly1305::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::Authentication)?;
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Authentication)
}

/// Seal a UTF-8 string to `recipient` and base64-encode the payload.
///
/// ```rust
/// use tether_crypto::{open, seal, Keypair};
///
/// let me = Keypair::generate().unwrap();
/// let payload = seal("Buy milk", &me.public).unwrap();
/// assert_eq!(open(&payload, &me.private).unwrap(), "Buy milk");
/// ```
pub fn seal(plaintext: &str, recipient: &PublicKey) -> CryptoResult<String> {
    seal_bytes(plaintext.as_bytes(), recipient).map(|bytes| base64_encode(&bytes))
}

/// Decode and open a base64 sealed-box payload as UTF-8 text.
pub fn open(payload: &str, recipient: &PrivateKey) -> CryptoResult<String> {
    let bytes = base64_decode(payload.trim())?;
    let plaintext = open_bytes(&bytes, recipient)?;
    String::from_utf8(plaintext)
        .map_err(|_| CryptoError::MalformedPayload("plaintext is not UTF-8".to_string()))
}
