//! Wire layout constants and base64 helpers shared by the box formats.
//!
//! ```text
//! sealed box:  nonce(24) || ephemeral_public_key(32) || ciphertext(len + 16)
//! secret box:  nonce(24) || ciphertext(len + 16)
//! ```

use base64::Engine;

use crate::error::{CryptoError, CryptoResult};

/// XChaCha20-Poly1305 nonce length.
pub const NONCE_LEN: usize = 24;

/// X25519 key length (public and private).
pub const KEY_LEN: usize = 32;

/// Poly1305 authentication tag length.
pub const TAG_LEN: usize = 16;

/// Smallest valid sealed-box payload (empty plaintext).
pub const SEALED_MIN_LEN: usize = NONCE_LEN + KEY_LEN + TAG_LEN;

/// Smallest valid secret-box payload (empty plaintext).
pub const SECRETBOX_MIN_LEN: usize = NONCE_LEN + TAG_LEN;

/// Encode bytes as standard base64.
pub fn base64_encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decode a standard base64 string.
pub fn base64_decode(data: &str) -> CryptoResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| CryptoError::MalformedPayload(format!("Invalid base64: {}", e)))
}

/// Decode base64 into a fixed 32-byte key.
pub(crate) fn decode_key(data: &str) -> CryptoResult<[u8; KEY_LEN]> {
    let bytes = base64_decode(data)?;
    bytes.try_into().map_err(|v: Vec<u8>| {
        CryptoError::InvalidFormat(format!("Expected {} key bytes, got {}", KEY_LEN, v.len()))
    })
}
