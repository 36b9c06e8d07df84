//! Random byte generation and AES-256-GCM operations.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};

/// Draw `N` bytes from the operating system CSPRNG.
///
/// There is no fallback source: if the OS generator is unavailable the
/// caller gets `CryptoError::KeyGeneration`.
pub fn generate_random<const N: usize>() -> CryptoResult<[u8; N]> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::KeyGeneration(format!("random source unavailable: {}", e)))?;
    Ok(bytes)
}

/// Generate a random salt (32 bytes).
pub fn generate_salt() -> CryptoResult<[u8; 32]> {
    generate_random()
}

/// Generate a random AES-GCM nonce (12 bytes).
pub fn generate_gcm_nonce() -> CryptoResult<[u8; 12]> {
    generate_random()
}

/// Encrypt plaintext with AES-256-GCM.
///
/// Returns ciphertext with appended authentication tag (16 bytes).
pub fn aes_gcm_encrypt(
    key: &[u8; 32],
    nonce: &[u8; 12],
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::Encryption(e.to_string()))?;

    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| CryptoError::Encryption("AES-GCM encryption failed".into()))
}

/// Decrypt ciphertext with AES-256-GCM.
///
/// The ciphertext must include the authentication tag (16 bytes) at the end.
pub fn aes_gcm_decrypt(
    key: &[u8; 32],
    nonce: &[u8; 12],
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::Authentication)?;

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Authentication)
}
