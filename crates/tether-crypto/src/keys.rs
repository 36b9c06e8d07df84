//! X25519 keypairs for end-to-end encryption.
//!
//! A keypair is created once at signup and lives for the lifetime of the
//! account. The private key alone is enough to rebuild the whole keypair
//! (see [`crate::recovery`]).
//!
//! # Security
//!
//! - Private keys are zeroized on drop and redacted from `Debug`
//! - Seeds come from the OS CSPRNG with no weak fallback

use serde::{Deserialize, Serialize};
use std::fmt;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cipher::generate_random;
use crate::error::{CryptoError, CryptoResult};
use crate::format::{base64_encode, decode_key, KEY_LEN};

/// Prefix for display fingerprints.
const FINGERPRINT_PREFIX: &str = "tk:";

/// Number of BLAKE3 bytes kept in a fingerprint.
const FINGERPRINT_LEN: usize = 16;

/// X25519 public key (32 bytes).
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey([u8; KEY_LEN]);

impl PublicKey {
    /// Create a public key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a base64-encoded public key.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        decode_key(encoded.trim()).map(Self)
    }

    /// Get the raw bytes of the public key.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Standard base64 transport form.
    pub fn to_base64(&self) -> String {
        base64_encode(&self.0)
    }

    /// Short, non-secret identifier for logs and display.
    pub fn fingerprint(&self) -> KeyFingerprint {
        let hash = blake3::hash(&self.0);
        let encoded = bs58::encode(&hash.as_bytes()[..FINGERPRINT_LEN]).into_string();
        KeyFingerprint(format!("{}{}", FINGERPRINT_PREFIX, encoded))
    }

    pub(crate) fn to_x25519(&self) -> X25519Public {
        X25519Public::from(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.fingerprint())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

/// Display fingerprint of a public key (`tk:<base58>`).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KeyFingerprint(String);

impl KeyFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for KeyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyFingerprint({})", self.0)
    }
}

/// X25519 private key (32 bytes) with automatic zeroization.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; KEY_LEN]);

impl PrivateKey {
    /// Create a private key from raw bytes.
    ///
    /// Every 32-byte string is a usable X25519 scalar; clamping happens
    /// inside the Diffie-Hellman function.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes of the private key.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Derive the corresponding public key. Deterministic.
    pub fn public_key(&self) -> PublicKey {
        let public = X25519Public::from(&self.to_x25519());
        PublicKey(*public.as_bytes())
    }

    pub(crate) fn to_base64(&self) -> String {
        base64_encode(&self.0)
    }

    pub(crate) fn to_x25519(&self) -> StaticSecret {
        StaticSecret::from(self.0)
    }
}

impl Clone for PrivateKey {
    fn clone(&self) -> Self {
        Self(self.0)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// X25519 keypair.
#[derive(Clone)]
pub struct Keypair {
    /// The public key (can be shared).
    pub public: PublicKey,
    /// The private key (must be kept secret).
    pub private: PrivateKey,
}

impl Keypair {
    /// Generate a new random keypair from a 32-byte OS-random seed.
    ///
    /// # Errors
    ///
    /// `CryptoError::KeyGeneration` if the random source is unavailable.
    pub fn generate() -> CryptoResult<Self> {
        let mut seed: [u8; KEY_LEN] = generate_random()?;
        let private = PrivateKey::from_bytes(seed);
        seed.zeroize();
        Ok(Self::from_private(private))
    }

    /// Rebuild a keypair from its private key.
    pub fn from_private(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { public, private }
    }

    /// Check that the public half is the one the private half derives.
    pub fn is_consistent(&self) -> bool {
        self.private.public_key() == self.public
    }
}

impl PartialEq for Keypair {
    fn eq(&self, other: &Self) -> bool {
        self.public == other.public && self.private.as_bytes() == other.private.as_bytes()
    }
}

impl Eq for Keypair {}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public)
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// Storage form of a keypair: `{"publicKey": "<b64>", "privateKey": "<b64>"}`.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
struct StoredKeypair {
    public_key: String,
    private_key: String,
}

impl Keypair {
    /// Serialize for protected storage.
    pub fn to_json(&self) -> CryptoResult<String> {
        let stored = StoredKeypair {
            public_key: self.public.to_base64(),
            private_key: self.private.to_base64(),
        };
        Ok(serde_json::to_string(&stored)?)
    }

    /// Parse a stored keypair, rejecting pairs whose halves disagree.
    pub fn from_json(json: &str) -> CryptoResult<Self> {
        let stored: StoredKeypair = serde_json::from_str(json)
            .map_err(|e| CryptoError::InvalidKeypair(format!("unreadable: {}", e)))?;
        let public = decode_key(&stored.public_key)
            .map(PublicKey)
            .map_err(|e| CryptoError::InvalidKeypair(format!("public key: {}", e)))?;
        let private = decode_key(&stored.private_key)
            .map(PrivateKey)
            .map_err(|e| CryptoError::InvalidKeypair(format!("private key: {}", e)))?;

        let keypair = Self { public, private };
        if !keypair.is_consistent() {
            return Err(CryptoError::InvalidKeypair(
                "public key does not match private key".to_string(),
            ));
        }
        Ok(keypair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let kp1 = Keypair::generate().unwrap();
        let kp2 = Keypair::generate().unwrap();

        assert_ne!(kp1.public.as_bytes(), kp2.public.as_bytes());
        assert_ne!(kp1.private.as_bytes(), kp2.private.as_bytes());
    }

    #[test]
    fn test_private_key_derives_public() {
        let kp = Keypair::generate().unwrap();
        assert_eq!(kp.public, kp.private.public_key());
        assert!(kp.is_consistent());
    }

    #[test]
    fn test_keypair_from_private() {
        let kp1 = Keypair::generate().unwrap();
        let kp2 = Keypair::from_private(kp1.private.clone());
        assert_eq!(kp1, kp2);
    }

    #[test]
    fn test_json_roundtrip() {
        let kp = Keypair::generate().unwrap();
        let json = kp.to_json().unwrap();
        assert!(json.contains("publicKey"));
        assert!(json.contains("privateKey"));

        let parsed = Keypair::from_json(&json).unwrap();
        assert_eq!(kp, parsed);
    }

    #[test]
    fn test_from_json_rejects_mismatched_halves() {
        let a = Keypair::generate().unwrap();
        let b = Keypair::generate().unwrap();
        let json = serde_json::json!({
            "publicKey": a.public.to_base64(),
            "privateKey": b.private.to_base64(),
        })
        .to_string();

        let result = Keypair::from_json(&json);
        assert!(matches!(result, Err(CryptoError::InvalidKeypair(_))));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            Keypair::from_json("{\"publicKey\": 7}"),
            Err(CryptoError::InvalidKeypair(_))
        ));
    }

    #[test]
    fn test_public_key_serde() {
        let kp = Keypair::generate().unwrap();
        let json = serde_json::to_string(&kp.public).unwrap();
        let parsed: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(kp.public, parsed);
    }

    #[test]
    fn test_fingerprint_stable_and_prefixed() {
        let kp = Keypair::generate().unwrap();
        let fp1 = kp.public.fingerprint();
        let fp2 = kp.private.public_key().fingerprint();
        assert_eq!(fp1, fp2);
        assert!(fp1.as_str().starts_with("tk:"));
    }

    #[test]
    fn test_private_key_debug_redacted() {
        let kp = Keypair::generate().unwrap();
        let debug = format!("{:?}", kp);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains(&kp.private.to_base64()));
    }
}
