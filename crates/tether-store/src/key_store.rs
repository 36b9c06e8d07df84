//! Durable storage of the device keypair.
//!
//! Exactly one keypair per device, kept in the secure store under
//! `encryptionKeys` as `{"publicKey": "<b64>", "privateKey": "<b64>"}`.

use std::sync::Arc;

use tracing::{debug, info, warn};

use tether_core::defaults::KEY_ENCRYPTION_KEYS;
use tether_core::{Error, EventBus, KeyValueStore, Result, SyncEvent};
use tether_crypto::{CryptoError, Keypair};

/// Outcome of [`KeyStore::ensure_keypair`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsuredKeypair {
    /// A keypair was already stored.
    Existing(Keypair),
    /// No keypair existed; a fresh one was generated and saved.
    Generated(Keypair),
}

impl EnsuredKeypair {
    pub fn keypair(&self) -> &Keypair {
        match self {
            EnsuredKeypair::Existing(k) | EnsuredKeypair::Generated(k) => k,
        }
    }

    pub fn into_keypair(self) -> Keypair {
        match self {
            EnsuredKeypair::Existing(k) | EnsuredKeypair::Generated(k) => k,
        }
    }

    pub fn was_generated(&self) -> bool {
        matches!(self, EnsuredKeypair::Generated(_))
    }
}

/// Explicit acknowledgement that regenerating the keypair makes every
/// existing ciphertext permanently unreadable.
#[derive(Debug)]
pub struct RegenerationConsent {
    _private: (),
}

impl RegenerationConsent {
    /// The user has been told that old data is lost and agreed.
    pub fn acknowledge_data_loss() -> Self {
        Self { _private: () }
    }
}

/// Keypair persistence on top of a secure [`KeyValueStore`].
#[derive(Clone)]
pub struct KeyStore {
    secure: Arc<dyn KeyValueStore>,
    events: Option<EventBus>,
}

impl KeyStore {
    pub fn new(secure: Arc<dyn KeyValueStore>) -> Self {
        Self {
            secure,
            events: None,
        }
    }

    /// Report keypair generation on `events`.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Persist `keypair`, replacing whatever was stored.
    ///
    /// Destructive: ciphertext sealed to a replaced key is unreadable unless
    /// that key was exported first.
    pub async fn save(&self, keypair: &Keypair) -> Result<()> {
        if !keypair.is_consistent() {
            return Err(CryptoError::InvalidKeypair(
                "public key does not match private key".to_string(),
            )
            .into());
        }

        if let Ok(Some(previous)) = self.load().await {
            if previous.public != keypair.public {
                warn!(
                    old_key_fingerprint = %previous.public.fingerprint(),
                    key_fingerprint = %keypair.public.fingerprint(),
                    "Replacing stored keypair; data sealed to the old key becomes unreadable"
                );
            }
        }

        let json = keypair.to_json()?;
        self.secure.set(KEY_ENCRYPTION_KEYS, &json).await?;
        debug!(
            key_fingerprint = %keypair.public.fingerprint(),
            backend = self.secure.backend_type(),
            "Keypair saved"
        );
        Ok(())
    }

    /// Stored keypair, or `None` if none was ever saved.
    ///
    /// # Errors
    ///
    /// - `Error::StorageUnavailable` if the secure store cannot be read.
    /// - `Error::Crypto(InvalidKeypair)` if the stored value is corrupt.
    pub async fn load(&self) -> Result<Option<Keypair>> {
        match self.secure.get(KEY_ENCRYPTION_KEYS).await? {
            Some(json) => Ok(Some(Keypair::from_json(&json)?)),
            None => Ok(None),
        }
    }

    /// Return the stored keypair, generating one on first run.
    ///
    /// `prior_encrypted_data` tells whether this account already has sealed
    /// records. When it does and no keypair is stored, this refuses with
    /// `Error::KeyLoss`: the user must restore from the recovery key or call
    /// [`regenerate_keypair`](Self::regenerate_keypair) with consent.
    pub async fn ensure_keypair(&self, prior_encrypted_data: bool) -> Result<EnsuredKeypair> {
        if let Some(keypair) = self.load().await? {
            return Ok(EnsuredKeypair::Existing(keypair));
        }

        if prior_encrypted_data {
            warn!("No keypair stored but encrypted data exists; refusing to regenerate");
            return Err(Error::KeyLoss(
                "restore from the recovery key or explicitly regenerate".to_string(),
            ));
        }

        let keypair = self.generate_and_save().await?;
        info!(key_fingerprint = %keypair.public.fingerprint(), "Generated first keypair");
        Ok(EnsuredKeypair::Generated(keypair))
    }

    /// Replace the stored keypair (if any) with a fresh one.
    pub async fn regenerate_keypair(&self, _consent: RegenerationConsent) -> Result<Keypair> {
        let keypair = self.generate_and_save().await?;
        warn!(key_fingerprint = %keypair.public.fingerprint(), "Keypair regenerated with user consent");
        Ok(keypair)
    }

    /// Remove the stored keypair.
    pub async fn clear(&self) -> Result<()> {
        self.secure.remove(KEY_ENCRYPTION_KEYS).await?;
        info!("Keypair cleared");
        Ok(())
    }

    async fn generate_and_save(&self) -> Result<Keypair> {
        let keypair = Keypair::generate()?;
        self.save(&keypair).await?;
        if let Some(events) = &self.events {
            events.emit(SyncEvent::KeypairGenerated {
                fingerprint: keypair.public.fingerprint().to_string(),
            });
        }
        Ok(keypair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn store() -> (Arc<MemoryStore>, KeyStore) {
        let secure = Arc::new(MemoryStore::new());
        let keys = KeyStore::new(secure.clone());
        (secure, keys)
    }

    #[tokio::test]
    async fn test_load_absent_is_none() {
        let (_, keys) = store();
        assert!(keys.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let (secure, keys) = store();
        let keypair = Keypair::generate().unwrap();
        keys.save(&keypair).await.unwrap();

        assert_eq!(keys.load().await.unwrap(), Some(keypair));
        let raw = secure.get(KEY_ENCRYPTION_KEYS).await.unwrap().unwrap();
        assert!(raw.contains("publicKey"));
        assert!(raw.contains("privateKey"));
    }

    #[tokio::test]
    async fn test_corrupt_value_is_invalid_keypair() {
        let (secure, keys) = store();
        secure.set(KEY_ENCRYPTION_KEYS, "not json").await.unwrap();
        assert!(matches!(
            keys.load().await,
            Err(Error::Crypto(CryptoError::InvalidKeypair(_)))
        ));
    }

    #[tokio::test]
    async fn test_ensure_keypair_is_idempotent() {
        let (_, keys) = store();
        let first = keys.ensure_keypair(false).await.unwrap();
        assert!(first.was_generated());

        let second = keys.ensure_keypair(false).await.unwrap();
        assert!(!second.was_generated());
        assert_eq!(first.keypair(), second.keypair());

        // Existing keys are returned even when prior data is reported.
        let third = keys.ensure_keypair(true).await.unwrap();
        assert_eq!(third.into_keypair(), first.into_keypair());
    }

    #[tokio::test]
    async fn test_ensure_keypair_refuses_on_key_loss() {
        let (_, keys) = store();
        assert!(matches!(
            keys.ensure_keypair(true).await,
            Err(Error::KeyLoss(_))
        ));
        assert!(keys.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_regenerate_requires_consent_and_replaces() {
        let (_, keys) = store();
        let original = keys.ensure_keypair(false).await.unwrap().into_keypair();

        let fresh = keys
            .regenerate_keypair(RegenerationConsent::acknowledge_data_loss())
            .await
            .unwrap();
        assert_ne!(fresh.public, original.public);
        assert_eq!(keys.load().await.unwrap(), Some(fresh));
    }

    #[tokio::test]
    async fn test_generation_emits_event() {
        let secure = Arc::new(MemoryStore::new());
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let keys = KeyStore::new(secure).with_events(bus);

        let keypair = keys.ensure_keypair(false).await.unwrap().into_keypair();
        let envelope = rx.recv().await.unwrap();
        assert_eq!(
            envelope.payload,
            SyncEvent::KeypairGenerated {
                fingerprint: keypair.public.fingerprint().to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_clear() {
        let (_, keys) = store();
        keys.ensure_keypair(false).await.unwrap();
        keys.clear().await.unwrap();
        assert!(keys.load().await.unwrap().is_none());
    }
}
