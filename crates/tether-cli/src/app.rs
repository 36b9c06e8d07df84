//! Composition root: stores, key material, session and one sync engine per
//! collection, all sharing one event bus.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;
use tracing::{debug, info, warn};

use tether_core::{EventBus, EventEnvelope, KeyValueStore, LocationPreset, Reminder, SyncEvent};
use tether_crypto::KdfParams;
use tether_store::{FileStore, KeyStore, SessionStore, VaultStore};
use tether_sync::{HttpRemoteStore, PriorData, RemoteStore, SyncConfig, SyncEngine, SyncRecord};

pub struct App {
    pub config: SyncConfig,
    pub keys: KeyStore,
    pub sessions: SessionStore,
    pub reminders: SyncEngine<Reminder>,
    pub presets: SyncEngine<LocationPreset>,
    prior: PriorData,
    events: Receiver<EventEnvelope>,
}

impl App {
    /// Open the local stores under `config.data_dir` and load the caches.
    pub async fn open(
        config: SyncConfig,
        passphrase: &str,
        low_memory: bool,
    ) -> anyhow::Result<Self> {
        let plain = FileStore::new(config.plain_store_dir());
        plain
            .validate()
            .await
            .with_context(|| format!("plain store at {}", config.plain_store_dir().display()))?;
        let plain: Arc<dyn KeyValueStore> = Arc::new(plain);

        let kdf = if low_memory {
            KdfParams::low_memory()
        } else {
            KdfParams::default()
        };
        let secure: Arc<dyn KeyValueStore> = Arc::new(
            VaultStore::open_or_create(config.secure_store_dir(), passphrase, kdf)
                .await
                .context("unlocking secure store")?,
        );

        let bus = EventBus::new(config.event_capacity);
        let keys = KeyStore::new(secure.clone()).with_events(bus.clone());
        let sessions = SessionStore::new(secure);

        let reminders_remote = remote::<Reminder>(&config)?;
        let presets_remote = remote::<LocationPreset>(&config)?;
        let prior = PriorData::new()
            .with_collection::<Reminder>(plain.clone(), reminders_remote.clone())
            .with_collection::<LocationPreset>(plain.clone(), presets_remote.clone());

        let reminders = SyncEngine::new(
            plain.clone(),
            keys.clone(),
            sessions.clone(),
            reminders_remote,
            bus.clone(),
        )
        .with_prior_data(prior.clone());
        let presets = SyncEngine::new(
            plain.clone(),
            keys.clone(),
            sessions.clone(),
            presets_remote,
            bus.clone(),
        )
        .with_prior_data(prior.clone());
        reminders.load_local().await.context("loading reminders")?;
        presets.load_local().await.context("loading presets")?;

        info!(
            data_dir = %config.data_dir.display(),
            api = %config.api_base_url,
            "tether ready"
        );

        Ok(Self {
            config,
            keys,
            sessions,
            reminders,
            presets,
            prior,
            events: bus.subscribe(),
        })
    }

    /// True if the account holds data encrypted under an earlier keypair,
    /// in any local collection or, when signed in, on the backend.
    pub async fn has_prior_encrypted_data(&self) -> anyhow::Result<bool> {
        if self.reminders.has_prior_encrypted_data().await
            || self.presets.has_prior_encrypted_data().await
        {
            return Ok(true);
        }
        let session = self.sessions.load().await?;
        self.prior
            .exists(session.as_ref().map(|s| s.token.as_str()))
            .await
            .context("checking the backend for existing encrypted data")
    }

    /// Drain pending events: mirror them to the log and drop a session the
    /// backend rejected.
    pub async fn settle(&mut self) {
        let mut unauthorized = false;
        loop {
            match self.events.try_recv() {
                Ok(envelope) => {
                    mirror(&envelope);
                    if matches!(envelope.payload, SyncEvent::Unauthorized { .. }) {
                        unauthorized = true;
                    }
                }
                Err(TryRecvError::Lagged(n)) => {
                    warn!(missed = n, "Event mirror lagged");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        if unauthorized {
            warn!("Backend rejected the session; signing out");
            if let Err(e) = self.sessions.clear().await {
                warn!(error = %e, "Failed to clear rejected session");
            }
        }
    }
}

fn remote<R: SyncRecord>(config: &SyncConfig) -> anyhow::Result<Arc<dyn RemoteStore<R::Wire>>> {
    let remote = HttpRemoteStore::<R::Wire>::from_config(config, R::COLLECTION)?;
    Ok(Arc::new(remote))
}

fn mirror(envelope: &EventEnvelope) {
    match &envelope.payload {
        SyncEvent::PushFailed { record_id, error, .. } => warn!(
            event_type = %envelope.event_type,
            collection = envelope.collection.as_deref().unwrap_or("-"),
            record_id = %record_id,
            error = %error,
            "Event"
        ),
        SyncEvent::RecordUndecryptable { record_id, .. } => warn!(
            event_type = %envelope.event_type,
            collection = envelope.collection.as_deref().unwrap_or("-"),
            record_id = %record_id,
            "Event"
        ),
        _ => debug!(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            collection = envelope.collection.as_deref().unwrap_or("-"),
            "Event"
        ),
    }
}
