//! # tether-sync
//!
//! Offline-first sync of encrypted records.
//!
//! Each collection gets one [`SyncEngine`]. Writes land in the local store
//! first; the backend is a best-effort mirror that only ever sees ciphertext
//! for the sensitive fields. Sync progress is published on the
//! [`EventBus`](tether_core::EventBus).
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tether_core::{EventBus, Reminder, ReminderWire};
//! use tether_store::{KeyStore, MemoryStore, SessionStore};
//! use tether_sync::{HttpRemoteStore, SyncConfig, SyncEngine};
//!
//! # async fn run() -> tether_core::Result<()> {
//! let config = SyncConfig::load()?;
//! let secure = Arc::new(MemoryStore::new());
//! let engine: SyncEngine<Reminder> = SyncEngine::new(
//!     Arc::new(MemoryStore::new()),
//!     KeyStore::new(secure.clone()),
//!     SessionStore::new(secure),
//!     Arc::new(HttpRemoteStore::<ReminderWire>::from_config(&config, "reminders")?),
//!     EventBus::default(),
//! );
//!
//! engine.load_local().await?;
//! engine.create(Reminder::new("Buy milk", "Corner shop", 51.5, -0.12, 100)).await?;
//! engine.refresh().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod prior;
pub mod record;
pub mod remote;

pub use config::{ConfigError, SyncConfig};
pub use engine::{BatchOutcome, RefreshReport, SkipReason, SyncEngine};
pub use prior::PriorData;
pub use record::{Archivable, Opened, SyncRecord};
pub use remote::{HttpRemoteStore, RemoteStore};
