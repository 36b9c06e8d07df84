//! # tether-core
//!
//! Core types, traits, and abstractions for tether.
//!
//! This crate provides:
//! - Domain records and their wire DTOs
//! - The key-value storage trait shared by plain and secure stores
//! - The error type and result alias
//! - Sync status events and the event bus
//! - Default constants
//!
//! ## Log level contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Local storage failed, the operation did not happen |
//! | WARN  | Remote failure swallowed, local state kept |
//! | INFO  | Lifecycle events, operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//!
//! Structured fields use the same names everywhere: `collection`,
//! `record_id`, `op`, `key_fingerprint` (never key material),
//! `storage_key`, `record_count`, `duration_ms`, `http_status`, `error`.

pub mod defaults;
pub mod error;
pub mod events;
pub mod ids;
pub mod models;
pub mod traits;

pub use error::{CryptoError, Error, Result};
pub use events::{EventBus, EventEnvelope, SyncEvent};
pub use models::{
    LocationPreset, LocationPresetWire, RecordId, Reminder, ReminderWire, Session, SyncState,
    Trigger,
};
pub use traits::KeyValueStore;
