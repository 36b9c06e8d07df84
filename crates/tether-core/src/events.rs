//! Sync status events, envelope, and event bus.
//!
//! The sync engine reports its progress through a structured stream instead
//! of relying on log output alone. Consumers (CLI status line, tests, UI
//! bindings) subscribe independently.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

// ============================================================================
// Event Envelope
// ============================================================================

/// Versioned wrapper around a [`SyncEvent`].
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    /// Namespaced event type (e.g. `"push.failed"`).
    pub event_type: String,
    /// When the event occurred (UTC).
    pub occurred_at: DateTime<Utc>,
    /// Collection this event relates to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Payload schema version.
    pub payload_version: u32,
    pub payload: SyncEvent,
}

impl EventEnvelope {
    pub fn new(event: SyncEvent) -> Self {
        Self {
            event_id: crate::ids::new_v7(),
            event_type: event.namespaced_event_type().to_string(),
            occurred_at: Utc::now(),
            collection: event.collection().map(String::from),
            payload_version: 1,
            payload: event,
        }
    }
}

// ============================================================================
// Sync Event (domain payloads)
// ============================================================================

/// Sync status payloads.
///
/// Serialized with a `type` tag, e.g.
/// `{"type":"PushFailed","collection":"reminders","record_id":"...","op":"create","error":"..."}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// A record was written to local storage.
    RecordSaved {
        collection: String,
        record_id: String,
        op: String,
    },
    /// A record was pushed; `remote_id` is the backend id now in use.
    PushSucceeded {
        collection: String,
        local_id: String,
        remote_id: String,
        op: String,
    },
    /// A remote push or delete failed; local state is unchanged.
    PushFailed {
        collection: String,
        record_id: String,
        op: String,
        error: String,
    },
    /// A reconciliation pass started.
    RefreshStarted { collection: String },
    /// A reconciliation pass merged a remote snapshot.
    RefreshCompleted {
        collection: String,
        count: usize,
        undecryptable: usize,
        duration_ms: u64,
    },
    /// The remote was unreachable; local cache stays authoritative.
    RefreshOffline { collection: String, reason: String },
    /// A remote record could not be decrypted.
    RecordUndecryptable {
        collection: String,
        record_id: String,
        error: String,
    },
    /// The backend rejected the session token. Callers should clear auth state.
    Unauthorized { collection: String },
    /// A new keypair was generated and persisted.
    KeypairGenerated { fingerprint: String },
}

impl SyncEvent {
    /// Namespaced event type for the envelope.
    pub fn namespaced_event_type(&self) -> &'static str {
        match self {
            SyncEvent::RecordSaved { .. } => "record.saved",
            SyncEvent::PushSucceeded { .. } => "push.succeeded",
            SyncEvent::PushFailed { .. } => "push.failed",
            SyncEvent::RefreshStarted { .. } => "refresh.started",
            SyncEvent::RefreshCompleted { .. } => "refresh.completed",
            SyncEvent::RefreshOffline { .. } => "refresh.offline",
            SyncEvent::RecordUndecryptable { .. } => "record.undecryptable",
            SyncEvent::Unauthorized { .. } => "auth.unauthorized",
            SyncEvent::KeypairGenerated { .. } => "keys.generated",
        }
    }

    /// Collection this event relates to.
    pub fn collection(&self) -> Option<&str> {
        match self {
            SyncEvent::RecordSaved { collection, .. }
            | SyncEvent::PushSucceeded { collection, .. }
            | SyncEvent::PushFailed { collection, .. }
            | SyncEvent::RefreshStarted { collection }
            | SyncEvent::RefreshCompleted { collection, .. }
            | SyncEvent::RefreshOffline { collection, .. }
            | SyncEvent::RecordUndecryptable { collection, .. }
            | SyncEvent::Unauthorized { collection } => Some(collection),
            SyncEvent::KeypairGenerated { .. } => None,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast-based event bus.
///
/// Slow receivers that fall behind get a `Lagged` error and miss events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    ///
    /// Recommended: 256 for production, 32 for tests.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emit an event. Dropped silently when nobody is subscribed.
    pub fn emit(&self, event: SyncEvent) {
        let envelope = EventEnvelope::new(event);
        let subscriber_count = self.tx.receiver_count();
        tracing::debug!(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            subscriber_count,
            "EventBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    /// Subscribe to receive enveloped events.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

// ============================================================================
// Tests
// ============================================================================
