//! Domain records and their wire representations.
//!
//! Local records hold plaintext and are the source of truth for display.
//! Wire DTOs carry ciphertext for the sensitive fields; the mapping between
//! the two lives in `tether-sync::record` so this crate never touches keys.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::new_v7;

// ============================================================================
// Record identity
// ============================================================================

/// Identity of a domain record.
///
/// Records start with a client-generated `Local` id and are upgraded in place
/// to the backend-assigned `Remote` id after a successful push.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordId {
    /// Client-generated, time-ordered id.
    Local(Uuid),
    /// Backend-assigned id.
    Remote(String),
}

impl RecordId {
    /// Fresh local id.
    pub fn new_local() -> Self {
        RecordId::Local(new_v7())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, RecordId::Local(_))
    }

    /// Backend id, if the record has been pushed.
    pub fn remote(&self) -> Option<&str> {
        match self {
            RecordId::Remote(id) => Some(id),
            RecordId::Local(_) => None,
        }
    }
}

const LOCAL_PREFIX: &str = "local:";

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Local(id) => write!(f, "{}{}", LOCAL_PREFIX, id),
            RecordId::Remote(id) => f.write_str(id),
        }
    }
}

impl FromStr for RecordId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(crate::Error::InvalidInput("empty record id".to_string()));
        }
        match s.strip_prefix(LOCAL_PREFIX) {
            Some(rest) => Uuid::parse_str(rest)
                .map(RecordId::Local)
                .map_err(|e| crate::Error::InvalidInput(format!("bad local id: {}", e))),
            None => Ok(RecordId::Remote(s.to_string())),
        }
    }
}

// ============================================================================
// Sync state
// ============================================================================

/// Where a record stands relative to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Never pushed, or changed locally after the last successful push.
    #[default]
    LocalOnly,
    /// Push in flight.
    PendingRemote,
    /// Local copy matches the last remote snapshot.
    Synced,
    /// Remote copy could not be decrypted; sensitive fields hold the sentinel.
    Undecryptable,
}

impl SyncState {
    /// True when the local copy has changes the remote has not seen.
    pub fn is_dirty(&self) -> bool {
        matches!(self, SyncState::LocalOnly | SyncState::PendingRemote)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncState::LocalOnly => "local_only",
            SyncState::PendingRemote => "pending_remote",
            SyncState::Synced => "synced",
            SyncState::Undecryptable => "undecryptable",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Reminder
// ============================================================================

/// Fire on arrival at or departure from the location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    #[default]
    Arrive,
    Leave,
}

impl FromStr for Trigger {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "arrive" => Ok(Trigger::Arrive),
            "leave" => Ok(Trigger::Leave),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown trigger '{}', expected arrive or leave",
                other
            ))),
        }
    }
}

/// A location-based reminder (plaintext, local form).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: RecordId,
    /// Sensitive.
    pub task: String,
    /// Sensitive.
    pub location_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_m: u32,
    #[serde(default)]
    pub trigger: Trigger,
    #[serde(default)]
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub sync_state: SyncState,
}

impl Reminder {
    /// New local reminder.
    pub fn new(
        task: impl Into<String>,
        location_name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        radius_m: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::new_local(),
            task: task.into(),
            location_name: location_name.into(),
            latitude,
            longitude,
            radius_m,
            trigger: Trigger::default(),
            archived: false,
            created_at: now,
            updated_at: now,
            sync_state: SyncState::LocalOnly,
        }
    }
}

/// Reminder as exchanged with the backend. `task` and `location_name` are
/// base64 sealed payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub task: String,
    pub location_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_m: u32,
    #[serde(default)]
    pub trigger: Trigger,
    #[serde(default)]
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Location preset
// ============================================================================

/// A saved place (plaintext, local form).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPreset {
    pub id: RecordId,
    /// Sensitive.
    pub name: String,
    /// Sensitive.
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sync_state: SyncState,
}

impl LocationPreset {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            id: RecordId::new_local(),
            name: name.into(),
            address: address.into(),
            latitude,
            longitude,
            created_at: Utc::now(),
            sync_state: SyncState::LocalOnly,
        }
    }
}

/// Preset as exchanged with the backend. `name` and `address` are base64
/// secret-box payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPresetWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Session
// ============================================================================

/// Authenticated backend session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub token: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}
