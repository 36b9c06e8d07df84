//! Mapping between local records and their encrypted wire form.
//!
//! Reminders are sealed to the user's own public key. Preset fields use the
//! secret box under a key derived from the user's private key. Either way only
//! the holder of the private key (or its recovery key) can read them back.

use serde::de::DeserializeOwned;
use serde::Serialize;

use tether_core::defaults::{
    COLLECTION_PRESETS, COLLECTION_REMINDERS, PRESET_KEY_CONTEXT, UNDECRYPTABLE,
};
use tether_core::{
    LocationPreset, LocationPresetWire, RecordId, Reminder, ReminderWire, SyncState,
};
use tether_crypto::{secretbox, CryptoError, CryptoResult, Keypair, SecretKey};

/// Result of opening one wire record.
///
/// A record is always produced. When a sensitive field fails to decrypt it
/// holds [`UNDECRYPTABLE`], the record is marked
/// [`SyncState::Undecryptable`], and `error` carries the first failure.
#[derive(Debug)]
pub struct Opened<R> {
    pub record: R,
    pub error: Option<CryptoError>,
}

/// A domain record the sync engine can persist and mirror.
pub trait SyncRecord:
    Clone + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Local storage key and REST collection name.
    const COLLECTION: &'static str;

    /// Encrypted wire representation.
    type Wire: Clone + Send + Sync + Serialize + DeserializeOwned + 'static;

    fn id(&self) -> &RecordId;
    fn set_id(&mut self, id: RecordId);
    fn sync_state(&self) -> SyncState;
    fn set_sync_state(&mut self, state: SyncState);

    /// Encrypt sensitive fields for the backend.
    fn seal(&self, keypair: &Keypair) -> CryptoResult<Self::Wire>;

    /// Decrypt a backend record, substituting the sentinel per failed field.
    fn open(wire: &Self::Wire, keypair: &Keypair) -> Opened<Self>;

    /// Backend id carried by a wire record.
    fn wire_id(wire: &Self::Wire) -> Option<&str>;
}

/// Records that can be archived and restored in batches.
pub trait Archivable: SyncRecord {
    fn is_archived(&self) -> bool;
    fn set_archived(&mut self, archived: bool);
}

/// Decrypt one field, keeping the first error seen.
fn open_field(
    payload: &str,
    first_error: &mut Option<CryptoError>,
    open: impl FnOnce(&str) -> CryptoResult<String>,
) -> String {
    match open(payload) {
        Ok(plaintext) => plaintext,
        Err(e) => {
            if first_error.is_none() {
                *first_error = Some(e);
            }
            UNDECRYPTABLE.to_string()
        }
    }
}

fn state_after_open(error: &Option<CryptoError>) -> SyncState {
    if error.is_some() {
        SyncState::Undecryptable
    } else {
        SyncState::Synced
    }
}

fn remote_id(id: &Option<String>) -> RecordId {
    RecordId::Remote(id.clone().unwrap_or_default())
}

// ============================================================================
// Reminder
// ============================================================================

impl SyncRecord for Reminder {
    const COLLECTION: &'static str = COLLECTION_REMINDERS;
    type Wire = ReminderWire;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    fn set_sync_state(&mut self, state: SyncState) {
        self.sync_state = state;
    }

    fn seal(&self, keypair: &Keypair) -> CryptoResult<ReminderWire> {
        Ok(ReminderWire {
            id: self.id.remote().map(String::from),
            task: tether_crypto::seal(&self.task, &keypair.public)?,
            location_name: tether_crypto::seal(&self.location_name, &keypair.public)?,
            latitude: self.latitude,
            longitude: self.longitude,
            radius_m: self.radius_m,
            trigger: self.trigger,
            archived: self.archived,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    fn open(wire: &ReminderWire, keypair: &Keypair) -> Opened<Self> {
        let mut error = None;
        let task = open_field(&wire.task, &mut error, |p| {
            tether_crypto::open(p, &keypair.private)
        });
        let location_name = open_field(&wire.location_name, &mut error, |p| {
            tether_crypto::open(p, &keypair.private)
        });

        let record = Reminder {
            id: remote_id(&wire.id),
            task,
            location_name,
            latitude: wire.latitude,
            longitude: wire.longitude,
            radius_m: wire.radius_m,
            trigger: wire.trigger,
            archived: wire.archived,
            created_at: wire.created_at,
            updated_at: wire.updated_at,
            sync_state: state_after_open(&error),
        };
        Opened { record, error }
    }

    fn wire_id(wire: &ReminderWire) -> Option<&str> {
        wire.id.as_deref().filter(|id| !id.is_empty())
    }
}

impl Archivable for Reminder {
    fn is_archived(&self) -> bool {
        self.archived
    }

    fn set_archived(&mut self, archived: bool) {
        self.archived = archived;
        self.updated_at = chrono::Utc::now();
    }
}

// ============================================================================
// Location preset
// ============================================================================

fn preset_key(keypair: &Keypair) -> SecretKey {
    SecretKey::derive(&keypair.private, PRESET_KEY_CONTEXT)
}

impl SyncRecord for LocationPreset {
    const COLLECTION: &'static str = COLLECTION_PRESETS;
    type Wire = LocationPresetWire;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    fn set_sync_state(&mut self, state: SyncState) {
        self.sync_state = state;
    }

    fn seal(&self, keypair: &Keypair) -> CryptoResult<LocationPresetWire> {
        let key = preset_key(keypair);
        Ok(LocationPresetWire {
            id: self.id.remote().map(String::from),
            name: secretbox::seal(&self.name, &key)?,
            address: secretbox::seal(&self.address, &key)?,
            latitude: self.latitude,
            longitude: self.longitude,
            created_at: self.created_at,
        })
    }

    fn open(wire: &LocationPresetWire, keypair: &Keypair) -> Opened<Self> {
        let key = preset_key(keypair);
        let mut error = None;
        let name = open_field(&wire.name, &mut error, |p| secretbox::open(p, &key));
        let address = open_field(&wire.address, &mut error, |p| secretbox::open(p, &key));

        let record = LocationPreset {
            id: remote_id(&wire.id),
            name,
            address,
            latitude: wire.latitude,
            longitude: wire.longitude,
            created_at: wire.created_at,
            sync_state: state_after_open(&error),
        };
        Opened { record, error }
    }

    fn wire_id(wire: &LocationPresetWire) -> Option<&str> {
        wire.id.as_deref().filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_reminder() -> Reminder {
        let mut r = Reminder::new("Buy bread", "Bakery on 5th", 40.7, -73.9, 150);
        r.set_id(RecordId::Remote("r-1".into()));
        r
    }

    #[test]
    fn test_reminder_wire_hides_plaintext() {
        let keypair = Keypair::generate().unwrap();
        let wire = sample_reminder().seal(&keypair).unwrap();

        assert_ne!(wire.task, "Buy bread");
        assert_ne!(wire.location_name, "Bakery on 5th");
        assert_eq!(wire.id.as_deref(), Some("r-1"));
        assert_eq!(wire.radius_m, 150);

        let body = serde_json::to_string(&wire).unwrap();
        assert!(!body.contains("Buy bread"));
    }

    #[test]
    fn test_reminder_open_round_trip() {
        let keypair = Keypair::generate().unwrap();
        let original = sample_reminder();
        let opened = Reminder::open(&original.seal(&keypair).unwrap(), &keypair);

        assert!(opened.error.is_none());
        assert_eq!(opened.record.task, original.task);
        assert_eq!(opened.record.location_name, original.location_name);
        assert_eq!(opened.record.id, original.id);
        assert_eq!(opened.record.sync_state, SyncState::Synced);
    }

    #[test]
    fn test_local_id_is_not_sent() {
        let keypair = Keypair::generate().unwrap();
        let reminder = Reminder::new("t", "l", 0.0, 0.0, 10);
        assert!(reminder.seal(&keypair).unwrap().id.is_none());
    }

    #[test]
    fn test_corrupted_field_gets_sentinel() {
        let keypair = Keypair::generate().unwrap();
        let mut wire = sample_reminder().seal(&keypair).unwrap();
        wire.location_name = "garbage".to_string();

        let opened = Reminder::open(&wire, &keypair);
        assert_eq!(opened.record.task, "Buy bread");
        assert_eq!(opened.record.location_name, UNDECRYPTABLE);
        assert_eq!(opened.record.sync_state, SyncState::Undecryptable);
        assert!(opened.error.unwrap().is_unreadable_payload());
    }

    #[test]
    fn test_wrong_key_marks_all_fields() {
        let k1 = Keypair::generate().unwrap();
        let k2 = Keypair::generate().unwrap();
        let wire = sample_reminder().seal(&k1).unwrap();

        let opened = Reminder::open(&wire, &k2);
        assert_eq!(opened.record.task, UNDECRYPTABLE);
        assert_eq!(opened.record.location_name, UNDECRYPTABLE);
        assert!(matches!(opened.error, Some(CryptoError::Authentication)));
    }

    #[test]
    fn test_preset_round_trip_and_recovery() {
        let keypair = Keypair::generate().unwrap();
        let mut preset = LocationPreset::new("Home", "1 Main St", 1.0, 2.0);
        preset.set_id(RecordId::Remote("p-1".into()));
        let wire = preset.seal(&keypair).unwrap();
        assert_ne!(wire.name, "Home");

        let restored = tether_crypto::restore_from_recovery_artifact(
            tether_crypto::export_recovery_artifact(&keypair).as_str(),
        )
        .unwrap();
        let opened = LocationPreset::open(&wire, &restored);
        assert!(opened.error.is_none());
        assert_eq!(opened.record.name, "Home");
        assert_eq!(opened.record.address, "1 Main St");
    }

    #[test]
    fn test_wire_id_ignores_empty() {
        let keypair = Keypair::generate().unwrap();
        let mut wire = sample_reminder().seal(&keypair).unwrap();
        wire.id = Some(String::new());
        assert!(Reminder::wire_id(&wire).is_none());
    }

    #[test]
    fn test_archive_toggles_flag() {
        let mut r = sample_reminder();
        r.set_archived(true);
        assert!(r.is_archived());
        r.set_archived(false);
        assert!(!r.is_archived());
    }
}
