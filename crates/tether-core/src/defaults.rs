//! Centralized default constants.

// =============================================================================
// STORAGE KEYS
// =============================================================================

/// Secure-store key holding the JSON keypair.
pub const KEY_ENCRYPTION_KEYS: &str = "encryptionKeys";

/// Secure-store key holding the session.
pub const KEY_AUTH_SESSION: &str = "authSession";

/// Plain-store collection of reminders.
pub const COLLECTION_REMINDERS: &str = "reminders";

/// Plain-store collection of location presets.
pub const COLLECTION_PRESETS: &str = "locationPresets";

/// Suffix appended to a collection key for its pending remote deletes.
pub const PENDING_DELETES_SUFFIX: &str = ".pendingDeletes";

// =============================================================================
// SYNC
// =============================================================================

/// Placeholder shown for a sensitive field that failed to decrypt.
pub const UNDECRYPTABLE: &str = "[Unable to decrypt]";

/// HKDF context for the preset field secret-box key.
pub const PRESET_KEY_CONTEXT: &str = "tether-preset-fields-v1";

/// HTTP request timeout for the sync backend.
pub const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Event bus buffer capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Default sync backend URL.
pub const API_BASE_URL: &str = "http://localhost:8080/api/v1";

/// Default data directory, relative to the working directory.
pub const DATA_DIR: &str = ".tether";

/// Subdirectory of the data directory for the plain store.
pub const PLAIN_STORE_DIR: &str = "plain";

/// Subdirectory of the data directory for the secure store.
pub const SECURE_STORE_DIR: &str = "secure";

/// Key for the pending-deletes list of a collection.
pub fn pending_deletes_key(collection: &str) -> String {
    format!("{}{}", collection, PENDING_DELETES_SUFFIX)
}
