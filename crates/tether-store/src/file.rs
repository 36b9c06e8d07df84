//! Filesystem key-value store.
//!
//! One file per key under a base directory. Writes go to a temp file that is
//! synced and renamed over the target, so a crash never leaves a half-written
//! value behind.
//!
//! Keys are encoded into file names: ASCII alphanumerics, `-` and `_` pass
//! through, everything else (including `.` and `/`) becomes `%XX`. This keeps
//! `reminders.pendingDeletes` and path-like keys inside the base directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use tether_core::{Error, KeyValueStore, Result};

const VALUE_EXT: &str = "val";

/// Directory-backed store.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `base_path`. The directory is created lazily.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn full_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(Error::InvalidInput("empty storage key".to_string()));
        }
        Ok(self
            .base_path
            .join(format!("{}.{}", encode_key(key), VALUE_EXT)))
    }

    /// Round-trip a sentinel value to catch permission or mount problems early.
    pub async fn validate(&self) -> Result<()> {
        let key = ".health-check";
        self.set(key, "ok").await?;
        let read = self.get(key).await?;
        self.remove(key).await?;
        if read.as_deref() != Some("ok") {
            return Err(Error::StorageUnavailable(format!(
                "read-back mismatch in {}",
                self.base_path.display()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.full_path(key)?;
        match fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                warn!(storage_key = %key, path = %path.display(), error = %e, "file_store: read failed");
                Err(Error::StorageUnavailable(format!("read {}: {}", key, e)))
            }
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.full_path(key)?;
        debug!(storage_key = %key, size = value.len(), "file_store: write");
        write_atomic(&path, value.as_bytes()).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.full_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(storage_key = %key, error = %e, "file_store: remove failed");
                Err(Error::StorageUnavailable(format!("remove {}: {}", key, e)))
            }
        }
    }

    fn backend_type(&self) -> &'static str {
        "file"
    }
}

/// Write `data` to `path` via temp file + rename.
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            warn!(parent = %parent.display(), error = %e, "file_store: create_dir_all failed");
            Error::StorageUnavailable(format!("create {}: {}", parent.display(), e))
        })?;
    }

    let temp_path = path.with_extension("tmp");
    // A leftover temp file would keep its old mode.
    match fs::remove_file(&temp_path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
        _ => {}
    }

    // Values may hold sealed secrets: owner-only from the first byte.
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(&temp_path).await.map_err(|e| {
        warn!(temp_path = %temp_path.display(), error = %e, "file_store: open temp file failed");
        Error::StorageUnavailable(format!("create {}: {}", temp_path.display(), e))
    })?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&temp_path, path).await.map_err(|e| {
        warn!(from = %temp_path.display(), to = %path.display(), error = %e, "file_store: rename failed");
        Error::StorageUnavailable(format!("rename to {}: {}", path.display(), e))
    })?;

    Ok(())
}

fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}
