//! Encrypted-at-rest key-value store.
//!
//! Wraps a [`FileStore`] and seals every value with the passphrase-derived
//! vault key. The vault header lives next to the values as `vault.json`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use tether_core::{Error, KeyValueStore, Result};
use tether_crypto::{base64_decode, base64_encode, validate_passphrase, KdfParams, Vault, VaultHeader};

use crate::file::{write_atomic, FileStore};

/// Header file name inside the store directory.
pub const VAULT_HEADER_FILE: &str = "vault.json";

/// Secure store: confidentiality and integrity at rest.
pub struct VaultStore {
    inner: FileStore,
    vault: Vault,
}

impl VaultStore {
    /// Open the vault in `dir`, creating it on first use.
    ///
    /// # Errors
    ///
    /// - `Error::Crypto(Authentication)` if the passphrase does not match an
    ///   existing vault.
    /// - `Error::Crypto(PassphraseTooShort)` when creating with a weak passphrase.
    /// - `Error::StorageUnavailable` if the header cannot be read or written.
    pub async fn open_or_create(
        dir: impl Into<PathBuf>,
        passphrase: &str,
        kdf_params: KdfParams,
    ) -> Result<Self> {
        let dir = dir.into();
        let header_path = dir.join(VAULT_HEADER_FILE);

        let vault = match read_header(&header_path).await? {
            Some(header) => {
                debug!(path = %header_path.display(), "vault_store: unlocking");
                let passphrase = passphrase.to_string();
                run_kdf(move || Vault::unlock(&header, &passphrase)).await?
            }
            None => {
                validate_passphrase(passphrase)?;
                let passphrase = passphrase.to_string();
                let (header, vault) =
                    run_kdf(move || Vault::create(&passphrase, kdf_params)).await?;
                let json = serde_json::to_vec_pretty(&header)?;
                write_atomic(&header_path, &json).await?;
                info!(path = %header_path.display(), "vault_store: created");
                vault
            }
        };

        Ok(Self {
            inner: FileStore::new(dir),
            vault,
        })
    }

    pub fn base_path(&self) -> &Path {
        self.inner.base_path()
    }
}

async fn read_header(path: &Path) -> Result<Option<VaultHeader>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::StorageUnavailable(format!(
            "read {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Argon2id is CPU-bound; keep it off the async workers.
async fn run_kdf<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> tether_crypto::CryptoResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::StorageUnavailable(format!("key derivation task: {}", e)))?
        .map_err(Error::from)
}

#[async_trait]
impl KeyValueStore for VaultStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(encoded) = self.inner.get(key).await? else {
            return Ok(None);
        };
        let sealed = base64_decode(encoded.trim())?;
        let plaintext = self.vault.open(&sealed)?;
        String::from_utf8(plaintext)
            .map(Some)
            .map_err(|e| Error::Serialization(format!("vault value is not UTF-8: {}", e)))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let sealed = self.vault.seal(value.as_bytes())?;
        self.inner.set(key, &base64_encode(&sealed)).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }

    fn backend_type(&self) -> &'static str {
        "vault"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tether_crypto::CryptoError;

    const PASS: &str = "correct horse battery";

    #[tokio::test]
    async fn test_values_are_not_plaintext_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = VaultStore::open_or_create(dir.path(), PASS, KdfParams::low_memory())
            .await
            .unwrap();

        store.set("authSession", "bearer-secret").await.unwrap();
        assert_eq!(
            store.get("authSession").await.unwrap().as_deref(),
            Some("bearer-secret")
        );

        let raw = std::fs::read_to_string(dir.path().join("authSession.val")).unwrap();
        assert!(!raw.contains("bearer-secret"));
        assert!(dir.path().join(VAULT_HEADER_FILE).exists());
    }

    #[tokio::test]
    async fn test_reopen_with_same_passphrase() {
        let dir = TempDir::new().unwrap();
        {
            let store = VaultStore::open_or_create(dir.path(), PASS, KdfParams::low_memory())
                .await
                .unwrap();
            store.set("encryptionKeys", "{}").await.unwrap();
        }

        let store = VaultStore::open_or_create(dir.path(), PASS, KdfParams::low_memory())
            .await
            .unwrap();
        assert_eq!(
            store.get("encryptionKeys").await.unwrap().as_deref(),
            Some("{}")
        );
    }

    #[tokio::test]
    async fn test_wrong_passphrase_rejected() {
        let dir = TempDir::new().unwrap();
        VaultStore::open_or_create(dir.path(), PASS, KdfParams::low_memory())
            .await
            .unwrap();

        let result =
            VaultStore::open_or_create(dir.path(), "a different passphrase", KdfParams::low_memory())
                .await;
        assert!(matches!(
            result,
            Err(Error::Crypto(CryptoError::Authentication))
        ));
    }

    #[tokio::test]
    async fn test_short_passphrase_rejected_on_create() {
        let dir = TempDir::new().unwrap();
        let result = VaultStore::open_or_create(dir.path(), "short", KdfParams::low_memory()).await;
        assert!(matches!(
            result,
            Err(Error::Crypto(CryptoError::PassphraseTooShort(_)))
        ));
    }

    #[tokio::test]
    async fn test_tampered_value_fails_integrity() {
        let dir = TempDir::new().unwrap();
        let store = VaultStore::open_or_create(dir.path(), PASS, KdfParams::low_memory())
            .await
            .unwrap();
        store.set("k", "value").await.unwrap();

        let path = dir.path().join("k.val");
        let mut sealed = base64_decode(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        std::fs::write(&path, base64_encode(&sealed)).unwrap();

        assert!(matches!(
            store.get("k").await,
            Err(Error::Crypto(CryptoError::Authentication))
        ));
    }
}
