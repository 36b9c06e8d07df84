//! Storage abstractions.

use async_trait::async_trait;

use crate::Result;

/// String-valued key-value storage.
///
/// Two flavours exist: a plain store for collections whose sensitive fields
/// are already protected, and a secure store (confidentiality and integrity
/// at rest) used only for the keypair and the session token. Backend failures
/// surface as `Error::StorageUnavailable`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Value for `key`, or `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Remove several keys.
    async fn remove_many(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }

    /// Backend name for logs.
    fn backend_type(&self) -> &'static str;
}
