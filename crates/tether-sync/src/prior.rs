//! Account-wide detection of data sealed under an earlier keypair.
//!
//! A keypair may only be generated when the account has no encrypted data
//! anywhere: not in any local collection cache and not on the backend. Every
//! engine and the onboarding path consult the same [`PriorData`] so a lost
//! key is never silently replaced from a collection that happens to be empty.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use tether_core::defaults::pending_deletes_key;
use tether_core::{KeyValueStore, Result, SyncState};

use crate::record::SyncRecord;
use crate::remote::RemoteStore;

#[async_trait]
trait CollectionEvidence: Send + Sync {
    fn collection(&self) -> &'static str;

    /// Pushed or undecryptable records in the local cache, or pending deletes.
    async fn in_local_cache(&self) -> bool;

    /// Any record on the backend.
    async fn on_backend(&self, token: &str) -> Result<bool>;
}

struct Collection<R: SyncRecord> {
    local: Arc<dyn KeyValueStore>,
    remote: Arc<dyn RemoteStore<R::Wire>>,
}

#[async_trait]
impl<R: SyncRecord> CollectionEvidence for Collection<R> {
    fn collection(&self) -> &'static str {
        R::COLLECTION
    }

    async fn in_local_cache(&self) -> bool {
        let cached = match self.local.get(R::COLLECTION).await {
            Ok(Some(json)) => serde_json::from_str::<Vec<R>>(&json).unwrap_or_else(|e| {
                warn!(collection = R::COLLECTION, error = %e, "Unreadable local cache ignored");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(collection = R::COLLECTION, error = %e, "Local cache unavailable");
                Vec::new()
            }
        };
        if cached.iter().any(|r| {
            r.id().remote().is_some() || r.sync_state() == SyncState::Undecryptable
        }) {
            return true;
        }

        matches!(
            self.local.get(&pending_deletes_key(R::COLLECTION)).await,
            Ok(Some(json)) if json.trim() != "[]"
        )
    }

    async fn on_backend(&self, token: &str) -> Result<bool> {
        Ok(!self.remote.list(token).await?.is_empty())
    }
}

/// Every collection of one account, checked together.
#[derive(Clone, Default)]
pub struct PriorData {
    collections: Vec<Arc<dyn CollectionEvidence>>,
}

impl PriorData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include collection `R`, cached in `local` and mirrored to `remote`.
    pub fn with_collection<R: SyncRecord>(
        mut self,
        local: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteStore<R::Wire>>,
    ) -> Self {
        self.collections
            .push(Arc::new(Collection::<R> { local, remote }));
        self
    }

    /// Collections included so far.
    pub fn collections(&self) -> Vec<&'static str> {
        self.collections.iter().map(|c| c.collection()).collect()
    }

    /// True if any collection holds encrypted data.
    ///
    /// Local caches are checked first. With a `token` the backend is asked
    /// too; a failed backend call is returned as an error, since an
    /// unanswered question must not be read as "no data".
    pub async fn exists(&self, token: Option<&str>) -> Result<bool> {
        for collection in &self.collections {
            if collection.in_local_cache().await {
                debug!(collection = collection.collection(), "Encrypted data found locally");
                return Ok(true);
            }
        }

        let Some(token) = token else {
            return Ok(false);
        };
        for collection in &self.collections {
            if collection.on_backend(token).await? {
                debug!(collection = collection.collection(), "Encrypted data found on backend");
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::{Error, RecordId, Reminder, ReminderWire};
    use tether_store::MemoryStore;

    struct StaticRemote {
        records: Vec<ReminderWire>,
        online: bool,
    }

    #[async_trait]
    impl RemoteStore<ReminderWire> for StaticRemote {
        async fn list(&self, _token: &str) -> Result<Vec<ReminderWire>> {
            if self.online {
                Ok(self.records.clone())
            } else {
                Err(Error::RemoteSync("connection refused".to_string()))
            }
        }
        async fn create(&self, _token: &str, record: &ReminderWire) -> Result<ReminderWire> {
            Ok(record.clone())
        }
        async fn update(&self, _token: &str, _id: &str, _record: &ReminderWire) -> Result<()> {
            Ok(())
        }
        async fn delete(&self, _token: &str, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn remote(records: Vec<ReminderWire>, online: bool) -> Arc<dyn RemoteStore<ReminderWire>> {
        Arc::new(StaticRemote { records, online })
    }

    fn sealed_wire() -> ReminderWire {
        let keypair = tether_crypto::Keypair::generate().unwrap();
        let mut wire = Reminder::new("t", "l", 0.0, 0.0, 10).seal(&keypair).unwrap();
        wire.id = Some("r-1".to_string());
        wire
    }

    #[tokio::test]
    async fn test_empty_account_has_no_prior_data() {
        let prior = PriorData::new()
            .with_collection::<Reminder>(Arc::new(MemoryStore::new()), remote(Vec::new(), true));
        assert!(!prior.exists(None).await.unwrap());
        assert!(!prior.exists(Some("t")).await.unwrap());
    }

    #[tokio::test]
    async fn test_pushed_record_in_cache_counts() {
        let local = Arc::new(MemoryStore::new());
        let mut synced = Reminder::new("t", "l", 0.0, 0.0, 10);
        synced.id = RecordId::Remote("r-1".to_string());
        synced.sync_state = SyncState::Synced;
        local
            .set(Reminder::COLLECTION, &serde_json::to_string(&[synced]).unwrap())
            .await
            .unwrap();

        let prior = PriorData::new().with_collection::<Reminder>(local, remote(Vec::new(), false));
        assert!(prior.exists(None).await.unwrap());
    }

    #[tokio::test]
    async fn test_local_only_records_do_not_count() {
        let local = Arc::new(MemoryStore::new());
        let unpushed = vec![Reminder::new("t", "l", 0.0, 0.0, 10)];
        local
            .set(Reminder::COLLECTION, &serde_json::to_string(&unpushed).unwrap())
            .await
            .unwrap();

        let prior = PriorData::new().with_collection::<Reminder>(local, remote(Vec::new(), true));
        assert!(!prior.exists(Some("t")).await.unwrap());
    }

    #[tokio::test]
    async fn test_pending_deletes_count() {
        let local = Arc::new(MemoryStore::new());
        local
            .set(&pending_deletes_key(Reminder::COLLECTION), r#"["r-9"]"#)
            .await
            .unwrap();

        let prior = PriorData::new().with_collection::<Reminder>(local, remote(Vec::new(), true));
        assert!(prior.exists(None).await.unwrap());
    }

    #[tokio::test]
    async fn test_backend_records_count_only_with_token() {
        let prior = PriorData::new().with_collection::<Reminder>(
            Arc::new(MemoryStore::new()),
            remote(vec![sealed_wire()], true),
        );
        assert!(!prior.exists(None).await.unwrap());
        assert!(prior.exists(Some("t")).await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_an_error() {
        let prior = PriorData::new()
            .with_collection::<Reminder>(Arc::new(MemoryStore::new()), remote(Vec::new(), false));
        assert!(matches!(
            prior.exists(Some("t")).await,
            Err(Error::RemoteSync(_))
        ));
    }

    #[tokio::test]
    async fn test_collections_listed_in_order() {
        let prior = PriorData::new()
            .with_collection::<Reminder>(Arc::new(MemoryStore::new()), remote(Vec::new(), true));
        assert_eq!(prior.collections(), vec![Reminder::COLLECTION]);
    }
}
