//! Offline-first sync engine.
//!
//! One engine per collection. Every mutation is written to the local store
//! first and only then mirrored to the backend on a best-effort basis: a
//! remote failure never fails or rolls back the local write. The next
//! [`SyncEngine::refresh`] is the retry mechanism; there is no background
//! queue.
//!
//! Per-record lifecycle:
//!
//! ```text
//! LocalOnly -> PendingRemote -> Synced
//!                  |              |
//!                  +-> LocalOnly <+   (remote push failed / local edit)
//! ```
//!
//! Remote deletes that fail leave a tombstone under
//! `<collection>.pendingDeletes` so the record is not resurrected by the next
//! snapshot.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use tether_core::defaults::pending_deletes_key;
use tether_core::{
    Error, EventBus, KeyValueStore, RecordId, Result, Session, SyncEvent, SyncState,
};
use tether_crypto::Keypair;
use tether_store::{KeyStore, SessionStore};

use crate::prior::PriorData;
use crate::record::{Archivable, SyncRecord};
use crate::remote::RemoteStore;

/// Outcome of a batch operation.
///
/// `applied` counts items changed locally, which is what the user sees.
/// `remote_failed` lists the items whose remote mirror failed; they are
/// retried by the next refresh.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    pub requested: usize,
    pub applied: usize,
    pub remote_failed: Vec<RecordId>,
}

impl BatchOutcome {
    pub fn fully_synced(&self) -> bool {
        self.remote_failed.is_empty()
    }
}

/// Why a refresh stopped before contacting the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoSession,
    NoKeypair,
}

/// Outcome of [`SyncEngine::refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshReport {
    /// A remote snapshot was fetched and merged.
    Synced {
        records: usize,
        undecryptable: usize,
        pushed: usize,
        push_failed: usize,
        deletes_retried: usize,
    },
    /// The backend was unreachable or rejected us; the local cache is kept.
    Offline { reason: String },
    /// Nothing to reconcile against.
    Skipped(SkipReason),
}

/// Sync engine for one record collection.
pub struct SyncEngine<R: SyncRecord> {
    local: Arc<dyn KeyValueStore>,
    keys: KeyStore,
    sessions: SessionStore,
    remote: Arc<dyn RemoteStore<R::Wire>>,
    events: EventBus,
    prior: PriorData,
    records: RwLock<Vec<R>>,
    /// The local cache has been read into `records`.
    loaded: AtomicBool,
    /// `records` holds changes the local store has not accepted yet.
    persist_pending: AtomicBool,
}

impl<R: SyncRecord> SyncEngine<R> {
    pub fn new(
        local: Arc<dyn KeyValueStore>,
        keys: KeyStore,
        sessions: SessionStore,
        remote: Arc<dyn RemoteStore<R::Wire>>,
        events: EventBus,
    ) -> Self {
        let prior = PriorData::new().with_collection::<R>(local.clone(), remote.clone());
        Self {
            local,
            keys,
            sessions,
            remote,
            events,
            prior,
            records: RwLock::new(Vec::new()),
            loaded: AtomicBool::new(false),
            persist_pending: AtomicBool::new(false),
        }
    }

    /// Check `prior` for encrypted data before generating a keypair.
    ///
    /// Defaults to this collection only. Engines of one account should share
    /// a [`PriorData`] covering every collection.
    pub fn with_prior_data(mut self, prior: PriorData) -> Self {
        self.prior = prior;
        self
    }

    pub fn collection(&self) -> &'static str {
        R::COLLECTION
    }

    /// Snapshot of the visible records.
    pub async fn records(&self) -> Vec<R> {
        self.records.read().await.clone()
    }

    pub async fn get(&self, id: &RecordId) -> Option<R> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.id() == id)
            .cloned()
    }

    // ========================================================================
    // Local cache
    // ========================================================================

    /// Read the local cache and make it visible. A missing key is an empty
    /// collection.
    ///
    /// In-memory changes the store has not accepted yet are never replaced
    /// by the older cache; they are written again instead.
    #[instrument(skip(self), fields(collection = R::COLLECTION))]
    pub async fn load_local(&self) -> Result<Vec<R>> {
        let mut guard = self.records.write().await;
        if self.persist_pending.load(Ordering::Acquire) {
            self.flush_pending(&guard[..]).await;
            return Ok(guard.clone());
        }
        let records = self.read_cache().await?;
        debug!(record_count = records.len(), "Loaded local cache");
        *guard = records.clone();
        self.loaded.store(true, Ordering::Release);
        Ok(records)
    }

    async fn read_cache(&self) -> Result<Vec<R>> {
        match self.local.get(R::COLLECTION).await? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    async fn persist(&self, records: &[R]) -> Result<()> {
        let json = serde_json::to_string(records)?;
        self.local.set(R::COLLECTION, &json).await.map_err(|e| {
            error!(collection = R::COLLECTION, error = %e, "Local write failed");
            match e {
                Error::StorageUnavailable(_) => e,
                other => Error::StorageUnavailable(other.to_string()),
            }
        })
    }

    /// Apply `f` to a copy of the records, persist it, then publish it.
    /// Nothing changes if `f` or the write fails.
    async fn commit<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<R>) -> Result<T> + Send,
        T: Send,
    {
        let mut guard = self.records.write().await;
        if !self.loaded.load(Ordering::Acquire) {
            *guard = self.read_cache().await?;
            self.loaded.store(true, Ordering::Release);
        }
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.persist(&next).await?;
        *guard = next;
        self.persist_pending.store(false, Ordering::Release);
        Ok(out)
    }

    /// Like [`commit`](Self::commit) for background bookkeeping: the change is
    /// published even if the write fails. A failed write is logged and
    /// retried by the next refresh or [`load_local`](Self::load_local).
    async fn commit_background<T>(&self, f: impl FnOnce(&mut Vec<R>) -> T + Send) -> T {
        let mut guard = self.records.write().await;
        let out = f(&mut *guard);
        match self.persist(&guard[..]).await {
            Ok(()) => self.persist_pending.store(false, Ordering::Release),
            Err(e) => {
                warn!(collection = R::COLLECTION, error = %e, "Background local write failed; will retry");
                self.persist_pending.store(true, Ordering::Release);
            }
        }
        out
    }

    /// Write `records` if an earlier background write failed.
    async fn flush_pending(&self, records: &[R]) {
        match self.persist(records).await {
            Ok(()) => {
                self.persist_pending.store(false, Ordering::Release);
                info!(collection = R::COLLECTION, "Pending local write recovered");
            }
            Err(e) => {
                warn!(collection = R::COLLECTION, error = %e, "Pending local write still failing");
            }
        }
    }

    async fn set_state(&self, id: &RecordId, state: SyncState) {
        if let Some(r) = self.records.write().await.iter_mut().find(|r| r.id() == id) {
            r.set_sync_state(state);
        }
    }

    // ========================================================================
    // Tombstones
    // ========================================================================

    async fn load_tombstones(&self) -> Vec<String> {
        let key = pending_deletes_key(R::COLLECTION);
        match self.local.get(&key).await {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!(storage_key = %key, error = %e, "Discarding unreadable pending deletes");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(storage_key = %key, error = %e, "Could not read pending deletes");
                Vec::new()
            }
        }
    }

    async fn save_tombstones(&self, ids: &[String]) {
        let key = pending_deletes_key(R::COLLECTION);
        let result = if ids.is_empty() {
            self.local.remove(&key).await
        } else {
            match serde_json::to_string(ids) {
                Ok(json) => self.local.set(&key, &json).await,
                Err(e) => Err(e.into()),
            }
        };
        if let Err(e) = result {
            warn!(storage_key = %key, error = %e, "Could not write pending deletes");
        }
    }

    async fn add_tombstones(&self, ids: impl IntoIterator<Item = String>) {
        let mut current = self.load_tombstones().await;
        let before = current.len();
        for id in ids {
            if !current.contains(&id) {
                current.push(id);
            }
        }
        if current.len() != before {
            self.save_tombstones(&current).await;
        }
    }

    /// Remote ids whose delete has not reached the backend yet.
    pub async fn pending_deletes(&self) -> Vec<String> {
        self.load_tombstones().await
    }

    // ========================================================================
    // Remote mirror
    // ========================================================================

    /// True if this collection has ever held data encrypted under a keypair:
    /// pushed or undecryptable records, or pending remote deletes.
    ///
    /// Only this collection's local state is checked; see [`PriorData`] for
    /// the account-wide answer.
    pub async fn has_prior_encrypted_data(&self) -> bool {
        let has_remote_records = self.records.read().await.iter().any(|r| {
            r.id().remote().is_some() || r.sync_state() == SyncState::Undecryptable
        });
        has_remote_records || !self.load_tombstones().await.is_empty()
    }

    /// Keypair for sealing, generated only on a genuine first run: no
    /// encrypted data in any collection, locally or on the backend.
    async fn ensure_keypair(&self, session: &Session) -> Result<Keypair> {
        if let Some(keypair) = self.keys.load().await? {
            return Ok(keypair);
        }
        let prior_encrypted_data = self.has_prior_encrypted_data().await
            || self.prior.exists(Some(&session.token)).await?;
        Ok(self
            .keys
            .ensure_keypair(prior_encrypted_data)
            .await?
            .into_keypair())
    }

    async fn require_session(&self) -> Result<Session> {
        self.sessions
            .load()
            .await?
            .ok_or_else(|| Error::RemoteSync("not signed in".to_string()))
    }

    fn report_failure(&self, id: &RecordId, op: &'static str, e: &Error) {
        warn!(
            collection = R::COLLECTION,
            record_id = %id,
            op,
            error = %e,
            "Remote sync failed; local copy kept"
        );
        if matches!(e, Error::Unauthorized(_)) {
            self.events.emit(SyncEvent::Unauthorized {
                collection: R::COLLECTION.to_string(),
            });
        }
        self.events.emit(SyncEvent::PushFailed {
            collection: R::COLLECTION.to_string(),
            record_id: id.to_string(),
            op: op.to_string(),
            error: e.to_string(),
        });
    }

    /// Seal and send one record. Returns the backend id.
    async fn push_with(
        &self,
        session: &Session,
        keypair: &Keypair,
        record: &R,
        op: &'static str,
    ) -> Result<R> {
        self.set_state(record.id(), SyncState::PendingRemote).await;

        let sent: Result<String> = async {
            let wire = record.seal(keypair)?;
            match record.id() {
                RecordId::Remote(id) => match self.remote.update(&session.token, id, &wire).await {
                    Ok(()) => Ok(id.clone()),
                    Err(Error::NotFound(_)) => {
                        // Deleted elsewhere after this edit: the edit wins.
                        info!(
                            collection = R::COLLECTION,
                            record_id = %id,
                            "Edited record was deleted remotely; re-creating"
                        );
                        let mut fresh = record.clone();
                        fresh.set_id(RecordId::new_local());
                        self.create_remote(session, &fresh.seal(keypair)?).await
                    }
                    Err(e) => Err(e),
                },
                RecordId::Local(_) => self.create_remote(session, &wire).await,
            }
        }
        .await;

        match sent {
            Ok(remote_id) => Ok(self.mark_synced(record, remote_id, op).await),
            Err(e) => {
                self.set_state(record.id(), SyncState::LocalOnly).await;
                self.report_failure(record.id(), op, &e);
                Err(e)
            }
        }
    }

    async fn create_remote(&self, session: &Session, wire: &R::Wire) -> Result<String> {
        let created = self.remote.create(&session.token, wire).await?;
        R::wire_id(&created)
            .map(String::from)
            .ok_or_else(|| Error::RemoteSync("create response carried no id".to_string()))
    }

    /// Upgrade the record's id in place and mark it synced.
    async fn mark_synced(&self, record: &R, remote_id: String, op: &'static str) -> R {
        let old_id = record.id().clone();
        let new_id = RecordId::Remote(remote_id.clone());

        let updated = self
            .commit_background(|records| {
                records.iter_mut().find(|r| *r.id() == old_id).map(|r| {
                    r.set_id(new_id.clone());
                    r.set_sync_state(SyncState::Synced);
                    r.clone()
                })
            })
            .await;

        let updated = match updated {
            Some(r) => r,
            None => {
                // Deleted locally while the push was in flight.
                debug!(record_id = %new_id, "Pushed record no longer present; scheduling delete");
                self.add_tombstones([remote_id.clone()]).await;
                let mut r = record.clone();
                r.set_id(new_id);
                r
            }
        };

        debug!(collection = R::COLLECTION, local_id = %old_id, remote_id = %remote_id, op, "Pushed");
        self.events.emit(SyncEvent::PushSucceeded {
            collection: R::COLLECTION.to_string(),
            local_id: old_id.to_string(),
            remote_id,
            op: op.to_string(),
        });
        updated
    }

    /// Push one record, swallowing any failure. Returns the record as stored.
    async fn push_best_effort(&self, record: R, op: &'static str) -> R {
        let prepared: Result<(Session, Keypair)> = async {
            let session = self.require_session().await?;
            let keypair = self.ensure_keypair(&session).await?;
            Ok((session, keypair))
        }
        .await;

        match prepared {
            Ok((session, keypair)) => match self.push_with(&session, &keypair, &record, op).await {
                Ok(updated) => updated,
                Err(_) => {
                    let id = record.id().clone();
                    self.get(&id).await.unwrap_or(record)
                }
            },
            Err(e) => {
                self.report_failure(record.id(), op, &e);
                record
            }
        }
    }

    /// Delete remote ids, tombstoning failures. Returns the ids that failed.
    async fn delete_remote_best_effort(&self, ids: &[RecordId]) -> Vec<RecordId> {
        let remote_ids: Vec<&RecordId> = ids.iter().filter(|id| id.remote().is_some()).collect();
        if remote_ids.is_empty() {
            return Vec::new();
        }

        let session = match self.require_session().await {
            Ok(s) => Some(s),
            Err(e) => {
                for id in &remote_ids {
                    self.report_failure(id, "delete", &e);
                }
                None
            }
        };

        let mut failed = Vec::new();
        for id in remote_ids {
            let result = match (&session, id.remote()) {
                (Some(session), Some(remote_id)) => {
                    self.remote.delete(&session.token, remote_id).await
                }
                _ => Err(Error::RemoteSync("not signed in".to_string())),
            };
            match result {
                Ok(()) => {
                    self.events.emit(SyncEvent::PushSucceeded {
                        collection: R::COLLECTION.to_string(),
                        local_id: id.to_string(),
                        remote_id: id.to_string(),
                        op: "delete".to_string(),
                    });
                }
                Err(e) => {
                    if session.is_some() {
                        self.report_failure(id, "delete", &e);
                    }
                    failed.push(id.clone());
                }
            }
        }

        self.add_tombstones(failed.iter().filter_map(|id| id.remote().map(String::from)))
            .await;
        failed
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Create a record locally, then try to push it.
    ///
    /// Fails only if the local write fails. Returns the record as stored
    /// after the push attempt: `Synced` with a remote id, or `LocalOnly`.
    #[instrument(skip(self, record), fields(collection = R::COLLECTION, op = "create"))]
    pub async fn create(&self, mut record: R) -> Result<R> {
        record.set_id(RecordId::new_local());
        record.set_sync_state(SyncState::LocalOnly);

        let stored = record.clone();
        self.commit(move |records| {
            records.push(stored);
            Ok(())
        })
        .await?;

        info!(record_id = %record.id(), "Record created locally");
        self.events.emit(SyncEvent::RecordSaved {
            collection: R::COLLECTION.to_string(),
            record_id: record.id().to_string(),
            op: "create".to_string(),
        });

        Ok(self.push_best_effort(record, "create").await)
    }

    /// Replace a record locally, then try to mirror the change.
    ///
    /// # Errors
    ///
    /// - `Error::NotFound` if no record has this id.
    /// - `Error::InvalidInput` if the stored record is undecryptable; writing
    ///   it back would overwrite the remote ciphertext with the placeholder.
    /// - `Error::StorageUnavailable` if the local write fails.
    #[instrument(skip(self, record), fields(collection = R::COLLECTION, op = "update", record_id = %record.id()))]
    pub async fn update(&self, mut record: R) -> Result<R> {
        record.set_sync_state(SyncState::LocalOnly);
        let id = record.id().clone();

        let stored = record.clone();
        self.commit(move |records| {
            let slot = records
                .iter_mut()
                .find(|r| *r.id() == id)
                .ok_or_else(|| Error::NotFound(format!("{} {}", R::COLLECTION, id)))?;
            if slot.sync_state() == SyncState::Undecryptable {
                return Err(Error::InvalidInput(format!(
                    "{} {} could not be decrypted and cannot be edited",
                    R::COLLECTION,
                    id
                )));
            }
            *slot = stored;
            Ok(())
        })
        .await?;

        self.events.emit(SyncEvent::RecordSaved {
            collection: R::COLLECTION.to_string(),
            record_id: record.id().to_string(),
            op: "update".to_string(),
        });

        Ok(self.push_best_effort(record, "update").await)
    }

    /// Remove a record locally, then try to delete it remotely.
    #[instrument(skip(self), fields(collection = R::COLLECTION, op = "delete"))]
    pub async fn delete(&self, id: &RecordId) -> Result<()> {
        let target = id.clone();
        self.commit(move |records| {
            let before = records.len();
            records.retain(|r| *r.id() != target);
            if records.len() == before {
                return Err(Error::NotFound(format!("{} {}", R::COLLECTION, target)));
            }
            Ok(())
        })
        .await?;

        info!(record_id = %id, "Record deleted locally");
        self.delete_remote_best_effort(std::slice::from_ref(id))
            .await;
        Ok(())
    }

    /// Delete many records. Missing ids are skipped; one local write for the
    /// batch; each remote delete is independent.
    #[instrument(skip(self, ids), fields(collection = R::COLLECTION, op = "delete_many", requested = ids.len()))]
    pub async fn delete_many(&self, ids: &[RecordId]) -> Result<BatchOutcome> {
        let wanted: HashSet<RecordId> = ids.iter().cloned().collect();
        let removed = self
            .commit(move |records| {
                let mut removed = Vec::new();
                records.retain(|r| {
                    if wanted.contains(r.id()) {
                        removed.push(r.id().clone());
                        false
                    } else {
                        true
                    }
                });
                Ok(removed)
            })
            .await?;

        let remote_failed = self.delete_remote_best_effort(&removed).await;
        let outcome = BatchOutcome {
            requested: ids.len(),
            applied: removed.len(),
            remote_failed,
        };
        info!(
            applied = outcome.applied,
            remote_failed = outcome.remote_failed.len(),
            "Batch delete finished"
        );
        Ok(outcome)
    }

    async fn push_many(&self, ids: Vec<RecordId>, op: &'static str) -> Vec<RecordId> {
        let mut failed = Vec::new();
        for id in ids {
            let Some(record) = self.get(&id).await else {
                continue;
            };
            let stored = self.push_best_effort(record, op).await;
            if stored.sync_state() != SyncState::Synced {
                failed.push(stored.id().clone());
            }
        }
        failed
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Reconcile the local cache with the backend.
    ///
    /// The local cache is loaded and visible first; if an earlier background
    /// write failed, the newer in-memory state is written again instead of
    /// being replaced by the stale cache. Without a session or a
    /// keypair the pass stops there. Otherwise pending deletes and unpushed
    /// changes are retried, the remote snapshot is fetched and each record is
    /// decrypted on its own; records that fail show the placeholder text. The
    /// merged result replaces the visible state.
    ///
    /// Remote failures are reported as [`RefreshReport::Offline`], never as
    /// an error.
    #[instrument(skip(self), fields(collection = R::COLLECTION, op = "refresh"))]
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let started = Instant::now();

        if !self.loaded.load(Ordering::Acquire) {
            if let Err(e) = self.load_local().await {
                warn!(error = %e, "Local cache unreadable; keeping in-memory state");
            }
        } else if self.persist_pending.load(Ordering::Acquire) {
            let guard = self.records.write().await;
            self.flush_pending(&guard[..]).await;
        }

        let session = match self.sessions.load().await {
            Ok(Some(s)) => s,
            Ok(None) => return Ok(RefreshReport::Skipped(SkipReason::NoSession)),
            Err(e) => {
                warn!(error = %e, "Session unreadable; skipping refresh");
                return Ok(RefreshReport::Skipped(SkipReason::NoSession));
            }
        };
        let keypair = match self.keys.load().await {
            Ok(Some(k)) => k,
            Ok(None) => return Ok(RefreshReport::Skipped(SkipReason::NoKeypair)),
            Err(e) => {
                warn!(error = %e, "Keypair unreadable; skipping refresh");
                return Ok(RefreshReport::Skipped(SkipReason::NoKeypair));
            }
        };

        self.events.emit(SyncEvent::RefreshStarted {
            collection: R::COLLECTION.to_string(),
        });

        // 1. Pending deletes.
        let tombstones = self.load_tombstones().await;
        let mut remaining = Vec::new();
        let mut deletes_retried = 0;
        let mut pending = tombstones.into_iter();
        while let Some(remote_id) = pending.next() {
            match self.remote.delete(&session.token, &remote_id).await {
                Ok(()) => deletes_retried += 1,
                Err(e @ Error::Unauthorized(_)) => {
                    remaining.push(remote_id);
                    remaining.extend(pending);
                    self.save_tombstones(&remaining).await;
                    return Ok(self.offline(e));
                }
                Err(e) => {
                    debug!(remote_id = %remote_id, error = %e, "Pending delete still failing");
                    remaining.push(remote_id);
                }
            }
        }
        self.save_tombstones(&remaining).await;

        // 2. Unpushed local changes.
        let dirty: Vec<R> = self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.sync_state().is_dirty())
            .cloned()
            .collect();
        let mut pushed = 0;
        let mut push_failed = 0;
        for record in dirty {
            let op = if record.id().is_local() { "create" } else { "update" };
            match self.push_with(&session, &keypair, &record, op).await {
                Ok(_) => pushed += 1,
                // Already announced by the failed push.
                Err(e @ Error::Unauthorized(_)) => return Ok(self.announce_offline(e)),
                Err(_) => push_failed += 1,
            }
        }

        // 3. Remote snapshot.
        let snapshot = match self.remote.list(&session.token).await {
            Ok(s) => s,
            Err(e) => return Ok(self.offline(e)),
        };

        // 4. Decrypt each record independently.
        let tombstoned: HashSet<&str> = remaining.iter().map(String::as_str).collect();
        let mut opened = Vec::with_capacity(snapshot.len());
        let mut undecryptable = 0;
        for wire in &snapshot {
            let Some(remote_id) = R::wire_id(wire) else {
                warn!("Remote record without id skipped");
                continue;
            };
            if tombstoned.contains(remote_id) {
                continue;
            }
            let result = R::open(wire, &keypair);
            if let Some(e) = result.error {
                undecryptable += 1;
                warn!(record_id = %remote_id, error = %e, "Record could not be decrypted");
                self.events.emit(SyncEvent::RecordUndecryptable {
                    collection: R::COLLECTION.to_string(),
                    record_id: remote_id.to_string(),
                    error: e.to_string(),
                });
            }
            opened.push(result.record);
        }

        // 5. Merge: remote snapshot, local unpushed edits win, local-only
        //    records are kept.
        let count = self
            .commit_background(|records| {
                let merged = merge(std::mem::take(records), opened);
                *records = merged;
                records.len()
            })
            .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            record_count = count,
            undecryptable_count = undecryptable,
            pushed,
            push_failed,
            duration_ms,
            "Refresh completed"
        );
        self.events.emit(SyncEvent::RefreshCompleted {
            collection: R::COLLECTION.to_string(),
            count,
            undecryptable,
            duration_ms,
        });

        Ok(RefreshReport::Synced {
            records: count,
            undecryptable,
            pushed,
            push_failed,
            deletes_retried,
        })
    }

    fn offline(&self, e: Error) -> RefreshReport {
        if matches!(e, Error::Unauthorized(_)) {
            self.events.emit(SyncEvent::Unauthorized {
                collection: R::COLLECTION.to_string(),
            });
        }
        self.announce_offline(e)
    }

    fn announce_offline(&self, e: Error) -> RefreshReport {
        warn!(collection = R::COLLECTION, error = %e, "Refresh could not reach the backend; local cache kept");
        self.events.emit(SyncEvent::RefreshOffline {
            collection: R::COLLECTION.to_string(),
            reason: e.to_string(),
        });
        RefreshReport::Offline {
            reason: e.to_string(),
        }
    }
}

impl<R: Archivable> SyncEngine<R> {
    /// Archive many records; same independence rules as `delete_many`.
    pub async fn archive_many(&self, ids: &[RecordId]) -> Result<BatchOutcome> {
        self.set_archived_many(ids, true, "archive").await
    }

    /// Restore many archived records.
    pub async fn restore_many(&self, ids: &[RecordId]) -> Result<BatchOutcome> {
        self.set_archived_many(ids, false, "restore").await
    }

    #[instrument(skip(self, ids), fields(collection = R::COLLECTION, requested = ids.len()))]
    async fn set_archived_many(
        &self,
        ids: &[RecordId],
        archived: bool,
        op: &'static str,
    ) -> Result<BatchOutcome> {
        let wanted: HashSet<RecordId> = ids.iter().cloned().collect();
        let changed = self
            .commit(move |records| {
                let mut changed = Vec::new();
                for r in records.iter_mut() {
                    if wanted.contains(r.id()) && r.sync_state() != SyncState::Undecryptable {
                        r.set_archived(archived);
                        r.set_sync_state(SyncState::LocalOnly);
                        changed.push(r.id().clone());
                    }
                }
                Ok(changed)
            })
            .await?;

        let applied = changed.len();
        let remote_failed = self.push_many(changed, op).await;
        info!(applied, remote_failed = remote_failed.len(), "Batch {} finished", op);
        Ok(BatchOutcome {
            requested: ids.len(),
            applied,
            remote_failed,
        })
    }
}

/// Merge local records with a decrypted remote snapshot.
///
/// - Remote records replace synced local copies.
/// - Dirty local copies of remote records win over the snapshot.
/// - Records never pushed (local id) are kept.
/// - Synced local records missing from the snapshot were deleted elsewhere
///   and are dropped.
fn merge<R: SyncRecord>(local: Vec<R>, remote: Vec<R>) -> Vec<R> {
    let mut dirty: HashMap<RecordId, R> = HashMap::new();
    let mut unpushed = Vec::new();
    for r in local {
        if r.id().is_local() {
            unpushed.push(r);
        } else if r.sync_state().is_dirty() {
            dirty.insert(r.id().clone(), r);
        }
    }

    let mut merged = Vec::with_capacity(remote.len() + unpushed.len() + dirty.len());
    for r in remote {
        match dirty.remove(r.id()) {
            Some(local) => merged.push(local),
            None => merged.push(r),
        }
    }
    merged.extend(dirty.into_values());
    merged.extend(unpushed);
    merged
}
