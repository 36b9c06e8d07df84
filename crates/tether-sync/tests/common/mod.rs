//! Shared fixtures for sync integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tether_core::{
    Error, EventBus, KeyValueStore, LocationPresetWire, Reminder, ReminderWire, Result, Session,
};
use tether_store::{KeyStore, MemoryStore, SessionStore};
use tether_sync::{PriorData, RemoteStore, SyncEngine, SyncRecord};

pub const TOKEN: &str = "test-token";

/// Access to the id of a wire record.
pub trait WireId {
    fn wire_id(&self) -> Option<&str>;
    fn set_wire_id(&mut self, id: String);
}

impl WireId for ReminderWire {
    fn wire_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
    fn set_wire_id(&mut self, id: String) {
        self.id = Some(id);
    }
}

impl WireId for LocationPresetWire {
    fn wire_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
    fn set_wire_id(&mut self, id: String) {
        self.id = Some(id);
    }
}

/// In-memory backend with switchable failures.
pub struct FakeRemote<W> {
    pub records: Mutex<Vec<W>>,
    online: AtomicBool,
    unauthorized: AtomicBool,
    failing_deletes: Mutex<HashSet<String>>,
    next_id: AtomicUsize,
    pub creates: AtomicUsize,
}

impl<W: Clone + WireId> FakeRemote<W> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            online: AtomicBool::new(true),
            unauthorized: AtomicBool::new(false),
            failing_deletes: Mutex::new(HashSet::new()),
            next_id: AtomicUsize::new(1),
            creates: AtomicUsize::new(0),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_unauthorized(&self, unauthorized: bool) {
        self.unauthorized.store(unauthorized, Ordering::SeqCst);
    }

    pub fn fail_delete_of(&self, id: &str) {
        self.failing_deletes.lock().unwrap().insert(id.to_string());
    }

    pub fn clear_delete_failures(&self) {
        self.failing_deletes.lock().unwrap().clear();
    }

    pub fn snapshot(&self) -> Vec<W> {
        self.records.lock().unwrap().clone()
    }

    pub fn insert(&self, mut wire: W) -> String {
        let id = format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        wire.set_wire_id(id.clone());
        self.records.lock().unwrap().push(wire);
        id
    }

    fn check(&self, token: &str) -> Result<()> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(Error::RemoteSync("connection refused".to_string()));
        }
        if self.unauthorized.load(Ordering::SeqCst) || token != TOKEN {
            return Err(Error::Unauthorized("401".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl<W> RemoteStore<W> for FakeRemote<W>
where
    W: Clone + WireId + Send + Sync + 'static,
{
    async fn list(&self, token: &str) -> Result<Vec<W>> {
        self.check(token)?;
        Ok(self.snapshot())
    }

    async fn create(&self, token: &str, record: &W) -> Result<W> {
        self.check(token)?;
        self.creates.fetch_add(1, Ordering::SeqCst);
        let id = self.insert(record.clone());
        let mut created = record.clone();
        created.set_wire_id(id);
        Ok(created)
    }

    async fn update(&self, token: &str, id: &str, record: &W) -> Result<()> {
        self.check(token)?;
        let mut records = self.records.lock().unwrap();
        let slot = records
            .iter_mut()
            .find(|r| r.wire_id() == Some(id))
            .ok_or_else(|| Error::NotFound(format!("record {}", id)))?;
        *slot = record.clone();
        slot.set_wire_id(id.to_string());
        Ok(())
    }

    async fn delete(&self, token: &str, id: &str) -> Result<()> {
        self.check(token)?;
        if self.failing_deletes.lock().unwrap().contains(id) {
            return Err(Error::RemoteSync(format!("500 deleting {}", id)));
        }
        self.records
            .lock()
            .unwrap()
            .retain(|r| r.wire_id() != Some(id));
        Ok(())
    }
}

/// Plain store whose writes can be switched off.
pub struct FlakyStore {
    inner: MemoryStore,
    writes_left: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            writes_left: AtomicUsize::new(usize::MAX),
        }
    }

    pub fn set_writable(&self, writable: bool) {
        let left = if writable { usize::MAX } else { 0 };
        self.writes_left.store(left, Ordering::SeqCst);
    }

    /// Accept `n` more writes, then fail until `set_writable(true)`.
    pub fn fail_after_writes(&self, n: usize) {
        self.writes_left.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let accepted = self
            .writes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if !accepted {
            return Err(Error::StorageUnavailable("disk full".to_string()));
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }

    fn backend_type(&self) -> &'static str {
        "flaky"
    }
}

/// Everything a test needs around one engine.
pub struct Harness<R: SyncRecord> {
    pub engine: SyncEngine<R>,
    pub local: Arc<FlakyStore>,
    pub secure: Arc<MemoryStore>,
    pub keys: KeyStore,
    pub sessions: SessionStore,
    pub remote: Arc<FakeRemote<R::Wire>>,
    pub events: EventBus,
}

impl<R> Harness<R>
where
    R: SyncRecord,
    R::Wire: WireId,
{
    pub fn new() -> Self {
        Self::with_secure(Arc::new(MemoryStore::new()))
    }

    /// Build against an existing secure store (same device, restarted app).
    pub fn with_secure(secure: Arc<MemoryStore>) -> Self {
        let local = Arc::new(FlakyStore::new());
        let remote = Arc::new(FakeRemote::<R::Wire>::new());
        Self::assemble(local, secure, remote)
    }

    /// Second engine sharing the backend (another device).
    pub fn other_device(&self, secure: Arc<MemoryStore>) -> Self {
        Self::assemble(Arc::new(FlakyStore::new()), secure, self.remote.clone())
    }

    fn assemble(
        local: Arc<FlakyStore>,
        secure: Arc<MemoryStore>,
        remote: Arc<FakeRemote<R::Wire>>,
    ) -> Self {
        let events = EventBus::new(64);
        let keys = KeyStore::new(secure.clone()).with_events(events.clone());
        let sessions = SessionStore::new(secure.clone());
        let engine = SyncEngine::new(
            local.clone(),
            keys.clone(),
            sessions.clone(),
            remote.clone(),
            events.clone(),
        );
        Self {
            engine,
            local,
            secure,
            keys,
            sessions,
            remote,
            events,
        }
    }

    /// Engine for another collection of the same account: same device
    /// stores and keys, its own backend collection.
    pub fn sibling<S>(&self) -> Harness<S>
    where
        S: SyncRecord,
        S::Wire: WireId,
    {
        let remote = Arc::new(FakeRemote::<S::Wire>::new());
        let engine = SyncEngine::new(
            self.local.clone(),
            self.keys.clone(),
            self.sessions.clone(),
            remote.clone(),
            self.events.clone(),
        );
        Harness {
            engine,
            local: self.local.clone(),
            secure: self.secure.clone(),
            keys: self.keys.clone(),
            sessions: self.sessions.clone(),
            remote,
            events: self.events.clone(),
        }
    }

    /// Rebuild the engine so it checks `prior` before generating keys.
    pub fn with_prior_data(mut self, prior: PriorData) -> Self {
        self.engine = self.engine.with_prior_data(prior);
        self
    }

    pub async fn sign_in(&self) {
        self.sessions
            .save(&Session {
                user_id: "user-1".to_string(),
                token: TOKEN.to_string(),
            })
            .await
            .unwrap();
    }
}

pub fn reminder(task: &str) -> Reminder {
    Reminder::new(task, format!("{} place", task), 48.85, 2.35, 120)
}
