//! In-memory request store for tests/dev.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use frameshot_core::RequestId;
use frameshot_requests::{NewRequest, Request};

use super::{RequestStore, StoreError};

/// Operation counters, useful for asserting that a code path never touched
/// the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub reads: usize,
    pub writes: usize,
}

impl StoreStats {
    pub fn total(&self) -> usize {
        self.reads + self.writes
    }
}

/// In-memory request store.
///
/// Ids come from a counter starting at 1; `video_key` is unique like the
/// database column.
#[derive(Debug)]
pub struct InMemoryRequestStore {
    rows: RwLock<BTreeMap<RequestId, Request>>,
    next_id: AtomicU64,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_updates: AtomicBool,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Insert a fully-formed row as-is (fixtures). Bypasses counters.
    pub fn seed(&self, request: Request) -> Result<(), StoreError> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        self.next_id.fetch_max(request.id.get() + 1, Ordering::SeqCst);
        rows.insert(request.id, request);
        Ok(())
    }

    /// Current row for `id` (fixtures/assertions). Bypasses counters.
    pub fn snapshot(&self, id: RequestId) -> Option<Request> {
        self.rows.read().ok()?.get(&id).cloned()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            reads: self.reads.load(Ordering::SeqCst),
            writes: self.writes.load(Ordering::SeqCst),
        }
    }

    /// Make lookups (`get_by_id`, `get_by_video_key`) fail with a storage error.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make `update` fail with a storage error.
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }

    fn check_lookup(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("in-memory store: reads disabled".to_string()));
        }
        Ok(())
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for InMemoryRequestStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> StoreError {
    StoreError::Storage("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn create(&self, request: NewRequest) -> Result<Request, StoreError> {
        self.record_write();
        let mut rows = self.rows.write().map_err(|_| poisoned())?;

        if rows.values().any(|r| r.video_key == request.video_key) {
            return Err(StoreError::Conflict(format!(
                "video_key already exists: {}",
                request.video_key
            )));
        }

        let id = RequestId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let created = request.into_request(id);
        rows.insert(id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: RequestId) -> Result<Option<Request>, StoreError> {
        self.record_read();
        self.check_lookup()?;
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows.get(&id).cloned())
    }

    async fn get_by_video_key(&self, video_key: &str) -> Result<Option<Request>, StoreError> {
        self.record_read();
        self.check_lookup()?;
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows.values().find(|r| r.video_key == video_key).cloned())
    }

    async fn update(&self, request: &Request) -> Result<Request, StoreError> {
        self.record_write();
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("in-memory store: updates disabled".to_string()));
        }
        request
            .check_invariants()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        match rows.get_mut(&request.id) {
            Some(row) => {
                *row = request.clone();
                Ok(row.clone())
            }
            None => Err(StoreError::NotFound(request.id)),
        }
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Request>, StoreError> {
        self.record_read();
        let rows = self.rows.read().map_err(|_| poisoned())?;
        let mut result: Vec<_> = rows
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        result.sort_by_key(|r| (r.created_at, r.id));
        Ok(result)
    }
}
