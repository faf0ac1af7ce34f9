//! Record store abstraction and cache policy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use linkstore_codec::SerializedRecord;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::record::{Metadata, RecordId, METADATA_FIELD};

/// Online/offline strategy for reads and writes.
///
/// The record store interprets the policy for records. The linked store
/// uses the same policy to decide whether a locally cached resource copy
/// may be served instead of downloading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CachePolicy {
    /// Always go to the backend.
    Online,
    /// Never go to the backend; serve local copies only.
    Offline,
    /// Serve local copies when present, otherwise go to the backend.
    #[default]
    CacheFirst,
    /// Go to the backend, fall back to local copies when it fails.
    NetworkFirst,
}

impl CachePolicy {
    /// Returns true if a valid cached copy should be used before the network.
    pub fn prefers_cache(&self) -> bool {
        matches!(self, CachePolicy::Offline | CachePolicy::CacheFirst)
    }

    /// Returns true if the policy permits network calls.
    pub fn allows_network(&self) -> bool {
        !matches!(self, CachePolicy::Offline)
    }

    /// Returns true if a failed network call may be answered from cache.
    pub fn falls_back_to_cache(&self) -> bool {
        matches!(self, CachePolicy::NetworkFirst)
    }
}

/// A record store persists serialized records by id.
///
/// Implementations own caching, transport, and authentication. The payload
/// is opaque to them.
pub trait RecordStore: Send + Sync {
    /// Persists a record and returns it as stored.
    fn save(
        &self,
        record_id: &RecordId,
        record: &SerializedRecord,
        policy: CachePolicy,
    ) -> StoreResult<SerializedRecord>;

    /// Fetches a record.
    fn fetch(&self, record_id: &RecordId, policy: CachePolicy) -> StoreResult<SerializedRecord>;

    /// Deletes a record.
    fn remove(&self, record_id: &RecordId, policy: CachePolicy) -> StoreResult<()>;
}

impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    fn save(
        &self,
        record_id: &RecordId,
        record: &SerializedRecord,
        policy: CachePolicy,
    ) -> StoreResult<SerializedRecord> {
        (**self).save(record_id, record, policy)
    }

    fn fetch(&self, record_id: &RecordId, policy: CachePolicy) -> StoreResult<SerializedRecord> {
        (**self).fetch(record_id, policy)
    }

    fn remove(&self, record_id: &RecordId, policy: CachePolicy) -> StoreResult<()> {
        (**self).remove(record_id, policy)
    }
}

/// An in-memory record store for testing.
///
/// Behaves like a backend: it stamps `_kmd` metadata on every save. When
/// disconnected, [`CachePolicy::Online`] calls fail with
/// [`StoreError::Offline`] while the other policies are served locally.
#[derive(Debug)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<RecordId, SerializedRecord>>,
    connected: AtomicBool,
    fail_writes: AtomicBool,
    cancelled: AtomicBool,
    stamp_metadata: AtomicBool,
    saves: AtomicU64,
    fetches: AtomicU64,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            connected: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            stamp_metadata: AtomicBool::new(true),
            saves: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
        }
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Makes every save and remove fail with a backend error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes every call fail with [`StoreError::Cancelled`].
    pub fn set_cancelled(&self, cancelled: bool) {
        self.cancelled.store(cancelled, Ordering::SeqCst);
    }

    /// Enables or disables metadata stamping on save.
    pub fn set_stamp_metadata(&self, stamp: bool) {
        self.stamp_metadata.store(stamp, Ordering::SeqCst);
    }

    /// Returns the raw stored payload for a record.
    pub fn stored(&self, record_id: &RecordId) -> Option<SerializedRecord> {
        self.records.read().get(record_id).cloned()
    }

    /// Stores a raw payload directly, bypassing save accounting.
    pub fn insert_raw(&self, record_id: RecordId, record: SerializedRecord) {
        self.records.write().insert(record_id, record);
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Number of save calls that reached the store.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of fetch calls that reached the store.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check_reachable(&self, policy: CachePolicy) -> StoreResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(StoreError::Cancelled);
        }
        if policy == CachePolicy::Online && !self.connected.load(Ordering::SeqCst) {
            return Err(StoreError::Offline);
        }
        Ok(())
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::backend_fatal("write refused by test hook"));
        }
        Ok(())
    }

    fn stamp(
        &self,
        record: &SerializedRecord,
        previous: Option<&SerializedRecord>,
    ) -> StoreResult<SerializedRecord> {
        let mut document = record
            .decode()
            .map_err(|e| StoreError::backend_fatal(format!("unreadable payload: {e}")))?;

        let created = previous
            .and_then(|p| p.decode().ok())
            .and_then(|doc| doc.get(METADATA_FIELD).and_then(Metadata::from_value))
            .and_then(|m| m.entity_creation_time);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis()
            .to_string();

        let metadata = Metadata {
            last_modified_time: Some(now.clone()),
            entity_creation_time: Some(created.unwrap_or(now)),
        };
        document.insert(METADATA_FIELD.to_string(), metadata.to_value());

        SerializedRecord::encode(&document)
            .map_err(|e| StoreError::backend_fatal(format!("unwritable payload: {e}")))
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryRecordStore {
    fn save(
        &self,
        record_id: &RecordId,
        record: &SerializedRecord,
        policy: CachePolicy,
    ) -> StoreResult<SerializedRecord> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.check_reachable(policy)?;
        self.check_writable()?;

        let mut records = self.records.write();
        let stored = if self.stamp_metadata.load(Ordering::SeqCst) {
            self.stamp(record, records.get(record_id))?
        } else {
            record.clone()
        };
        records.insert(record_id.clone(), stored.clone());
        Ok(stored)
    }

    fn fetch(&self, record_id: &RecordId, policy: CachePolicy) -> StoreResult<SerializedRecord> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_reachable(policy)?;
        self.records
            .read()
            .get(record_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(record_id.to_string()))
    }

    fn remove(&self, record_id: &RecordId, policy: CachePolicy) -> StoreResult<()> {
        self.check_reachable(policy)?;
        self.check_writable()?;
        self.records
            .write()
            .remove(record_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(record_id.to_string()))
    }
}
