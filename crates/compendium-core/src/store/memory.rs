//! In-memory document store
//!
//! A complete [`DocumentStore`] kept in a mutex. Used by tests and by
//! embedders that sync into a host-owned structure. Supports failure
//! injection and artificial latency so error paths can be exercised.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{
    BatchOutcome, CollectionHandle, CollectionKey, CollectionKind, DocumentStore, ExistingEntry,
    FetchMode, NewRecord, RecordFailure, RecordUpdate, StoredDocument, check_shape,
    default_strict_containers,
};
use crate::record::StorageId;
use crate::{Error, Result};

/// Counters of store calls, for asserting what a pass actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub ensure_collection: usize,
    pub get_existing: usize,
    pub create_batches: usize,
    pub update_batches: usize,
    pub records_created: usize,
    pub records_updated: usize,
}

impl StoreCalls {
    /// Number of batch writes submitted.
    pub fn writes(&self) -> usize {
        self.create_batches + self.update_batches
    }
}

#[derive(Debug)]
struct MemoryCollection {
    kind: CollectionKind,
    label: String,
    records: Vec<StoredDocument>,
}

#[derive(Debug, Default)]
struct MemoryState {
    collections: BTreeMap<CollectionKey, MemoryCollection>,
    calls: StoreCalls,
    reject_keys: HashSet<String>,
    fail_creates: bool,
    fail_updates: bool,
}

/// In-memory [`DocumentStore`].
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
    strict_containers: Vec<String>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            latency: None,
            strict_containers: default_strict_containers(),
        }
    }

    /// Delay every call by `latency` before touching state.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Replace the embedded containers checked on write.
    pub fn with_strict_containers(mut self, containers: Vec<String>) -> Self {
        self.strict_containers = containers;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Refuse any record with this business key.
    pub fn reject_key(&self, key: impl Into<String>) {
        self.lock().reject_keys.insert(key.into());
    }

    /// Make every create batch fail outright.
    pub fn fail_creates(&self, fail: bool) {
        self.lock().fail_creates = fail;
    }

    /// Make every update batch fail outright.
    pub fn fail_updates(&self, fail: bool) {
        self.lock().fail_updates = fail;
    }

    pub fn calls(&self) -> StoreCalls {
        self.lock().calls
    }

    pub fn has_collection(&self, collection: &CollectionKey) -> bool {
        self.lock().collections.contains_key(collection)
    }

    /// Snapshot of a collection's records.
    pub fn records(&self, collection: &CollectionKey) -> Vec<StoredDocument> {
        self.lock()
            .collections
            .get(collection)
            .map(|c| c.records.clone())
            .unwrap_or_default()
    }

    /// Seed a record directly, bypassing validation and counters.
    pub fn insert_raw(&self, collection: &CollectionKey, document: StoredDocument) {
        let mut state = self.lock();
        state
            .collections
            .entry(collection.clone())
            .or_insert_with(|| MemoryCollection {
                kind: CollectionKind::default(),
                label: collection.to_string(),
                records: Vec::new(),
            })
            .records
            .push(document);
    }

    /// Remove a record by id, as a migration would.
    pub fn remove(&self, collection: &CollectionKey, id: &StorageId) -> bool {
        let mut state = self.lock();
        let Some(coll) = state.collections.get_mut(collection) else {
            return false;
        };
        let before = coll.records.len();
        coll.records.retain(|r| &r.id != id);
        coll.records.len() != before
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ensure_collection(
        &self,
        collection: &CollectionKey,
        kind: CollectionKind,
        label: &str,
    ) -> Result<CollectionHandle> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.calls.ensure_collection += 1;

        let created = !state.collections.contains_key(collection);
        let entry = state
            .collections
            .entry(collection.clone())
            .or_insert_with(|| MemoryCollection {
                kind,
                label: label.to_string(),
                records: Vec::new(),
            });
        if created {
            tracing::info!(collection = %collection, kind = %kind, "Created collection");
        }

        Ok(CollectionHandle {
            key: collection.clone(),
            kind: entry.kind,
            label: entry.label.clone(),
            created,
        })
    }

    async fn get_existing(
        &self,
        collection: &CollectionKey,
        mode: FetchMode,
    ) -> Result<Vec<ExistingEntry>> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.calls.get_existing += 1;

        let coll = state
            .collections
            .get(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
        Ok(coll.records.iter().map(|r| r.to_entry(mode)).collect())
    }

    async fn create_batch(
        &self,
        collection: &CollectionKey,
        records: Vec<NewRecord>,
    ) -> Result<BatchOutcome> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.calls.create_batches += 1;
        if state.fail_creates {
            return Err(Error::store("create batch rejected"));
        }

        let reject_keys = state.reject_keys.clone();
        let coll = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;

        let mut outcome = BatchOutcome::default();
        for record in records {
            if reject_keys.contains(record.key.as_str()) {
                outcome.failures.push(RecordFailure {
                    key: record.key.to_string(),
                    reason: "rejected by store".to_string(),
                });
                continue;
            }
            if let Some(reason) = check_shape(&record.data, &self.strict_containers) {
                outcome.failures.push(RecordFailure {
                    key: record.key.to_string(),
                    reason,
                });
                continue;
            }
            let id = StorageId::generate();
            coll.records.push(StoredDocument {
                id: id.clone(),
                key: Some(record.key.to_string()),
                fingerprint: record.fingerprint.to_string(),
                data: record.data,
                modified_at: Utc::now(),
            });
            outcome.applied.push(id);
        }

        state.calls.records_created += outcome.applied.len();
        Ok(outcome)
    }

    async fn update_batch(
        &self,
        collection: &CollectionKey,
        records: Vec<RecordUpdate>,
    ) -> Result<BatchOutcome> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.calls.update_batches += 1;
        if state.fail_updates {
            return Err(Error::store("update batch rejected"));
        }

        let reject_keys = state.reject_keys.clone();
        let coll = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;

        let mut outcome = BatchOutcome::default();
        for record in records {
            if reject_keys.contains(record.key.as_str()) {
                outcome.failures.push(RecordFailure {
                    key: record.key.to_string(),
                    reason: "rejected by store".to_string(),
                });
                continue;
            }
            if let Some(reason) = check_shape(&record.data, &self.strict_containers) {
                outcome.failures.push(RecordFailure {
                    key: record.key.to_string(),
                    reason,
                });
                continue;
            }
            let Some(stored) = coll.records.iter_mut().find(|r| r.id == record.id) else {
                outcome.failures.push(RecordFailure {
                    key: record.key.to_string(),
                    reason: format!("no record with id {}", record.id),
                });
                continue;
            };
            stored.key = Some(record.key.to_string());
            stored.fingerprint = record.fingerprint.to_string();
            stored.data = record.data;
            stored.modified_at = Utc::now();
            outcome.applied.push(record.id);
        }

        state.calls.records_updated += outcome.applied.len();
        Ok(outcome)
    }
}
