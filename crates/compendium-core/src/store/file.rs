//! JSON-file document store
//!
//! Each collection lives in `<root>/<collection>.json`. Every
//! read-modify-write cycle holds an exclusive lock on a sidecar file and
//! finishes with an atomic rename, so a crashed write never leaves a
//! truncated collection behind.

use async_trait::async_trait;
use chrono::Utc;
use compendium_fs::io::LockGuard;
use compendium_fs::{ConfigStore, NormalizedPath};
use serde::{Deserialize, Serialize};

use super::{
    BatchOutcome, CollectionHandle, CollectionKey, CollectionKind, DocumentStore, ExistingEntry,
    FetchMode, NewRecord, RecordFailure, RecordUpdate, StoredDocument, check_shape,
    default_strict_containers,
};
use crate::record::StorageId;
use crate::{Error, Result};

/// On-disk layout of one collection file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionFile {
    kind: CollectionKind,
    label: String,
    #[serde(default)]
    records: Vec<StoredDocument>,
}

/// A [`DocumentStore`] persisting each collection as a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: NormalizedPath,
    strict_containers: Vec<String>,
}

impl JsonFileStore {
    pub fn new(root: impl Into<NormalizedPath>) -> Self {
        Self {
            root: root.into(),
            strict_containers: default_strict_containers(),
        }
    }

    pub fn with_strict_containers(mut self, containers: Vec<String>) -> Self {
        self.strict_containers = containers;
        self
    }

    pub fn root(&self) -> &NormalizedPath {
        &self.root
    }

    /// Path of the file backing `collection`.
    pub fn collection_path(&self, collection: &CollectionKey) -> NormalizedPath {
        // Collection keys are dotted identifiers; keep separators out of file names
        let stem = collection.as_str().replace(['/', '\\'], "_");
        self.root.join(&format!("{stem}.json"))
    }

    fn load(&self, collection: &CollectionKey) -> Result<Option<CollectionFile>> {
        let path = self.collection_path(collection);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(ConfigStore::new().load(&path)?))
    }

    fn save(&self, collection: &CollectionKey, file: &CollectionFile) -> Result<()> {
        ConfigStore::new().save(&self.collection_path(collection), file)?;
        Ok(())
    }

    /// Run `f` on a blocking thread, mapping join failures into store errors.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(JsonFileStore) -> Result<T> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || f(this))
            .await
            .map_err(|e| Error::store(format!("store task failed: {e}")))?
    }

    fn ensure_blocking(
        &self,
        collection: &CollectionKey,
        kind: CollectionKind,
        label: &str,
    ) -> Result<CollectionHandle> {
        let _guard = LockGuard::acquire(&self.collection_path(collection))?;
        if let Some(existing) = self.load(collection)? {
            return Ok(CollectionHandle {
                key: collection.clone(),
                kind: existing.kind,
                label: existing.label,
                created: false,
            });
        }

        let file = CollectionFile {
            kind,
            label: label.to_string(),
            records: Vec::new(),
        };
        self.save(collection, &file)?;
        tracing::info!(
            collection = %collection,
            path = %self.collection_path(collection),
            "Created collection file"
        );

        Ok(CollectionHandle {
            key: collection.clone(),
            kind,
            label: label.to_string(),
            created: true,
        })
    }

    fn create_blocking(
        &self,
        collection: &CollectionKey,
        records: Vec<NewRecord>,
    ) -> Result<BatchOutcome> {
        let _guard = LockGuard::acquire(&self.collection_path(collection))?;
        let mut file = self
            .load(collection)?
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;

        let mut outcome = BatchOutcome::default();
        for record in records {
            if let Some(reason) = check_shape(&record.data, &self.strict_containers) {
                outcome.failures.push(RecordFailure {
                    key: record.key.to_string(),
                    reason,
                });
                continue;
            }
            let id = StorageId::generate();
            file.records.push(StoredDocument {
                id: id.clone(),
                key: Some(record.key.to_string()),
                fingerprint: record.fingerprint.to_string(),
                data: record.data,
                modified_at: Utc::now(),
            });
            outcome.applied.push(id);
        }

        if !outcome.applied.is_empty() {
            self.save(collection, &file)?;
        }
        Ok(outcome)
    }

    fn update_blocking(
        &self,
        collection: &CollectionKey,
        records: Vec<RecordUpdate>,
    ) -> Result<BatchOutcome> {
        let _guard = LockGuard::acquire(&self.collection_path(collection))?;
        let mut file = self
            .load(collection)?
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;

        let mut outcome = BatchOutcome::default();
        for record in records {
            if let Some(reason) = check_shape(&record.data, &self.strict_containers) {
                outcome.failures.push(RecordFailure {
                    key: record.key.to_string(),
                    reason,
                });
                continue;
            }
            let Some(stored) = file.records.iter_mut().find(|r| r.id == record.id) else {
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

        if !outcome.applied.is_empty() {
            self.save(collection, &file)?;
        }
        Ok(outcome)
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn ensure_collection(
        &self,
        collection: &CollectionKey,
        kind: CollectionKind,
        label: &str,
    ) -> Result<CollectionHandle> {
        let collection = collection.clone();
        let label = label.to_string();
        self.blocking(move |store| store.ensure_blocking(&collection, kind, &label))
            .await
    }

    async fn get_existing(
        &self,
        collection: &CollectionKey,
        mode: FetchMode,
    ) -> Result<Vec<ExistingEntry>> {
        let collection = collection.clone();
        self.blocking(move |store| {
            let file = store
                .load(&collection)?
                .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
            Ok(file.records.iter().map(|r| r.to_entry(mode)).collect())
        })
        .await
    }

    async fn create_batch(
        &self,
        collection: &CollectionKey,
        records: Vec<NewRecord>,
    ) -> Result<BatchOutcome> {
        let collection = collection.clone();
        self.blocking(move |store| store.create_blocking(&collection, records))
            .await
    }

    async fn update_batch(
        &self,
        collection: &CollectionKey,
        records: Vec<RecordUpdate>,
    ) -> Result<BatchOutcome> {
        let collection = collection.clone();
        self.blocking(move |store| store.update_blocking(&collection, records))
            .await
    }
}
