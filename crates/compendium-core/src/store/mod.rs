//! Document store collaborator
//!
//! The synchronizer's only boundary. A store exposes one collection per
//! [`CollectionKey`], reads back an index of what it holds, and accepts
//! create and update batches. Creates never carry a storage id; updates
//! always do. The types enforce that split.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::{MemoryStore, StoreCalls};

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;
use crate::embedded::{DEFAULT_CONTAINERS, invalid_embedded_ids};
use crate::fingerprint::Fingerprint;
use crate::record::{BusinessKey, StorageId};

/// Identity of a destination collection, e.g. `world.spells`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionKey(String);

impl CollectionKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The document type a collection holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollectionKind {
    #[default]
    Item,
    Actor,
    JournalEntry,
    Macro,
    RollTable,
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Item => "item",
            Self::Actor => "actor",
            Self::JournalEntry => "journal-entry",
            Self::Macro => "macro",
            Self::RollTable => "roll-table",
        };
        f.write_str(name)
    }
}

/// Result of `ensure_collection`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    pub key: CollectionKey,
    pub kind: CollectionKind,
    pub label: String,
    /// True when this call created the collection
    pub created: bool,
}

/// How much of each stored record `get_existing` returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchMode {
    /// Id, key, fingerprint and full content
    #[default]
    Full,
    /// Id, key and fingerprint only
    Index,
}

/// One row of the existing collection as seen by the planner.
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingEntry {
    pub id: StorageId,
    /// Business key recorded at write time; `None` for foreign records
    pub key: Option<String>,
    /// Parsed stamp; `None` when absent or unreadable
    pub fingerprint: Option<Fingerprint>,
    /// Stored content, present only for [`FetchMode::Full`]
    pub content: Option<Map<String, Value>>,
}

/// A record to insert. Has no storage id by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub key: BusinessKey,
    pub fingerprint: Fingerprint,
    pub data: Map<String, Value>,
}

/// A record to overwrite in place, addressed by storage id.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub id: StorageId,
    pub key: BusinessKey,
    pub fingerprint: Fingerprint,
    pub data: Map<String, Value>,
}

/// A record the store refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub key: String,
    pub reason: String,
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.reason)
    }
}

/// What a batch write did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub applied: Vec<StorageId>,
    pub failures: Vec<RecordFailure>,
}

/// Persistent form of a record inside a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    #[serde(rename = "_id")]
    pub id: StorageId,
    /// Business key; absent for records written by something else
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Fingerprint stamp as written, parsed leniently on read
    #[serde(default)]
    pub fingerprint: String,
    pub data: Map<String, Value>,
    pub modified_at: DateTime<Utc>,
}

impl StoredDocument {
    fn to_entry(&self, mode: FetchMode) -> ExistingEntry {
        ExistingEntry {
            id: self.id.clone(),
            key: self.key.clone(),
            fingerprint: Fingerprint::parse(&self.fingerprint),
            content: match mode {
                FetchMode::Full => Some(self.data.clone()),
                FetchMode::Index => None,
            },
        }
    }
}

/// Storage adapter the synchronizer converges.
///
/// Implementations must be safe to share across tasks; the synchronizer
/// itself serializes passes per collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create the collection if absent. Idempotent.
    async fn ensure_collection(
        &self,
        collection: &CollectionKey,
        kind: CollectionKind,
        label: &str,
    ) -> Result<CollectionHandle>;

    /// Read every record of a collection.
    async fn get_existing(
        &self,
        collection: &CollectionKey,
        mode: FetchMode,
    ) -> Result<Vec<ExistingEntry>>;

    /// Insert records; the store assigns ids.
    async fn create_batch(
        &self,
        collection: &CollectionKey,
        records: Vec<NewRecord>,
    ) -> Result<BatchOutcome>;

    /// Overwrite records by storage id.
    async fn update_batch(
        &self,
        collection: &CollectionKey,
        records: Vec<RecordUpdate>,
    ) -> Result<BatchOutcome>;
}

/// Embedded containers the bundled stores validate by default, the same
/// list a module normalizes when it does not configure `embedded`.
pub fn default_strict_containers() -> Vec<String> {
    DEFAULT_CONTAINERS.iter().map(|c| c.to_string()).collect()
}

/// Strict-shape validation shared by the bundled stores.
fn check_shape(data: &Map<String, Value>, containers: &[String]) -> Option<String> {
    let invalid = invalid_embedded_ids(data, containers);
    if invalid.is_empty() {
        None
    } else {
        Some(format!("invalid embedded id: {}", invalid.join(", ")))
    }
}
