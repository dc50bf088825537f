//! Error types for compendium-core

use std::time::Duration;

use crate::store::RecordFailure;

/// Result type for compendium-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a sync pass
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Content document unreachable, unreadable, or malformed
    #[error("Failed to fetch content document {source_ref}: {message}")]
    SourceFetch { source_ref: String, message: String },

    /// Collection creation or write attempted without the required role
    #[error("{actor} is not permitted to {action}")]
    Authorization { actor: String, action: String },

    /// Two records in one content document share a business key
    #[error("Duplicate business key '{key}' in content document")]
    DuplicateKey { key: String },

    /// The store rejected some records; already-applied records stay applied
    #[error(
        "Batch write to {collection} partially failed: {created} created, {updated} updated, {} rejected",
        .failures.len()
    )]
    PartialBatch {
        collection: String,
        created: usize,
        updated: usize,
        failures: Vec<RecordFailure>,
    },

    /// A normalizer produced different output when applied to its own output
    #[error("Normalizer '{normalizer}' is not idempotent for record '{key}'")]
    NormalizationDrift { normalizer: String, key: String },

    /// Another pass holds the lock for this collection
    #[error("Sync already in progress for collection {collection}")]
    SyncInProgress { collection: String },

    /// A source or store call did not complete in time
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Input that is not a record at all
    #[error("Invalid record: {message}")]
    Validation { message: String },

    /// Collection does not exist in the store
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Store-level failure not tied to individual records
    #[error("Store error: {message}")]
    Store { message: String },

    /// No configured module with this id
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    /// A required capability was never registered
    #[error("Capability not registered: {0}")]
    CapabilityMissing(String),

    /// Configuration is structurally valid but semantically wrong
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// Filesystem error from compendium-fs
    #[error(transparent)]
    Fs(#[from] compendium_fs::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),
}

impl Error {
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
