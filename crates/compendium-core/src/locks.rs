//! Per-collection mutual exclusion for sync passes
//!
//! Two passes over the same collection that both read the existing index
//! before either writes would create every new record twice. A pass holds
//! the collection's lock from index read through apply.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::store::CollectionKey;
use crate::{Error, Result};

/// What to do when a pass for the same collection is already running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlapPolicy {
    /// Fail the second pass with [`Error::SyncInProgress`]
    #[default]
    Reject,
    /// Wait for the running pass to finish
    Queue,
}

/// Held for the duration of one pass.
pub type SyncGuard = OwnedMutexGuard<()>;

/// Lock table keyed by collection.
#[derive(Debug, Default)]
pub struct SyncLocks {
    table: Mutex<HashMap<CollectionKey, Arc<AsyncMutex<()>>>>,
}

impl SyncLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, collection: &CollectionKey) -> Arc<AsyncMutex<()>> {
        let mut table = self
            .table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        table
            .entry(collection.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn acquire(
        &self,
        collection: &CollectionKey,
        policy: OverlapPolicy,
    ) -> Result<SyncGuard> {
        let slot = self.slot(collection);
        match policy {
            OverlapPolicy::Reject => slot.try_lock_owned().map_err(|_| {
                tracing::warn!(collection = %collection, "Rejected overlapping sync pass");
                Error::SyncInProgress {
                    collection: collection.to_string(),
                }
            }),
            OverlapPolicy::Queue => {
                tracing::debug!(collection = %collection, "Waiting for collection lock");
                Ok(slot.lock_owned().await)
            }
        }
    }

    /// True while a pass holds the collection's lock.
    pub fn is_locked(&self, collection: &CollectionKey) -> bool {
        let slot = self.slot(collection);
        slot.try_lock().is_err()
    }
}
