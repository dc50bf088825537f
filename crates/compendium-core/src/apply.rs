//! Batch apply
//!
//! Submits one create batch and one update batch. The two batches are
//! independent: a failure in one neither prevents nor rolls back the other.
//! Rejected records from either are gathered into a single
//! [`Error::PartialBatch`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::plan::SyncPlan;
use crate::store::{
    BatchOutcome, CollectionKey, DocumentStore, NewRecord, RecordFailure, RecordUpdate,
};
use crate::timeout::timed;
use crate::{Error, Result};

/// Counts of records written by one apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub created: usize,
    pub updated: usize,
}

/// Options for [`apply`].
#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
    /// Report what would be written without calling the store
    pub dry_run: bool,
    /// Deadline for each batch call
    pub timeout: Duration,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Fold one batch result into the running failure list.
///
/// A batch that errors as a whole marks every record in it as failed.
fn settle(
    result: Result<BatchOutcome>,
    keys: Vec<String>,
    failures: &mut Vec<RecordFailure>,
) -> usize {
    match result {
        Ok(outcome) => {
            failures.extend(outcome.failures);
            outcome.applied.len()
        }
        Err(e) => {
            let reason = e.to_string();
            failures.extend(keys.into_iter().map(|key| RecordFailure {
                key,
                reason: reason.clone(),
            }));
            0
        }
    }
}

/// Write `plan` to `collection`.
pub async fn apply(
    store: &dyn DocumentStore,
    collection: &CollectionKey,
    plan: &SyncPlan,
    options: ApplyOptions,
) -> Result<ApplyReport> {
    if options.dry_run {
        return Ok(ApplyReport {
            created: plan.to_create.len(),
            updated: plan.to_update.len(),
        });
    }

    let mut report = ApplyReport::default();
    let mut failures = Vec::new();

    if !plan.to_create.is_empty() {
        let records: Vec<NewRecord> = plan
            .to_create
            .iter()
            .map(|c| NewRecord {
                key: c.key.clone(),
                fingerprint: c.fingerprint.clone(),
                data: c.data.clone(),
            })
            .collect();
        let keys = records.iter().map(|r| r.key.to_string()).collect();
        let result = timed(
            &format!("create batch for {collection}"),
            options.timeout,
            store.create_batch(collection, records),
        )
        .await;
        report.created = settle(result, keys, &mut failures);
    }

    if !plan.to_update.is_empty() {
        let records: Vec<RecordUpdate> = plan
            .to_update
            .iter()
            .map(|u| RecordUpdate {
                id: u.id.clone(),
                key: u.key.clone(),
                fingerprint: u.fingerprint.clone(),
                data: u.data.clone(),
            })
            .collect();
        let keys = records.iter().map(|r| r.key.to_string()).collect();
        let result = timed(
            &format!("update batch for {collection}"),
            options.timeout,
            store.update_batch(collection, records),
        )
        .await;
        report.updated = settle(result, keys, &mut failures);
    }

    if !failures.is_empty() {
        for failure in &failures {
            tracing::error!(
                collection = %collection,
                key = %failure.key,
                reason = %failure.reason,
                "Record rejected"
            );
        }
        return Err(Error::PartialBatch {
            collection: collection.to_string(),
            created: report.created,
            updated: report.updated,
            failures,
        });
    }

    Ok(report)
}
