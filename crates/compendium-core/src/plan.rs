//! Diff and classification
//!
//! Compares incoming records against an index of the existing collection,
//! keyed by business key, and sorts each record into exactly one of
//! create, update, or unchanged. Records that fail validation are set
//! aside in `skipped` and never reach a bucket.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fingerprint::{
    Fingerprint, FingerprintOptions, canonical_json, fingerprint_data, fingerprint_view,
};
use crate::normalize::{Normalizer, check_idempotent};
use crate::record::{
    BusinessKey, ContentRecord, RecordSchema, StorageId, ValidationIssue, validate_record,
};
use crate::store::ExistingEntry;
use crate::{Error, Result};

/// Policy for two incoming records sharing a business key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateKeyPolicy {
    /// The later record replaces the earlier one, keeping the earlier position
    #[default]
    LastWins,
    /// Fail the pass before any write
    Reject,
}

/// A record to insert, stamped with its fresh fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedCreate {
    pub key: BusinessKey,
    pub fingerprint: Fingerprint,
    pub data: Map<String, Value>,
}

/// A record to overwrite, carrying the id of the record it replaces.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedUpdate {
    pub id: StorageId,
    pub key: BusinessKey,
    pub fingerprint: Fingerprint,
    /// Stamp found on the stored record
    pub previous: Option<Fingerprint>,
    pub data: Map<String, Value>,
}

/// An entry dropped during validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub index: usize,
    pub issues: Vec<ValidationIssue>,
}

/// Output of [`plan`]: disjoint create / update / unchanged sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    pub to_create: Vec<PlannedCreate>,
    pub to_update: Vec<PlannedUpdate>,
    pub unchanged: Vec<BusinessKey>,
    pub skipped: Vec<SkippedRecord>,
    /// Updates whose stored content is byte-identical to the fresh content
    pub suspected_drift: usize,
}

impl SyncPlan {
    /// True when applying the plan would write nothing.
    pub fn is_noop(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty()
    }

    /// Records dropped because they had no business key.
    pub fn missing_keys(&self) -> usize {
        self.skipped
            .iter()
            .filter(|s| s.issues.iter().any(ValidationIssue::is_missing_key))
            .count()
    }
}

/// Everything [`plan`] needs besides the data itself.
#[derive(Clone, Copy)]
pub struct PlanContext<'a> {
    pub schema: &'a RecordSchema,
    pub normalizer: Option<&'a dyn Normalizer>,
    pub fingerprint: &'a FingerprintOptions,
    pub duplicates: DuplicateKeyPolicy,
    /// Write the normalized record rather than the raw one
    pub normalize_before_store: bool,
    /// Fail when the normalizer is not idempotent on a record
    pub verify_normalizer: bool,
}

impl<'a> PlanContext<'a> {
    pub fn new(schema: &'a RecordSchema, fingerprint: &'a FingerprintOptions) -> Self {
        Self {
            schema,
            normalizer: None,
            fingerprint,
            duplicates: DuplicateKeyPolicy::default(),
            normalize_before_store: true,
            verify_normalizer: false,
        }
    }

    pub fn with_normalizer(mut self, normalizer: Option<&'a dyn Normalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_duplicates(mut self, policy: DuplicateKeyPolicy) -> Self {
        self.duplicates = policy;
        self
    }
}

/// Build the business-key index of the existing collection.
///
/// Entries without a key are foreign to the synchronizer and ignored;
/// duplicate keys resolve last-wins.
fn index_existing(existing: &[ExistingEntry]) -> HashMap<&str, &ExistingEntry> {
    let mut index = HashMap::with_capacity(existing.len());
    for entry in existing {
        let Some(key) = entry.key.as_deref().map(str::trim).filter(|k| !k.is_empty()) else {
            tracing::debug!(id = %entry.id, "Ignoring stored record without business key");
            continue;
        };
        if let Some(previous) = index.insert(key, entry) {
            tracing::warn!(
                key,
                kept = %entry.id,
                shadowed = %previous.id,
                "Duplicate business key in existing collection"
            );
        }
    }
    index
}

/// Validate incoming values and resolve duplicate keys.
fn collect_incoming(
    incoming: Vec<Value>,
    ctx: &PlanContext<'_>,
    skipped: &mut Vec<SkippedRecord>,
) -> Result<Vec<ContentRecord>> {
    let mut records: Vec<ContentRecord> = Vec::with_capacity(incoming.len());
    let mut positions: HashMap<BusinessKey, usize> = HashMap::new();

    for (index, value) in incoming.into_iter().enumerate() {
        let record = match validate_record(index, value, ctx.schema) {
            Ok(record) => record,
            Err(issues) => {
                for issue in &issues {
                    tracing::warn!(%issue, "Skipping content record");
                }
                skipped.push(SkippedRecord { index, issues });
                continue;
            }
        };

        match positions.get(&record.key) {
            Some(&position) => match ctx.duplicates {
                DuplicateKeyPolicy::Reject => {
                    return Err(Error::DuplicateKey {
                        key: record.key.to_string(),
                    });
                }
                DuplicateKeyPolicy::LastWins => {
                    tracing::warn!(
                        key = %record.key,
                        index,
                        "Duplicate business key; later record wins"
                    );
                    records[position] = record;
                }
            },
            None => {
                positions.insert(record.key.clone(), records.len());
                records.push(record);
            }
        }
    }

    Ok(records)
}

/// Classify `incoming` against `existing`.
pub fn plan(
    existing: &[ExistingEntry],
    incoming: Vec<Value>,
    ctx: &PlanContext<'_>,
) -> Result<SyncPlan> {
    let index = index_existing(existing);
    let mut plan = SyncPlan::default();
    let records = collect_incoming(incoming, ctx, &mut plan.skipped)?;
    let options = ctx.fingerprint;

    for ContentRecord { key, data: raw } in records {
        let normalized = match ctx.normalizer {
            Some(normalizer) if ctx.verify_normalizer => {
                check_idempotent(normalizer, &key, raw.clone())?
            }
            Some(normalizer) => normalizer.normalize(raw.clone()),
            None => raw.clone(),
        };
        let fresh = fingerprint_data(&normalized, options, options.version);
        let entry = index.get(key.as_str()).copied();

        let changed = entry.map(|entry| match &entry.fingerprint {
            None => true,
            Some(stored) if stored.version() == options.version => stored != &fresh,
            // Compare in the stored record's own width so an older stamp
            // does not read as a content change
            Some(stored) => {
                options.upgrade_stale
                    || stored != &fingerprint_data(&normalized, options, stored.version())
            }
        });

        let data = if ctx.normalize_before_store {
            normalized
        } else {
            raw
        };

        let (Some(entry), Some(changed)) = (entry, changed) else {
            plan.to_create.push(PlannedCreate {
                key,
                fingerprint: fresh,
                data,
            });
            continue;
        };

        if !changed {
            plan.unchanged.push(key);
            continue;
        }

        let same_version = entry
            .fingerprint
            .as_ref()
            .is_some_and(|stored| stored.version() == options.version);
        if same_version
            && let Some(content) = &entry.content
            && canonical_json(&fingerprint_view(content, &options.ignore))
                == canonical_json(&fingerprint_view(&data, &options.ignore))
        {
            plan.suspected_drift += 1;
            tracing::warn!(
                key = %key,
                id = %entry.id,
                "Stored content matches but fingerprint differs; normalization may be unstable"
            );
        }

        plan.to_update.push(PlannedUpdate {
            id: entry.id.clone(),
            key,
            fingerprint: fresh,
            previous: entry.fingerprint.clone(),
            data,
        });
    }

    tracing::debug!(
        create = plan.to_create.len(),
        update = plan.to_update.len(),
        unchanged = plan.unchanged.len(),
        skipped = plan.skipped.len(),
        "Planned sync"
    );
    Ok(plan)
}
