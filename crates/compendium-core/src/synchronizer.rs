//! The generic sync pass
//!
//! One [`ContentSynchronizer`] per configured module. A pass takes the
//! collection lock, authorizes the actor, loads the content documents,
//! reads the existing index, plans, ensures the collection exists, and
//! applies. Nothing is written until the plan is complete, so a pass that
//! fails to fetch or plan leaves the store untouched. Dry runs stop short
//! of every store write and need no privilege.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::apply::{ApplyOptions, apply};
use crate::capabilities::NORMALIZER;
use crate::config::ModuleConfig;
use crate::fingerprint::FingerprintOptions;
use crate::module::ModuleContext;
use crate::normalize::Normalizer;
use crate::plan::{PlanContext, SyncPlan, plan};
use crate::record::RecordSchema;
use crate::source::load_records;
use crate::store::{CollectionKey, ExistingEntry};
use crate::timeout::timed;
use crate::{Error, Result};

/// Options for a sync pass
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// If true, plan and count without writing anything.
    pub dry_run: bool,
}

impl SyncOptions {
    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }
}

/// Outcome of one pass over one collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub module: String,
    pub collection: String,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Records dropped during validation
    pub skipped: usize,
    /// Of `skipped`, those without a business key
    pub missing_keys: usize,
    pub suspected_drift: usize,
    pub dry_run: bool,
}

impl SyncReport {
    /// True when the collection already matches the content.
    pub fn is_in_sync(&self) -> bool {
        self.created == 0 && self.updated == 0
    }

    /// One-line count summary, e.g. `2 created, 1 updated, 7 unchanged`.
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("{} created", self.created),
            format!("{} updated", self.updated),
            format!("{} unchanged", self.unchanged),
        ];
        if self.skipped > 0 {
            parts.push(format!("{} skipped", self.skipped));
        }
        parts.join(", ")
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.dry_run { "[dry-run] " } else { "" };
        write!(f, "{prefix}{} ({}): {}", self.module, self.collection, self.summary())
    }
}

/// Plan plus the index it was computed against.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub plan: SyncPlan,
    pub existing: Vec<ExistingEntry>,
    /// False when the collection does not exist yet
    pub collection_exists: bool,
}

/// Converges one collection toward one module's content documents.
#[derive(Clone)]
pub struct ContentSynchronizer {
    module: ModuleConfig,
    schema: RecordSchema,
    normalizer: Option<Arc<dyn Normalizer>>,
}

impl ContentSynchronizer {
    pub fn new(module: ModuleConfig) -> Self {
        let schema = module.schema();
        Self {
            module,
            schema,
            normalizer: None,
        }
    }

    /// Use `normalizer` instead of the one registered for this module.
    pub fn with_normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Override the schema built from configuration, e.g. for a custom key.
    pub fn with_schema(mut self, schema: RecordSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn module(&self) -> &ModuleConfig {
        &self.module
    }

    pub fn collection(&self) -> CollectionKey {
        self.module.collection_key()
    }

    fn resolve_normalizer(&self, ctx: &ModuleContext) -> Option<Arc<dyn Normalizer>> {
        self.normalizer
            .clone()
            .or_else(|| ctx.registry.get_scoped(&NORMALIZER, &self.module.id))
    }

    /// Fetch content, read the existing index, and plan. Writes nothing.
    pub async fn prepare(&self, ctx: &ModuleContext) -> Result<Prepared> {
        let collection = self.collection();
        let timeout = ctx.settings.timeout();

        let incoming =
            load_records(ctx.source.as_ref(), &self.module.source_refs(), timeout).await?;

        let existing = timed(
            &format!("reading {collection}"),
            timeout,
            ctx.store.get_existing(&collection, self.module.fetch),
        )
        .await;
        let (existing, collection_exists) = match existing {
            Ok(existing) => (existing, true),
            Err(Error::CollectionNotFound(_)) => {
                tracing::debug!(collection = %collection, "Collection does not exist yet");
                (Vec::new(), false)
            }
            Err(e) => return Err(e),
        };

        let fingerprint: FingerprintOptions = self.module.fingerprint_options(&ctx.settings);
        let normalizer = self.resolve_normalizer(ctx);
        let mut plan_ctx = PlanContext::new(&self.schema, &fingerprint)
            .with_normalizer(normalizer.as_deref())
            .with_duplicates(ctx.settings.duplicate_keys);
        plan_ctx.normalize_before_store = self.module.normalize_before_store;
        plan_ctx.verify_normalizer = ctx.settings.verify_normalizer;

        let plan = plan(&existing, incoming, &plan_ctx)?;
        Ok(Prepared {
            plan,
            existing,
            collection_exists,
        })
    }

    /// Run one pass.
    pub async fn run(&self, ctx: &ModuleContext, options: SyncOptions) -> Result<SyncReport> {
        let collection = self.collection();
        let span = tracing::info_span!(
            "sync_pass",
            module = %self.module.id,
            collection = %collection,
            dry_run = options.dry_run
        );
        self.run_locked(ctx, &collection, options).instrument(span).await
    }

    /// Dry-run pass: what a real pass would write right now.
    pub async fn check(&self, ctx: &ModuleContext) -> Result<SyncReport> {
        self.run(ctx, SyncOptions::dry_run()).await
    }

    async fn run_locked(
        &self,
        ctx: &ModuleContext,
        collection: &CollectionKey,
        options: SyncOptions,
    ) -> Result<SyncReport> {
        let _guard = ctx.locks.acquire(collection, ctx.settings.overlap).await?;
        let timeout = ctx.settings.timeout();

        if !options.dry_run {
            ctx.actor
                .authorize(&format!("create or update collection {collection}"))?;
        }

        let Prepared { plan, .. } = self.prepare(ctx).await?;

        if !options.dry_run {
            let handle = timed(
                &format!("ensuring {collection}"),
                timeout,
                ctx.store
                    .ensure_collection(collection, self.module.kind, self.module.label()),
            )
            .await?;
            if handle.created {
                tracing::info!(kind = %handle.kind, label = %handle.label, "Created collection");
            }
        }

        let applied = apply(
            ctx.store.as_ref(),
            collection,
            &plan,
            ApplyOptions {
                dry_run: options.dry_run,
                timeout,
            },
        )
        .await?;

        let report = SyncReport {
            module: self.module.id.clone(),
            collection: collection.to_string(),
            created: applied.created,
            updated: applied.updated,
            unchanged: plan.unchanged.len(),
            skipped: plan.skipped.len(),
            missing_keys: plan.missing_keys(),
            suspected_drift: plan.suspected_drift,
            dry_run: options.dry_run,
        };
        tracing::info!(
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped = report.skipped,
            "Sync pass finished"
        );
        Ok(report)
    }
}

impl fmt::Debug for ContentSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentSynchronizer")
            .field("module", &self.module.id)
            .field("collection", &self.module.collection)
            .field("normalizer", &self.normalizer.as_ref().map(|n| n.name().to_string()))
            .finish()
    }
}
