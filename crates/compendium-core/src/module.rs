//! Content modules and the context they run in

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::Result;
use crate::auth::Actor;
use crate::capabilities::{CapabilityRegistry, NORMALIZER, NOTIFIER};
use crate::config::{ModuleConfig, SyncSettings};
use crate::embedded::EmbeddedIdNormalizer;
use crate::lifecycle::{HookOutcome, LifecycleEvent, LifecycleHandler};
use crate::locks::SyncLocks;
use crate::normalize::Normalizer;
use crate::notify::{Notification, Notifier, TracingNotifier};
use crate::source::ContentSource;
use crate::store::DocumentStore;
use crate::synchronizer::{ContentSynchronizer, SyncOptions, SyncReport};

/// Everything a module needs to run a pass. Passed explicitly; modules
/// hold no global state.
#[derive(Clone)]
pub struct ModuleContext {
    pub registry: Arc<CapabilityRegistry>,
    pub store: Arc<dyn DocumentStore>,
    pub source: Arc<dyn ContentSource>,
    pub actor: Actor,
    pub settings: SyncSettings,
    pub locks: Arc<SyncLocks>,
}

impl ModuleContext {
    /// Context with an empty registry, default settings, and a gamemaster actor.
    pub fn new(store: Arc<dyn DocumentStore>, source: Arc<dyn ContentSource>) -> Self {
        Self {
            registry: Arc::new(CapabilityRegistry::new()),
            store,
            source,
            actor: Actor::gamemaster("gamemaster"),
            settings: SyncSettings::default(),
            locks: Arc::new(SyncLocks::new()),
        }
    }

    pub fn with_registry(mut self, registry: CapabilityRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The registered notifier, or one that logs through `tracing`.
    pub fn notifier(&self) -> Arc<dyn Notifier> {
        self.registry
            .get(&NOTIFIER)
            .unwrap_or_else(|| Arc::new(TracingNotifier))
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("registry", &self.registry)
            .field("actor", &self.actor)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// One configured content domain bound to its synchronizer.
#[derive(Debug)]
pub struct ContentModule {
    synchronizer: ContentSynchronizer,
    embedded: Option<Arc<EmbeddedIdNormalizer>>,
}

impl ContentModule {
    pub fn new(config: ModuleConfig) -> Self {
        let embedded = (!config.embedded.is_empty())
            .then(|| Arc::new(EmbeddedIdNormalizer::new(config.embedded.iter().cloned())));
        Self {
            synchronizer: ContentSynchronizer::new(config),
            embedded,
        }
    }

    pub fn with_synchronizer(mut self, synchronizer: ContentSynchronizer) -> Self {
        self.synchronizer = synchronizer;
        self
    }

    pub fn id(&self) -> &str {
        &self.config().id
    }

    pub fn config(&self) -> &ModuleConfig {
        self.synchronizer.module()
    }

    pub fn synchronizer(&self) -> &ContentSynchronizer {
        &self.synchronizer
    }

    /// Register this module's capabilities. An explicitly provided
    /// normalizer for the module is left in place.
    pub fn initialize(&self, registry: &mut CapabilityRegistry) {
        let Some(embedded) = &self.embedded else {
            return;
        };
        let capability = NORMALIZER.scoped(self.id());
        if registry.contains(capability.name()) {
            tracing::debug!(module = self.id(), "Keeping registered normalizer");
            return;
        }
        let normalizer: Arc<dyn Normalizer> = embedded.clone();
        registry.provide(&capability, normalizer);
    }

    pub async fn sync(&self, ctx: &ModuleContext, options: SyncOptions) -> Result<SyncReport> {
        self.synchronizer.run(ctx, options).await
    }

    pub async fn check(&self, ctx: &ModuleContext) -> Result<SyncReport> {
        self.synchronizer.check(ctx).await
    }

    /// Startup pass: failures are logged with the module id and never raised.
    pub async fn startup(&self, ctx: &ModuleContext) -> HookOutcome {
        match self.sync(ctx, SyncOptions::default()).await {
            Ok(report) => HookOutcome::Synced(report),
            Err(e) => {
                tracing::error!(module = self.id(), error = %e, "Startup sync failed");
                HookOutcome::Failed {
                    module: self.id().to_string(),
                    message: e.to_string(),
                }
            }
        }
    }

    /// User-triggered pass: like [`startup`](Self::startup), plus a notification.
    pub async fn manual(&self, ctx: &ModuleContext, dry_run: bool) -> HookOutcome {
        let notifier = ctx.notifier();
        let label = self.config().label();
        match self.sync(ctx, SyncOptions { dry_run }).await {
            Ok(report) => {
                notifier.notify(Notification::info(
                    self.id(),
                    format!("{label}: {}", report.summary()),
                ));
                HookOutcome::Synced(report)
            }
            Err(e) => {
                tracing::error!(module = self.id(), error = %e, "Manual sync failed");
                notifier.notify(Notification::error(self.id(), format!("{label}: {e}")));
                HookOutcome::Failed {
                    module: self.id().to_string(),
                    message: e.to_string(),
                }
            }
        }
    }

    /// Normalize embedded ids in an update diff aimed at this module's collection.
    pub fn normalize_diff(&self, diff: Map<String, Value>) -> Map<String, Value> {
        match &self.embedded {
            Some(embedded) => embedded.normalize_update_diff(diff),
            None => diff,
        }
    }
}

#[async_trait]
impl LifecycleHandler for ContentModule {
    fn name(&self) -> &str {
        self.id()
    }

    async fn handle(&self, event: &LifecycleEvent, ctx: &ModuleContext) -> HookOutcome {
        match event {
            LifecycleEvent::Ready => self.startup(ctx).await,
            LifecycleEvent::Manual { module, dry_run } => match module {
                Some(id) if id != self.id() => HookOutcome::Ignored,
                _ => self.manual(ctx, *dry_run).await,
            },
            LifecycleEvent::PreUpdate {
                collection, diff, ..
            } if collection.as_str() == self.config().collection && self.embedded.is_some() => {
                HookOutcome::Diff(self.normalize_diff(diff.clone()))
            }
            LifecycleEvent::PreUpdate { .. } => HookOutcome::Ignored,
        }
    }
}
