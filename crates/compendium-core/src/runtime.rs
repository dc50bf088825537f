//! Wiring a configuration into runnable modules

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::capabilities::CapabilityRegistry;
use crate::config::SyncConfig;
use crate::lifecycle::{EventBus, HookOutcome, LifecycleEvent};
use crate::module::{ContentModule, ModuleContext};
use crate::record::StorageId;
use crate::source::{ContentSource, FileSource};
use crate::store::{CollectionKey, DocumentStore, JsonFileStore};
use crate::synchronizer::SyncReport;
use crate::{Error, Result};

/// Configured modules, their shared context, and the event bus they listen on.
pub struct Runtime {
    ctx: ModuleContext,
    bus: EventBus,
    modules: Vec<Arc<ContentModule>>,
}

impl Runtime {
    /// File-backed runtime: sources resolve against the config directory and
    /// collections live under `store.root`.
    pub fn from_config(config: &SyncConfig) -> Self {
        let store = Arc::new(JsonFileStore::new(config.store_root()));
        let source = Arc::new(FileSource::new(config.base_dir()));
        Self::new(config, store, source, CapabilityRegistry::new())
    }

    /// Initialize every module against `registry` and subscribe it to the bus.
    pub fn new(
        config: &SyncConfig,
        store: Arc<dyn DocumentStore>,
        source: Arc<dyn ContentSource>,
        mut registry: CapabilityRegistry,
    ) -> Self {
        let mut bus = EventBus::new();
        let mut modules = Vec::with_capacity(config.modules.len());
        for module_config in &config.modules {
            let module = Arc::new(ContentModule::new(module_config.clone()));
            module.initialize(&mut registry);
            bus.subscribe(module.clone());
            modules.push(module);
        }
        tracing::debug!(modules = modules.len(), ?registry, "Initialized runtime");

        let ctx = ModuleContext::new(store, source)
            .with_registry(registry)
            .with_actor(config.actor.to_actor())
            .with_settings(config.sync.clone());

        Self { ctx, bus, modules }
    }

    pub fn context(&self) -> &ModuleContext {
        &self.ctx
    }

    pub fn modules(&self) -> &[Arc<ContentModule>] {
        &self.modules
    }

    pub fn module(&self, id: &str) -> Result<&Arc<ContentModule>> {
        self.modules
            .iter()
            .find(|m| m.id() == id)
            .ok_or_else(|| Error::ModuleNotFound(id.to_string()))
    }

    /// Modules selected by an optional id filter.
    pub fn select(&self, id: Option<&str>) -> Result<Vec<&Arc<ContentModule>>> {
        match id {
            Some(id) => Ok(vec![self.module(id)?]),
            None => Ok(self.modules.iter().collect()),
        }
    }

    /// Emit `Ready`: every module runs its startup pass.
    pub async fn startup(&self) -> Vec<HookOutcome> {
        self.bus.emit(&LifecycleEvent::Ready, &self.ctx).await
    }

    /// Emit `Manual` for one module or all of them.
    pub async fn sync_manual(
        &self,
        module: Option<&str>,
        dry_run: bool,
    ) -> Result<Vec<HookOutcome>> {
        if let Some(id) = module {
            self.module(id)?;
        }
        let event = LifecycleEvent::Manual {
            module: module.map(str::to_string),
            dry_run,
        };
        Ok(self.bus.emit(&event, &self.ctx).await)
    }

    /// Dry-run check per selected module; a failing module does not stop the others.
    pub async fn check(&self, module: Option<&str>) -> Result<Vec<(String, Result<SyncReport>)>> {
        let mut results = Vec::new();
        for module in self.select(module)? {
            results.push((module.id().to_string(), module.check(&self.ctx).await));
        }
        Ok(results)
    }

    /// Run a pending update diff through every module's pre-update hook.
    pub async fn normalize_update(
        &self,
        collection: &CollectionKey,
        id: &StorageId,
        diff: Map<String, Value>,
    ) -> Map<String, Value> {
        self.bus.normalize_update(collection, id, diff, &self.ctx).await
    }
}
