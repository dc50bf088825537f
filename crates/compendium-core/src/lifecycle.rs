//! Host lifecycle events
//!
//! Modules subscribe to an [`EventBus`] instead of registering global
//! callbacks. The host (or a test) emits events with an explicit
//! [`ModuleContext`] and collects every handler's outcome.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::module::ModuleContext;
use crate::record::StorageId;
use crate::store::CollectionKey;
use crate::synchronizer::SyncReport;

/// Something the host reports to its modules.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// The host finished starting; every module runs its startup pass.
    Ready,
    /// A user asked for a pass, for one module or all of them.
    Manual {
        module: Option<String>,
        dry_run: bool,
    },
    /// A stored record is about to be updated with `diff`.
    PreUpdate {
        collection: CollectionKey,
        id: StorageId,
        diff: Map<String, Value>,
    },
}

/// What one handler did with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
    Synced(SyncReport),
    Failed { module: String, message: String },
    /// Replacement diff for a [`LifecycleEvent::PreUpdate`]
    Diff(Map<String, Value>),
    Ignored,
}

impl HookOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[async_trait]
pub trait LifecycleHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, event: &LifecycleEvent, ctx: &ModuleContext) -> HookOutcome;
}

/// Ordered list of subscribed handlers.
#[derive(Default, Clone)]
pub struct EventBus {
    handlers: Vec<Arc<dyn LifecycleHandler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, handler: Arc<dyn LifecycleHandler>) {
        tracing::debug!(handler = handler.name(), "Subscribed lifecycle handler");
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Deliver `event` to every handler in subscription order.
    ///
    /// Outcomes of handlers that ignored the event are dropped.
    pub async fn emit(&self, event: &LifecycleEvent, ctx: &ModuleContext) -> Vec<HookOutcome> {
        let mut outcomes = Vec::new();
        for handler in &self.handlers {
            match handler.handle(event, ctx).await {
                HookOutcome::Ignored => {}
                outcome => outcomes.push(outcome),
            }
        }
        outcomes
    }

    /// Run a pre-update diff through every handler, each seeing the
    /// previous handler's output.
    pub async fn normalize_update(
        &self,
        collection: &CollectionKey,
        id: &StorageId,
        diff: Map<String, Value>,
        ctx: &ModuleContext,
    ) -> Map<String, Value> {
        let mut current = diff;
        for handler in &self.handlers {
            let event = LifecycleEvent::PreUpdate {
                collection: collection.clone(),
                id: id.clone(),
                diff: current.clone(),
            };
            if let HookOutcome::Diff(normalized) = handler.handle(&event, ctx).await {
                current = normalized;
            }
        }
        current
    }
}
