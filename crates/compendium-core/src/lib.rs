//! Content synchronizer for compendium collections
//!
//! Converges persistent document collections toward declarative JSON
//! content documents. Every record is matched by a stable business key and
//! stamped with a fingerprint of its canonical content, so a pass only
//! creates what is new, rewrites what changed, and leaves everything else
//! untouched. Running the same pass twice writes nothing the second time.
//!
//! # Architecture
//!
//! ```text
//!            compendium-cli
//!                  |
//!   runtime -- module -- lifecycle
//!                  |
//!            synchronizer
//!                  |
//!   source -- plan -- apply -- store
//!                  |
//!   record  fingerprint  normalize  embedded
//!                  |
//!            compendium-fs
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use compendium_core::{
//!     ContentSynchronizer, MemoryStore, ModuleConfig, ModuleContext, StaticSource, SyncOptions,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let source = StaticSource::new().with_document(
//!     "spells.json",
//!     json!([{ "name": "Firebolt", "level": 0 }, { "name": "Shield", "level": 1 }]),
//! );
//! let ctx = ModuleContext::new(Arc::new(MemoryStore::new()), Arc::new(source));
//! let sync = ContentSynchronizer::new(ModuleConfig::new("spells", "world.spells", "spells.json"));
//!
//! let first = sync.run(&ctx, SyncOptions::default()).await.unwrap();
//! assert_eq!(first.created, 2);
//!
//! let second = sync.run(&ctx, SyncOptions::default()).await.unwrap();
//! assert_eq!((second.created, second.updated, second.unchanged), (0, 0, 2));
//! # }
//! ```

pub mod apply;
pub mod auth;
pub mod capabilities;
pub mod config;
pub mod embedded;
pub mod error;
pub mod fingerprint;
pub mod lifecycle;
pub mod locks;
pub mod module;
pub mod normalize;
pub mod notify;
pub mod plan;
pub mod record;
pub mod runtime;
pub mod source;
pub mod store;
pub mod synchronizer;
pub mod timeout;

pub use apply::{ApplyOptions, ApplyReport, apply};
pub use auth::{Actor, Role};
pub use capabilities::{Capability, CapabilityRegistry, NORMALIZER, NOTIFIER};
pub use config::{ModuleConfig, SyncConfig, SyncSettings};
pub use embedded::{EmbeddedIdNormalizer, derive_embedded_id, is_valid_embedded_id};
pub use error::{Error, Result};
pub use fingerprint::{
    Fingerprint, FingerprintOptions, FingerprintVersion, canonical_json, fingerprint,
};
pub use lifecycle::{EventBus, HookOutcome, LifecycleEvent, LifecycleHandler};
pub use locks::{OverlapPolicy, SyncLocks};
pub use module::{ContentModule, ModuleContext};
pub use normalize::{Normalizer, NormalizerChain};
pub use notify::{MemoryNotifier, Notification, NotificationLevel, Notifier, TracingNotifier};
pub use plan::{DuplicateKeyPolicy, PlanContext, SyncPlan, plan};
pub use record::{
    BusinessKey, ContentRecord, KeyExtractor, RecordSchema, StorageId, ValidationIssue,
};
pub use runtime::Runtime;
pub use source::{ContentSource, FileSource, SourceRef, StaticSource};
pub use store::{
    CollectionKey, CollectionKind, DocumentStore, ExistingEntry, FetchMode, JsonFileStore,
    MemoryStore, NewRecord, RecordUpdate,
};
pub use synchronizer::{ContentSynchronizer, SyncOptions, SyncReport};
