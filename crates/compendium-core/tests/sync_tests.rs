//! End-to-end sync passes through `ContentSynchronizer`

use std::sync::Arc;
use std::time::Duration;

use compendium_core::config::{ModuleConfig, SyncSettings};
use compendium_core::locks::OverlapPolicy;
use compendium_core::plan::DuplicateKeyPolicy;
use compendium_core::store::{CollectionKey, MemoryStore};
use compendium_core::{
    Actor, CapabilityRegistry, ContentModule, ContentSynchronizer, Error, FingerprintVersion,
    ModuleContext, Role, SourceRef, StaticSource, SyncOptions, is_valid_embedded_id,
};
use compendium_test_utils::records::{effect, pet, spell};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{Value, json};

fn spells_module() -> ModuleConfig {
    let mut module = ModuleConfig::new("spells", "world.spells", "spells.json");
    module.key = "system.spellId".to_string();
    module
}

fn spells(records: Vec<Value>) -> StaticSource {
    StaticSource::new().with_document("spells.json", Value::Array(records))
}

fn context(store: &Arc<MemoryStore>, source: StaticSource) -> ModuleContext {
    ModuleContext::new(store.clone(), Arc::new(source))
}

fn collection() -> CollectionKey {
    CollectionKey::new("world.spells")
}

fn sample() -> Vec<Value> {
    vec![
        spell("fire-bolt", "Fire Bolt", 0).build(),
        spell("shield", "Shield", 1).build(),
        spell("fireball", "Fireball", 3).build(),
    ]
}

#[tokio::test]
async fn second_pass_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context(&store, spells(sample()));
    let sync = ContentSynchronizer::new(spells_module());

    let first = sync.run(&ctx, SyncOptions::default()).await.unwrap();
    assert_eq!((first.created, first.updated, first.unchanged), (3, 0, 0));
    let writes_after_first = store.calls().writes();

    let second = sync.run(&ctx, SyncOptions::default()).await.unwrap();
    assert_eq!((second.created, second.updated, second.unchanged), (0, 0, 3));
    assert_eq!(store.calls().writes(), writes_after_first);
    assert_eq!(store.records(&collection()).len(), 3);
}

#[tokio::test]
async fn only_changed_records_are_rewritten() {
    let store = Arc::new(MemoryStore::new());
    let sync = ContentSynchronizer::new(spells_module());
    sync.run(&context(&store, spells(sample())), SyncOptions::default())
        .await
        .unwrap();
    let ids_before: Vec<String> = store
        .records(&collection())
        .iter()
        .map(|r| r.id.to_string())
        .collect();

    let mut changed = sample();
    changed[1] = spell("shield", "Shield", 2).build();
    changed.push(spell("mage-armor", "Mage Armor", 1).build());
    let report = sync
        .run(&context(&store, spells(changed)), SyncOptions::default())
        .await
        .unwrap();

    assert_eq!((report.created, report.updated, report.unchanged), (1, 1, 2));
    let records = store.records(&collection());
    assert_eq!(records.len(), 4);
    let shield = records
        .iter()
        .find(|r| r.key.as_deref() == Some("shield"))
        .unwrap();
    assert_eq!(shield.data["system"]["level"], 2);
    assert!(ids_before.contains(&shield.id.to_string()));
}

#[tokio::test]
async fn key_reordered_source_is_unchanged() {
    let store = Arc::new(MemoryStore::new());
    let sync = ContentSynchronizer::new(spells_module());
    let original = json!({
        "name": "Shield",
        "type": "spell",
        "system": {"spellId": "shield", "level": 1}
    });
    let reordered = json!({
        "system": {"level": 1, "spellId": "shield"},
        "type": "spell",
        "name": "Shield"
    });

    sync.run(&context(&store, spells(vec![original])), SyncOptions::default())
        .await
        .unwrap();
    let report = sync
        .run(&context(&store, spells(vec![reordered])), SyncOptions::default())
        .await
        .unwrap();

    assert_eq!((report.updated, report.unchanged), (0, 1));
}

#[tokio::test]
async fn deleted_record_is_recreated() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context(&store, spells(sample()));
    let sync = ContentSynchronizer::new(spells_module());
    sync.run(&ctx, SyncOptions::default()).await.unwrap();

    let victim = store.records(&collection())[0].id.clone();
    assert!(store.remove(&collection(), &victim));

    let report = sync.run(&ctx, SyncOptions::default()).await.unwrap();
    assert_eq!((report.created, report.unchanged), (1, 2));
}

#[tokio::test]
async fn records_without_key_are_counted_not_written() {
    let store = Arc::new(MemoryStore::new());
    let mut records = sample();
    records.push(json!({"name": "Nameless", "system": {}}));
    let ctx = context(&store, spells(records));

    let report = ContentSynchronizer::new(spells_module())
        .run(&ctx, SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(report.created, 3);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.missing_keys, 1);
    assert_eq!(store.records(&collection()).len(), 3);
}

#[tokio::test]
async fn multiple_documents_are_concatenated_in_order() {
    let store = Arc::new(MemoryStore::new());
    let source = StaticSource::new()
        .with_document("core.json", json!({"spells": [spell("a", "A", 1).build()]}))
        .with_document("extra.json", json!({"spells": [spell("b", "B", 1).build()]}));
    let mut module = spells_module();
    module.sources = vec!["core.json".to_string(), "extra.json".to_string()];
    module.entries = Some("/spells".to_string());

    let report = ContentSynchronizer::new(module)
        .run(&context(&store, source), SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(report.created, 2);
    let keys: Vec<Option<String>> = store
        .records(&collection())
        .into_iter()
        .map(|r| r.key)
        .collect();
    assert_eq!(keys, vec![Some("a".to_string()), Some("b".to_string())]);
}

#[tokio::test]
async fn missing_document_aborts_before_any_write() {
    let store = Arc::new(MemoryStore::new());
    let mut module = spells_module();
    module.sources.push("missing.json".to_string());

    let err = ContentSynchronizer::new(module)
        .run(&context(&store, spells(sample())), SyncOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::SourceFetch { ref source_ref, .. } if source_ref == "missing.json"
    ));
    assert_eq!(store.calls().writes(), 0);
    assert_eq!(store.calls().ensure_collection, 0);
    assert!(!store.has_collection(&collection()));
}

#[tokio::test]
async fn rejected_duplicates_leave_the_collection_uncreated() {
    let store = Arc::new(MemoryStore::new());
    let settings = SyncSettings {
        duplicate_keys: DuplicateKeyPolicy::Reject,
        ..Default::default()
    };
    let mut records = sample();
    records.push(spell("shield", "Shield", 2).build());
    let ctx = context(&store, spells(records)).with_settings(settings);

    let err = ContentSynchronizer::new(spells_module())
        .run(&ctx, SyncOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DuplicateKey { ref key } if key == "shield"), "{err:?}");
    assert_eq!(store.calls().ensure_collection, 0);
    assert!(!store.has_collection(&collection()));
}

#[rstest]
#[case::player(Role::Player)]
#[case::trusted(Role::Trusted)]
#[case::assistant(Role::Assistant)]
#[tokio::test]
async fn unprivileged_actor_is_rejected_before_store_calls(#[case] role: Role) {
    let store = Arc::new(MemoryStore::new());
    let ctx = context(&store, spells(sample())).with_actor(Actor::new("alex", role));

    let err = ContentSynchronizer::new(spells_module())
        .run(&ctx, SyncOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Authorization { .. }), "{err:?}");
    assert_eq!(store.calls().ensure_collection, 0);
    assert_eq!(store.calls().writes(), 0);
    assert!(!store.has_collection(&collection()));
}

#[tokio::test]
async fn dry_run_needs_no_privilege_and_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context(&store, spells(sample())).with_actor(Actor::new("alex", Role::Player));

    let report = ContentSynchronizer::new(spells_module())
        .check(&ctx)
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.created, 3);
    assert_eq!(store.calls().ensure_collection, 0);
    assert!(!store.has_collection(&collection()));
}

#[tokio::test]
async fn overlapping_pass_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context(&store, spells(sample()));
    let sync = ContentSynchronizer::new(spells_module());

    let _held = ctx
        .locks
        .acquire(&collection(), OverlapPolicy::Reject)
        .await
        .unwrap();
    let err = sync.run(&ctx, SyncOptions::default()).await.unwrap_err();

    assert!(matches!(
        err,
        Error::SyncInProgress { ref collection } if collection == "world.spells"
    ));
    assert_eq!(store.calls().ensure_collection, 0);
}

#[tokio::test]
async fn queued_passes_never_duplicate_creates() {
    let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(5)));
    let settings = SyncSettings {
        overlap: OverlapPolicy::Queue,
        ..Default::default()
    };
    let ctx = context(&store, spells(sample())).with_settings(settings);
    let sync = ContentSynchronizer::new(spells_module());

    let (a, b) = tokio::join!(
        sync.run(&ctx, SyncOptions::default()),
        sync.run(&ctx, SyncOptions::default())
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.created + b.created, 3);
    assert_eq!(store.records(&collection()).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn slow_store_times_out() {
    let store = Arc::new(MemoryStore::new().with_latency(Duration::from_secs(60)));
    let settings = SyncSettings {
        timeout_secs: 1,
        ..Default::default()
    };
    let ctx = context(&store, spells(sample())).with_settings(settings);

    let err = ContentSynchronizer::new(spells_module())
        .run(&ctx, SyncOptions::default())
        .await
        .unwrap_err();

    match err {
        Error::Timeout { operation, after } => {
            assert!(operation.contains("world.spells"), "{operation}");
            assert_eq!(after, Duration::from_secs(1));
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn rejected_records_surface_as_partial_batch() {
    let store = Arc::new(MemoryStore::new());
    store.reject_key("shield");
    let ctx = context(&store, spells(sample()));

    let err = ContentSynchronizer::new(spells_module())
        .run(&ctx, SyncOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PartialBatch { created: 2, .. }), "{err:?}");
    assert_eq!(store.records(&collection()).len(), 2);
}

#[tokio::test]
async fn embedded_ids_are_normalized_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    let record = spell("burning-hands", "Burning Hands", 1)
        .effect(effect("Burning", Some("xyz")))
        .build();
    let ctx = {
        let mut registry = CapabilityRegistry::new();
        let module = ContentModule::new(spells_module());
        module.initialize(&mut registry);
        context(&store, spells(vec![record.clone()])).with_registry(registry)
    };
    let sync = ContentSynchronizer::new(spells_module());

    let first = sync.run(&ctx, SyncOptions::default()).await.unwrap();
    assert_eq!(first.created, 1);
    let stored = store.records(&collection());
    let id = stored[0].data["effects"][0]["_id"].as_str().unwrap().to_string();
    assert_eq!(id.len(), 16);
    assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));

    let second = sync.run(&ctx, SyncOptions::default()).await.unwrap();
    assert_eq!((second.updated, second.unchanged), (0, 1));
}

fn pets_context(store: &Arc<MemoryStore>, module: &ModuleConfig, pets: Value) -> ModuleContext {
    let mut registry = CapabilityRegistry::new();
    ContentModule::new(module.clone()).initialize(&mut registry);
    let source = StaticSource::new().with_document("pets.json", pets);
    ModuleContext::new(store.clone(), Arc::new(source)).with_registry(registry)
}

#[tokio::test]
async fn default_module_converges_with_item_sub_records() {
    let store = Arc::new(MemoryStore::new());
    let module = ModuleConfig::new("pets", "world.pets", "pets.json");
    let wolf = pet("Wolf", 11).push("items", json!({"name": "Collar"})).build();
    let ctx = pets_context(&store, &module, json!([wolf]));
    let sync = ContentSynchronizer::new(module);

    let first = sync.run(&ctx, SyncOptions::default()).await.unwrap();
    assert_eq!(first.created, 1);
    let stored = store.records(&CollectionKey::new("world.pets"));
    assert!(is_valid_embedded_id(stored[0].data["items"][0]["_id"].as_str().unwrap()));

    let second = sync.run(&ctx, SyncOptions::default()).await.unwrap();
    assert_eq!((second.created, second.updated, second.unchanged), (0, 0, 1));
}

#[tokio::test]
async fn keyed_effect_containers_converge() {
    let store = Arc::new(MemoryStore::new());
    let module = ModuleConfig::new("pets", "world.pets", "pets.json");
    let hawk = json!({
        "name": "Hawk",
        "effects": {"xyz": {"_id": "xyz", "name": "Keen Sight"}}
    });
    let ctx = pets_context(&store, &module, json!([hawk]));
    let sync = ContentSynchronizer::new(module);

    let first = sync.run(&ctx, SyncOptions::default()).await.unwrap();
    assert_eq!(first.created, 1);
    let stored = store.records(&CollectionKey::new("world.pets"));
    let effects = stored[0].data["effects"].as_object().unwrap();
    let (key, effect) = effects.iter().next().unwrap();
    assert!(is_valid_embedded_id(key));
    assert_eq!(effect["_id"].as_str(), Some(key.as_str()));

    let second = sync.run(&ctx, SyncOptions::default()).await.unwrap();
    assert_eq!(second.unchanged, 1);
}

#[tokio::test]
async fn unnormalized_embedded_ids_are_rejected_by_the_store() {
    let store = Arc::new(MemoryStore::new());
    let record = spell("burning-hands", "Burning Hands", 1)
        .effect(effect("Burning", Some("xyz")))
        .build();
    let ctx = context(&store, spells(vec![record]));

    let err = ContentSynchronizer::new(spells_module())
        .run(&ctx, SyncOptions::default())
        .await
        .unwrap_err();

    match err {
        Error::PartialBatch { failures, .. } => {
            assert!(failures[0].reason.contains("effects.0._id"), "{}", failures[0]);
        }
        other => panic!("expected PartialBatch, got {other:?}"),
    }
}

#[tokio::test]
async fn widening_fingerprints_is_lazy() {
    let store = Arc::new(MemoryStore::new());
    let sync = ContentSynchronizer::new(spells_module());
    sync.run(&context(&store, spells(sample())), SyncOptions::default())
        .await
        .unwrap();

    let v2 = SyncSettings {
        fingerprint: FingerprintVersion::V2,
        ..Default::default()
    };
    let ctx = context(&store, spells(sample())).with_settings(v2.clone());
    let report = sync.run(&ctx, SyncOptions::default()).await.unwrap();
    assert_eq!((report.updated, report.unchanged), (0, 3));
    assert!(store.records(&collection()).iter().all(|r| r.fingerprint.starts_with("v1:")));

    let upgrade = SyncSettings {
        upgrade_stale_fingerprints: true,
        ..v2
    };
    let ctx = context(&store, spells(sample())).with_settings(upgrade);
    let report = sync.run(&ctx, SyncOptions::default()).await.unwrap();
    assert_eq!(report.updated, 3);
    assert_eq!(report.suspected_drift, 0);
    assert!(store.records(&collection()).iter().all(|r| r.fingerprint.starts_with("v2:")));
}

#[test]
fn source_refs_carry_entries_pointer() {
    let mut module = spells_module();
    module.entries = Some("/spells".to_string());
    assert_eq!(
        module.source_refs(),
        vec![SourceRef::new("spells.json").with_entries("/spells")]
    );
}
