//! Identity normalization for embedded sub-records
//!
//! Sub-records embedded in a content record (effects on a spell, items on a
//! pet) must carry a 16-character alphanumeric `_id`. When a sub-record's id
//! is missing or malformed, a replacement is derived from a digest of the
//! sub-record's own content (without its id), so the same content always
//! receives the same id and fingerprints stay stable.
//!
//! A container is either an array of sub-records or an object keyed by
//! sub-record id (`{"effects": {"<id>": {...}}}`). In the keyed form an
//! entry whose key was its invalid id is re-keyed under the derived id.
//!
//! Update diffs reach the normalizer in two shapes: a full nested container
//! (`{"effects": [{...}]}`) or flattened dotted keys
//! (`{"effects.0._id": "xyz", "effects.0.name": "Burn"}`). Both shapes
//! derive identical ids for the same sub-record.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value, json};

use crate::fingerprint::canonical_digest;
use crate::normalize::Normalizer;
use crate::record::STORAGE_ID_FIELD;

/// Required length of an embedded sub-record id
pub const EMBEDDED_ID_LEN: usize = 16;

/// Container fields normalized when a module does not configure its own.
/// The bundled stores validate the same list.
pub const DEFAULT_CONTAINERS: &[&str] = &["effects", "items"];

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// True when `id` is exactly 16 ASCII alphanumerics.
pub fn is_valid_embedded_id(id: &str) -> bool {
    id.len() == EMBEDDED_ID_LEN && id.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Derive the id for a sub-record from its content, ignoring its own `_id`.
pub fn derive_embedded_id(sub_record: &Map<String, Value>) -> String {
    derive_with_salt(sub_record, 0)
}

fn derive_with_salt(sub_record: &Map<String, Value>, salt: u32) -> String {
    let mut view = sub_record.clone();
    view.remove(STORAGE_ID_FIELD);
    let hashed = if salt == 0 {
        Value::Object(view)
    } else {
        json!({ "record": view, "salt": salt })
    };
    canonical_digest(&hashed)
        .iter()
        .take(EMBEDDED_ID_LEN)
        .map(|b| ALPHABET[usize::from(*b) % ALPHABET.len()] as char)
        .collect()
}

/// Derive an id not already in `used`, then reserve it.
///
/// Identical sibling sub-records would otherwise collide; the salt keeps
/// them distinct while staying deterministic for a given container order.
fn derive_unique(sub_record: &Map<String, Value>, used: &mut HashSet<String>) -> String {
    let mut salt = 0;
    loop {
        let candidate = derive_with_salt(sub_record, salt);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        salt += 1;
    }
}

/// Describe every embedded id in `data` that fails the shape check.
///
/// Stores use this as their strict-shape validation before accepting a write.
pub fn invalid_embedded_ids(data: &Map<String, Value>, containers: &[String]) -> Vec<String> {
    let mut invalid = Vec::new();
    for container in containers {
        let subs: Vec<(String, &Value)> = match data.get(container) {
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(index, item)| (index.to_string(), item))
                .collect(),
            Some(Value::Object(keyed)) => keyed.iter().map(|(k, v)| (k.clone(), v)).collect(),
            _ => continue,
        };
        for (slot, item) in subs {
            let Value::Object(sub) = item else { continue };
            match sub.get(STORAGE_ID_FIELD).and_then(Value::as_str) {
                Some(id) if is_valid_embedded_id(id) => {}
                Some(id) => invalid.push(format!("{container}.{slot}._id '{id}'")),
                None => invalid.push(format!("{container}.{slot}._id missing")),
            }
        }
    }
    invalid
}

/// Normalizer assigning content-derived ids to embedded sub-records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedIdNormalizer {
    containers: Vec<String>,
}

impl Default for EmbeddedIdNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_CONTAINERS.iter().copied())
    }
}

impl EmbeddedIdNormalizer {
    pub fn new(containers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            containers: containers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn containers(&self) -> &[String] {
        &self.containers
    }

    /// Normalize a partial update diff in either nested or flattened form.
    pub fn normalize_update_diff(&self, diff: Map<String, Value>) -> Map<String, Value> {
        let mut diff = self.normalize(diff);
        for container in &self.containers {
            normalize_flattened(&mut diff, container);
        }
        diff
    }
}

impl Normalizer for EmbeddedIdNormalizer {
    fn name(&self) -> &str {
        "embedded-ids"
    }

    fn normalize(&self, mut record: Map<String, Value>) -> Map<String, Value> {
        for container in &self.containers {
            match record.get_mut(container) {
                Some(Value::Array(items)) => normalize_items(items),
                Some(Value::Object(keyed)) => normalize_keyed(keyed),
                _ => {}
            }
        }
        record
    }
}

fn id_of(sub: &Map<String, Value>) -> &str {
    sub.get(STORAGE_ID_FIELD).and_then(Value::as_str).unwrap_or_default()
}

fn valid_id_of(item: &Value) -> Option<&str> {
    item.get(STORAGE_ID_FIELD)?
        .as_str()
        .filter(|id| is_valid_embedded_id(id))
}

fn normalize_items(items: &mut [Value]) {
    let mut used: HashSet<String> = items
        .iter()
        .filter_map(valid_id_of)
        .map(str::to_string)
        .collect();

    for item in items.iter_mut() {
        if valid_id_of(item).is_some() {
            continue;
        }
        let Value::Object(sub) = item else { continue };
        let derived = derive_unique(sub, &mut used);
        tracing::debug!(id = %derived, "Derived embedded sub-record id");
        sub.insert(STORAGE_ID_FIELD.to_string(), Value::String(derived));
    }
}

fn normalize_keyed(keyed: &mut Map<String, Value>) {
    let mut used: HashSet<String> = keyed
        .values()
        .filter_map(valid_id_of)
        .map(str::to_string)
        .collect();

    for (key, item) in std::mem::take(keyed) {
        let mut sub = match item {
            Value::Object(sub) if !is_valid_embedded_id(id_of(&sub)) => sub,
            other => {
                keyed.insert(key, other);
                continue;
            }
        };
        let previous = sub.get(STORAGE_ID_FIELD).and_then(Value::as_str);
        let rekey = previous.is_none_or(|id| id == key) || !is_valid_embedded_id(&key);
        let derived = derive_unique(&sub, &mut used);
        tracing::debug!(id = %derived, "Derived embedded sub-record id");
        sub.insert(STORAGE_ID_FIELD.to_string(), Value::String(derived.clone()));
        keyed.insert(if rekey { derived } else { key }, Value::Object(sub));
    }
}

/// One flattened sub-record reassembled from dotted diff keys.
#[derive(Default)]
struct FlatEntry {
    /// Reconstructed sub-record
    record: Map<String, Value>,
    /// Diff key holding the id, when the diff sets one
    id_key: Option<String>,
    /// Set when the diff carries the whole sub-record under `<container>.<n>`
    whole_key: Option<String>,
}

fn normalize_flattened(diff: &mut Map<String, Value>, container: &str) {
    let prefix = format!("{container}.");
    let mut entries: BTreeMap<usize, FlatEntry> = BTreeMap::new();

    for (key, value) in diff.iter() {
        let Some(rest) = key.strip_prefix(&prefix) else {
            continue;
        };
        let (index, path) = match rest.split_once('.') {
            Some((index, path)) => (index, Some(path)),
            None => (rest, None),
        };
        let Ok(index) = index.parse::<usize>() else {
            continue;
        };
        let entry = entries.entry(index).or_default();
        match path {
            Some(STORAGE_ID_FIELD) => {
                entry.id_key = Some(key.clone());
                entry
                    .record
                    .insert(STORAGE_ID_FIELD.to_string(), value.clone());
            }
            Some(path) => insert_dotted(&mut entry.record, path, value.clone()),
            None => {
                if let Value::Object(whole) = value {
                    entry.whole_key = Some(key.clone());
                    for (field, field_value) in whole {
                        entry.record.insert(field.clone(), field_value.clone());
                    }
                }
            }
        }
    }

    let mut used: HashSet<String> = entries
        .values()
        .filter_map(|entry| entry.record.get(STORAGE_ID_FIELD)?.as_str())
        .filter(|id| is_valid_embedded_id(id))
        .map(str::to_string)
        .collect();

    for entry in entries.values() {
        let current = entry.record.get(STORAGE_ID_FIELD).and_then(Value::as_str);
        if current.is_some_and(is_valid_embedded_id) {
            continue;
        }
        // A diff that does not touch the id leaves the stored id alone
        if current.is_none() && entry.whole_key.is_none() {
            continue;
        }
        let derived = Value::String(derive_unique(&entry.record, &mut used));
        if let Some(id_key) = &entry.id_key {
            diff.insert(id_key.clone(), derived);
        } else if let Some(whole_key) = &entry.whole_key
            && let Some(Value::Object(whole)) = diff.get_mut(whole_key)
        {
            whole.insert(STORAGE_ID_FIELD.to_string(), derived);
        }
    }
}

/// Insert `value` at a dotted path, creating intermediate objects.
fn insert_dotted(target: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            target.insert(path.to_string(), value);
        }
        Some((head, tail)) => {
            let slot = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(inner) = slot {
                insert_dotted(inner, tail, value);
            }
        }
    }
}
