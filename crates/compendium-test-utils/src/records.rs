//! Content record builders.

use serde_json::{Map, Value, json};

/// Builds one content record as a JSON object.
///
/// ```rust
/// use compendium_test_utils::records::RecordBuilder;
///
/// let record = RecordBuilder::new()
///     .field("name", "Wolf")
///     .field("system.hp", 11)
///     .build();
/// assert_eq!(record["system"]["hp"], 11);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordBuilder {
    data: Map<String, Value>,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field by dotted path, creating intermediate objects.
    ///
    /// # Panics
    /// Panics if an intermediate segment already holds a non-object value.
    pub fn field(mut self, path: &str, value: impl Into<Value>) -> Self {
        let mut segments: Vec<&str> = path.split('.').collect();
        let last = segments
            .pop()
            .unwrap_or_else(|| panic!("RecordBuilder::field: empty path"));
        let mut target = &mut self.data;
        for segment in segments {
            target = target
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()))
                .as_object_mut()
                .unwrap_or_else(|| panic!("RecordBuilder::field: '{segment}' is not an object"));
        }
        target.insert(last.to_string(), value.into());
        self
    }

    /// Append an embedded sub-record to `container`.
    pub fn push(mut self, container: &str, item: Value) -> Self {
        let slot = self
            .data
            .entry(container.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match slot {
            Value::Array(items) => items.push(item),
            other => panic!("RecordBuilder::push: '{container}' holds {other}"),
        }
        self
    }

    /// Append an effect sub-record.
    pub fn effect(self, item: Value) -> Self {
        self.push("effects", item)
    }

    pub fn build(self) -> Value {
        Value::Object(self.data)
    }
}

/// A spell keyed by `system.spellId`.
pub fn spell(id: &str, name: &str, level: u32) -> RecordBuilder {
    RecordBuilder::new()
        .field("name", name)
        .field("type", "spell")
        .field("system.spellId", id)
        .field("system.level", level)
}

/// A pet keyed by `name`.
pub fn pet(name: &str, hp: u32) -> RecordBuilder {
    RecordBuilder::new()
        .field("name", name)
        .field("type", "npc")
        .field("system.hp", hp)
}

/// An effect sub-record, with an optional `_id`.
pub fn effect(name: &str, id: Option<&str>) -> Value {
    let mut item = json!({ "name": name, "disabled": false });
    if let (Some(id), Some(map)) = (id, item.as_object_mut()) {
        map.insert("_id".to_string(), Value::String(id.to_string()));
    }
    item
}
