//! Content document sources
//!
//! A content document is plain JSON: either a top-level array of records or
//! an object whose record array is selected with a JSON pointer. Documents
//! are read fresh on every pass.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use compendium_fs::NormalizedPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::timeout::timed;
use crate::{Error, Result};

/// Where to find one content document and its records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Path relative to the source's base directory
    pub path: String,
    /// JSON pointer to the record array, e.g. `/spells`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<String>,
}

impl SourceRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            entries: None,
        }
    }

    pub fn with_entries(mut self, pointer: impl Into<String>) -> Self {
        self.entries = Some(pointer.into());
        self
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entries {
            Some(pointer) => write!(f, "{}#{}", self.path, pointer),
            None => f.write_str(&self.path),
        }
    }
}

/// Fetches content documents.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self, source: &SourceRef) -> Result<Value>;
}

/// Reads content documents from the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSource {
    base: NormalizedPath,
}

impl FileSource {
    pub fn new(base: impl Into<NormalizedPath>) -> Self {
        Self { base: base.into() }
    }

    pub fn resolve(&self, source: &SourceRef) -> NormalizedPath {
        NormalizedPath::new(&source.path).resolve_against(&self.base)
    }
}

#[async_trait]
impl ContentSource for FileSource {
    async fn fetch(&self, source: &SourceRef) -> Result<Value> {
        let path = self.resolve(source);
        let content = tokio::fs::read_to_string(path.to_native())
            .await
            .map_err(|e| Error::SourceFetch {
                source_ref: source.to_string(),
                message: format!("{path}: {e}"),
            })?;
        serde_json::from_str(&content).map_err(|e| Error::SourceFetch {
            source_ref: source.to_string(),
            message: format!("invalid JSON: {e}"),
        })
    }
}

/// Serves documents from memory, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    documents: HashMap<String, Value>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, path: impl Into<String>, document: Value) -> Self {
        self.documents.insert(path.into(), document);
        self
    }
}

#[async_trait]
impl ContentSource for StaticSource {
    async fn fetch(&self, source: &SourceRef) -> Result<Value> {
        self.documents
            .get(&source.path)
            .cloned()
            .ok_or_else(|| Error::SourceFetch {
                source_ref: source.to_string(),
                message: "document not found".to_string(),
            })
    }
}

/// Pull the record array out of a fetched document.
pub fn extract_entries(mut document: Value, source: &SourceRef) -> Result<Vec<Value>> {
    let selected = match &source.entries {
        Some(pointer) => document
            .pointer_mut(pointer)
            .map(Value::take)
            .ok_or_else(|| Error::SourceFetch {
                source_ref: source.to_string(),
                message: format!("no value at pointer '{pointer}'"),
            })?,
        None => document,
    };

    match selected {
        Value::Array(items) => Ok(items),
        other => Err(Error::SourceFetch {
            source_ref: source.to_string(),
            message: format!("expected an array of records, found {}", json_type(&other)),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Fetch every document in order and concatenate their records.
///
/// The first failing document aborts the whole load.
pub async fn load_records(
    source: &dyn ContentSource,
    refs: &[SourceRef],
    timeout: Duration,
) -> Result<Vec<Value>> {
    let mut records = Vec::new();
    for source_ref in refs {
        let document = timed(
            &format!("fetching {source_ref}"),
            timeout,
            source.fetch(source_ref),
        )
        .await?;
        let entries = extract_entries(document, source_ref)?;
        tracing::debug!(source = %source_ref, records = entries.len(), "Loaded content document");
        records.extend(entries);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn top_level_array_is_used_directly() {
        let entries = extract_entries(json!([{"name": "a"}]), &SourceRef::new("a.json")).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn pointer_selects_nested_array() {
        let source = SourceRef::new("pets.json").with_entries("/data/pets");
        let doc = json!({"data": {"pets": [{"name": "Wolf"}, {"name": "Hawk"}]}});
        let entries = extract_entries(doc, &source).unwrap();
        assert_eq!(entries[1]["name"], "Hawk");
    }

    #[test]
    fn object_without_pointer_is_rejected() {
        let err = extract_entries(json!({"spells": []}), &SourceRef::new("s.json")).unwrap_err();
        assert!(err.to_string().contains("found an object"), "{err}");
    }

    #[test]
    fn dangling_pointer_is_rejected() {
        let source = SourceRef::new("s.json").with_entries("/missing");
        assert!(matches!(
            extract_entries(json!({}), &source),
            Err(Error::SourceFetch { .. })
        ));
    }

    #[tokio::test]
    async fn load_records_concatenates_in_order() {
        let source = StaticSource::new()
            .with_document("a.json", json!([{"n": 1}]))
            .with_document("b.json", json!({"entries": [{"n": 2}, {"n": 3}]}));
        let refs = vec![
            SourceRef::new("a.json"),
            SourceRef::new("b.json").with_entries("/entries"),
        ];

        let records = load_records(&source, &refs, Duration::from_secs(1))
            .await
            .unwrap();
        let numbers: Vec<i64> = records.iter().map(|r| r["n"].as_i64().unwrap()).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn missing_static_document_is_a_fetch_error() {
        let err = StaticSource::new()
            .fetch(&SourceRef::new("nope.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SourceFetch { .. }));
    }
}
