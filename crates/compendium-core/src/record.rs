//! Content records, business keys, and the validation step
//!
//! Every incoming JSON value passes through [`validate_record`] before it
//! reaches fingerprinting. Validation produces either a typed
//! [`ContentRecord`] or the full list of [`ValidationIssue`]s for it.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Top-level field the host uses for storage-assigned ids
pub const STORAGE_ID_FIELD: &str = "_id";

/// Caller-chosen stable identity of a content record.
///
/// Never empty and never surrounded by whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusinessKey(String);

impl BusinessKey {
    /// Create a key, returning `None` for empty or blank input.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BusinessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage-assigned record id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageId(String);

impl StorageId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Generate a fresh 16-character alphanumeric id.
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self(simple[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated unit of importable content.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRecord {
    pub key: BusinessKey,
    pub data: Map<String, Value>,
}

type KeyFn = dyn Fn(&Map<String, Value>) -> Option<String> + Send + Sync;

/// Extracts the business key from a raw record.
#[derive(Clone)]
pub enum KeyExtractor {
    /// Dotted path into the record, e.g. `system.spellId`
    Field(String),
    /// Arbitrary extraction function
    Custom(Arc<KeyFn>),
}

impl KeyExtractor {
    pub fn field(path: impl Into<String>) -> Self {
        Self::Field(path.into())
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Option<String> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Extract the key. Strings and numbers are accepted; anything else,
    /// including blank strings, yields `None`.
    pub fn extract(&self, record: &Map<String, Value>) -> Option<BusinessKey> {
        let raw = match self {
            Self::Field(path) => match lookup_path(record, path)? {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            },
            Self::Custom(f) => f(record)?,
        };
        BusinessKey::new(raw)
    }

    /// Human-readable description used in validation messages.
    pub fn describe(&self) -> &str {
        match self {
            Self::Field(path) => path,
            Self::Custom(_) => "<custom>",
        }
    }
}

impl fmt::Debug for KeyExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(path) => f.debug_tuple("Field").field(path).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Look up a dotted path (`system.school`) in a JSON object.
pub fn lookup_path<'a>(record: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// What a record must look like to be synchronized.
#[derive(Debug, Clone)]
pub struct RecordSchema {
    pub key: KeyExtractor,
    /// Dotted paths that must be present and non-null
    pub required: Vec<String>,
}

impl RecordSchema {
    pub fn new(key: KeyExtractor) -> Self {
        Self {
            key,
            required: Vec::new(),
        }
    }

    pub fn with_required(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required.extend(fields.into_iter().map(Into::into));
        self
    }
}

/// A reason a record was dropped before planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ValidationIssue {
    /// The document entry is not a JSON object
    NotAnObject { index: usize },
    /// The business key is absent, blank, or not a scalar
    MissingKey { index: usize, field: String },
    /// A required field is absent or null
    MissingField { index: usize, field: String },
}

impl ValidationIssue {
    pub fn is_missing_key(&self) -> bool {
        matches!(self, Self::MissingKey { .. })
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject { index } => write!(f, "entry {index} is not an object"),
            Self::MissingKey { index, field } => {
                write!(f, "entry {index} has no business key at '{field}'")
            }
            Self::MissingField { index, field } => {
                write!(f, "entry {index} is missing required field '{field}'")
            }
        }
    }
}

/// Validate one document entry.
///
/// A top-level storage id is stripped: records headed for a create must
/// never carry one, and updates get theirs from the existing collection.
pub fn validate_record(
    index: usize,
    value: Value,
    schema: &RecordSchema,
) -> std::result::Result<ContentRecord, Vec<ValidationIssue>> {
    let Value::Object(mut data) = value else {
        return Err(vec![ValidationIssue::NotAnObject { index }]);
    };

    let mut issues = Vec::new();
    let key = schema.key.extract(&data);
    if key.is_none() {
        issues.push(ValidationIssue::MissingKey {
            index,
            field: schema.key.describe().to_string(),
        });
    }
    for field in &schema.required {
        if matches!(lookup_path(&data, field), None | Some(Value::Null)) {
            issues.push(ValidationIssue::MissingField {
                index,
                field: field.clone(),
            });
        }
    }

    match key {
        Some(key) if issues.is_empty() => {
            data.remove(STORAGE_ID_FIELD);
            Ok(ContentRecord { key, data })
        }
        _ => Err(issues),
    }
}
