//! Per-module configuration

use serde::{Deserialize, Serialize};

use crate::embedded::DEFAULT_CONTAINERS;
use crate::fingerprint::FingerprintOptions;
use crate::record::{KeyExtractor, RecordSchema};
use crate::source::SourceRef;
use crate::store::{CollectionKey, CollectionKind, FetchMode};
use crate::{Error, Result};

fn default_key() -> String {
    "name".to_string()
}

fn default_embedded() -> Vec<String> {
    DEFAULT_CONTAINERS.iter().map(|c| c.to_string()).collect()
}

fn default_true() -> bool {
    true
}

/// One content domain: its documents, destination collection, and rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Module id used in logs and on the command line
    pub id: String,
    /// Destination collection
    pub collection: String,
    #[serde(default)]
    pub kind: CollectionKind,
    /// Display label; defaults to the id
    #[serde(default)]
    pub label: Option<String>,
    /// Content documents, read in order
    pub sources: Vec<String>,
    /// JSON pointer to the record array inside each document
    #[serde(default)]
    pub entries: Option<String>,
    /// Dotted path of the business key
    #[serde(default = "default_key")]
    pub key: String,
    /// Dotted paths every record must have
    #[serde(default)]
    pub required: Vec<String>,
    /// Top-level fields excluded from fingerprints
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Embedded sub-record containers whose ids are normalized
    #[serde(default = "default_embedded")]
    pub embedded: Vec<String>,
    #[serde(default = "default_true")]
    pub normalize_before_store: bool,
    #[serde(default)]
    pub fetch: FetchMode,
}

impl ModuleConfig {
    /// Minimal module keyed by `name`, reading one document.
    pub fn new(
        id: impl Into<String>,
        collection: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            kind: CollectionKind::default(),
            label: None,
            sources: vec![source.into()],
            entries: None,
            key: default_key(),
            required: Vec::new(),
            ignore: Vec::new(),
            embedded: default_embedded(),
            normalize_before_store: true,
            fetch: FetchMode::default(),
        }
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }

    pub fn collection_key(&self) -> CollectionKey {
        CollectionKey::new(&self.collection)
    }

    pub fn schema(&self) -> RecordSchema {
        RecordSchema::new(KeyExtractor::field(&self.key))
            .with_required(self.required.iter().cloned())
    }

    pub fn source_refs(&self) -> Vec<SourceRef> {
        self.sources
            .iter()
            .map(|path| SourceRef {
                path: path.clone(),
                entries: self.entries.clone(),
            })
            .collect()
    }

    pub fn fingerprint_options(&self, settings: &super::SyncSettings) -> FingerprintOptions {
        FingerprintOptions {
            version: settings.fingerprint,
            ignore: self.ignore.clone(),
            upgrade_stale: settings.upgrade_stale_fingerprints,
        }
    }

    pub(super) fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::config("module id must not be empty"));
        }
        if self.collection.trim().is_empty() {
            return Err(Error::config(format!("module '{}' has no collection", self.id)));
        }
        if self.sources.is_empty() {
            return Err(Error::config(format!("module '{}' has no sources", self.id)));
        }
        if self.key.trim().is_empty() {
            return Err(Error::config(format!("module '{}' has an empty key path", self.id)));
        }
        if let Some(pointer) = &self.entries
            && !pointer.is_empty()
            && !pointer.starts_with('/')
        {
            return Err(Error::config(format!(
                "module '{}': entries pointer '{pointer}' must start with '/'",
                self.id
            )));
        }
        Ok(())
    }
}
