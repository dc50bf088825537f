//! Normalization hooks applied before fingerprinting
//!
//! A normalizer canonicalizes shapes the persistence layer would otherwise
//! rewrite on save. It must be pure and idempotent, or fingerprints never
//! settle and every pass reports updates.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::record::BusinessKey;
use crate::{Error, Result};

/// A pure, idempotent record transform.
pub trait Normalizer: Send + Sync {
    /// Name used in logs and drift errors
    fn name(&self) -> &str;

    fn normalize(&self, record: Map<String, Value>) -> Map<String, Value>;
}

/// Several normalizers applied in order.
#[derive(Clone, Default)]
pub struct NormalizerChain {
    steps: Vec<Arc<dyn Normalizer>>,
}

impl NormalizerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, step: Arc<dyn Normalizer>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Normalizer for NormalizerChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn normalize(&self, record: Map<String, Value>) -> Map<String, Value> {
        self.steps
            .iter()
            .fold(record, |acc, step| step.normalize(acc))
    }
}

/// Normalize `record` and verify that a second application is a no-op.
///
/// Returns the once-normalized record.
pub fn check_idempotent(
    normalizer: &dyn Normalizer,
    key: &BusinessKey,
    record: Map<String, Value>,
) -> Result<Map<String, Value>> {
    let once = normalizer.normalize(record);
    let twice = normalizer.normalize(once.clone());
    if once != twice {
        tracing::error!(
            normalizer = normalizer.name(),
            key = %key,
            "Normalizer output changed on second application"
        );
        return Err(Error::NormalizationDrift {
            normalizer: normalizer.name().to_string(),
            key: key.to_string(),
        });
    }
    Ok(once)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Lowercase;

    impl Normalizer for Lowercase {
        fn name(&self) -> &str {
            "lowercase"
        }

        fn normalize(&self, mut record: Map<String, Value>) -> Map<String, Value> {
            if let Some(Value::String(name)) = record.get_mut("name") {
                *name = name.to_lowercase();
            }
            record
        }
    }

    /// Appends to the name every time, so never settles
    struct Appending;

    impl Normalizer for Appending {
        fn name(&self) -> &str {
            "appending"
        }

        fn normalize(&self, mut record: Map<String, Value>) -> Map<String, Value> {
            if let Some(Value::String(name)) = record.get_mut("name") {
                name.push('!');
            }
            record
        }
    }

    fn record() -> Map<String, Value> {
        json!({"name": "Firebolt"}).as_object().cloned().unwrap()
    }

    #[test]
    fn chain_applies_in_order() {
        let chain = NormalizerChain::new()
            .then(Arc::new(Appending))
            .then(Arc::new(Lowercase));
        let out = chain.normalize(record());
        assert_eq!(out["name"], "firebolt!");
    }

    #[test]
    fn idempotent_normalizer_passes() {
        let key = BusinessKey::new("fb").unwrap();
        let out = check_idempotent(&Lowercase, &key, record()).unwrap();
        assert_eq!(out["name"], "firebolt");
    }

    #[test]
    fn drifting_normalizer_is_reported() {
        let key = BusinessKey::new("fb").unwrap();
        let err = check_idempotent(&Appending, &key, record()).unwrap_err();
        assert!(matches!(
            err,
            Error::NormalizationDrift { ref normalizer, ref key }
                if normalizer == "appending" && key == "fb"
        ));
    }
}
