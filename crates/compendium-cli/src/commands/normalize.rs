//! Normalize command implementation

use std::path::Path;

use compendium_core::{EmbeddedIdNormalizer, Normalizer};
use serde_json::Value;

use crate::error::{CliError, Result};

/// Normalize embedded ids in a record file and print the result.
pub fn run_normalize(file: &Path, containers: &[String]) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| CliError::user(format!("Cannot read {}: {e}", file.display())))?;
    let value: Value = serde_json::from_str(&content)?;
    let normalizer = EmbeddedIdNormalizer::new(containers.iter().cloned());

    let normalized = normalize_value(&normalizer, value)?;
    println!("{}", serde_json::to_string_pretty(&normalized)?);
    Ok(())
}

fn normalize_value(normalizer: &EmbeddedIdNormalizer, value: Value) -> Result<Value> {
    match value {
        Value::Object(record) => Ok(Value::Object(normalizer.normalize(record))),
        Value::Array(items) => items
            .into_iter()
            .map(|item| normalize_value(normalizer, item))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => Err(compendium_core::Error::Validation {
            message: format!("expected a record object or an array of records, found {other}"),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arrays_are_normalized_per_record() {
        let normalizer = EmbeddedIdNormalizer::default();
        let value = json!([
            {"name": "A", "effects": [{"_id": "xyz", "name": "Burn"}]},
            {"name": "B"}
        ]);
        let normalized = normalize_value(&normalizer, value).unwrap();
        assert_eq!(normalized[0]["effects"][0]["_id"].as_str().unwrap().len(), 16);
        assert_eq!(normalized[1], json!({"name": "B"}));
    }

    #[test]
    fn scalars_are_rejected() {
        let normalizer = EmbeddedIdNormalizer::default();
        assert!(normalize_value(&normalizer, json!(3)).is_err());
    }

    #[test]
    fn nested_arrays_are_rejected_inside() {
        let normalizer = EmbeddedIdNormalizer::default();
        assert!(normalize_value(&normalizer, json!([[1]])).is_err());
    }
}
