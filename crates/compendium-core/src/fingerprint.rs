//! Content fingerprints for change detection
//!
//! A fingerprint is a truncated SHA-256 over the canonical JSON form of a
//! record. Canonical form sorts object keys at every depth, so two records
//! that differ only in field order hash identically. Fingerprints detect
//! change; they are not an integrity check and collisions are tolerated.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::record::STORAGE_ID_FIELD;

/// Digest width generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintVersion {
    /// 32-bit digest, adequate for a few thousand records
    #[default]
    V1,
    /// 128-bit digest
    V2,
}

impl FingerprintVersion {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }

    /// Digest bytes kept from the SHA-256 output
    fn digest_bytes(self) -> usize {
        match self {
            Self::V1 => 4,
            Self::V2 => 16,
        }
    }

    fn hex_len(self) -> usize {
        self.digest_bytes() * 2
    }
}

impl fmt::Display for FingerprintVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A versioned content digest, rendered as `<version>:<hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    version: FingerprintVersion,
    digest: String,
}

impl Fingerprint {
    pub fn version(&self) -> FingerprintVersion {
        self.version
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Parse a stored fingerprint.
    ///
    /// Accepts `v1:<8 hex>`, `v2:<32 hex>`, and a bare 8-hex digest written
    /// before fingerprints carried a version.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (version, digest) = match raw.split_once(':') {
            Some(("v1", digest)) => (FingerprintVersion::V1, digest),
            Some(("v2", digest)) => (FingerprintVersion::V2, digest),
            Some(_) => return None,
            None => (FingerprintVersion::V1, raw),
        };
        let well_formed =
            digest.len() == version.hex_len() && digest.chars().all(|c| c.is_ascii_hexdigit());
        well_formed.then(|| Self {
            version,
            digest: digest.to_ascii_lowercase(),
        })
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.version, self.digest)
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid fingerprint: {s}"))
    }
}

/// How fingerprints are computed for one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintOptions {
    /// Version stamped on new and updated records
    pub version: FingerprintVersion,
    /// Top-level fields excluded from the digest, in addition to `_id`
    pub ignore: Vec<String>,
    /// Rewrite records whose stored stamp uses an older version
    pub upgrade_stale: bool,
}

/// Serialize a value with object keys sorted at every depth and no whitespace.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Raw SHA-256 of the canonical form.
pub(crate) fn canonical_digest(value: &Value) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Fingerprint an arbitrary JSON value.
pub fn fingerprint(value: &Value, version: FingerprintVersion) -> Fingerprint {
    let digest = canonical_digest(value);
    let hex = digest[..version.digest_bytes()]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    Fingerprint {
        version,
        digest: hex,
    }
}

/// Strip the storage id and ignored fields from a record's data.
pub fn fingerprint_view(data: &Map<String, Value>, ignore: &[String]) -> Value {
    let mut view = data.clone();
    view.remove(STORAGE_ID_FIELD);
    for field in ignore {
        view.remove(field);
    }
    Value::Object(view)
}

/// Fingerprint a record's (already normalized) data at a given version.
pub fn fingerprint_data(
    data: &Map<String, Value>,
    options: &FingerprintOptions,
    version: FingerprintVersion,
) -> Fingerprint {
    fingerprint(&fingerprint_view(data, &options.ignore), version)
}
