//! Configuration for sync passes
//!
//! Loaded from `compendium.toml` (or `.json` / `.yaml`). Relative paths are
//! resolved against the directory holding the configuration file.

mod module;

pub use module::ModuleConfig;

use std::time::Duration;

use compendium_fs::{ConfigStore, NormalizedPath};
use serde::{Deserialize, Serialize};

use crate::auth::{Actor, Role};
use crate::fingerprint::FingerprintVersion;
use crate::locks::OverlapPolicy;
use crate::plan::DuplicateKeyPolicy;
use crate::{Error, Result};

/// Default config file name looked up by the CLI
pub const CONFIG_FILE_NAME: &str = "compendium.toml";

fn default_timeout_secs() -> u64 {
    30
}

fn default_store_root() -> String {
    ".compendium/packs".to_string()
}

fn default_actor_name() -> String {
    "player".to_string()
}

fn default_actor_role() -> Role {
    Role::Player
}

/// Pass-wide behavior shared by every module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Deadline for each source fetch and store call
    pub timeout_secs: u64,
    pub overlap: OverlapPolicy,
    pub duplicate_keys: DuplicateKeyPolicy,
    pub fingerprint: FingerprintVersion,
    /// Rewrite records stamped with an older fingerprint version
    pub upgrade_stale_fingerprints: bool,
    /// Check every normalizer for idempotence on every record
    pub verify_normalizer: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            overlap: OverlapPolicy::default(),
            duplicate_keys: DuplicateKeyPolicy::default(),
            fingerprint: FingerprintVersion::default(),
            upgrade_stale_fingerprints: false,
            verify_normalizer: false,
        }
    }
}

impl SyncSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where the bundled JSON-file store keeps collections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_root")]
    pub root: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            root: default_store_root(),
        }
    }
}

/// Identity used for authorization when the CLI runs a pass.
///
/// Without an `[actor]` table passes run as a player, which may only dry-run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorSettings {
    #[serde(default = "default_actor_name")]
    pub name: String,
    #[serde(default = "default_actor_role")]
    pub role: Role,
}

impl Default for ActorSettings {
    fn default() -> Self {
        Self {
            name: default_actor_name(),
            role: default_actor_role(),
        }
    }
}

impl ActorSettings {
    pub fn gamemaster(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: Role::Gamemaster,
        }
    }

    pub fn to_actor(&self) -> Actor {
        Actor::new(self.name.clone(), self.role)
    }
}

/// Parsed `compendium.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub actor: ActorSettings,
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
    /// Directory relative paths resolve against (not serialized)
    #[serde(skip)]
    base_dir: Option<NormalizedPath>,
}

impl SyncConfig {
    /// Default settings with the given modules.
    pub fn new(modules: Vec<ModuleConfig>) -> Self {
        Self {
            modules,
            ..Default::default()
        }
    }

    /// Parse TOML content. Relative paths resolve against the working directory.
    ///
    /// # Example
    ///
    /// ```
    /// use compendium_core::config::SyncConfig;
    ///
    /// let config = SyncConfig::parse(r#"
    /// [sync]
    /// timeout_secs = 5
    ///
    /// [[modules]]
    /// id = "spells"
    /// collection = "world.spells"
    /// sources = ["content/spells.json"]
    /// key = "system.spellId"
    /// "#).unwrap();
    ///
    /// assert_eq!(config.sync.timeout_secs, 5);
    /// assert_eq!(config.modules[0].label(), "spells");
    /// ```
    pub fn parse(content: &str) -> Result<Self> {
        let config: SyncConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; the format follows the extension.
    pub fn load(path: &NormalizedPath) -> Result<Self> {
        let mut config: SyncConfig = ConfigStore::new().load(path)?;
        config.validate()?;
        config.base_dir = path.parent();
        tracing::debug!(path = %path, modules = config.modules.len(), "Loaded sync configuration");
        Ok(config)
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<NormalizedPath>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Directory relative paths resolve against.
    pub fn base_dir(&self) -> NormalizedPath {
        self.base_dir
            .clone()
            .unwrap_or_else(|| NormalizedPath::new("."))
    }

    /// Resolve a configured path.
    pub fn resolve(&self, path: &str) -> NormalizedPath {
        NormalizedPath::new(path).resolve_against(&self.base_dir())
    }

    pub fn store_root(&self) -> NormalizedPath {
        self.resolve(&self.store.root)
    }

    pub fn module(&self, id: &str) -> Result<&ModuleConfig> {
        self.modules
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::ModuleNotFound(id.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.sync.timeout_secs == 0 {
            return Err(Error::config("sync.timeout_secs must be greater than zero"));
        }
        let mut seen_ids = std::collections::HashSet::new();
        let mut seen_collections = std::collections::HashSet::new();
        for module in &self.modules {
            module.validate()?;
            if !seen_ids.insert(module.id.as_str()) {
                return Err(Error::config(format!("duplicate module id '{}'", module.id)));
            }
            if !seen_collections.insert(module.collection.as_str()) {
                return Err(Error::config(format!(
                    "collection '{}' is used by more than one module",
                    module.collection
                )));
            }
        }
        Ok(())
    }
}
