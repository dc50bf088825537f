//! [`TestCompendium`] builder for file-backed sync scenarios.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;

/// Store root written into every generated config.
pub const STORE_ROOT: &str = "packs";

/// One `[[modules]]` entry of a generated config.
#[derive(Debug, Clone)]
pub struct TestModule {
    id: String,
    collection: String,
    sources: Vec<String>,
    key: Option<String>,
    extra: Vec<String>,
}

impl TestModule {
    pub fn new(id: &str, collection: &str, source: &str) -> Self {
        Self {
            id: id.to_string(),
            collection: collection.to_string(),
            sources: vec![source.to_string()],
            key: None,
            extra: Vec::new(),
        }
    }

    pub fn source(mut self, source: &str) -> Self {
        self.sources.push(source.to_string());
        self
    }

    pub fn key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    /// Raw `name = value` line appended to the module table.
    pub fn line(mut self, line: &str) -> Self {
        self.extra.push(line.to_string());
        self
    }

    fn to_toml(&self) -> String {
        let sources = self
            .sources
            .iter()
            .map(|s| format!("\"{s}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let mut out = format!(
            "[[modules]]\nid = \"{}\"\ncollection = \"{}\"\nsources = [{sources}]\n",
            self.id, self.collection
        );
        if let Some(key) = &self.key {
            out.push_str(&format!("key = \"{key}\"\n"));
        }
        for line in &self.extra {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// A temporary directory holding `compendium.toml`, content documents, and
/// the file store the CLI writes to.
///
/// # Example
///
/// ```rust
/// use compendium_test_utils::{TestCompendium, TestModule};
/// use serde_json::json;
///
/// let compendium = TestCompendium::new()
///     .with_module(TestModule::new("pets", "world.pets", "content/pets.json"));
/// compendium.write_json("content/pets.json", &json!([{ "name": "Wolf" }]));
/// compendium.write_config();
/// compendium.assert_file_exists("compendium.toml");
/// ```
pub struct TestCompendium {
    temp_dir: TempDir,
    settings: Vec<String>,
    actor: Option<(String, String)>,
    modules: Vec<TestModule>,
}

impl Default for TestCompendium {
    fn default() -> Self {
        Self::new()
    }
}

impl TestCompendium {
    /// Create an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new()
                .unwrap_or_else(|e| panic!("TestCompendium::new: failed to create temp dir: {e}")),
            settings: Vec::new(),
            actor: Some(("gm".to_string(), "gamemaster".to_string())),
            modules: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    pub fn config_path(&self) -> PathBuf {
        self.path("compendium.toml")
    }

    /// Raw `name = value` line for the `[sync]` table.
    pub fn with_setting(mut self, line: &str) -> Self {
        self.settings.push(line.to_string());
        self
    }

    /// Actor written to `[actor]`; a gamemaster named `gm` by default.
    pub fn with_actor(mut self, name: &str, role: &str) -> Self {
        self.actor = Some((name.to_string(), role.to_string()));
        self
    }

    /// Omit the `[actor]` table.
    pub fn without_actor(mut self) -> Self {
        self.actor = None;
        self
    }

    pub fn with_module(mut self, module: TestModule) -> Self {
        self.modules.push(module);
        self
    }

    /// Render and write `compendium.toml`, returning its path.
    pub fn write_config(&self) -> PathBuf {
        let mut config = String::from("[sync]\n");
        for line in &self.settings {
            config.push_str(line);
            config.push('\n');
        }
        config.push_str(&format!("\n[store]\nroot = \"{STORE_ROOT}\"\n"));
        if let Some((name, role)) = &self.actor {
            config.push_str(&format!("\n[actor]\nname = \"{name}\"\nrole = \"{role}\"\n"));
        }
        for module in &self.modules {
            config.push('\n');
            config.push_str(&module.to_toml());
        }
        self.write_file("compendium.toml", &config);
        self.config_path()
    }

    /// Write a file, creating parent directories.
    pub fn write_file(&self, relative: &str, content: &str) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap_or_else(|e| {
                panic!("TestCompendium::write_file: failed to create {}: {e}", parent.display())
            });
        }
        fs::write(&path, content).unwrap_or_else(|e| {
            panic!("TestCompendium::write_file: failed to write {}: {e}", path.display())
        });
    }

    pub fn write_json(&self, relative: &str, value: &Value) {
        let content = serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| panic!("TestCompendium::write_json: {e}"));
        self.write_file(relative, &content);
    }

    pub fn read_json(&self, relative: &str) -> Value {
        let path = self.path(relative);
        let content = fs::read_to_string(&path).unwrap_or_else(|e| {
            panic!("TestCompendium::read_json: failed to read {}: {e}", path.display())
        });
        serde_json::from_str(&content).unwrap_or_else(|e| {
            panic!("TestCompendium::read_json: invalid JSON in {}: {e}", path.display())
        })
    }

    /// Relative path of the file backing `collection`.
    pub fn collection_file(&self, collection: &str) -> String {
        format!("{STORE_ROOT}/{collection}.json")
    }

    /// Stored records of `collection`, as written by the file store.
    pub fn stored_records(&self, collection: &str) -> Vec<Value> {
        let file = self.read_json(&self.collection_file(collection));
        file.get("records")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    /// Assert that `relative` exists.
    ///
    /// # Panics
    /// Panics with a descriptive message if the path does not exist.
    pub fn assert_file_exists(&self, relative: &str) {
        let path = self.path(relative);
        assert!(path.exists(), "Expected file to exist: {}", path.display());
    }

    pub fn assert_file_missing(&self, relative: &str) {
        let path = self.path(relative);
        assert!(!path.exists(), "Expected file to be absent: {}", path.display());
    }
}
