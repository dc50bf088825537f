//! Configuration discovery
//!
//! Finds `compendium.toml` from any directory inside a world, the way git
//! finds `.git`: an explicit path wins, then the nearest ancestor holding
//! the file, then the per-user config directory.

use std::path::{Path, PathBuf};

use compendium_core::config::{CONFIG_FILE_NAME, SyncConfig};
use compendium_fs::NormalizedPath;

use crate::error::{CliError, Result};

/// Locate the configuration file.
pub fn find_config(explicit: Option<&Path>, cwd: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            cwd.join(path)
        };
        if !path.is_file() {
            return Err(CliError::user(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        return Ok(path);
    }

    if let Some(found) = cwd
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
    {
        return Ok(found);
    }

    if let Some(global) = user_config_path()
        && global.is_file()
    {
        tracing::debug!(path = %global.display(), "Using per-user configuration");
        return Ok(global);
    }

    Err(CliError::user(format!(
        "No {CONFIG_FILE_NAME} found in {} or any parent directory",
        cwd.display()
    )))
}

/// `<config_dir>/compendium/compendium.toml`
fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("compendium").join(CONFIG_FILE_NAME))
}

/// Find and load the configuration.
pub fn load_config(explicit: Option<&Path>) -> Result<SyncConfig> {
    let cwd = std::env::current_dir()?;
    let path = find_config(explicit, &cwd)?;
    tracing::debug!(path = %path.display(), "Loading configuration");
    Ok(SyncConfig::load(&NormalizedPath::new(&path))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn finds_config_in_ancestor() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "").unwrap();
        let nested = dir.path().join("content/spells");
        fs::create_dir_all(&nested).unwrap();

        let found = find_config(None, &nested).unwrap();
        assert_eq!(found, dir.path().join(CONFIG_FILE_NAME));
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempdir().unwrap();
        let err = find_config(Some(Path::new("missing.toml")), dir.path()).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn explicit_relative_path_resolves_against_cwd() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("alt.toml"), "").unwrap();
        let found = find_config(Some(Path::new("alt.toml")), dir.path()).unwrap();
        assert_eq!(found, dir.path().join("alt.toml"));
    }
}
