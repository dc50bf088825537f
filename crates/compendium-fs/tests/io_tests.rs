use compendium_fs::io::{self, LockGuard};
use compendium_fs::NormalizedPath;
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_write_atomic_creates_parent_dirs() {
    let temp = TempDir::new().unwrap();
    let path = NormalizedPath::new(temp.path().join("packs/nested/world.spells.json"));

    io::write_text(&path, "[]").unwrap();

    assert_eq!(fs::read_to_string(path.to_native()).unwrap(), "[]");
}

#[test]
fn test_write_atomic_leaves_no_temp_files() {
    let temp = TempDir::new().unwrap();
    let path = NormalizedPath::new(temp.path().join("world.pets.json"));

    io::write_text(&path, "first").unwrap();
    io::write_text(&path, "second").unwrap();

    let names: Vec<String> = fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["world.pets.json".to_string()]);
    assert_eq!(io::read_text(&path).unwrap(), "second");
}

#[test]
fn test_read_missing_file_is_not_found() {
    let temp = TempDir::new().unwrap();
    let path = NormalizedPath::new(temp.path().join("missing.json"));

    let err = io::read_text(&path).unwrap_err();
    assert!(err.is_not_found(), "expected not-found, got {err}");
}

#[test]
fn test_lock_guard_creates_sidecar() {
    let temp = TempDir::new().unwrap();
    let path = NormalizedPath::new(temp.path().join("world.abilities.json"));

    let guard = LockGuard::acquire(&path).unwrap();
    assert!(guard.path().as_str().ends_with("world.abilities.json.lock"));
    assert!(guard.path().exists());
    drop(guard);

    // Re-acquiring after release must not block
    let _again = LockGuard::acquire(&path).unwrap();
}
