//! Integration tests for the compendium CLI binary.
//!
//! These tests exercise the actual compiled binary using assert_cmd.

use assert_cmd::Command;
use compendium_test_utils::records::{effect, pet, spell};
use compendium_test_utils::{TestCompendium, TestModule};
use predicates::prelude::*;
use serde_json::{Value, json};

/// Get a Command for the compendium binary, colors off, rooted in `dir`
fn compendium_cmd(dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("compendium"));
    cmd.current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("COMPENDIUM_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn world() -> TestCompendium {
    let compendium = TestCompendium::new()
        .with_module(
            TestModule::new("spells", "world.spells", "content/spells.json")
                .key("system.spellId")
                .line("entries = \"/spells\"")
                .line("label = \"Spells\""),
        )
        .with_module(
            TestModule::new("pets", "world.pets", "content/pets.json").line("kind = \"actor\""),
        );
    compendium.write_json(
        "content/spells.json",
        &json!({"spells": [
            spell("shield", "Shield", 1).build(),
            spell("burning-hands", "Burning Hands", 1)
                .effect(effect("Burning", Some("xyz")))
                .build()
        ]}),
    );
    compendium.write_json(
        "content/pets.json",
        &json!([pet("Wolf", 11).build(), pet("Hawk", 5).build()]),
    );
    compendium.write_config();
    compendium
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_output() {
    let dir = tempfile::tempdir().unwrap();
    compendium_cmd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Compendium Sync"));
}

#[test]
fn test_version_output() {
    let dir = tempfile::tempdir().unwrap();
    compendium_cmd(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("compendium"));
}

#[test]
fn test_no_command_shows_help_hint() {
    let dir = tempfile::tempdir().unwrap();
    compendium_cmd(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("compendium --help"));
}

#[test]
fn test_missing_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    compendium_cmd(dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .env("HOME", dir.path())
        .arg("modules")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No compendium.toml found"));
}

// ============================================================================
// Command Tests
// ============================================================================

#[test]
fn test_modules_lists_configuration() {
    let world = world();
    compendium_cmd(world.root())
        .arg("modules")
        .assert()
        .success()
        .stdout(predicate::str::contains("spells -> world.spells (item)"))
        .stdout(predicate::str::contains("pets -> world.pets (actor)"))
        .stdout(predicate::str::contains("source: content/spells.json#/spells"));
}

#[test]
fn test_sync_is_idempotent() {
    let world = world();

    compendium_cmd(world.root())
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "OK spells (world.spells): 2 created, 0 updated, 0 unchanged",
        ))
        .stdout(predicate::str::contains("OK pets (world.pets): 2 created"));

    compendium_cmd(world.root())
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 created, 0 updated, 2 unchanged"));

    let spells = world.stored_records("world.spells");
    assert_eq!(spells.len(), 2);
    let effect_id = spells[1]["data"]["effects"][0]["_id"].as_str().unwrap();
    assert_eq!(effect_id.len(), 16);
}

#[test]
fn test_sync_single_module_from_subdirectory() {
    let world = world();
    compendium_cmd(&world.path("content"))
        .args(["sync", "--module", "pets"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pets (world.pets): 2 created"));

    world.assert_file_exists(&world.collection_file("world.pets"));
    world.assert_file_missing(&world.collection_file("world.spells"));
}

#[test]
fn test_sync_unknown_module_fails() {
    let world = world();
    compendium_cmd(world.root())
        .args(["sync", "--module", "macros"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Module not found: macros"));
}

#[test]
fn test_dry_run_writes_nothing() {
    let world = world();
    compendium_cmd(world.root())
        .args(["sync", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DRY-RUN spells (world.spells): 2 created"));

    world.assert_file_missing(&world.collection_file("world.spells"));
}

#[test]
fn test_sync_json_output() {
    let world = world();
    let output = compendium_cmd(world.root())
        .args(["sync", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: Value = serde_json::from_slice(&output.stdout).unwrap();
    let results = parsed["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["status"], "ok");
    assert_eq!(results[0]["report"]["created"], 2);
}

#[test]
fn test_unprivileged_actor_fails_without_writing() {
    let world = world().with_actor("alex", "player");
    world.write_config();

    compendium_cmd(world.root())
        .arg("sync")
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAILED spells: alex (player) is not permitted"))
        .stderr(predicate::str::contains("2 module(s) failed to sync"));

    world.assert_file_missing(&world.collection_file("world.spells"));
}

#[test]
fn test_config_without_actor_runs_as_player() {
    let world = world().without_actor();
    world.write_config();

    compendium_cmd(world.root())
        .arg("sync")
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAILED pets: player (player) is not permitted"));
    world.assert_file_missing(&world.collection_file("world.pets"));

    compendium_cmd(world.root())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("PENDING pets (world.pets): 2 create, 0 update"));
}

#[test]
fn test_check_reports_pending_then_ok() {
    let world = world();
    compendium_cmd(world.root())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("PENDING spells (world.spells): 2 create, 0 update"));

    compendium_cmd(world.root()).arg("sync").assert().success();

    compendium_cmd(world.root())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("OK spells (world.spells): 2 record(s) in sync"));
}

#[test]
fn test_plan_diff_shows_changed_fields() {
    let world = world();
    compendium_cmd(world.root()).arg("sync").assert().success();

    world.write_json(
        "content/pets.json",
        &json!([pet("Wolf", 13).build(), pet("Hawk", 5).build()]),
    );

    compendium_cmd(world.root())
        .args(["plan", "--module", "pets", "--diff"])
        .assert()
        .success()
        .stdout(predicate::str::contains("~ Wolf"))
        .stdout(predicate::str::contains("-    \"hp\": 11"))
        .stdout(predicate::str::contains("+    \"hp\": 13"))
        .stdout(predicate::str::contains("0 create, 1 update, 1 unchanged, 0 skipped"));
}

#[test]
fn test_plan_json_lists_buckets() {
    let world = world();
    let output = compendium_cmd(world.root())
        .args(["plan", "--module", "spells", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed["create"].as_array().unwrap().len(), 2);
    assert_eq!(parsed["create"][0]["key"], "shield");
    assert!(parsed["update"].as_array().unwrap().is_empty());
}

#[test]
fn test_normalize_prints_fixed_ids() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("record.json");
    let record = json!({"name": "Fireball", "effects": [{"_id": "xyz", "name": "Burning"}]});
    std::fs::write(&file, serde_json::to_string(&record).unwrap()).unwrap();

    let output = compendium_cmd(dir.path())
        .args(["normalize", "record.json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: Value = serde_json::from_slice(&output.stdout).unwrap();
    let id = parsed["effects"][0]["_id"].as_str().unwrap();
    assert_eq!(id.len(), 16);
    assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
}

// ============================================================================
// Fixture World
// ============================================================================

fn copy_dir(from: &std::path::Path, to: &std::path::Path) {
    std::fs::create_dir_all(to).unwrap();
    for entry in std::fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), target).unwrap();
        }
    }
}

#[test]
fn test_fixture_world_syncs_and_converges() {
    let fixture =
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../test-fixtures/world");
    let dir = tempfile::tempdir().unwrap();
    copy_dir(&fixture, dir.path());

    compendium_cmd(dir.path())
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("OK spells (world.spells): 3 created"))
        .stdout(predicate::str::contains("OK pets (world.pets): 3 created"))
        .stdout(predicate::str::contains(
            "OK abilities (world.abilities): 2 created, 0 updated, 0 unchanged, 1 skipped",
        ))
        .stdout(predicate::str::contains("1 record(s) without a business key were skipped"));

    // `sort` is ignored by the fingerprint
    let abilities = dir.path().join("content/abilities.json");
    let text = std::fs::read_to_string(&abilities)
        .unwrap()
        .replace("\"sort\": 200", "\"sort\": 300");
    std::fs::write(&abilities, text).unwrap();

    compendium_cmd(dir.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("OK spells (world.spells): 3 record(s) in sync"))
        .stdout(predicate::str::contains("OK abilities (world.abilities): 2 record(s) in sync"));
}
