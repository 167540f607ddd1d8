//! Binary smoke tests.

use assert_cmd::Command;
use predicates::prelude::*;

fn cmd_in(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("vibeusage").unwrap();
    cmd.env("VIBEUSAGE_CONFIG_DIR", dir.path().join("config"))
        .env("VIBEUSAGE_DATA_DIR", dir.path().join("data"))
        .env("VIBEUSAGE_CACHE_DIR", dir.path().join("cache"))
        .env_remove("VIBEUSAGE_ENABLED_PROVIDERS");
    cmd
}

#[test]
fn help_lists_commands() {
    Command::cargo_bin("vibeusage")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("usage"))
        .stdout(predicate::str::contains("recommend"))
        .stdout(predicate::str::contains("auth"));
}

#[test]
fn config_path_is_under_override_dir() {
    let dir = tempfile::tempdir().unwrap();
    cmd_in(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn unknown_provider_fails_with_general_error() {
    let dir = tempfile::tempdir().unwrap();
    cmd_in(&dir)
        .args(["usage", "--provider", "definitely-not-a-provider"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown provider"));
}

#[test]
fn cache_clear_succeeds_on_empty_cache() {
    let dir = tempfile::tempdir().unwrap();
    cmd_in(&dir)
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cleared"));
}

#[test]
fn auth_login_stores_api_key() {
    let dir = tempfile::tempdir().unwrap();
    cmd_in(&dir)
        .args(["auth", "login", "kimi", "--api-key", "sk-test"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stored API key"));

    let stored = dir.path().join("data/credentials/kimi/apikey.json");
    let content = std::fs::read_to_string(stored).unwrap();
    assert!(content.contains("sk-test"));
}
