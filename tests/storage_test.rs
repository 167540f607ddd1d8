//! Credential store and snapshot cache integration tests.

use chrono::Utc;

use vibeusage::core::models::{PeriodType, UsagePeriod, UsageSnapshot};
use vibeusage::storage::{CredentialKind, CredentialSource, CredentialStore, SnapshotCache};

fn snapshot(provider: &str, utilization: i64) -> UsageSnapshot {
    let mut snapshot = UsageSnapshot::new(
        provider,
        Utc::now(),
        vec![UsagePeriod::new("weekly", PeriodType::Weekly, utilization)],
    );
    snapshot.source = "oauth".to_string();
    snapshot
}

// =============================================================================
// Credential store
// =============================================================================

#[test]
fn credential_lifecycle_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("credentials"));
    let path = store.credential_path("claude", CredentialKind::OAuth);

    // Missing file is "no data".
    assert_eq!(store.read(&path).unwrap(), None);

    // Write → read round-trips exactly.
    let payload = br#"{"access_token":"tok","refresh_token":"ref"}"#;
    store.write(&path, payload).unwrap();
    assert_eq!(store.read(&path).unwrap().unwrap(), payload);

    // Repeated writes converge on the last payload.
    store.write(&path, b"v2").unwrap();
    store.write(&path, b"v3").unwrap();
    assert_eq!(store.read(&path).unwrap().unwrap(), b"v3");

    // Delete then read returns "no data"; deleting again is fine.
    store.delete(&path).unwrap();
    assert_eq!(store.read(&path).unwrap(), None);
    store.delete(&path).unwrap();
}

#[test]
fn writes_never_leave_partial_files_behind() {
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("credentials"));
    let path = store.credential_path("codex", CredentialKind::OAuth);

    for i in 0..50 {
        let payload = format!("{{\"access_token\":\"tok-{i}\"}}");
        store.write(&path, payload.as_bytes()).unwrap();

        // After every write the file parses fully and no temp file remains;
        // a reader can never observe a half-written credential.
        let bytes = store.read(&path).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("complete JSON");
        assert_eq!(value["access_token"], format!("tok-{i}"));
        assert!(!path.with_extension("tmp").exists());
    }
}

#[test]
fn discovery_precedence_store_cli_env() {
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("credentials"));

    let cli_file = dir.path().join("provider-auth.json");
    std::fs::write(&cli_file, b"{}").unwrap();
    let cli_paths = vec![cli_file.to_string_lossy().into_owned()];

    // CLI file beats env (env unset anyway); store beats CLI.
    let found = store
        .find("codex", &cli_paths, &["VIBEUSAGE_STORAGE_TEST_UNSET".to_string()], true)
        .expect("cli hit");
    assert_eq!(found.source, CredentialSource::ProviderCli);

    store
        .write(&store.credential_path("codex", CredentialKind::OAuth), b"{}")
        .unwrap();
    let found = store
        .find("codex", &cli_paths, &[], true)
        .expect("store hit");
    assert_eq!(found.source, CredentialSource::Vibeusage);
    assert_eq!(found.kind, Some(CredentialKind::OAuth));

    // Disabling CLI reuse hides the CLI file.
    let store2 = CredentialStore::new(dir.path().join("other"));
    assert!(store2.find("codex", &cli_paths, &[], false).is_none());
}

// =============================================================================
// Snapshot cache
// =============================================================================

#[test]
fn cache_load_returns_most_recent_save() {
    let dir = tempfile::tempdir().unwrap();
    let cache = SnapshotCache::new(dir.path().join("snapshots"));

    for utilization in [10, 55, 90] {
        let current = snapshot("claude", utilization);
        cache.save(&current).unwrap();
        let loaded = cache.load("claude").expect("snapshot");
        assert_eq!(loaded, current, "load must reflect the latest save");
    }
}

#[test]
fn cache_save_load_preserves_logical_content() {
    let dir = tempfile::tempdir().unwrap();
    let cache = SnapshotCache::new(dir.path().join("snapshots"));

    let original = snapshot("copilot", 64);
    cache.save(&original).unwrap();
    let loaded = cache.load("copilot").unwrap();

    // Save → load → save yields identical logical content.
    cache.save(&loaded).unwrap();
    let reloaded = cache.load("copilot").unwrap();
    assert_eq!(reloaded, original);
}

#[test]
fn cache_clear_scopes() {
    let dir = tempfile::tempdir().unwrap();
    let cache = SnapshotCache::new(dir.path().join("snapshots"));

    cache.save(&snapshot("claude", 1)).unwrap();
    cache.save(&snapshot("codex", 2)).unwrap();
    cache.save(&snapshot("warp", 3)).unwrap();

    cache.clear("codex").unwrap();
    assert!(cache.load("codex").is_none());
    assert!(cache.load("claude").is_some());

    cache.clear_all().unwrap();
    assert!(cache.load("claude").is_none());
    assert!(cache.load("warp").is_none());
}

#[test]
fn cache_tolerates_junk_files() {
    let dir = tempfile::tempdir().unwrap();
    let cache = SnapshotCache::new(dir.path().join("snapshots"));
    std::fs::create_dir_all(dir.path().join("snapshots")).unwrap();

    std::fs::write(cache.snapshot_path("empty"), "").unwrap();
    std::fs::write(cache.snapshot_path("garbage"), "{{{").unwrap();
    std::fs::write(
        cache.snapshot_path("wrong-shape"),
        r#"{"some":"other","json":"document"}"#,
    )
    .unwrap();

    assert!(cache.load("empty").is_none());
    assert!(cache.load("garbage").is_none());
    assert!(cache.load("wrong-shape").is_none());
    assert!(cache.load("missing").is_none());
}
