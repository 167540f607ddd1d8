//! Snapshot cache.
//!
//! One JSON file per provider under `<cache_dir>/snapshots/`. Writes share
//! the credential store's temp-plus-rename discipline. Loads are tolerant:
//! a missing, empty, or malformed file is simply "no snapshot". Freshness is
//! the caller's decision; the cache only stores and returns.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::core::models::UsageSnapshot;
use crate::error::Result;

/// Per-provider snapshot persistence.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    snapshots_dir: PathBuf,
}

impl SnapshotCache {
    #[must_use]
    pub const fn new(snapshots_dir: PathBuf) -> Self {
        Self { snapshots_dir }
    }

    /// File backing a provider's cached snapshot.
    #[must_use]
    pub fn snapshot_path(&self, provider: &str) -> PathBuf {
        self.snapshots_dir.join(format!("{provider}.json"))
    }

    /// Persist a snapshot atomically.
    pub fn save(&self, snapshot: &UsageSnapshot) -> Result<()> {
        fs::create_dir_all(&self.snapshots_dir)?;
        let path = self.snapshot_path(&snapshot.provider);
        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(serde_json::to_string_pretty(snapshot)?.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Load a provider's cached snapshot.
    ///
    /// Never raises: missing, empty, or malformed files all return `None`.
    #[must_use]
    pub fn load(&self, provider: &str) -> Option<UsageSnapshot> {
        let path = self.snapshot_path(provider);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(provider, error = %e, "discarding malformed snapshot cache");
                None
            }
        }
    }

    /// Remove one provider's cached snapshot.
    pub fn clear(&self, provider: &str) -> Result<()> {
        match fs::remove_file(self.snapshot_path(provider)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every cached snapshot.
    pub fn clear_all(&self) -> Result<()> {
        if !self.snapshots_dir.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.snapshots_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}
