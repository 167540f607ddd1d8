//! Credential storage and discovery.
//!
//! vibeusage-owned credentials live under
//! `<data_dir>/credentials/<provider>/<kind>.json` with mode 0600. All writes
//! go through a temp file plus rename so a reader never observes a partial
//! file. Discovery also covers sibling CLI credential files and environment
//! variables, in that order of precedence.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::paths::expand_home;
use crate::error::Result;

// =============================================================================
// Kinds & Sources
// =============================================================================

/// The shape of a stored credential file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    OAuth,
    Session,
    ApiKey,
}

impl CredentialKind {
    /// All kinds in discovery order.
    pub const ALL: &'static [Self] = &[Self::OAuth, Self::Session, Self::ApiKey];

    /// File stem under the provider's credential directory.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::OAuth => "oauth.json",
            Self::Session => "session.json",
            Self::ApiKey => "apikey.json",
        }
    }
}

/// Where a credential was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// vibeusage's own credential store.
    Vibeusage,
    /// A sibling CLI's credential file.
    ProviderCli,
    /// An environment variable.
    Env,
}

impl CredentialSource {
    /// Tag used in human output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Vibeusage => "vibeusage",
            Self::ProviderCli => "provider_cli",
            Self::Env => "env",
        }
    }
}

/// Result of credential discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub source: CredentialSource,
    /// File path for file-backed sources, variable name for env.
    pub location: String,
    /// Credential kind for store hits.
    pub kind: Option<CredentialKind>,
}

// =============================================================================
// Store
// =============================================================================

/// Atomic reader/writer for credential files; the sole writer of the
/// vibeusage credential tree.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    credentials_dir: PathBuf,
}

impl CredentialStore {
    #[must_use]
    pub const fn new(credentials_dir: PathBuf) -> Self {
        Self { credentials_dir }
    }

    /// Path of a vibeusage-owned credential file.
    #[must_use]
    pub fn credential_path(&self, provider: &str, kind: CredentialKind) -> PathBuf {
        self.credentials_dir.join(provider).join(kind.file_name())
    }

    /// Read a credential file.
    ///
    /// A missing file is "no data", not an error; any other I/O failure
    /// surfaces.
    pub fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a credential file atomically.
    ///
    /// The parent directory is created with mode 0755, the payload goes to
    /// `<path>.tmp` with mode 0600, is fsynced, then renamed over `path`.
    pub fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(parent, fs::Permissions::from_mode(0o755))?;
            }
        }

        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Delete a credential file. Missing files are fine.
    pub fn delete(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Discover credentials for a provider.
    ///
    /// Precedence, highest first:
    /// 1. vibeusage-owned files, across kinds (oauth, session, apikey)
    /// 2. sibling CLI credential files (only when `reuse_cli` is set)
    /// 3. environment variables
    #[must_use]
    pub fn find(
        &self,
        provider: &str,
        cli_paths: &[String],
        env_vars: &[String],
        reuse_cli: bool,
    ) -> Option<Discovery> {
        for kind in CredentialKind::ALL {
            let path = self.credential_path(provider, *kind);
            if path.is_file() {
                return Some(Discovery {
                    source: CredentialSource::Vibeusage,
                    location: path.to_string_lossy().into_owned(),
                    kind: Some(*kind),
                });
            }
        }

        if reuse_cli {
            for candidate in cli_paths {
                let path = expand_home(candidate);
                if path.is_file() {
                    return Some(Discovery {
                        source: CredentialSource::ProviderCli,
                        location: path.to_string_lossy().into_owned(),
                        kind: None,
                    });
                }
            }
        }

        for var in env_vars {
            if std::env::var(var).is_ok_and(|v| !v.trim().is_empty()) {
                return Some(Discovery {
                    source: CredentialSource::Env,
                    location: var.clone(),
                    kind: None,
                });
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> CredentialStore {
        CredentialStore::new(dir.join("credentials"))
    }

    #[test]
    fn read_missing_file_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let path = store.credential_path("claude", CredentialKind::OAuth);
        assert_eq!(store.read(&path).unwrap(), None);
    }

    #[test]
    fn write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let path = store.credential_path("claude", CredentialKind::ApiKey);

        store.write(&path, br#"{"api_key":"sk-test"}"#).unwrap();
        let bytes = store.read(&path).unwrap().expect("data");
        assert_eq!(bytes, br#"{"api_key":"sk-test"}"#);
    }

    #[test]
    fn repeated_writes_converge_and_leave_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let path = store.credential_path("codex", CredentialKind::OAuth);

        store.write(&path, b"first").unwrap();
        store.write(&path, b"second").unwrap();
        assert_eq!(store.read(&path).unwrap().unwrap(), b"second");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn delete_then_read_returns_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let path = store.credential_path("kimi", CredentialKind::ApiKey);

        store.write(&path, b"key").unwrap();
        store.delete(&path).unwrap();
        assert_eq!(store.read(&path).unwrap(), None);
        // Deleting again is not an error.
        store.delete(&path).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn credential_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let path = store.credential_path("claude", CredentialKind::OAuth);
        store.write(&path, b"secret").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "expected 0600, got {mode:o}");
    }

    #[test]
    fn find_prefers_store_over_cli_over_env() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        // Env-only hit.
        let env_var = "VIBEUSAGE_TEST_FIND_KEY";
        let guard = EnvGuard::set(env_var, "sk-env");
        let found = store
            .find("claude", &[], &[env_var.to_string()], true)
            .expect("env discovery");
        assert_eq!(found.source, CredentialSource::Env);
        assert_eq!(found.location, env_var);

        // A CLI file outranks env.
        let cli_file = dir.path().join("external-auth.json");
        fs::write(&cli_file, b"{}").unwrap();
        let cli_paths = vec![cli_file.to_string_lossy().into_owned()];
        let found = store
            .find("claude", &cli_paths, &[env_var.to_string()], true)
            .expect("cli discovery");
        assert_eq!(found.source, CredentialSource::ProviderCli);

        // CLI reuse disabled falls through to env.
        let found = store
            .find("claude", &cli_paths, &[env_var.to_string()], false)
            .expect("env discovery with cli disabled");
        assert_eq!(found.source, CredentialSource::Env);

        // A store file outranks everything.
        let own = store.credential_path("claude", CredentialKind::Session);
        store.write(&own, b"{}").unwrap();
        let found = store
            .find("claude", &cli_paths, &[env_var.to_string()], true)
            .expect("store discovery");
        assert_eq!(found.source, CredentialSource::Vibeusage);
        assert_eq!(found.kind, Some(CredentialKind::Session));

        drop(guard);
    }

    #[test]
    fn find_checks_kinds_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store
            .write(store.credential_path("zai", CredentialKind::ApiKey).as_path(), b"{}")
            .unwrap();
        store
            .write(store.credential_path("zai", CredentialKind::OAuth).as_path(), b"{}")
            .unwrap();

        let found = store.find("zai", &[], &[], true).expect("discovery");
        assert_eq!(found.kind, Some(CredentialKind::OAuth));
    }

    #[test]
    fn find_empty_everywhere_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.find("warp", &[], &[], true).is_none());
    }

    #[allow(unsafe_code)]
    struct EnvGuard {
        key: &'static str,
    }

    impl EnvGuard {
        #[allow(unsafe_code)]
        fn set(key: &'static str, value: &str) -> Self {
            // SAFETY: The variable name is unique to this test.
            unsafe { std::env::set_var(key, value) };
            Self { key }
        }
    }

    impl Drop for EnvGuard {
        #[allow(unsafe_code)]
        fn drop(&mut self) {
            // SAFETY: The variable name is unique to this test.
            unsafe { std::env::remove_var(self.key) };
        }
    }
}
