//! Application paths for config, cache, and data.
//!
//! Roots follow XDG conventions via the `directories` crate, each
//! individually overridable with `VIBEUSAGE_CONFIG_DIR`, `VIBEUSAGE_DATA_DIR`
//! and `VIBEUSAGE_CACHE_DIR`.

use std::path::PathBuf;

use directories::ProjectDirs;

/// Environment override for the config directory.
pub const ENV_CONFIG_DIR: &str = "VIBEUSAGE_CONFIG_DIR";
/// Environment override for the data directory.
pub const ENV_DATA_DIR: &str = "VIBEUSAGE_DATA_DIR";
/// Environment override for the cache directory.
pub const ENV_CACHE_DIR: &str = "VIBEUSAGE_CACHE_DIR";

/// Application paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Configuration directory.
    pub config: PathBuf,
    /// Data directory (credentials live here).
    pub data: PathBuf,
    /// Cache directory (snapshots, model index).
    pub cache: PathBuf,
}

impl AppPaths {
    /// Resolve paths from env overrides, then XDG, then a home fallback.
    #[must_use]
    pub fn new() -> Self {
        let defaults = ProjectDirs::from("com", "vibeusage", "vibeusage").map_or_else(
            || {
                let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
                Self {
                    config: home.join(".config/vibeusage"),
                    data: home.join(".local/share/vibeusage"),
                    cache: home.join(".cache/vibeusage"),
                }
            },
            |dirs| Self {
                config: dirs.config_dir().to_path_buf(),
                data: dirs.data_dir().to_path_buf(),
                cache: dirs.cache_dir().to_path_buf(),
            },
        );

        Self {
            config: env_dir(ENV_CONFIG_DIR).unwrap_or(defaults.config),
            data: env_dir(ENV_DATA_DIR).unwrap_or(defaults.data),
            cache: env_dir(ENV_CACHE_DIR).unwrap_or(defaults.cache),
        }
    }

    /// Path to the config file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Directory holding per-provider credential files.
    #[must_use]
    pub fn credentials_dir(&self) -> PathBuf {
        self.data.join("credentials")
    }

    /// Directory holding cached usage snapshots.
    #[must_use]
    pub fn snapshots_dir(&self) -> PathBuf {
        self.cache.join("snapshots")
    }

    /// Cached organization id for a provider.
    #[must_use]
    pub fn org_id_file(&self, provider: &str) -> PathBuf {
        self.cache.join("org-ids").join(format!("{provider}.txt"))
    }

    /// Cached model index.
    #[must_use]
    pub fn models_index_file(&self) -> PathBuf {
        self.cache.join("models.json")
    }

    /// Cached cost-multiplier table.
    #[must_use]
    pub fn multipliers_file(&self) -> PathBuf {
        self.cache.join("multipliers.json")
    }

    /// Ensure all directories exist.
    ///
    /// # Errors
    /// Returns an error if any directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config)?;
        std::fs::create_dir_all(self.credentials_dir())?;
        std::fs::create_dir_all(self.snapshots_dir())?;
        std::fs::create_dir_all(self.cache.join("org-ids"))?;
        Ok(())
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn env_dir(var: &str) -> Option<PathBuf> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

/// Expand a leading `~/` against the process user's home directory.
///
/// Any other path is returned verbatim.
#[must_use]
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    #[allow(unsafe_code)]
    struct EnvGuard {
        key: &'static str,
        prior: Option<String>,
    }

    impl EnvGuard {
        #[allow(unsafe_code)]
        fn set(key: &'static str, value: &str) -> Self {
            let prior = std::env::var(key).ok();
            // SAFETY: Tests guard env mutation with a global mutex.
            unsafe { std::env::set_var(key, value) };
            Self { key, prior }
        }
    }

    impl Drop for EnvGuard {
        #[allow(unsafe_code)]
        fn drop(&mut self) {
            match &self.prior {
                // SAFETY: Tests guard env mutation with a global mutex.
                Some(value) => unsafe { std::env::set_var(self.key, value) },
                None => unsafe { std::env::remove_var(self.key) },
            }
        }
    }

    #[test]
    fn subpaths_are_rooted_in_expected_dirs() {
        let paths = AppPaths::new();

        assert!(paths.config_file().starts_with(&paths.config));
        assert!(paths.credentials_dir().starts_with(&paths.data));
        assert!(paths.snapshots_dir().starts_with(&paths.cache));
        assert!(paths.org_id_file("codex").ends_with("org-ids/codex.txt"));
        assert!(paths.models_index_file().ends_with("models.json"));
        assert!(paths.multipliers_file().ends_with("multipliers.json"));
    }

    #[test]
    fn env_overrides_take_precedence() {
        let _lock = env_lock().lock().expect("env lock poisoned");
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = dir.path().join("custom-data");

        let _guard = EnvGuard::set(ENV_DATA_DIR, data_dir.to_str().unwrap());
        let paths = AppPaths::new();

        assert_eq!(paths.data, data_dir);
        assert_eq!(paths.credentials_dir(), data_dir.join("credentials"));
    }

    #[test]
    fn blank_env_override_is_ignored() {
        let _lock = env_lock().lock().expect("env lock poisoned");
        let _guard = EnvGuard::set(ENV_CACHE_DIR, "  ");
        let paths = AppPaths::new();
        assert_ne!(paths.cache, PathBuf::from("  "));
    }

    #[test]
    fn expand_home_only_touches_tilde_slash() {
        let expanded = expand_home("~/.claude/.credentials.json");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with(".claude/.credentials.json"));

        assert_eq!(expand_home("/etc/creds.json"), PathBuf::from("/etc/creds.json"));
        assert_eq!(expand_home("relative/path"), PathBuf::from("relative/path"));
    }

    #[test]
    fn ensure_dirs_creates_tree() {
        let _lock = env_lock().lock().expect("env lock poisoned");
        let dir = tempfile::tempdir().expect("tempdir");

        let _g1 = EnvGuard::set(ENV_CONFIG_DIR, dir.path().join("cfg").to_str().unwrap());
        let _g2 = EnvGuard::set(ENV_DATA_DIR, dir.path().join("data").to_str().unwrap());
        let _g3 = EnvGuard::set(ENV_CACHE_DIR, dir.path().join("cache").to_str().unwrap());

        let paths = AppPaths::new();
        paths.ensure_dirs().expect("ensure dirs");

        assert!(paths.config.exists());
        assert!(paths.credentials_dir().exists());
        assert!(paths.snapshots_dir().exists());
        assert!(paths.cache.join("org-ids").exists());
    }
}
