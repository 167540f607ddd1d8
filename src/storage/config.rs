//! Configuration file loading and management.
//!
//! Loads `config.toml` from the config directory. Missing file means
//! defaults; a file that exists but fails to parse is an error.
//!
//! ## Environment Variables
//!
//! - `VIBEUSAGE_ENABLED_PROVIDERS`: comma list overriding `enabled_providers`
//! - `VIBEUSAGE_NO_COLOR` / `NO_COLOR`: disable colored output

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VibeusageError};

/// Environment variable overriding the enabled-provider list.
pub const ENV_ENABLED_PROVIDERS: &str = "VIBEUSAGE_ENABLED_PROVIDERS";
/// Environment variable to disable colors.
pub const ENV_NO_COLOR: &str = "VIBEUSAGE_NO_COLOR";
/// Standard environment variable to disable colors.
pub const ENV_NO_COLOR_STD: &str = "NO_COLOR";

// =============================================================================
// Config Sections
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fetch pipeline settings.
    pub fetch: FetchConfig,
    /// Display settings.
    pub display: DisplayConfig,
    /// Credential handling settings.
    pub credentials: CredentialsConfig,
    /// Providers to query; empty means all registered providers.
    pub enabled_providers: Vec<String>,
    /// Per-provider overrides.
    pub providers: BTreeMap<String, ProviderOverrides>,
    /// User-defined roles mapping a name to model id prefixes.
    pub roles: BTreeMap<String, RoleConfig>,
}

/// Fetch pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-strategy wall-clock timeout in seconds.
    pub timeout: u64,
    /// Bounded fan-out across providers.
    pub max_concurrent: usize,
    /// Cached snapshots older than this are not served when no strategy was
    /// attempted.
    pub stale_threshold_minutes: i64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            max_concurrent: 5,
            stale_threshold_minutes: 60,
        }
    }
}

impl FetchConfig {
    /// Timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Stale threshold as a [`chrono::Duration`].
    #[must_use]
    pub fn stale_threshold(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.stale_threshold_minutes)
    }
}

/// Display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Whether to use colors in output.
    pub color: bool,
    /// Whether to pretty-print JSON output.
    pub pretty: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            color: true,
            pretty: false,
        }
    }
}

/// Credential handling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Whether credential discovery may read sibling CLI credential files
    /// (e.g. the Codex CLI's auth.json).
    pub reuse_provider_credentials: bool,
    /// Whether to consult the OS keyring during discovery.
    pub use_keyring: bool,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            reuse_provider_credentials: true,
            use_keyring: false,
        }
    }
}

/// Per-provider overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOverrides {
    /// Force-enable or disable this provider.
    pub enabled: Option<bool>,
    /// Custom API base URL.
    pub api_base: Option<String>,
}

/// A role section: an ordered list of model id prefixes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleConfig {
    pub models: Vec<String>,
}

/// A named role resolved from config, immutable per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub name: String,
    pub models: Vec<String>,
}

// =============================================================================
// Loading
// =============================================================================

impl Config {
    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns error only if the file exists but is invalid.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "loading config file");
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| VibeusageError::Config(format!("invalid config file: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| VibeusageError::Config(format!("failed to serialize config: {e}")))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.timeout == 0 || self.fetch.timeout > 300 {
            return Err(VibeusageError::Config(
                "fetch.timeout must be between 1 and 300 seconds".to_string(),
            ));
        }
        if self.fetch.max_concurrent == 0 {
            return Err(VibeusageError::Config(
                "fetch.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.fetch.stale_threshold_minutes < 0 {
            return Err(VibeusageError::Config(
                "fetch.stale_threshold_minutes must not be negative".to_string(),
            ));
        }
        for (name, role) in &self.roles {
            if role.models.is_empty() {
                return Err(VibeusageError::Config(format!(
                    "role \"{name}\" must list at least one model"
                )));
            }
        }
        Ok(())
    }

    /// Providers enabled for this invocation.
    ///
    /// Precedence: `VIBEUSAGE_ENABLED_PROVIDERS`, then `enabled_providers`,
    /// then `registered` (all). A `[providers.<id>] enabled = false` override
    /// removes a provider from whichever list applies.
    #[must_use]
    pub fn resolve_enabled(&self, registered: &[String]) -> Vec<String> {
        let base: Vec<String> = std::env::var(ENV_ENABLED_PROVIDERS)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|| {
                if self.enabled_providers.is_empty() {
                    registered.to_vec()
                } else {
                    self.enabled_providers.clone()
                }
            });

        base.into_iter()
            .filter(|id| {
                self.providers
                    .get(id)
                    .and_then(|o| o.enabled)
                    .unwrap_or(true)
            })
            .collect()
    }

    /// Look up a role by name.
    #[must_use]
    pub fn role(&self, name: &str) -> Option<Role> {
        self.roles.get(name).map(|r| Role {
            name: name.to_string(),
            models: r.models.clone(),
        })
    }

    /// Whether color output is disabled by config or environment.
    #[must_use]
    pub fn no_color(&self) -> bool {
        if std::env::var(ENV_NO_COLOR).is_ok_and(|v| is_truthy(&v))
            || std::env::var(ENV_NO_COLOR_STD).is_ok()
        {
            return true;
        }
        !self.display.color
    }

    /// Custom API base for a provider, if configured.
    #[must_use]
    pub fn api_base(&self, provider: &str) -> Option<&str> {
        self.providers.get(provider)?.api_base.as_deref()
    }
}

fn is_truthy(v: &str) -> bool {
    matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
