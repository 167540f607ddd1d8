//! Model registry: canonical ids, aliases, and cost multipliers.
//!
//! The registry is immutable after load. It starts from a built-in table and
//! can be refreshed from a published JSON index; the fetched copy is cached
//! on disk with a TTL and used as a stale fallback when the network is down.
//!
//! Alias generation covers the dash/dot spelling split in version suffixes
//! (`claude-sonnet-4-5` vs `claude-sonnet-4.5`), so either form resolves.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::AppPaths;

/// How long a fetched model index stays fresh on disk.
pub const INDEX_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Published model index consumed by [`ModelRegistry::load`].
pub const MODEL_INDEX_URL: &str =
    "https://raw.githubusercontent.com/joshuadavidthomas/vibeusage/main/data/models.json";

// =============================================================================
// Model Info
// =============================================================================

/// One model the router can resolve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelInfo {
    /// Canonical id (lowercase).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Providers able to serve this model.
    pub providers: Vec<String>,
}

/// Wire format of the published index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelIndex {
    pub models: Vec<ModelIndexEntry>,
    /// `multipliers[provider][model_id]`; `0` marks a free model.
    #[serde(default)]
    pub multipliers: HashMap<String, HashMap<String, f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelIndexEntry {
    pub id: String,
    pub name: String,
    pub providers: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

// =============================================================================
// Registry
// =============================================================================

/// Immutable model lookup tables.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelInfo>,
    aliases: HashMap<String, String>,
    multipliers: HashMap<String, HashMap<String, f64>>,
}

impl ModelRegistry {
    /// Build from an index document.
    #[must_use]
    pub fn from_index(index: ModelIndex) -> Self {
        let mut models = BTreeMap::new();
        let mut aliases = HashMap::new();

        for entry in index.models {
            let id = normalize(&entry.id);
            for alias in entry.aliases.iter().map(|a| normalize(a)) {
                aliases.insert(alias, id.clone());
            }
            for alias in version_spelling_aliases(&id) {
                aliases.insert(alias, id.clone());
            }
            models.insert(
                id.clone(),
                ModelInfo {
                    id,
                    name: entry.name,
                    providers: entry.providers,
                },
            );
        }

        Self {
            models,
            aliases,
            multipliers: index.multipliers,
        }
    }

    /// Built-in table used when no index has ever been fetched.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_index(builtin_index())
    }

    /// Load the registry: fresh disk cache, then remote index, then stale
    /// disk cache, then the built-in table. Called at most once per process.
    pub async fn load(paths: &AppPaths, client: &reqwest::Client) -> Self {
        let cache_path = paths.models_index_file();

        if let Some(index) = read_index_if(&cache_path, true) {
            return Self::from_index(index);
        }

        match fetch_index(client).await {
            Ok(index) => {
                if let Err(e) = write_index(&cache_path, &index) {
                    tracing::warn!(error = %e, "failed to cache model index");
                }
                // The multiplier table is mirrored to its own file so it can
                // be inspected and cleared independently of the model list.
                if let Err(e) = write_multipliers(&paths.multipliers_file(), &index.multipliers) {
                    tracing::warn!(error = %e, "failed to cache multiplier table");
                }
                Self::from_index(index)
            }
            Err(e) => {
                tracing::warn!(error = %e, "model index fetch failed, falling back");
                read_index_if(&cache_path, false).map_or_else(Self::builtin, Self::from_index)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    /// Resolve a query to a model: exact canonical id, then alias.
    #[must_use]
    pub fn lookup(&self, query: &str) -> Option<&ModelInfo> {
        let normalized = normalize(query);
        self.models
            .get(&normalized)
            .or_else(|| self.aliases.get(&normalized).and_then(|id| self.models.get(id)))
    }

    /// Models whose canonical id starts with the query, shortest id first,
    /// then lexicographic. Used to expand undated ids to dated variants.
    #[must_use]
    pub fn match_prefix(&self, query: &str) -> Vec<&ModelInfo> {
        let normalized = normalize(query);
        let mut matches: Vec<&ModelInfo> = self
            .models
            .values()
            .filter(|m| m.id.starts_with(&normalized))
            .collect();
        matches.sort_by(|a, b| a.id.len().cmp(&b.id.len()).then_with(|| a.id.cmp(&b.id)));
        matches
    }

    /// Substring search over ids, names, and aliases.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&ModelInfo> {
        let normalized = normalize(query);
        if normalized.is_empty() {
            return self.list_models();
        }
        self.models
            .values()
            .filter(|m| {
                m.id.contains(&normalized)
                    || m.name.to_lowercase().contains(&normalized)
                    || self
                        .aliases
                        .iter()
                        .any(|(alias, id)| id == &m.id && alias.contains(&normalized))
            })
            .collect()
    }

    /// Providers able to serve a model.
    #[must_use]
    pub fn providers_for_model(&self, query: &str) -> Vec<String> {
        self.lookup(query)
            .map(|m| m.providers.clone())
            .unwrap_or_default()
    }

    /// All models, ordered by id.
    #[must_use]
    pub fn list_models(&self) -> Vec<&ModelInfo> {
        self.models.values().collect()
    }

    /// Models a given provider serves.
    #[must_use]
    pub fn list_models_for_provider(&self, provider_id: &str) -> Vec<&ModelInfo> {
        self.models
            .values()
            .filter(|m| m.providers.iter().any(|p| p == provider_id))
            .collect()
    }

    /// Cost multiplier for a (provider, model) pair.
    ///
    /// `Some(0.0)` means the model is free on that provider; `None` means the
    /// provider does not weight requests, or the model is unknown.
    #[must_use]
    pub fn lookup_multiplier(&self, provider_id: &str, model_query: &str) -> Option<f64> {
        let model = self.lookup(model_query)?;
        self.multipliers.get(provider_id)?.get(&model.id).copied()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn normalize(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Generate the dash/dot rewrite of a version suffix.
///
/// `sonnet-4-5` gains alias `sonnet-4.5`; `gemini-2.5-pro` gains
/// `gemini-2-5-pro`. Only separators between two digits are rewritten.
fn version_spelling_aliases(id: &str) -> Vec<String> {
    let mut aliases = Vec::new();
    for (from, to) in [('-', '.'), ('.', '-')] {
        let chars: Vec<char> = id.chars().collect();
        let mut rewritten = String::with_capacity(id.len());
        let mut changed = false;
        for (i, &c) in chars.iter().enumerate() {
            let between_digits = i > 0
                && i + 1 < chars.len()
                && chars[i - 1].is_ascii_digit()
                && chars[i + 1].is_ascii_digit();
            if c == from && between_digits {
                rewritten.push(to);
                changed = true;
            } else {
                rewritten.push(c);
            }
        }
        if changed && rewritten != id {
            aliases.push(rewritten);
        }
    }
    aliases
}

fn read_index_if(path: &Path, require_fresh: bool) -> Option<ModelIndex> {
    let metadata = fs::metadata(path).ok()?;
    if require_fresh {
        let age = SystemTime::now()
            .duration_since(metadata.modified().ok()?)
            .ok()?;
        if age >= INDEX_TTL {
            return None;
        }
    }
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

fn write_index(path: &Path, index: &ModelIndex) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_string_pretty(index)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn write_multipliers(path: &Path, table: &HashMap<String, HashMap<String, f64>>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_string_pretty(table)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

async fn fetch_index(client: &reqwest::Client) -> Result<ModelIndex> {
    crate::core::http::fetch_json("models", client, MODEL_INDEX_URL).await
}

/// The shipped model table.
fn builtin_index() -> ModelIndex {
    let model = |id: &str, name: &str, providers: &[&str]| ModelIndexEntry {
        id: id.to_string(),
        name: name.to_string(),
        providers: providers.iter().map(ToString::to_string).collect(),
        aliases: Vec::new(),
    };

    let models = vec![
        model("claude-opus-4-1", "Claude Opus 4.1", &["claude", "openrouter"]),
        model(
            "claude-sonnet-4-5",
            "Claude Sonnet 4.5",
            &["claude", "copilot", "openrouter"],
        ),
        model("claude-haiku-4-5", "Claude Haiku 4.5", &["claude", "openrouter"]),
        model("gpt-5", "GPT-5", &["codex", "copilot", "openrouter", "warp"]),
        model("gpt-5-codex", "GPT-5 Codex", &["codex"]),
        model("gpt-5-mini", "GPT-5 mini", &["codex", "copilot", "openrouter"]),
        model("o3", "OpenAI o3", &["codex", "openrouter"]),
        model(
            "gemini-2.5-pro",
            "Gemini 2.5 Pro",
            &["gemini", "antigravity", "copilot", "openrouter"],
        ),
        model(
            "gemini-2.5-flash",
            "Gemini 2.5 Flash",
            &["gemini", "antigravity", "openrouter"],
        ),
        model("kimi-k2", "Kimi K2", &["kimi", "openrouter"]),
        model("minimax-m2", "MiniMax M2", &["minimax", "openrouter"]),
        model("glm-4.6", "GLM 4.6", &["zai", "openrouter"]),
    ];

    // Copilot weights premium requests per model; 0 marks included models.
    let copilot_multipliers: HashMap<String, f64> = [
        ("gpt-5".to_string(), 1.0),
        ("gpt-5-mini".to_string(), 0.0),
        ("claude-sonnet-4-5".to_string(), 1.0),
        ("claude-opus-4-1".to_string(), 10.0),
        ("gemini-2.5-pro".to_string(), 1.0),
        ("o3".to_string(), 1.0),
    ]
    .into_iter()
    .collect();

    let mut multipliers = HashMap::new();
    multipliers.insert("copilot".to_string(), copilot_multipliers);

    ModelIndex { models, multipliers }
}
