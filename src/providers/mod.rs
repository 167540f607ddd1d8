//! Provider implementations.
//!
//! One module per provider, each contributing metadata, credential sources,
//! ordered fetch strategies, and (where available) a status probe and auth
//! flow. `builtin_registry` wires them all into the engine.

pub mod antigravity;
pub mod claude;
pub mod codex;
pub mod copilot;
pub mod cursor;
pub mod gemini;
pub mod kimi;
pub mod minimax;
pub mod openrouter;
pub mod warp;
pub mod zai;

use std::sync::Arc;

use serde::Deserialize;

use crate::auth::OAuthCredentials;
use crate::core::provider::ProviderRegistry;
use crate::core::strategy::FetchContext;
use crate::storage::CredentialKind;

/// Registry of every shipped provider.
#[must_use]
pub fn builtin_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(antigravity::AntigravityProvider::new()));
    registry.register(Arc::new(claude::ClaudeProvider::new()));
    registry.register(Arc::new(codex::CodexProvider::new()));
    registry.register(Arc::new(copilot::CopilotProvider::new()));
    registry.register(Arc::new(cursor::CursorProvider::new()));
    registry.register(Arc::new(gemini::GeminiProvider::new()));
    registry.register(Arc::new(kimi::KimiProvider::new()));
    registry.register(Arc::new(minimax::MinimaxProvider::new()));
    registry.register(Arc::new(openrouter::OpenRouterProvider::new()));
    registry.register(Arc::new(warp::WarpProvider::new()));
    registry.register(Arc::new(zai::ZaiProvider::new()));
    registry
}

// =============================================================================
// Shared credential helpers
// =============================================================================

#[derive(Debug, Deserialize)]
struct StoredApiKey {
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct StoredSession {
    #[serde(default)]
    session_key: Option<String>,
    #[serde(default)]
    session_token: Option<String>,
}

/// API key for a provider: the vibeusage store first, then env vars.
#[must_use]
pub(crate) fn api_key_from(ctx: &FetchContext, provider_id: &str, env_vars: &[&str]) -> Option<String> {
    let path = ctx.creds.credential_path(provider_id, CredentialKind::ApiKey);
    if let Ok(Some(bytes)) = ctx.creds.read(&path) {
        if let Ok(stored) = serde_json::from_slice::<StoredApiKey>(&bytes) {
            if !stored.api_key.is_empty() {
                return Some(stored.api_key);
            }
        }
    }
    env_vars
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
}

/// Session token for a provider from the vibeusage store.
#[must_use]
pub(crate) fn session_token_from(ctx: &FetchContext, provider_id: &str) -> Option<String> {
    let path = ctx.creds.credential_path(provider_id, CredentialKind::Session);
    let bytes = ctx.creds.read(&path).ok()??;
    let stored: StoredSession = serde_json::from_slice(&bytes).ok()?;
    stored
        .session_token
        .or(stored.session_key)
        .filter(|t| !t.is_empty())
}

/// OAuth credentials owned by the vibeusage store, with the OS keyring as a
/// read-only secondary source when `credentials.use_keyring` is set.
#[must_use]
pub(crate) fn stored_oauth(ctx: &FetchContext, provider_id: &str) -> Option<OAuthCredentials> {
    let path = ctx.creds.credential_path(provider_id, CredentialKind::OAuth);
    if let Ok(Some(bytes)) = ctx.creds.read(&path) {
        if let Ok(creds) = OAuthCredentials::from_json_bytes(&bytes) {
            return Some(creds);
        }
    }
    keyring_oauth(ctx, provider_id)
}

fn keyring_oauth(ctx: &FetchContext, provider_id: &str) -> Option<OAuthCredentials> {
    if !ctx.config.credentials.use_keyring {
        return None;
    }
    let entry = keyring::Entry::new("vibeusage", &format!("{provider_id}-oauth")).ok()?;
    let secret = entry.get_password().ok()?;
    OAuthCredentials::from_json_bytes(secret.as_bytes()).ok()
}

/// Persist refreshed OAuth credentials back to the store.
pub(crate) fn persist_oauth(ctx: &FetchContext, provider_id: &str, creds: &OAuthCredentials) {
    let path = ctx.creds.credential_path(provider_id, CredentialKind::OAuth);
    match creds.to_json_bytes() {
        Ok(bytes) => {
            if let Err(e) = ctx.creds.write(&path, &bytes) {
                tracing::warn!(provider = provider_id, error = %e, "failed to persist refreshed tokens");
            }
        }
        Err(e) => {
            tracing::warn!(provider = provider_id, error = %e, "failed to serialize refreshed tokens")
        }
    }
}
