//! Codex (OpenAI) provider.
//!
//! Codex tokens are owned by the Codex CLI and live in `~/.codex/auth.json`.
//! The `oauth` strategy reuses them, refreshing first over HTTP and then,
//! when the token endpoint is unavailable, by shelling out to the CLI and
//! watching `auth.json` for the freshly written token.
//!
//! The rate-limit payload has grown alternate field names over time
//! (`resets_in_seconds` vs the older `reset_after_seconds`); both are
//! decoded.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;

use crate::auth::OAuthCredentials;
use crate::auth::refresh::{CLI_REFRESH_TIMEOUT, refresh_access_token, refresh_via_cli};
use crate::core::models::{PeriodType, ProviderIdentity, UsagePeriod, UsageSnapshot, clamp_utilization};
use crate::core::provider::{AuthFlow, CredentialSources, Provider, ProviderMeta};
use crate::core::status::{StatusProbe, StatuspageProbe};
use crate::core::strategy::{FetchContext, FetchResult, FetchStrategy};
use crate::error::{ErrorKind, VibeusageError};
use crate::storage::paths::expand_home;

const PROVIDER_ID: &str = "codex";
const USAGE_URL: &str = "https://chatgpt.com/backend-api/wham/usage";
const TOKEN_URL: &str = "https://auth.openai.com/oauth/token";
const OAUTH_CLIENT_ID: &str = "app_EMoamEEZ73f0CkXaXp7hrann";
const STATUS_URL: &str = "https://status.openai.com/api/v2/status.json";
const CLI_AUTH_PATH: &str = "~/.codex/auth.json";

/// A rolling window at or under five hours renders as a session period.
const SESSION_WINDOW_MAX_MINUTES: i64 = 5 * 60;

// =============================================================================
// Provider
// =============================================================================

pub struct CodexProvider {
    meta: ProviderMeta,
}

impl CodexProvider {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            meta: ProviderMeta {
                id: PROVIDER_ID,
                name: "Codex",
                description: "OpenAI Codex subscription usage",
                homepage: "https://chatgpt.com/codex",
                status_url: Some("https://status.openai.com"),
                dashboard_url: Some("https://chatgpt.com/codex/settings/usage"),
                record_unavailable: true,
            },
        }
    }
}

impl Default for CodexProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for CodexProvider {
    fn meta(&self) -> &ProviderMeta {
        &self.meta
    }

    fn credential_sources(&self) -> CredentialSources {
        CredentialSources {
            cli_paths: vec![CLI_AUTH_PATH.to_string()],
            env_vars: vec![],
        }
    }

    fn strategies(&self) -> Vec<Arc<dyn FetchStrategy>> {
        vec![Arc::new(CodexOAuthStrategy)]
    }

    fn status_probe(&self) -> Option<Box<dyn StatusProbe>> {
        Some(Box::new(StatuspageProbe::new(STATUS_URL)))
    }

    fn auth(&self) -> Option<AuthFlow> {
        Some(AuthFlow::Custom {
            instructions: "Sign in with the Codex CLI (`codex login`); vibeusage reuses its tokens.",
        })
    }
}

// =============================================================================
// CLI credential file
// =============================================================================

#[derive(Debug, Deserialize)]
struct CliAuthFile {
    #[serde(default)]
    tokens: Option<CliTokens>,
}

#[derive(Debug, Deserialize)]
struct CliTokens {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    expires_at: Option<serde_json::Value>,
}

struct CliAuth {
    credentials: OAuthCredentials,
    account_id: Option<String>,
}

fn cli_auth_path() -> PathBuf {
    expand_home(CLI_AUTH_PATH)
}

fn read_cli_auth(ctx: &FetchContext) -> Option<CliAuth> {
    if !ctx.reuse_cli_credentials() {
        return None;
    }
    let bytes = std::fs::read(cli_auth_path()).ok()?;
    let file: CliAuthFile = serde_json::from_slice(&bytes).ok()?;
    let tokens = file.tokens?;

    // Re-use the shared parser for the expiry so legacy numeric stamps are
    // migrated the same way everywhere.
    let mut normalized = serde_json::Map::new();
    normalized.insert("access_token".to_string(), tokens.access_token.clone().into());
    if let Some(refresh) = &tokens.refresh_token {
        normalized.insert("refresh_token".to_string(), refresh.clone().into());
    }
    if let Some(expires) = &tokens.expires_at {
        normalized.insert("expires_at".to_string(), expires.clone());
    }
    let credentials =
        OAuthCredentials::from_json_bytes(&serde_json::to_vec(&normalized).ok()?).ok()?;

    Some(CliAuth {
        credentials,
        account_id: tokens.account_id,
    })
}

/// Account id: the CLI auth file first, then the cached copy on disk.
fn resolve_account_id(ctx: &FetchContext, auth: &CliAuth) -> Option<String> {
    if let Some(id) = &auth.account_id {
        let cache_path = ctx.paths.org_id_file(PROVIDER_ID);
        if let Some(parent) = cache_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(cache_path, id);
        return Some(id.clone());
    }
    std::fs::read_to_string(ctx.paths.org_id_file(PROVIDER_ID))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// =============================================================================
// Usage response
// =============================================================================

#[derive(Debug, Deserialize)]
struct UsageResponse {
    #[serde(default)]
    rate_limits: Option<RateLimits>,
    #[serde(default)]
    plan_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RateLimits {
    #[serde(default)]
    primary: Option<RateWindow>,
    #[serde(default)]
    secondary: Option<RateWindow>,
}

/// One rate window. `resets_in_seconds` is the current field name;
/// `reset_after_seconds` is the legacy spelling still emitted by some
/// backends.
#[derive(Debug, Deserialize)]
struct RateWindow {
    used_percent: f64,
    #[serde(default)]
    window_minutes: Option<i64>,
    #[serde(default)]
    resets_in_seconds: Option<i64>,
    #[serde(default)]
    reset_after_seconds: Option<i64>,
}

impl RateWindow {
    fn resets_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.resets_in_seconds
            .or(self.reset_after_seconds)
            .map(|secs| now + ChronoDuration::seconds(secs))
    }

    fn period_type(&self) -> PeriodType {
        match self.window_minutes {
            Some(minutes) if minutes <= SESSION_WINDOW_MAX_MINUTES => PeriodType::Session,
            _ => PeriodType::Weekly,
        }
    }
}

fn parse_usage(response: UsageResponse, now: DateTime<Utc>) -> UsageSnapshot {
    let mut periods = Vec::new();

    if let Some(limits) = &response.rate_limits {
        let mut push = |window: &RateWindow, fallback_name: &str| {
            let period_type = window.period_type();
            let name = match period_type {
                PeriodType::Session => "session",
                _ => fallback_name,
            };
            let mut period = UsagePeriod::new(
                name,
                period_type,
                clamp_utilization(window.used_percent.round() as i64).into(),
            );
            period.resets_at = window.resets_at(now);
            periods.push(period);
        };

        if let Some(primary) = &limits.primary {
            push(primary, "weekly");
        }
        if let Some(secondary) = &limits.secondary {
            push(secondary, "weekly");
        }
    }

    let mut snapshot = UsageSnapshot::new(PROVIDER_ID, now, periods);
    if let Some(plan) = response.plan_type {
        snapshot = snapshot.with_identity(ProviderIdentity::plan(plan));
    }
    snapshot
}

async fn fetch_usage(
    ctx: &FetchContext,
    token: &str,
    account_id: Option<&str>,
) -> Result<UsageSnapshot, VibeusageError> {
    let url = ctx
        .config
        .api_base(PROVIDER_ID)
        .map_or_else(|| USAGE_URL.to_string(), |base| format!("{base}/backend-api/wham/usage"));

    let mut request = ctx
        .http
        .get(url)
        .header("Authorization", format!("Bearer {token}"));
    if let Some(id) = account_id {
        request = request.header("chatgpt-account-id", id);
    }

    let response: UsageResponse = crate::core::http::send_json(PROVIDER_ID, request).await?;
    Ok(parse_usage(response, ctx.clock.now()))
}

// =============================================================================
// OAuth strategy (CLI-owned tokens)
// =============================================================================

struct CodexOAuthStrategy;

impl CodexOAuthStrategy {
    /// Refresh the CLI's tokens: HTTP first, CLI shell-out as the fallback.
    async fn refresh(ctx: &FetchContext, creds: &OAuthCredentials) -> Option<OAuthCredentials> {
        if let Some(refreshed) =
            refresh_access_token(&ctx.http, TOKEN_URL, OAUTH_CLIENT_ID, creds, &[], ctx.clock.as_ref())
                .await
        {
            return Some(refreshed);
        }

        if which::which("codex").is_err() {
            tracing::debug!("HTTP refresh failed and no codex CLI on PATH");
            return None;
        }
        tracing::debug!("HTTP refresh failed, shelling out to the codex CLI");
        refresh_via_cli(
            "codex",
            &["login", "status"],
            &cli_auth_path(),
            ctx.clock.as_ref(),
            CLI_REFRESH_TIMEOUT,
        )
        .await
    }
}

#[async_trait]
impl FetchStrategy for CodexOAuthStrategy {
    fn name(&self) -> &'static str {
        "oauth"
    }

    fn is_available(&self, ctx: &FetchContext) -> bool {
        read_cli_auth(ctx).is_some()
    }

    async fn fetch(&self, ctx: &FetchContext) -> FetchResult {
        let Some(auth) = read_cli_auth(ctx) else {
            return FetchResult::from_error(VibeusageError::NotConfigured {
                provider: PROVIDER_ID.to_string(),
            });
        };
        let account_id = resolve_account_id(ctx, &auth);
        let mut creds = auth.credentials;

        if creds.needs_refresh(ctx.clock.now()) {
            match Self::refresh(ctx, &creds).await {
                Some(refreshed) => creds = refreshed,
                None => {
                    return FetchResult::fatal(VibeusageError::AuthFailed {
                        provider: PROVIDER_ID.to_string(),
                        reason: "token refresh failed".to_string(),
                    });
                }
            }
        }

        match fetch_usage(ctx, &creds.access_token, account_id.as_deref()).await {
            Ok(snapshot) => FetchResult::success(snapshot),
            Err(e) if e.kind() == ErrorKind::AuthExpired => {
                let Some(refreshed) = Self::refresh(ctx, &creds).await else {
                    return FetchResult::fatal(VibeusageError::AuthFailed {
                        provider: PROVIDER_ID.to_string(),
                        reason: "token refresh failed".to_string(),
                    });
                };
                match fetch_usage(ctx, &refreshed.access_token, account_id.as_deref()).await {
                    Ok(snapshot) => FetchResult::success(snapshot),
                    Err(e2) if e2.kind() == ErrorKind::AuthExpired => {
                        FetchResult::fatal(VibeusageError::AuthFailed {
                            provider: PROVIDER_ID.to_string(),
                            reason: "rejected after token refresh".to_string(),
                        })
                    }
                    Err(e2) => FetchResult::from_error(e2),
                }
            }
            Err(e) => FetchResult::from_error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_usage_with_current_field_names() {
        let response: UsageResponse = serde_json::from_value(serde_json::json!({
            "rate_limits": {
                "primary": {"used_percent": 12.4, "window_minutes": 300, "resets_in_seconds": 3600},
                "secondary": {"used_percent": 61.8, "window_minutes": 10080, "resets_in_seconds": 86400}
            },
            "plan_type": "plus"
        }))
        .unwrap();

        let now = Utc::now();
        let snapshot = parse_usage(response, now);

        assert_eq!(snapshot.periods.len(), 2);
        assert_eq!(snapshot.periods[0].period_type, PeriodType::Session);
        assert_eq!(snapshot.periods[0].utilization, 12);
        assert_eq!(
            snapshot.periods[0].resets_at.unwrap(),
            now + ChronoDuration::seconds(3600)
        );

        assert_eq!(snapshot.periods[1].period_type, PeriodType::Weekly);
        assert_eq!(snapshot.periods[1].utilization, 62);
        assert_eq!(snapshot.plan(), Some("plus"));
    }

    #[test]
    fn parse_usage_with_legacy_reset_field() {
        let response: UsageResponse = serde_json::from_value(serde_json::json!({
            "rate_limits": {
                "primary": {"used_percent": 50.0, "window_minutes": 300, "reset_after_seconds": 120}
            }
        }))
        .unwrap();

        let now = Utc::now();
        let snapshot = parse_usage(response, now);
        assert_eq!(
            snapshot.periods[0].resets_at.unwrap(),
            now + ChronoDuration::seconds(120)
        );
    }

    #[test]
    fn window_over_five_hours_is_weekly() {
        let window = RateWindow {
            used_percent: 10.0,
            window_minutes: Some(301),
            resets_in_seconds: None,
            reset_after_seconds: None,
        };
        assert_eq!(window.period_type(), PeriodType::Weekly);

        let window = RateWindow {
            used_percent: 10.0,
            window_minutes: Some(300),
            resets_in_seconds: None,
            reset_after_seconds: None,
        };
        assert_eq!(window.period_type(), PeriodType::Session);

        // Unknown window length is assumed to be the long window.
        let window = RateWindow {
            used_percent: 10.0,
            window_minutes: None,
            resets_in_seconds: None,
            reset_after_seconds: None,
        };
        assert_eq!(window.period_type(), PeriodType::Weekly);
    }

    #[test]
    fn parse_usage_without_rate_limits_is_empty() {
        let response: UsageResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        let snapshot = parse_usage(response, Utc::now());
        assert!(snapshot.periods.is_empty());
    }

    #[test]
    fn cli_auth_file_parses_nested_tokens() {
        let file: CliAuthFile = serde_json::from_str(
            r#"{
                "tokens": {
                    "access_token": "tok",
                    "refresh_token": "ref",
                    "account_id": "acct-123",
                    "expires_at": "2026-08-01T12:00:00Z"
                },
                "last_refresh": "2026-07-31T12:00:00Z"
            }"#,
        )
        .unwrap();
        let tokens = file.tokens.unwrap();
        assert_eq!(tokens.access_token, "tok");
        assert_eq!(tokens.account_id.as_deref(), Some("acct-123"));
    }

    #[test]
    fn utilization_clamps() {
        let response: UsageResponse = serde_json::from_value(serde_json::json!({
            "rate_limits": {"primary": {"used_percent": 130.0, "window_minutes": 300}}
        }))
        .unwrap();
        let snapshot = parse_usage(response, Utc::now());
        assert_eq!(snapshot.periods[0].utilization, 100);
    }
}
