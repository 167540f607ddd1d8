//! Claude (Anthropic) provider.
//!
//! Strategy order:
//! 1. `oauth`: vibeusage-owned tokens, refreshed over HTTP when stale
//! 2. `cli`: reuse of the Claude Code CLI credential file
//! 3. `api_key`: `ANTHROPIC_API_KEY`
//!
//! All three hit the same usage endpoint, which reports utilization per
//! rolling window (five-hour session, seven-day overall, seven-day Opus).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use super::{persist_oauth, stored_oauth};
use crate::auth::OAuthCredentials;
use crate::auth::refresh::refresh_access_token;
use crate::core::models::{
    Overage, PeriodType, ProviderIdentity, UsagePeriod, UsageSnapshot, clamp_utilization,
};
use crate::core::provider::{AuthFlow, CredentialSources, Provider, ProviderMeta};
use crate::core::status::{StatusProbe, StatuspageProbe};
use crate::core::strategy::{FetchContext, FetchResult, FetchStrategy};
use crate::error::{ErrorKind, VibeusageError};
use crate::storage::paths::expand_home;

const PROVIDER_ID: &str = "claude";
const USAGE_URL: &str = "https://api.anthropic.com/api/oauth/usage";
const TOKEN_URL: &str = "https://console.anthropic.com/v1/oauth/token";
const OAUTH_CLIENT_ID: &str = "9d1c250a-e61b-44d9-88ed-5944d1962f5e";
const STATUS_URL: &str = "https://status.anthropic.com/api/v2/status.json";
const CLI_CREDENTIALS_PATH: &str = "~/.claude/.credentials.json";
const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

// =============================================================================
// Provider
// =============================================================================

pub struct ClaudeProvider {
    meta: ProviderMeta,
}

impl ClaudeProvider {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            meta: ProviderMeta {
                id: PROVIDER_ID,
                name: "Claude",
                description: "Anthropic Claude subscription usage",
                homepage: "https://claude.ai",
                status_url: Some("https://status.anthropic.com"),
                dashboard_url: Some("https://claude.ai/settings/usage"),
                record_unavailable: true,
            },
        }
    }
}

impl Default for ClaudeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for ClaudeProvider {
    fn meta(&self) -> &ProviderMeta {
        &self.meta
    }

    fn credential_sources(&self) -> CredentialSources {
        CredentialSources {
            cli_paths: vec![CLI_CREDENTIALS_PATH.to_string()],
            env_vars: vec![API_KEY_ENV.to_string()],
        }
    }

    fn strategies(&self) -> Vec<Arc<dyn FetchStrategy>> {
        vec![
            Arc::new(ClaudeOAuthStrategy),
            Arc::new(ClaudeCliStrategy),
            Arc::new(ClaudeApiKeyStrategy),
        ]
    }

    fn status_probe(&self) -> Option<Box<dyn StatusProbe>> {
        Some(Box::new(StatuspageProbe::new(STATUS_URL)))
    }

    fn auth(&self) -> Option<AuthFlow> {
        Some(AuthFlow::ManualKey {
            env_var: API_KEY_ENV,
            help: "Create a key at https://console.anthropic.com/settings/keys",
        })
    }
}

// =============================================================================
// Usage response
// =============================================================================

#[derive(Debug, Deserialize)]
struct UsageResponse {
    #[serde(default)]
    five_hour: Option<Window>,
    #[serde(default)]
    seven_day: Option<Window>,
    #[serde(default)]
    seven_day_opus: Option<Window>,
    #[serde(default)]
    account: Option<Account>,
    #[serde(default)]
    extra_usage: Option<ExtraUsage>,
}

#[derive(Debug, Deserialize)]
struct Window {
    utilization: f64,
    #[serde(default)]
    resets_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Account {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    plan: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtraUsage {
    #[serde(default)]
    used_cents: f64,
    #[serde(default)]
    limit_cents: f64,
    #[serde(default)]
    enabled: bool,
}

fn parse_usage(response: UsageResponse, now: DateTime<Utc>) -> UsageSnapshot {
    let mut periods = Vec::new();

    let window = |w: &Window, name: &str, period_type: PeriodType| {
        let mut period =
            UsagePeriod::new(name, period_type, clamp_utilization(w.utilization.round() as i64).into());
        period.resets_at = w.resets_at;
        period
    };

    if let Some(w) = &response.five_hour {
        periods.push(window(w, "session", PeriodType::Session));
    }
    if let Some(w) = &response.seven_day {
        periods.push(window(w, "weekly (all models)", PeriodType::Weekly));
    }
    if let Some(w) = &response.seven_day_opus {
        periods.push(window(w, "weekly (opus)", PeriodType::Weekly).with_model("claude-opus-4-1"));
    }

    let mut snapshot = UsageSnapshot::new(PROVIDER_ID, now, periods);
    if let Some(account) = response.account {
        snapshot = snapshot.with_identity(ProviderIdentity {
            email: account.email,
            plan: account.plan,
        });
    }
    if let Some(extra) = response.extra_usage {
        snapshot = snapshot.with_overage(Overage {
            used: extra.used_cents / 100.0,
            limit: extra.limit_cents / 100.0,
            currency: "USD".to_string(),
            is_enabled: extra.enabled,
        });
    }
    snapshot
}

async fn fetch_usage(ctx: &FetchContext, token: &str) -> Result<UsageSnapshot, VibeusageError> {
    let url = ctx
        .config
        .api_base(PROVIDER_ID)
        .map_or_else(|| USAGE_URL.to_string(), |base| format!("{base}/api/oauth/usage"));

    let request = ctx
        .http
        .get(url)
        .header("Authorization", format!("Bearer {token}"))
        .header("anthropic-beta", "oauth-2025-04-20");

    let response: UsageResponse = crate::core::http::send_json(PROVIDER_ID, request).await?;
    Ok(parse_usage(response, ctx.clock.now()))
}

// =============================================================================
// OAuth strategy
// =============================================================================

struct ClaudeOAuthStrategy;

impl ClaudeOAuthStrategy {
    async fn refresh(ctx: &FetchContext, creds: &OAuthCredentials) -> Option<OAuthCredentials> {
        let refreshed =
            refresh_access_token(&ctx.http, TOKEN_URL, OAUTH_CLIENT_ID, creds, &[], ctx.clock.as_ref())
                .await?;
        persist_oauth(ctx, PROVIDER_ID, &refreshed);
        Some(refreshed)
    }
}

#[async_trait]
impl FetchStrategy for ClaudeOAuthStrategy {
    fn name(&self) -> &'static str {
        "oauth"
    }

    fn is_available(&self, ctx: &FetchContext) -> bool {
        stored_oauth(ctx, PROVIDER_ID).is_some()
    }

    async fn fetch(&self, ctx: &FetchContext) -> FetchResult {
        let Some(mut creds) = stored_oauth(ctx, PROVIDER_ID) else {
            return FetchResult::from_error(VibeusageError::NotConfigured {
                provider: PROVIDER_ID.to_string(),
            });
        };

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

        match fetch_usage(ctx, &creds.access_token).await {
            Ok(snapshot) => FetchResult::success(snapshot),
            Err(e) if e.kind() == ErrorKind::AuthExpired => {
                // One refresh, one retry; a second rejection is fatal.
                let Some(refreshed) = Self::refresh(ctx, &creds).await else {
                    return FetchResult::fatal(VibeusageError::AuthFailed {
                        provider: PROVIDER_ID.to_string(),
                        reason: "token refresh failed".to_string(),
                    });
                };
                match fetch_usage(ctx, &refreshed.access_token).await {
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

// =============================================================================
// CLI-credential reuse strategy
// =============================================================================

/// Credential file written by the Claude Code CLI.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliCredentialFile {
    claude_ai_oauth: Option<CliOAuth>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliOAuth {
    access_token: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

fn read_cli_token(ctx: &FetchContext) -> Option<OAuthCredentials> {
    if !ctx.reuse_cli_credentials() {
        return None;
    }
    let path = expand_home(CLI_CREDENTIALS_PATH);
    let bytes = std::fs::read(path).ok()?;
    let file: CliCredentialFile = serde_json::from_slice(&bytes).ok()?;
    let oauth = file.claude_ai_oauth?;
    // The CLI stores expiry as unix milliseconds.
    let expires_at = oauth
        .expires_at
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
    Some(OAuthCredentials::new(oauth.access_token, None, expires_at))
}

struct ClaudeCliStrategy;

#[async_trait]
impl FetchStrategy for ClaudeCliStrategy {
    fn name(&self) -> &'static str {
        "cli"
    }

    fn is_available(&self, ctx: &FetchContext) -> bool {
        read_cli_token(ctx).is_some()
    }

    async fn fetch(&self, ctx: &FetchContext) -> FetchResult {
        let Some(creds) = read_cli_token(ctx) else {
            return FetchResult::from_error(VibeusageError::NotConfigured {
                provider: PROVIDER_ID.to_string(),
            });
        };
        if creds.is_expired(ctx.clock.now()) {
            // The CLI owns these tokens; we cannot refresh them ourselves.
            return FetchResult::recoverable(VibeusageError::AuthExpired {
                provider: PROVIDER_ID.to_string(),
            });
        }
        match fetch_usage(ctx, &creds.access_token).await {
            Ok(snapshot) => FetchResult::success(snapshot),
            Err(e) => FetchResult::from_error(e),
        }
    }
}

// =============================================================================
// API key strategy
// =============================================================================

struct ClaudeApiKeyStrategy;

impl ClaudeApiKeyStrategy {
    fn key(ctx: &FetchContext) -> Option<String> {
        super::api_key_from(ctx, PROVIDER_ID, &[API_KEY_ENV])
    }
}

#[async_trait]
impl FetchStrategy for ClaudeApiKeyStrategy {
    fn name(&self) -> &'static str {
        "api_key"
    }

    fn is_available(&self, ctx: &FetchContext) -> bool {
        Self::key(ctx).is_some()
    }

    async fn fetch(&self, ctx: &FetchContext) -> FetchResult {
        let Some(key) = Self::key(ctx) else {
            return FetchResult::from_error(VibeusageError::NotConfigured {
                provider: PROVIDER_ID.to_string(),
            });
        };
        match fetch_usage(ctx, &key).await {
            Ok(snapshot) => FetchResult::success(snapshot),
            // An API key has no refresh path; a rejection is final.
            Err(e) if e.kind() == ErrorKind::AuthExpired => {
                FetchResult::fatal(VibeusageError::AuthFailed {
                    provider: PROVIDER_ID.to_string(),
                    reason: "API key rejected".to_string(),
                })
            }
            Err(e) => FetchResult::from_error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_response() -> UsageResponse {
        serde_json::from_value(serde_json::json!({
            "five_hour": {"utilization": 20.4, "resets_at": "2026-08-01T15:00:00Z"},
            "seven_day": {"utilization": 42.0, "resets_at": "2026-08-04T00:00:00Z"},
            "seven_day_opus": {"utilization": 87.6, "resets_at": "2026-08-04T00:00:00Z"},
            "account": {"email": "dev@example.com", "plan": "max"},
            "extra_usage": {"used_cents": 125.0, "limit_cents": 1000.0, "enabled": true}
        }))
        .unwrap()
    }

    #[test]
    fn parse_full_usage_response() {
        let snapshot = parse_usage(full_response(), Utc::now());

        assert_eq!(snapshot.provider, "claude");
        assert_eq!(snapshot.periods.len(), 3);

        assert_eq!(snapshot.periods[0].period_type, PeriodType::Session);
        assert_eq!(snapshot.periods[0].utilization, 20);

        assert_eq!(snapshot.periods[1].period_type, PeriodType::Weekly);
        assert_eq!(snapshot.periods[1].utilization, 42);

        assert_eq!(snapshot.periods[2].utilization, 88);
        assert_eq!(snapshot.periods[2].model.as_deref(), Some("claude-opus-4-1"));

        let identity = snapshot.identity.expect("identity");
        assert_eq!(identity.email.as_deref(), Some("dev@example.com"));
        assert_eq!(identity.plan.as_deref(), Some("max"));

        let overage = snapshot.overage.expect("overage");
        assert!((overage.used - 1.25).abs() < f64::EPSILON);
        assert!(overage.is_enabled);
    }

    #[test]
    fn parse_partial_usage_response() {
        let response: UsageResponse =
            serde_json::from_value(serde_json::json!({"seven_day": {"utilization": 150.0}}))
                .unwrap();
        let snapshot = parse_usage(response, Utc::now());

        assert_eq!(snapshot.periods.len(), 1);
        // Out-of-range utilization clamps.
        assert_eq!(snapshot.periods[0].utilization, 100);
        assert!(snapshot.periods[0].resets_at.is_none());
        assert!(snapshot.identity.is_none());
    }

    #[test]
    fn parse_empty_usage_response_has_no_periods() {
        let response: UsageResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        let snapshot = parse_usage(response, Utc::now());
        assert!(snapshot.periods.is_empty());
    }

    #[test]
    fn cli_credential_file_parses_millisecond_expiry() {
        let file: CliCredentialFile = serde_json::from_str(
            r#"{"claudeAiOauth": {"accessToken": "tok", "expiresAt": 1767225600000}}"#,
        )
        .unwrap();
        let oauth = file.claude_ai_oauth.unwrap();
        assert_eq!(oauth.access_token, "tok");
        assert_eq!(oauth.expires_at, Some(1_767_225_600_000));
    }

    #[test]
    fn strategy_order_is_oauth_cli_api_key() {
        let provider = ClaudeProvider::new();
        let names: Vec<&str> = provider.strategies().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["oauth", "cli", "api_key"]);
    }

    #[test]
    fn credential_sources_declared() {
        let provider = ClaudeProvider::new();
        let sources = provider.credential_sources();
        assert_eq!(sources.cli_paths, vec![CLI_CREDENTIALS_PATH]);
        assert_eq!(sources.env_vars, vec![API_KEY_ENV]);
    }
}
