//! Gemini (Google) provider.
//!
//! Reuses the Gemini CLI's Google OAuth credentials, whose file stores the
//! expiry as `expiry_date` in unix milliseconds, with `GEMINI_API_KEY` as
//! the fallback. Health comes from the Google Cloud incident feed rather
//! than a statuspage summary.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::auth::OAuthCredentials;
use crate::auth::refresh::refresh_access_token;
use crate::core::models::{PeriodType, ProviderIdentity, UsagePeriod, UsageSnapshot, utilization_from_counts};
use crate::core::provider::{AuthFlow, CredentialSources, Provider, ProviderMeta};
use crate::core::status::{IncidentFeedProbe, StatusProbe};
use crate::core::strategy::{FetchContext, FetchResult, FetchStrategy};
use crate::error::{ErrorKind, VibeusageError};
use crate::storage::paths::expand_home;

const PROVIDER_ID: &str = "gemini";
const USAGE_URL: &str = "https://cloudcode-pa.googleapis.com/v1internal/userUsage";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const OAUTH_CLIENT_ID: &str =
    "681255809395-oo8ft2oprdrnp9e3aqf6av3hmdib135j.apps.googleusercontent.com";
const INCIDENT_FEED_URL: &str = "https://status.cloud.google.com/incidents.json";
const CLI_CREDENTIALS_PATH: &str = "~/.gemini/oauth_creds.json";
const API_KEY_ENV: &str = "GEMINI_API_KEY";

// =============================================================================
// Provider
// =============================================================================

pub struct GeminiProvider {
    meta: ProviderMeta,
}

impl GeminiProvider {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            meta: ProviderMeta {
                id: PROVIDER_ID,
                name: "Gemini",
                description: "Google Gemini CLI usage",
                homepage: "https://gemini.google.com",
                status_url: Some("https://status.cloud.google.com"),
                dashboard_url: Some("https://aistudio.google.com"),
                record_unavailable: false,
            },
        }
    }
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for GeminiProvider {
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
        vec![Arc::new(GeminiOAuthStrategy), Arc::new(GeminiApiKeyStrategy)]
    }

    fn status_probe(&self) -> Option<Box<dyn StatusProbe>> {
        Some(Box::new(IncidentFeedProbe::new(
            INCIDENT_FEED_URL,
            vec!["gemini".to_string(), "vertex".to_string(), "ai".to_string()],
        )))
    }

    fn auth(&self) -> Option<AuthFlow> {
        Some(AuthFlow::Custom {
            instructions: "Sign in with the Gemini CLI (`gemini`); vibeusage reuses its tokens.",
        })
    }
}

// =============================================================================
// CLI credential file (Google format)
// =============================================================================

#[derive(Debug, Deserialize)]
struct GoogleCredentialFile {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Unix milliseconds.
    #[serde(default)]
    expiry_date: Option<i64>,
}

fn read_cli_credentials(ctx: &FetchContext) -> Option<OAuthCredentials> {
    if !ctx.reuse_cli_credentials() {
        return None;
    }
    let bytes = std::fs::read(expand_home(CLI_CREDENTIALS_PATH)).ok()?;
    let file: GoogleCredentialFile = serde_json::from_slice(&bytes).ok()?;
    let expires_at = file
        .expiry_date
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
    Some(OAuthCredentials::new(
        file.access_token,
        file.refresh_token,
        expires_at,
    ))
}

// =============================================================================
// Usage response
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageResponse {
    #[serde(default)]
    daily_requests_used: f64,
    #[serde(default)]
    daily_requests_limit: f64,
    #[serde(default)]
    reset_time: Option<DateTime<Utc>>,
    #[serde(default)]
    tier: Option<String>,
}

fn parse_usage(response: UsageResponse, now: DateTime<Utc>) -> UsageSnapshot {
    let mut periods = Vec::new();
    if response.daily_requests_limit > 0.0 {
        let mut period = UsagePeriod::new(
            "daily requests",
            PeriodType::Daily,
            utilization_from_counts(response.daily_requests_used, response.daily_requests_limit)
                .into(),
        );
        period.resets_at = response.reset_time;
        periods.push(period);
    }

    let mut snapshot = UsageSnapshot::new(PROVIDER_ID, now, periods);
    if let Some(tier) = response.tier {
        snapshot = snapshot.with_identity(ProviderIdentity::plan(tier));
    }
    snapshot
}

async fn fetch_usage(ctx: &FetchContext, bearer: &str) -> Result<UsageSnapshot, VibeusageError> {
    let url = ctx
        .config
        .api_base(PROVIDER_ID)
        .map_or_else(|| USAGE_URL.to_string(), |base| format!("{base}/v1internal/userUsage"));

    let request = ctx
        .http
        .get(url)
        .header("Authorization", format!("Bearer {bearer}"));

    let response: UsageResponse = crate::core::http::send_json(PROVIDER_ID, request).await?;
    Ok(parse_usage(response, ctx.clock.now()))
}

// =============================================================================
// Strategies
// =============================================================================

struct GeminiOAuthStrategy;

#[async_trait]
impl FetchStrategy for GeminiOAuthStrategy {
    fn name(&self) -> &'static str {
        "oauth"
    }

    fn is_available(&self, ctx: &FetchContext) -> bool {
        read_cli_credentials(ctx).is_some()
    }

    async fn fetch(&self, ctx: &FetchContext) -> FetchResult {
        let Some(mut creds) = read_cli_credentials(ctx) else {
            return FetchResult::from_error(VibeusageError::NotConfigured {
                provider: PROVIDER_ID.to_string(),
            });
        };

        if creds.needs_refresh(ctx.clock.now()) {
            match refresh_access_token(&ctx.http, TOKEN_URL, OAUTH_CLIENT_ID, &creds, &[], ctx.clock.as_ref())
                .await
            {
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
                let refreshed = refresh_access_token(
                    &ctx.http,
                    TOKEN_URL,
                    OAUTH_CLIENT_ID,
                    &creds,
                    &[],
                    ctx.clock.as_ref(),
                )
                .await;
                match refreshed {
                    Some(new_creds) => match fetch_usage(ctx, &new_creds.access_token).await {
                        Ok(snapshot) => FetchResult::success(snapshot),
                        Err(e2) if e2.kind() == ErrorKind::AuthExpired => {
                            FetchResult::fatal(VibeusageError::AuthFailed {
                                provider: PROVIDER_ID.to_string(),
                                reason: "rejected after token refresh".to_string(),
                            })
                        }
                        Err(e2) => FetchResult::from_error(e2),
                    },
                    None => FetchResult::fatal(VibeusageError::AuthFailed {
                        provider: PROVIDER_ID.to_string(),
                        reason: "token refresh failed".to_string(),
                    }),
                }
            }
            Err(e) => FetchResult::from_error(e),
        }
    }
}

struct GeminiApiKeyStrategy;

impl GeminiApiKeyStrategy {
    fn key(ctx: &FetchContext) -> Option<String> {
        super::api_key_from(ctx, PROVIDER_ID, &[API_KEY_ENV])
    }
}

#[async_trait]
impl FetchStrategy for GeminiApiKeyStrategy {
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

    #[test]
    fn google_credential_file_parses_expiry_date_millis() {
        let file: GoogleCredentialFile = serde_json::from_str(
            r#"{"access_token":"ya29.tok","refresh_token":"1//ref","expiry_date":1767225600000}"#,
        )
        .unwrap();
        assert_eq!(file.access_token, "ya29.tok");
        assert_eq!(file.expiry_date, Some(1_767_225_600_000));
    }

    #[test]
    fn parse_usage_daily_window() {
        let response: UsageResponse = serde_json::from_value(serde_json::json!({
            "dailyRequestsUsed": 250.0,
            "dailyRequestsLimit": 1000.0,
            "resetTime": "2026-08-02T00:00:00Z",
            "tier": "free"
        }))
        .unwrap();

        let snapshot = parse_usage(response, Utc::now());
        assert_eq!(snapshot.periods.len(), 1);
        assert_eq!(snapshot.periods[0].period_type, PeriodType::Daily);
        assert_eq!(snapshot.periods[0].utilization, 25);
        assert_eq!(snapshot.plan(), Some("free"));
    }

    #[test]
    fn zero_limit_produces_no_periods() {
        let response: UsageResponse =
            serde_json::from_value(serde_json::json!({"dailyRequestsUsed": 5.0})).unwrap();
        assert!(parse_usage(response, Utc::now()).periods.is_empty());
    }

    #[test]
    fn status_probe_is_incident_feed() {
        let provider = GeminiProvider::new();
        assert!(provider.status_probe().is_some());
    }
}
