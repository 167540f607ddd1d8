//! GitHub Copilot provider.
//!
//! Device-flow OAuth against GitHub, with `GITHUB_TOKEN` as the plain
//! API-key fallback. Copilot's quota endpoint reports percent *remaining*
//! per bucket and the billing-cycle reset date; premium requests carry
//! per-model cost multipliers handled by the model registry.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;

use super::stored_oauth;
use crate::auth::DeviceFlowConfig;
use crate::core::models::{PeriodType, ProviderIdentity, UsagePeriod, UsageSnapshot, clamp_utilization};
use crate::core::provider::{AuthFlow, CredentialSources, Provider, ProviderMeta};
use crate::core::status::{StatusProbe, StatuspageProbe};
use crate::core::strategy::{FetchContext, FetchResult, FetchStrategy};
use crate::error::{ErrorKind, VibeusageError};

const PROVIDER_ID: &str = "copilot";
const USAGE_URL: &str = "https://api.github.com/copilot_internal/user";
const STATUS_URL: &str = "https://www.githubstatus.com/api/v2/status.json";
const DEVICE_URL: &str = "https://github.com/login/device/code";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
/// VS Code's public GitHub OAuth client id.
const OAUTH_CLIENT_ID: &str = "Iv1.b507a08c87ecfe98";
const API_KEY_ENV: &str = "GITHUB_TOKEN";

// =============================================================================
// Provider
// =============================================================================

pub struct CopilotProvider {
    meta: ProviderMeta,
}

impl CopilotProvider {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            meta: ProviderMeta {
                id: PROVIDER_ID,
                name: "Copilot",
                description: "GitHub Copilot quota",
                homepage: "https://github.com/features/copilot",
                status_url: Some("https://www.githubstatus.com"),
                dashboard_url: Some("https://github.com/settings/copilot"),
                record_unavailable: false,
            },
        }
    }
}

impl Default for CopilotProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for CopilotProvider {
    fn meta(&self) -> &ProviderMeta {
        &self.meta
    }

    fn credential_sources(&self) -> CredentialSources {
        CredentialSources {
            cli_paths: vec![],
            env_vars: vec![API_KEY_ENV.to_string()],
        }
    }

    fn strategies(&self) -> Vec<Arc<dyn FetchStrategy>> {
        vec![Arc::new(CopilotOAuthStrategy), Arc::new(CopilotTokenStrategy)]
    }

    fn status_probe(&self) -> Option<Box<dyn StatusProbe>> {
        Some(Box::new(StatuspageProbe::new(STATUS_URL)))
    }

    fn auth(&self) -> Option<AuthFlow> {
        Some(AuthFlow::DeviceCode(DeviceFlowConfig {
            device_url: DEVICE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            client_id: OAUTH_CLIENT_ID.to_string(),
            scope: Some("read:user".to_string()),
        }))
    }
}

// =============================================================================
// Usage response
// =============================================================================

#[derive(Debug, Deserialize)]
struct UserResponse {
    #[serde(default)]
    quota_snapshots: Option<QuotaSnapshots>,
    #[serde(default)]
    quota_reset_date: Option<String>,
    #[serde(default)]
    copilot_plan: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuotaSnapshots {
    #[serde(default)]
    chat: Option<QuotaBucket>,
    #[serde(default)]
    completions: Option<QuotaBucket>,
    #[serde(default)]
    premium_interactions: Option<QuotaBucket>,
}

#[derive(Debug, Deserialize)]
struct QuotaBucket {
    #[serde(default)]
    percent_remaining: f64,
    #[serde(default)]
    unlimited: bool,
}

fn parse_reset_date(date: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|dt| Utc.from_local_datetime(&dt).single())
}

fn parse_usage(response: UserResponse, now: DateTime<Utc>) -> UsageSnapshot {
    let resets_at = response.quota_reset_date.as_deref().and_then(parse_reset_date);
    let mut periods = Vec::new();

    if let Some(snapshots) = &response.quota_snapshots {
        let mut push = |bucket: &Option<QuotaBucket>, name: &str| {
            let Some(bucket) = bucket else { return };
            if bucket.unlimited {
                return;
            }
            let used = 100.0 - bucket.percent_remaining;
            let mut period = UsagePeriod::new(
                name,
                PeriodType::Monthly,
                clamp_utilization(used.round() as i64).into(),
            );
            period.resets_at = resets_at;
            periods.push(period);
        };

        push(&snapshots.chat, "chat");
        push(&snapshots.completions, "completions");
        push(&snapshots.premium_interactions, "premium requests");
    }

    let mut snapshot = UsageSnapshot::new(PROVIDER_ID, now, periods);
    if let Some(plan) = response.copilot_plan {
        snapshot = snapshot.with_identity(ProviderIdentity::plan(plan));
    }
    snapshot
}

async fn fetch_usage(ctx: &FetchContext, token: &str) -> Result<UsageSnapshot, VibeusageError> {
    let url = ctx
        .config
        .api_base(PROVIDER_ID)
        .map_or_else(|| USAGE_URL.to_string(), |base| format!("{base}/copilot_internal/user"));

    let request = ctx
        .http
        .get(url)
        .header("Authorization", format!("token {token}"))
        .header("Accept", "application/json");

    let response: UserResponse = crate::core::http::send_json(PROVIDER_ID, request).await?;
    Ok(parse_usage(response, ctx.clock.now()))
}

// =============================================================================
// Strategies
// =============================================================================

/// Device-flow token from the vibeusage store. GitHub device tokens do not
/// expire, so a rejection means re-enrollment rather than refresh.
struct CopilotOAuthStrategy;

#[async_trait]
impl FetchStrategy for CopilotOAuthStrategy {
    fn name(&self) -> &'static str {
        "oauth"
    }

    fn is_available(&self, ctx: &FetchContext) -> bool {
        stored_oauth(ctx, PROVIDER_ID).is_some()
    }

    async fn fetch(&self, ctx: &FetchContext) -> FetchResult {
        let Some(creds) = stored_oauth(ctx, PROVIDER_ID) else {
            return FetchResult::from_error(VibeusageError::NotConfigured {
                provider: PROVIDER_ID.to_string(),
            });
        };
        match fetch_usage(ctx, &creds.access_token).await {
            Ok(snapshot) => FetchResult::success(snapshot),
            Err(e) if e.kind() == ErrorKind::AuthExpired => {
                FetchResult::fatal(VibeusageError::AuthFailed {
                    provider: PROVIDER_ID.to_string(),
                    reason: "GitHub token rejected".to_string(),
                })
            }
            Err(e) => FetchResult::from_error(e),
        }
    }
}

/// `GITHUB_TOKEN` personal-access-token fallback.
struct CopilotTokenStrategy;

impl CopilotTokenStrategy {
    fn key(ctx: &FetchContext) -> Option<String> {
        super::api_key_from(ctx, PROVIDER_ID, &[API_KEY_ENV])
    }
}

#[async_trait]
impl FetchStrategy for CopilotTokenStrategy {
    fn name(&self) -> &'static str {
        "api_key"
    }

    fn is_available(&self, ctx: &FetchContext) -> bool {
        Self::key(ctx).is_some()
    }

    async fn fetch(&self, ctx: &FetchContext) -> FetchResult {
        let Some(token) = Self::key(ctx) else {
            return FetchResult::from_error(VibeusageError::NotConfigured {
                provider: PROVIDER_ID.to_string(),
            });
        };
        match fetch_usage(ctx, &token).await {
            Ok(snapshot) => FetchResult::success(snapshot),
            Err(e) if e.kind() == ErrorKind::AuthExpired => {
                FetchResult::fatal(VibeusageError::AuthFailed {
                    provider: PROVIDER_ID.to_string(),
                    reason: "GITHUB_TOKEN rejected".to_string(),
                })
            }
            Err(e) => FetchResult::from_error(e),
        }
    }
}
