//! Warp provider.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::models::{PeriodType, ProviderIdentity, UsagePeriod, UsageSnapshot, utilization_from_counts};
use crate::core::provider::{AuthFlow, CredentialSources, Provider, ProviderMeta};
use crate::core::strategy::{FetchContext, FetchResult, FetchStrategy};
use crate::error::{ErrorKind, VibeusageError};

const PROVIDER_ID: &str = "warp";
const USAGE_URL: &str = "https://app.warp.dev/api/v1/ai/usage";
const API_KEY_ENV: &str = "WARP_API_KEY";

pub struct WarpProvider {
    meta: ProviderMeta,
}

impl WarpProvider {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            meta: ProviderMeta {
                id: PROVIDER_ID,
                name: "Warp",
                description: "Warp AI request quota",
                homepage: "https://www.warp.dev",
                status_url: None,
                dashboard_url: Some("https://app.warp.dev/settings/ai"),
                record_unavailable: false,
            },
        }
    }
}

impl Default for WarpProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for WarpProvider {
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
        vec![Arc::new(WarpApiKeyStrategy)]
    }

    fn auth(&self) -> Option<AuthFlow> {
        Some(AuthFlow::ManualKey {
            env_var: API_KEY_ENV,
            help: "Create a key under Warp settings > AI",
        })
    }
}

#[derive(Debug, Deserialize)]
struct UsageResponse {
    #[serde(default)]
    requests_used: f64,
    #[serde(default)]
    request_limit: f64,
    #[serde(default)]
    next_refresh_time: Option<DateTime<Utc>>,
    #[serde(default)]
    plan: Option<String>,
}

fn parse_usage(response: &UsageResponse, now: DateTime<Utc>) -> UsageSnapshot {
    let mut period = UsagePeriod::new(
        "ai requests",
        PeriodType::Monthly,
        utilization_from_counts(response.requests_used, response.request_limit).into(),
    );
    period.resets_at = response.next_refresh_time;

    let mut snapshot = UsageSnapshot::new(PROVIDER_ID, now, vec![period]);
    if let Some(plan) = &response.plan {
        snapshot = snapshot.with_identity(ProviderIdentity::plan(plan.clone()));
    }
    snapshot
}

struct WarpApiKeyStrategy;

impl WarpApiKeyStrategy {
    fn key(ctx: &FetchContext) -> Option<String> {
        super::api_key_from(ctx, PROVIDER_ID, &[API_KEY_ENV])
    }
}

#[async_trait]
impl FetchStrategy for WarpApiKeyStrategy {
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

        let url = ctx
            .config
            .api_base(PROVIDER_ID)
            .map_or_else(|| USAGE_URL.to_string(), |base| format!("{base}/api/v1/ai/usage"));
        let request = ctx.http.get(url).bearer_auth(key);

        match crate::core::http::send_json::<UsageResponse>(PROVIDER_ID, request).await {
            Ok(response) => FetchResult::success(parse_usage(&response, ctx.clock.now())),
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
