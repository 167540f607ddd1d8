//! Minimax provider.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::models::{PeriodType, UsagePeriod, UsageSnapshot, utilization_from_counts};
use crate::core::provider::{AuthFlow, CredentialSources, Provider, ProviderMeta};
use crate::core::strategy::{FetchContext, FetchResult, FetchStrategy};
use crate::error::{ErrorKind, VibeusageError};

const PROVIDER_ID: &str = "minimax";
const USAGE_URL: &str = "https://api.minimax.io/v1/user/quota";
const API_KEY_ENV: &str = "MINIMAX_API_KEY";

pub struct MinimaxProvider {
    meta: ProviderMeta,
}

impl MinimaxProvider {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            meta: ProviderMeta {
                id: PROVIDER_ID,
                name: "MiniMax",
                description: "MiniMax coding plan usage",
                homepage: "https://www.minimax.io",
                status_url: None,
                dashboard_url: Some("https://platform.minimax.io"),
                record_unavailable: false,
            },
        }
    }
}

impl Default for MinimaxProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for MinimaxProvider {
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
        vec![Arc::new(MinimaxApiKeyStrategy)]
    }

    fn auth(&self) -> Option<AuthFlow> {
        Some(AuthFlow::ManualKey {
            env_var: API_KEY_ENV,
            help: "Create a key at https://platform.minimax.io/user-center/basic-information",
        })
    }
}

#[derive(Debug, Deserialize)]
struct QuotaResponse {
    #[serde(default)]
    quota: Option<Quota>,
}

#[derive(Debug, Deserialize)]
struct Quota {
    daily_used: f64,
    daily_limit: f64,
    #[serde(default)]
    reset_at: Option<DateTime<Utc>>,
}

fn parse_usage(response: &QuotaResponse, now: DateTime<Utc>) -> UsageSnapshot {
    let periods = response
        .quota
        .as_ref()
        .map(|q| {
            let mut period = UsagePeriod::new(
                "daily requests",
                PeriodType::Daily,
                utilization_from_counts(q.daily_used, q.daily_limit).into(),
            );
            period.resets_at = q.reset_at;
            vec![period]
        })
        .unwrap_or_default();
    UsageSnapshot::new(PROVIDER_ID, now, periods)
}

struct MinimaxApiKeyStrategy;

impl MinimaxApiKeyStrategy {
    fn key(ctx: &FetchContext) -> Option<String> {
        super::api_key_from(ctx, PROVIDER_ID, &[API_KEY_ENV])
    }
}

#[async_trait]
impl FetchStrategy for MinimaxApiKeyStrategy {
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
            .map_or_else(|| USAGE_URL.to_string(), |base| format!("{base}/v1/user/quota"));
        let request = ctx.http.get(url).bearer_auth(key);

        match crate::core::http::send_json::<QuotaResponse>(PROVIDER_ID, request).await {
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
