//! Kimi (Moonshot) provider.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::models::{PeriodType, UsagePeriod, UsageSnapshot, utilization_from_counts};
use crate::core::provider::{AuthFlow, CredentialSources, Provider, ProviderMeta};
use crate::core::strategy::{FetchContext, FetchResult, FetchStrategy};
use crate::error::{ErrorKind, VibeusageError};

const PROVIDER_ID: &str = "kimi";
const USAGE_URL: &str = "https://api.moonshot.ai/v1/users/me/usage";
const API_KEY_ENVS: [&str; 2] = ["KIMI_API_KEY", "MOONSHOT_API_KEY"];

pub struct KimiProvider {
    meta: ProviderMeta,
}

impl KimiProvider {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            meta: ProviderMeta {
                id: PROVIDER_ID,
                name: "Kimi",
                description: "Moonshot Kimi usage",
                homepage: "https://kimi.moonshot.cn",
                status_url: None,
                dashboard_url: Some("https://platform.moonshot.ai/console"),
                record_unavailable: false,
            },
        }
    }
}

impl Default for KimiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for KimiProvider {
    fn meta(&self) -> &ProviderMeta {
        &self.meta
    }

    fn credential_sources(&self) -> CredentialSources {
        CredentialSources {
            cli_paths: vec![],
            env_vars: API_KEY_ENVS.iter().map(ToString::to_string).collect(),
        }
    }

    fn strategies(&self) -> Vec<Arc<dyn FetchStrategy>> {
        vec![Arc::new(KimiApiKeyStrategy)]
    }

    fn auth(&self) -> Option<AuthFlow> {
        Some(AuthFlow::ManualKey {
            env_var: "KIMI_API_KEY",
            help: "Create a key at https://platform.moonshot.ai/console/api-keys",
        })
    }
}

/// Moonshot wraps payloads in `{code, data}`; a non-zero code is an API
/// error even on HTTP 200.
#[derive(Debug, Deserialize)]
struct UsageResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    data: Option<UsageData>,
}

#[derive(Debug, Deserialize)]
struct UsageData {
    used: f64,
    total: f64,
    #[serde(default)]
    reset_at: Option<DateTime<Utc>>,
}

fn parse_usage(response: &UsageResponse, now: DateTime<Utc>) -> Result<UsageSnapshot, VibeusageError> {
    if response.code != 0 {
        return Err(VibeusageError::ParseResponse(format!(
            "moonshot error code {}",
            response.code
        )));
    }
    let Some(data) = &response.data else {
        return Err(VibeusageError::EmptyUsage {
            provider: PROVIDER_ID.to_string(),
        });
    };

    let mut period = UsagePeriod::new(
        "weekly requests",
        PeriodType::Weekly,
        utilization_from_counts(data.used, data.total).into(),
    );
    period.resets_at = data.reset_at;
    Ok(UsageSnapshot::new(PROVIDER_ID, now, vec![period]))
}

struct KimiApiKeyStrategy;

impl KimiApiKeyStrategy {
    fn key(ctx: &FetchContext) -> Option<String> {
        super::api_key_from(ctx, PROVIDER_ID, &API_KEY_ENVS)
    }
}

#[async_trait]
impl FetchStrategy for KimiApiKeyStrategy {
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
            .map_or_else(|| USAGE_URL.to_string(), |base| format!("{base}/v1/users/me/usage"));
        let request = ctx.http.get(url).bearer_auth(key);

        match crate::core::http::send_json::<UsageResponse>(PROVIDER_ID, request).await {
            Ok(response) => match parse_usage(&response, ctx.clock.now()) {
                Ok(snapshot) => FetchResult::success(snapshot),
                Err(e) => FetchResult::from_error(e),
            },
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
