//! OpenRouter provider.
//!
//! The key endpoint reports dollar usage against an optional credit limit.
//! Keys without a limit read as 0% utilized; the dollar figures also feed
//! the snapshot's overage block.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::models::{Overage, PeriodType, UsagePeriod, UsageSnapshot, utilization_from_counts};
use crate::core::provider::{AuthFlow, CredentialSources, Provider, ProviderMeta};
use crate::core::strategy::{FetchContext, FetchResult, FetchStrategy};
use crate::error::{ErrorKind, VibeusageError};

const PROVIDER_ID: &str = "openrouter";
const USAGE_URL: &str = "https://openrouter.ai/api/v1/key";
const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

pub struct OpenRouterProvider {
    meta: ProviderMeta,
}

impl OpenRouterProvider {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            meta: ProviderMeta {
                id: PROVIDER_ID,
                name: "OpenRouter",
                description: "OpenRouter credit usage",
                homepage: "https://openrouter.ai",
                status_url: None,
                dashboard_url: Some("https://openrouter.ai/activity"),
                record_unavailable: false,
            },
        }
    }
}

impl Default for OpenRouterProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for OpenRouterProvider {
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
        vec![Arc::new(OpenRouterApiKeyStrategy)]
    }

    fn auth(&self) -> Option<AuthFlow> {
        Some(AuthFlow::ManualKey {
            env_var: API_KEY_ENV,
            help: "Create a key at https://openrouter.ai/settings/keys",
        })
    }
}

#[derive(Debug, Deserialize)]
struct KeyResponse {
    #[serde(default)]
    data: Option<KeyData>,
}

#[derive(Debug, Deserialize)]
struct KeyData {
    /// Dollars spent on this key.
    #[serde(default)]
    usage: f64,
    /// Credit limit in dollars; absent for unlimited keys.
    #[serde(default)]
    limit: Option<f64>,
    #[serde(default)]
    is_free_tier: bool,
}

fn parse_usage(response: &KeyResponse, now: DateTime<Utc>) -> Result<UsageSnapshot, VibeusageError> {
    let Some(data) = &response.data else {
        return Err(VibeusageError::EmptyUsage {
            provider: PROVIDER_ID.to_string(),
        });
    };

    let limit = data.limit.unwrap_or(0.0);
    // OpenRouter credits do not reset on a schedule, so no resets_at.
    let period = UsagePeriod::new(
        "credits",
        PeriodType::Monthly,
        utilization_from_counts(data.usage, limit).into(),
    );

    let plan = if data.is_free_tier { "free" } else { "paid" };
    let snapshot = UsageSnapshot::new(PROVIDER_ID, now, vec![period])
        .with_identity(crate::core::models::ProviderIdentity::plan(plan))
        .with_overage(Overage {
            used: data.usage,
            limit,
            currency: "USD".to_string(),
            is_enabled: data.limit.is_some(),
        });
    Ok(snapshot)
}

struct OpenRouterApiKeyStrategy;

impl OpenRouterApiKeyStrategy {
    fn key(ctx: &FetchContext) -> Option<String> {
        super::api_key_from(ctx, PROVIDER_ID, &[API_KEY_ENV])
    }
}

#[async_trait]
impl FetchStrategy for OpenRouterApiKeyStrategy {
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
            .map_or_else(|| USAGE_URL.to_string(), |base| format!("{base}/api/v1/key"));
        let request = ctx.http.get(url).bearer_auth(key);

        match crate::core::http::send_json::<KeyResponse>(PROVIDER_ID, request).await {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_limited_key() {
        let response: KeyResponse = serde_json::from_value(serde_json::json!({
            "data": {"usage": 2.5, "limit": 10.0, "is_free_tier": false}
        }))
        .unwrap();

        let snapshot = parse_usage(&response, Utc::now()).unwrap();
        assert_eq!(snapshot.periods[0].utilization, 25);
        assert_eq!(snapshot.plan(), Some("paid"));

        let overage = snapshot.overage.unwrap();
        assert!(overage.is_enabled);
        assert!((overage.limit - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unlimited_key_reads_as_zero_utilization() {
        let response: KeyResponse = serde_json::from_value(serde_json::json!({
            "data": {"usage": 42.0, "is_free_tier": true}
        }))
        .unwrap();

        let snapshot = parse_usage(&response, Utc::now()).unwrap();
        assert_eq!(snapshot.periods[0].utilization, 0);
        assert_eq!(snapshot.plan(), Some("free"));
        assert!(!snapshot.overage.unwrap().is_enabled);
    }

    #[test]
    fn missing_data_is_empty_usage() {
        let response: KeyResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(parse_usage(&response, Utc::now()).is_err());
    }
}
