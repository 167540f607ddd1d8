//! Antigravity provider.
//!
//! API-key access only. The usage endpoint reports a list of labeled
//! windows, each with its own reset.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::models::{PeriodType, UsagePeriod, UsageSnapshot, utilization_from_counts};
use crate::core::provider::{AuthFlow, CredentialSources, Provider, ProviderMeta};
use crate::core::strategy::{FetchContext, FetchResult, FetchStrategy};
use crate::error::{ErrorKind, VibeusageError};

const PROVIDER_ID: &str = "antigravity";
const USAGE_URL: &str = "https://api.antigravity.google/v1/usage";
const API_KEY_ENV: &str = "ANTIGRAVITY_API_KEY";

pub struct AntigravityProvider {
    meta: ProviderMeta,
}

impl AntigravityProvider {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            meta: ProviderMeta {
                id: PROVIDER_ID,
                name: "Antigravity",
                description: "Antigravity editor usage",
                homepage: "https://antigravity.google",
                status_url: None,
                dashboard_url: None,
                record_unavailable: false,
            },
        }
    }
}

impl Default for AntigravityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for AntigravityProvider {
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
        vec![Arc::new(AntigravityApiKeyStrategy)]
    }

    fn auth(&self) -> Option<AuthFlow> {
        Some(AuthFlow::ManualKey {
            env_var: API_KEY_ENV,
            help: "Create a key in the Antigravity editor settings",
        })
    }
}

#[derive(Debug, Deserialize)]
struct UsageResponse {
    #[serde(default)]
    windows: Vec<Window>,
}

#[derive(Debug, Deserialize)]
struct Window {
    label: String,
    used: f64,
    limit: f64,
    #[serde(default)]
    resets_at: Option<DateTime<Utc>>,
}

fn period_type_for(label: &str) -> PeriodType {
    match label {
        l if l.contains("daily") => PeriodType::Daily,
        l if l.contains("month") => PeriodType::Monthly,
        l if l.contains("session") => PeriodType::Session,
        _ => PeriodType::Weekly,
    }
}

fn parse_usage(response: UsageResponse, now: DateTime<Utc>) -> UsageSnapshot {
    let periods = response
        .windows
        .iter()
        .map(|w| {
            let mut period = UsagePeriod::new(
                w.label.clone(),
                period_type_for(&w.label.to_lowercase()),
                utilization_from_counts(w.used, w.limit).into(),
            );
            period.resets_at = w.resets_at;
            period
        })
        .collect();
    UsageSnapshot::new(PROVIDER_ID, now, periods)
}

struct AntigravityApiKeyStrategy;

impl AntigravityApiKeyStrategy {
    fn key(ctx: &FetchContext) -> Option<String> {
        super::api_key_from(ctx, PROVIDER_ID, &[API_KEY_ENV])
    }
}

#[async_trait]
impl FetchStrategy for AntigravityApiKeyStrategy {
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
            .map_or_else(|| USAGE_URL.to_string(), |base| format!("{base}/v1/usage"));
        let request = ctx.http.get(url).bearer_auth(key);

        match crate::core::http::send_json::<UsageResponse>(PROVIDER_ID, request).await {
            Ok(response) => FetchResult::success(parse_usage(response, ctx.clock.now())),
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
    fn parse_labeled_windows() {
        let response: UsageResponse = serde_json::from_value(serde_json::json!({
            "windows": [
                {"label": "Daily prompts", "used": 40.0, "limit": 80.0, "resets_at": "2026-08-02T00:00:00Z"},
                {"label": "Weekly flow actions", "used": 10.0, "limit": 1000.0}
            ]
        }))
        .unwrap();

        let snapshot = parse_usage(response, Utc::now());
        assert_eq!(snapshot.periods.len(), 2);
        assert_eq!(snapshot.periods[0].period_type, PeriodType::Daily);
        assert_eq!(snapshot.periods[0].utilization, 50);
        assert_eq!(snapshot.periods[1].period_type, PeriodType::Weekly);
        assert_eq!(snapshot.periods[1].utilization, 1);
    }

    #[test]
    fn zero_limit_window_reads_as_empty() {
        let response: UsageResponse = serde_json::from_value(serde_json::json!({
            "windows": [{"label": "daily", "used": 7.0, "limit": 0.0}]
        }))
        .unwrap();
        let snapshot = parse_usage(response, Utc::now());
        assert_eq!(snapshot.periods[0].utilization, 0);
    }
}
