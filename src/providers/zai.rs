//! Z.ai provider.
//!
//! The subscription quota endpoint returns a list of named quota buckets;
//! each becomes its own period.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::models::{PeriodType, UsagePeriod, UsageSnapshot, utilization_from_counts};
use crate::core::provider::{AuthFlow, CredentialSources, Provider, ProviderMeta};
use crate::core::status::{StatusProbe, StatuspageProbe};
use crate::core::strategy::{FetchContext, FetchResult, FetchStrategy};
use crate::error::{ErrorKind, VibeusageError};

const PROVIDER_ID: &str = "zai";
const USAGE_URL: &str = "https://api.z.ai/api/biz/subscription/quota";
const STATUS_URL: &str = "https://status.z.ai/api/v2/status.json";
const API_KEY_ENVS: [&str; 2] = ["ZAI_API_KEY", "Z_AI_API_KEY"];

pub struct ZaiProvider {
    meta: ProviderMeta,
}

impl ZaiProvider {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            meta: ProviderMeta {
                id: PROVIDER_ID,
                name: "z.ai",
                description: "Z.ai coding plan quota",
                homepage: "https://z.ai",
                status_url: Some("https://status.z.ai"),
                dashboard_url: Some("https://z.ai/manage-apikey/subscription"),
                record_unavailable: false,
            },
        }
    }
}

impl Default for ZaiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for ZaiProvider {
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
        vec![Arc::new(ZaiApiKeyStrategy)]
    }

    fn status_probe(&self) -> Option<Box<dyn StatusProbe>> {
        Some(Box::new(StatuspageProbe::new(STATUS_URL)))
    }

    fn auth(&self) -> Option<AuthFlow> {
        Some(AuthFlow::ManualKey {
            env_var: "ZAI_API_KEY",
            help: "Create a key at https://z.ai/manage-apikey/apikey-list",
        })
    }
}

#[derive(Debug, Deserialize)]
struct QuotaResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<QuotaData>,
}

#[derive(Debug, Deserialize)]
struct QuotaData {
    #[serde(default)]
    list: Vec<QuotaBucket>,
}

#[derive(Debug, Deserialize)]
struct QuotaBucket {
    name: String,
    used: f64,
    total: f64,
    #[serde(default)]
    refresh_time: Option<DateTime<Utc>>,
}

fn period_type_for(name: &str) -> PeriodType {
    let lower = name.to_lowercase();
    if lower.contains("5h") || lower.contains("session") {
        PeriodType::Session
    } else if lower.contains("day") || lower.contains("daily") {
        PeriodType::Daily
    } else if lower.contains("month") {
        PeriodType::Monthly
    } else {
        PeriodType::Weekly
    }
}

fn parse_usage(response: &QuotaResponse, now: DateTime<Utc>) -> Result<UsageSnapshot, VibeusageError> {
    if !response.success {
        return Err(VibeusageError::ParseResponse(
            "z.ai quota response unsuccessful".to_string(),
        ));
    }

    let periods = response
        .data
        .as_ref()
        .map(|data| {
            data.list
                .iter()
                .map(|bucket| {
                    let mut period = UsagePeriod::new(
                        bucket.name.clone(),
                        period_type_for(&bucket.name),
                        utilization_from_counts(bucket.used, bucket.total).into(),
                    );
                    period.resets_at = bucket.refresh_time;
                    period
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(UsageSnapshot::new(PROVIDER_ID, now, periods))
}

struct ZaiApiKeyStrategy;

impl ZaiApiKeyStrategy {
    fn key(ctx: &FetchContext) -> Option<String> {
        super::api_key_from(ctx, PROVIDER_ID, &API_KEY_ENVS)
    }
}

#[async_trait]
impl FetchStrategy for ZaiApiKeyStrategy {
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

        let url = ctx.config.api_base(PROVIDER_ID).map_or_else(
            || USAGE_URL.to_string(),
            |base| format!("{base}/api/biz/subscription/quota"),
        );
        let request = ctx.http.get(url).bearer_auth(key);

        match crate::core::http::send_json::<QuotaResponse>(PROVIDER_ID, request).await {
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
