//! Cursor provider.
//!
//! Authenticates with the web session token. The usage endpoint predates
//! Cursor's API cleanup: request counters are keyed by model family and the
//! billing-cycle end has shipped both as RFC3339 text and as unix
//! milliseconds, so the decoder accepts either.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use super::session_token_from;
use crate::core::models::{PeriodType, ProviderIdentity, UsagePeriod, UsageSnapshot, utilization_from_counts};
use crate::core::provider::{AuthFlow, CredentialSources, Provider, ProviderMeta};
use crate::core::status::{StatusProbe, StatuspageProbe};
use crate::core::strategy::{FetchContext, FetchResult, FetchStrategy};
use crate::error::{ErrorKind, VibeusageError};

const PROVIDER_ID: &str = "cursor";
const USAGE_URL: &str = "https://cursor.com/api/usage";
const STATUS_URL: &str = "https://status.cursor.com/api/v2/status.json";

// =============================================================================
// Provider
// =============================================================================

pub struct CursorProvider {
    meta: ProviderMeta,
}

impl CursorProvider {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            meta: ProviderMeta {
                id: PROVIDER_ID,
                name: "Cursor",
                description: "Cursor subscription usage",
                homepage: "https://cursor.com",
                status_url: Some("https://status.cursor.com"),
                dashboard_url: Some("https://cursor.com/settings"),
                record_unavailable: false,
            },
        }
    }
}

impl Default for CursorProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for CursorProvider {
    fn meta(&self) -> &ProviderMeta {
        &self.meta
    }

    fn credential_sources(&self) -> CredentialSources {
        CredentialSources::default()
    }

    fn strategies(&self) -> Vec<Arc<dyn FetchStrategy>> {
        vec![Arc::new(CursorSessionStrategy)]
    }

    fn status_probe(&self) -> Option<Box<dyn StatusProbe>> {
        Some(Box::new(StatuspageProbe::new(STATUS_URL)))
    }

    fn auth(&self) -> Option<AuthFlow> {
        Some(AuthFlow::Custom {
            instructions: "Copy the WorkosCursorSessionToken cookie from a signed-in browser \
                           and store it with `vibeusage auth login cursor --session <token>`.",
        })
    }
}

// =============================================================================
// Usage response
// =============================================================================

/// Billing-cycle end: RFC3339 in current responses, unix milliseconds in
/// older ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BillingCycleEnd {
    Rfc3339(String),
    UnixMillis(i64),
}

impl BillingCycleEnd {
    fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Rfc3339(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            Self::UnixMillis(ms) => Utc.timestamp_millis_opt(*ms).single(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UsageResponse {
    #[serde(rename = "gpt-4", default)]
    premium: Option<ModelUsage>,
    #[serde(rename = "gpt-3.5-turbo", default)]
    basic: Option<ModelUsage>,
    #[serde(rename = "billingCycleEnd", default)]
    billing_cycle_end: Option<BillingCycleEnd>,
    #[serde(rename = "membershipType", default)]
    membership_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelUsage {
    #[serde(rename = "numRequests", default)]
    num_requests: f64,
    #[serde(rename = "maxRequestUsage", default)]
    max_request_usage: Option<f64>,
}

fn parse_usage(response: UsageResponse, now: DateTime<Utc>) -> UsageSnapshot {
    let resets_at = response.billing_cycle_end.as_ref().and_then(BillingCycleEnd::to_datetime);
    let mut periods = Vec::new();

    let mut push = |usage: &Option<ModelUsage>, name: &str| {
        let Some(usage) = usage else { return };
        // Unmetered tiers report no request ceiling.
        let Some(limit) = usage.max_request_usage else {
            return;
        };
        let mut period = UsagePeriod::new(
            name,
            PeriodType::Monthly,
            utilization_from_counts(usage.num_requests, limit).into(),
        );
        period.resets_at = resets_at;
        periods.push(period);
    };

    push(&response.premium, "premium requests");
    push(&response.basic, "basic requests");

    let mut snapshot = UsageSnapshot::new(PROVIDER_ID, now, periods);
    if let Some(plan) = response.membership_type {
        snapshot = snapshot.with_identity(ProviderIdentity::plan(plan));
    }
    snapshot
}

// =============================================================================
// Session strategy
// =============================================================================

struct CursorSessionStrategy;

#[async_trait]
impl FetchStrategy for CursorSessionStrategy {
    fn name(&self) -> &'static str {
        "web"
    }

    fn is_available(&self, ctx: &FetchContext) -> bool {
        session_token_from(ctx, PROVIDER_ID).is_some()
    }

    async fn fetch(&self, ctx: &FetchContext) -> FetchResult {
        let Some(token) = session_token_from(ctx, PROVIDER_ID) else {
            return FetchResult::from_error(VibeusageError::NotConfigured {
                provider: PROVIDER_ID.to_string(),
            });
        };

        let url = ctx
            .config
            .api_base(PROVIDER_ID)
            .map_or_else(|| USAGE_URL.to_string(), |base| format!("{base}/api/usage"));

        let request = ctx
            .http
            .get(url)
            .header("Cookie", format!("WorkosCursorSessionToken={token}"));

        match crate::core::http::send_json::<UsageResponse>(PROVIDER_ID, request).await {
            Ok(response) => FetchResult::success(parse_usage(response, ctx.clock.now())),
            // A dead browser session cannot be refreshed from here.
            Err(e) if e.kind() == ErrorKind::AuthExpired => {
                FetchResult::fatal(VibeusageError::AuthFailed {
                    provider: PROVIDER_ID.to_string(),
                    reason: "session token expired".to_string(),
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
    fn parse_usage_with_rfc3339_cycle_end() {
        let response: UsageResponse = serde_json::from_value(serde_json::json!({
            "gpt-4": {"numRequests": 120.0, "maxRequestUsage": 500.0},
            "billingCycleEnd": "2026-08-15T00:00:00Z",
            "membershipType": "pro"
        }))
        .unwrap();

        let snapshot = parse_usage(response, Utc::now());
        assert_eq!(snapshot.periods.len(), 1);
        assert_eq!(snapshot.periods[0].utilization, 24);
        assert_eq!(
            snapshot.periods[0].resets_at.unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 15, 0, 0, 0).unwrap()
        );
        assert_eq!(snapshot.plan(), Some("pro"));
    }

    #[test]
    fn parse_usage_with_unix_millis_cycle_end() {
        let response: UsageResponse = serde_json::from_value(serde_json::json!({
            "gpt-4": {"numRequests": 500.0, "maxRequestUsage": 500.0},
            "billingCycleEnd": 1767225600000_i64
        }))
        .unwrap();

        let snapshot = parse_usage(response, Utc::now());
        assert_eq!(snapshot.periods[0].utilization, 100);
        assert_eq!(
            snapshot.periods[0].resets_at.unwrap(),
            Utc.timestamp_opt(1_767_225_600, 0).unwrap()
        );
    }

    #[test]
    fn unmetered_tier_is_skipped() {
        let response: UsageResponse = serde_json::from_value(serde_json::json!({
            "gpt-4": {"numRequests": 9000.0}
        }))
        .unwrap();
        assert!(parse_usage(response, Utc::now()).periods.is_empty());
    }

    #[test]
    fn garbled_cycle_end_is_dropped_not_fatal() {
        let response: UsageResponse = serde_json::from_value(serde_json::json!({
            "gpt-4": {"numRequests": 10.0, "maxRequestUsage": 100.0},
            "billingCycleEnd": "soon"
        }))
        .unwrap();
        let snapshot = parse_usage(response, Utc::now());
        assert_eq!(snapshot.periods[0].utilization, 10);
        assert!(snapshot.periods[0].resets_at.is_none());
    }
}
