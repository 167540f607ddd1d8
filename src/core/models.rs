//! Core data models.
//!
//! The canonical usage record is [`UsageSnapshot`]: one sampled view of a
//! provider's quota at a point in time, made of bucketed [`UsagePeriod`]s.
//! Everything downstream (cache, router, JSON output) consumes these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Usage Periods
// =============================================================================

/// Bucketing of a usage window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    /// Short rolling window (5 hours or less).
    Session,
    Daily,
    Weekly,
    Monthly,
}

impl PeriodType {
    /// Label used in human output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

/// One bucketed usage window inside a snapshot.
///
/// `utilization` is an integer percentage of the window's quota consumed,
/// always clamped to `0..=100` at construction. A snapshot may carry several
/// periods of the same type (e.g. a weekly overall plus a weekly per-model
/// window).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsagePeriod {
    pub name: String,
    pub period_type: PeriodType,
    pub utilization: u8,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl UsagePeriod {
    /// Create a period, clamping utilization into `0..=100`.
    #[must_use]
    pub fn new(name: impl Into<String>, period_type: PeriodType, utilization: i64) -> Self {
        Self {
            name: name.into(),
            period_type,
            utilization: clamp_utilization(utilization),
            resets_at: None,
            model: None,
        }
    }

    /// Attach a reset instant.
    #[must_use]
    pub const fn with_reset(mut self, resets_at: DateTime<Utc>) -> Self {
        self.resets_at = Some(resets_at);
        self
    }

    /// Attach a model the window applies to.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Whether this window has already reset relative to `now`.
    ///
    /// A window without a reset instant never expires.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.resets_at.is_some_and(|t| t <= now)
    }

    /// Percentage of the window still available.
    #[must_use]
    pub const fn headroom(&self) -> u8 {
        100 - self.utilization
    }
}

/// Clamp an integer percentage into `0..=100`.
#[must_use]
pub fn clamp_utilization(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

/// Compute a clamped utilization percentage from used/limit counts.
///
/// `limit <= 0` yields 0 rather than dividing by zero; `used > limit` clamps
/// to 100 and negative inputs clamp to 0.
#[must_use]
pub fn utilization_from_counts(used: f64, limit: f64) -> u8 {
    if limit <= 0.0 {
        return 0;
    }
    let percent = (used / limit * 100.0).round() as i64;
    clamp_utilization(percent)
}

// =============================================================================
// Overage & Identity
// =============================================================================

/// Pay-as-you-go overage state for providers that report it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Overage {
    pub used: f64,
    pub limit: f64,
    pub currency: String,
    pub is_enabled: bool,
}

/// Account identity attached to a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
}

impl ProviderIdentity {
    /// Identity with just a plan name.
    #[must_use]
    pub fn plan(plan: impl Into<String>) -> Self {
        Self {
            email: None,
            plan: Some(plan.into()),
        }
    }
}

// =============================================================================
// Usage Snapshot
// =============================================================================

/// One sampled usage record for a provider at a point in time.
///
/// `fetched_at` is stamped by the producer's clock, never taken from network
/// input. `source` names the strategy that produced the record (`oauth`,
/// `api_key`, `web`, `cli`, or `cache` when served from disk).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageSnapshot {
    pub provider: String,
    pub fetched_at: DateTime<Utc>,
    pub source: String,
    pub periods: Vec<UsagePeriod>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub overage: Option<Overage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<ProviderIdentity>,
}

impl UsageSnapshot {
    /// Create a snapshot stamped with the given production time.
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        fetched_at: DateTime<Utc>,
        periods: Vec<UsagePeriod>,
    ) -> Self {
        Self {
            provider: provider.into(),
            fetched_at,
            source: String::new(),
            periods,
            overage: None,
            identity: None,
        }
    }

    /// Attach account identity.
    #[must_use]
    pub fn with_identity(mut self, identity: ProviderIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Attach overage state.
    #[must_use]
    pub fn with_overage(mut self, overage: Overage) -> Self {
        self.overage = Some(overage);
        self
    }

    /// Age of this snapshot relative to `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.fetched_at
    }

    /// Plan name from identity, if present.
    #[must_use]
    pub fn plan(&self) -> Option<&str> {
        self.identity.as_ref().and_then(|i| i.plan.as_deref())
    }
}

// =============================================================================
// Tests
// =============================================================================
