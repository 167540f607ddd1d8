//! Provider ranking by remaining headroom.
//!
//! Given the per-provider snapshots from a fetch cycle, the router picks a
//! representative usage period per provider, converts it to headroom,
//! applies the model's cost multiplier, and emits a deterministic best-first
//! ordering. Two modes: rank the providers of a single model, or rank every
//! (model, provider) pair of a user-defined role.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::models::{PeriodType, UsagePeriod, UsageSnapshot};
use super::registry::ModelRegistry;
use crate::storage::config::Role;

/// Divisor floor applied to multipliers so cheap models are rewarded without
/// dividing by zero.
pub const MULTIPLIER_EPSILON: f64 = 0.25;

/// Effective headroom assigned to free models (multiplier 0) so they always
/// outrank paid ones.
pub const FREE_EFFECTIVE_HEADROOM: f64 = 10_000.0;

// =============================================================================
// Inputs & Outputs
// =============================================================================

/// Per-provider snapshot input to ranking.
#[derive(Debug, Clone)]
pub struct ProviderData {
    pub snapshot: UsageSnapshot,
    pub cached: bool,
}

/// One ranked provider (optionally qualified by a model, in role mode).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Candidate {
    pub provider_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    pub utilization: u8,
    pub headroom: u8,
    pub effective_headroom: f64,
    pub period_type: PeriodType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,

    pub cached: bool,
}

/// Stable JSON contract for `recommend`.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub model_id: String,
    pub model_name: String,
    pub candidates: Vec<Candidate>,
    pub unavailable: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub best: Option<Candidate>,
}

impl Recommendation {
    /// Assemble from ranked candidates; `best` is the head of the list.
    #[must_use]
    pub fn new(
        model_id: String,
        model_name: String,
        candidates: Vec<Candidate>,
        unavailable: Vec<String>,
    ) -> Self {
        let best = candidates.first().cloned();
        Self {
            model_id,
            model_name,
            candidates,
            unavailable,
            best,
        }
    }
}

/// One model of a resolved role.
#[derive(Debug, Clone)]
pub struct RoleModelEntry {
    pub model_id: String,
    pub model_name: String,
    pub provider_ids: Vec<String>,
}

// =============================================================================
// Representative Period
// =============================================================================

/// The period that stands for a snapshot when ranking: the highest
/// utilization among non-expired periods. When every period has expired the
/// selection falls back to all periods rather than dropping the provider.
#[must_use]
pub fn representative_period(periods: &[UsagePeriod], now: DateTime<Utc>) -> Option<&UsagePeriod> {
    let live = periods
        .iter()
        .filter(|p| !p.is_expired(now))
        .max_by_key(|p| p.utilization);
    live.or_else(|| periods.iter().max_by_key(|p| p.utilization))
}

// =============================================================================
// Ranking
// =============================================================================

/// Rank the configured providers of one model.
///
/// Providers without a snapshot land in `unavailable`.
#[must_use]
pub fn rank(
    configured: &[String],
    data: &HashMap<String, ProviderData>,
    multipliers: &HashMap<String, Option<f64>>,
    now: DateTime<Utc>,
) -> (Vec<Candidate>, Vec<String>) {
    let mut candidates = Vec::new();
    let mut unavailable = Vec::new();

    for provider_id in configured {
        let Some(provider_data) = data.get(provider_id) else {
            unavailable.push(provider_id.clone());
            continue;
        };
        let multiplier = multipliers.get(provider_id).copied().flatten();
        match candidate_for(provider_id, provider_data, multiplier, None, now) {
            Some(candidate) => candidates.push(candidate),
            None => unavailable.push(provider_id.clone()),
        }
    }

    sort_candidates(&mut candidates);
    (candidates, unavailable)
}

/// Rank every (model, provider) pair of a role.
///
/// `multiplier_fn` maps (provider id, model id) to a cost multiplier.
#[must_use]
pub fn rank_by_role(
    entries: &[RoleModelEntry],
    data: &HashMap<String, ProviderData>,
    multiplier_fn: impl Fn(&str, &str) -> Option<f64>,
    now: DateTime<Utc>,
) -> (Vec<Candidate>, Vec<String>) {
    let mut candidates = Vec::new();
    let mut unavailable = Vec::new();

    for entry in entries {
        for provider_id in &entry.provider_ids {
            let Some(provider_data) = data.get(provider_id) else {
                let tag = format!("{provider_id} ({})", entry.model_id);
                if !unavailable.contains(&tag) {
                    unavailable.push(tag);
                }
                continue;
            };
            let multiplier = multiplier_fn(provider_id, &entry.model_id);
            if let Some(candidate) =
                candidate_for(provider_id, provider_data, multiplier, Some(entry), now)
            {
                candidates.push(candidate);
            }
        }
    }

    sort_candidates(&mut candidates);
    (candidates, unavailable)
}

/// Resolve a role's configured model prefixes against the registry.
///
/// Each prefix expands through `match_prefix` (shortest id preferred) with a
/// plain lookup as the fallback; prefixes resolving nowhere are dropped.
#[must_use]
pub fn resolve_role(role: &Role, registry: &ModelRegistry) -> Vec<RoleModelEntry> {
    role.models
        .iter()
        .filter_map(|prefix| {
            let info = registry
                .match_prefix(prefix)
                .into_iter()
                .next()
                .or_else(|| registry.lookup(prefix))?;
            Some(RoleModelEntry {
                model_id: info.id.clone(),
                model_name: info.name.clone(),
                provider_ids: info.providers.clone(),
            })
        })
        .collect()
}

// =============================================================================
// Internals
// =============================================================================

fn candidate_for(
    provider_id: &str,
    data: &ProviderData,
    multiplier: Option<f64>,
    model: Option<&RoleModelEntry>,
    now: DateTime<Utc>,
) -> Option<Candidate> {
    let period = representative_period(&data.snapshot.periods, now)?;
    let headroom = period.headroom();

    Some(Candidate {
        provider_id: provider_id.to_string(),
        model_id: model.map(|m| m.model_id.clone()),
        model_name: model.map(|m| m.model_name.clone()),
        utilization: period.utilization,
        headroom,
        effective_headroom: effective_headroom(headroom, multiplier),
        period_type: period.period_type,
        resets_at: period.resets_at,
        plan: data.snapshot.plan().map(ToString::to_string),
        multiplier,
        cached: data.cached,
    })
}

/// Headroom adjusted by the model's cost multiplier.
#[must_use]
pub fn effective_headroom(headroom: u8, multiplier: Option<f64>) -> f64 {
    match multiplier {
        None => f64::from(headroom),
        Some(m) if m == 0.0 => FREE_EFFECTIVE_HEADROOM,
        Some(m) => f64::from(headroom) / m.max(MULTIPLIER_EPSILON),
    }
}

/// Total order: effective headroom descending, then reset time ascending
/// (`None` after any concrete time), then provider id, then model id.
fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.effective_headroom
            .partial_cmp(&a.effective_headroom)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| match (a.resets_at, b.resets_at) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then_with(|| a.provider_id.cmp(&b.provider_id))
            .then_with(|| a.model_id.cmp(&b.model_id))
    });
}
