//! Fetch strategies and their outcome records.
//!
//! A strategy is one way to authenticate and fetch usage for a provider
//! (API key, OAuth, web session, CLI-credential reuse). Strategies classify
//! their own failures so the pipeline executor only has to decide "next
//! strategy or stop".

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::clock::Clock;
use super::models::UsageSnapshot;
use crate::error::VibeusageError;
use crate::storage::{CredentialStore, SnapshotCache, config::Config, paths::AppPaths};

// =============================================================================
// Fetch Context
// =============================================================================

/// Everything a strategy needs at fetch time.
///
/// Cheap to clone; one context is shared across a whole fetch cycle.
#[derive(Clone)]
pub struct FetchContext {
    pub http: reqwest::Client,
    pub creds: CredentialStore,
    pub cache: SnapshotCache,
    pub paths: AppPaths,
    pub clock: Arc<dyn Clock>,
    pub cancel: CancellationToken,
    pub config: Arc<Config>,
}

impl FetchContext {
    /// Whether sibling CLI credential files may be read.
    #[must_use]
    pub fn reuse_cli_credentials(&self) -> bool {
        self.config.credentials.reuse_provider_credentials
    }
}

// =============================================================================
// Fetch Result
// =============================================================================

/// What a single strategy attempt produced.
#[derive(Debug)]
pub enum FetchResult {
    /// A usable snapshot.
    Success(UsageSnapshot),
    /// A classified failure. `should_fallback` tells the executor whether to
    /// try the next strategy (`true`) or stop the chain (`false`).
    Failure {
        error: VibeusageError,
        should_fallback: bool,
    },
}

impl FetchResult {
    /// Successful fetch.
    #[must_use]
    pub const fn success(snapshot: UsageSnapshot) -> Self {
        Self::Success(snapshot)
    }

    /// Failure classified from the error's own taxonomy.
    #[must_use]
    pub fn from_error(error: VibeusageError) -> Self {
        let should_fallback = error.should_fallback();
        Self::Failure {
            error,
            should_fallback,
        }
    }

    /// Recoverable failure; the executor moves on.
    #[must_use]
    pub const fn recoverable(error: VibeusageError) -> Self {
        Self::Failure {
            error,
            should_fallback: true,
        }
    }

    /// Fatal failure; the executor stops the chain.
    #[must_use]
    pub const fn fatal(error: VibeusageError) -> Self {
        Self::Failure {
            error,
            should_fallback: false,
        }
    }

    /// Whether this result is a success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

// =============================================================================
// Strategy Trait
// =============================================================================

/// One way to authenticate and fetch usage for a provider.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Source tag for this strategy (`api_key`, `oauth`, `web`, `cli`).
    /// Stamped onto snapshots and outcomes it produces.
    fn name(&self) -> &'static str;

    /// Whether the credentials this strategy needs are present.
    ///
    /// Must check files, env vars, or keychain entries only; never the
    /// network.
    fn is_available(&self, ctx: &FetchContext) -> bool;

    /// Perform the fetch.
    async fn fetch(&self, ctx: &FetchContext) -> FetchResult;
}

// =============================================================================
// Attempt & Outcome Records
// =============================================================================

/// Audit record of a single strategy attempt.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FetchAttempt {
    pub strategy: String,
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration_ms: u64,
}

impl FetchAttempt {
    /// Record a failed attempt.
    #[must_use]
    pub fn failure(strategy: &str, error: &VibeusageError, duration_ms: u64) -> Self {
        Self {
            strategy: strategy.to_string(),
            success: false,
            error: Some(error.to_string()),
            duration_ms,
        }
    }

    /// Record a strategy skipped for missing credentials.
    #[must_use]
    pub fn not_configured(strategy: &str) -> Self {
        Self {
            strategy: strategy.to_string(),
            success: false,
            error: Some("not configured".to_string()),
            duration_ms: 0,
        }
    }

    /// Whether this attempt reached the network (as opposed to being skipped
    /// before any credentials were found).
    #[must_use]
    pub fn was_attempted(&self) -> bool {
        self.error.as_deref() != Some("not configured")
    }
}

/// Result of running a provider's full strategy pipeline.
#[derive(Debug, Serialize)]
pub struct FetchOutcome {
    pub provider_id: String,
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<UsageSnapshot>,

    pub source: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<FetchAttempt>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub cached: bool,
    pub fatal: bool,
}

impl FetchOutcome {
    /// Outcome for a live fetch that succeeded.
    #[must_use]
    pub fn success(
        provider_id: &str,
        snapshot: UsageSnapshot,
        source: &str,
        attempts: Vec<FetchAttempt>,
    ) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            success: true,
            snapshot: Some(snapshot),
            source: source.to_string(),
            attempts,
            error: None,
            cached: false,
            fatal: false,
        }
    }

    /// Outcome served from the snapshot cache after live strategies failed.
    #[must_use]
    pub fn from_cache(provider_id: &str, snapshot: UsageSnapshot, attempts: Vec<FetchAttempt>) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            success: true,
            snapshot: Some(snapshot),
            source: "cache".to_string(),
            attempts,
            error: None,
            cached: true,
            fatal: false,
        }
    }

    /// Failed outcome.
    #[must_use]
    pub fn failure(
        provider_id: &str,
        error: &VibeusageError,
        attempts: Vec<FetchAttempt>,
        fatal: bool,
    ) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            success: false,
            snapshot: None,
            source: String::new(),
            attempts,
            error: Some(error.to_string()),
            cached: false,
            fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_error_follows_taxonomy() {
        let recoverable = FetchResult::from_error(VibeusageError::Network("x".to_string()));
        assert!(matches!(
            recoverable,
            FetchResult::Failure {
                should_fallback: true,
                ..
            }
        ));

        let fatal = FetchResult::from_error(VibeusageError::AuthFailed {
            provider: "claude".to_string(),
            reason: "revoked".to_string(),
        });
        assert!(matches!(
            fatal,
            FetchResult::Failure {
                should_fallback: false,
                ..
            }
        ));
    }

    #[test]
    fn not_configured_attempts_are_not_network_attempts() {
        let skipped = FetchAttempt::not_configured("oauth");
        assert!(!skipped.was_attempted());

        let failed = FetchAttempt::failure("oauth", &VibeusageError::Network("x".to_string()), 12);
        assert!(failed.was_attempted());
    }

    #[test]
    fn outcome_invariants() {
        use crate::core::models::{PeriodType, UsagePeriod, UsageSnapshot};
        use chrono::Utc;

        let snapshot = UsageSnapshot::new(
            "claude",
            Utc::now(),
            vec![UsagePeriod::new("weekly", PeriodType::Weekly, 10)],
        );

        let ok = FetchOutcome::success("claude", snapshot.clone(), "oauth", vec![]);
        assert!(ok.success && ok.snapshot.is_some() && ok.error.is_none());
        assert!(!ok.cached);

        let cached = FetchOutcome::from_cache("claude", snapshot, vec![]);
        assert!(cached.cached);
        assert_eq!(cached.source, "cache");

        let failed = FetchOutcome::failure(
            "claude",
            &VibeusageError::Network("x".to_string()),
            vec![],
            false,
        );
        assert!(!failed.success && failed.snapshot.is_none());
    }

    #[test]
    fn outcome_json_omits_empty_fields() {
        let failed = FetchOutcome::failure(
            "claude",
            &VibeusageError::Network("boom".to_string()),
            vec![],
            false,
        );
        let json = serde_json::to_string(&failed).unwrap();
        assert!(!json.contains("snapshot"));
        assert!(!json.contains("attempts"));
        assert!(json.contains("\"error\":\"network error: boom\""));
    }
}
