//! Fetch pipeline executor.
//!
//! Runs a provider's strategies in order with a per-attempt wall-clock
//! timeout, honors cancellation, stops on fatal errors, and falls back to
//! the snapshot cache when every live strategy fails. The cache policy
//! distinguishes "service down" (some strategy reached the network: serve
//! whatever is cached) from "no credentials at all" (serve cache only while
//! it is fresh).
//!
//! The executor is deterministic: no hidden retries, no background work
//! after return.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::sleep;

use super::strategy::{FetchAttempt, FetchContext, FetchOutcome, FetchResult, FetchStrategy};
use crate::error::VibeusageError;

/// Per-provider knobs for one executor run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Per-strategy wall-clock timeout.
    pub timeout: std::time::Duration,
    /// Cached snapshots older than this are not served when no strategy was
    /// attempted.
    pub stale_threshold: chrono::Duration,
    /// Whether to serve the cache at all.
    pub use_cache: bool,
    /// Whether skipped strategies produce "not configured" attempt records.
    pub record_unavailable: bool,
}

impl PipelineOptions {
    /// Options derived from config for a provider.
    #[must_use]
    pub fn from_config(
        config: &crate::storage::Config,
        use_cache: bool,
        record_unavailable: bool,
    ) -> Self {
        Self {
            timeout: config.fetch.timeout_duration(),
            stale_threshold: config.fetch.stale_threshold(),
            use_cache,
            record_unavailable,
        }
    }
}

/// Execute the fetch pipeline for one provider.
pub async fn execute(
    provider_id: &str,
    strategies: &[Arc<dyn FetchStrategy>],
    ctx: &FetchContext,
    options: &PipelineOptions,
) -> FetchOutcome {
    let mut attempts: Vec<FetchAttempt> = Vec::new();
    let mut any_attempted = false;
    let mut last_error: Option<VibeusageError> = None;

    for strategy in strategies {
        if !strategy.is_available(ctx) {
            tracing::debug!(
                provider = provider_id,
                strategy = strategy.name(),
                "strategy not available, skipping"
            );
            if options.record_unavailable {
                attempts.push(FetchAttempt::not_configured(strategy.name()));
            }
            continue;
        }

        tracing::info!(
            provider = provider_id,
            strategy = strategy.name(),
            "trying fetch strategy"
        );
        let start = Instant::now();

        let result = tokio::select! {
            () = ctx.cancel.cancelled() => {
                let error = VibeusageError::Cancelled;
                attempts.push(FetchAttempt::failure(
                    strategy.name(),
                    &error,
                    start.elapsed().as_millis() as u64,
                ));
                return FetchOutcome::failure(provider_id, &error, attempts, false);
            }
            () = sleep(options.timeout) => {
                any_attempted = true;
                let error = VibeusageError::FetchTimeout {
                    seconds: options.timeout.as_secs(),
                };
                attempts.push(FetchAttempt::failure(
                    strategy.name(),
                    &error,
                    start.elapsed().as_millis() as u64,
                ));
                tracing::warn!(
                    provider = provider_id,
                    strategy = strategy.name(),
                    "fetch timed out"
                );
                last_error = Some(error);
                continue;
            }
            result = strategy.fetch(ctx) => result,
        };

        any_attempted = true;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            FetchResult::Success(mut snapshot) => {
                if snapshot.periods.is_empty() {
                    // A snapshot without periods is never a success.
                    let error = VibeusageError::EmptyUsage {
                        provider: provider_id.to_string(),
                    };
                    attempts.push(FetchAttempt::failure(strategy.name(), &error, duration_ms));
                    last_error = Some(error);
                    continue;
                }

                snapshot.source = strategy.name().to_string();
                if let Err(e) = ctx.cache.save(&snapshot) {
                    tracing::warn!(provider = provider_id, error = %e, "failed to cache snapshot");
                }
                tracing::info!(
                    provider = provider_id,
                    strategy = strategy.name(),
                    duration_ms,
                    "fetch succeeded"
                );
                return FetchOutcome::success(provider_id, snapshot, strategy.name(), attempts);
            }
            FetchResult::Failure {
                error,
                should_fallback,
            } => {
                attempts.push(FetchAttempt::failure(strategy.name(), &error, duration_ms));
                tracing::warn!(
                    provider = provider_id,
                    strategy = strategy.name(),
                    error = %error,
                    "fetch failed"
                );
                if !should_fallback {
                    return FetchOutcome::failure(provider_id, &error, attempts, true);
                }
                last_error = Some(error);
            }
        }
    }

    // Live strategies are exhausted; consult the cache.
    if options.use_cache {
        if let Some(snapshot) = ctx.cache.load(provider_id) {
            let age = snapshot.age(ctx.clock.now());
            if any_attempted {
                // Service down: serve whatever we have, regardless of age.
                tracing::warn!(
                    provider = provider_id,
                    age_minutes = age.num_minutes(),
                    "serving cached snapshot after live fetch failure"
                );
                return FetchOutcome::from_cache(provider_id, snapshot, attempts);
            }
            if age < options.stale_threshold {
                // No credentials anywhere, but the cache is still fresh.
                return FetchOutcome::from_cache(provider_id, snapshot, attempts);
            }
            tracing::debug!(
                provider = provider_id,
                age_minutes = age.num_minutes(),
                "cached snapshot too stale to serve without credentials"
            );
        }
    }

    let error = last_error.unwrap_or_else(|| VibeusageError::NotConfigured {
        provider: provider_id.to_string(),
    });
    FetchOutcome::failure(provider_id, &error, attempts, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{PeriodType, UsagePeriod, UsageSnapshot};
    use crate::test_utils::{StubStrategy, test_context};

    fn options(use_cache: bool) -> PipelineOptions {
        PipelineOptions {
            timeout: std::time::Duration::from_secs(5),
            stale_threshold: chrono::Duration::minutes(60),
            use_cache,
            record_unavailable: false,
        }
    }

    fn snapshot(provider: &str, utilization: i64) -> UsageSnapshot {
        UsageSnapshot::new(
            provider,
            chrono::Utc::now(),
            vec![UsagePeriod::new("weekly", PeriodType::Weekly, utilization)],
        )
    }

    #[tokio::test]
    async fn success_stamps_source_and_caches() {
        let (ctx, _dir) = test_context();
        let strategies: Vec<Arc<dyn FetchStrategy>> =
            vec![Arc::new(StubStrategy::succeeding("oauth", snapshot("p", 42)))];

        let outcome = execute("p", &strategies, &ctx, &options(true)).await;

        assert!(outcome.success);
        assert_eq!(outcome.source, "oauth");
        assert!(!outcome.cached);
        let got = outcome.snapshot.as_ref().unwrap();
        assert_eq!(got.source, "oauth");
        assert_eq!(got.periods[0].utilization, 42);
        // Cache now holds the snapshot.
        assert_eq!(ctx.cache.load("p").unwrap(), *got);
    }

    #[tokio::test]
    async fn empty_snapshot_is_not_a_success() {
        let (ctx, _dir) = test_context();
        let empty = UsageSnapshot::new("p", chrono::Utc::now(), vec![]);
        let strategies: Vec<Arc<dyn FetchStrategy>> = vec![
            Arc::new(StubStrategy::succeeding("oauth", empty)),
            Arc::new(StubStrategy::succeeding("api_key", snapshot("p", 7))),
        ];

        let outcome = execute("p", &strategies, &ctx, &options(false)).await;
        assert!(outcome.success);
        assert_eq!(outcome.source, "api_key");
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.attempts[0].strategy, "oauth");
    }

    #[tokio::test]
    async fn unavailable_strategy_recorded_when_policy_says_so() {
        let (ctx, _dir) = test_context();
        let strategies: Vec<Arc<dyn FetchStrategy>> = vec![
            Arc::new(StubStrategy::unavailable("oauth")),
            Arc::new(StubStrategy::succeeding("api_key", snapshot("p", 7))),
        ];

        let mut opts = options(false);
        let outcome = execute("p", &strategies, &ctx, &opts).await;
        assert!(outcome.attempts.is_empty(), "elided by default");

        opts.record_unavailable = true;
        let outcome = execute("p", &strategies, &ctx, &opts).await;
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.attempts[0].error.as_deref(), Some("not configured"));
        assert!(!outcome.attempts[0].was_attempted());
    }
}
