//! Concurrent fetch orchestrator.
//!
//! Fans the pipeline executor out over all requested providers with bounded
//! parallelism, collects outcomes into a map, and invokes an optional
//! completion callback per provider for progress display. There are no
//! cross-provider ordering guarantees; the orchestrator itself never fails.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};

use super::pipeline::{self, PipelineOptions};
use super::provider::Provider;
use super::strategy::{FetchContext, FetchOutcome};
use crate::error::VibeusageError;

/// Callback invoked once per completed provider, outside any lock.
pub type CompletionCallback = Arc<dyn Fn(&FetchOutcome) + Send + Sync>;

/// Fetch usage for every given provider concurrently.
///
/// Parallelism is bounded by `config.fetch.max_concurrent`. A cancelled
/// context produces cancelled outcomes for whatever had not finished; the
/// returned map always has one entry per requested provider.
pub async fn fetch_all(
    providers: Vec<Arc<dyn Provider>>,
    ctx: &FetchContext,
    use_cache: bool,
    on_complete: Option<CompletionCallback>,
) -> HashMap<String, FetchOutcome> {
    let semaphore = Arc::new(Semaphore::new(ctx.config.fetch.max_concurrent.max(1)));
    let results: Arc<Mutex<HashMap<String, FetchOutcome>>> = Arc::new(Mutex::new(HashMap::new()));

    let mut handles = Vec::with_capacity(providers.len());
    for provider in providers {
        let ctx = ctx.clone();
        let semaphore = Arc::clone(&semaphore);
        let results = Arc::clone(&results);
        let on_complete = on_complete.clone();

        handles.push(tokio::spawn(async move {
            let provider_id = provider.meta().id.to_string();

            // A closed semaphore only happens on shutdown; treat as cancelled.
            let Ok(_permit) = semaphore.acquire().await else {
                let outcome = FetchOutcome::failure(
                    &provider_id,
                    &VibeusageError::Cancelled,
                    vec![],
                    false,
                );
                results.lock().await.insert(provider_id, outcome);
                return;
            };

            let options =
                PipelineOptions::from_config(&ctx.config, use_cache, provider.meta().record_unavailable);
            let strategies = provider.strategies();
            let outcome = pipeline::execute(&provider_id, &strategies, &ctx, &options).await;

            if let Some(callback) = &on_complete {
                callback(&outcome);
            }
            results.lock().await.insert(provider_id, outcome);
        }));
    }

    for handle in handles {
        // A panicking provider task is a bug, but it must not take the whole
        // fetch cycle down with it.
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "provider fetch task panicked");
        }
    }

    Arc::try_unwrap(results)
        .map(Mutex::into_inner)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{PeriodType, UsagePeriod, UsageSnapshot};
    use crate::core::provider::{CredentialSources, ProviderMeta};
    use crate::core::strategy::FetchStrategy;
    use crate::test_utils::{StubStrategy, test_context};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OneShotProvider {
        meta: ProviderMeta,
        utilization: i64,
    }

    impl Provider for OneShotProvider {
        fn meta(&self) -> &ProviderMeta {
            &self.meta
        }
        fn credential_sources(&self) -> CredentialSources {
            CredentialSources::default()
        }
        fn strategies(&self) -> Vec<Arc<dyn FetchStrategy>> {
            let snapshot = UsageSnapshot::new(
                self.meta.id,
                chrono::Utc::now(),
                vec![UsagePeriod::new("weekly", PeriodType::Weekly, self.utilization)],
            );
            vec![Arc::new(StubStrategy::succeeding("api_key", snapshot))]
        }
    }

    fn provider(id: &'static str, utilization: i64) -> Arc<dyn Provider> {
        Arc::new(OneShotProvider {
            meta: ProviderMeta {
                id,
                name: id,
                description: "",
                homepage: "",
                status_url: None,
                dashboard_url: None,
                record_unavailable: false,
            },
            utilization,
        })
    }

    #[tokio::test]
    async fn collects_one_outcome_per_provider() {
        let (ctx, _dir) = test_context();
        let providers = vec![provider("a", 10), provider("b", 20), provider("c", 30)];

        let outcomes = fetch_all(providers, &ctx, false, None).await;

        assert_eq!(outcomes.len(), 3);
        for (id, utilization) in [("a", 10), ("b", 20), ("c", 30)] {
            let outcome = &outcomes[id];
            assert!(outcome.success);
            assert_eq!(
                outcome.snapshot.as_ref().unwrap().periods[0].utilization,
                utilization as u8
            );
        }
    }

    #[tokio::test]
    async fn completion_callback_fires_per_provider() {
        let (ctx, _dir) = test_context();
        let counter = Arc::new(AtomicUsize::new(0));
        let cb_counter = Arc::clone(&counter);

        let callback: CompletionCallback = Arc::new(move |outcome: &FetchOutcome| {
            assert!(outcome.success);
            cb_counter.fetch_add(1, Ordering::SeqCst);
        });

        let providers = vec![provider("a", 10), provider("b", 20)];
        let outcomes = fetch_all(providers, &ctx, false, Some(callback)).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelled_context_yields_cancelled_outcomes() {
        let (ctx, _dir) = test_context();
        ctx.cancel.cancel();

        // Slow strategies observe cancellation inside the executor.
        struct SlowProvider {
            meta: ProviderMeta,
        }
        impl Provider for SlowProvider {
            fn meta(&self) -> &ProviderMeta {
                &self.meta
            }
            fn credential_sources(&self) -> CredentialSources {
                CredentialSources::default()
            }
            fn strategies(&self) -> Vec<Arc<dyn FetchStrategy>> {
                vec![Arc::new(StubStrategy::sleeping(
                    "api_key",
                    std::time::Duration::from_secs(30),
                ))]
            }
        }

        let providers: Vec<Arc<dyn Provider>> = vec![Arc::new(SlowProvider {
            meta: ProviderMeta {
                id: "slow",
                name: "slow",
                description: "",
                homepage: "",
                status_url: None,
                dashboard_url: None,
                record_unavailable: false,
            },
        })];

        let outcomes = fetch_all(providers, &ctx, false, None).await;
        let outcome = &outcomes["slow"];
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("context cancelled"));
    }
}
