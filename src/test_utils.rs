//! Test utilities: fixture builders and stub strategies.
//!
//! Compiled into test builds, and into the library when the `test-utils`
//! feature is enabled so integration tests can share them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::core::clock::system_clock;
use crate::core::models::{PeriodType, UsagePeriod, UsageSnapshot};
use crate::core::strategy::{FetchContext, FetchResult, FetchStrategy};
use crate::error::VibeusageError;
use crate::storage::{Config, CredentialStore, SnapshotCache};

// =============================================================================
// Fixtures
// =============================================================================

/// A one-period weekly snapshot.
#[must_use]
pub fn make_test_snapshot(provider: &str, utilization: i64) -> UsageSnapshot {
    UsageSnapshot::new(
        provider,
        Utc::now(),
        vec![UsagePeriod::new("weekly", PeriodType::Weekly, utilization)],
    )
}

/// A fetch context rooted in a fresh temp directory.
///
/// The returned [`tempfile::TempDir`] must stay alive for the duration of
/// the test.
#[must_use]
pub fn test_context() -> (FetchContext, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = test_context_in(dir.path(), Config::default());
    (ctx, dir)
}

/// A fetch context rooted in the given directory with explicit config.
#[must_use]
pub fn test_context_in(root: &std::path::Path, config: Config) -> FetchContext {
    FetchContext {
        http: reqwest::Client::new(),
        creds: CredentialStore::new(root.join("credentials")),
        cache: SnapshotCache::new(root.join("snapshots")),
        paths: crate::storage::AppPaths {
            config: root.join("config"),
            data: root.join("data"),
            cache: root.join("cache"),
        },
        clock: system_clock(),
        cancel: CancellationToken::new(),
        config: Arc::new(config),
    }
}

// =============================================================================
// Stub Strategy
// =============================================================================

enum StubBehavior {
    Succeed(UsageSnapshot),
    FailRecoverable(String),
    FailFatal(String),
    Sleep(Duration),
    SleepThenSucceed(Duration, UsageSnapshot),
}

/// Scriptable strategy for executor tests.
pub struct StubStrategy {
    name: &'static str,
    available: bool,
    behavior: StubBehavior,
}

impl StubStrategy {
    /// Always succeeds with the given snapshot.
    #[must_use]
    pub fn succeeding(name: &'static str, snapshot: UsageSnapshot) -> Self {
        Self {
            name,
            available: true,
            behavior: StubBehavior::Succeed(snapshot),
        }
    }

    /// Fails with a recoverable error.
    #[must_use]
    pub fn recoverable_failure(name: &'static str, message: &str) -> Self {
        Self {
            name,
            available: true,
            behavior: StubBehavior::FailRecoverable(message.to_string()),
        }
    }

    /// Fails fatally.
    #[must_use]
    pub fn fatal_failure(name: &'static str, message: &str) -> Self {
        Self {
            name,
            available: true,
            behavior: StubBehavior::FailFatal(message.to_string()),
        }
    }

    /// Sleeps forever (until the executor times out or cancels).
    #[must_use]
    pub fn sleeping(name: &'static str, duration: Duration) -> Self {
        Self {
            name,
            available: true,
            behavior: StubBehavior::Sleep(duration),
        }
    }

    /// Sleeps, then succeeds.
    #[must_use]
    pub fn slow_success(name: &'static str, delay: Duration, snapshot: UsageSnapshot) -> Self {
        Self {
            name,
            available: true,
            behavior: StubBehavior::SleepThenSucceed(delay, snapshot),
        }
    }

    /// Reports no credentials.
    #[must_use]
    pub const fn unavailable(name: &'static str) -> Self {
        Self {
            name,
            available: false,
            behavior: StubBehavior::Sleep(Duration::from_secs(0)),
        }
    }
}

#[async_trait]
impl FetchStrategy for StubStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_available(&self, _ctx: &FetchContext) -> bool {
        self.available
    }

    async fn fetch(&self, _ctx: &FetchContext) -> FetchResult {
        match &self.behavior {
            StubBehavior::Succeed(snapshot) => FetchResult::success(snapshot.clone()),
            StubBehavior::FailRecoverable(message) => {
                FetchResult::recoverable(VibeusageError::Network(message.clone()))
            }
            StubBehavior::FailFatal(message) => {
                FetchResult::fatal(VibeusageError::Other(anyhow::anyhow!(message.clone())))
            }
            StubBehavior::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                FetchResult::recoverable(VibeusageError::Network("slept".to_string()))
            }
            StubBehavior::SleepThenSucceed(delay, snapshot) => {
                tokio::time::sleep(*delay).await;
                FetchResult::success(snapshot.clone())
            }
        }
    }
}
