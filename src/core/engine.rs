//! Engine assembly.
//!
//! One explicit value built at the start of `main` holds everything the
//! fetch pipeline needs: config, paths, the credential store, the snapshot
//! cache, the HTTP client, the clock, the provider registry, and the model
//! registry. There are no process-wide singletons; components receive what
//! they need from here.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use super::clock::{Clock, system_clock};
use super::http::build_client;
use super::provider::ProviderRegistry;
use super::registry::ModelRegistry;
use super::strategy::FetchContext;
use crate::error::Result;
use crate::storage::{AppPaths, Config, CredentialStore, SnapshotCache};

/// Assembled application state.
pub struct Engine {
    pub config: Arc<Config>,
    pub paths: AppPaths,
    pub creds: CredentialStore,
    pub cache: SnapshotCache,
    pub http: reqwest::Client,
    pub clock: Arc<dyn Clock>,
    pub providers: ProviderRegistry,
    models: OnceCell<ModelRegistry>,
}

impl Engine {
    /// Build the engine from resolved paths and config.
    pub fn new(paths: AppPaths, config: Config, providers: ProviderRegistry) -> Result<Self> {
        paths.ensure_dirs()?;
        let http = build_client(config.fetch.timeout_duration())?;
        Ok(Self {
            config: Arc::new(config),
            creds: CredentialStore::new(paths.credentials_dir()),
            cache: SnapshotCache::new(paths.snapshots_dir()),
            paths,
            http,
            clock: system_clock(),
            providers,
            models: OnceCell::new(),
        })
    }

    /// The model registry, loaded lazily and at most once.
    pub async fn models(&self) -> &ModelRegistry {
        self.models
            .get_or_init(|| ModelRegistry::load(&self.paths, &self.http))
            .await
    }

    /// Context handed to strategies for one fetch cycle.
    #[must_use]
    pub fn fetch_context(&self, cancel: CancellationToken) -> FetchContext {
        FetchContext {
            http: self.http.clone(),
            creds: self.creds.clone(),
            cache: self.cache.clone(),
            paths: self.paths.clone(),
            clock: Arc::clone(&self.clock),
            cancel,
            config: Arc::clone(&self.config),
        }
    }

    /// Provider ids enabled for this invocation, in registry order.
    #[must_use]
    pub fn enabled_provider_ids(&self) -> Vec<String> {
        self.config.resolve_enabled(&self.providers.ids())
    }
}
