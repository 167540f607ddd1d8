//! Provider abstraction and registry.
//!
//! A provider contributes metadata, declarative credential locations, an
//! ordered list of fetch strategies (order encodes preference), an optional
//! status probe, and an optional interactive auth flow descriptor. The
//! engine never drives the auth flow itself; the CLI layer does.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::status::StatusProbe;
use super::strategy::FetchStrategy;
use crate::auth::DeviceFlowConfig;

// =============================================================================
// Metadata
// =============================================================================

/// Static metadata for a provider.
#[derive(Debug, Clone)]
pub struct ProviderMeta {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub homepage: &'static str,
    pub status_url: Option<&'static str>,
    pub dashboard_url: Option<&'static str>,
    /// Whether strategies skipped for missing credentials still produce a
    /// "not configured" attempt record for diagnostics.
    pub record_unavailable: bool,
}

/// Declarative hints for credential discovery. Paths may start with `~/`.
#[derive(Debug, Clone, Default)]
pub struct CredentialSources {
    pub cli_paths: Vec<String>,
    pub env_vars: Vec<String>,
}

/// How a user enrolls with a provider interactively.
#[derive(Debug, Clone)]
pub enum AuthFlow {
    /// OAuth 2.0 device authorization grant.
    DeviceCode(DeviceFlowConfig),
    /// Paste an API key; `env_var` names the conventional variable.
    ManualKey { env_var: &'static str, help: &'static str },
    /// Provider-specific instructions the CLI prints verbatim.
    Custom { instructions: &'static str },
}

// =============================================================================
// Provider Trait
// =============================================================================

/// A usage data source.
pub trait Provider: Send + Sync {
    /// Static metadata.
    fn meta(&self) -> &ProviderMeta;

    /// Credential location hints; purely declarative.
    fn credential_sources(&self) -> CredentialSources;

    /// Ordered fetch strategies, most preferred first.
    fn strategies(&self) -> Vec<Arc<dyn FetchStrategy>>;

    /// Health probe for the provider's status page, if it has one.
    fn status_probe(&self) -> Option<Box<dyn StatusProbe>> {
        None
    }

    /// Interactive enrollment flow, if the provider supports one.
    fn auth(&self) -> Option<AuthFlow> {
        None
    }
}

// =============================================================================
// Registry
// =============================================================================

/// All registered providers, keyed by id.
///
/// Built once at startup and read-only afterwards. Ordered so listings are
/// deterministic.
pub struct ProviderRegistry {
    providers: BTreeMap<&'static str, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            providers: BTreeMap::new(),
        }
    }

    /// Register a provider.
    ///
    /// # Panics
    /// Panics if a provider with the same id is already registered; two
    /// providers claiming one id is a programming error.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let id = provider.meta().id;
        assert!(
            self.providers.insert(id, provider).is_none(),
            "provider {id} registered twice"
        );
    }

    /// Look up a provider by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Provider>> {
        self.providers.get(id)
    }

    /// All provider ids in registration order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.providers.keys().map(ToString::to_string).collect()
    }

    /// Iterate all providers.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers.values()
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::core::strategy::{FetchContext, FetchResult};

    struct NullStrategy;

    #[async_trait]
    impl FetchStrategy for NullStrategy {
        fn name(&self) -> &'static str {
            "api_key"
        }
        fn is_available(&self, _ctx: &FetchContext) -> bool {
            false
        }
        async fn fetch(&self, _ctx: &FetchContext) -> FetchResult {
            FetchResult::recoverable(crate::error::VibeusageError::Network("stub".to_string()))
        }
    }

    struct StubProvider {
        meta: ProviderMeta,
    }

    impl StubProvider {
        fn new(id: &'static str) -> Self {
            Self {
                meta: ProviderMeta {
                    id,
                    name: "Stub",
                    description: "stub provider",
                    homepage: "https://example.com",
                    status_url: None,
                    dashboard_url: None,
                    record_unavailable: false,
                },
            }
        }
    }

    impl Provider for StubProvider {
        fn meta(&self) -> &ProviderMeta {
            &self.meta
        }
        fn credential_sources(&self) -> CredentialSources {
            CredentialSources::default()
        }
        fn strategies(&self) -> Vec<Arc<dyn FetchStrategy>> {
            vec![Arc::new(NullStrategy)]
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider::new("alpha")));
        registry.register(Arc::new(StubProvider::new("beta")));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("alpha").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.ids(), vec!["alpha", "beta"]);
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_registration_panics() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider::new("alpha")));
        registry.register(Arc::new(StubProvider::new("alpha")));
    }
}
