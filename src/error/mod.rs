//! Error types for vibeusage.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Every failure a fetch strategy can produce belongs to one of four kinds:
//! - **NotConfigured**: no credentials anywhere; the strategy is skipped.
//! - **Recoverable**: transient network trouble, 5xx, timeouts, parse errors
//!   that are not obviously auth-related. The executor moves on to the next
//!   strategy in the chain.
//! - **AuthExpired**: a first 401/403 from a strategy that has a refresh
//!   path. Handled inside the strategy (refresh once, retry once).
//! - **Fatal**: 401/403 after refresh, revoked tokens, plan-missing. The
//!   executor stops the chain and surfaces the error verbatim.
//!
//! Strategies never panic; they always return a classified error value.

use thiserror::Error;

// =============================================================================
// Error Kinds
// =============================================================================

/// Classification used by the pipeline executor to decide whether to keep
/// trying strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No credentials are configured for this strategy.
    NotConfigured,
    /// Transient failure; the next strategy should be tried.
    Recoverable,
    /// First auth failure on a strategy with a refresh path.
    AuthExpired,
    /// Terminates the strategy chain.
    Fatal,
}

impl ErrorKind {
    /// Human-readable label for diagnostics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotConfigured => "not configured",
            Self::Recoverable => "recoverable",
            Self::AuthExpired => "auth expired",
            Self::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// No credentials configured
    NotConfigured = 2,
    /// Authentication failure
    AuthError = 3,
    /// Timeout
    Timeout = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

/// Main error type for vibeusage operations.
#[derive(Error, Debug)]
pub enum VibeusageError {
    // ==========================================================================
    // Credential discovery
    // ==========================================================================
    /// No credentials found for a provider across any source.
    #[error("no credentials configured for {provider}")]
    NotConfigured { provider: String },

    // ==========================================================================
    // Authentication
    // ==========================================================================
    /// Access token is past its expiry and a refresh is needed.
    #[error("authentication expired for {provider}")]
    AuthExpired { provider: String },

    /// Authentication rejected after any refresh attempt.
    #[error("authentication failed for {provider}: {reason}")]
    AuthFailed { provider: String, reason: String },

    /// The account lacks the plan required by the usage endpoint.
    #[error("{provider} account has no usage-reporting plan")]
    PlanRequired { provider: String },

    // ==========================================================================
    // Network
    // ==========================================================================
    /// Transport-level failure (DNS, connect, TLS, reset).
    #[error("network error: {0}")]
    Network(String),

    /// The per-attempt wall-clock timeout fired.
    #[error("Fetch timed out")]
    FetchTimeout { seconds: u64 },

    /// Provider returned a server-side error status.
    #[error("{provider} returned HTTP {status}")]
    ServiceError { provider: String, status: u16 },

    /// The parent context was cancelled.
    #[error("context cancelled")]
    Cancelled,

    // ==========================================================================
    // Parsing
    // ==========================================================================
    /// Provider response did not match any known shape.
    #[error("failed to parse response: {0}")]
    ParseResponse(String),

    /// A successful response carried no usage periods.
    #[error("{provider} response contained no usage data")]
    EmptyUsage { provider: String },

    // ==========================================================================
    // Configuration
    // ==========================================================================
    /// Configuration file or value problem.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unknown provider id.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// Model (or role) could not be resolved in the registry.
    #[error("unknown model or role: {0}")]
    UnknownModel(String),

    // ==========================================================================
    // Wrappers
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VibeusageError {
    /// Classify into the executor's four-way taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConfigured { .. } => ErrorKind::NotConfigured,

            Self::AuthExpired { .. } => ErrorKind::AuthExpired,

            Self::Network(_)
            | Self::FetchTimeout { .. }
            | Self::ServiceError { .. }
            | Self::ParseResponse(_)
            | Self::EmptyUsage { .. } => ErrorKind::Recoverable,

            Self::AuthFailed { .. }
            | Self::PlanRequired { .. }
            | Self::Cancelled
            | Self::Config(_)
            | Self::UnknownProvider(_)
            | Self::UnknownModel(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ErrorKind::Fatal,
        }
    }

    /// Whether the executor should try the next strategy after this error.
    #[must_use]
    pub const fn should_fallback(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Recoverable | ErrorKind::NotConfigured
        )
    }

    /// Map error to process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::NotConfigured { .. } => ExitCode::NotConfigured,
            Self::AuthExpired { .. } | Self::AuthFailed { .. } | Self::PlanRequired { .. } => {
                ExitCode::AuthError
            }
            Self::FetchTimeout { .. } => ExitCode::Timeout,
            _ => ExitCode::GeneralError,
        }
    }

    /// Returns the provider id if this error is provider-specific.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::NotConfigured { provider }
            | Self::AuthExpired { provider }
            | Self::AuthFailed { provider, .. }
            | Self::PlanRequired { provider }
            | Self::ServiceError { provider, .. }
            | Self::EmptyUsage { provider } => Some(provider),
            Self::UnknownProvider(p) => Some(p),
            _ => None,
        }
    }

    /// Short action hint surfaced next to fatal errors.
    #[must_use]
    pub fn action_hint(&self) -> Option<String> {
        match self {
            Self::NotConfigured { provider } => Some(format!(
                "run `vibeusage auth login {provider}` or set the provider's API key variable"
            )),
            Self::AuthExpired { provider } | Self::AuthFailed { provider, .. } => Some(format!(
                "re-authenticate with `vibeusage auth login {provider}`"
            )),
            Self::PlanRequired { provider } => {
                Some(format!("the {provider} plan does not expose usage data"))
            }
            _ => None,
        }
    }

    /// Classify an HTTP status from a usage endpoint.
    ///
    /// 401/403 become [`VibeusageError::AuthExpired`] so strategies with a
    /// refresh path get one retry; 402 is plan-missing and fatal; everything
    /// else is a recoverable service error.
    #[must_use]
    pub fn from_status(provider: &str, status: u16) -> Self {
        match status {
            401 | 403 => Self::AuthExpired {
                provider: provider.to_string(),
            },
            402 => Self::PlanRequired {
                provider: provider.to_string(),
            },
            _ => Self::ServiceError {
                provider: provider.to_string(),
                status,
            },
        }
    }
}

/// Result type alias for vibeusage operations.
pub type Result<T> = std::result::Result<T, VibeusageError>;

// =============================================================================
// Tests
// =============================================================================
