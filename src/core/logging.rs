//! Structured logging to stderr.
//!
//! Driven by `VIBEUSAGE_LOG` (level) and `VIBEUSAGE_LOG_FORMAT` (human or
//! json). Cache fallbacks and refresh failures surface here as warnings so
//! the primary output stays machine-stable.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

const LOG_LEVEL_ENV: &str = "VIBEUSAGE_LOG";
const LOG_FORMAT_ENV: &str = "VIBEUSAGE_LOG_FORMAT";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable logs.
    #[default]
    Human,
    /// JSON logs (one event per line).
    Json,
}

impl LogFormat {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "human" => Some(Self::Human),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parse log format from the env var, falling back to human.
#[must_use]
pub fn format_from_env() -> LogFormat {
    std::env::var(LOG_FORMAT_ENV)
        .ok()
        .and_then(|v| LogFormat::from_arg(v.trim()))
        .unwrap_or_default()
}

/// Initialize logging.
///
/// `verbose` raises the default level to debug when no explicit filter is
/// set. Safe to call more than once; later calls are no-ops.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .unwrap_or_else(|_| EnvFilter::new(format!("vibeusage={default_level}")));

    match format_from_env() {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .try_init()
                .ok();
        }
        LogFormat::Human => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time()
                .try_init()
                .ok();
        }
    }
}
