//! Command dispatch.

pub mod args;
mod auth_cmd;
mod cache_cmd;
mod config_cmd;
mod models_cmd;
mod recommend;
mod status_cmd;
mod usage;

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::Engine;
use crate::core::orchestrator;
use crate::core::provider::Provider;
use crate::core::router::ProviderData;
use crate::core::strategy::FetchOutcome;
use crate::error::{Result, VibeusageError};
use args::{Cli, Command, UsageArgs};

/// Output settings shared by every command.
#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub pretty: bool,
    pub no_color: bool,
}

impl OutputOptions {
    fn from_cli(cli: &Cli, engine: &Engine) -> Self {
        Self {
            json: cli.json,
            pretty: cli.pretty || engine.config.display.pretty,
            no_color: cli.no_color || engine.config.no_color(),
        }
    }
}

/// Run the parsed command against the engine.
pub async fn run(cli: Cli, engine: &Engine, cancel: CancellationToken) -> Result<()> {
    let out = OutputOptions::from_cli(&cli, engine);

    match cli.command.unwrap_or(Command::Usage(UsageArgs::default())) {
        Command::Usage(args) => usage::run(engine, &args, out, cancel).await,
        Command::Recommend(args) => recommend::run(engine, &args, out, cancel).await,
        Command::Status => status_cmd::run(engine, out).await,
        Command::Models(args) => models_cmd::run(engine, &args, out).await,
        Command::Auth { command } => auth_cmd::run(engine, command, out, cancel).await,
        Command::Cache { command } => cache_cmd::run(engine, &command),
        Command::Config { command } => config_cmd::run(engine, &command),
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Resolve provider ids into registered providers, rejecting unknown ids.
fn resolve_providers(engine: &Engine, ids: &[String]) -> Result<Vec<Arc<dyn Provider>>> {
    ids.iter()
        .map(|id| {
            engine
                .providers
                .get(id)
                .cloned()
                .ok_or_else(|| VibeusageError::UnknownProvider(id.clone()))
        })
        .collect()
}

/// Fetch the given providers concurrently.
async fn fetch_providers(
    engine: &Engine,
    ids: &[String],
    use_cache: bool,
    timeout_override: Option<u64>,
    cancel: CancellationToken,
) -> Result<HashMap<String, FetchOutcome>> {
    let providers = resolve_providers(engine, ids)?;

    let mut ctx = engine.fetch_context(cancel);
    if let Some(timeout) = timeout_override {
        let mut config = (*ctx.config).clone();
        config.fetch.timeout = timeout;
        ctx.config = Arc::new(config);
    }

    Ok(orchestrator::fetch_all(providers, &ctx, use_cache, None).await)
}

/// Successful outcomes as router input.
fn provider_data(outcomes: &HashMap<String, FetchOutcome>) -> HashMap<String, ProviderData> {
    outcomes
        .iter()
        .filter_map(|(id, outcome)| {
            let snapshot = outcome.snapshot.clone()?;
            Some((
                id.clone(),
                ProviderData {
                    snapshot,
                    cached: outcome.cached,
                },
            ))
        })
        .collect()
}

/// Collected per-provider error strings for the robot envelope.
fn outcome_errors(outcomes: &HashMap<String, FetchOutcome>) -> Vec<String> {
    let mut ids: Vec<&String> = outcomes.keys().collect();
    ids.sort();
    ids.iter()
        .filter_map(|id| {
            let outcome = &outcomes[*id];
            outcome
                .error
                .as_ref()
                .map(|error| format!("{id}: {error}"))
        })
        .collect()
}
