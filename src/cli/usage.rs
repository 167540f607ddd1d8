//! `vibeusage usage`: fetch and display per-provider usage.

use tokio_util::sync::CancellationToken;

use super::args::UsageArgs;
use super::{OutputOptions, fetch_providers, outcome_errors};
use crate::core::Engine;
use crate::core::strategy::FetchOutcome;
use crate::error::{Result, VibeusageError};
use crate::render::{RobotOutput, usage_lines};

pub async fn run(
    engine: &Engine,
    args: &UsageArgs,
    out: OutputOptions,
    cancel: CancellationToken,
) -> Result<()> {
    let ids = match args.provider.as_deref() {
        None => engine.enabled_provider_ids(),
        Some("all") => engine.providers.ids(),
        Some(id) => {
            if engine.providers.get(id).is_none() {
                return Err(VibeusageError::UnknownProvider(id.to_string()));
            }
            vec![id.to_string()]
        }
    };
    if ids.is_empty() {
        return Err(VibeusageError::Config("no providers enabled".to_string()));
    }

    let outcomes =
        fetch_providers(engine, &ids, !args.no_cache, args.timeout, cancel).await?;

    // Stable display order: the order providers were requested in.
    let ordered: Vec<&FetchOutcome> = ids.iter().filter_map(|id| outcomes.get(id)).collect();

    if out.json {
        let envelope = RobotOutput::new("usage", &ordered, outcome_errors(&outcomes));
        println!("{}", envelope.to_json(out.pretty)?);
    } else {
        print!("{}", usage_lines(&ordered, out.no_color));
        for outcome in &ordered {
            if outcome.fatal {
                eprintln!(
                    "hint: re-authenticate with `vibeusage auth login {}`",
                    outcome.provider_id
                );
            }
        }
    }
    Ok(())
}
