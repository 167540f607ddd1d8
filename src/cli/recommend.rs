//! `vibeusage recommend`: rank providers for a model or role.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use super::args::RecommendArgs;
use super::{OutputOptions, fetch_providers, outcome_errors, provider_data};
use crate::core::Engine;
use crate::core::router::{self, Recommendation};
use crate::error::{Result, VibeusageError};
use crate::render::{RobotOutput, recommendation_lines};

pub async fn run(
    engine: &Engine,
    args: &RecommendArgs,
    out: OutputOptions,
    cancel: CancellationToken,
) -> Result<()> {
    let role = engine.config.role(&args.target);
    if args.role && role.is_none() {
        return Err(VibeusageError::UnknownModel(args.target.clone()));
    }

    let recommendation = match role {
        Some(role) => recommend_role(engine, &role, args, cancel).await?,
        None => recommend_model(engine, args, cancel).await?,
    };

    if out.json {
        let envelope = RobotOutput::new("recommend", &recommendation, vec![]);
        println!("{}", envelope.to_json(out.pretty)?);
    } else {
        print!("{}", recommendation_lines(&recommendation, out.no_color));
    }
    Ok(())
}

async fn recommend_model(
    engine: &Engine,
    args: &RecommendArgs,
    cancel: CancellationToken,
) -> Result<Recommendation> {
    let registry = engine.models().await;

    // Undated queries expand through the prefix index, shortest id first.
    let model = registry
        .lookup(&args.target)
        .or_else(|| registry.match_prefix(&args.target).into_iter().next())
        .ok_or_else(|| VibeusageError::UnknownModel(args.target.clone()))?
        .clone();

    let enabled = engine.enabled_provider_ids();
    let configured: Vec<String> = model
        .providers
        .iter()
        .filter(|p| enabled.contains(p))
        .cloned()
        .collect();
    if configured.is_empty() {
        return Ok(Recommendation::new(
            model.id,
            model.name,
            vec![],
            model.providers,
        ));
    }

    let outcomes =
        fetch_providers(engine, &configured, !args.no_cache, None, cancel).await?;
    // Fetch failures surface on the log channel; the recommendation payload
    // itself stays schema-stable.
    for error in outcome_errors(&outcomes) {
        tracing::warn!(error = %error, "provider fetch failed during recommend");
    }

    let data = provider_data(&outcomes);
    let multipliers: HashMap<String, Option<f64>> = configured
        .iter()
        .map(|pid| (pid.clone(), registry.lookup_multiplier(pid, &model.id)))
        .collect();

    let (candidates, unavailable) =
        router::rank(&configured, &data, &multipliers, engine.clock.now());
    Ok(Recommendation::new(model.id, model.name, candidates, unavailable))
}

async fn recommend_role(
    engine: &Engine,
    role: &crate::storage::Role,
    args: &RecommendArgs,
    cancel: CancellationToken,
) -> Result<Recommendation> {
    let registry = engine.models().await;

    let entries = router::resolve_role(role, registry);
    if entries.is_empty() {
        return Err(VibeusageError::UnknownModel(format!(
            "role {} resolves to no known models",
            role.name
        )));
    }

    let enabled = engine.enabled_provider_ids();
    let mut provider_ids: Vec<String> = Vec::new();
    for entry in &entries {
        for pid in &entry.provider_ids {
            if enabled.contains(pid) && !provider_ids.contains(pid) {
                provider_ids.push(pid.clone());
            }
        }
    }
    if provider_ids.is_empty() {
        return Ok(Recommendation::new(role.name.clone(), role.name.clone(), vec![], vec![]));
    }

    let outcomes =
        fetch_providers(engine, &provider_ids, !args.no_cache, None, cancel).await?;
    let data = provider_data(&outcomes);

    let (candidates, unavailable) = router::rank_by_role(
        &entries,
        &data,
        |pid, model_id| registry.lookup_multiplier(pid, model_id),
        engine.clock.now(),
    );
    Ok(Recommendation::new(
        role.name.clone(),
        role.name.clone(),
        candidates,
        unavailable,
    ))
}
