//! `vibeusage status`: probe provider status pages.

use std::collections::BTreeMap;

use super::OutputOptions;
use crate::core::Engine;
use crate::core::status::ProviderStatus;
use crate::error::Result;
use crate::render::{RobotOutput, status_line};

pub async fn run(engine: &Engine, out: OutputOptions) -> Result<()> {
    let enabled = engine.enabled_provider_ids();

    let probes: Vec<(String, _)> = enabled
        .iter()
        .filter_map(|id| {
            let provider = engine.providers.get(id)?;
            provider.status_probe().map(|probe| (id.clone(), probe))
        })
        .collect();

    let fetches = probes
        .iter()
        .map(|(_, probe)| probe.fetch(&engine.http));
    let results = futures::future::join_all(fetches).await;

    let statuses: BTreeMap<String, ProviderStatus> = probes
        .iter()
        .map(|(id, _)| id.clone())
        .zip(results)
        .collect();

    if out.json {
        let envelope = RobotOutput::new("status", &statuses, vec![]);
        println!("{}", envelope.to_json(out.pretty)?);
    } else {
        for (id, status) in &statuses {
            println!("{}", status_line(id, status, out.no_color));
        }
        for id in &enabled {
            if !statuses.contains_key(id) {
                println!("{id:<12}no status endpoint");
            }
        }
    }
    Ok(())
}
