//! `vibeusage models`: list and search the model registry.

use super::OutputOptions;
use super::args::ModelsArgs;
use crate::core::Engine;
use crate::error::Result;
use crate::render::RobotOutput;

pub async fn run(engine: &Engine, args: &ModelsArgs, out: OutputOptions) -> Result<()> {
    let registry = engine.models().await;

    let models = match (&args.search, &args.provider) {
        (Some(query), _) => registry.search(query),
        (None, Some(provider)) => registry.list_models_for_provider(provider),
        (None, None) => registry.list_models(),
    };

    if out.json {
        let envelope = RobotOutput::new("models", &models, vec![]);
        println!("{}", envelope.to_json(out.pretty)?);
    } else {
        for model in models {
            println!(
                "{:<20} {:<22} {}",
                model.id,
                model.name,
                model.providers.join(", ")
            );
        }
    }
    Ok(())
}
