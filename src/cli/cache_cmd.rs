//! `vibeusage cache`: snapshot cache maintenance.

use super::args::CacheCommand;
use crate::core::Engine;
use crate::error::{Result, VibeusageError};

pub fn run(engine: &Engine, command: &CacheCommand) -> Result<()> {
    match command {
        CacheCommand::Clear { provider: Some(id) } => {
            if engine.providers.get(id).is_none() {
                return Err(VibeusageError::UnknownProvider(id.clone()));
            }
            engine.cache.clear(id)?;
            println!("cleared cached snapshot for {id}");
            Ok(())
        }
        CacheCommand::Clear { provider: None } => {
            engine.cache.clear_all()?;
            println!("cleared all cached snapshots");
            Ok(())
        }
    }
}
