//! `vibeusage config`: configuration inspection.

use super::args::ConfigCommand;
use crate::core::Engine;
use crate::error::{Result, VibeusageError};

pub fn run(engine: &Engine, command: &ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let rendered = toml::to_string_pretty(engine.config.as_ref())
                .map_err(|e| VibeusageError::Config(format!("failed to render config: {e}")))?;
            print!("{rendered}");
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", engine.paths.config_file().display());
            Ok(())
        }
    }
}
