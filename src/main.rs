//! vibeusage binary entry point.

use clap::Parser;
use tokio_util::sync::CancellationToken;

use vibeusage::cli::{self, args::Cli};
use vibeusage::core::Engine;
use vibeusage::core::logging;
use vibeusage::error::ExitCode;
use vibeusage::providers::builtin_registry;
use vibeusage::storage::{AppPaths, Config};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let paths = AppPaths::new();
    let config = match Config::load_from(&paths.config_file()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(ExitCode::GeneralError.into());
        }
    };

    let engine = match Engine::new(paths, config, builtin_registry()) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code().into());
        }
    };

    // Ctrl-C cancels every in-flight fetch, refresh, and poll.
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupt received, cancelling");
            ctrl_c_cancel.cancel();
        }
    });

    match cli::run(cli, &engine, cancel).await {
        Ok(()) => {}
        Err(e) => {
            eprintln!("error: {e}");
            if let Some(hint) = e.action_hint() {
                eprintln!("hint: {hint}");
            }
            std::process::exit(e.exit_code().into());
        }
    }
}
