//! Command-line arguments.

use clap::{Args, Parser, Subcommand};

/// Aggregate AI coding-assistant usage and pick the provider with the most
/// headroom.
#[derive(Debug, Parser)]
#[command(name = "vibeusage", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Emit machine-readable JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Verbose logging to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch usage for the enabled providers (the default command).
    Usage(UsageArgs),
    /// Recommend the best provider for a model or role.
    Recommend(RecommendArgs),
    /// Probe provider status pages.
    Status,
    /// List or search known models.
    Models(ModelsArgs),
    /// Manage provider credentials.
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
    /// Manage the snapshot cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Args, Default)]
pub struct UsageArgs {
    /// Single provider id, or "all".
    #[arg(long)]
    pub provider: Option<String>,

    /// Skip the snapshot cache fallback.
    #[arg(long)]
    pub no_cache: bool,

    /// Override the per-strategy timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Args)]
pub struct RecommendArgs {
    /// Model id, model prefix, or role name.
    pub target: String,

    /// Treat the target as a role even if a model matches.
    #[arg(long)]
    pub role: bool,

    /// Skip the snapshot cache fallback.
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Debug, Args, Default)]
pub struct ModelsArgs {
    /// Only models served by this provider.
    #[arg(long)]
    pub provider: Option<String>,

    /// Substring search over ids, names, and aliases.
    #[arg(long)]
    pub search: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Enroll with a provider.
    Login {
        provider: String,

        /// API key for manual-key providers (otherwise taken from the
        /// provider's environment variable).
        #[arg(long)]
        api_key: Option<String>,

        /// Session token for web-session providers.
        #[arg(long)]
        session: Option<String>,
    },
    /// Delete stored credentials for a provider.
    Logout { provider: String },
    /// Show credential presence, source, and expiry per provider.
    Status,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Remove cached snapshots, for one provider or all of them.
    Clear { provider: Option<String> },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the resolved configuration as TOML.
    Show,
    /// Print the config file path.
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn default_command_is_none() {
        let cli = Cli::try_parse_from(["vibeusage"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.json);
    }

    #[test]
    fn parses_usage_flags() {
        let cli =
            Cli::try_parse_from(["vibeusage", "usage", "--provider", "claude", "--no-cache"])
                .unwrap();
        match cli.command {
            Some(Command::Usage(args)) => {
                assert_eq!(args.provider.as_deref(), Some("claude"));
                assert!(args.no_cache);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_recommend_with_global_json() {
        let cli = Cli::try_parse_from(["vibeusage", "recommend", "gpt-5", "--json"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Some(Command::Recommend(args)) => assert_eq!(args.target, "gpt-5"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_auth_login() {
        let cli = Cli::try_parse_from([
            "vibeusage", "auth", "login", "kimi", "--api-key", "sk-123",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Auth {
                command: AuthCommand::Login { provider, api_key, .. },
            }) => {
                assert_eq!(provider, "kimi");
                assert_eq!(api_key.as_deref(), Some("sk-123"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
