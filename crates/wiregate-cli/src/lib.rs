//! Wiregate command-line interface.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::Path;
use wiregate_core::Config;

/// Wiregate - RPC gateway with an encrypted envelope
#[derive(Parser)]
#[command(name = "wiregate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, env = "WIREGATE_CONFIG", global = true)]
    pub config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway server
    Serve(commands::serve::ServeArgs),

    /// Print the public keys
    Keys(commands::keys::KeysArgs),

    /// Print the API descriptor
    Api(commands::api::ApiArgs),

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Show version information
    Version,
}

/// Load configuration from `path`, or from the default location.
///
/// An explicit path must exist; the default location falls back to
/// defaults. Environment overrides apply either way.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Ok(Config::load(path)?.with_env_overrides()),
        None => Ok(Config::load_or_default()),
    }
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve(args) => commands::serve::run(args, config).await,
        Commands::Keys(args) => commands::keys::run(args, config),
        Commands::Api(args) => commands::api::run(args, config),
        Commands::Config(args) => commands::config::run(args, config, cli.config.as_deref()),
        Commands::Version => {
            println!("wiregate {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
