//! API descriptor command.

use clap::Args;
use std::sync::Arc;
use wiregate_core::config::Config;
use wiregate_gateway::handlers::{builtin_registry, DEFAULT_NAMESPACE};
use wiregate_gateway::server::load_keys;
use wiregate_gateway::{ApiDescriptor, ConnectionRegistry, HttpSessionStore};

/// API command arguments.
#[derive(Args)]
pub struct ApiArgs {
    /// Sign the descriptor over this challenge
    #[arg(long)]
    pub challenge: Option<String>,

    /// Namespace for the demo handler
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,
}

/// Run the api command.
pub fn run(args: ApiArgs, config: Config) -> anyhow::Result<()> {
    let connections = Arc::new(ConnectionRegistry::new(Arc::new(HttpSessionStore::new())));
    let paths = [config.gateway.api_path.as_str(), config.gateway.ws_path.as_str()];
    let registry = builtin_registry(&args.namespace, &paths, connections)?;

    let keys = load_keys(&config.security)?;
    let published = ApiDescriptor::build(&registry).signed(&keys, args.challenge.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&published)?);
    Ok(())
}
