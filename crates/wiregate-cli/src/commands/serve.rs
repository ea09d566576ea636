//! Serve command.

use clap::Args;
use std::sync::Arc;
use tracing::info;
use wiregate_core::config::{BindMode, Config};
use wiregate_gateway::server::load_keys;
use wiregate_gateway::Gateway;

/// Serve command arguments.
#[derive(Args)]
pub struct ServeArgs {
    /// Bind mode (loopback, lan, auto)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Port number
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Reject plain calls to methods that expect encryption
    #[arg(long)]
    pub encryption_required: bool,

    /// Namespace for the demo handler
    #[arg(long, default_value = "app")]
    pub namespace: String,
}

/// Parse a bind mode name.
pub fn parse_bind(value: &str) -> anyhow::Result<BindMode> {
    match value {
        "loopback" => Ok(BindMode::Loopback),
        "lan" => Ok(BindMode::Lan),
        "auto" => Ok(BindMode::Auto),
        _ => anyhow::bail!("Invalid bind mode: {}", value),
    }
}

/// Apply command-line overrides on top of the loaded configuration.
pub fn apply_overrides(args: &ServeArgs, mut config: Config) -> anyhow::Result<Config> {
    if let Some(bind) = &args.bind {
        config.gateway.bind = parse_bind(bind)?;
    }
    if let Some(port) = args.port {
        config.gateway.port = port;
    }
    if args.encryption_required {
        config.security.encryption_required = true;
    }
    config.validate()?;
    Ok(config)
}

/// Run the serve command.
pub async fn run(args: ServeArgs, config: Config) -> anyhow::Result<()> {
    let config = apply_overrides(&args, config)?;

    let keys = Arc::new(load_keys(&config.security)?);
    info!(
        "Encryption key: RSA-{} (encryption {})",
        keys.rsa_bits(),
        if config.security.encryption_required { "required" } else { "optional" }
    );

    let gateway = Gateway::with_builtin_handlers(config, keys, &args.namespace)?;
    gateway.run().await?;
    Ok(())
}
