//! Keys command.

use clap::Args;
use serde_json::json;
use wiregate_core::config::Config;
use wiregate_gateway::server::load_keys;

/// Keys command arguments.
#[derive(Args)]
pub struct KeysArgs {
    /// Print PEM instead of the flattened form clients receive
    #[arg(long)]
    pub pem: bool,
}

/// Run the keys command.
///
/// Without key files configured this generates a throwaway keypair, so the
/// output only matches a running server when the keys come from files.
pub fn run(args: KeysArgs, config: Config) -> anyhow::Result<()> {
    if config.security.public_key_file.is_none() {
        eprintln!("No key files configured; showing a freshly generated keypair.");
    }
    let keys = load_keys(&config.security)?;

    if args.pem {
        println!("{}", keys.encryption_public_key_pem());
        println!("{}", keys.signing_public_key_pem()?);
    } else {
        let out = json!({
            "keyEnc": keys.encryption_public_key(),
            "keyVer": keys.signing_public_key()?,
            "bits": keys.rsa_bits(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    }
    Ok(())
}
