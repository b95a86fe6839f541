use serde::Serialize;
use tether_auth::{ApiKeyHasher, generate_api_key};
use tether_config::AuthConfig;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::KeyCommands;
use crate::output::output;

#[derive(Serialize)]
struct KeyGenerateResponse {
    key: String,
    key_hash: String,
}

#[derive(Serialize)]
struct KeyHashResponse {
    key_hash: String,
}

/// Handle `tether key <subcommand>`.
pub fn handle(
    action: &KeyCommands,
    config: &AuthConfig,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    if !config.has_api_key_pepper() {
        anyhow::bail!("key: TETHER_AUTH__API_KEY_PEPPER is not configured");
    }
    let hasher = ApiKeyHasher::from_config(config)?;

    match action {
        KeyCommands::Generate(args) => {
            let key = generate_api_key(&args.prefix)?;
            let key_hash = hasher.hash(&key);
            output(&KeyGenerateResponse { key, key_hash }, flags.format)
        }
        KeyCommands::Hash(args) => {
            let key_hash = hasher.hash(args.key.trim());
            output(&KeyHashResponse { key_hash }, flags.format)
        }
    }
}
