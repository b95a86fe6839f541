use chrono::{DateTime, Utc};
use serde::Serialize;
use tether_auth::TokenCodec;
use tether_config::AuthConfig;
use tether_core::Viewer;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::TokenCommands;
use crate::cli::subcommands::token::{TokenInspectArgs, TokenMintArgs};
use crate::output::output;

#[derive(Serialize)]
struct TokenMintResponse {
    token: String,
    viewer: Viewer,
    expires_at: String,
}

#[derive(Serialize)]
struct TokenInspectResponse {
    viewer: Viewer,
    expires_at: String,
}

/// Handle `tether token <subcommand>`.
pub fn handle(
    action: &TokenCommands,
    config: &AuthConfig,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let codec = codec(config)?;
    match action {
        TokenCommands::Mint(args) => {
            let response = mint(&codec, args, config.token_ttl_secs, Utc::now())?;
            output(&response, flags.format)
        }
        TokenCommands::Inspect(args) => {
            let response = inspect(&codec, args, Utc::now())?;
            output(&response, flags.format)
        }
    }
}

fn codec(config: &AuthConfig) -> anyhow::Result<TokenCodec> {
    if !config.is_configured() {
        anyhow::bail!("token: TETHER_AUTH__JWT_SECRET is not configured");
    }
    Ok(TokenCodec::from_config(config)?)
}

fn mint(
    codec: &TokenCodec,
    args: &TokenMintArgs,
    default_ttl: u64,
    now: DateTime<Utc>,
) -> anyhow::Result<TokenMintResponse> {
    let viewer = viewer_from_args(args)?;
    let ttl = args.ttl.unwrap_or(default_ttl);
    let token = codec.sign_at(&viewer, ttl, now)?;
    let expires_at = codec.decode_claims_at(&token, now)?.expires_at()?;
    tracing::debug!(%viewer, ttl, "minted token");
    Ok(TokenMintResponse {
        token,
        viewer,
        expires_at: expires_at.to_rfc3339(),
    })
}

fn inspect(
    codec: &TokenCodec,
    args: &TokenInspectArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<TokenInspectResponse> {
    let claims = codec.decode_claims_at(args.token.trim(), now)?;
    let expires_at = claims.expires_at()?;
    Ok(TokenInspectResponse {
        viewer: claims.to_viewer()?,
        expires_at: expires_at.to_rfc3339(),
    })
}

fn viewer_from_args(args: &TokenMintArgs) -> anyhow::Result<Viewer> {
    let viewer = match (&args.user, &args.org, &args.customer) {
        (Some(user), org, None) => Viewer::user(user, org.clone())?,
        (None, Some(org), None) => Viewer::org(org)?,
        (None, None, Some(customer)) => {
            let (org, customer) = customer
                .split_once('/')
                .ok_or_else(|| anyhow::anyhow!("--customer expects ORG/CUSTOMER"))?;
            Viewer::customer(org, customer)?
        }
        _ => anyhow::bail!("pass --org, --customer, or --user [--org]"),
    };
    Ok(viewer)
}
