use clap::{ArgGroup, Args, Subcommand};

/// Viewer token commands.
#[derive(Clone, Debug, Subcommand)]
pub enum TokenCommands {
    /// Sign a token for an org, customer, or user.
    Mint(TokenMintArgs),
    /// Verify a token and print its viewer.
    Inspect(TokenInspectArgs),
}

#[derive(Clone, Debug, Args)]
#[command(group(
    ArgGroup::new("subject")
        .required(true)
        .multiple(true)
        .args(["org", "customer", "user"])
))]
pub struct TokenMintArgs {
    /// Organization ID (alone: an org token; with --user: the user's org).
    #[arg(long)]
    pub org: Option<String>,
    /// Customer as ORG/CUSTOMER.
    #[arg(long, conflicts_with_all = ["org", "user"])]
    pub customer: Option<String>,
    /// User ID.
    #[arg(long)]
    pub user: Option<String>,
    /// Validity in seconds (defaults to auth.token_ttl_secs).
    #[arg(long)]
    pub ttl: Option<u64>,
}

#[derive(Clone, Debug, Args)]
pub struct TokenInspectArgs {
    /// The token to verify.
    pub token: String,
}
