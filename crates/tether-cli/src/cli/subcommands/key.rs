use clap::{Args, Subcommand};

/// API key commands.
#[derive(Clone, Debug, Subcommand)]
pub enum KeyCommands {
    /// Generate a new key and its storage hash.
    Generate(KeyGenerateArgs),
    /// Print the storage hash of an existing key.
    Hash(KeyHashArgs),
}

#[derive(Clone, Debug, Args)]
pub struct KeyGenerateArgs {
    /// Prefix joined to the random part with `_`.
    #[arg(long, default_value = "key")]
    pub prefix: String,
}

#[derive(Clone, Debug, Args)]
pub struct KeyHashArgs {
    pub key: String,
}
