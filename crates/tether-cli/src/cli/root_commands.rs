use clap::Subcommand;

use crate::cli::subcommands::{KeyCommands, TokenCommands, UpsertCommands};

/// Top-level command tree.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Viewer tokens.
    Token {
        #[command(subcommand)]
        action: TokenCommands,
    },
    /// API keys.
    Key {
        #[command(subcommand)]
        action: KeyCommands,
    },
    /// Upsert planning (offline).
    Upsert {
        #[command(subcommand)]
        action: UpsertCommands,
    },
}
