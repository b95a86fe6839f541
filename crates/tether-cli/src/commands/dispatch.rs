use tether_config::TetherConfig;

use crate::cli::{Commands, GlobalFlags};
use crate::commands;

/// Dispatch a parsed command to the corresponding handler module.
pub fn dispatch(
    command: &Commands,
    config: &TetherConfig,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match command {
        Commands::Token { action } => commands::token::handle(action, &config.auth, flags),
        Commands::Key { action } => commands::key::handle(action, &config.auth, flags),
        Commands::Upsert { action } => commands::upsert::handle(action, flags),
    }
}
