use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Upsert commands.
#[derive(Clone, Debug, Subcommand)]
pub enum UpsertCommands {
    /// Render the SQL and parameters for a batch without touching a database.
    Plan(UpsertPlanArgs),
}

#[derive(Clone, Debug, Args)]
pub struct UpsertPlanArgs {
    /// Target table, optionally schema-qualified.
    #[arg(long)]
    pub table: String,
    /// JSON file holding one object or an array of objects (`-` for stdin).
    #[arg(long)]
    pub rows: PathBuf,
    /// Conflict key column (repeatable).
    #[arg(long)]
    pub key: Vec<String>,
    /// jsonb column merged into the stored value (repeatable).
    #[arg(long)]
    pub shallow_merge: Vec<String>,
    /// Column written but ignored when detecting changes (repeatable).
    #[arg(long)]
    pub no_diff: Vec<String>,
    /// Column written on insert only (repeatable).
    #[arg(long)]
    pub insert_only: Vec<String>,
    /// Column that must equal the stored value for an update (repeatable).
    #[arg(long)]
    pub must_match: Vec<String>,
    /// Write missing fields as DEFAULT instead of leaving them out.
    #[arg(long)]
    pub undefined_as_default: bool,
}
