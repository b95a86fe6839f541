use clap::Parser;

pub mod global;
pub mod root_commands;
pub mod subcommands;

pub use global::{GlobalFlags, OutputFormat};
pub use root_commands::Commands;

/// Top-level CLI parser for the `tether` binary.
#[derive(Debug, Parser)]
#[command(
    name = "tether",
    version,
    about = "Tether - viewer tokens, API keys and upsert plans"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: json, raw
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    #[must_use]
    pub const fn global_flags(&self) -> GlobalFlags {
        GlobalFlags {
            format: self.format,
            quiet: self.quiet,
            verbose: self.verbose,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::subcommands::{KeyCommands, TokenCommands, UpsertCommands};
    use super::{Cli, Commands, OutputFormat};

    #[test]
    fn clap_command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["tether", "key", "generate", "--format", "raw", "--quiet"])
            .expect("cli should parse");

        assert_eq!(cli.format, OutputFormat::Raw);
        assert!(cli.quiet);
        assert!(matches!(
            cli.command,
            Commands::Key {
                action: KeyCommands::Generate(_)
            }
        ));
    }

    #[test]
    fn mint_requires_a_subject() {
        assert!(Cli::try_parse_from(["tether", "token", "mint"]).is_err());
        assert!(Cli::try_parse_from(["tether", "token", "mint", "--ttl", "60"]).is_err());
    }

    #[test]
    fn mint_accepts_user_with_org() {
        let cli = Cli::try_parse_from([
            "tether", "token", "mint", "--user", "u_1", "--org", "org_123",
        ])
        .expect("cli should parse");
        let Commands::Token {
            action: TokenCommands::Mint(args),
        } = cli.command
        else {
            panic!("expected token mint");
        };
        assert_eq!(args.user.as_deref(), Some("u_1"));
        assert_eq!(args.org.as_deref(), Some("org_123"));
    }

    #[test]
    fn mint_rejects_customer_with_org() {
        let parsed = Cli::try_parse_from([
            "tether",
            "token",
            "mint",
            "--customer",
            "org_123/cus_9",
            "--org",
            "org_123",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn plan_collects_repeated_column_flags() {
        let cli = Cli::try_parse_from([
            "tether",
            "upsert",
            "plan",
            "--table",
            "connector_config",
            "--rows",
            "rows.json",
            "--no-diff",
            "updated_at",
            "--no-diff",
            "created_at",
            "--undefined-as-default",
        ])
        .expect("cli should parse");
        let Commands::Upsert {
            action: UpsertCommands::Plan(args),
        } = cli.command
        else {
            panic!("expected upsert plan");
        };
        assert_eq!(args.no_diff, vec!["updated_at", "created_at"]);
        assert!(args.undefined_as_default);
        assert!(args.key.is_empty());
    }
}
