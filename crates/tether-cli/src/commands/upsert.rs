use std::io::Read;
use std::path::Path;

use anyhow::Context;
use tether_db::row::rows_from_json;
use tether_db::{TableRegistry, UpsertOptions, WritePlan, upsert};

use crate::cli::GlobalFlags;
use crate::cli::subcommands::UpsertCommands;
use crate::cli::subcommands::upsert::UpsertPlanArgs;
use crate::output::output;

/// Handle `tether upsert <subcommand>`.
pub fn handle(action: &UpsertCommands, flags: &GlobalFlags) -> anyhow::Result<()> {
    match action {
        UpsertCommands::Plan(args) => {
            let plan = plan(args)?;
            output(&plan, flags.format)
        }
    }
}

/// Plan against an inferred descriptor: the CLI has no table registry.
fn plan(args: &UpsertPlanArgs) -> anyhow::Result<WritePlan> {
    let text = read_rows(&args.rows)?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("invalid JSON in {}", args.rows.display()))?;
    let rows = rows_from_json(value)?;

    let options = UpsertOptions::builder()
        .key_columns(&args.key)
        .shallow_merge_jsonb_columns(&args.shallow_merge)
        .no_diff_columns(&args.no_diff)
        .insert_only_columns(&args.insert_only)
        .must_match_columns(&args.must_match)
        .undefined_as_default(args.undefined_as_default)
        .build();

    let registry = TableRegistry::default();
    Ok(upsert::upsert(&registry, &args.table, &rows, &options)?)
}

fn read_rows(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read rows from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rows file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn args(rows: &Path) -> UpsertPlanArgs {
        UpsertPlanArgs {
            table: "connector_config".into(),
            rows: rows.to_path_buf(),
            key: vec!["id".into()],
            shallow_merge: vec![],
            no_diff: vec!["updated_at".into()],
            insert_only: vec![],
            must_match: vec![],
            undefined_as_default: false,
        }
    }

    fn rows_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn plans_from_rows_file() {
        let file = rows_file(
            r#"[{"id": "ccfg_1", "org_id": "org_123", "config": {}, "updated_at": "2024-01-01T00:00:00Z"}]"#,
        );
        let plan = plan(&args(file.path())).unwrap();
        let statement = plan.statement().expect("non-empty batch writes");
        assert_eq!(statement.row_count(), 1);
        assert!(statement.sql().starts_with("INSERT INTO \"connector_config\" AS t"));
        assert!(statement.sql().contains("ON CONFLICT (\"id\") DO UPDATE SET"));
        assert!(!statement.sql().contains("t.\"updated_at\" IS DISTINCT FROM"));
    }

    #[test]
    fn plan_output_names_the_table() {
        let file = rows_file(r#"[{"id": "ccfg_1", "org_id": "org_123"}]"#);
        let plan = plan(&args(file.path())).unwrap();
        let value = serde_json::to_value(&plan).unwrap();
        assert_eq!(value["plan"], "write");
        assert_eq!(value["table"], "connector_config");
        assert_eq!(value["rows"], 1);
    }

    #[test]
    fn empty_array_is_a_noop() {
        let file = rows_file("[]");
        assert!(plan(&args(file.path())).unwrap().is_noop());
    }

    #[test]
    fn missing_key_column_is_reported() {
        let file = rows_file(r#"{"id": "ccfg_1"}"#);
        let mut args = args(file.path());
        args.key.clear();
        assert!(plan(&args).is_err());
    }

    #[test]
    fn invalid_json_names_the_file() {
        let file = rows_file("{not json");
        let err = plan(&args(file.path())).unwrap_err();
        assert!(format!("{err:#}").contains("invalid JSON"));
    }
}
