//! Upsert planning: which columns are written, updated, compared, and guarded.

use serde::Serialize;
use sqlx::PgConnection;

use crate::error::DatabaseError;
use crate::ident::{Ident, QualifiedName};
use crate::row::{Cell, Row};
use crate::schema::{Column, ColumnKind, TableDescriptor};

use super::options::UpsertOptions;
use super::statement::{ConflictAction, ParamList, Statement, render_value};

/// Alias of the target table inside the statement.
const TARGET: &str = "t";

/// Result of planning an upsert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "plan", rename_all = "snake_case")]
pub enum WritePlan {
    /// Nothing to write (empty batch).
    Noop { table: String },
    /// One statement covering the whole batch.
    Write(Statement),
}

impl WritePlan {
    #[must_use]
    pub const fn statement(&self) -> Option<&Statement> {
        match self {
            Self::Noop { .. } => None,
            Self::Write(statement) => Some(statement),
        }
    }

    #[must_use]
    pub const fn is_noop(&self) -> bool {
        matches!(self, Self::Noop { .. })
    }

    /// Run the plan on `conn` (normally a viewer transaction's connection).
    ///
    /// # Errors
    ///
    /// Same as [`Statement::execute`].
    pub async fn execute(&self, conn: &mut PgConnection) -> Result<u64, DatabaseError> {
        match self {
            Self::Noop { .. } => Ok(0),
            Self::Write(statement) => statement.execute(conn).await,
        }
    }
}

/// Plan an upsert of `rows` into `table`.
///
/// # Errors
///
/// - `DatabaseError::Configuration`: no key columns, or (for registered
///   tables) an option names an undeclared column or shallow-merges a
///   non-`jsonb` column.
/// - `DatabaseError::InvalidIdentifier`: an option names an invalid column.
/// - `DatabaseError::Validation`: a row has a column the table does not
///   know, a must-match column is missing from the batch, nothing is left to
///   write, or the batch needs too many parameters.
pub fn plan(
    table: &TableDescriptor,
    rows: &[Row],
    options: &UpsertOptions,
) -> Result<WritePlan, DatabaseError> {
    let name = table.name();
    let keys = key_columns(table, options)?;
    let shallow_merge = option_columns(
        table,
        "shallow_merge_jsonb_columns",
        &options.shallow_merge_jsonb_columns,
    )?;
    let no_diff = option_columns(table, "no_diff_columns", &options.no_diff_columns)?;
    let insert_only = option_columns(table, "insert_only_columns", &options.insert_only_columns)?;
    let must_match = option_columns(table, "must_match_columns", &options.must_match_columns)?;

    if !table.is_inferred()
        && let Some(column) = shallow_merge.iter().find(|c| {
            table
                .column(c.as_str())
                .is_some_and(|c| c.kind() != ColumnKind::Structured)
        })
    {
        return Err(DatabaseError::Configuration(format!(
            "table {}: shallow merge column {} is not a jsonb column",
            name.key(),
            column.as_str()
        )));
    }

    if rows.is_empty() {
        tracing::debug!(table = %name.key(), "empty batch; nothing to upsert");
        return Ok(WritePlan::Noop { table: name.key() });
    }

    check_known_columns(table, rows)?;
    let columns = batch_columns(table, rows, options.undefined_as_default);
    if columns.is_empty() {
        return Err(DatabaseError::Validation(format!(
            "table {}: no row has a value to write",
            name.key()
        )));
    }
    if let Some(missing) = must_match
        .iter()
        .find(|m| !columns.iter().any(|c| c.name() == *m))
    {
        return Err(DatabaseError::Validation(format!(
            "table {}: must-match column {} has no value in this batch",
            name.key(),
            missing.as_str()
        )));
    }

    let updatable: Vec<&Column> = columns
        .iter()
        .copied()
        .filter(|c| !keys.contains(c.name()) && !insert_only.contains(c.name()))
        .collect();
    let compared: Vec<&Column> = updatable
        .iter()
        .copied()
        .filter(|c| !no_diff.contains(c.name()))
        .collect();

    if !options.undefined_as_default && !compared.is_empty() {
        check_complete_rows(table, rows, &updatable)?;
    }

    let row_type = table.is_inferred().then_some(name);
    let mut params = ParamList::default();
    let values = rows
        .iter()
        .map(|row| render_row(row, &columns, row_type, &mut params))
        .collect::<Result<Vec<_>, _>>()?;

    let mut sql = format!(
        "INSERT INTO {name} AS {TARGET} ({}) VALUES {} ON CONFLICT ({}) ",
        join(columns.iter().map(|c| c.name().to_string())),
        values.join(", "),
        join(keys.iter().map(ToString::to_string)),
    );

    let action = if compared.is_empty() {
        sql.push_str("DO NOTHING");
        ConflictAction::DoNothing
    } else {
        let assignment = |c: &Column| {
            if shallow_merge.contains(c.name()) {
                format!(
                    "COALESCE({TARGET}.{col}, '{{}}'::jsonb) || excluded.{col}",
                    col = c.name()
                )
            } else {
                format!("excluded.{}", c.name())
            }
        };
        let sets = updatable
            .iter()
            .map(|c| format!("{} = {}", c.name(), assignment(*c)));
        let diffs = compared
            .iter()
            .map(|c| format!("{TARGET}.{} IS DISTINCT FROM ({})", c.name(), assignment(*c)));
        let guards = must_match
            .iter()
            .map(|m| format!(" AND {TARGET}.{m} IS NOT DISTINCT FROM excluded.{m}"));

        sql.push_str("DO UPDATE SET ");
        sql.push_str(&join(sets));
        sql.push_str(" WHERE (");
        sql.push_str(&diffs.collect::<Vec<_>>().join(" OR "));
        sql.push(')');
        sql.extend(guards);
        ConflictAction::DoUpdate
    };

    tracing::debug!(
        table = %name.key(),
        rows = rows.len(),
        columns = columns.len(),
        updatable = updatable.len(),
        compared = compared.len(),
        action = ?action,
        "planned upsert"
    );

    Ok(WritePlan::Write(Statement::new(
        name.clone(),
        sql,
        params.into_inner(),
        rows.len(),
        action,
    )))
}

fn join(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(", ")
}

fn render_row(
    row: &Row,
    columns: &[&Column],
    row_type: Option<&QualifiedName>,
    params: &mut ParamList,
) -> Result<String, DatabaseError> {
    let cells = columns
        .iter()
        .map(|column| match row.get(column.name().as_str()) {
            Some(Cell::Value(value)) => render_value(column, value, row_type, params),
            Some(Cell::Absent) | None => Ok("DEFAULT".to_string()),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("({})", cells.join(", ")))
}

/// Conflict target: explicit option, else the declared primary key.
fn key_columns(table: &TableDescriptor, options: &UpsertOptions) -> Result<Vec<Ident>, DatabaseError> {
    let keys = if options.key_columns.is_empty() {
        table.primary_key().to_vec()
    } else {
        option_columns(table, "key_columns", &options.key_columns)?
    };
    if keys.is_empty() {
        return Err(DatabaseError::Configuration(format!(
            "table {}: no key columns; pass key_columns or declare a primary key",
            table.name().key()
        )));
    }
    Ok(keys)
}

/// Validate option column names. Registered tables must declare them.
fn option_columns(
    table: &TableDescriptor,
    option: &str,
    columns: &[String],
) -> Result<Vec<Ident>, DatabaseError> {
    columns
        .iter()
        .map(|column| {
            let ident = Ident::new(column.as_str())?;
            if !table.is_inferred() && table.column(column).is_none() {
                return Err(DatabaseError::Configuration(format!(
                    "table {}: {option} names undeclared column {column}",
                    table.name().key()
                )));
            }
            Ok(ident)
        })
        .collect()
}

fn check_known_columns(table: &TableDescriptor, rows: &[Row]) -> Result<(), DatabaseError> {
    for (index, row) in rows.iter().enumerate() {
        if let Some(unknown) = row.columns().find(|c| table.column(c).is_none()) {
            return Err(DatabaseError::Validation(format!(
                "row {index}: {unknown} is not a column of {}",
                table.name().key()
            )));
        }
    }
    Ok(())
}

/// Every row must carry a value for every updated column.
///
/// A row without one would get `DEFAULT` in its `VALUES` slot, and the
/// conflict update would then overwrite the stored value with that default,
/// which the same row upserted alone never does.
fn check_complete_rows(
    table: &TableDescriptor,
    rows: &[Row],
    updatable: &[&Column],
) -> Result<(), DatabaseError> {
    for (index, row) in rows.iter().enumerate() {
        if let Some(column) = updatable
            .iter()
            .find(|c| !matches!(row.get(c.name().as_str()), Some(Cell::Value(_))))
        {
            return Err(DatabaseError::Validation(format!(
                "row {index}: no value for {} of {}, which other rows in the batch update; \
                 send rows with different columns in separate batches",
                column.name().as_str(),
                table.name().key()
            )));
        }
    }
    Ok(())
}

/// Columns written by this batch, in table order.
///
/// A column is written when some row has a concrete value for it, or, with
/// `undefined_as_default`, when some row mentions it at all.
fn batch_columns<'a>(
    table: &'a TableDescriptor,
    rows: &[Row],
    undefined_as_default: bool,
) -> Vec<&'a Column> {
    table
        .columns()
        .iter()
        .filter(|column| {
            rows.iter().any(|row| match row.get(column.name().as_str()) {
                Some(Cell::Value(_)) => true,
                Some(Cell::Absent) => undefined_as_default,
                None => false,
            })
        })
        .collect()
}
