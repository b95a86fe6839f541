//! Idempotent batch upserts.
//!
//! A batch becomes one `INSERT ... ON CONFLICT` statement. On conflict the
//! stored row is only touched when a compared column actually changes, so
//! re-syncing unchanged data neither rewrites rows nor bumps `updated_at`:
//!
//! ```sql
//! INSERT INTO "connector_config" AS t ("id", "org_id", "config", "updated_at")
//! VALUES ($1, $2, $3, $4::timestamptz)
//! ON CONFLICT ("id") DO UPDATE SET
//!     "org_id" = excluded."org_id", "config" = excluded."config",
//!     "updated_at" = excluded."updated_at"
//! WHERE (t."org_id" IS DISTINCT FROM (excluded."org_id")
//!     OR t."config" IS DISTINCT FROM (excluded."config"))
//! ```
//!
//! Statements are planned without a connection ([`upsert`], [`upsert_one`])
//! and executed inside a viewer transaction, so row-level security applies to
//! every write.

mod options;
mod plan;
mod statement;

pub use options::{UpsertOptions, UpsertOptionsBuilder};
pub use plan::{WritePlan, plan};
pub use statement::{ConflictAction, MAX_PARAMS, SqlParam, Statement};

use crate::error::DatabaseError;
use crate::row::Row;
use crate::schema::TableRegistry;

/// Plan an upsert of `rows` into `table`, resolving the table through
/// `registry` (or inferring it from the first row).
///
/// # Errors
///
/// See [`plan`].
pub fn upsert(
    registry: &TableRegistry,
    table: &str,
    rows: &[Row],
    options: &UpsertOptions,
) -> Result<WritePlan, DatabaseError> {
    let descriptor = registry.resolve(table, rows)?;
    plan(&descriptor, rows, options)
}

/// [`upsert`] for a single row.
///
/// # Errors
///
/// See [`plan`].
pub fn upsert_one(
    registry: &TableRegistry,
    table: &str,
    row: Row,
    options: &UpsertOptions,
) -> Result<WritePlan, DatabaseError> {
    upsert(registry, table, std::slice::from_ref(&row), options)
}
