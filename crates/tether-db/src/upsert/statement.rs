//! Rendered upsert statements and their bound parameters.

use serde::Serialize;
use serde_json::Value;
use sqlx::PgConnection;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;
use sqlx::types::Json;

use crate::error::DatabaseError;
use crate::ident::QualifiedName;
use crate::schema::{Column, ColumnKind};

/// PostgreSQL's limit on bind parameters per statement.
pub const MAX_PARAMS: usize = 65_535;

/// A bound parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Jsonb(Value),
}

impl SqlParam {
    fn bind<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        match self {
            Self::Text(s) => query.bind(s.as_str()),
            Self::Int(i) => query.bind(*i),
            Self::Float(f) => query.bind(*f),
            Self::Bool(b) => query.bind(*b),
            Self::Jsonb(v) => query.bind(Json(v)),
        }
    }
}

/// What happens when a row hits an existing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictAction {
    DoNothing,
    DoUpdate,
}

/// One `INSERT ... ON CONFLICT` statement with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    table: QualifiedName,
    sql: String,
    params: Vec<SqlParam>,
    rows: usize,
    action: ConflictAction,
}

impl Statement {
    pub(crate) const fn new(
        table: QualifiedName,
        sql: String,
        params: Vec<SqlParam>,
        rows: usize,
        action: ConflictAction,
    ) -> Self {
        Self {
            table,
            sql,
            params,
            rows,
            action,
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    #[must_use]
    pub const fn table(&self) -> &QualifiedName {
        &self.table
    }

    /// Number of rows in the `VALUES` list.
    #[must_use]
    pub const fn row_count(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub const fn action(&self) -> ConflictAction {
        self.action
    }

    /// Run the statement on `conn`, returning the number of rows inserted or
    /// updated. Rows skipped by the conflict guard do not count.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Store` with the driver's error unchanged,
    /// including row-level security rejections.
    pub async fn execute(&self, conn: &mut PgConnection) -> Result<u64, DatabaseError> {
        let mut query = sqlx::query(&self.sql);
        for param in &self.params {
            query = param.bind(query);
        }
        let result = query.execute(conn).await?;
        tracing::debug!(
            table = %self.table.key(),
            rows = self.rows,
            affected = result.rows_affected(),
            "executed upsert"
        );
        Ok(result.rows_affected())
    }
}

/// Collects parameters and hands out `$n` placeholders.
#[derive(Debug, Default)]
pub(crate) struct ParamList {
    params: Vec<SqlParam>,
}

impl ParamList {
    pub(crate) fn push(&mut self, param: SqlParam) -> Result<String, DatabaseError> {
        if self.params.len() == MAX_PARAMS {
            return Err(DatabaseError::Validation(format!(
                "batch needs more than {MAX_PARAMS} bind parameters; split it into smaller batches"
            )));
        }
        self.params.push(param);
        Ok(format!("${}", self.params.len()))
    }

    pub(crate) fn into_inner(self) -> Vec<SqlParam> {
        self.params
    }
}

/// SQL for one concrete value in `column`, pushing a parameter when needed.
///
/// - `null` renders as a literal `NULL`.
/// - structured columns, and objects or arrays anywhere, bind as `jsonb`.
/// - scalar columns with a cast bind as text and render `$n::cast`.
/// - with `row_type` set (inferred tables), strings are read through
///   `jsonb_populate_record` on that table's row type, so the server applies
///   the column's own input conversion (`timestamptz`, `uuid`, enums, ...).
/// - other scalars bind with their natural type.
pub(crate) fn render_value(
    column: &Column,
    value: &Value,
    row_type: Option<&QualifiedName>,
    params: &mut ParamList,
) -> Result<String, DatabaseError> {
    if value.is_null() {
        return Ok("NULL".to_string());
    }
    if column.kind() == ColumnKind::Structured || value.is_object() || value.is_array() {
        return params.push(SqlParam::Jsonb(value.clone()));
    }
    if let Some(cast) = column.cast() {
        let text = value.as_str().map_or_else(|| value.to_string(), str::to_string);
        return Ok(format!("{}::{cast}", params.push(SqlParam::Text(text))?));
    }
    if let (Some(table), Value::String(_)) = (row_type, value) {
        let mut field = serde_json::Map::new();
        field.insert(column.name().as_str().to_string(), value.clone());
        let placeholder = params.push(SqlParam::Jsonb(Value::Object(field)))?;
        return Ok(format!(
            "(jsonb_populate_record(NULL::{table}, {placeholder})).{}",
            column.name()
        ));
    }
    let param = match value {
        Value::String(s) => SqlParam::Text(s.clone()),
        Value::Bool(b) => SqlParam::Bool(*b),
        Value::Number(n) => n
            .as_i64()
            .map(SqlParam::Int)
            .or_else(|| n.as_f64().map(SqlParam::Float))
            .ok_or_else(|| {
                DatabaseError::Validation(format!(
                    "column {}: number {n} is not representable",
                    column.name().as_str()
                ))
            })?,
        Value::Null | Value::Array(_) | Value::Object(_) => SqlParam::Jsonb(value.clone()),
    };
    params.push(param)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn render(column: &Column, value: &Value) -> (String, Vec<SqlParam>) {
        let mut params = ParamList::default();
        let sql = render_value(column, value, None, &mut params).unwrap();
        (sql, params.into_inner())
    }

    fn render_inferred(column: &Column, value: &Value) -> (String, Vec<SqlParam>) {
        let table = QualifiedName::parse("sync.events").unwrap();
        let mut params = ParamList::default();
        let sql = render_value(column, value, Some(&table), &mut params).unwrap();
        (sql, params.into_inner())
    }

    #[test]
    fn null_is_literal() {
        let column = Column::new("n", ColumnKind::Scalar).unwrap();
        assert_eq!(render(&column, &Value::Null), ("NULL".to_string(), vec![]));
    }

    #[test]
    fn structured_binds_jsonb() {
        let column = Column::new("config", ColumnKind::Structured).unwrap();
        assert_eq!(
            render(&column, &json!({"a": 1})),
            ("$1".to_string(), vec![SqlParam::Jsonb(json!({"a": 1}))])
        );
        // A string in a jsonb column is a JSON string, not text.
        assert_eq!(
            render(&column, &json!("x")).1,
            vec![SqlParam::Jsonb(json!("x"))]
        );
    }

    #[test]
    fn cast_binds_text() {
        let column = Column::new("updated_at", ColumnKind::Scalar)
            .unwrap()
            .with_cast("timestamptz")
            .unwrap();
        assert_eq!(
            render(&column, &json!("2024-01-01T00:00:00Z")),
            (
                "$1::timestamptz".to_string(),
                vec![SqlParam::Text("2024-01-01T00:00:00Z".into())]
            )
        );
        let numeric = Column::new("amount", ColumnKind::Scalar)
            .unwrap()
            .with_cast("numeric")
            .unwrap();
        assert_eq!(render(&numeric, &json!(12.5)).1, vec![SqlParam::Text("12.5".into())]);
    }

    #[test]
    fn natural_types() {
        let column = Column::new("v", ColumnKind::Scalar).unwrap();
        assert_eq!(render(&column, &json!("s")).1, vec![SqlParam::Text("s".into())]);
        assert_eq!(render(&column, &json!(7)).1, vec![SqlParam::Int(7)]);
        assert_eq!(render(&column, &json!(1.5)).1, vec![SqlParam::Float(1.5)]);
        assert_eq!(render(&column, &json!(true)).1, vec![SqlParam::Bool(true)]);
        assert_eq!(render(&column, &json!([1])).1, vec![SqlParam::Jsonb(json!([1]))]);
    }

    #[test]
    fn inferred_strings_take_the_column_type() {
        let column = Column::new("happened_at", ColumnKind::Scalar).unwrap();
        assert_eq!(
            render_inferred(&column, &json!("2024-01-01T00:00:00Z")),
            (
                "(jsonb_populate_record(NULL::\"sync\".\"events\", $1)).\"happened_at\""
                    .to_string(),
                vec![SqlParam::Jsonb(json!({"happened_at": "2024-01-01T00:00:00Z"}))]
            )
        );
        // Non-strings keep their natural binding.
        assert_eq!(render_inferred(&column, &json!(7)).1, vec![SqlParam::Int(7)]);
        assert_eq!(render_inferred(&column, &Value::Null).0, "NULL");
    }

    #[test]
    fn parameter_limit_is_enforced() {
        let mut params = ParamList::default();
        for _ in 0..MAX_PARAMS {
            params.push(SqlParam::Bool(true)).unwrap();
        }
        assert!(matches!(
            params.push(SqlParam::Bool(true)),
            Err(DatabaseError::Validation(_))
        ));
    }
}
