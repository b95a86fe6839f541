//! Table metadata: the startup registry and the ad-hoc inference fallback.
//!
//! Registered descriptors are validated once when the registry is built and
//! shared as `Arc<TableDescriptor>` afterwards. Tables that were never
//! registered get a descriptor inferred from the first row of the batch.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::DatabaseError;
use crate::ident::{Ident, QualifiedName, SqlCast};
use crate::row::{Cell, Row};

/// How values of a column are bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Text, numbers, booleans, timestamps, ...
    Scalar,
    /// `jsonb`: objects and arrays.
    Structured,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: Ident,
    kind: ColumnKind,
    cast: Option<SqlCast>,
}

impl Column {
    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidIdentifier` for an invalid name.
    pub fn new(name: &str, kind: ColumnKind) -> Result<Self, DatabaseError> {
        Ok(Self {
            name: Ident::new(name)?,
            kind,
            cast: None,
        })
    }

    /// Bind scalar values as text and cast them to `type_name` in SQL.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidIdentifier` if `type_name` is not an
    /// allowed type name.
    pub fn with_cast(mut self, type_name: &str) -> Result<Self, DatabaseError> {
        self.cast = Some(SqlCast::new(type_name)?);
        Ok(self)
    }

    #[must_use]
    pub const fn name(&self) -> &Ident {
        &self.name
    }

    #[must_use]
    pub const fn kind(&self) -> ColumnKind {
        self.kind
    }

    #[must_use]
    pub const fn cast(&self) -> Option<&SqlCast> {
        self.cast.as_ref()
    }
}

/// Columns and primary key of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    name: QualifiedName,
    columns: Vec<Column>,
    primary_key: Vec<Ident>,
    inferred: bool,
}

impl TableDescriptor {
    #[must_use]
    pub fn builder(name: &str) -> TableBuilder {
        TableBuilder::new(name)
    }

    /// Infer a descriptor from the first row of a batch.
    ///
    /// Objects and arrays make a structured column, everything else (including
    /// `null` and absent cells) a scalar one. Later rows are not consulted.
    /// An inferred descriptor has no primary key.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidIdentifier` if the table name or a
    /// field name is not a valid identifier.
    pub fn infer(name: &str, first_row: Option<&Row>) -> Result<Self, DatabaseError> {
        let columns = first_row
            .into_iter()
            .flat_map(Row::iter)
            .map(|(column, cell)| {
                let kind = match cell {
                    Cell::Value(Value::Object(_) | Value::Array(_)) => ColumnKind::Structured,
                    Cell::Value(_) | Cell::Absent => ColumnKind::Scalar,
                };
                Column::new(column, kind)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: QualifiedName::parse(name)?,
            columns,
            primary_key: Vec::new(),
            inferred: true,
        })
    }

    #[must_use]
    pub const fn name(&self) -> &QualifiedName {
        &self.name
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.as_str() == name)
    }

    #[must_use]
    pub fn primary_key(&self) -> &[Ident] {
        &self.primary_key
    }

    /// Whether this descriptor came from [`Self::infer`] rather than the
    /// registry.
    #[must_use]
    pub const fn is_inferred(&self) -> bool {
        self.inferred
    }
}

/// Builder for a registered [`TableDescriptor`].
#[derive(Debug, Clone)]
pub struct TableBuilder {
    name: String,
    columns: Vec<(String, ColumnKind, Option<String>)>,
    primary_key: Vec<String>,
}

impl TableBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    #[must_use]
    pub fn scalar(mut self, name: impl Into<String>) -> Self {
        self.columns.push((name.into(), ColumnKind::Scalar, None));
        self
    }

    /// Scalar column whose values are cast to `type_name` (e.g. `uuid`,
    /// `timestamptz`).
    #[must_use]
    pub fn typed(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.columns
            .push((name.into(), ColumnKind::Scalar, Some(type_name.into())));
        self
    }

    #[must_use]
    pub fn structured(mut self, name: impl Into<String>) -> Self {
        self.columns.push((name.into(), ColumnKind::Structured, None));
        self
    }

    #[must_use]
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidIdentifier` for an invalid name or cast,
    /// or `DatabaseError::Configuration` for a duplicate column or a primary
    /// key column that is not declared.
    pub fn build(self) -> Result<TableDescriptor, DatabaseError> {
        let name = QualifiedName::parse(&self.name)?;

        let mut columns: Vec<Column> = Vec::with_capacity(self.columns.len());
        for (column, kind, cast) in self.columns {
            let mut column = Column::new(&column, kind)?;
            if let Some(cast) = cast {
                column = column.with_cast(&cast)?;
            }
            if columns.iter().any(|c| c.name == column.name) {
                return Err(DatabaseError::Configuration(format!(
                    "table {}: column {} declared twice",
                    name.key(),
                    column.name.as_str()
                )));
            }
            columns.push(column);
        }

        let primary_key = self
            .primary_key
            .iter()
            .map(|pk| {
                let pk = Ident::new(pk.as_str())?;
                if columns.iter().any(|c| c.name == pk) {
                    Ok(pk)
                } else {
                    Err(DatabaseError::Configuration(format!(
                        "table {}: primary key column {} is not declared",
                        name.key(),
                        pk.as_str()
                    )))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TableDescriptor {
            name,
            columns,
            primary_key,
            inferred: false,
        })
    }
}

/// Known tables, keyed by unquoted `schema.table` (or `table`).
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: HashMap<String, Arc<TableDescriptor>>,
}

impl TableRegistry {
    #[must_use]
    pub fn builder() -> TableRegistryBuilder {
        TableRegistryBuilder::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<TableDescriptor>> {
        self.tables.get(name).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// The registered descriptor for `name`, or one inferred from the first
    /// of `rows`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidIdentifier` if inference meets an
    /// invalid table or field name.
    pub fn resolve(&self, name: &str, rows: &[Row]) -> Result<Arc<TableDescriptor>, DatabaseError> {
        if let Some(descriptor) = self.get(name) {
            return Ok(descriptor);
        }
        tracing::debug!(table = name, "table not registered; inferring columns from first row");
        TableDescriptor::infer(name, rows.first()).map(Arc::new)
    }
}

#[derive(Debug, Default)]
pub struct TableRegistryBuilder {
    tables: Vec<TableBuilder>,
}

impl TableRegistryBuilder {
    #[must_use]
    pub fn table(mut self, table: TableBuilder) -> Self {
        self.tables.push(table);
        self
    }

    /// Validate every table.
    ///
    /// # Errors
    ///
    /// Returns the first table's build error, or
    /// `DatabaseError::Configuration` for a table registered twice.
    pub fn build(self) -> Result<TableRegistry, DatabaseError> {
        let mut tables = HashMap::with_capacity(self.tables.len());
        for table in self.tables {
            let descriptor = table.build()?;
            let key = descriptor.name().key();
            if tables.insert(key.clone(), Arc::new(descriptor)).is_some() {
                return Err(DatabaseError::Configuration(format!(
                    "table {key} registered twice"
                )));
            }
        }
        Ok(TableRegistry { tables })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn connector_config() -> TableBuilder {
        TableDescriptor::builder("connector_config")
            .scalar("id")
            .scalar("org_id")
            .structured("config")
            .typed("updated_at", "timestamptz")
            .primary_key(["id"])
    }

    #[test]
    fn registered_table_builds() {
        let table = connector_config().build().unwrap();
        assert_eq!(table.primary_key(), &[Ident::new("id").unwrap()]);
        assert_eq!(table.column("config").unwrap().kind(), ColumnKind::Structured);
        assert_eq!(
            table.column("updated_at").unwrap().cast().map(SqlCast::as_str),
            Some("timestamptz")
        );
        assert!(!table.is_inferred());
    }

    #[test]
    fn undeclared_primary_key_is_a_configuration_error() {
        let err = TableDescriptor::builder("t")
            .scalar("a")
            .primary_key(["id"])
            .build()
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Configuration(_)));
    }

    #[test]
    fn duplicate_columns_are_rejected() {
        let err = TableDescriptor::builder("t")
            .scalar("a")
            .structured("a")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn bad_identifiers_fail_the_build() {
        assert!(TableDescriptor::builder("t").scalar("a b").build().is_err());
        assert!(TableDescriptor::builder("t; --").scalar("a").build().is_err());
        assert!(
            TableDescriptor::builder("t")
                .typed("a", "text; drop")
                .build()
                .is_err()
        );
    }

    #[test]
    fn inference_uses_first_row_only() {
        let rows = vec![
            Row::try_from(json!({"id": "a", "config": {}, "tags": [1], "n": null})).unwrap(),
            Row::try_from(json!({"id": "b", "config": "not an object"})).unwrap(),
        ];
        let table = TableDescriptor::infer("things", rows.first()).unwrap();
        assert!(table.is_inferred());
        assert!(table.primary_key().is_empty());
        assert_eq!(table.column("config").unwrap().kind(), ColumnKind::Structured);
        assert_eq!(table.column("tags").unwrap().kind(), ColumnKind::Structured);
        assert_eq!(table.column("id").unwrap().kind(), ColumnKind::Scalar);
        assert_eq!(table.column("n").unwrap().kind(), ColumnKind::Scalar);
    }

    #[test]
    fn registry_prefers_registered_descriptor() {
        let registry = TableRegistry::builder()
            .table(connector_config())
            .build()
            .unwrap();
        let rows = vec![Row::new().with("id", "x")];

        let registered = registry.resolve("connector_config", &rows).unwrap();
        assert!(!registered.is_inferred());
        assert_eq!(registered.columns().len(), 4);

        let inferred = registry.resolve("other", &rows).unwrap();
        assert!(inferred.is_inferred());
        assert_eq!(inferred.columns().len(), 1);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let err = TableRegistry::builder()
            .table(connector_config())
            .table(connector_config())
            .build()
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Configuration(_)));
    }

    #[test]
    fn schema_qualified_tables_are_keyed_unquoted() {
        let registry = TableRegistry::builder()
            .table(
                TableDescriptor::builder("sync.accounts")
                    .scalar("id")
                    .primary_key(["id"]),
            )
            .build()
            .unwrap();
        assert!(registry.get("sync.accounts").is_some());
        assert!(registry.get("accounts").is_none());
    }
}
