//! Rows handed to the upsert planner.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::DatabaseError;

/// One cell of a [`Row`].
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// A concrete value, including JSON `null` (SQL `NULL`).
    Value(Value),
    /// The field is present but undefined: the column default applies.
    Absent,
}

impl From<Value> for Cell {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Column name → [`Cell`], ordered by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(BTreeMap<String, Cell>);

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Mark `column` as present but undefined.
    #[must_use]
    pub fn with_absent(mut self, column: impl Into<String>) -> Self {
        self.0.insert(column.into(), Cell::Absent);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), Cell::Value(value.into()));
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.0.get(column)
    }

    /// Concrete value of `column`, if the row has one.
    #[must_use]
    pub fn value(&self, column: &str) -> Option<&Value> {
        match self.0.get(column) {
            Some(Cell::Value(value)) => Some(value),
            Some(Cell::Absent) | None => None,
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Self(map.into_iter().map(|(k, v)| (k, Cell::Value(v))).collect())
    }
}

impl TryFrom<Value> for Row {
    type Error = DatabaseError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(map.into()),
            other => Err(DatabaseError::Validation(format!(
                "a row must be a JSON object, got {}",
                json_type(&other)
            ))),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Cell)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Cell)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Parse a JSON array of objects (or a single object) into rows.
///
/// # Errors
///
/// Returns `DatabaseError::Validation` if `value` is neither, or an array
/// element is not an object.
pub fn rows_from_json(value: Value) -> Result<Vec<Row>, DatabaseError> {
    match value {
        Value::Array(items) => items.into_iter().map(Row::try_from).collect(),
        Value::Object(map) => Ok(vec![map.into()]),
        other => Err(DatabaseError::Validation(format!(
            "expected an object or an array of objects, got {}",
            json_type(&other)
        ))),
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
