//! SQL identifiers and type names that are safe to splice into statements.
//!
//! Values are always bound as parameters; names cannot be, so every table,
//! column, and cast that reaches a statement passes through one of these
//! types first.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::DatabaseError;

/// PostgreSQL truncates identifiers longer than this (`NAMEDATALEN - 1`).
pub const MAX_IDENT_LEN: usize = 63;

/// A validated identifier: `[A-Za-z_][A-Za-z0-9_]*`, at most 63 bytes.
///
/// `Display` renders the double-quoted form, so case is preserved and
/// reserved words are harmless.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(String);

impl Ident {
    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidIdentifier` if `name` is empty, too
    /// long, or contains anything but ASCII letters, digits, and `_`, or
    /// starts with a digit.
    pub fn new(name: impl Into<String>) -> Result<Self, DatabaseError> {
        let name = name.into();
        let invalid = |reason| DatabaseError::InvalidIdentifier {
            ident: name.clone(),
            reason,
        };
        let mut chars = name.chars();
        match chars.next() {
            None => return Err(invalid("must not be empty")),
            Some(c) if !(c.is_ascii_alphabetic() || c == '_') => {
                return Err(invalid("must start with a letter or underscore"));
            }
            Some(_) => {}
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid("only ASCII letters, digits, and underscores are allowed"));
        }
        if name.len() > MAX_IDENT_LEN {
            return Err(invalid("longer than 63 bytes"));
        }
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // No quote can appear inside a validated identifier.
        write!(f, "\"{}\"", self.0)
    }
}

impl FromStr for Ident {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// `[schema.]name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    schema: Option<Ident>,
    name: Ident,
}

impl QualifiedName {
    #[must_use]
    pub const fn new(schema: Option<Ident>, name: Ident) -> Self {
        Self { schema, name }
    }

    /// Parse `"table"` or `"schema.table"`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidIdentifier` for more than one `.` or an
    /// invalid part.
    pub fn parse(qualified: &str) -> Result<Self, DatabaseError> {
        let mut parts = qualified.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) => Ok(Self::new(None, Ident::new(name)?)),
            (Some(schema), Some(name), None) => {
                Ok(Self::new(Some(Ident::new(schema)?), Ident::new(name)?))
            }
            _ => Err(DatabaseError::InvalidIdentifier {
                ident: qualified.to_string(),
                reason: "expected 'table' or 'schema.table'",
            }),
        }
    }

    #[must_use]
    pub const fn schema(&self) -> Option<&Ident> {
        self.schema.as_ref()
    }

    #[must_use]
    pub const fn name(&self) -> &Ident {
        &self.name
    }

    /// Unquoted `schema.table` form, used as the registry key.
    #[must_use]
    pub fn key(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema.as_str(), self.name.as_str()),
            None => self.name.as_str().to_string(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Serializes as the unquoted [`QualifiedName::key`] form.
impl Serialize for QualifiedName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

impl FromStr for QualifiedName {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A type name allowed after `::` in a rendered statement.
///
/// Accepted shape: identifier words separated by single spaces (so
/// `timestamp with time zone` works), an optional `(p)` or `(p,s)` modifier,
/// and an optional `[]` suffix. Stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SqlCast(String);

impl SqlCast {
    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidIdentifier` if `type_name` does not
    /// have the accepted shape.
    pub fn new(type_name: &str) -> Result<Self, DatabaseError> {
        let normalized = type_name.trim().to_ascii_lowercase();
        let invalid = |reason| DatabaseError::InvalidIdentifier {
            ident: type_name.to_string(),
            reason,
        };

        let base = normalized.strip_suffix("[]").unwrap_or(&normalized);
        let words = match base.split_once('(') {
            Some((words, modifier)) => {
                let digits = modifier
                    .strip_suffix(')')
                    .ok_or_else(|| invalid("unterminated type modifier"))?;
                let valid_modifier = !digits.is_empty()
                    && digits.split(',').count() <= 2
                    && digits
                        .split(',')
                        .all(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()));
                if !valid_modifier {
                    return Err(invalid("type modifier must be (p) or (p,s)"));
                }
                words
            }
            None => base,
        };

        if words.is_empty() || words.split(' ').any(|word| Ident::new(word).is_err()) {
            return Err(invalid("not an allowed type name"));
        }
        Ok(Self(normalized))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlCast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SqlCast {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("id")]
    #[case("_private")]
    #[case("Config2")]
    #[case("select")]
    fn valid_identifiers(#[case] name: &str) {
        assert_eq!(Ident::new(name).unwrap().as_str(), name);
    }

    #[rstest]
    #[case("")]
    #[case("1col")]
    #[case("col-name")]
    #[case("col name")]
    #[case("a\"b")]
    #[case("x; DROP TABLE t")]
    #[case("caf\u{e9}")]
    fn invalid_identifiers(#[case] name: &str) {
        assert!(matches!(
            Ident::new(name),
            Err(DatabaseError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn identifier_length_limit() {
        assert!(Ident::new("a".repeat(MAX_IDENT_LEN)).is_ok());
        assert!(Ident::new("a".repeat(MAX_IDENT_LEN + 1)).is_err());
    }

    #[test]
    fn identifiers_render_quoted() {
        assert_eq!(Ident::new("Order").unwrap().to_string(), "\"Order\"");
    }

    #[test]
    fn qualified_names() {
        let name = QualifiedName::parse("sync.connector_config").unwrap();
        assert_eq!(name.to_string(), "\"sync\".\"connector_config\"");
        assert_eq!(name.key(), "sync.connector_config");
        assert_eq!(
            QualifiedName::parse("things").unwrap().to_string(),
            "\"things\""
        );
        assert!(QualifiedName::parse("a.b.c").is_err());
        assert!(QualifiedName::parse("a.").is_err());
    }

    #[rstest]
    #[case("uuid", "uuid")]
    #[case("TIMESTAMPTZ", "timestamptz")]
    #[case("text[]", "text[]")]
    #[case("numeric(12,2)", "numeric(12,2)")]
    #[case("timestamp with time zone", "timestamp with time zone")]
    fn valid_casts(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(SqlCast::new(input).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("text); DROP TABLE t; --")]
    #[case("numeric(12")]
    #[case("numeric(a)")]
    #[case("numeric(1,2,3)")]
    #[case("text  []")]
    fn invalid_casts(#[case] input: &str) {
        assert!(SqlCast::new(input).is_err());
    }
}
