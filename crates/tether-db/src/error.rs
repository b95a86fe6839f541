//! Database error types for tether-db.

use std::time::Duration;

use thiserror::Error;

/// SQLSTATE raised when a row-level security policy rejects a row.
pub const SQLSTATE_INSUFFICIENT_PRIVILEGE: &str = "42501";

/// Errors from planning and running statements.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A table, schema, column, or type name failed the identifier rules.
    #[error("invalid identifier '{ident}': {reason}")]
    InvalidIdentifier { ident: String, reason: &'static str },

    /// The call cannot be planned as configured (e.g. no key columns).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The rows do not fit the table (e.g. an undeclared column).
    #[error("validation error: {0}")]
    Validation(String),

    /// Acquisition and session binding did not finish within the deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Invalid `database` config section.
    #[error(transparent)]
    Config(#[from] tether_config::ConfigError),

    /// Error reported by PostgreSQL or the driver, passed through unchanged.
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

impl DatabaseError {
    /// SQLSTATE of a store error, if the server reported one.
    #[must_use]
    pub fn sqlstate(&self) -> Option<String> {
        match self {
            Self::Store(sqlx::Error::Database(db)) => db.code().map(|code| code.into_owned()),
            _ => None,
        }
    }

    /// Whether a row-level security policy (or a missing grant) rejected the
    /// statement.
    #[must_use]
    pub fn is_policy_violation(&self) -> bool {
        self.sqlstate().as_deref() == Some(SQLSTATE_INSUFFICIENT_PRIVILEGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_store_errors_have_no_sqlstate() {
        let err = DatabaseError::Validation("unknown column".into());
        assert_eq!(err.sqlstate(), None);
        assert!(!err.is_policy_violation());
    }

    #[test]
    fn driver_errors_pass_through() {
        let err = DatabaseError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, DatabaseError::Store(sqlx::Error::RowNotFound)));
        assert_eq!(err.to_string(), sqlx::Error::RowNotFound.to_string());
    }
}
