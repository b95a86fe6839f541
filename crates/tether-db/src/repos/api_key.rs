//! Postgres-backed [`ApiKeyStore`].
//!
//! Expected table (name configurable):
//!
//! ```sql
//! CREATE TABLE api_keys (
//!     id            text PRIMARY KEY,
//!     org_id        text NOT NULL,
//!     customer_id   text,
//!     key_hash      text NOT NULL UNIQUE,
//!     first_used_at timestamptz
//! );
//! ```
//!
//! Key lookup happens before any viewer exists, so both operations run as the
//! `system` viewer.

use chrono::{DateTime, Utc};
use tether_auth::{ApiKeyOwner, ApiKeyRecord, ApiKeyStore, AuthError};

use crate::Database;
use crate::error::DatabaseError;
use crate::ident::QualifiedName;

pub const DEFAULT_TABLE: &str = "api_keys";

#[derive(Debug, sqlx::FromRow)]
struct ApiKeyRow {
    id: String,
    org_id: String,
    customer_id: Option<String>,
    key_hash: String,
    first_used_at: Option<DateTime<Utc>>,
}

impl ApiKeyRow {
    fn into_record(self) -> ApiKeyRecord {
        let owner = match self.customer_id {
            Some(customer_id) => ApiKeyOwner::Customer {
                org_id: self.org_id,
                customer_id,
            },
            None => ApiKeyOwner::Org {
                org_id: self.org_id,
            },
        };
        ApiKeyRecord {
            id: self.id,
            owner,
            key_hash: self.key_hash,
            first_used_at: self.first_used_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgApiKeyStore {
    db: Database,
    table: QualifiedName,
}

impl PgApiKeyStore {
    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidIdentifier` if `table` is not a valid
    /// `[schema.]table` name.
    pub fn new(db: Database, table: &str) -> Result<Self, DatabaseError> {
        Ok(Self {
            db,
            table: QualifiedName::parse(table)?,
        })
    }

    /// Store a key hash for `owner`. Used by provisioning code and tests.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Store` if the insert fails (e.g. duplicate id).
    pub async fn insert(
        &self,
        id: &str,
        key_hash: &str,
        owner: &ApiKeyOwner,
    ) -> Result<(), DatabaseError> {
        let (org_id, customer_id) = match owner {
            ApiKeyOwner::Org { org_id } => (org_id.as_str(), None),
            ApiKeyOwner::Customer {
                org_id,
                customer_id,
            } => (org_id.as_str(), Some(customer_id.as_str())),
        };
        let sql = format!(
            "INSERT INTO {} (id, org_id, customer_id, key_hash) VALUES ($1, $2, $3, $4)",
            self.table
        );
        let mut tx = self.db.begin_system("api_key_insert").await?;
        sqlx::query(&sql)
            .bind(id)
            .bind(org_id)
            .bind(customer_id)
            .bind(key_hash)
            .execute(tx.conn())
            .await?;
        tx.commit().await
    }

    async fn lookup(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, DatabaseError> {
        let sql = format!(
            "SELECT id, org_id, customer_id, key_hash, first_used_at FROM {} WHERE key_hash = $1",
            self.table
        );
        let mut tx = self.db.begin_system("api_key_lookup").await?;
        let row: Option<ApiKeyRow> = sqlx::query_as(&sql)
            .bind(key_hash)
            .fetch_optional(tx.conn())
            .await?;
        tx.commit().await?;
        Ok(row.map(ApiKeyRow::into_record))
    }

    /// Set `first_used_at` once. A row locked by a concurrent first use is
    /// skipped rather than waited for.
    async fn mark_first_use(&self, id: &str, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let sql = format!(
            "UPDATE {t} SET first_used_at = $2 WHERE id = \
             (SELECT id FROM {t} WHERE id = $1 AND first_used_at IS NULL FOR UPDATE SKIP LOCKED)",
            t = self.table
        );
        let mut tx = self.db.begin_system("api_key_first_use").await?;
        sqlx::query(&sql)
            .bind(id)
            .bind(at)
            .execute(tx.conn())
            .await?;
        tx.commit().await
    }
}

impl ApiKeyStore for PgApiKeyStore {
    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, AuthError> {
        self.lookup(key_hash)
            .await
            .map_err(|e| AuthError::KeyStore(e.to_string()))
    }

    async fn record_first_use(&self, id: &str, at: DateTime<Utc>) -> Result<(), AuthError> {
        self.mark_first_use(id, at)
            .await
            .map_err(|e| AuthError::KeyStore(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rows_without_customer_belong_to_the_org() {
        let record = ApiKeyRow {
            id: "k1".into(),
            org_id: "org_1".into(),
            customer_id: None,
            key_hash: "h".into(),
            first_used_at: None,
        }
        .into_record();
        assert_eq!(
            record.owner,
            ApiKeyOwner::Org {
                org_id: "org_1".into()
            }
        );
    }

    #[test]
    fn rows_with_customer_belong_to_the_customer() {
        let record = ApiKeyRow {
            id: "k2".into(),
            org_id: "org_1".into(),
            customer_id: Some("cus_1".into()),
            key_hash: "h".into(),
            first_used_at: None,
        }
        .into_record();
        assert_eq!(
            record.owner,
            ApiKeyOwner::Customer {
                org_id: "org_1".into(),
                customer_id: "cus_1".into()
            }
        );
    }
}
