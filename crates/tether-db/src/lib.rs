//! # tether-db
//!
//! PostgreSQL access for Tether under row-level security.
//!
//! Every query runs inside a [`ViewerTx`]: a transaction whose first statement
//! binds the caller's [`Viewer`] into transaction-local settings that the
//! database's RLS policies read. On top of that sits the idempotent upsert
//! engine ([`upsert`]) and the Postgres-backed API key store
//! ([`repos::api_key::PgApiKeyStore`]).
//!
//! Viewer transactions switch to a viewer role (`anon`, `authenticated`,
//! `org`, `customer`); those roles must not own the protected tables or have
//! `BYPASSRLS`. A `system` transaction instead keeps the login role, so the
//! login role needs `BYPASSRLS` (or superuser) for `system` to see every row.
//! [`Database::check_login_role`] reports when it does not.

pub mod error;
pub mod ident;
pub mod repos;
pub mod rls;
pub mod row;
pub mod schema;
pub mod upsert;

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{PgConnection, Postgres, Transaction};
use tether_config::DatabaseConfig;
use tether_core::{SystemGrant, Viewer};

pub use error::DatabaseError;
pub use rls::SessionVars;
pub use row::{Cell, Row};
pub use schema::{TableDescriptor, TableRegistry};
pub use upsert::{UpsertOptions, WritePlan};

/// Pooled database handle.
///
/// Cheap to clone; clones share the pool. There is no process-wide instance:
/// construct one at startup and pass it to whoever needs it.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
    acquire_timeout: Duration,
    statement_timeout: Duration,
}

impl Database {
    /// Validate the `database` section and open a pool.
    ///
    /// Connections are opened lazily, so this succeeds even if the server is
    /// down; the first [`Self::begin_as`] reports connectivity problems.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Config` for an invalid section, or
    /// `DatabaseError::Store` if the URL cannot be parsed.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        config.validate()?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect_lazy(&config.url)?;
        Ok(Self::from_pool(pool, config))
    }

    /// Validate the `database` section, open a pool, and check one
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Config` for an invalid section, or
    /// `DatabaseError::Store` if no connection can be established.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        config.validate()?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.url)
            .await?;
        tracing::debug!(max_connections = config.max_connections, "database pool ready");
        let db = Self::from_pool(pool, config);
        if let Err(err) = db.check_login_role().await {
            tracing::warn!(error = %err, "system transactions will be filtered by RLS policies");
        }
        Ok(db)
    }

    /// Check that the login role bypasses row-level security.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Configuration` if the login role has neither
    /// `BYPASSRLS` nor superuser, or `DatabaseError::Store` if the check
    /// cannot run.
    pub async fn check_login_role(&self) -> Result<(), DatabaseError> {
        let (role, bypasses): (String, bool) = sqlx::query_as(
            "SELECT rolname::text, rolsuper OR rolbypassrls FROM pg_roles WHERE rolname = session_user",
        )
        .fetch_one(&self.pool)
        .await?;
        if bypasses {
            return Ok(());
        }
        Err(DatabaseError::Configuration(format!(
            "login role {role} lacks BYPASSRLS; grant it with ALTER ROLE {role} BYPASSRLS"
        )))
    }

    /// Wrap an existing pool, taking timeouts from `config`.
    #[must_use]
    pub fn from_pool(pool: PgPool, config: &DatabaseConfig) -> Self {
        Self {
            pool,
            acquire_timeout: config.acquire_timeout(),
            statement_timeout: config.statement_timeout(),
        }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Start a transaction bound to `viewer`, giving up after the configured
    /// acquire timeout.
    ///
    /// # Errors
    ///
    /// Same as [`Self::begin_as_within`].
    pub async fn begin_as(&self, viewer: &Viewer) -> Result<ViewerTx, DatabaseError> {
        self.begin_as_within(viewer, self.acquire_timeout).await
    }

    /// Start a transaction bound to `viewer`.
    ///
    /// Acquires a connection, begins, sets `statement_timeout` locally, and
    /// binds the viewer, all within `deadline`. Nothing else runs on the
    /// connection before the binding.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Timeout` if `deadline` passes first, or
    /// `DatabaseError::Store` if any step fails.
    pub async fn begin_as_within(
        &self,
        viewer: &Viewer,
        deadline: Duration,
    ) -> Result<ViewerTx, DatabaseError> {
        tokio::time::timeout(deadline, self.open(viewer))
            .await
            .map_err(|_| DatabaseError::Timeout {
                operation: "acquiring and binding a viewer transaction",
                after: deadline,
            })?
    }

    /// [`Self::begin_as`] for trusted internal code.
    ///
    /// # Errors
    ///
    /// Same as [`Self::begin_as_within`].
    pub async fn begin_system(&self, reason: &'static str) -> Result<ViewerTx, DatabaseError> {
        self.begin_as(&Viewer::system(SystemGrant::elevate(reason)))
            .await
    }

    async fn open(&self, viewer: &Viewer) -> Result<ViewerTx, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        if !self.statement_timeout.is_zero() {
            sqlx::query("SELECT set_config('statement_timeout', $1, true)")
                .bind(format!("{}ms", self.statement_timeout.as_millis()))
                .execute(&mut *tx)
                .await?;
        }
        let vars = rls::bind(&mut *tx, viewer).await?;
        Ok(ViewerTx {
            tx,
            viewer: viewer.clone(),
            vars,
        })
    }
}

/// A transaction bound to one viewer.
///
/// Dropping it without [`Self::commit`] rolls back. Either way the session
/// settings end with the transaction.
#[derive(Debug)]
pub struct ViewerTx {
    tx: Transaction<'static, Postgres>,
    viewer: Viewer,
    vars: SessionVars,
}

impl ViewerTx {
    #[must_use]
    pub const fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    #[must_use]
    pub const fn session_vars(&self) -> &SessionVars {
        &self.vars
    }

    /// The bound connection, for issuing queries.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut *self.tx
    }

    /// Execute an upsert plan in this transaction.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Store` unchanged, including policy rejections.
    pub async fn upsert(&mut self, plan: &WritePlan) -> Result<u64, DatabaseError> {
        plan.execute(&mut *self.tx).await
    }

    /// # Errors
    ///
    /// Returns `DatabaseError::Store` if the commit fails.
    pub async fn commit(self) -> Result<(), DatabaseError> {
        self.tx.commit().await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `DatabaseError::Store` if the rollback fails.
    pub async fn rollback(self) -> Result<(), DatabaseError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
