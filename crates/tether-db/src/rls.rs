//! Viewer → PostgreSQL session settings for row-level security.
//!
//! Policies read the caller from `current_setting('request.jwt.claim.*', true)`
//! and from the active role. Every setting is applied with
//! `set_config(key, value, is_local => true)`, so it lasts until the end of
//! the surrounding transaction and never leaks into the next borrower of a
//! pooled connection.
//!
//! Outside a transaction `is_local` settings vanish immediately; always bind
//! through [`crate::Database::begin_as`] or inside a transaction you own.

use sqlx::PgConnection;
use tether_core::Viewer;

use crate::error::DatabaseError;

pub const ROLE: &str = "role";
pub const CLAIM_SUB: &str = "request.jwt.claim.sub";
pub const CLAIM_ORG_ID: &str = "request.jwt.claim.org_id";
pub const CLAIM_CUSTOMER_ID: &str = "request.jwt.claim.customer_id";

/// Value of `role` that resets to the session's login role.
pub const ROLE_RESET: &str = "none";

/// The session settings one viewer maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionVars {
    /// `None` resets the role (the `system` viewer).
    role: Option<&'static str>,
    claims: Vec<(&'static str, String)>,
}

impl SessionVars {
    #[must_use]
    pub fn for_viewer(viewer: &Viewer) -> Self {
        match viewer {
            Viewer::Anon => Self {
                role: Some("anon"),
                claims: Vec::new(),
            },
            Viewer::User { user_id, org_id } => {
                let mut claims = vec![(CLAIM_SUB, user_id.clone())];
                if let Some(org_id) = org_id {
                    claims.push((CLAIM_ORG_ID, org_id.clone()));
                }
                Self {
                    role: Some("authenticated"),
                    claims,
                }
            }
            Viewer::Org { org_id } => Self {
                role: Some("org"),
                claims: vec![(CLAIM_SUB, org_id.clone()), (CLAIM_ORG_ID, org_id.clone())],
            },
            Viewer::Customer {
                org_id,
                customer_id,
            } => Self {
                role: Some("customer"),
                claims: vec![
                    (CLAIM_SUB, Viewer::customer_subject(org_id, customer_id)),
                    (CLAIM_ORG_ID, org_id.clone()),
                    (CLAIM_CUSTOMER_ID, customer_id.clone()),
                ],
            },
            Viewer::System(_) => Self {
                role: None,
                claims: Vec::new(),
            },
        }
    }

    #[must_use]
    pub const fn role(&self) -> Option<&'static str> {
        self.role
    }

    #[must_use]
    pub fn claim(&self, key: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All `(key, value)` pairs in application order, role first.
    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        std::iter::once((ROLE, self.role.unwrap_or(ROLE_RESET)))
            .chain(self.claims.iter().map(|(k, v)| (*k, v.as_str())))
            .collect()
    }

    /// `SELECT set_config($1, $2, true), set_config($3, $4, true), ...`
    #[must_use]
    pub fn to_sql(&self) -> String {
        let calls: Vec<String> = (0..self.entries().len())
            .map(|i| format!("set_config(${}, ${}, true)", 2 * i + 1, 2 * i + 2))
            .collect();
        format!("SELECT {}", calls.join(", "))
    }
}

/// Apply `viewer`'s session settings on `conn` in one round trip.
///
/// Must run inside a transaction, before any query that relies on them.
///
/// # Errors
///
/// Returns `DatabaseError::Store` if PostgreSQL rejects a setting (for
/// example a role the login role is not a member of).
pub async fn bind(conn: &mut PgConnection, viewer: &Viewer) -> Result<SessionVars, DatabaseError> {
    let vars = SessionVars::for_viewer(viewer);
    let sql = vars.to_sql();
    let mut query = sqlx::query(&sql);
    for (key, value) in vars.entries() {
        query = query.bind(key).bind(value);
    }
    query.execute(conn).await?;
    tracing::debug!(viewer = %viewer, role = vars.role().unwrap_or(ROLE_RESET), "bound viewer to transaction");
    Ok(vars)
}
