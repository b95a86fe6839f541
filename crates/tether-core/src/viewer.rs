//! The resolved caller identity for a request.
//!
//! A [`Viewer`] is built once per request (by the credential resolver or by
//! trusted internal code) and never mutated. Every variant except `Anon` and
//! `System` is scoped to an organization.

use std::fmt;

use serde::Serialize;

use crate::errors::CoreError;

/// Separator between the organization and customer ids in composite subjects.
pub const SUBJECT_SEPARATOR: char = '/';

/// Caller identity.
///
/// Implements `Serialize` for logging and inspection only. There is no
/// `Deserialize` impl: a viewer must come from token verification, API key
/// lookup, or a [`SystemGrant`], never from an arbitrary payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Viewer {
    /// No identity.
    Anon,
    /// An authenticated human, optionally acting inside an organization.
    User {
        user_id: String,
        org_id: Option<String>,
    },
    /// An organization acting as itself (API key or org token).
    Org { org_id: String },
    /// An end-customer of an organization.
    Customer { org_id: String, customer_id: String },
    /// Trusted internal caller. Row-level security does not apply.
    System(SystemGrant),
}

/// Proof that trusted internal code asked for `system` access.
///
/// The only way to obtain one is [`SystemGrant::elevate`], which logs the
/// reason. Nothing on the credential path calls it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemGrant {
    reason: &'static str,
}

impl SystemGrant {
    /// Elevate to `system` for an internal code path.
    ///
    /// `reason` should name the call site (e.g. `"api_key_lookup"`); it is
    /// logged and carried along for inspection.
    #[must_use]
    pub fn elevate(reason: &'static str) -> Self {
        tracing::debug!(reason, "elevating to system viewer");
        Self { reason }
    }

    #[must_use]
    pub const fn reason(&self) -> &'static str {
        self.reason
    }
}

/// Variant tag of a [`Viewer`], without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerKind {
    Anon,
    User,
    Org,
    Customer,
    System,
}

impl ViewerKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anon => "anon",
            Self::User => "user",
            Self::Org => "org",
            Self::Customer => "customer",
            Self::System => "system",
        }
    }
}

impl fmt::Display for ViewerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Viewer {
    /// Build a `user` viewer.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if `user_id` is blank or `org_id` is
    /// not a valid organization id.
    pub fn user(user_id: impl Into<String>, org_id: Option<String>) -> Result<Self, CoreError> {
        let user_id = non_blank("user_id", user_id.into())?;
        let org_id = org_id.map(validate_org_id).transpose()?;
        Ok(Self::User { user_id, org_id })
    }

    /// Build an `org` viewer.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if `org_id` is blank or contains
    /// [`SUBJECT_SEPARATOR`].
    pub fn org(org_id: impl Into<String>) -> Result<Self, CoreError> {
        Ok(Self::Org {
            org_id: validate_org_id(org_id.into())?,
        })
    }

    /// Build a `customer` viewer.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if either id is blank or `org_id`
    /// contains [`SUBJECT_SEPARATOR`].
    pub fn customer(
        org_id: impl Into<String>,
        customer_id: impl Into<String>,
    ) -> Result<Self, CoreError> {
        Ok(Self::Customer {
            org_id: validate_org_id(org_id.into())?,
            customer_id: non_blank("customer_id", customer_id.into())?,
        })
    }

    /// Build the `system` viewer from an explicit grant.
    #[must_use]
    pub const fn system(grant: SystemGrant) -> Self {
        Self::System(grant)
    }

    #[must_use]
    pub const fn kind(&self) -> ViewerKind {
        match self {
            Self::Anon => ViewerKind::Anon,
            Self::User { .. } => ViewerKind::User,
            Self::Org { .. } => ViewerKind::Org,
            Self::Customer { .. } => ViewerKind::Customer,
            Self::System(_) => ViewerKind::System,
        }
    }

    /// Organization the viewer is scoped to, if any.
    #[must_use]
    pub fn org_id(&self) -> Option<&str> {
        match self {
            Self::User { org_id, .. } => org_id.as_deref(),
            Self::Org { org_id } | Self::Customer { org_id, .. } => Some(org_id),
            Self::Anon | Self::System(_) => None,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::User { user_id, .. } => Some(user_id),
            _ => None,
        }
    }

    #[must_use]
    pub fn customer_id(&self) -> Option<&str> {
        match self {
            Self::Customer { customer_id, .. } => Some(customer_id),
            _ => None,
        }
    }

    /// Composite `org_id/customer_id` subject used by customer tokens and
    /// session claims.
    #[must_use]
    pub fn customer_subject(org_id: &str, customer_id: &str) -> String {
        format!("{org_id}{SUBJECT_SEPARATOR}{customer_id}")
    }

    #[must_use]
    pub const fn is_anon(&self) -> bool {
        matches!(self, Self::Anon)
    }

    #[must_use]
    pub const fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }
}

impl fmt::Display for Viewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anon => f.write_str("anon"),
            Self::User {
                user_id,
                org_id: Some(org_id),
            } => write!(f, "user:{user_id}@{org_id}"),
            Self::User {
                user_id,
                org_id: None,
            } => write!(f, "user:{user_id}"),
            Self::Org { org_id } => write!(f, "org:{org_id}"),
            Self::Customer {
                org_id,
                customer_id,
            } => write!(f, "customer:{org_id}/{customer_id}"),
            Self::System(grant) => write!(f, "system({})", grant.reason),
        }
    }
}

fn non_blank(field: &str, value: String) -> Result<String, CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{field} must not be empty")));
    }
    Ok(value)
}

fn validate_org_id(org_id: String) -> Result<String, CoreError> {
    let org_id = non_blank("org_id", org_id)?;
    if org_id.contains(SUBJECT_SEPARATOR) {
        return Err(CoreError::Validation(format!(
            "org_id must not contain '{SUBJECT_SEPARATOR}': {org_id}"
        )));
    }
    Ok(org_id)
}
