use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_core::{Viewer, ViewerKind};

use crate::error::AuthError;

/// Fixed subject carried by `system` tokens.
pub const SYSTEM_SUBJECT: &str = "system";

/// Role claim of a viewer token.
///
/// Deserializing any other string fails, so an unknown role never decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenRole {
    Anon,
    /// Identity-provider synonym for `user`.
    Authenticated,
    User,
    Org,
    Customer,
    System,
}

impl TokenRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anon => "anon",
            Self::Authenticated => "authenticated",
            Self::User => "user",
            Self::Org => "org",
            Self::Customer => "customer",
            Self::System => "system",
        }
    }
}

/// Payload of a viewer token.
///
/// `exp` is not optional: a payload without it fails to deserialize.
/// Unknown fields (`iat`, `aud`, ...) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub role: TokenRole,
    /// Expiry, unix seconds.
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_slug: Option<String>,
}

impl TokenClaims {
    /// Encode a viewer as claims expiring at `expires_at`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unsignable` for `anon`, which is never transmitted.
    pub fn for_viewer(viewer: &Viewer, expires_at: DateTime<Utc>) -> Result<Self, AuthError> {
        let (sub, role, org_id) = match viewer {
            Viewer::Anon => return Err(AuthError::Unsignable(ViewerKind::Anon)),
            Viewer::User { user_id, org_id } => {
                (user_id.clone(), TokenRole::Authenticated, org_id.clone())
            }
            Viewer::Org { org_id } => (org_id.clone(), TokenRole::Org, None),
            Viewer::Customer {
                org_id,
                customer_id,
            } => (
                Viewer::customer_subject(org_id, customer_id),
                TokenRole::Customer,
                Some(org_id.clone()),
            ),
            Viewer::System(_) => (SYSTEM_SUBJECT.to_string(), TokenRole::System, None),
        };
        Ok(Self {
            sub,
            role,
            exp: expires_at.timestamp(),
            org_id,
            org_role: None,
            org_slug: None,
        })
    }

    /// Expiry as a timestamp.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidClaims` if `exp` is out of range.
    pub fn expires_at(&self) -> Result<DateTime<Utc>, AuthError> {
        DateTime::from_timestamp(self.exp, 0)
            .ok_or_else(|| AuthError::InvalidClaims(format!("exp out of range: {}", self.exp)))
    }

    /// Decode the claims into a viewer, failing closed.
    ///
    /// `system` is always rejected here: a system viewer never comes from a
    /// token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidClaims` for the `system` role, a blank
    /// subject, a customer subject without `/`, or an `org_id` side claim
    /// that contradicts the subject.
    pub fn to_viewer(&self) -> Result<Viewer, AuthError> {
        let invalid = |e: tether_core::CoreError| AuthError::InvalidClaims(e.to_string());
        match self.role {
            TokenRole::Anon => Ok(Viewer::Anon),
            TokenRole::Authenticated | TokenRole::User => {
                Viewer::user(self.sub.clone(), self.org_id.clone()).map_err(invalid)
            }
            TokenRole::Org => {
                self.check_org_claim(&self.sub)?;
                Viewer::org(self.sub.clone()).map_err(invalid)
            }
            TokenRole::Customer => {
                let (org_id, customer_id) =
                    self.sub.split_once(tether_core::viewer::SUBJECT_SEPARATOR).ok_or_else(|| {
                        AuthError::InvalidClaims(format!(
                            "customer subject must be 'org_id/customer_id', got '{}'",
                            self.sub
                        ))
                    })?;
                self.check_org_claim(org_id)?;
                Viewer::customer(org_id, customer_id).map_err(invalid)
            }
            TokenRole::System => Err(AuthError::InvalidClaims(
                "role 'system' is not accepted from tokens".into(),
            )),
        }
    }

    fn check_org_claim(&self, expected: &str) -> Result<(), AuthError> {
        match self.org_id.as_deref() {
            Some(claimed) if claimed != expected => Err(AuthError::InvalidClaims(format!(
                "org_id claim '{claimed}' does not match subject organization '{expected}'"
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tether_core::SystemGrant;

    fn expiry() -> DateTime<Utc> {
        Utc::now() + chrono::TimeDelta::hours(1)
    }

    fn claims(sub: &str, role: TokenRole) -> TokenClaims {
        TokenClaims {
            sub: sub.into(),
            role,
            exp: expiry().timestamp(),
            org_id: None,
            org_role: None,
            org_slug: None,
        }
    }

    #[test]
    fn user_encodes_as_authenticated_with_org_side_claim() {
        let viewer = Viewer::user("usr_1", Some("org_1".into())).unwrap();
        let claims = TokenClaims::for_viewer(&viewer, expiry()).unwrap();
        assert_eq!(claims.sub, "usr_1");
        assert_eq!(claims.role, TokenRole::Authenticated);
        assert_eq!(claims.org_id.as_deref(), Some("org_1"));
    }

    #[test]
    fn customer_encodes_composite_subject() {
        let viewer = Viewer::customer("org_1", "cus_1").unwrap();
        let claims = TokenClaims::for_viewer(&viewer, expiry()).unwrap();
        assert_eq!(claims.sub, "org_1/cus_1");
        assert_eq!(claims.role, TokenRole::Customer);
        assert_eq!(claims.org_id.as_deref(), Some("org_1"));
        assert_eq!(claims.to_viewer().unwrap(), viewer);
    }

    #[test]
    fn system_encodes_sentinel_but_never_decodes() {
        let viewer = Viewer::system(SystemGrant::elevate("test"));
        let claims = TokenClaims::for_viewer(&viewer, expiry()).unwrap();
        assert_eq!(claims.sub, SYSTEM_SUBJECT);
        assert_eq!(claims.role, TokenRole::System);
        assert!(matches!(
            claims.to_viewer(),
            Err(AuthError::InvalidClaims(_))
        ));
    }

    #[test]
    fn anon_is_unsignable() {
        let err = TokenClaims::for_viewer(&Viewer::Anon, expiry()).unwrap_err();
        assert!(matches!(err, AuthError::Unsignable(ViewerKind::Anon)));
    }

    #[test]
    fn plain_user_role_is_accepted() {
        let viewer = claims("usr_9", TokenRole::User).to_viewer().unwrap();
        assert_eq!(viewer, Viewer::user("usr_9", None).unwrap());
    }

    #[test]
    fn customer_subject_without_separator_is_rejected() {
        let err = claims("org_1", TokenRole::Customer).to_viewer().unwrap_err();
        assert!(err.to_string().contains("org_id/customer_id"));
    }

    #[test]
    fn contradicting_org_claim_is_rejected() {
        let mut c = claims("org_1/cus_1", TokenRole::Customer);
        c.org_id = Some("org_2".into());
        assert!(c.to_viewer().is_err());

        let mut c = claims("org_1", TokenRole::Org);
        c.org_id = Some("org_1".into());
        assert_eq!(c.to_viewer().unwrap(), Viewer::org("org_1").unwrap());
    }

    #[test]
    fn unknown_role_fails_to_deserialize() {
        let payload = serde_json::json!({"sub": "x", "role": "admin", "exp": 1});
        assert!(serde_json::from_value::<TokenClaims>(payload).is_err());
    }

    #[test]
    fn missing_exp_fails_to_deserialize() {
        let payload = serde_json::json!({"sub": "x", "role": "org"});
        assert!(serde_json::from_value::<TokenClaims>(payload).is_err());
    }

    #[test]
    fn extra_claims_are_ignored() {
        let payload = serde_json::json!({
            "sub": "usr_1", "role": "authenticated", "exp": 10, "iat": 1, "aud": "hub"
        });
        let claims: TokenClaims = serde_json::from_value(payload).unwrap();
        assert_eq!(claims.role, TokenRole::Authenticated);
    }
}
