use chrono::{DateTime, Utc};
use tether_core::ViewerKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed Authorization header: expected 'Bearer <credential>'")]
    MalformedHeader,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired at {expired_at}")]
    TokenExpired { expired_at: DateTime<Utc> },

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("invalid token claims: {0}")]
    InvalidClaims(String),

    #[error("cannot sign a token for a '{0}' viewer")]
    Unsignable(ViewerKind),

    #[error("auth configuration error: {0}")]
    Configuration(String),

    #[error("API key store error: {0}")]
    KeyStore(String),
}

/// Coarse classification used when mapping errors onto a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// The caller presented a bad credential. Reject the request.
    Unauthorized,
    /// The credential decoded but its contents are not acceptable.
    Validation,
    /// A server-side problem (configuration, key store).
    Internal,
}

impl AuthError {
    #[must_use]
    pub const fn kind(&self) -> AuthErrorKind {
        match self {
            Self::MalformedHeader
            | Self::InvalidToken(_)
            | Self::TokenExpired { .. }
            | Self::InvalidApiKey => AuthErrorKind::Unauthorized,
            Self::InvalidClaims(_) | Self::Unsignable(_) => AuthErrorKind::Validation,
            Self::Configuration(_) | Self::KeyStore(_) => AuthErrorKind::Internal,
        }
    }

    /// Whether the request must be rejected as unauthenticated.
    ///
    /// Validation failures on a presented token count too: a token that does
    /// not decode to a known viewer never falls back to anonymous.
    #[must_use]
    pub const fn rejects_request(&self) -> bool {
        matches!(
            self.kind(),
            AuthErrorKind::Unauthorized | AuthErrorKind::Validation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_and_malformed_are_distinct() {
        let expired = AuthError::TokenExpired {
            expired_at: Utc::now(),
        };
        assert!(matches!(expired, AuthError::TokenExpired { .. }));
        assert_ne!(expired.to_string(), AuthError::MalformedHeader.to_string());
        assert_eq!(expired.kind(), AuthErrorKind::Unauthorized);
        assert_eq!(AuthError::MalformedHeader.kind(), AuthErrorKind::Unauthorized);
    }

    #[test]
    fn claim_errors_are_validation() {
        let err = AuthError::InvalidClaims("unknown role".into());
        assert_eq!(err.kind(), AuthErrorKind::Validation);
        assert!(err.rejects_request());
    }

    #[test]
    fn store_errors_are_internal() {
        let err = AuthError::KeyStore("connection reset".into());
        assert_eq!(err.kind(), AuthErrorKind::Internal);
        assert!(!err.rejects_request());
    }
}
