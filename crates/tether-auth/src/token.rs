//! Compact signed viewer tokens (HS256 JWT).
//!
//! `base64url(header) . base64url(claims) . base64url(HMAC-SHA256(secret, header.claims))`.
//! Only `HS256` is accepted; the signature is checked in constant time before
//! the payload is trusted.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tether_config::AuthConfig;
use tether_core::Viewer;

use crate::claims::TokenClaims;
use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Signs and verifies viewer tokens with a shared secret.
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
    leeway: TimeDelta,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret", &"<redacted>")
            .field("leeway", &self.leeway)
            .finish()
    }
}

impl TokenCodec {
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if `secret` is empty.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, AuthError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(AuthError::Configuration(
                "token signing secret must not be empty".into(),
            ));
        }
        Ok(Self {
            secret: secret.to_vec(),
            leeway: TimeDelta::zero(),
        })
    }

    /// Build from the `auth` config section (secret + leeway).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if `auth.jwt_secret` is not set.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        Ok(Self::new(&config.jwt_secret)?.with_leeway(config.leeway_secs))
    }

    /// Tolerate `secs` of clock skew when checking expiry.
    #[must_use]
    pub fn with_leeway(mut self, secs: u64) -> Self {
        self.leeway = i64::try_from(secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        self
    }

    /// Sign `viewer` for `validity_secs` seconds from now.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unsignable` for `anon`, `AuthError::Configuration`
    /// for a zero validity.
    pub fn sign(&self, viewer: &Viewer, validity_secs: u64) -> Result<String, AuthError> {
        self.sign_at(viewer, validity_secs, Utc::now())
    }

    /// [`Self::sign`] with an explicit issue time.
    ///
    /// # Errors
    ///
    /// Same as [`Self::sign`].
    pub fn sign_at(
        &self,
        viewer: &Viewer,
        validity_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        if validity_secs == 0 {
            return Err(AuthError::Configuration(
                "token validity must be positive".into(),
            ));
        }
        let validity = i64::try_from(validity_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| AuthError::Configuration("token validity too large".into()))?;
        let expires_at = now
            .checked_add_signed(validity)
            .ok_or_else(|| AuthError::Configuration("token validity too large".into()))?;
        let claims = TokenClaims::for_viewer(viewer, expires_at)?;
        self.sign_claims(&claims)
    }

    /// Sign arbitrary claims (e.g. with `org_role`/`org_slug` filled in).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the claims cannot be serialized.
    pub fn sign_claims(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        let payload = serde_json::to_vec(claims)
            .map_err(|e| AuthError::Configuration(format!("serialize claims: {e}")))?;
        let header = URL_SAFE_NO_PAD.encode(HEADER);
        let payload = URL_SAFE_NO_PAD.encode(payload);
        let mut mac = self.mac()?;
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{header}.{payload}.{signature}"))
    }

    /// Verify a token and decode its viewer.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidToken`: wrong shape, bad base64/JSON, unsupported
    ///   `alg`, or signature mismatch.
    /// - `AuthError::InvalidClaims`: unknown role, missing `exp`, `system`
    ///   role, malformed subject.
    /// - `AuthError::TokenExpired`: `exp` (plus leeway) has passed.
    pub fn verify(&self, token: &str) -> Result<Viewer, AuthError> {
        self.verify_at(token, Utc::now())
    }

    /// [`Self::verify`] against an explicit clock.
    ///
    /// # Errors
    ///
    /// Same as [`Self::verify`].
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Viewer, AuthError> {
        self.decode_claims_at(token, now)?.to_viewer()
    }

    /// Verify an optional token: no token at all is `anon`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::verify`] when a token is present.
    pub fn verify_optional(&self, token: Option<&str>) -> Result<Viewer, AuthError> {
        token.map_or(Ok(Viewer::Anon), |token| self.verify(token))
    }

    /// Verify signature and expiry, returning the raw claims.
    ///
    /// # Errors
    ///
    /// Same as [`Self::verify`], minus the viewer-level claim checks.
    pub fn decode_claims_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, AuthError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::InvalidToken(
                "expected three dot-separated segments".into(),
            ));
        };

        let header_json = decode_segment(header, "header")?;
        if header_json["alg"].as_str() != Some("HS256") {
            return Err(AuthError::InvalidToken("unsupported alg".into()));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|e| AuthError::InvalidToken(format!("signature base64 decode failed: {e}")))?;
        let mut mac = self.mac()?;
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::InvalidToken("signature mismatch".into()))?;

        let claims: TokenClaims = serde_json::from_value(decode_segment(payload, "payload")?)
            .map_err(|e| AuthError::InvalidClaims(e.to_string()))?;

        let expires_at = claims.expires_at()?;
        let deadline = expires_at
            .checked_add_signed(self.leeway)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if now >= deadline {
            return Err(AuthError::TokenExpired {
                expired_at: expires_at,
            });
        }
        Ok(claims)
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AuthError::Configuration(format!("HMAC key initialization failed: {e}")))
    }
}

fn decode_segment(segment: &str, what: &str) -> Result<serde_json::Value, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::InvalidToken(format!("{what} base64 decode failed: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::InvalidToken(format!("{what} JSON parse failed: {e}")))
}
