//! Request credential → [`Viewer`].
//!
//! Sources are tried in a fixed order and the first one present wins:
//!
//! 1. signed token in the token query parameter
//! 2. `Authorization: Bearer <credential>` (token if JWT-shaped, else API key)
//! 3. API key in the API key query parameter or header
//! 4. interactive session identity supplied by the transport
//! 5. `anon`
//!
//! A credential that is present but bad is an error; it never degrades to
//! `anon`.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tether_config::AuthConfig;
use tether_core::Viewer;

use crate::api_key::{ApiKeyHasher, ApiKeyRecord, ApiKeyStore};
use crate::error::AuthError;
use crate::token::TokenCodec;

const AUTHORIZATION: &str = "authorization";

/// Identity of an interactive session already authenticated by the
/// transport (e.g. a hosted identity provider's cookie).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: String,
    pub org_id: Option<String>,
}

/// Transport-agnostic view of the parts of a request that carry credentials.
///
/// Header names are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct CredentialRequest {
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
    session: Option<SessionIdentity>,
}

impl CredentialRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn with_session(mut self, session: SessionIdentity) -> Self {
        self.session = Some(session);
        self
    }

    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    #[must_use]
    pub const fn session(&self) -> Option<&SessionIdentity> {
        self.session.as_ref()
    }
}

/// Where the resolver looks for credentials.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub token_query_param: String,
    pub api_key_query_param: String,
    pub api_key_header: String,
    /// Budget for the best-effort first-use write.
    pub first_use_timeout: Duration,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self::from_config(&AuthConfig::default())
    }
}

impl ResolverOptions {
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            token_query_param: config.token_query_param.clone(),
            api_key_query_param: config.api_key_query_param.clone(),
            api_key_header: config.api_key_header.clone(),
            first_use_timeout: Duration::from_millis(config.first_use_timeout_ms),
        }
    }
}

/// Resolves the viewer of a request.
#[derive(Debug)]
pub struct CredentialResolver<S> {
    codec: TokenCodec,
    hasher: ApiKeyHasher,
    store: S,
    options: ResolverOptions,
}

impl<S: ApiKeyStore> CredentialResolver<S> {
    #[must_use]
    pub fn new(codec: TokenCodec, hasher: ApiKeyHasher, store: S) -> Self {
        Self {
            codec,
            hasher,
            store,
            options: ResolverOptions::default(),
        }
    }

    /// Build codec, hasher, and options from the `auth` config section.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the signing secret or the API
    /// key pepper is missing.
    pub fn from_config(config: &AuthConfig, store: S) -> Result<Self, AuthError> {
        Ok(Self::new(
            TokenCodec::from_config(config)?,
            ApiKeyHasher::from_config(config)?,
            store,
        )
        .with_options(ResolverOptions::from_config(config)))
    }

    #[must_use]
    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    pub const fn key_store(&self) -> &S {
        &self.store
    }

    pub const fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Resolve the viewer for `request`.
    ///
    /// # Errors
    ///
    /// - `AuthError::MalformedHeader`: `Authorization` is not `Bearer <credential>`.
    /// - `AuthError::InvalidToken` / `TokenExpired` / `InvalidClaims`: a
    ///   presented token does not verify.
    /// - `AuthError::InvalidApiKey`: a presented API key matches nothing.
    /// - `AuthError::KeyStore`: the key store failed.
    pub async fn resolve(&self, request: &CredentialRequest) -> Result<Viewer, AuthError> {
        if let Some(token) = request.query(&self.options.token_query_param) {
            tracing::debug!(source = "query_token", "resolving viewer");
            return self.codec.verify(token);
        }

        if let Some(header) = request.header(AUTHORIZATION) {
            let credential = parse_bearer(header)?;
            if looks_like_token(credential) {
                tracing::debug!(source = "bearer_token", "resolving viewer");
                return self.codec.verify(credential);
            }
            tracing::debug!(source = "bearer_api_key", "resolving viewer");
            return self.resolve_api_key(credential).await;
        }

        if let Some(key) = request
            .query(&self.options.api_key_query_param)
            .or_else(|| request.header(&self.options.api_key_header))
        {
            tracing::debug!(source = "api_key", "resolving viewer");
            return self.resolve_api_key(key).await;
        }

        if let Some(session) = request.session() {
            tracing::debug!(source = "session", "resolving viewer");
            return Viewer::user(session.user_id.clone(), session.org_id.clone())
                .map_err(|e| AuthError::InvalidClaims(e.to_string()));
        }

        tracing::debug!(source = "none", "resolving viewer");
        Ok(Viewer::Anon)
    }

    async fn resolve_api_key(&self, key: &str) -> Result<Viewer, AuthError> {
        let key_hash = self.hasher.hash(key);
        let record = self
            .store
            .find_by_hash(&key_hash)
            .await?
            .filter(|record| self.hasher.verify(key, &record.key_hash))
            .ok_or(AuthError::InvalidApiKey)?;

        let viewer = record.owner.to_viewer()?;
        if record.first_used_at.is_none() {
            self.record_first_use(&record).await;
        }
        Ok(viewer)
    }

    async fn record_first_use(&self, record: &ApiKeyRecord) {
        let write = self.store.record_first_use(&record.id, Utc::now());
        match tokio::time::timeout(self.options.first_use_timeout, write).await {
            Ok(Ok(())) => tracing::debug!(key_id = %record.id, "recorded API key first use"),
            Ok(Err(e)) => {
                tracing::warn!(key_id = %record.id, error = %e, "failed to record API key first use");
            }
            Err(_) => tracing::warn!(
                key_id = %record.id,
                timeout = ?self.options.first_use_timeout,
                "timed out recording API key first use"
            ),
        }
    }
}

fn parse_bearer(header: &str) -> Result<&str, AuthError> {
    let (scheme, credential) = header
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MalformedHeader)?;
    let credential = credential.trim();
    if !scheme.eq_ignore_ascii_case("bearer")
        || credential.is_empty()
        || credential.contains(char::is_whitespace)
    {
        return Err(AuthError::MalformedHeader);
    }
    Ok(credential)
}

/// Three non-empty dot-separated segments.
fn looks_like_token(credential: &str) -> bool {
    let segments: Vec<&str> = credential.split('.').collect();
    segments.len() == 3 && segments.iter().all(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Bearer abc", Some("abc"))]
    #[case("bearer abc", Some("abc"))]
    #[case("BEARER   abc  ", Some("abc"))]
    #[case("Basic abc", None)]
    #[case("Bearer", None)]
    #[case("Bearer ", None)]
    #[case("Bearer a b", None)]
    #[case("abc", None)]
    #[case("", None)]
    fn bearer_parsing(#[case] header: &str, #[case] expected: Option<&str>) {
        assert_eq!(parse_bearer(header).ok(), expected);
    }

    #[rstest]
    #[case("a.b.c", true)]
    #[case("key_abc", false)]
    #[case("a.b", false)]
    #[case("a..c", false)]
    #[case("a.b.c.d", false)]
    fn token_shape(#[case] credential: &str, #[case] expected: bool) {
        assert_eq!(looks_like_token(credential), expected);
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let request = CredentialRequest::new().with_header("X-Api-Key", "k");
        assert_eq!(request.header("x-api-key"), Some("k"));
        assert_eq!(request.header("X-API-KEY"), Some("k"));
    }

    #[test]
    fn options_follow_config() {
        let config = AuthConfig {
            first_use_timeout_ms: 10,
            api_key_header: "x-key".into(),
            ..Default::default()
        };
        let options = ResolverOptions::from_config(&config);
        assert_eq!(options.first_use_timeout, Duration::from_millis(10));
        assert_eq!(options.api_key_header, "x-key");
        assert_eq!(options.token_query_param, "token");
    }
}
