//! API keys: generation, peppered hashing, and the lookup seam.
//!
//! Keys are never stored in plaintext. The stored form is
//! `base64url(HMAC-SHA256(pepper, key))`, which is deterministic and therefore
//! indexable. After a store returns a candidate by hash, the stored and
//! computed hashes are compared again in constant time.

use std::collections::HashMap;
use std::future::Future;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tether_config::AuthConfig;
use tether_core::Viewer;
use tokio::sync::RwLock;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

const KEY_BYTES: usize = 32;

/// Computes and checks stored API key hashes.
#[derive(Clone)]
pub struct ApiKeyHasher {
    mac: HmacSha256,
}

impl std::fmt::Debug for ApiKeyHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyHasher")
            .field("pepper", &"<redacted>")
            .finish()
    }
}

impl ApiKeyHasher {
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if `pepper` is empty.
    pub fn new(pepper: impl AsRef<[u8]>) -> Result<Self, AuthError> {
        let pepper = pepper.as_ref();
        if pepper.is_empty() {
            return Err(AuthError::Configuration(
                "API key pepper must not be empty".into(),
            ));
        }
        let mac = HmacSha256::new_from_slice(pepper)
            .map_err(|e| AuthError::Configuration(format!("HMAC key initialization failed: {e}")))?;
        Ok(Self { mac })
    }

    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if `auth.api_key_pepper` is not set.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        Self::new(&config.api_key_pepper)
    }

    /// Storage hash of `key`.
    #[must_use]
    pub fn hash(&self, key: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(key.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Constant-time check of `key` against a stored hash.
    #[must_use]
    pub fn verify(&self, key: &str, stored_hash: &str) -> bool {
        let computed = self.hash(key);
        computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
    }
}

/// One-shot form of [`ApiKeyHasher::hash`].
///
/// # Errors
///
/// Returns `AuthError::Configuration` if `pepper` is empty.
pub fn hash_api_key(pepper: &str, key: &str) -> Result<String, AuthError> {
    Ok(ApiKeyHasher::new(pepper)?.hash(key))
}

/// Mint a random API key: `<prefix>_<43 base64url chars>`, or just the random
/// part when `prefix` is empty.
///
/// # Errors
///
/// Returns `AuthError::Configuration` if the OS random source fails.
pub fn generate_api_key(prefix: &str) -> Result<String, AuthError> {
    let mut bytes = [0u8; KEY_BYTES];
    getrandom::fill(&mut bytes)
        .map_err(|e| AuthError::Configuration(format!("failed to generate API key: {e}")))?;
    let secret = URL_SAFE_NO_PAD.encode(bytes);
    if prefix.is_empty() {
        Ok(secret)
    } else {
        Ok(format!("{prefix}_{secret}"))
    }
}

/// Who an API key acts as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApiKeyOwner {
    Org { org_id: String },
    Customer { org_id: String, customer_id: String },
}

impl ApiKeyOwner {
    /// # Errors
    ///
    /// Returns `AuthError::KeyStore` if the stored owner ids are not valid
    /// viewer ids.
    pub fn to_viewer(&self) -> Result<Viewer, AuthError> {
        match self {
            Self::Org { org_id } => Viewer::org(org_id.clone()),
            Self::Customer {
                org_id,
                customer_id,
            } => Viewer::customer(org_id.clone(), customer_id.clone()),
        }
        .map_err(|e| AuthError::KeyStore(format!("stored key owner is invalid: {e}")))
    }
}

/// A stored API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyRecord {
    pub id: String,
    pub owner: ApiKeyOwner,
    pub key_hash: String,
    pub first_used_at: Option<DateTime<Utc>>,
}

/// Lookup and bookkeeping for stored API keys.
pub trait ApiKeyStore: Send + Sync {
    /// Find the key whose stored hash equals `key_hash`.
    fn find_by_hash(
        &self,
        key_hash: &str,
    ) -> impl Future<Output = Result<Option<ApiKeyRecord>, AuthError>> + Send;

    /// Set `first_used_at` if it is still unset. Later calls are no-ops.
    fn record_first_use(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), AuthError>> + Send;
}

/// In-memory [`ApiKeyStore`], keyed by hash.
#[derive(Debug, Default)]
pub struct StaticApiKeyStore {
    by_hash: RwLock<HashMap<String, ApiKeyRecord>>,
}

impl StaticApiKeyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `key` (hashed with `hasher`) for `owner` under `id`.
    pub async fn insert(
        &self,
        hasher: &ApiKeyHasher,
        id: impl Into<String>,
        key: &str,
        owner: ApiKeyOwner,
    ) {
        let key_hash = hasher.hash(key);
        let record = ApiKeyRecord {
            id: id.into(),
            owner,
            key_hash: key_hash.clone(),
            first_used_at: None,
        };
        self.by_hash.write().await.insert(key_hash, record);
    }

    pub async fn first_used_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.by_hash
            .read()
            .await
            .values()
            .find(|r| r.id == id)
            .and_then(|r| r.first_used_at)
    }
}

impl ApiKeyStore for StaticApiKeyStore {
    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, AuthError> {
        Ok(self.by_hash.read().await.get(key_hash).cloned())
    }

    async fn record_first_use(&self, id: &str, at: DateTime<Utc>) -> Result<(), AuthError> {
        let mut by_hash = self.by_hash.write().await;
        if let Some(record) = by_hash.values_mut().find(|r| r.id == id)
            && record.first_used_at.is_none()
        {
            record.first_used_at = Some(at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hasher() -> ApiKeyHasher {
        ApiKeyHasher::new("pepper").unwrap()
    }

    #[test]
    fn hash_is_deterministic_and_peppered() {
        let a = hasher().hash("key_abc");
        assert_eq!(a, hasher().hash("key_abc"));
        assert_ne!(a, ApiKeyHasher::new("other").unwrap().hash("key_abc"));
        assert!(!a.contains("key_abc"));
    }

    #[test]
    fn verify_compares_against_stored_hash() {
        let stored = hasher().hash("key_abc");
        assert!(hasher().verify("key_abc", &stored));
        assert!(!hasher().verify("key_abd", &stored));
        assert!(!hasher().verify("key_abc", ""));
    }

    #[test]
    fn empty_pepper_is_rejected() {
        assert!(matches!(
            ApiKeyHasher::new(""),
            Err(AuthError::Configuration(_))
        ));
        assert!(hash_api_key("", "key").is_err());
    }

    #[test]
    fn generated_keys_carry_prefix_and_differ() {
        let a = generate_api_key("tk").unwrap();
        let b = generate_api_key("tk").unwrap();
        assert!(a.starts_with("tk_"));
        assert_eq!(a.len(), "tk_".len() + 43);
        assert_ne!(a, b);
        assert_eq!(generate_api_key("").unwrap().len(), 43);
    }

    #[test]
    fn owner_maps_to_viewer() {
        let owner = ApiKeyOwner::Customer {
            org_id: "org_1".into(),
            customer_id: "cus_1".into(),
        };
        assert_eq!(
            owner.to_viewer().unwrap(),
            Viewer::customer("org_1", "cus_1").unwrap()
        );
        let bad = ApiKeyOwner::Org {
            org_id: "a/b".into(),
        };
        assert!(matches!(bad.to_viewer(), Err(AuthError::KeyStore(_))));
    }

    #[tokio::test]
    async fn static_store_records_first_use_once() {
        let store = StaticApiKeyStore::new();
        let owner = ApiKeyOwner::Org {
            org_id: "org_1".into(),
        };
        store.insert(&hasher(), "k1", "key_abc", owner).await;

        let found = store.find_by_hash(&hasher().hash("key_abc")).await.unwrap();
        assert_eq!(found.map(|r| r.id), Some("k1".to_string()));
        assert!(store.first_used_at("k1").await.is_none());

        let first = Utc::now();
        store.record_first_use("k1", first).await.unwrap();
        store
            .record_first_use("k1", first + chrono::TimeDelta::hours(1))
            .await
            .unwrap();
        assert_eq!(store.first_used_at("k1").await, Some(first));
    }
}
