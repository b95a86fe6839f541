//! Token signing and credential resolution configuration.

use serde::{Deserialize, Serialize};

const fn default_token_ttl_secs() -> u64 {
    3600
}

const fn default_first_use_timeout_ms() -> u64 {
    250
}

fn default_token_query_param() -> String {
    "token".into()
}

fn default_api_key_query_param() -> String {
    "apiKey".into()
}

fn default_api_key_header() -> String {
    "x-api-key".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Shared HMAC secret for signing and verifying viewer tokens.
    #[serde(default)]
    pub jwt_secret: String,

    /// Default validity of minted tokens, in seconds.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,

    /// Clock skew tolerated when checking `exp`, in seconds.
    #[serde(default)]
    pub leeway_secs: u64,

    /// Server-side pepper mixed into stored API key hashes.
    #[serde(default)]
    pub api_key_pepper: String,

    /// Query parameter carrying a signed token.
    #[serde(default = "default_token_query_param")]
    pub token_query_param: String,

    /// Query parameter carrying an API key.
    #[serde(default = "default_api_key_query_param")]
    pub api_key_query_param: String,

    /// Header carrying an API key.
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    /// Budget for the best-effort "first used" write, in milliseconds.
    #[serde(default = "default_first_use_timeout_ms")]
    pub first_use_timeout_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: default_token_ttl_secs(),
            leeway_secs: 0,
            api_key_pepper: String::new(),
            token_query_param: default_token_query_param(),
            api_key_query_param: default_api_key_query_param(),
            api_key_header: default_api_key_header(),
            first_use_timeout_ms: default_first_use_timeout_ms(),
        }
    }
}

impl AuthConfig {
    /// Check if tokens can be signed and verified.
    pub fn is_configured(&self) -> bool {
        !self.jwt_secret.is_empty()
    }

    /// Check if API keys can be hashed for lookup.
    pub fn has_api_key_pepper(&self) -> bool {
        !self.api_key_pepper.is_empty()
    }
}
