//! # tether-auth
//!
//! Caller identity for Tether.
//!
//! Verifies signed viewer tokens (HS256), hashes and looks up API keys through
//! the [`ApiKeyStore`] seam, and resolves a request's credentials into a
//! [`tether_core::Viewer`] in a fixed precedence order.

pub mod api_key;
pub mod claims;
pub mod error;
pub mod resolver;
pub mod token;

pub use api_key::{
    ApiKeyHasher, ApiKeyOwner, ApiKeyRecord, ApiKeyStore, StaticApiKeyStore, generate_api_key,
    hash_api_key,
};
pub use claims::{TokenClaims, TokenRole};
pub use error::{AuthError, AuthErrorKind};
pub use resolver::{CredentialRequest, CredentialResolver, ResolverOptions, SessionIdentity};
pub use token::TokenCodec;
