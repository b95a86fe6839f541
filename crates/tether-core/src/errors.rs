//! Cross-cutting error types for Tether.
//!
//! Domain-specific errors (`AuthError`, `DatabaseError`, `ConfigError`) live in
//! their own crates. A unified error is left to the binary, which uses
//! `anyhow`.

use thiserror::Error;

/// Errors that can be raised by any Tether crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Data failed validation (blank id, bad separator, ...).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
