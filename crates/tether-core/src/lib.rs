//! # tether-core
//!
//! Core identity types shared across all Tether crates:
//! - [`Viewer`]: the closed set of caller identities a request can resolve to
//! - [`SystemGrant`]: the explicit, logged elevation required for `system`
//! - Cross-cutting error types

pub mod errors;
pub mod viewer;

pub use errors::CoreError;
pub use viewer::{SystemGrant, Viewer, ViewerKind};
