//! Repositories backed by tables outside the synced data.

pub mod api_key;
