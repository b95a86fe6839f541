pub mod dispatch;
pub mod key;
pub mod token;
pub mod upsert;
