pub mod key;
pub mod token;
pub mod upsert;

pub use key::KeyCommands;
pub use token::TokenCommands;
pub use upsert::UpsertCommands;
