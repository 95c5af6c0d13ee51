//! Persistent credential state (SQLite).

pub mod credentials;
pub mod database;
pub mod schema;

pub use credentials::SqliteCredentialStore;
pub use database::{AuthorizationCodeRow, Database};
