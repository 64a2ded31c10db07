//! Encrypted-at-rest storage for the signed-in session.

pub mod store;
pub mod types;

pub use store::CredentialStore;
pub use types::Session;
