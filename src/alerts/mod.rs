pub mod store;
pub mod types;

pub use store::AlertStore;
pub use types::{Alert, AlertKind, NewAlert};
