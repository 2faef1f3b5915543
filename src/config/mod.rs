//! Configuration
//!
//! `AppConfig` is read from a TOML file; every section and field has a
//! default, so an empty file (or none at all) is a valid configuration.

mod schema;
mod store;

pub use schema::*;
pub use store::{load, load_or_default};
