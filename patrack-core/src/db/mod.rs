//! Database layer for patrack
//!
//! SQLite-backed key/value storage with:
//! - Schema migrations
//! - Items partitioned by storage scope (durable vs session)

pub mod repo;
pub mod schema;

pub use repo::{Database, StoredItem};
