//! Key/value storage backends
//!
//! The identity store reads and writes two small values: the visitor id in a
//! durable store and the session record in a session-scoped store. Both go
//! through the [`Storage`] trait so a host can back them with whatever it has:
//!
//! - [`MemoryStorage`]: process-local, the natural session-scoped store
//! - [`DatabaseStorage`]: SQLite-backed, one scope of a shared [`Database`](crate::db::Database)

mod database;
mod memory;

pub use database::DatabaseStorage;
pub use memory::MemoryStorage;

use crate::error::Result;

/// A string key/value store.
///
/// Implementations may fail (quota, private mode, locked database); callers in
/// this crate treat every failure as "storage unavailable" and degrade.
pub trait Storage: Send + Sync {
    /// Read a value, `None` if the key is absent
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a key; deleting an absent key is not an error
    fn remove_item(&self, key: &str) -> Result<()>;
}
