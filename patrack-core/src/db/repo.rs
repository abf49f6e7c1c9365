//! Database repository layer
//!
//! Provides get/set/remove operations for scoped key/value items.

use crate::error::{Error, Result};
use crate::types::StorageScope;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// A stored key/value item with its last write time.
#[derive(Debug, Clone)]
pub struct StoredItem {
    pub scope: StorageScope,
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Database handle (single connection)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.connection()?;
        super::schema::run_migrations(&conn)
    }

    /// Schema version recorded in the database file
    pub fn schema_version(&self) -> Result<i32> {
        let conn = self.connection()?;
        super::schema::get_schema_version(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("database connection lock poisoned".to_string()))
    }

    // ============================================
    // Item operations
    // ============================================

    /// Read an item's value
    pub fn get_item(&self, scope: StorageScope, key: &str) -> Result<Option<String>> {
        let conn = self.connection()?;
        let value = conn
            .query_row(
                "SELECT value FROM storage_items WHERE scope = ?1 AND key = ?2",
                params![scope.as_str(), key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Insert or overwrite an item
    pub fn set_item(&self, scope: StorageScope, key: &str, value: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            r#"
            INSERT INTO storage_items (scope, key, value, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(scope, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![scope.as_str(), key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Remove an item. Returns true if it existed.
    pub fn remove_item(&self, scope: StorageScope, key: &str) -> Result<bool> {
        let conn = self.connection()?;
        let removed = conn.execute(
            "DELETE FROM storage_items WHERE scope = ?1 AND key = ?2",
            params![scope.as_str(), key],
        )?;
        Ok(removed > 0)
    }


    /// List all items in a scope, ordered by key
    pub fn list_items(&self, scope: StorageScope) -> Result<Vec<StoredItem>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT scope, key, value, updated_at FROM storage_items WHERE scope = ?1 ORDER BY key",
        )?;
        let items = stmt
            .query_map(params![scope.as_str()], Self::row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn row_to_item(row: &Row) -> rusqlite::Result<StoredItem> {
        let scope: String = row.get(0)?;
        let updated_at_str: String = row.get(3)?;
        Ok(StoredItem {
            scope: scope.parse().unwrap_or(StorageScope::Durable),
            key: row.get(1)?,
            value: row.get(2)?,
            updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}
