use std::sync::Arc;

use crate::db::Database;
use crate::error::Result;
use crate::types::StorageScope;

use super::Storage;

/// One scope of a SQLite-backed item table.
///
/// Durable and session storage can share a single database file; the CLI
/// keeps both in `storage.db`.
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Arc<Database>,
    scope: StorageScope,
}

impl DatabaseStorage {
    pub fn new(db: Arc<Database>, scope: StorageScope) -> Self {
        Self { db, scope }
    }
}

impl Storage for DatabaseStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.db.get_item(self.scope, key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.db.set_item(self.scope, key, value)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.db.remove_item(self.scope, key).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_views_of_one_database() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.migrate().unwrap();

        let durable = DatabaseStorage::new(db.clone(), StorageScope::Durable);
        let session = DatabaseStorage::new(db, StorageScope::Session);

        durable.set_item("pa_visitor_id", "v1").unwrap();
        session.set_item("pa_session", "{}").unwrap();

        assert_eq!(session.get_item("pa_visitor_id").unwrap(), None);
        session.remove_item("pa_session").unwrap();
        assert_eq!(session.get_item("pa_session").unwrap(), None);
        assert_eq!(durable.get_item("pa_visitor_id").unwrap().as_deref(), Some("v1"));

        durable.remove_item("pa_visitor_id").unwrap();
        durable.remove_item("pa_visitor_id").unwrap();
        assert_eq!(durable.get_item("pa_visitor_id").unwrap(), None);
    }
}
