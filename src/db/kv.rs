use anyhow::Result;
use async_trait::async_trait;

use crate::storage::KeyValueStore;

use super::Database;

/// [`KeyValueStore`] backed by the `kv_store` table.
#[derive(Clone)]
pub struct SqliteKvStore {
    db: Database,
}

impl SqliteKvStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.db.get_value(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.db.put_value(key, &value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.db.delete_value(key).await
    }
}
