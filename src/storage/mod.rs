//! Durable key-value persistence used by every state store.
//!
//! Stores never await their own writes: mutations are applied in memory and
//! the serialized snapshot is handed to a [`PersistQueue`], which applies
//! writes one at a time in submission order.

mod persist_queue;
mod persisted;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

pub use persist_queue::PersistQueue;
pub use persisted::{Persisted, STORE_FORMAT_VERSION};

/// Storage key of the mode registry.
pub const MODES_KEY: &str = "modes.store";
/// Storage key of the blocking session state.
pub const SESSION_KEY: &str = "session.store";
/// Storage key of the usage statistics ledger.
pub const STATS_KEY: &str = "stats.store";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Volatile store, used when no data directory is available and in tests.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
