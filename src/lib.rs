pub mod config;
pub mod db;
pub mod models;
pub mod modes;
pub mod platform;
pub mod session;
pub mod stats;
pub mod storage;
pub mod utils;

use std::sync::Arc;

use anyhow::Result;
use log::info;

pub use config::BlockerConfig;
use db::{Database, SqliteKvStore};
pub use models::{Mode, ModeId, ModePatch, NewMode, SelectionToken};
pub use modes::{DeleteOutcome, DraftHandle, ModeRegistry};
pub use platform::{Platform, PolicyBridge, PolicyCapability, ScreenTime, TriggerReader};
pub use session::{BlockController, BlockError, SessionStore, StrictModeOutcome, TriggerOutcome};
pub use stats::{Clock, StatsLedger, SystemClock};
use storage::{KeyValueStore, PersistQueue};

/// Everything the UI shell talks to. Owned by the shell and passed by
/// reference; there are no global stores.
pub struct AppContext {
    config: BlockerConfig,
    database: Option<Database>,
    queue: PersistQueue,
    registry: Arc<ModeRegistry>,
    session: Arc<SessionStore>,
    stats: Arc<StatsLedger>,
    controller: BlockController,
}

impl AppContext {
    /// Open the SQLite store under `config.data_dir`, hydrate every store,
    /// and re-assert the removal guard.
    pub async fn bootstrap(config: BlockerConfig, platform: Platform) -> Result<Self> {
        utils::logging::init(config.debug);
        info!("thinkblock starting up...");

        let database = Database::new(config.database_path())?;
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteKvStore::new(database.clone()));
        let mut context = Self::with_store(config, store, platform).await;
        context.database = Some(database);
        Ok(context)
    }

    /// Same as [`AppContext::bootstrap`] on an arbitrary key-value store.
    pub async fn with_store(
        config: BlockerConfig,
        store: Arc<dyn KeyValueStore>,
        platform: Platform,
    ) -> Self {
        let queue = PersistQueue::spawn(store.clone());

        let session = Arc::new(SessionStore::new(queue.clone()));
        let registry = Arc::new(ModeRegistry::new(
            queue.clone(),
            session.clone(),
            config.max_modes,
            config.max_mode_name_len,
        ));
        let stats = Arc::new(StatsLedger::new(queue.clone(), platform.clock.clone()));

        session.hydrate(store.as_ref()).await;
        registry.hydrate(store.as_ref()).await;
        stats.hydrate(store.as_ref()).await;

        let controller = BlockController::new(
            registry.clone(),
            session.clone(),
            stats.clone(),
            platform,
            &config,
        );
        controller.startup().await;

        Self {
            config,
            database: None,
            queue,
            registry,
            session,
            stats,
            controller,
        }
    }

    pub fn config(&self) -> &BlockerConfig {
        &self.config
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    pub fn registry(&self) -> &Arc<ModeRegistry> {
        &self.registry
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn stats(&self) -> &Arc<StatsLedger> {
        &self.stats
    }

    pub fn controller(&self) -> &BlockController {
        &self.controller
    }

    /// Wait for every pending write to reach storage.
    pub async fn flush(&self) {
        self.queue.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::{FakeScreenTime, RecordingBridge, ScriptedReader};
    use serde_json::json;
    use tempfile::tempdir;

    fn platform(bridge: Arc<RecordingBridge>) -> Platform {
        Platform {
            policy: PolicyCapability::Available(bridge),
            screen_time: Arc::new(FakeScreenTime::new(true)),
            trigger_reader: Arc::new(ScriptedReader::new(vec![])),
            clock: Arc::new(SystemClock),
        }
    }

    #[tokio::test]
    async fn state_survives_a_restart() {
        let dir = tempdir().unwrap();
        let config = BlockerConfig {
            data_dir: dir.path().to_path_buf(),
            ..BlockerConfig::default()
        };

        let (registry_state, session_state, stats_state) = {
            let context = AppContext::bootstrap(
                config.clone(),
                platform(Arc::new(RecordingBridge::default())),
            )
            .await
            .unwrap();
            let controller = context.controller();

            let mut draft = controller.begin_draft().unwrap();
            draft
                .set_selection(Some(SelectionToken::new(json!({"token": "abc"}))))
                .unwrap();
            draft.commit("Mornings").unwrap();
            let mut abandoned = controller.begin_draft().unwrap();
            abandoned.abort().await.unwrap();

            controller.set_strict_mode(true);
            controller.block().await.unwrap();
            context.stats().set_minutes_for_day("2024-06-01", 45.0);
            context.flush().await;

            (
                context.registry().state(),
                context.session().state(),
                context.stats().state(),
            )
        };

        let bridge = Arc::new(RecordingBridge::default());
        let context = AppContext::bootstrap(config, platform(bridge.clone()))
            .await
            .unwrap();

        assert_eq!(context.registry().state(), registry_state);
        assert_eq!(context.registry().len(), 1);
        assert_eq!(context.session().state(), session_state);
        assert!(context.session().is_blocking_active());
        assert_eq!(context.stats().state(), stats_state);
        // Startup re-asserted the guard for the restored strict session.
        assert_eq!(bridge.calls(), vec![true]);
    }

    #[tokio::test]
    async fn memory_store_state_carries_over_to_a_new_context() {
        let store = Arc::new(storage::MemoryKvStore::new());
        let config = BlockerConfig::default();

        let first = AppContext::with_store(
            config.clone(),
            store.clone(),
            platform(Arc::new(RecordingBridge::default())),
        )
        .await;
        first.registry().create_draft(NewMode::default()).unwrap();
        first.flush().await;
        drop(first);

        let second = AppContext::with_store(
            config,
            store.clone(),
            platform(Arc::new(RecordingBridge::default())),
        )
        .await;
        assert_eq!(second.registry().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_modes_store_does_not_leave_an_orphaned_session() {
        let store = Arc::new(storage::MemoryKvStore::new());
        store
            .set(
                storage::SESSION_KEY,
                json!({
                    "version": 1,
                    "state": {"isBlockingActive": true, "preventDeletionWhileBlocked": true}
                })
                .to_string(),
            )
            .await
            .unwrap();
        store.set(storage::MODES_KEY, "garbage".into()).await.unwrap();

        let bridge = Arc::new(RecordingBridge::default());
        let context =
            AppContext::with_store(BlockerConfig::default(), store.clone(), platform(bridge.clone()))
                .await;

        assert_eq!(context.registry().selected_mode_id(), None);
        assert!(!context.session().is_blocking_active());
        assert!(context.session().prevent_deletion_while_blocked());
        assert_eq!(bridge.calls(), vec![false]);
    }
}
