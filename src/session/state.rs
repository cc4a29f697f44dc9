use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{KeyValueStore, PersistQueue, Persisted, SESSION_KEY};
use crate::{log_info, log_warn};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionState {
    pub is_blocking_active: bool,
    /// Strict mode: deny removal of the blocker while a session runs.
    pub prevent_deletion_while_blocked: bool,
    pub blocking_started_at: Option<DateTime<Utc>>,
}

impl SessionState {
    /// The value the OS deny-removal flag should hold.
    pub fn deny_app_removal(&self) -> bool {
        self.is_blocking_active && self.prevent_deletion_while_blocked
    }
}

/// Owner of the blocking flag and the strict-mode preference.
pub struct SessionStore {
    cell: Persisted<SessionState>,
}

impl SessionStore {
    pub fn new(queue: PersistQueue) -> Self {
        Self {
            cell: Persisted::new(SESSION_KEY, queue),
        }
    }

    pub async fn hydrate(&self, store: &dyn KeyValueStore) {
        self.cell.hydrate(store).await;
    }

    pub fn state(&self) -> SessionState {
        self.cell.snapshot()
    }

    pub fn is_blocking_active(&self) -> bool {
        self.cell.read(|s| s.is_blocking_active)
    }

    pub fn prevent_deletion_while_blocked(&self) -> bool {
        self.cell.read(|s| s.prevent_deletion_while_blocked)
    }

    pub fn deny_app_removal(&self) -> bool {
        self.cell.read(SessionState::deny_app_removal)
    }

    /// Set the blocking flag. Returns when the session that this call ended
    /// had started, if it ended one.
    pub fn set_blocking_active(&self, active: bool, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut ended_started_at = None;
        self.cell.update(|s| {
            if s.is_blocking_active == active {
                return false;
            }
            s.is_blocking_active = active;
            if active {
                s.blocking_started_at = Some(now);
            } else {
                ended_started_at = s.blocking_started_at.take();
            }
            true
        });
        if let Some(started_at) = ended_started_at {
            log_info!("Blocking session started at {started_at} ended at {now}");
        }
        ended_started_at
    }

    /// Strict mode cannot be switched off while a session is active. Such a
    /// request leaves the state untouched and returns `false`.
    pub fn set_prevent_deletion_while_blocked(&self, next: bool) -> bool {
        let mut accepted = true;
        self.cell.update(|s| {
            if s.is_blocking_active && !next {
                accepted = false;
                return false;
            }
            let changed = s.prevent_deletion_while_blocked != next;
            s.prevent_deletion_while_blocked = next;
            changed
        });
        if !accepted {
            log_warn!("Refusing to disable strict mode during an active blocking session");
        }
        accepted
    }
}
