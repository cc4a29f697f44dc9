use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    log_info, log_warn,
    models::{Mode, ModeId, ModePatch, NewMode, SelectionToken},
    session::{BlockError, BlockResult, SessionStore},
    storage::{KeyValueStore, PersistQueue, Persisted, MODES_KEY},
};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistryState {
    pub modes_by_id: BTreeMap<ModeId, Mode>,
    pub mode_order: Vec<ModeId>,
    pub selected_mode_id: Option<ModeId>,
}

impl RegistryState {
    /// Restore the order/map/selection invariants on loaded data. Returns
    /// whether anything had to be fixed.
    fn repair(&mut self) -> bool {
        let before = self.clone();

        let mut seen = HashSet::new();
        let modes_by_id = &self.modes_by_id;
        self.mode_order
            .retain(|id| modes_by_id.contains_key(id) && seen.insert(id.clone()));
        for id in self.modes_by_id.keys() {
            if !seen.contains(id) {
                self.mode_order.push(id.clone());
            }
        }
        for (id, mode) in self.modes_by_id.iter_mut() {
            if mode.id != *id {
                mode.id = id.clone();
            }
        }

        let selection_valid = self
            .selected_mode_id
            .as_ref()
            .is_some_and(|id| self.modes_by_id.contains_key(id));
        if !selection_valid {
            self.selected_mode_id = self.mode_order.first().cloned();
        }

        *self != before
    }
}

/// Result of [`ModeRegistry::delete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Missing,
    Deleted,
    /// The last selectable mode went away while a session was running, so the
    /// session was forced off.
    DeletedAndEndedSession { started_at: Option<DateTime<Utc>> },
}

/// User-defined modes, their display order, and the single selection.
pub struct ModeRegistry {
    cell: Persisted<RegistryState>,
    session: Arc<SessionStore>,
    max_modes: usize,
    max_name_len: usize,
}

impl ModeRegistry {
    pub fn new(
        queue: PersistQueue,
        session: Arc<SessionStore>,
        max_modes: usize,
        max_name_len: usize,
    ) -> Self {
        Self {
            cell: Persisted::new(MODES_KEY, queue),
            session,
            max_modes,
            max_name_len,
        }
    }

    pub async fn hydrate(&self, store: &dyn KeyValueStore) {
        self.cell.hydrate(store).await;
        if self.cell.update(RegistryState::repair) {
            log_warn!("Repaired inconsistent mode registry loaded from storage");
        }
    }

    pub fn state(&self) -> RegistryState {
        self.cell.snapshot()
    }

    pub fn max_modes(&self) -> usize {
        self.max_modes
    }

    pub fn len(&self) -> usize {
        self.cell.read(|s| s.mode_order.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn can_create(&self) -> bool {
        self.len() < self.max_modes
    }

    pub fn get(&self, id: &ModeId) -> Option<Mode> {
        self.cell.read(|s| s.modes_by_id.get(id).cloned())
    }

    /// Modes in display order.
    pub fn modes(&self) -> Vec<Mode> {
        self.cell.read(|s| {
            s.mode_order
                .iter()
                .filter_map(|id| s.modes_by_id.get(id).cloned())
                .collect()
        })
    }

    pub fn selected_mode_id(&self) -> Option<ModeId> {
        self.cell.read(|s| s.selected_mode_id.clone())
    }

    pub fn selected_mode(&self) -> Option<Mode> {
        self.cell.read(|s| {
            s.selected_mode_id
                .as_ref()
                .and_then(|id| s.modes_by_id.get(id).cloned())
        })
    }

    pub fn blocked_selection(&self, id: &ModeId) -> Option<SelectionToken> {
        self.cell.read(|s| {
            s.modes_by_id
                .get(id)
                .and_then(|mode| mode.blocked_app_selection.clone())
        })
    }

    /// Trimmed `name` if it is non-empty and within the length bound.
    pub fn validate_name(&self, name: &str) -> BlockResult<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(BlockError::InvalidModeName("name must not be empty".into()));
        }
        if trimmed.chars().count() > self.max_name_len {
            return Err(BlockError::InvalidModeName(format!(
                "name must be at most {} characters",
                self.max_name_len
            )));
        }
        Ok(trimmed.to_string())
    }

    /// Append a new mode, selecting it when nothing is selected yet.
    pub fn create_draft(&self, initial: NewMode) -> BlockResult<ModeId> {
        let max_modes = self.max_modes;
        let mut created = None;
        self.cell.update(|s| {
            if s.mode_order.len() >= max_modes {
                return false;
            }

            let mut id = ModeId::generate();
            while s.modes_by_id.contains_key(&id) {
                id = ModeId::generate();
            }

            s.modes_by_id.insert(
                id.clone(),
                Mode {
                    id: id.clone(),
                    name: initial.name,
                    blocked_app_selection: SelectionToken::normalize(
                        initial.blocked_app_selection,
                    ),
                },
            );
            s.mode_order.push(id.clone());
            if s.selected_mode_id.is_none() {
                s.selected_mode_id = Some(id.clone());
            }
            created = Some(id);
            true
        });

        match created {
            Some(id) => {
                log_info!("Created mode {id}");
                Ok(id)
            }
            None => {
                log_warn!("Mode limit of {max_modes} reached");
                Err(BlockError::LimitReached { max: max_modes })
            }
        }
    }

    /// Merge `patch` into an existing mode. Unknown ids are ignored.
    pub fn update(&self, id: &ModeId, patch: ModePatch) -> bool {
        self.cell.update(|s| match s.modes_by_id.get_mut(id) {
            Some(mode) => patch.apply(mode),
            None => false,
        })
    }

    pub fn set_blocked_selection(&self, id: &ModeId, selection: Option<SelectionToken>) -> bool {
        self.update(id, ModePatch::selection(selection))
    }

    /// Select `id` if it exists; otherwise nothing happens.
    pub fn select(&self, id: &ModeId) -> bool {
        let mut found = false;
        self.cell.update(|s| {
            if !s.modes_by_id.contains_key(id) {
                return false;
            }
            found = true;
            if s.selected_mode_id.as_ref() == Some(id) {
                return false;
            }
            s.selected_mode_id = Some(id.clone());
            true
        });
        found
    }

    /// Remove a mode. Deleting the selected mode moves the selection to the
    /// first remaining mode; if none remain, any running session is ended.
    pub fn delete(&self, id: &ModeId) -> DeleteOutcome {
        let mut removed = false;
        let mut unselected = false;
        self.cell.update(|s| {
            if s.modes_by_id.remove(id).is_none() {
                return false;
            }
            s.mode_order.retain(|x| x != id);
            if s.selected_mode_id.as_ref() == Some(id) {
                s.selected_mode_id = s.mode_order.first().cloned();
            }
            removed = true;
            unselected = s.selected_mode_id.is_none();
            true
        });

        if !removed {
            return DeleteOutcome::Missing;
        }
        log_info!("Deleted mode {id}");

        if unselected && self.session.is_blocking_active() {
            let started_at = self.session.set_blocking_active(false, Utc::now());
            log_warn!("No mode left selected; blocking session forced off");
            return DeleteOutcome::DeletedAndEndedSession { started_at };
        }
        DeleteOutcome::Deleted
    }
}
