use log::{info, warn};

use crate::{
    models::{ModeId, ModePatch, SelectionToken},
    session::{BlockController, BlockError, BlockResult},
};

use super::DeleteOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DraftStatus {
    Pending,
    Committed,
    Aborted,
}

/// A mode under construction.
///
/// The draft exists in the registry from the moment the handle is created so
/// nested flows (app selection) can attach to its id. The owner must finish
/// it with [`DraftHandle::commit`] or [`DraftHandle::abort`]; a handle dropped
/// while still pending discards its draft.
#[must_use = "a draft must be committed or aborted"]
pub struct DraftHandle {
    controller: BlockController,
    id: ModeId,
    status: DraftStatus,
}

impl DraftHandle {
    pub(crate) fn new(controller: BlockController, id: ModeId) -> Self {
        Self {
            controller,
            id,
            status: DraftStatus::Pending,
        }
    }

    pub fn id(&self) -> &ModeId {
        &self.id
    }

    pub fn is_pending(&self) -> bool {
        self.status == DraftStatus::Pending
    }

    pub fn set_selection(&self, selection: Option<SelectionToken>) -> BlockResult<()> {
        self.ensure_pending()?;
        self.controller
            .registry()
            .set_blocked_selection(&self.id, selection);
        Ok(())
    }

    /// Name the draft and keep it. An invalid name leaves the draft pending
    /// so the caller can retry.
    pub fn commit(&mut self, name: &str) -> BlockResult<ModeId> {
        self.ensure_pending()?;
        let registry = self.controller.registry();
        let name = registry.validate_name(name)?;
        if registry.get(&self.id).is_none() {
            self.status = DraftStatus::Aborted;
            return Err(BlockError::UnknownMode(self.id.to_string()));
        }
        registry.update(&self.id, ModePatch::name(name));
        self.status = DraftStatus::Committed;
        info!("Committed mode draft {}", self.id);
        Ok(self.id.clone())
    }

    /// Throw the draft away. If it was the last mode behind a running
    /// session, that session is ended and released.
    pub async fn abort(&mut self) -> BlockResult<DeleteOutcome> {
        self.ensure_pending()?;
        self.status = DraftStatus::Aborted;
        let outcome = self.controller.delete_mode(&self.id).await;
        info!("Aborted mode draft {}", self.id);
        Ok(outcome)
    }

    fn ensure_pending(&self) -> BlockResult<()> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(BlockError::DraftFinished)
        }
    }
}

impl Drop for DraftHandle {
    fn drop(&mut self) {
        if self.is_pending() {
            warn!("Mode draft {} dropped without commit or abort; discarding", self.id);
            self.controller.delete_mode_detached(&self.id);
        }
    }
}
