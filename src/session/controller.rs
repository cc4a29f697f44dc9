use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    config::BlockerConfig,
    models::{ModeId, ModePatch, NewMode, SelectionToken},
    modes::{DeleteOutcome, DraftHandle, ModeRegistry},
    platform::{read_trigger_code, Authorization, Platform},
    stats::StatsLedger,
};

use super::{BlockError, BlockResult, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StrictModeOutcome {
    Applied,
    /// Strict mode stays on until the running session ends.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum TriggerOutcome {
    /// No code, or not the expected one.
    Ignored,
    Blocked,
    Unblocked { credited_minutes: u64 },
}

/// Drives block/unblock and strict-mode transitions, keeping the OS removal
/// guard equal to `blocking && strict`.
#[derive(Clone)]
pub struct BlockController {
    registry: Arc<ModeRegistry>,
    session: Arc<SessionStore>,
    stats: Arc<StatsLedger>,
    platform: Platform,
    authorization: Arc<Authorization>,
    trigger_code: String,
    scan_timeout: Duration,
    scan_cancel: Arc<Mutex<Option<CancellationToken>>>,
}

impl BlockController {
    pub fn new(
        registry: Arc<ModeRegistry>,
        session: Arc<SessionStore>,
        stats: Arc<StatsLedger>,
        platform: Platform,
        config: &BlockerConfig,
    ) -> Self {
        let authorization = Arc::new(Authorization::new(platform.screen_time.clone()));
        Self {
            registry,
            session,
            stats,
            platform,
            authorization,
            trigger_code: config.trigger_code.clone(),
            scan_timeout: config.scan_timeout(),
            scan_cancel: Arc::new(Mutex::new(None)),
        }
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

    /// Re-assert the removal guard after a restart. Skipped when Screen Time
    /// authorization is not granted.
    pub async fn startup(&self) -> bool {
        // Stores hydrate independently; a session cannot outlive its mode.
        let orphaned =
            self.session.is_blocking_active() && self.registry.selected_mode_id().is_none();
        if orphaned {
            warn!("Restored blocking session has no selected mode; ending it");
            self.end_session();
        }

        if !self.authorization.ensure().await {
            warn!("Screen Time authorization not granted; skipping policy re-sync");
            return false;
        }
        if orphaned {
            self.lift_shield("ending orphaned session").await;
        }
        self.platform
            .policy
            .apply(self.session.deny_app_removal(), "startup");
        true
    }

    async fn ensure_authorized(&self) -> BlockResult<()> {
        if self.authorization.ensure().await {
            Ok(())
        } else {
            Err(BlockError::CapabilityDenied)
        }
    }

    fn selected_selection(&self) -> BlockResult<SelectionToken> {
        let mode = self
            .registry
            .selected_mode()
            .ok_or(BlockError::NoModeSelected)?;
        mode.blocked_app_selection.ok_or(BlockError::NoAppSelection)
    }

    pub async fn block(&self) -> BlockResult<()> {
        self.ensure_authorized().await?;
        let selection = self.selected_selection()?;

        self.platform
            .screen_time
            .block_selection(&selection)
            .await
            .map_err(|err| BlockError::Shield(format!("{err:#}")))?;

        self.platform
            .policy
            .apply(self.session.prevent_deletion_while_blocked(), "block");
        self.session.set_blocking_active(true, self.now());
        info!("Blocking session active");
        Ok(())
    }

    /// End the session. Returns the minutes credited to the stats ledger.
    pub async fn unblock(&self) -> BlockResult<u64> {
        self.ensure_authorized().await?;

        self.lift_shield("unblock").await;
        self.platform.policy.apply(false, "unblock");
        let credited = self.end_session();
        info!("Blocking session ended");
        Ok(credited)
    }

    async fn lift_shield(&self, reason: &str) {
        if let Err(err) = self.platform.screen_time.unblock_selection().await {
            warn!("Failed to lift app shield ({reason}): {err:#}");
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.platform.clock.now().with_timezone(&Utc)
    }

    fn end_session(&self) -> u64 {
        let now = self.now();
        match self.session.set_blocking_active(false, now) {
            Some(started_at) => self.stats.credit_interval(started_at, now),
            None => 0,
        }
    }

    /// Strict mode may always be turned on, but only turned off while idle.
    pub fn set_strict_mode(&self, next: bool) -> StrictModeOutcome {
        if !self.session.set_prevent_deletion_while_blocked(next) {
            return StrictModeOutcome::Rejected;
        }

        if self.session.is_blocking_active() {
            self.platform.policy.apply(next, "strict mode change");
        } else if !next {
            // Idle and relaxing: re-sync the guard to released.
            self.platform.policy.apply(false, "strict mode off");
        }
        StrictModeOutcome::Applied
    }

    /// Toggle the session after a tag scan matching the trigger code.
    pub async fn handle_trigger(&self) -> BlockResult<TriggerOutcome> {
        if !self.scan_matches().await {
            return Ok(TriggerOutcome::Ignored);
        }
        self.selected_selection()?;
        self.toggle().await
    }

    /// Start a session directly, but require a matching scan to end one.
    pub async fn handle_remote_toggle(&self) -> BlockResult<TriggerOutcome> {
        self.selected_selection()?;
        if self.session.is_blocking_active() && !self.scan_matches().await {
            return Ok(TriggerOutcome::Ignored);
        }
        self.toggle().await
    }

    async fn toggle(&self) -> BlockResult<TriggerOutcome> {
        if self.session.is_blocking_active() {
            let credited_minutes = self.unblock().await?;
            Ok(TriggerOutcome::Unblocked { credited_minutes })
        } else {
            self.block().await?;
            Ok(TriggerOutcome::Blocked)
        }
    }

    async fn scan_matches(&self) -> bool {
        let token = CancellationToken::new();
        {
            let mut guard = self.scan_cancel.lock().await;
            if let Some(previous) = guard.replace(token.clone()) {
                previous.cancel();
            }
        }

        let code = read_trigger_code(
            self.platform.trigger_reader.as_ref(),
            self.scan_timeout,
            &token,
        )
        .await;

        code.as_deref() == Some(self.trigger_code.as_str())
    }

    /// Abort a scan in progress, if any.
    pub async fn cancel_scan(&self) {
        if let Some(token) = self.scan_cancel.lock().await.take() {
            token.cancel();
        }
    }

    /// Start a mode draft. Discarding it goes through [`Self::delete_mode`],
    /// so a running session it was backing is released properly.
    pub fn begin_draft(&self) -> BlockResult<DraftHandle> {
        let id = self.registry.create_draft(NewMode::default())?;
        Ok(DraftHandle::new(self.clone(), id))
    }

    pub fn rename_mode(&self, id: &ModeId, name: &str) -> BlockResult<()> {
        let name = self.registry.validate_name(name)?;
        if self.registry.get(id).is_none() {
            return Err(BlockError::UnknownMode(id.to_string()));
        }
        self.registry.update(id, ModePatch::name(name));
        Ok(())
    }

    pub fn set_mode_selection(&self, id: &ModeId, selection: Option<SelectionToken>) -> BlockResult<()> {
        if self.registry.get(id).is_none() {
            return Err(BlockError::UnknownMode(id.to_string()));
        }
        self.registry.set_blocked_selection(id, selection);
        Ok(())
    }

    pub fn select_mode(&self, id: &ModeId) -> BlockResult<()> {
        if self.registry.select(id) {
            Ok(())
        } else {
            Err(BlockError::UnknownMode(id.to_string()))
        }
    }

    /// Delete a mode; if that leaves nothing selected mid-session, the shield
    /// and removal guard are released too.
    pub async fn delete_mode(&self, id: &ModeId) -> DeleteOutcome {
        let outcome = self.registry.delete(id);
        if self.settle_forced_end(&outcome) {
            self.lift_shield("last mode deleted").await;
        }
        outcome
    }

    /// Synchronous variant of [`Self::delete_mode`] for drop paths. The shield
    /// is lifted on a spawned task when a runtime is available.
    pub(crate) fn delete_mode_detached(&self, id: &ModeId) -> DeleteOutcome {
        let outcome = self.registry.delete(id);
        if self.settle_forced_end(&outcome) {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let controller = self.clone();
                    handle.spawn(async move {
                        controller.lift_shield("last mode discarded").await;
                    });
                }
                Err(_) => warn!("No async runtime; app shield left up after discarding last mode"),
            }
        }
        outcome
    }

    /// Release the guard and credit the session the registry just forced
    /// off. Returns whether the shield still has to be lifted.
    fn settle_forced_end(&self, outcome: &DeleteOutcome) -> bool {
        let DeleteOutcome::DeletedAndEndedSession { started_at } = outcome else {
            return false;
        };
        self.platform.policy.apply(false, "last mode deleted");
        if let Some(started_at) = started_at {
            self.stats.credit_interval(*started_at, self.now());
        }
        true
    }
}
