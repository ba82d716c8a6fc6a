//! Two-phase commit gate between analysis and mutation.
//!
//! ```text
//! Planned -> AwaitingConfirmation -> Applied
//!                                 \-> Cancelled
//! ```
//!
//! Entering `AwaitingConfirmation` persists the plan so the decision can
//! arrive in a later request. Leaving it, either way, clears the stored plan.

use log::{error, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::{
    domain::{plan::StagedPlan, snapshot::SyncMode, track::Track},
    providers::TargetLibrary,
    storage::{error::StorageError, plans::PlanStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ApplyState {
    Planned,
    AwaitingConfirmation,
    Applied,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: ApplyState, to: ApplyState },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Which halves of an accepted plan to carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub add: bool,
    pub remove: bool,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            add: true,
            remove: true,
        }
    }
}

/// Per-id outcome counts; nothing applied is rolled back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub starred: usize,
    pub unstarred: usize,
    /// tracks without a target id, nothing to star
    pub skipped: usize,
    pub failed: usize,
    pub playlist_replaced: bool,
    pub playlist_created: bool,
}

impl ApplyReport {
    pub fn succeeded(&self) -> usize {
        self.starred + self.unstarred + usize::from(self.playlist_created)
    }
}

pub struct ApplyStage {
    state: ApplyState,
    plan: StagedPlan,
}

impl ApplyStage {
    pub fn planned(plan: StagedPlan) -> Self {
        Self {
            state: ApplyState::Planned,
            plan,
        }
    }

    /// Reloads the plan staged for `session`, if one is awaiting confirmation.
    pub fn resume(store: &PlanStore, session: &str) -> Result<Option<Self>, ApplyError> {
        Ok(store.pending(session)?.map(|plan| Self {
            state: ApplyState::AwaitingConfirmation,
            plan,
        }))
    }

    pub fn state(&self) -> ApplyState {
        self.state
    }

    pub fn plan(&self) -> &StagedPlan {
        &self.plan
    }

    pub fn into_plan(self) -> StagedPlan {
        self.plan
    }

    fn expect_state(&self, from: ApplyState, to: ApplyState) -> Result<(), ApplyError> {
        if self.state != from {
            return Err(ApplyError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        Ok(())
    }

    /// The state only moves once the store has been updated.
    pub fn await_confirmation(&mut self, store: &mut PlanStore) -> Result<(), ApplyError> {
        self.expect_state(ApplyState::Planned, ApplyState::AwaitingConfirmation)?;
        store.stage(&self.plan)?;
        self.state = ApplyState::AwaitingConfirmation;
        info!(
            "Plan for '{}' staged: {} to add, {} to remove, {} missing",
            self.plan.target_name,
            self.plan.diff.to_add.len(),
            self.plan.diff.to_remove.len(),
            self.plan.diff.missing.len()
        );
        Ok(())
    }

    /// Carries out the plan against the target.
    ///
    /// The stored plan is cleared before mutating, so a plan is applied at most once.
    pub fn confirm(
        &mut self,
        store: &mut PlanStore,
        target: &dyn TargetLibrary,
        selection: Selection,
    ) -> Result<ApplyReport, ApplyError> {
        self.expect_state(ApplyState::AwaitingConfirmation, ApplyState::Applied)?;
        store.clear(&self.plan.session)?;
        self.state = ApplyState::Applied;

        let report = match &self.plan.mode {
            SyncMode::Favorites => apply_favorites(&self.plan, target, selection),
            SyncMode::Playlist { .. } => apply_playlist(&self.plan, target, selection),
        };

        info!(
            "Applied plan for '{}': {} succeeded, {} failed, {} skipped",
            self.plan.target_name,
            report.succeeded(),
            report.failed,
            report.skipped
        );
        Ok(report)
    }

    pub fn cancel(&mut self, store: &mut PlanStore) -> Result<(), ApplyError> {
        self.expect_state(ApplyState::AwaitingConfirmation, ApplyState::Cancelled)?;
        store.clear(&self.plan.session)?;
        self.state = ApplyState::Cancelled;
        info!("Plan for '{}' cancelled, nothing changed", self.plan.target_name);
        Ok(())
    }
}

/// star/unstar one id at a time; returns (succeeded, failed, skipped)
fn for_each_id(
    tracks: &[Track],
    action: &str,
    mut call: impl FnMut(&[String]) -> Result<(), crate::providers::ProviderError>,
) -> (usize, usize, usize) {
    let (mut ok, mut failed, mut skipped) = (0, 0, 0);
    for track in tracks {
        let Some(id) = &track.id else {
            warn!(
                "'{} - {}' has no id in the target library, cannot {action} it",
                track.artist, track.title
            );
            skipped += 1;
            continue;
        };
        match call(std::slice::from_ref(id)) {
            Ok(()) => ok += 1,
            Err(e) => {
                error!("Failed to {action} '{} - {}': {e}", track.artist, track.title);
                failed += 1;
            }
        }
    }
    (ok, failed, skipped)
}

fn apply_favorites(
    plan: &StagedPlan,
    target: &dyn TargetLibrary,
    selection: Selection,
) -> ApplyReport {
    let mut report = ApplyReport::default();

    if selection.add {
        let (ok, failed, skipped) = for_each_id(&plan.diff.to_add, "star", |ids| target.star(ids));
        report.starred = ok;
        report.failed += failed;
        report.skipped += skipped;
    }
    if selection.remove {
        let (ok, failed, skipped) =
            for_each_id(&plan.diff.to_remove, "unstar", |ids| target.unstar(ids));
        report.unstarred = ok;
        report.failed += failed;
        report.skipped += skipped;
    }
    report
}

/// Deletes any playlist with the exact same name, then recreates it in order.
fn apply_playlist(plan: &StagedPlan, target: &dyn TargetLibrary, selection: Selection) -> ApplyReport {
    let mut report = ApplyReport::default();
    if !selection.add {
        return report;
    }

    let name = &plan.target_name;
    let existing = match target.list_playlists() {
        Ok(playlists) => playlists.into_iter().find(|p| &p.name == name),
        Err(e) => {
            // creating blindly could leave two playlists with the same name
            error!("Failed to list playlists, not replacing '{name}': {e}");
            report.failed += 1;
            return report;
        }
    };

    if let Some(playlist) = existing {
        if let Err(e) = target.delete_playlist(&playlist.id) {
            error!("Failed to delete playlist '{name}' ({}): {e}", playlist.id);
            report.failed += 1;
            return report;
        }
        report.playlist_replaced = true;
    }

    let ids = plan
        .diff
        .to_add
        .iter()
        .filter_map(|t| t.id.clone())
        .collect::<Vec<_>>();
    report.skipped = plan.diff.to_add.len() - ids.len();

    match target.create_playlist(name, &ids) {
        Ok(()) => {
            info!("Playlist '{name}' synced with {} tracks", ids.len());
            report.playlist_created = true;
        }
        Err(e) => {
            error!("Failed to create playlist '{name}': {e}");
            report.failed += 1;
        }
    }
    report
}
