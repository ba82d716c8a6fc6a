use serde::{Deserialize, Serialize};

use crate::{
    domain::snapshot::SyncMode,
    reconcile::{diff::DiffResult, filter::FilterSettings},
};

/// A computed plan waiting for the user's decision.
///
/// Carries everything the confirmation step needs, so it can be resolved
/// in a later request or process without recomputing the diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedPlan {
    /// caller-chosen key: the web session id, or a fixed id for the CLI
    pub session: String,
    /// "Liked Songs" or the source playlist name
    pub target_name: String,
    pub mode: SyncMode,
    pub filter: FilterSettings,
    pub diff: DiffResult,
    pub created_at: i64,
}

/// The three independently stored components of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanPart {
    Add,
    Remove,
    Missing,
}

impl PlanPart {
    pub const ALL: [PlanPart; 3] = [PlanPart::Add, PlanPart::Remove, PlanPart::Missing];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanPart::Add => "add",
            PlanPart::Remove => "remove",
            PlanPart::Missing => "missing",
        }
    }
}
