//! Path reconciliation
//!
//! Merges a target curriculum into a user's persisted, progress-bearing path.
//!
//! ## Intents
//!
//! - `IncrementalAdd` - existing active assignments stay as they are; target
//!   drafts whose normalized name is not already active are appended after the
//!   current maximum `sequence_order`.
//! - `FullReplace` - every active assignment is archived (rows kept), then the
//!   target is walked in order and placed at `1..N`. Completion state survives
//!   only for drafts carrying an exact reference to a previously active module.
//!
//! Entries are processed sequentially. A failing entry is rolled back on its
//! own, recorded as `EntryStatus::Failed` and the batch continues. Failures
//! that affect the whole operation (loading the path, the archive sweep)
//! return `Err` and stop immediately; nothing already applied is undone.

pub mod apply;
pub mod plan;

use serde::{Deserialize, Serialize};

use crate::error::CurriculumError;
use crate::resolver::LinkSummary;

pub use apply::reconcile;
pub use plan::{plan, ActiveEntry, PlannedStep, ReconciliationPlan};

/// Name given to a user's first path when the target has no title
pub const DEFAULT_PATH_NAME: &str = "My Learning Path";

/// Caller's classification of the requested edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    IncrementalAdd,
    FullReplace,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::IncrementalAdd => "incremental_add",
            Intent::FullReplace => "full_replace",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Intent {
    type Err = CurriculumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "incremental_add" | "incremental-add" | "add" | "add_modules" => Ok(Intent::IncrementalAdd),
            "full_replace" | "full-replace" | "replace" => Ok(Intent::FullReplace),
            other => Err(CurriculumError::InvalidInput(format!(
                "unknown intent '{}': expected incremental_add or full_replace",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The module is already in the active set
    AlreadyActive,
    /// An earlier entry of the same target placed this module
    DuplicateInTarget,
}

/// Per-entry result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryStatus {
    Added {
        module_id: String,
        sequence_order: i64,
        /// A new catalog module was created for this entry
        module_created: bool,
        progress_carried: bool,
        links: LinkSummary,
    },
    Skipped {
        reason: SkipReason,
        module_id: Option<String>,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryOutcome {
    /// Position of the entry in the target curriculum
    pub index: usize,
    pub title: String,
    #[serde(flatten)]
    pub status: EntryStatus,
}

/// Aggregate and itemized result of one reconciliation
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationResult {
    pub user_id: String,
    pub path_id: String,
    pub intent: Intent,
    /// `true` when this call created the user's path
    pub path_created: bool,
    pub archived: usize,
    pub added: usize,
    pub carried: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Active assignments after reconciliation
    pub active_total: usize,
    pub outcomes: Vec<EntryOutcome>,
}

impl ReconciliationResult {
    /// Every entry of a non-empty target failed
    pub fn is_total_failure(&self) -> bool {
        !self.outcomes.is_empty() && self.failed == self.outcomes.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &EntryOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, EntryStatus::Failed { .. }))
    }
}
