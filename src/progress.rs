//! Progress preservation policy
//!
//! Incremental adds never touch existing rows, so their progress survives
//! unconditionally and this module is not consulted. Full replacements carry
//! completion state only for drafts holding an `Existing` reference to a module
//! in the carry baseline (the set active right before reconciliation, plus any
//! snapshot supplied by a restore). Matching names never carry credit:
//! regenerated content under the same title may differ substantively.

use std::collections::HashMap;

use crate::db::assignments::AssignmentProgress;
use crate::draft::ModuleRef;

/// Progress that a full replacement may carry forward, keyed by module ID
#[derive(Debug, Clone, Default)]
pub struct CarryBaseline {
    entries: HashMap<String, AssignmentProgress>,
}

impl CarryBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, AssignmentProgress)>,
    {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Entries from `other` replace ours for the same module
    pub fn overlay(mut self, other: &CarryBaseline) -> Self {
        for (module_id, progress) in &other.entries {
            self.entries.insert(module_id.clone(), progress.clone());
        }
        self
    }

    pub fn insert(&mut self, module_id: impl Into<String>, progress: AssignmentProgress) {
        self.entries.insert(module_id.into(), progress);
    }

    pub fn contains(&self, module_id: &str) -> bool {
        self.entries.contains_key(module_id)
    }

    pub fn get(&self, module_id: &str) -> Option<&AssignmentProgress> {
        self.entries.get(module_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Progress to carry for a draft under full replacement, `None` for a fresh start
pub fn carried_progress(reference: &ModuleRef, baseline: &CarryBaseline) -> Option<AssignmentProgress> {
    reference
        .existing_id()
        .and_then(|id| baseline.get(id))
        .cloned()
}

/// Clamp a reported percentage and derive completion.
///
/// Reaching 100 completes the module; the first completion date is kept on
/// later updates so re-reporting does not move it.
pub fn apply_percentage(
    current: &AssignmentProgress,
    percentage: i64,
    now: &str,
) -> AssignmentProgress {
    let percentage = percentage.clamp(0, 100);
    let is_completed = percentage >= 100;
    let completion_date = if is_completed {
        current.completion_date.clone().or_else(|| Some(now.to_string()))
    } else {
        None
    };

    AssignmentProgress {
        is_completed,
        completion_date,
        progress_percentage: percentage,
        started_at: current.started_at.clone(),
    }
}
