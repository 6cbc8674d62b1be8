//! Pure reconciliation planning
//!
//! Works on explicit snapshots of the current active set and the target
//! curriculum, so the decision logic is testable without a store. Catalog
//! identity is only known at apply time; the applier re-checks duplicates
//! after resolution.

use std::collections::HashSet;

use serde::Serialize;

use super::{Intent, SkipReason};
use crate::db::assignments::{ActiveAssignment, AssignmentProgress};
use crate::draft::{normalize_title, CurriculumDraft};
use crate::progress::{carried_progress, CarryBaseline};

/// One module of the current active set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveEntry {
    pub module_id: String,
    pub normalized_name: String,
    pub sequence_order: i64,
    pub progress: AssignmentProgress,
}

impl From<&ActiveAssignment> for ActiveEntry {
    fn from(active: &ActiveAssignment) -> Self {
        Self {
            module_id: active.assignment.module_id.clone(),
            normalized_name: active.module.normalized_name.clone(),
            sequence_order: active.assignment.sequence_order,
            progress: active.assignment.progress(),
        }
    }
}

/// What to do with one target entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedStep {
    /// Re-place a previously active module with its progress
    Carry {
        index: usize,
        module_id: String,
        progress: AssignmentProgress,
    },
    /// Resolve through the catalog and place with zero progress
    Create { index: usize },
    Skip { index: usize, reason: SkipReason },
}

impl PlannedStep {
    pub fn index(&self) -> usize {
        match self {
            PlannedStep::Carry { index, .. }
            | PlannedStep::Create { index }
            | PlannedStep::Skip { index, .. } => *index,
        }
    }
}

/// Ordered steps plus the set that is archived first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationPlan {
    pub intent: Intent,
    /// Modules whose assignments flip to archived before any step runs
    pub archive: Vec<String>,
    /// Sequence number given to the first placed entry
    pub first_sequence: i64,
    pub steps: Vec<PlannedStep>,
}

/// Plan a reconciliation of `target` into `current`
pub fn plan(
    current: &[ActiveEntry],
    target: &CurriculumDraft,
    intent: Intent,
    baseline: &CarryBaseline,
) -> ReconciliationPlan {
    match intent {
        Intent::IncrementalAdd => plan_incremental(current, target),
        Intent::FullReplace => plan_replace(current, target, baseline),
    }
}

fn plan_incremental(current: &[ActiveEntry], target: &CurriculumDraft) -> ReconciliationPlan {
    let active_names: HashSet<&str> = current.iter().map(|e| e.normalized_name.as_str()).collect();
    let active_ids: HashSet<&str> = current.iter().map(|e| e.module_id.as_str()).collect();
    let mut seen_names: HashSet<String> = HashSet::new();

    let steps = target
        .modules
        .iter()
        .enumerate()
        .map(|(index, draft)| {
            let name = draft.normalized_title();
            let referenced_active = draft
                .reference
                .existing_id()
                .is_some_and(|id| active_ids.contains(id));

            if active_names.contains(name.as_str()) || referenced_active {
                PlannedStep::Skip { index, reason: SkipReason::AlreadyActive }
            } else if !seen_names.insert(name) {
                PlannedStep::Skip { index, reason: SkipReason::DuplicateInTarget }
            } else {
                PlannedStep::Create { index }
            }
        })
        .collect();

    let max_sequence = current.iter().map(|e| e.sequence_order).max().unwrap_or(0);

    ReconciliationPlan {
        intent: Intent::IncrementalAdd,
        archive: vec![],
        first_sequence: max_sequence + 1,
        steps,
    }
}

fn plan_replace(
    current: &[ActiveEntry],
    target: &CurriculumDraft,
    baseline: &CarryBaseline,
) -> ReconciliationPlan {
    let mut carried_ids: HashSet<String> = HashSet::new();
    let mut seen_names: HashSet<String> = HashSet::new();

    let steps = target
        .modules
        .iter()
        .enumerate()
        .map(|(index, draft)| {
            let carried = draft
                .reference
                .existing_id()
                .zip(carried_progress(&draft.reference, baseline));

            if let Some((module_id, progress)) = carried {
                let module_id = module_id.to_string();
                if !carried_ids.insert(module_id.clone()) {
                    return PlannedStep::Skip { index, reason: SkipReason::DuplicateInTarget };
                }
                return PlannedStep::Carry { index, module_id, progress };
            }

            if !seen_names.insert(normalize_title(&draft.title)) {
                PlannedStep::Skip { index, reason: SkipReason::DuplicateInTarget }
            } else {
                PlannedStep::Create { index }
            }
        })
        .collect();

    ReconciliationPlan {
        intent: Intent::FullReplace,
        archive: current.iter().map(|e| e.module_id.clone()).collect(),
        first_sequence: 1,
        steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::ModuleDraft;

    const ID_A: &str = "00000000-0000-4000-8000-00000000000a";
    const ID_B: &str = "00000000-0000-4000-8000-00000000000b";
    const ID_C: &str = "00000000-0000-4000-8000-00000000000c";

    fn entry(id: &str, name: &str, seq: i64, done: bool) -> ActiveEntry {
        ActiveEntry {
            module_id: id.to_string(),
            normalized_name: name.to_string(),
            sequence_order: seq,
            progress: AssignmentProgress {
                is_completed: done,
                completion_date: done.then(|| "2024-01-01T00:00:00.000Z".to_string()),
                progress_percentage: if done { 100 } else { 0 },
                started_at: None,
            },
        }
    }

    fn abc() -> Vec<ActiveEntry> {
        vec![
            entry(ID_A, "a", 1, true),
            entry(ID_B, "b", 2, false),
            entry(ID_C, "c", 3, false),
        ]
    }

    fn baseline(current: &[ActiveEntry]) -> CarryBaseline {
        CarryBaseline::from_entries(current.iter().map(|e| (e.module_id.clone(), e.progress.clone())))
    }

    #[test]
    fn test_incremental_appends_after_max() {
        let current = abc();
        let target = CurriculumDraft::new(vec![ModuleDraft::named("D")]);
        let plan = plan(&current, &target, Intent::IncrementalAdd, &baseline(&current));

        assert!(plan.archive.is_empty());
        assert_eq!(plan.first_sequence, 4);
        assert_eq!(plan.steps, vec![PlannedStep::Create { index: 0 }]);
    }

    #[test]
    fn test_incremental_skips_present_and_repeated() {
        let current = abc();
        let target = CurriculumDraft::new(vec![
            ModuleDraft::named(" B "),
            ModuleDraft::named("D"),
            ModuleDraft::named("d"),
            ModuleDraft::referencing(ID_C, "Renamed C"),
        ]);
        let plan = plan(&current, &target, Intent::IncrementalAdd, &CarryBaseline::new());

        assert_eq!(
            plan.steps,
            vec![
                PlannedStep::Skip { index: 0, reason: SkipReason::AlreadyActive },
                PlannedStep::Create { index: 1 },
                PlannedStep::Skip { index: 2, reason: SkipReason::DuplicateInTarget },
                PlannedStep::Skip { index: 3, reason: SkipReason::AlreadyActive },
            ]
        );
    }

    #[test]
    fn test_replace_carries_only_exact_references() {
        let current = abc();
        let target = CurriculumDraft::new(vec![
            ModuleDraft::referencing(ID_A, "A"),
            ModuleDraft::named("New"),
            ModuleDraft::named("a"),
        ]);
        let plan = plan(&current, &target, Intent::FullReplace, &baseline(&current));

        assert_eq!(plan.archive, vec![ID_A.to_string(), ID_B.to_string(), ID_C.to_string()]);
        assert_eq!(plan.first_sequence, 1);
        match &plan.steps[0] {
            PlannedStep::Carry { module_id, progress, .. } => {
                assert_eq!(module_id, ID_A);
                assert!(progress.is_completed);
            }
            other => panic!("expected carry, got {:?}", other),
        }
        assert_eq!(plan.steps[1], PlannedStep::Create { index: 1 });
        // Same name as completed A but no reference: goes through the resolver, never carries
        assert_eq!(plan.steps[2], PlannedStep::Create { index: 2 });
    }

    #[test]
    fn test_replace_reference_outside_baseline_is_created() {
        let current = abc();
        let other = "11111111-1111-4111-8111-111111111111";
        let target = CurriculumDraft::new(vec![
            ModuleDraft::referencing(other, "Elsewhere"),
            ModuleDraft::referencing(ID_B, "B"),
            ModuleDraft::referencing(ID_B, "B again"),
        ]);
        let plan = plan(&current, &target, Intent::FullReplace, &baseline(&current));

        assert_eq!(plan.steps[0], PlannedStep::Create { index: 0 });
        assert!(matches!(plan.steps[1], PlannedStep::Carry { index: 1, .. }));
        assert_eq!(
            plan.steps[2],
            PlannedStep::Skip { index: 2, reason: SkipReason::DuplicateInTarget }
        );
    }

    #[test]
    fn test_replace_with_empty_target_archives_everything() {
        let current = abc();
        let plan = plan(&current, &CurriculumDraft::default(), Intent::FullReplace, &baseline(&current));
        assert_eq!(plan.archive.len(), 3);
        assert!(plan.steps.is_empty());
    }
}
