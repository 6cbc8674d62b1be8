//! View types for the client boundary
//!
//! These types use camelCase serialization for TypeScript clients.
//! Engine types (reconcile, stats, curriculum) stay snake_case.
//!
//! Pattern:
//! - Service layer returns engine types (ReconciliationResult, CurriculumStats, ...)
//! - Front ends convert to View types before serializing
//! - ts-rs generates camelCase TypeScript from View types
//!
//! Counts narrow to `u32` and orders to `i32` so the generated TypeScript uses
//! `number` throughout.

use serde::Serialize;
use ts_rs::TS;

use crate::curriculum::{ActiveCurriculum, CurriculumModule};
use crate::db::{BackupRow, ResourceRow, TaskRow};
use crate::guard::{GuardedOutcome, RestoreOutcome, SnapshotOutcome};
use crate::reconcile::{EntryOutcome, EntryStatus, ReconciliationResult, SkipReason};
use crate::stats::CurriculumStats;

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn narrow(n: i64) -> i32 {
    i32::try_from(n).unwrap_or(if n < 0 { i32::MIN } else { i32::MAX })
}

// ============================================================================
// Stats View
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct StatsView {
    pub has_roadmap: bool,
    pub path_id: Option<String>,
    pub path_name: Option<String>,
    pub total_modules: u32,
    pub completed_modules: u32,
    pub completion_percentage: u32,
    pub total_hours: f64,
    pub remaining_hours: f64,
    pub weeks_remaining: Option<u32>,
    /// RFC 3339 timestamp
    pub estimated_completion_date: Option<String>,
}

impl From<CurriculumStats> for StatsView {
    fn from(s: CurriculumStats) -> Self {
        Self {
            has_roadmap: s.has_roadmap,
            path_id: s.path_id,
            path_name: s.path_name,
            total_modules: count(s.total_modules),
            completed_modules: count(s.completed_modules),
            completion_percentage: s.completion_percentage,
            total_hours: s.total_hours,
            remaining_hours: s.remaining_hours,
            weeks_remaining: s.weeks_remaining,
            estimated_completion_date: s.estimated_completion_date.map(|d| d.to_rfc3339()),
        }
    }
}

// ============================================================================
// Curriculum Views
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ResourceView {
    pub resource_id: String,
    pub title: String,
    pub resource_type: String,
    pub url: Option<String>,
    pub estimated_minutes: i32,
}

impl From<ResourceRow> for ResourceView {
    fn from(r: ResourceRow) -> Self {
        Self {
            resource_id: r.resource_id,
            title: r.title,
            resource_type: r.resource_type,
            url: r.url,
            estimated_minutes: narrow(r.estimated_minutes),
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct TaskView {
    pub task_id: String,
    pub title: String,
    pub description: Option<String>,
    pub task_type: String,
    pub estimated_minutes: i32,
    pub instructions: Option<String>,
}

impl From<TaskRow> for TaskView {
    fn from(t: TaskRow) -> Self {
        Self {
            task_id: t.task_id,
            title: t.title,
            description: t.description,
            task_type: t.task_type,
            estimated_minutes: narrow(t.estimated_minutes),
            instructions: t.instructions,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ActiveModuleView {
    pub module_id: String,
    pub name: String,
    pub description: Option<String>,
    pub difficulty: String,
    pub estimated_hours: f64,
    pub skills: Vec<String>,
    pub prerequisites: Vec<String>,
    pub sequence_order: i32,
    pub is_completed: bool,
    pub progress_percentage: i32,
    pub completion_date: Option<String>,
    pub started_at: String,
    pub resources: Vec<ResourceView>,
    pub tasks: Vec<TaskView>,
}

impl From<CurriculumModule> for ActiveModuleView {
    fn from(m: CurriculumModule) -> Self {
        Self {
            module_id: m.module.module_id,
            name: m.module.name,
            description: m.module.description,
            difficulty: m.module.difficulty,
            estimated_hours: m.module.estimated_hours,
            skills: m.module.skills,
            prerequisites: m.module.prerequisites,
            sequence_order: narrow(m.assignment.sequence_order),
            is_completed: m.assignment.is_completed,
            progress_percentage: narrow(m.assignment.progress_percentage),
            completion_date: m.assignment.completion_date,
            started_at: m.assignment.started_at,
            resources: m.resources.into_iter().map(ResourceView::from).collect(),
            tasks: m.tasks.into_iter().map(TaskView::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ActiveCurriculumView {
    pub path_id: String,
    pub name: String,
    pub description: Option<String>,
    pub updated_at: String,
    pub modules: Vec<ActiveModuleView>,
}

impl From<ActiveCurriculum> for ActiveCurriculumView {
    fn from(c: ActiveCurriculum) -> Self {
        Self {
            path_id: c.path.path_id,
            name: c.path.name,
            description: c.path.description,
            updated_at: c.path.updated_at,
            modules: c.modules.into_iter().map(ActiveModuleView::from).collect(),
        }
    }
}

// ============================================================================
// Reconciliation Views
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct EntryOutcomeView {
    pub index: u32,
    pub title: String,
    /// "added", "skipped" or "failed"
    pub status: String,
    pub module_id: Option<String>,
    pub sequence_order: Option<i32>,
    pub module_created: bool,
    pub progress_carried: bool,
    pub skip_reason: Option<String>,
    pub error: Option<String>,
}

fn skip_reason(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::AlreadyActive => "already_active",
        SkipReason::DuplicateInTarget => "duplicate_in_target",
    }
}

impl From<EntryOutcome> for EntryOutcomeView {
    fn from(o: EntryOutcome) -> Self {
        let base = Self {
            index: count(o.index),
            title: o.title,
            status: String::new(),
            module_id: None,
            sequence_order: None,
            module_created: false,
            progress_carried: false,
            skip_reason: None,
            error: None,
        };

        match o.status {
            EntryStatus::Added {
                module_id,
                sequence_order,
                module_created,
                progress_carried,
                ..
            } => Self {
                status: "added".into(),
                module_id: Some(module_id),
                sequence_order: Some(narrow(sequence_order)),
                module_created,
                progress_carried,
                ..base
            },
            EntryStatus::Skipped { reason, module_id } => Self {
                status: "skipped".into(),
                module_id,
                skip_reason: Some(skip_reason(reason).into()),
                ..base
            },
            EntryStatus::Failed { error } => Self {
                status: "failed".into(),
                error: Some(error),
                ..base
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ReconciliationView {
    pub path_id: String,
    pub intent: String,
    pub path_created: bool,
    pub archived: u32,
    pub added: u32,
    pub carried: u32,
    pub skipped: u32,
    pub failed: u32,
    pub active_total: u32,
    pub outcomes: Vec<EntryOutcomeView>,
}

impl From<ReconciliationResult> for ReconciliationView {
    fn from(r: ReconciliationResult) -> Self {
        Self {
            path_id: r.path_id,
            intent: r.intent.to_string(),
            path_created: r.path_created,
            archived: count(r.archived),
            added: count(r.added),
            carried: count(r.carried),
            skipped: count(r.skipped),
            failed: count(r.failed),
            active_total: count(r.active_total),
            outcomes: r.outcomes.into_iter().map(EntryOutcomeView::from).collect(),
        }
    }
}

// ============================================================================
// Backup Views
// ============================================================================

/// Backup listing entry; the payload stays server-side
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct BackupView {
    pub backup_id: String,
    pub created_at: String,
}

impl From<BackupRow> for BackupView {
    fn from(b: BackupRow) -> Self {
        Self {
            backup_id: b.backup_id,
            created_at: b.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct SnapshotView {
    pub backup_id: Option<String>,
    pub modules: u32,
    pub unavailable_reason: Option<String>,
}

impl From<SnapshotOutcome> for SnapshotView {
    fn from(s: SnapshotOutcome) -> Self {
        match s {
            SnapshotOutcome::Created { backup_id, modules } => Self {
                backup_id: Some(backup_id),
                modules: count(modules),
                unavailable_reason: None,
            },
            SnapshotOutcome::Unavailable { reason } => Self {
                backup_id: None,
                modules: 0,
                unavailable_reason: Some(reason),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct RestoreView {
    pub restored: bool,
    pub backup_id: Option<String>,
    pub result: Option<ReconciliationView>,
    /// Set when not restored; the client should regenerate
    pub reason: Option<String>,
}

impl From<RestoreOutcome> for RestoreView {
    fn from(r: RestoreOutcome) -> Self {
        match r {
            RestoreOutcome::Restored { backup_id, result } => Self {
                restored: true,
                backup_id: Some(backup_id),
                result: Some(result.into()),
                reason: None,
            },
            RestoreOutcome::NotRestored { reason } => Self {
                restored: false,
                backup_id: None,
                result: None,
                reason: Some(reason),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct GuardedReconciliationView {
    pub result: Option<ReconciliationView>,
    pub error: Option<String>,
    pub backup: Option<SnapshotView>,
    pub recovery: Option<RestoreView>,
    pub needs_regeneration: bool,
}

impl From<GuardedOutcome> for GuardedReconciliationView {
    fn from(g: GuardedOutcome) -> Self {
        let needs_regeneration = g.needs_regeneration();
        let (result, error) = match g.result {
            Ok(result) => (Some(result.into()), None),
            Err(e) => (None, Some(e.to_string())),
        };

        Self {
            result,
            error,
            backup: g.backup.map(SnapshotView::from),
            recovery: g.recovery.map(RestoreView::from),
            needs_regeneration,
        }
    }
}
