//! Backup/restore guard around reconciliation
//!
//! Snapshots are advisory. Failing to take one never blocks the operation it
//! protects. A restore replays the snapshot as a full replacement with exact
//! module references, so recorded completion comes back even though the failed
//! call already archived those rows.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::curriculum::{self, ActiveCurriculum};
use crate::db::{backups, current_timestamp};
use crate::difficulty::Difficulty;
use crate::draft::{CurriculumDraft, ModuleDraft};
use crate::error::CurriculumError;
use crate::progress::CarryBaseline;
use crate::reconcile::{self, Intent, ReconciliationResult};

/// Payload format written to `roadmap_backups`
pub const SNAPSHOT_VERSION: u32 = 1;

/// Full active curriculum at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub user_id: String,
    pub captured_at: String,
    pub curriculum: ActiveCurriculum,
}

impl Snapshot {
    /// Capture the user's active curriculum, `None` without an active path
    pub fn capture(conn: &Connection, user_id: &str) -> Result<Option<Self>, CurriculumError> {
        Ok(curriculum::load_active(conn, user_id)?.map(|curriculum| Self {
            version: SNAPSHOT_VERSION,
            user_id: user_id.to_string(),
            captured_at: current_timestamp(),
            curriculum,
        }))
    }

    pub fn from_payload(payload: &str) -> Result<Self, CurriculumError> {
        let snapshot: Snapshot = serde_json::from_str(payload)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CurriculumError::InvalidInput(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }

    /// Replacement target with exact references, plus the progress to carry
    pub fn restore_target(&self) -> (CurriculumDraft, CarryBaseline) {
        let path = &self.curriculum.path;
        let mut baseline = CarryBaseline::new();

        let modules = self
            .curriculum
            .modules
            .iter()
            .map(|m| {
                baseline.insert(m.module.module_id.clone(), m.assignment.progress());

                let mut draft = ModuleDraft::referencing(&m.module.module_id, m.module.name.clone())
                    .with_hours(m.module.estimated_hours);
                draft.description = m.module.description.clone();
                draft.difficulty = Difficulty::from_label(&m.module.difficulty);
                draft
            })
            .collect();

        let target = CurriculumDraft {
            title: Some(path.name.clone()),
            description: path.description.clone(),
            modules,
        };
        (target, baseline)
    }
}

/// Result of trying to take a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SnapshotOutcome {
    Created { backup_id: String, modules: usize },
    Unavailable { reason: String },
}

impl SnapshotOutcome {
    pub fn backup_id(&self) -> Option<&str> {
        match self {
            SnapshotOutcome::Created { backup_id, .. } => Some(backup_id),
            SnapshotOutcome::Unavailable { .. } => None,
        }
    }
}

/// Result of trying to restore a snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RestoreOutcome {
    Restored { backup_id: String, result: ReconciliationResult },
    /// The caller should regenerate the curriculum
    NotRestored { reason: String },
}

impl RestoreOutcome {
    pub fn is_restored(&self) -> bool {
        matches!(self, RestoreOutcome::Restored { .. })
    }
}

/// Snapshot the user's active curriculum.
///
/// `retention` is the number of backups kept per user afterwards, 0 keeps all.
pub fn snapshot(conn: &Connection, user_id: &str, retention: u32) -> SnapshotOutcome {
    match try_snapshot(conn, user_id) {
        Ok(Some((backup_id, modules))) => {
            if retention > 0 {
                if let Err(e) = backups::prune_backups(conn, user_id, retention) {
                    warn!(user_id = %user_id, error = %e, "Backup pruning failed");
                }
            }
            info!(user_id = %user_id, backup_id = %backup_id, modules, "Roadmap backup created");
            SnapshotOutcome::Created { backup_id, modules }
        }
        Ok(None) => SnapshotOutcome::Unavailable {
            reason: format!("no active learning path for user {}", user_id),
        },
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Roadmap backup unavailable");
            SnapshotOutcome::Unavailable { reason: e.to_string() }
        }
    }
}

fn try_snapshot(conn: &Connection, user_id: &str) -> Result<Option<(String, usize)>, CurriculumError> {
    let snapshot = match Snapshot::capture(conn, user_id)? {
        Some(snapshot) => snapshot,
        None => return Ok(None),
    };
    let payload = serde_json::to_string(&snapshot)?;
    let backup_id = backups::insert_backup(conn, user_id, &payload)?;
    Ok(Some((backup_id, snapshot.curriculum.modules.len())))
}

/// Replay a backup through a full replacement
pub fn restore(conn: &mut Connection, user_id: &str, backup_id: &str) -> RestoreOutcome {
    match try_restore(conn, user_id, backup_id) {
        Ok(result) if result.is_total_failure() => {
            warn!(user_id = %user_id, backup_id = %backup_id, failed = result.failed, "Restore applied nothing");
            RestoreOutcome::NotRestored {
                reason: format!("every entry of backup {} failed to apply", backup_id),
            }
        }
        Ok(result) => {
            info!(
                user_id = %user_id,
                backup_id = %backup_id,
                restored = result.added,
                carried = result.carried,
                "Roadmap restored from backup"
            );
            RestoreOutcome::Restored {
                backup_id: backup_id.to_string(),
                result,
            }
        }
        Err(e) => {
            warn!(user_id = %user_id, backup_id = %backup_id, error = %e, "Restore failed");
            RestoreOutcome::NotRestored { reason: e.to_string() }
        }
    }
}

fn try_restore(
    conn: &mut Connection,
    user_id: &str,
    backup_id: &str,
) -> Result<ReconciliationResult, CurriculumError> {
    let row = backups::get_backup(conn, user_id, backup_id)?
        .ok_or_else(|| CurriculumError::NotFound(format!("backup {}", backup_id)))?;
    let snapshot = Snapshot::from_payload(&row.payload)?;
    let (target, baseline) = snapshot.restore_target();

    reconcile::reconcile(conn, user_id, &target, Intent::FullReplace, Some(&baseline))
}

/// Options for a guarded reconciliation
#[derive(Debug, Clone, Copy)]
pub struct GuardOptions {
    pub backups_enabled: bool,
    pub retention: u32,
}

/// Everything a guarded reconciliation did
#[derive(Debug)]
pub struct GuardedOutcome {
    pub result: Result<ReconciliationResult, CurriculumError>,
    pub backup: Option<SnapshotOutcome>,
    /// Set only when the reconciliation failed and recovery was attempted
    pub recovery: Option<RestoreOutcome>,
}

impl GuardedOutcome {
    pub fn needs_regeneration(&self) -> bool {
        matches!(self.recovery, Some(RestoreOutcome::NotRestored { .. }))
    }
}

/// Whether a reconciliation outcome calls for a restore.
///
/// Lookup and input errors fail before anything is written.
fn needs_recovery(result: &Result<ReconciliationResult, CurriculumError>) -> bool {
    match result {
        Ok(result) => result.is_total_failure(),
        Err(CurriculumError::NotFound(_) | CurriculumError::InvalidInput(_)) => false,
        Err(_) => true,
    }
}

/// Snapshot, reconcile, and restore when the reconciliation failed
pub fn guarded_reconcile(
    conn: &mut Connection,
    user_id: &str,
    target: &CurriculumDraft,
    intent: Intent,
    options: GuardOptions,
) -> GuardedOutcome {
    let backup = options
        .backups_enabled
        .then(|| snapshot(conn, user_id, options.retention));

    let result = reconcile::reconcile(conn, user_id, target, intent, None);

    let recovery = if needs_recovery(&result) {
        match backup.as_ref().and_then(SnapshotOutcome::backup_id) {
            Some(backup_id) => Some(restore(conn, user_id, backup_id)),
            None => {
                warn!(user_id = %user_id, "Reconciliation failed with no backup to restore");
                Some(RestoreOutcome::NotRestored {
                    reason: "no backup was taken before the failed reconciliation".to_string(),
                })
            }
        }
    } else {
        None
    };

    GuardedOutcome {
        result,
        backup,
        recovery,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{assignments, schema};
    use crate::reconcile::EntryStatus;

    const OPTIONS: GuardOptions = GuardOptions {
        backups_enabled: true,
        retention: 5,
    };

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        conn
    }

    /// Seed A, B, C with A completed; returns (path_id, module id of A)
    fn seed(conn: &mut Connection) -> (String, String) {
        let target = CurriculumDraft::new(vec![
            ModuleDraft::named("A").with_hours(2.0),
            ModuleDraft::named("B"),
            ModuleDraft::named("C"),
        ])
        .with_title("Systems");
        let result = reconcile::reconcile(conn, "u1", &target, Intent::FullReplace, None).unwrap();
        let a = match &result.outcomes[0].status {
            EntryStatus::Added { module_id, .. } => module_id.clone(),
            other => panic!("unexpected {:?}", other),
        };
        assignments::update_progress(conn, &result.path_id, &a, 100, true, Some("2024-06-01T00:00:00.000Z"))
            .unwrap();
        (result.path_id, a)
    }

    fn poison(conn: &Connection) {
        conn.execute_batch(
            "CREATE TRIGGER reject_poison BEFORE INSERT ON modules \
             WHEN NEW.normalized_name LIKE 'poison%' \
             BEGIN SELECT RAISE(ABORT, 'poisoned module'); END;",
        )
        .unwrap();
    }

    #[test]
    fn test_snapshot_without_path_is_unavailable() {
        let conn = conn();
        assert!(matches!(snapshot(&conn, "nobody", 5), SnapshotOutcome::Unavailable { .. }));
    }

    #[test]
    fn test_snapshot_round_trip_restores_progress() {
        let mut conn = conn();
        let (path_id, a) = seed(&mut conn);

        let backup_id = match snapshot(&conn, "u1", 5) {
            SnapshotOutcome::Created { backup_id, modules } => {
                assert_eq!(modules, 3);
                backup_id
            }
            other => panic!("unexpected {:?}", other),
        };

        // A regeneration that drops everything
        let replacement = CurriculumDraft::new(vec![ModuleDraft::named("Z")]);
        reconcile::reconcile(&mut conn, "u1", &replacement, Intent::FullReplace, None).unwrap();
        assert!(assignments::get_active(&conn, &path_id, &a).unwrap().is_none());

        let outcome = restore(&mut conn, "u1", &backup_id);
        assert!(outcome.is_restored());

        let curriculum = curriculum::load_active(&conn, "u1").unwrap().unwrap();
        let names: Vec<&str> = curriculum.modules.iter().map(|m| m.module.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        let restored_a = curriculum.module(&a).unwrap();
        assert!(restored_a.is_completed());
        assert_eq!(
            restored_a.assignment.completion_date.as_deref(),
            Some("2024-06-01T00:00:00.000Z")
        );
        assert_eq!(curriculum.path.name, "Systems");
    }

    #[test]
    fn test_restore_unknown_or_foreign_backup() {
        let mut conn = conn();
        seed(&mut conn);
        let backup_id = snapshot(&conn, "u1", 5).backup_id().unwrap().to_string();

        assert!(!restore(&mut conn, "u1", "missing").is_restored());
        assert!(!restore(&mut conn, "u2", &backup_id).is_restored());
    }

    #[test]
    fn test_restore_rejects_corrupt_payload() {
        let mut conn = conn();
        let backup_id = backups::insert_backup(&conn, "u1", "{not json").unwrap();
        match restore(&mut conn, "u1", &backup_id) {
            RestoreOutcome::NotRestored { reason } => assert!(reason.contains("JSON")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_retention_prunes_old_backups() {
        let mut conn = conn();
        seed(&mut conn);
        for _ in 0..4 {
            snapshot(&conn, "u1", 2);
        }
        assert_eq!(backups::list_backups(&conn, "u1").unwrap().len(), 2);

        for _ in 0..3 {
            snapshot(&conn, "u1", 0);
        }
        assert_eq!(backups::list_backups(&conn, "u1").unwrap().len(), 5);
    }

    #[test]
    fn test_guarded_success_does_not_restore() {
        let mut conn = conn();
        seed(&mut conn);
        let target = CurriculumDraft::new(vec![ModuleDraft::named("D")]);

        let outcome = guarded_reconcile(&mut conn, "u1", &target, Intent::IncrementalAdd, OPTIONS);
        assert_eq!(outcome.result.as_ref().unwrap().added, 1);
        assert!(outcome.backup.as_ref().unwrap().backup_id().is_some());
        assert!(outcome.recovery.is_none());
    }

    #[test]
    fn test_guarded_total_failure_restores() {
        let mut conn = conn();
        let (path_id, a) = seed(&mut conn);
        poison(&conn);

        let target = CurriculumDraft::new(vec![
            ModuleDraft::named("Poison one"),
            ModuleDraft::named("Poison two"),
        ]);
        let outcome = guarded_reconcile(&mut conn, "u1", &target, Intent::FullReplace, OPTIONS);

        assert!(outcome.result.as_ref().unwrap().is_total_failure());
        assert!(outcome.recovery.as_ref().unwrap().is_restored());
        assert!(!outcome.needs_regeneration());

        let a_row = assignments::get_active(&conn, &path_id, &a).unwrap().unwrap();
        assert!(a_row.is_completed);
        assert_eq!(assignments::list_active(&conn, &path_id).unwrap().len(), 3);
    }

    #[test]
    fn test_guarded_failure_without_backup_asks_for_regeneration() {
        let mut conn = conn();
        seed(&mut conn);
        poison(&conn);

        let target = CurriculumDraft::new(vec![ModuleDraft::named("Poison")]);
        let options = GuardOptions {
            backups_enabled: false,
            ..OPTIONS
        };
        let outcome = guarded_reconcile(&mut conn, "u1", &target, Intent::FullReplace, options);

        assert!(outcome.backup.is_none());
        assert!(outcome.needs_regeneration());
    }

    #[test]
    fn test_guarded_not_found_skips_recovery() {
        let mut conn = conn();
        let target = CurriculumDraft::new(vec![ModuleDraft::named("D")]);
        let outcome = guarded_reconcile(&mut conn, "u1", &target, Intent::IncrementalAdd, OPTIONS);

        assert!(matches!(outcome.result, Err(CurriculumError::NotFound(_))));
        assert!(outcome.recovery.is_none());
    }
}
