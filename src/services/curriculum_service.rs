//! Curriculum service - reconciliation, backups, progress and stats
//!
//! Wraps the reconciler, guard and repositories with input validation and
//! event emission. Every call runs under the database lock, so calls for the
//! same database are serialized within one process.

use std::sync::Arc;

use chrono::Utc;

use crate::config::Config;
use crate::curriculum::{self, ActiveCurriculum};
use crate::db::{assignments, backups, current_timestamp, paths, AssignmentRow, BackupRow, CurriculumDb};
use crate::draft::CurriculumDraft;
use crate::error::CurriculumError;
use crate::guard::{self, GuardOptions, GuardedOutcome, RestoreOutcome, SnapshotOutcome};
use crate::progress;
use crate::reconcile::{self, EntryStatus, Intent, ReconciliationResult};
use crate::stats::{self, CurriculumStats};

use super::events::{CurriculumEvent, EventBus};

/// Curriculum service for business logic
pub struct CurriculumService {
    db: Arc<CurriculumDb>,
    events: Arc<EventBus>,
    weekly_hours: f64,
    guard: GuardOptions,
}

impl CurriculumService {
    /// Create a new curriculum service
    pub fn new(db: Arc<CurriculumDb>, events: Arc<EventBus>, config: &Config) -> Self {
        Self {
            db,
            events,
            weekly_hours: config.weekly_hours,
            guard: GuardOptions {
                backups_enabled: config.backups_enabled,
                retention: config.backup_retention,
            },
        }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Active path with modules, progress and linked content
    pub fn active_curriculum(&self, user_id: &str) -> Result<Option<ActiveCurriculum>, CurriculumError> {
        validate_user(user_id)?;
        self.db.with_conn(|conn| curriculum::load_active(conn, user_id))
    }

    /// Progress rollup; a user without a path gets the "no roadmap" result
    pub fn get_stats(&self, user_id: &str) -> Result<CurriculumStats, CurriculumError> {
        validate_user(user_id)?;
        self.db.with_conn(|conn| {
            let path = paths::get_active_path(conn, user_id)?;
            let active = match &path {
                Some(path) => assignments::list_active_with_modules(conn, &path.path_id)?,
                None => vec![],
            };
            Ok(stats::aggregate(path.as_ref(), &active, self.weekly_hours, Utc::now()))
        })
    }

    /// Backups of a user, newest first
    pub fn list_backups(&self, user_id: &str) -> Result<Vec<BackupRow>, CurriculumError> {
        validate_user(user_id)?;
        self.db.with_conn(|conn| backups::list_backups(conn, user_id))
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Reconcile a target curriculum without a safety net
    pub fn reconcile(
        &self,
        user_id: &str,
        target: &CurriculumDraft,
        intent: Intent,
    ) -> Result<ReconciliationResult, CurriculumError> {
        validate_user(user_id)?;

        let result = self
            .db
            .with_conn_mut(|conn| reconcile::reconcile(conn, user_id, target, intent, None))?;

        self.emit_reconciled(&result);
        Ok(result)
    }

    /// Snapshot, reconcile and restore on failure
    pub fn guarded_reconcile(
        &self,
        user_id: &str,
        target: &CurriculumDraft,
        intent: Intent,
    ) -> Result<GuardedOutcome, CurriculumError> {
        validate_user(user_id)?;

        let outcome = self.db.with_conn_mut(|conn| {
            Ok(guard::guarded_reconcile(conn, user_id, target, intent, self.guard))
        })?;

        if let Some(backup) = &outcome.backup {
            self.emit_snapshot(user_id, backup);
        }
        if let Ok(result) = &outcome.result {
            self.emit_reconciled(result);
        }
        if let Some(recovery) = &outcome.recovery {
            self.emit_restore(user_id, recovery);
        }

        Ok(outcome)
    }

    // =========================================================================
    // Backups
    // =========================================================================

    /// Take a snapshot now; never fails the caller
    pub fn snapshot(&self, user_id: &str) -> SnapshotOutcome {
        let outcome = validate_user(user_id)
            .and_then(|_| {
                self.db
                    .with_conn(|conn| Ok(guard::snapshot(conn, user_id, self.guard.retention)))
            })
            .unwrap_or_else(|e| SnapshotOutcome::Unavailable { reason: e.to_string() });

        self.emit_snapshot(user_id, &outcome);
        outcome
    }

    /// Restore a snapshot through a full replacement
    pub fn restore(&self, user_id: &str, backup_id: &str) -> RestoreOutcome {
        let outcome = validate_user(user_id)
            .and_then(|_| {
                self.db
                    .with_conn_mut(|conn| Ok(guard::restore(conn, user_id, backup_id)))
            })
            .unwrap_or_else(|e| RestoreOutcome::NotRestored { reason: e.to_string() });

        self.emit_restore(user_id, &outcome);
        outcome
    }

    // =========================================================================
    // Progress
    // =========================================================================

    /// Record a completion percentage for an active module
    pub fn record_progress(
        &self,
        user_id: &str,
        module_id: &str,
        percentage: i64,
    ) -> Result<AssignmentRow, CurriculumError> {
        validate_user(user_id)?;

        let row = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let path = paths::get_active_path(&tx, user_id)?.ok_or_else(|| {
                CurriculumError::NotFound(format!("no active learning path for user {}", user_id))
            })?;
            let current = assignments::get_active(&tx, &path.path_id, module_id)?.ok_or_else(|| {
                CurriculumError::NotFound(format!("module {} is not in the active path", module_id))
            })?;

            let next = progress::apply_percentage(&current.progress(), percentage, &current_timestamp());
            assignments::update_progress(
                &tx,
                &path.path_id,
                module_id,
                next.progress_percentage,
                next.is_completed,
                next.completion_date.as_deref(),
            )?;

            let row = assignments::get_active(&tx, &path.path_id, module_id)?
                .ok_or_else(|| CurriculumError::Internal("Assignment not found after update".to_string()))?;
            tx.commit()?;
            Ok(row)
        })?;

        self.events.emit(CurriculumEvent::ProgressRecorded {
            user_id: user_id.to_string(),
            module_id: module_id.to_string(),
            progress_percentage: row.progress_percentage,
            is_completed: row.is_completed,
        });

        Ok(row)
    }

    // =========================================================================
    // Events
    // =========================================================================

    fn emit_reconciled(&self, result: &ReconciliationResult) {
        if result.path_created {
            self.events.emit(CurriculumEvent::PathCreated {
                user_id: result.user_id.clone(),
                path_id: result.path_id.clone(),
            });
        }

        let (modules, content) = result
            .outcomes
            .iter()
            .fold((0, 0), |(modules, content), outcome| match &outcome.status {
                EntryStatus::Added { module_created, links, .. } => {
                    (modules + *module_created as usize, content + links.created)
                }
                _ => (modules, content),
            });
        if modules + content > 0 {
            self.events.emit(CurriculumEvent::CatalogEntriesCreated { modules, content });
        }

        self.events.emit(CurriculumEvent::PathReconciled {
            user_id: result.user_id.clone(),
            path_id: result.path_id.clone(),
            intent: result.intent.to_string(),
            added: result.added,
            carried: result.carried,
            skipped: result.skipped,
            failed: result.failed,
        });
    }

    fn emit_snapshot(&self, user_id: &str, outcome: &SnapshotOutcome) {
        let event = match outcome {
            SnapshotOutcome::Created { backup_id, .. } => CurriculumEvent::BackupCreated {
                user_id: user_id.to_string(),
                backup_id: backup_id.clone(),
            },
            SnapshotOutcome::Unavailable { reason } => CurriculumEvent::BackupUnavailable {
                user_id: user_id.to_string(),
                reason: reason.clone(),
            },
        };
        self.events.emit(event);
    }

    fn emit_restore(&self, user_id: &str, outcome: &RestoreOutcome) {
        let event = match outcome {
            RestoreOutcome::Restored { backup_id, .. } => CurriculumEvent::BackupRestored {
                user_id: user_id.to_string(),
                backup_id: backup_id.clone(),
            },
            RestoreOutcome::NotRestored { reason } => CurriculumEvent::RestoreFailed {
                user_id: user_id.to_string(),
                reason: reason.clone(),
            },
        };
        self.events.emit(event);
    }
}

fn validate_user(user_id: &str) -> Result<(), CurriculumError> {
    if user_id.trim().is_empty() {
        return Err(CurriculumError::InvalidInput("user_id is required".into()));
    }
    Ok(())
}
