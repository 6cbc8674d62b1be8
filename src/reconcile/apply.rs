//! Applying a reconciliation plan to the store

use std::collections::HashSet;

use rusqlite::Connection;
use tracing::{debug, info, warn};

use super::plan::{self, ActiveEntry, PlannedStep};
use super::{
    EntryOutcome, EntryStatus, Intent, ReconciliationResult, SkipReason, DEFAULT_PATH_NAME,
};
use crate::db::assignments::{self, AssignmentProgress};
use crate::db::paths;
use crate::draft::{CurriculumDraft, ModuleDraft};
use crate::error::CurriculumError;
use crate::progress::CarryBaseline;
use crate::resolver::{self, LinkSummary};

/// Work for one placed entry
enum EntryAction<'a> {
    Carry {
        module_id: &'a str,
        progress: &'a AssignmentProgress,
    },
    /// `position` numbers a placeholder title when the draft has none
    Create { position: usize },
}

/// What happened to an entry that reached the store
enum EntryApplied {
    Placed {
        module_id: String,
        module_created: bool,
        progress_carried: bool,
        links: LinkSummary,
    },
    /// Resolved to a module that is already placed; nothing was written
    Duplicate { module_id: String },
}

/// Reconcile `target` into the user's active path.
///
/// `extra_baseline` adds progress that may be carried besides the currently
/// active set; restores pass the snapshot's progress here.
pub fn reconcile(
    conn: &mut Connection,
    user_id: &str,
    target: &CurriculumDraft,
    intent: Intent,
    extra_baseline: Option<&CarryBaseline>,
) -> Result<ReconciliationResult, CurriculumError> {
    let (path, path_created) = match paths::ensure_single_active(conn, user_id)? {
        Some(path) => (path, false),
        None if intent == Intent::IncrementalAdd => {
            return Err(CurriculumError::NotFound(format!(
                "no active learning path for user {}",
                user_id
            )));
        }
        None => {
            let name = target.title.as_deref().unwrap_or(DEFAULT_PATH_NAME);
            let path = paths::create_path(conn, user_id, name, target.description.as_deref())?;
            info!(user_id = %user_id, path_id = %path.path_id, "Created learning path for first generation");
            (path, true)
        }
    };
    let path_id = path.path_id.as_str();

    let current: Vec<ActiveEntry> = assignments::list_active_with_modules(conn, path_id)?
        .iter()
        .map(ActiveEntry::from)
        .collect();

    let mut baseline = CarryBaseline::from_entries(
        current.iter().map(|e| (e.module_id.clone(), e.progress.clone())),
    );
    if let Some(extra) = extra_baseline {
        baseline = baseline.overlay(extra);
    }

    let plan = plan::plan(&current, target, intent, &baseline);
    info!(
        user_id = %user_id,
        path_id = %path_id,
        intent = %intent,
        active = current.len(),
        target = target.modules.len(),
        "Reconciling curriculum"
    );

    let archived = if plan.archive.is_empty() {
        0
    } else {
        assignments::archive_active(conn, path_id)?
    };

    let active_before: HashSet<String> = current.iter().map(|e| e.module_id.clone()).collect();
    let mut placed: HashSet<String> = match intent {
        Intent::IncrementalAdd => active_before.clone(),
        Intent::FullReplace => HashSet::new(),
    };
    let mut next_sequence = plan.first_sequence;
    let mut outcomes = Vec::with_capacity(plan.steps.len());

    for step in &plan.steps {
        let index = step.index();
        let draft = &target.modules[index];

        let action = match step {
            PlannedStep::Skip { reason, .. } => {
                debug!(index, title = %draft.title, reason = ?reason, "Skipping entry");
                outcomes.push(EntryOutcome {
                    index,
                    title: draft.title.clone(),
                    status: EntryStatus::Skipped { reason: *reason, module_id: None },
                });
                continue;
            }
            PlannedStep::Carry { module_id, progress, .. } => EntryAction::Carry { module_id, progress },
            PlannedStep::Create { .. } => EntryAction::Create { position: index + 1 },
        };

        let status = match apply_entry_atomically(
            conn, user_id, path_id, draft, action, next_sequence, &placed,
        ) {
            Ok(EntryApplied::Placed { module_id, module_created, progress_carried, links }) => {
                debug!(
                    index,
                    module_id = %module_id,
                    sequence_order = next_sequence,
                    progress_carried,
                    "Placed module"
                );
                let status = EntryStatus::Added {
                    module_id: module_id.clone(),
                    sequence_order: next_sequence,
                    module_created,
                    progress_carried,
                    links,
                };
                placed.insert(module_id);
                next_sequence += 1;
                status
            }
            Ok(EntryApplied::Duplicate { module_id }) => {
                let reason = if intent == Intent::IncrementalAdd && active_before.contains(&module_id) {
                    SkipReason::AlreadyActive
                } else {
                    SkipReason::DuplicateInTarget
                };
                debug!(index, module_id = %module_id, reason = ?reason, "Entry resolved to a placed module");
                EntryStatus::Skipped { reason, module_id: Some(module_id) }
            }
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    index,
                    title = %draft.title,
                    error = %e,
                    "Curriculum entry failed, continuing with the rest"
                );
                EntryStatus::Failed { error: e.to_string() }
            }
        };

        outcomes.push(EntryOutcome {
            index,
            title: draft.title.clone(),
            status,
        });
    }

    paths::update_path_metadata(conn, path_id, target.title.as_deref(), target.description.as_deref())?;

    assignments::compact_sequence(conn, path_id)?;
    let active_total = assignments::list_active(conn, path_id)?.len();

    let mut result = ReconciliationResult {
        user_id: user_id.to_string(),
        path_id: path_id.to_string(),
        intent,
        path_created,
        archived,
        added: 0,
        carried: 0,
        skipped: 0,
        failed: 0,
        active_total,
        outcomes,
    };
    for outcome in &result.outcomes {
        match &outcome.status {
            EntryStatus::Added { progress_carried, .. } => {
                result.added += 1;
                result.carried += *progress_carried as usize;
            }
            EntryStatus::Skipped { .. } => result.skipped += 1,
            EntryStatus::Failed { .. } => result.failed += 1,
        }
    }

    info!(
        user_id = %user_id,
        path_id = %path_id,
        archived = result.archived,
        added = result.added,
        carried = result.carried,
        skipped = result.skipped,
        failed = result.failed,
        active_total = result.active_total,
        "Reconciliation finished"
    );

    Ok(result)
}

/// Run one entry in its own transaction; errors and duplicates roll back
fn apply_entry_atomically(
    conn: &mut Connection,
    user_id: &str,
    path_id: &str,
    draft: &ModuleDraft,
    action: EntryAction<'_>,
    sequence_order: i64,
    placed: &HashSet<String>,
) -> Result<EntryApplied, CurriculumError> {
    let tx = conn.transaction()?;
    let applied = apply_entry(&tx, user_id, path_id, draft, action, sequence_order, placed)?;

    if matches!(applied, EntryApplied::Placed { .. }) {
        tx.commit()?;
    }
    Ok(applied)
}

fn apply_entry(
    conn: &Connection,
    user_id: &str,
    path_id: &str,
    draft: &ModuleDraft,
    action: EntryAction<'_>,
    sequence_order: i64,
    placed: &HashSet<String>,
) -> Result<EntryApplied, CurriculumError> {
    match action {
        EntryAction::Carry { module_id, progress } => {
            if placed.contains(module_id) {
                return Ok(EntryApplied::Duplicate { module_id: module_id.to_string() });
            }
            assignments::upsert_assignment(conn, user_id, path_id, module_id, sequence_order, progress)?;

            Ok(EntryApplied::Placed {
                module_id: module_id.to_string(),
                module_created: false,
                progress_carried: true,
                links: LinkSummary::default(),
            })
        }
        EntryAction::Create { position } => {
            let by_reference = match draft.reference.existing_id() {
                Some(id) => resolver::resolve_module_by_id(conn, id)?,
                None => None,
            };
            let resolution = match by_reference {
                Some(resolution) => resolution,
                None => resolver::resolve_module(conn, draft, position)?,
            };

            if placed.contains(&resolution.id) {
                return Ok(EntryApplied::Duplicate { module_id: resolution.id });
            }

            // Shared modules keep their existing links; only new rows take the draft's content
            let links = if resolution.created {
                resolver::link_content(conn, &resolution.id, draft)?
            } else {
                LinkSummary::default()
            };

            assignments::upsert_assignment(
                conn,
                user_id,
                path_id,
                &resolution.id,
                sequence_order,
                &AssignmentProgress::fresh(),
            )?;

            Ok(EntryApplied::Placed {
                module_id: resolution.id,
                module_created: resolution.created,
                progress_carried: false,
                links,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{catalog, schema};
    use crate::draft::{ResourceDraft, TaskDraft};

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        conn
    }

    fn names(conn: &Connection, path_id: &str) -> Vec<(String, i64)> {
        assignments::list_active_with_modules(conn, path_id)
            .unwrap()
            .into_iter()
            .map(|a| (a.module.name, a.assignment.sequence_order))
            .collect()
    }

    fn seed_abc(conn: &mut Connection) -> ReconciliationResult {
        let target = CurriculumDraft::new(vec![
            ModuleDraft::named("A"),
            ModuleDraft::named("B"),
            ModuleDraft::named("C"),
        ])
        .with_title("Rust");
        reconcile(conn, "u1", &target, Intent::FullReplace, None).unwrap()
    }

    fn module_id(result: &ReconciliationResult, index: usize) -> String {
        match &result.outcomes[index].status {
            EntryStatus::Added { module_id, .. } => module_id.clone(),
            other => panic!("entry {} not added: {:?}", index, other),
        }
    }

    fn complete(conn: &Connection, path_id: &str, module_id: &str) {
        assignments::update_progress(conn, path_id, module_id, 100, true, Some("2024-02-02T00:00:00.000Z"))
            .unwrap();
    }

    #[test]
    fn test_first_generation_creates_path() {
        let mut conn = conn();
        let result = seed_abc(&mut conn);

        assert!(result.path_created);
        assert_eq!(result.added, 3);
        assert_eq!(result.active_total, 3);
        assert_eq!(
            names(&conn, &result.path_id),
            vec![("A".to_string(), 1), ("B".to_string(), 2), ("C".to_string(), 3)]
        );
        let path = paths::get_path(&conn, &result.path_id).unwrap().unwrap();
        assert_eq!(path.name, "Rust");
    }

    #[test]
    fn test_incremental_without_path_is_not_found() {
        let mut conn = conn();
        let target = CurriculumDraft::new(vec![ModuleDraft::named("D")]);
        let err = reconcile(&mut conn, "u1", &target, Intent::IncrementalAdd, None).unwrap_err();
        assert!(matches!(err, CurriculumError::NotFound(_)));
    }

    #[test]
    fn test_incremental_add_appends() {
        let mut conn = conn();
        let seed = seed_abc(&mut conn);
        let a = module_id(&seed, 0);
        complete(&conn, &seed.path_id, &a);

        let target = CurriculumDraft::new(vec![ModuleDraft::named("D")]);
        let result = reconcile(&mut conn, "u1", &target, Intent::IncrementalAdd, None).unwrap();

        assert_eq!(result.path_id, seed.path_id);
        assert_eq!(result.archived, 0);
        assert_eq!(result.added, 1);
        assert_eq!(
            names(&conn, &seed.path_id),
            vec![
                ("A".to_string(), 1),
                ("B".to_string(), 2),
                ("C".to_string(), 3),
                ("D".to_string(), 4)
            ]
        );
        let a_row = assignments::get_active(&conn, &seed.path_id, &a).unwrap().unwrap();
        assert!(a_row.is_completed);
    }

    #[test]
    fn test_incremental_add_twice_is_idempotent() {
        let mut conn = conn();
        seed_abc(&mut conn);
        let target = CurriculumDraft::new(vec![ModuleDraft::named("D"), ModuleDraft::named("E")]);

        let first = reconcile(&mut conn, "u1", &target, Intent::IncrementalAdd, None).unwrap();
        let second = reconcile(&mut conn, "u1", &target, Intent::IncrementalAdd, None).unwrap();

        assert_eq!(first.added, 2);
        assert_eq!(second.added, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(second.active_total, 5);
    }

    #[test]
    fn test_full_replace_scenario() {
        let mut conn = conn();
        let seed = seed_abc(&mut conn);
        let a = module_id(&seed, 0);
        complete(&conn, &seed.path_id, &a);

        let target = CurriculumDraft::new(vec![
            ModuleDraft::referencing(&a, "A"),
            ModuleDraft::named("New"),
        ]);
        let result = reconcile(&mut conn, "u1", &target, Intent::FullReplace, None).unwrap();

        assert_eq!(result.archived, 3);
        assert_eq!(result.added, 2);
        assert_eq!(result.carried, 1);
        assert_eq!(
            names(&conn, &seed.path_id),
            vec![("A".to_string(), 1), ("New".to_string(), 2)]
        );

        let a_row = assignments::get_active(&conn, &seed.path_id, &a).unwrap().unwrap();
        assert!(a_row.is_completed);
        assert_eq!(a_row.completion_date.as_deref(), Some("2024-02-02T00:00:00.000Z"));

        // B and C rows survive as archived history
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM module_assignments", [], |r| r.get(0))
            .unwrap();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_full_replace_by_name_does_not_carry() {
        let mut conn = conn();
        let seed = seed_abc(&mut conn);
        let a = module_id(&seed, 0);
        complete(&conn, &seed.path_id, &a);

        let target = CurriculumDraft::new(vec![ModuleDraft::named("a")]);
        let result = reconcile(&mut conn, "u1", &target, Intent::FullReplace, None).unwrap();

        // Name resolution finds the same catalog module, progress is reset
        assert_eq!(module_id(&result, 0), a);
        let a_row = assignments::get_active(&conn, &seed.path_id, &a).unwrap().unwrap();
        assert!(!a_row.is_completed);
        assert_eq!(a_row.completion_date, None);
    }

    #[test]
    fn test_full_replace_twice_is_idempotent() {
        let mut conn = conn();
        let target = CurriculumDraft::new(vec![ModuleDraft::named("X"), ModuleDraft::named("Y")]);
        reconcile(&mut conn, "u1", &target, Intent::FullReplace, None).unwrap();
        let second = reconcile(&mut conn, "u1", &target, Intent::FullReplace, None).unwrap();

        assert_eq!(second.active_total, 2);
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM module_assignments", [], |r| r.get(0))
            .unwrap();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_duplicate_names_in_replace_keep_dense_order() {
        let mut conn = conn();
        let target = CurriculumDraft::new(vec![
            ModuleDraft::named("X"),
            ModuleDraft::named("x "),
            ModuleDraft::named("Y"),
        ]);
        let result = reconcile(&mut conn, "u1", &target, Intent::FullReplace, None).unwrap();

        assert_eq!(result.skipped, 1);
        assert_eq!(
            names(&conn, &result.path_id),
            vec![("X".to_string(), 1), ("Y".to_string(), 2)]
        );
    }

    #[test]
    fn test_failed_entry_does_not_stop_batch() {
        let mut conn = conn();
        conn.execute_batch(
            "CREATE TRIGGER reject_poison BEFORE INSERT ON modules \
             WHEN NEW.normalized_name = 'poison' \
             BEGIN SELECT RAISE(ABORT, 'poisoned module'); END;",
        )
        .unwrap();

        let target = CurriculumDraft::new(vec![
            ModuleDraft::named("First"),
            ModuleDraft::named("Poison"),
            ModuleDraft::named("Last"),
        ]);
        let result = reconcile(&mut conn, "u1", &target, Intent::FullReplace, None).unwrap();

        assert_eq!(result.added, 2);
        assert_eq!(result.failed, 1);
        assert!(!result.is_total_failure());
        assert_eq!(result.failures().next().unwrap().index, 1);
        assert_eq!(
            names(&conn, &result.path_id),
            vec![("First".to_string(), 1), ("Last".to_string(), 2)]
        );
    }

    #[test]
    fn test_failed_links_roll_back_the_entry() {
        let mut conn = conn();
        conn.execute_batch(
            "CREATE TRIGGER reject_task BEFORE INSERT ON tasks \
             BEGIN SELECT RAISE(ABORT, 'tasks unavailable'); END;",
        )
        .unwrap();

        let mut draft = ModuleDraft::named("With tasks");
        draft.tasks = vec![TaskDraft {
            title: "Exercise".into(),
            description: None,
            task_type: "exercise".into(),
            estimated_minutes: 5,
            instructions: None,
        }];
        let target = CurriculumDraft::new(vec![draft, ModuleDraft::named("Plain")]);
        let result = reconcile(&mut conn, "u1", &target, Intent::FullReplace, None).unwrap();

        assert_eq!(result.failed, 1);
        assert!(catalog::find_module_by_name(&conn, "with tasks").unwrap().is_none());
        assert_eq!(names(&conn, &result.path_id), vec![("Plain".to_string(), 1)]);
    }

    #[test]
    fn test_new_modules_link_their_content() {
        let mut conn = conn();
        let mut draft = ModuleDraft::named("Iterators");
        draft.resources = vec![ResourceDraft {
            title: "Iterator docs".into(),
            resource_type: "documentation".into(),
            url: Some("https://doc.rust-lang.org/std/iter/".into()),
            estimated_minutes: 30,
        }];
        let target = CurriculumDraft::new(vec![draft]);
        let result = reconcile(&mut conn, "u1", &target, Intent::FullReplace, None).unwrap();

        match &result.outcomes[0].status {
            EntryStatus::Added { module_created, links, module_id, .. } => {
                assert!(*module_created);
                assert_eq!(links.resources, 1);
                assert_eq!(catalog::resources_for_module(&conn, module_id).unwrap().len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_extra_baseline_restores_progress() {
        let mut conn = conn();
        let seed = seed_abc(&mut conn);
        let a = module_id(&seed, 0);

        // Progress known only from elsewhere (e.g. a snapshot), A itself is incomplete
        let mut extra = CarryBaseline::new();
        extra.insert(a.clone(), AssignmentProgress {
            is_completed: true,
            completion_date: Some("2023-12-24T00:00:00.000Z".into()),
            progress_percentage: 100,
            started_at: None,
        });

        assignments::archive_active(&conn, &seed.path_id).unwrap();
        let target = CurriculumDraft::new(vec![ModuleDraft::referencing(&a, "A")]);
        let result = reconcile(&mut conn, "u1", &target, Intent::FullReplace, Some(&extra)).unwrap();

        assert_eq!(result.carried, 1);
        let a_row = assignments::get_active(&conn, &seed.path_id, &a).unwrap().unwrap();
        assert_eq!(a_row.completion_date.as_deref(), Some("2023-12-24T00:00:00.000Z"));
    }

    #[test]
    fn test_single_active_path_after_reconcile() {
        let mut conn = conn();
        seed_abc(&mut conn);
        conn.execute(
            "INSERT INTO learning_paths (path_id, user_id, name, status, created_at, updated_at) \
             VALUES ('stray', 'u1', 'Stray', 'active', '2000-01-01T00:00:00.000Z', '2000-01-01T00:00:00.000Z')",
            [],
        )
        .unwrap();

        let target = CurriculumDraft::new(vec![ModuleDraft::named("D")]);
        reconcile(&mut conn, "u1", &target, Intent::IncrementalAdd, None).unwrap();
        assert_eq!(paths::list_active_paths(&conn, "u1").unwrap().len(), 1);
    }
}
