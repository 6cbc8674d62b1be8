//! Module assignment operations
//!
//! An assignment joins (user, path, catalog module). The natural key is the
//! upsert target, so re-applying the same module to a path updates the row in
//! place instead of duplicating it. Superseded rows are archived, never deleted.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::catalog::ModuleRow;
use super::{current_timestamp, status};
use crate::error::CurriculumError;

/// Assignment row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRow {
    pub user_id: String,
    pub path_id: String,
    pub module_id: String,
    pub sequence_order: i64,
    pub is_completed: bool,
    pub completion_date: Option<String>,
    pub progress_percentage: i64,
    pub status: String,
    pub started_at: String,
}

impl AssignmentRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            user_id: row.get("user_id")?,
            path_id: row.get("path_id")?,
            module_id: row.get("module_id")?,
            sequence_order: row.get("sequence_order")?,
            is_completed: row.get::<_, i64>("is_completed")? != 0,
            completion_date: row.get("completion_date")?,
            progress_percentage: row.get("progress_percentage")?,
            status: row.get("status")?,
            started_at: row.get("started_at")?,
        })
    }

    pub fn progress(&self) -> AssignmentProgress {
        AssignmentProgress {
            is_completed: self.is_completed,
            completion_date: self.completion_date.clone(),
            progress_percentage: self.progress_percentage,
            started_at: Some(self.started_at.clone()),
        }
    }
}

/// Progress-bearing columns of an assignment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentProgress {
    pub is_completed: bool,
    pub completion_date: Option<String>,
    pub progress_percentage: i64,
    /// `None` starts the clock now
    pub started_at: Option<String>,
}

impl AssignmentProgress {
    /// Zeroed progress for a freshly placed module
    pub fn fresh() -> Self {
        Self::default()
    }
}

/// Active assignment together with its catalog module
#[derive(Debug, Clone, Serialize)]
pub struct ActiveAssignment {
    pub assignment: AssignmentRow,
    pub module: ModuleRow,
}

/// Active assignments of a path in sequence order
pub fn list_active(conn: &Connection, path_id: &str) -> Result<Vec<AssignmentRow>, CurriculumError> {
    let mut stmt = conn
        .prepare(
            "SELECT * FROM module_assignments WHERE path_id = ? AND status = ? \
             ORDER BY sequence_order, rowid",
        )
        .map_err(|e| CurriculumError::Internal(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![path_id, status::ACTIVE], AssignmentRow::from_row)
        .map_err(|e| CurriculumError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CurriculumError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}

/// Active assignments joined with their catalog modules
pub fn list_active_with_modules(
    conn: &Connection,
    path_id: &str,
) -> Result<Vec<ActiveAssignment>, CurriculumError> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT a.user_id, a.path_id, a.module_id, a.sequence_order, a.is_completed,
                   a.completion_date, a.progress_percentage, a.status, a.started_at,
                   m.name, m.normalized_name, m.description, m.difficulty, m.estimated_hours,
                   m.skills_json, m.prerequisites_json, m.usage_count, m.created_at
            FROM module_assignments a
            JOIN modules m ON m.module_id = a.module_id
            WHERE a.path_id = ? AND a.status = ?
            ORDER BY a.sequence_order, a.rowid
            "#,
        )
        .map_err(|e| CurriculumError::Internal(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![path_id, status::ACTIVE], |row| {
            Ok(ActiveAssignment {
                assignment: AssignmentRow::from_row(row)?,
                module: ModuleRow::from_row(row)?,
            })
        })
        .map_err(|e| CurriculumError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CurriculumError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}

/// Get one active assignment
pub fn get_active(
    conn: &Connection,
    path_id: &str,
    module_id: &str,
) -> Result<Option<AssignmentRow>, CurriculumError> {
    conn.query_row(
        "SELECT * FROM module_assignments WHERE path_id = ? AND module_id = ? AND status = ?",
        params![path_id, module_id, status::ACTIVE],
        AssignmentRow::from_row,
    )
    .optional()
    .map_err(|e| CurriculumError::Internal(format!("Query failed: {}", e)))
}

/// Archive every active assignment of a path, returning how many flipped
pub fn archive_active(conn: &Connection, path_id: &str) -> Result<usize, CurriculumError> {
    let changed = conn
        .execute(
            "UPDATE module_assignments SET status = ? WHERE path_id = ? AND status = ?",
            params![status::ARCHIVED, path_id, status::ACTIVE],
        )
        .map_err(|e| CurriculumError::Internal(format!("Archive assignments failed: {}", e)))?;

    debug!(path_id = %path_id, archived = changed, "Archived active assignments");
    Ok(changed)
}

/// Insert or reactivate the assignment for (user, path, module).
///
/// On conflict the row is reactivated at `sequence_order` and its progress is
/// overwritten by `progress`, so callers decide what survives.
pub fn upsert_assignment(
    conn: &Connection,
    user_id: &str,
    path_id: &str,
    module_id: &str,
    sequence_order: i64,
    progress: &AssignmentProgress,
) -> Result<(), CurriculumError> {
    let started_at = progress.started_at.clone().unwrap_or_else(current_timestamp);

    conn.execute(
        r#"
        INSERT INTO module_assignments (
            user_id, path_id, module_id, sequence_order, is_completed,
            completion_date, progress_percentage, status, started_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (user_id, path_id, module_id) DO UPDATE SET
            sequence_order = excluded.sequence_order,
            is_completed = excluded.is_completed,
            completion_date = excluded.completion_date,
            progress_percentage = excluded.progress_percentage,
            status = excluded.status,
            started_at = excluded.started_at
        "#,
        params![
            user_id,
            path_id,
            module_id,
            sequence_order,
            progress.is_completed as i64,
            progress.completion_date,
            progress.progress_percentage,
            status::ACTIVE,
            started_at,
        ],
    )
    .map_err(|e| CurriculumError::Internal(format!("Assignment upsert failed: {}", e)))?;

    Ok(())
}

/// Renumber active assignments to a dense 1..N keeping their relative order
pub fn compact_sequence(conn: &Connection, path_id: &str) -> Result<usize, CurriculumError> {
    let active = list_active(conn, path_id)?;
    let mut renumbered = 0;

    for (index, row) in active.iter().enumerate() {
        let expected = index as i64 + 1;
        if row.sequence_order != expected {
            conn.execute(
                "UPDATE module_assignments SET sequence_order = ? \
                 WHERE user_id = ? AND path_id = ? AND module_id = ?",
                params![expected, row.user_id, row.path_id, row.module_id],
            )
            .map_err(|e| CurriculumError::Internal(format!("Sequence update failed: {}", e)))?;
            renumbered += 1;
        }
    }

    if renumbered > 0 {
        debug!(path_id = %path_id, renumbered, "Compacted assignment sequence");
    }
    Ok(renumbered)
}

/// Overwrite the progress columns of an active assignment
pub fn update_progress(
    conn: &Connection,
    path_id: &str,
    module_id: &str,
    progress_percentage: i64,
    is_completed: bool,
    completion_date: Option<&str>,
) -> Result<bool, CurriculumError> {
    let changed = conn
        .execute(
            r#"
            UPDATE module_assignments
            SET progress_percentage = ?, is_completed = ?, completion_date = ?
            WHERE path_id = ? AND module_id = ? AND status = ?
            "#,
            params![
                progress_percentage,
                is_completed as i64,
                completion_date,
                path_id,
                module_id,
                status::ACTIVE,
            ],
        )
        .map_err(|e| CurriculumError::Internal(format!("Progress update failed: {}", e)))?;

    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{paths, schema};

    fn setup() -> (Connection, String) {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        let path = paths::create_path(&conn, "u1", "Rust", None).unwrap();
        (conn, path.path_id)
    }

    #[test]
    fn test_upsert_is_idempotent_on_natural_key() {
        let (conn, path_id) = setup();
        let fresh = AssignmentProgress::fresh();
        upsert_assignment(&conn, "u1", &path_id, "m1", 1, &fresh).unwrap();
        upsert_assignment(&conn, "u1", &path_id, "m1", 1, &fresh).unwrap();

        assert_eq!(list_active(&conn, &path_id).unwrap().len(), 1);
    }

    #[test]
    fn test_archive_then_reactivate_overwrites_progress() {
        let (conn, path_id) = setup();
        let done = AssignmentProgress {
            is_completed: true,
            completion_date: Some("2024-01-01T00:00:00.000Z".into()),
            progress_percentage: 100,
            started_at: None,
        };
        upsert_assignment(&conn, "u1", &path_id, "m1", 1, &done).unwrap();

        assert_eq!(archive_active(&conn, &path_id).unwrap(), 1);
        assert!(list_active(&conn, &path_id).unwrap().is_empty());

        upsert_assignment(&conn, "u1", &path_id, "m1", 3, &AssignmentProgress::fresh()).unwrap();
        let row = get_active(&conn, &path_id, "m1").unwrap().unwrap();
        assert!(!row.is_completed);
        assert_eq!(row.completion_date, None);
        assert_eq!(row.sequence_order, 3);
    }

    #[test]
    fn test_compact_sequence() {
        let (conn, path_id) = setup();
        let fresh = AssignmentProgress::fresh();
        upsert_assignment(&conn, "u1", &path_id, "a", 2, &fresh).unwrap();
        upsert_assignment(&conn, "u1", &path_id, "b", 5, &fresh).unwrap();
        upsert_assignment(&conn, "u1", &path_id, "c", 9, &fresh).unwrap();

        compact_sequence(&conn, &path_id).unwrap();
        let orders: Vec<(String, i64)> = list_active(&conn, &path_id)
            .unwrap()
            .into_iter()
            .map(|r| (r.module_id, r.sequence_order))
            .collect();
        assert_eq!(
            orders,
            vec![("a".to_string(), 1), ("b".to_string(), 2), ("c".to_string(), 3)]
        );
    }

    #[test]
    fn test_update_progress_only_touches_active() {
        let (conn, path_id) = setup();
        upsert_assignment(&conn, "u1", &path_id, "m1", 1, &AssignmentProgress::fresh()).unwrap();
        assert!(update_progress(&conn, &path_id, "m1", 40, false, None).unwrap());

        archive_active(&conn, &path_id).unwrap();
        assert!(!update_progress(&conn, &path_id, "m1", 80, false, None).unwrap());
    }
}
