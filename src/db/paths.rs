//! Learning path operations
//!
//! Paths are never deleted. A user owns at most one active path; creating a new
//! one archives whatever was active before.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{current_timestamp, status};
use crate::error::CurriculumError;

/// Path row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRow {
    pub path_id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl PathRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            path_id: row.get("path_id")?,
            user_id: row.get("user_id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == status::ACTIVE
    }
}

/// Get path by ID
pub fn get_path(conn: &Connection, path_id: &str) -> Result<Option<PathRow>, CurriculumError> {
    conn.query_row(
        "SELECT * FROM learning_paths WHERE path_id = ?",
        params![path_id],
        PathRow::from_row,
    )
    .optional()
    .map_err(|e| CurriculumError::Internal(format!("Query failed: {}", e)))
}

/// All active paths of a user, most recently updated first
pub fn list_active_paths(conn: &Connection, user_id: &str) -> Result<Vec<PathRow>, CurriculumError> {
    let mut stmt = conn
        .prepare(
            "SELECT * FROM learning_paths WHERE user_id = ? AND status = ? \
             ORDER BY updated_at DESC, created_at DESC",
        )
        .map_err(|e| CurriculumError::Internal(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![user_id, status::ACTIVE], PathRow::from_row)
        .map_err(|e| CurriculumError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CurriculumError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}

/// Get the user's active path without repairing anything
pub fn get_active_path(conn: &Connection, user_id: &str) -> Result<Option<PathRow>, CurriculumError> {
    Ok(list_active_paths(conn, user_id)?.into_iter().next())
}

/// Get the user's active path, archiving any extra active paths left behind
/// by overlapping requests. The most recently updated path wins.
pub fn ensure_single_active(conn: &Connection, user_id: &str) -> Result<Option<PathRow>, CurriculumError> {
    let mut active = list_active_paths(conn, user_id)?.into_iter();
    let kept = active.next();

    for extra in active {
        warn!(
            user_id = %user_id,
            path_id = %extra.path_id,
            "Archiving duplicate active path"
        );
        archive_path(conn, &extra.path_id)?;
    }

    Ok(kept)
}

/// Create a new active path, archiving any other active path of the user
pub fn create_path(
    conn: &Connection,
    user_id: &str,
    name: &str,
    description: Option<&str>,
) -> Result<PathRow, CurriculumError> {
    let now = current_timestamp();

    conn.execute(
        "UPDATE learning_paths SET status = ?, updated_at = ? WHERE user_id = ? AND status = ?",
        params![status::ARCHIVED, now, user_id, status::ACTIVE],
    )
    .map_err(|e| CurriculumError::Internal(format!("Archive previous paths failed: {}", e)))?;

    let path_id = Uuid::new_v4().to_string();
    conn.execute(
        r#"
        INSERT INTO learning_paths (path_id, user_id, name, description, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
        params![path_id, user_id, name, description, status::ACTIVE, now, now],
    )
    .map_err(|e| CurriculumError::Internal(format!("Path insert failed: {}", e)))?;

    debug!(user_id = %user_id, path_id = %path_id, "Created learning path");

    get_path(conn, &path_id)?
        .ok_or_else(|| CurriculumError::Internal("Path not found after insert".to_string()))
}

/// Update name and/or description; always bumps `updated_at`
pub fn update_path_metadata(
    conn: &Connection,
    path_id: &str,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<(), CurriculumError> {
    conn.execute(
        r#"
        UPDATE learning_paths
        SET name = COALESCE(?, name),
            description = COALESCE(?, description),
            updated_at = ?
        WHERE path_id = ?
        "#,
        params![name, description, current_timestamp(), path_id],
    )
    .map_err(|e| CurriculumError::Internal(format!("Path update failed: {}", e)))?;

    Ok(())
}

/// Flip a path to archived
pub fn archive_path(conn: &Connection, path_id: &str) -> Result<(), CurriculumError> {
    conn.execute(
        "UPDATE learning_paths SET status = ?, updated_at = ? WHERE path_id = ?",
        params![status::ARCHIVED, current_timestamp(), path_id],
    )
    .map_err(|e| CurriculumError::Internal(format!("Path archive failed: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_create_path_archives_previous() {
        let conn = conn();
        let first = create_path(&conn, "u1", "Rust", None).unwrap();
        let second = create_path(&conn, "u1", "Go", Some("systems")).unwrap();

        let active = list_active_paths(&conn, "u1").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].path_id, second.path_id);

        let first = get_path(&conn, &first.path_id).unwrap().unwrap();
        assert!(!first.is_active());
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM learning_paths WHERE user_id = 'u1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_paths_are_per_user() {
        let conn = conn();
        create_path(&conn, "u1", "Rust", None).unwrap();
        create_path(&conn, "u2", "Rust", None).unwrap();

        assert!(get_active_path(&conn, "u1").unwrap().is_some());
        assert!(get_active_path(&conn, "u2").unwrap().is_some());
        assert!(get_active_path(&conn, "u3").unwrap().is_none());
    }

    #[test]
    fn test_ensure_single_active_repairs_duplicates() {
        let conn = conn();
        let path = create_path(&conn, "u1", "Rust", None).unwrap();
        conn.execute(
            "INSERT INTO learning_paths (path_id, user_id, name, status, created_at, updated_at) \
             VALUES ('stray', 'u1', 'Stray', 'active', '2000-01-01T00:00:00.000Z', '2000-01-01T00:00:00.000Z')",
            [],
        )
        .unwrap();
        assert_eq!(list_active_paths(&conn, "u1").unwrap().len(), 2);

        let kept = ensure_single_active(&conn, "u1").unwrap().unwrap();
        assert_eq!(kept.path_id, path.path_id);
        assert_eq!(list_active_paths(&conn, "u1").unwrap().len(), 1);
    }

    #[test]
    fn test_update_metadata_keeps_missing_fields() {
        let conn = conn();
        let path = create_path(&conn, "u1", "Rust", Some("desc")).unwrap();
        update_path_metadata(&conn, &path.path_id, Some("Rust 2"), None).unwrap();

        let path = get_path(&conn, &path.path_id).unwrap().unwrap();
        assert_eq!(path.name, "Rust 2");
        assert_eq!(path.description.as_deref(), Some("desc"));
    }
}
