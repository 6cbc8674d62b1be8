//! Roadmap backup storage
//!
//! The payload is opaque to this layer; `guard` owns its format.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use super::current_timestamp;
use crate::error::CurriculumError;

/// Backup row from database
#[derive(Debug, Clone, Serialize)]
pub struct BackupRow {
    pub backup_id: String,
    pub user_id: String,
    pub payload: String,
    pub created_at: String,
}

impl BackupRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            backup_id: row.get("backup_id")?,
            user_id: row.get("user_id")?,
            payload: row.get("payload")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Store a snapshot payload, returning the new backup ID
pub fn insert_backup(conn: &Connection, user_id: &str, payload: &str) -> Result<String, CurriculumError> {
    let backup_id = Uuid::new_v4().to_string();

    conn.execute(
        "INSERT INTO roadmap_backups (backup_id, user_id, payload, created_at) VALUES (?, ?, ?, ?)",
        params![backup_id, user_id, payload, current_timestamp()],
    )
    .map_err(|e| CurriculumError::Internal(format!("Backup insert failed: {}", e)))?;

    Ok(backup_id)
}

/// Get a backup owned by `user_id`
pub fn get_backup(
    conn: &Connection,
    user_id: &str,
    backup_id: &str,
) -> Result<Option<BackupRow>, CurriculumError> {
    conn.query_row(
        "SELECT * FROM roadmap_backups WHERE backup_id = ? AND user_id = ?",
        params![backup_id, user_id],
        BackupRow::from_row,
    )
    .optional()
    .map_err(|e| CurriculumError::Internal(format!("Query failed: {}", e)))
}

/// Backups of a user, newest first
pub fn list_backups(conn: &Connection, user_id: &str) -> Result<Vec<BackupRow>, CurriculumError> {
    let mut stmt = conn
        .prepare("SELECT * FROM roadmap_backups WHERE user_id = ? ORDER BY created_at DESC, rowid DESC")
        .map_err(|e| CurriculumError::Internal(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![user_id], BackupRow::from_row)
        .map_err(|e| CurriculumError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CurriculumError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}

/// Keep the newest `keep` backups of a user and delete the rest
pub fn prune_backups(conn: &Connection, user_id: &str, keep: u32) -> Result<usize, CurriculumError> {
    let deleted = conn
        .execute(
            r#"
            DELETE FROM roadmap_backups
            WHERE user_id = ?1 AND backup_id NOT IN (
                SELECT backup_id FROM roadmap_backups
                WHERE user_id = ?1
                ORDER BY created_at DESC, rowid DESC
                LIMIT ?2
            )
            "#,
            params![user_id, keep as i64],
        )
        .map_err(|e| CurriculumError::Internal(format!("Backup prune failed: {}", e)))?;

    Ok(deleted)
}
