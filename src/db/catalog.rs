//! Shared catalog operations (modules, resources, tasks and their links)
//!
//! Catalog rows are not owned by any user. Identity lookups go through the
//! `normalized_*` columns; nothing enforces uniqueness there, so concurrent
//! first use of the same title may leave duplicates behind. Lookups pick the
//! oldest row so every caller converges on the same entity.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::current_timestamp;
use crate::error::CurriculumError;

// ============================================================================
// Row Types
// ============================================================================

/// Module row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRow {
    pub module_id: String,
    pub name: String,
    pub normalized_name: String,
    pub description: Option<String>,
    pub difficulty: String,
    pub estimated_hours: f64,
    pub skills: Vec<String>,
    pub prerequisites: Vec<String>,
    pub usage_count: i64,
    pub created_at: String,
}

impl ModuleRow {
    pub(crate) fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let skills_json: String = row.get("skills_json")?;
        let prerequisites_json: String = row.get("prerequisites_json")?;

        Ok(Self {
            module_id: row.get("module_id")?,
            name: row.get("name")?,
            normalized_name: row.get("normalized_name")?,
            description: row.get("description")?,
            difficulty: row.get("difficulty")?,
            estimated_hours: row.get("estimated_hours")?,
            skills: parse_string_list(&skills_json),
            prerequisites: parse_string_list(&prerequisites_json),
            usage_count: row.get("usage_count")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Resource row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRow {
    pub resource_id: String,
    pub title: String,
    pub normalized_title: String,
    pub resource_type: String,
    pub url: Option<String>,
    pub estimated_minutes: i64,
    pub usage_count: i64,
}

impl ResourceRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            resource_id: row.get("resource_id")?,
            title: row.get("title")?,
            normalized_title: row.get("normalized_title")?,
            resource_type: row.get("resource_type")?,
            url: row.get("url")?,
            estimated_minutes: row.get("estimated_minutes")?,
            usage_count: row.get("usage_count")?,
        })
    }
}

/// Task row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRow {
    pub task_id: String,
    pub title: String,
    pub normalized_title: String,
    pub description: Option<String>,
    pub task_type: String,
    pub estimated_minutes: i64,
    pub instructions: Option<String>,
    pub usage_count: i64,
}

impl TaskRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            task_id: row.get("task_id")?,
            title: row.get("title")?,
            normalized_title: row.get("normalized_title")?,
            description: row.get("description")?,
            task_type: row.get("task_type")?,
            estimated_minutes: row.get("estimated_minutes")?,
            instructions: row.get("instructions")?,
            usage_count: row.get("usage_count")?,
        })
    }
}

/// JSON array column, empty on anything unparseable
fn parse_string_list(json: &str) -> Vec<String> {
    serde_json::from_str(json).unwrap_or_default()
}

// ============================================================================
// Insert Types
// ============================================================================

/// Input for creating a catalog module
#[derive(Debug, Clone)]
pub struct NewModule {
    pub name: String,
    pub normalized_name: String,
    pub description: Option<String>,
    pub difficulty: String,
    pub estimated_hours: f64,
    pub skills: Vec<String>,
    pub prerequisites: Vec<String>,
}

/// Input for creating a catalog resource
#[derive(Debug, Clone)]
pub struct NewResource {
    pub title: String,
    pub normalized_title: String,
    pub resource_type: String,
    pub url: Option<String>,
    pub estimated_minutes: i64,
}

/// Input for creating a catalog task
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub normalized_title: String,
    pub description: Option<String>,
    pub task_type: String,
    pub estimated_minutes: i64,
    pub instructions: Option<String>,
}

// ============================================================================
// Modules
// ============================================================================

/// Get module by ID
pub fn get_module(conn: &Connection, module_id: &str) -> Result<Option<ModuleRow>, CurriculumError> {
    conn.query_row(
        "SELECT * FROM modules WHERE module_id = ?",
        params![module_id],
        ModuleRow::from_row,
    )
    .optional()
    .map_err(|e| CurriculumError::Internal(format!("Query failed: {}", e)))
}

/// Oldest module whose normalized name matches
pub fn find_module_by_name(
    conn: &Connection,
    normalized_name: &str,
) -> Result<Option<ModuleRow>, CurriculumError> {
    conn.query_row(
        "SELECT * FROM modules WHERE normalized_name = ? ORDER BY created_at, rowid LIMIT 1",
        params![normalized_name],
        ModuleRow::from_row,
    )
    .optional()
    .map_err(|e| CurriculumError::Internal(format!("Query failed: {}", e)))
}

/// Create a module with `usage_count = 1`, returning its ID
pub fn insert_module(conn: &Connection, input: &NewModule) -> Result<String, CurriculumError> {
    let module_id = Uuid::new_v4().to_string();
    let skills_json = serde_json::to_string(&input.skills)?;
    let prerequisites_json = serde_json::to_string(&input.prerequisites)?;

    conn.execute(
        r#"
        INSERT INTO modules (
            module_id, name, normalized_name, description, difficulty, estimated_hours,
            skills_json, prerequisites_json, usage_count, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
        "#,
        params![
            module_id,
            input.name,
            input.normalized_name,
            input.description,
            input.difficulty,
            input.estimated_hours,
            skills_json,
            prerequisites_json,
            current_timestamp(),
        ],
    )
    .map_err(|e| CurriculumError::Internal(format!("Module insert failed: {}", e)))?;

    Ok(module_id)
}

pub fn bump_module_usage(conn: &Connection, module_id: &str) -> Result<(), CurriculumError> {
    conn.execute(
        "UPDATE modules SET usage_count = usage_count + 1 WHERE module_id = ?",
        params![module_id],
    )
    .map_err(|e| CurriculumError::Internal(format!("Module usage update failed: {}", e)))?;
    Ok(())
}

// ============================================================================
// Resources
// ============================================================================

pub fn get_resource(conn: &Connection, resource_id: &str) -> Result<Option<ResourceRow>, CurriculumError> {
    conn.query_row(
        "SELECT * FROM resources WHERE resource_id = ?",
        params![resource_id],
        ResourceRow::from_row,
    )
    .optional()
    .map_err(|e| CurriculumError::Internal(format!("Query failed: {}", e)))
}

/// Oldest resource matching the normalized title, and the URL when one is given
pub fn find_resource(
    conn: &Connection,
    normalized_title: &str,
    url: Option<&str>,
) -> Result<Option<ResourceRow>, CurriculumError> {
    let result = match url {
        Some(url) => conn.query_row(
            "SELECT * FROM resources WHERE normalized_title = ? AND url = ? \
             ORDER BY rowid LIMIT 1",
            params![normalized_title, url],
            ResourceRow::from_row,
        ),
        None => conn.query_row(
            "SELECT * FROM resources WHERE normalized_title = ? ORDER BY rowid LIMIT 1",
            params![normalized_title],
            ResourceRow::from_row,
        ),
    };

    result
        .optional()
        .map_err(|e| CurriculumError::Internal(format!("Query failed: {}", e)))
}

pub fn insert_resource(conn: &Connection, input: &NewResource) -> Result<String, CurriculumError> {
    let resource_id = Uuid::new_v4().to_string();

    conn.execute(
        r#"
        INSERT INTO resources (
            resource_id, title, normalized_title, resource_type, url, estimated_minutes, usage_count
        ) VALUES (?, ?, ?, ?, ?, ?, 1)
        "#,
        params![
            resource_id,
            input.title,
            input.normalized_title,
            input.resource_type,
            input.url,
            input.estimated_minutes,
        ],
    )
    .map_err(|e| CurriculumError::Internal(format!("Resource insert failed: {}", e)))?;

    Ok(resource_id)
}

pub fn bump_resource_usage(conn: &Connection, resource_id: &str) -> Result<(), CurriculumError> {
    conn.execute(
        "UPDATE resources SET usage_count = usage_count + 1 WHERE resource_id = ?",
        params![resource_id],
    )
    .map_err(|e| CurriculumError::Internal(format!("Resource usage update failed: {}", e)))?;
    Ok(())
}

// ============================================================================
// Tasks
// ============================================================================

pub fn get_task(conn: &Connection, task_id: &str) -> Result<Option<TaskRow>, CurriculumError> {
    conn.query_row(
        "SELECT * FROM tasks WHERE task_id = ?",
        params![task_id],
        TaskRow::from_row,
    )
    .optional()
    .map_err(|e| CurriculumError::Internal(format!("Query failed: {}", e)))
}

pub fn find_task(conn: &Connection, normalized_title: &str) -> Result<Option<TaskRow>, CurriculumError> {
    conn.query_row(
        "SELECT * FROM tasks WHERE normalized_title = ? ORDER BY rowid LIMIT 1",
        params![normalized_title],
        TaskRow::from_row,
    )
    .optional()
    .map_err(|e| CurriculumError::Internal(format!("Query failed: {}", e)))
}

pub fn insert_task(conn: &Connection, input: &NewTask) -> Result<String, CurriculumError> {
    let task_id = Uuid::new_v4().to_string();

    conn.execute(
        r#"
        INSERT INTO tasks (
            task_id, title, normalized_title, description, task_type,
            estimated_minutes, instructions, usage_count
        ) VALUES (?, ?, ?, ?, ?, ?, ?, 1)
        "#,
        params![
            task_id,
            input.title,
            input.normalized_title,
            input.description,
            input.task_type,
            input.estimated_minutes,
            input.instructions,
        ],
    )
    .map_err(|e| CurriculumError::Internal(format!("Task insert failed: {}", e)))?;

    Ok(task_id)
}

pub fn bump_task_usage(conn: &Connection, task_id: &str) -> Result<(), CurriculumError> {
    conn.execute(
        "UPDATE tasks SET usage_count = usage_count + 1 WHERE task_id = ?",
        params![task_id],
    )
    .map_err(|e| CurriculumError::Internal(format!("Task usage update failed: {}", e)))?;
    Ok(())
}

// ============================================================================
// Links
// ============================================================================

/// Idempotent link on (module, resource); a repeat only moves its position
pub fn link_resource(
    conn: &Connection,
    module_id: &str,
    resource_id: &str,
    sequence_order: i64,
) -> Result<(), CurriculumError> {
    conn.execute(
        r#"
        INSERT INTO module_resources (module_id, resource_id, sequence_order) VALUES (?, ?, ?)
        ON CONFLICT (module_id, resource_id) DO UPDATE SET sequence_order = excluded.sequence_order
        "#,
        params![module_id, resource_id, sequence_order],
    )
    .map_err(|e| CurriculumError::Internal(format!("Resource link failed: {}", e)))?;
    Ok(())
}

/// Idempotent link on (module, task)
pub fn link_task(
    conn: &Connection,
    module_id: &str,
    task_id: &str,
    sequence_order: i64,
) -> Result<(), CurriculumError> {
    conn.execute(
        r#"
        INSERT INTO module_tasks (module_id, task_id, sequence_order) VALUES (?, ?, ?)
        ON CONFLICT (module_id, task_id) DO UPDATE SET sequence_order = excluded.sequence_order
        "#,
        params![module_id, task_id, sequence_order],
    )
    .map_err(|e| CurriculumError::Internal(format!("Task link failed: {}", e)))?;
    Ok(())
}

/// Resources linked to a module in link order
pub fn resources_for_module(conn: &Connection, module_id: &str) -> Result<Vec<ResourceRow>, CurriculumError> {
    let mut stmt = conn
        .prepare(
            "SELECT r.* FROM resources r JOIN module_resources l ON l.resource_id = r.resource_id \
             WHERE l.module_id = ? ORDER BY l.sequence_order, l.rowid",
        )
        .map_err(|e| CurriculumError::Internal(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![module_id], ResourceRow::from_row)
        .map_err(|e| CurriculumError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CurriculumError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}

/// Tasks linked to a module in link order
pub fn tasks_for_module(conn: &Connection, module_id: &str) -> Result<Vec<TaskRow>, CurriculumError> {
    let mut stmt = conn
        .prepare(
            "SELECT t.* FROM tasks t JOIN module_tasks l ON l.task_id = t.task_id \
             WHERE l.module_id = ? ORDER BY l.sequence_order, l.rowid",
        )
        .map_err(|e| CurriculumError::Internal(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![module_id], TaskRow::from_row)
        .map_err(|e| CurriculumError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CurriculumError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}
