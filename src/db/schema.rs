//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::CurriculumError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), CurriculumError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, CurriculumError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    ).map_err(|e| CurriculumError::Internal(format!("Failed to create schema_version table: {}", e)))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), CurriculumError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| CurriculumError::Internal(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| CurriculumError::Internal(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), CurriculumError> {
    conn.execute_batch(PATHS_SCHEMA)
        .map_err(|e| CurriculumError::Internal(format!("Failed to create path tables: {}", e)))?;

    conn.execute_batch(CATALOG_SCHEMA)
        .map_err(|e| CurriculumError::Internal(format!("Failed to create catalog tables: {}", e)))?;

    conn.execute_batch(BACKUP_SCHEMA)
        .map_err(|e| CurriculumError::Internal(format!("Failed to create backup tables: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| CurriculumError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Per-user paths and their module assignments
const PATHS_SCHEMA: &str = r#"
-- Learning paths (never hard-deleted, status flips active/archived)
CREATE TABLE IF NOT EXISTS learning_paths (
    path_id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Join of (user, path, catalog module) carrying order and progress
CREATE TABLE IF NOT EXISTS module_assignments (
    user_id TEXT NOT NULL,
    path_id TEXT NOT NULL,
    module_id TEXT NOT NULL,
    sequence_order INTEGER NOT NULL,
    is_completed INTEGER NOT NULL DEFAULT 0,
    completion_date TEXT,
    progress_percentage INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active',
    started_at TEXT NOT NULL,
    PRIMARY KEY (user_id, path_id, module_id),
    FOREIGN KEY (path_id) REFERENCES learning_paths(path_id)
);
"#;

/// Shared catalog entities and their links
const CATALOG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS modules (
    module_id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    normalized_name TEXT NOT NULL,
    description TEXT,
    difficulty TEXT NOT NULL DEFAULT 'beginner',
    estimated_hours REAL NOT NULL DEFAULT 0,
    skills_json TEXT NOT NULL DEFAULT '[]',
    prerequisites_json TEXT NOT NULL DEFAULT '[]',
    usage_count INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS resources (
    resource_id TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    normalized_title TEXT NOT NULL,
    resource_type TEXT NOT NULL DEFAULT 'article',
    url TEXT,
    estimated_minutes INTEGER NOT NULL DEFAULT 0,
    usage_count INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS tasks (
    task_id TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    normalized_title TEXT NOT NULL,
    description TEXT,
    task_type TEXT NOT NULL DEFAULT 'exercise',
    estimated_minutes INTEGER NOT NULL DEFAULT 0,
    instructions TEXT,
    usage_count INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS module_resources (
    module_id TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    sequence_order INTEGER NOT NULL,
    PRIMARY KEY (module_id, resource_id)
);

CREATE TABLE IF NOT EXISTS module_tasks (
    module_id TEXT NOT NULL,
    task_id TEXT NOT NULL,
    sequence_order INTEGER NOT NULL,
    PRIMARY KEY (module_id, task_id)
);
"#;

/// Advisory snapshots of a user's active curriculum
const BACKUP_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS roadmap_backups (
    backup_id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_paths_user_status ON learning_paths(user_id, status);
CREATE INDEX IF NOT EXISTS idx_assignments_path_status ON module_assignments(path_id, status, sequence_order);

-- Identity lookups are by normalized title, intentionally not UNIQUE
CREATE INDEX IF NOT EXISTS idx_modules_normalized_name ON modules(normalized_name);
CREATE INDEX IF NOT EXISTS idx_resources_normalized_title ON resources(normalized_title);
CREATE INDEX IF NOT EXISTS idx_tasks_normalized_title ON tasks(normalized_title);

CREATE INDEX IF NOT EXISTS idx_backups_user_created ON roadmap_backups(user_id, created_at);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_repeatable() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
                 ('learning_paths', 'module_assignments', 'modules', 'resources', 'tasks', \
                  'module_resources', 'module_tasks', 'roadmap_backups')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 8);
    }
}
