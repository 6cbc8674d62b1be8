//! SQLite database module for curricula and the shared content catalog
//!
//! ## Tables
//!
//! - `learning_paths` - One active path per user, older paths archived
//! - `module_assignments` - Ordered, progress-bearing modules of a path
//! - `modules`, `resources`, `tasks` - Shared catalog, reused across users
//! - `module_resources`, `module_tasks` - Catalog links with their own ordering
//! - `roadmap_backups` - Advisory snapshots of a user's active curriculum

pub mod schema;
pub mod paths;
pub mod assignments;
pub mod catalog;
pub mod backups;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::CurriculumError;

/// Row lifecycle values shared by paths and assignments
pub mod status {
    pub const ACTIVE: &str = "active";
    pub const ARCHIVED: &str = "archived";
}

/// Timestamp format shared by every table
pub fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// SQLite database for paths, assignments and catalog entries
pub struct CurriculumDb {
    conn: Mutex<Connection>,
}

impl CurriculumDb {
    /// Open or create the database file
    pub fn open(db_path: &Path) -> Result<Self, CurriculumError> {
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(db_path)
            .map_err(|e| CurriculumError::Internal(format!("Failed to open SQLite: {}", e)))?;

        // WAL keeps concurrent readers off the writer's back
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| CurriculumError::Internal(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, CurriculumError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(|e| CurriculumError::Internal(format!("Failed to open in-memory SQLite: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    fn init_schema(&self) -> Result<(), CurriculumError> {
        self.with_conn(schema::init_schema)
    }

    /// Run a read operation against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, CurriculumError>
    where
        F: FnOnce(&Connection) -> Result<T, CurriculumError>,
    {
        let conn = self.conn.lock()
            .map_err(|e| CurriculumError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, CurriculumError>
    where
        F: FnOnce(&mut Connection) -> Result<T, CurriculumError>,
    {
        let mut conn = self.conn.lock()
            .map_err(|e| CurriculumError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, CurriculumError> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<u64, CurriculumError> {
                let n: i64 = conn
                    .query_row(sql, [], |row| row.get(0))
                    .map_err(|e| CurriculumError::Internal(format!("Query failed: {}", e)))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                path_count: count("SELECT COUNT(*) FROM learning_paths")?,
                active_path_count: count("SELECT COUNT(*) FROM learning_paths WHERE status = 'active'")?,
                assignment_count: count("SELECT COUNT(*) FROM module_assignments")?,
                module_count: count("SELECT COUNT(*) FROM modules")?,
                resource_count: count("SELECT COUNT(*) FROM resources")?,
                task_count: count("SELECT COUNT(*) FROM tasks")?,
                backup_count: count("SELECT COUNT(*) FROM roadmap_backups")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub path_count: u64,
    pub active_path_count: u64,
    pub assignment_count: u64,
    pub module_count: u64,
    pub resource_count: u64,
    pub task_count: u64,
    pub backup_count: u64,
}

// Re-exports
pub use assignments::AssignmentRow;
pub use backups::BackupRow;
pub use catalog::{ModuleRow, ResourceRow, TaskRow};
pub use paths::PathRow;
