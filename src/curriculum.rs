//! Read model of a user's active curriculum

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::assignments::{self, AssignmentRow};
use crate::db::catalog::{self, ModuleRow, ResourceRow, TaskRow};
use crate::db::paths::{self, PathRow};
use crate::error::CurriculumError;

/// One active module with its progress and linked content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurriculumModule {
    pub assignment: AssignmentRow,
    pub module: ModuleRow,
    pub resources: Vec<ResourceRow>,
    pub tasks: Vec<TaskRow>,
}

impl CurriculumModule {
    pub fn is_completed(&self) -> bool {
        self.assignment.is_completed
    }
}

/// The active path and its modules in sequence order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveCurriculum {
    pub path: PathRow,
    pub modules: Vec<CurriculumModule>,
}

impl ActiveCurriculum {
    pub fn module(&self, module_id: &str) -> Option<&CurriculumModule> {
        self.modules.iter().find(|m| m.module.module_id == module_id)
    }
}

/// Load the active curriculum, `None` when the user has no active path
pub fn load_active(conn: &Connection, user_id: &str) -> Result<Option<ActiveCurriculum>, CurriculumError> {
    let path = match paths::get_active_path(conn, user_id)? {
        Some(path) => path,
        None => return Ok(None),
    };

    let modules = assignments::list_active_with_modules(conn, &path.path_id)?
        .into_iter()
        .map(|active| {
            let resources = catalog::resources_for_module(conn, &active.module.module_id)?;
            let tasks = catalog::tasks_for_module(conn, &active.module.module_id)?;
            Ok(CurriculumModule {
                assignment: active.assignment,
                module: active.module,
                resources,
                tasks,
            })
        })
        .collect::<Result<Vec<_>, CurriculumError>>()?;

    Ok(Some(ActiveCurriculum { path, modules }))
}
