//! Content identity resolution
//!
//! Maps a draft onto a shared catalog entity. A normalized-title match reuses
//! the existing row and bumps its `usage_count`; otherwise a new row is created
//! with `usage_count = 1`. There is no locking: two requests introducing the
//! same new title at once may both create a row. Lookups always prefer the
//! oldest row, so later requests converge.
//!
//! Storage errors propagate unchanged. Retrying is the caller's concern.

use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

use crate::db::catalog::{self, NewModule, NewResource, NewTask};
use crate::draft::{normalize_title, placeholder, ModuleDraft, ResourceDraft, TaskDraft};
use crate::error::CurriculumError;

/// Catalog entity kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    Module,
    Resource,
    Task,
}

impl CatalogKind {
    pub fn label(&self) -> &'static str {
        match self {
            CatalogKind::Module => "Module",
            CatalogKind::Resource => "Resource",
            CatalogKind::Task => "Task",
        }
    }
}

/// A draft of any catalog kind
#[derive(Debug, Clone, Copy)]
pub enum Draft<'a> {
    Module(&'a ModuleDraft),
    Resource(&'a ResourceDraft),
    Task(&'a TaskDraft),
}

impl Draft<'_> {
    pub fn kind(&self) -> CatalogKind {
        match self {
            Draft::Module(_) => CatalogKind::Module,
            Draft::Resource(_) => CatalogKind::Resource,
            Draft::Task(_) => CatalogKind::Task,
        }
    }
}

/// Outcome of resolving one draft
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub kind: CatalogKind,
    pub id: String,
    /// `true` when a new catalog row was inserted
    pub created: bool,
}

/// Resolve any draft to a catalog ID.
///
/// `position` is the draft's 1-based place in its list. A blank title becomes
/// `Untitled <Kind> <position>`, so blank siblings stay distinct.
pub fn resolve(conn: &Connection, draft: Draft<'_>, position: usize) -> Result<Resolution, CurriculumError> {
    match draft {
        Draft::Module(d) => resolve_module(conn, d, position),
        Draft::Resource(d) => resolve_resource(conn, d, position),
        Draft::Task(d) => resolve_task(conn, d, position),
    }
}

/// Title and its identity key, falling back to a positional placeholder
fn identity(title: &str, kind: CatalogKind, position: usize) -> (String, String) {
    let normalized = normalize_title(title);
    if normalized.is_empty() {
        let title = placeholder(kind.label(), position.max(1));
        let normalized = normalize_title(&title);
        (title, normalized)
    } else {
        (title.trim().to_string(), normalized)
    }
}

pub fn resolve_module(
    conn: &Connection,
    draft: &ModuleDraft,
    position: usize,
) -> Result<Resolution, CurriculumError> {
    let (name, normalized_name) = identity(&draft.title, CatalogKind::Module, position);

    if let Some(existing) = catalog::find_module_by_name(conn, &normalized_name)? {
        catalog::bump_module_usage(conn, &existing.module_id)?;
        debug!(module_id = %existing.module_id, name = %existing.name, "Reusing catalog module");
        return Ok(Resolution {
            kind: CatalogKind::Module,
            id: existing.module_id,
            created: false,
        });
    }

    let id = catalog::insert_module(conn, &NewModule {
        name,
        normalized_name,
        description: draft.description.clone(),
        difficulty: draft.difficulty.as_str().to_string(),
        estimated_hours: draft.estimated_hours.max(0.0),
        skills: draft.skills.clone(),
        prerequisites: draft.prerequisites.clone(),
    })?;
    debug!(module_id = %id, "Created catalog module");

    Ok(Resolution {
        kind: CatalogKind::Module,
        id,
        created: true,
    })
}

/// Reuse a module by ID, bumping its usage. `None` when the ID is unknown.
pub fn resolve_module_by_id(
    conn: &Connection,
    module_id: &str,
) -> Result<Option<Resolution>, CurriculumError> {
    match catalog::get_module(conn, module_id)? {
        Some(existing) => {
            catalog::bump_module_usage(conn, &existing.module_id)?;
            Ok(Some(Resolution {
                kind: CatalogKind::Module,
                id: existing.module_id,
                created: false,
            }))
        }
        None => Ok(None),
    }
}

pub fn resolve_resource(
    conn: &Connection,
    draft: &ResourceDraft,
    position: usize,
) -> Result<Resolution, CurriculumError> {
    let (title, normalized_title) = identity(&draft.title, CatalogKind::Resource, position);
    let url = draft
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());

    if let Some(existing) = catalog::find_resource(conn, &normalized_title, url)? {
        catalog::bump_resource_usage(conn, &existing.resource_id)?;
        return Ok(Resolution {
            kind: CatalogKind::Resource,
            id: existing.resource_id,
            created: false,
        });
    }

    let id = catalog::insert_resource(conn, &NewResource {
        title,
        normalized_title,
        resource_type: draft.resource_type.clone(),
        url: url.map(String::from),
        estimated_minutes: draft.estimated_minutes.max(0),
    })?;

    Ok(Resolution {
        kind: CatalogKind::Resource,
        id,
        created: true,
    })
}

pub fn resolve_task(conn: &Connection, draft: &TaskDraft, position: usize) -> Result<Resolution, CurriculumError> {
    let (title, normalized_title) = identity(&draft.title, CatalogKind::Task, position);

    if let Some(existing) = catalog::find_task(conn, &normalized_title)? {
        catalog::bump_task_usage(conn, &existing.task_id)?;
        return Ok(Resolution {
            kind: CatalogKind::Task,
            id: existing.task_id,
            created: false,
        });
    }

    let id = catalog::insert_task(conn, &NewTask {
        title,
        normalized_title,
        description: draft.description.clone(),
        task_type: draft.task_type.clone(),
        estimated_minutes: draft.estimated_minutes.max(0),
        instructions: draft.instructions.clone(),
    })?;

    Ok(Resolution {
        kind: CatalogKind::Task,
        id,
        created: true,
    })
}

/// Counts of content attached to one module
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkSummary {
    pub resources: usize,
    pub tasks: usize,
    pub created: usize,
}

/// Resolve a module draft's resources and tasks and link them in draft order
pub fn link_content(
    conn: &Connection,
    module_id: &str,
    draft: &ModuleDraft,
) -> Result<LinkSummary, CurriculumError> {
    let mut summary = LinkSummary::default();

    for (index, resource) in draft.resources.iter().enumerate() {
        let resolution = resolve(conn, Draft::Resource(resource), index + 1)?;
        catalog::link_resource(conn, module_id, &resolution.id, index as i64 + 1)?;
        summary.resources += 1;
        summary.created += resolution.created as usize;
    }

    for (index, task) in draft.tasks.iter().enumerate() {
        let resolution = resolve(conn, Draft::Task(task), index + 1)?;
        catalog::link_task(conn, module_id, &resolution.id, index as i64 + 1)?;
        summary.tasks += 1;
        summary.created += resolution.created as usize;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use crate::difficulty::Difficulty;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        conn
    }

    fn resource(title: &str, url: Option<&str>) -> ResourceDraft {
        ResourceDraft {
            title: title.to_string(),
            resource_type: "video".into(),
            url: url.map(String::from),
            estimated_minutes: 15,
        }
    }

    #[test]
    fn test_case_and_whitespace_variants_share_identity() {
        let conn = conn();
        let first = resolve_module(&conn, &ModuleDraft::named("Async Rust"), 1).unwrap();
        let second = resolve_module(&conn, &ModuleDraft::named("  async   RUST "), 2).unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);

        let row = catalog::get_module(&conn, &first.id).unwrap().unwrap();
        assert_eq!(row.usage_count, 2);
        assert_eq!(row.name, "Async Rust");
    }

    #[test]
    fn test_new_module_keeps_draft_fields() {
        let conn = conn();
        let mut draft = ModuleDraft::named("Macros").with_hours(4.5);
        draft.difficulty = Difficulty::Advanced;
        draft.skills = vec!["macro_rules".into()];

        let resolution = resolve(&conn, Draft::Module(&draft), 1).unwrap();
        let row = catalog::get_module(&conn, &resolution.id).unwrap().unwrap();
        assert_eq!(row.difficulty, "advanced");
        assert_eq!(row.estimated_hours, 4.5);
        assert_eq!(row.skills, vec!["macro_rules".to_string()]);
        assert_eq!(row.usage_count, 1);
    }

    #[test]
    fn test_blank_titles_get_positional_placeholders() {
        let conn = conn();
        let first = resolve_module(&conn, &ModuleDraft::named("   "), 1).unwrap();
        let third = resolve_module(&conn, &ModuleDraft::named(""), 3).unwrap();

        assert!(first.created);
        assert!(third.created);
        assert_ne!(first.id, third.id);
        assert_eq!(catalog::get_module(&conn, &first.id).unwrap().unwrap().name, "Untitled Module 1");
        assert_eq!(catalog::get_module(&conn, &third.id).unwrap().unwrap().name, "Untitled Module 3");

        let blank_task = TaskDraft {
            title: " ".into(),
            description: None,
            task_type: "exercise".into(),
            estimated_minutes: 5,
            instructions: None,
        };
        let a = resolve_task(&conn, &blank_task, 1).unwrap();
        let b = resolve_task(&conn, &blank_task, 2).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_resource_url_participates_in_identity() {
        let conn = conn();
        let a = resolve_resource(&conn, &resource("Tokio Tutorial", Some("https://tokio.rs/tokio/tutorial")), 1).unwrap();
        let b = resolve_resource(&conn, &resource("tokio tutorial", Some("https://tokio.rs/tokio/tutorial")), 1).unwrap();
        let c = resolve_resource(&conn, &resource("Tokio Tutorial", Some("https://example.com/tokio")), 1).unwrap();
        let d = resolve_resource(&conn, &resource("Tokio tutorial", None), 1).unwrap();

        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert!(c.created);
        assert!(!d.created);
    }

    #[test]
    fn test_resolve_by_unknown_id() {
        let conn = conn();
        assert!(resolve_module_by_id(&conn, "00000000-0000-0000-0000-000000000000")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_link_content_is_idempotent() {
        let conn = conn();
        let mut draft = ModuleDraft::named("Testing");
        draft.resources = vec![resource("Rust by Example", None)];
        draft.tasks = vec![TaskDraft {
            title: "Write a doctest".into(),
            description: None,
            task_type: "exercise".into(),
            estimated_minutes: 10,
            instructions: None,
        }];

        let module = resolve_module(&conn, &draft, 1).unwrap();
        let first = link_content(&conn, &module.id, &draft).unwrap();
        let second = link_content(&conn, &module.id, &draft).unwrap();

        assert_eq!(first.created, 2);
        assert_eq!(second.created, 0);
        assert_eq!(catalog::resources_for_module(&conn, &module.id).unwrap().len(), 1);
        assert_eq!(catalog::tasks_for_module(&conn, &module.id).unwrap().len(), 1);
    }
}
