//! Boundary adapter for loosely-structured curriculum drafts
//!
//! Upstream generation and user edits produce JSON with many spellings of the
//! same field (`title` / `name` / `moduleName`, `estimated_hours` / `hours`,
//! ...). This module reads them once into canonical structs; nothing past this
//! point looks at raw field names.
//!
//! Drafts are never rejected for missing optional fields. Missing titles get a
//! positional placeholder, missing numbers become zero.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::difficulty::Difficulty;
use crate::error::CurriculumError;

const CURRICULUM_TITLE_KEYS: &[&str] = &["title", "name", "path_name", "pathName"];
const CURRICULUM_MODULE_KEYS: &[&str] = &["modules", "roadmap", "items", "curriculum"];

const TITLE_KEYS: &[&str] = &["title", "name", "module_name", "moduleName"];
const DESCRIPTION_KEYS: &[&str] = &["description", "summary", "overview"];
const DIFFICULTY_KEYS: &[&str] = &["difficulty", "level", "difficulty_level", "difficultyLevel"];
const HOURS_KEYS: &[&str] = &[
    "estimated_hours", "estimatedHours", "hours", "duration_hours", "durationHours", "duration",
];
const SKILLS_KEYS: &[&str] = &["skills", "skills_gained", "skillsGained"];
const PREREQUISITE_KEYS: &[&str] = &["prerequisites", "prereqs"];
const REFERENCE_KEYS: &[&str] = &[
    "module_id", "moduleId", "existing_module_id", "existingModuleId", "id",
];
const RESOURCE_KEYS: &[&str] = &["resources", "learning_resources", "learningResources"];
const TASK_KEYS: &[&str] = &["tasks", "practice_tasks", "practiceTasks", "exercises"];

const ITEM_TITLE_KEYS: &[&str] = &["title", "name"];
const RESOURCE_TYPE_KEYS: &[&str] = &["type", "resource_type", "resourceType"];
const URL_KEYS: &[&str] = &["url", "link", "href"];
const MINUTES_KEYS: &[&str] = &[
    "estimated_minutes", "estimatedMinutes", "duration_minutes", "durationMinutes", "minutes", "duration",
];
const TASK_TYPE_KEYS: &[&str] = &["type", "task_type", "taskType"];
const INSTRUCTION_KEYS: &[&str] = &["instructions", "steps"];

/// How a module draft refers to the catalog, decided once at the boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ModuleRef {
    /// No reference field at all
    NoRef,
    /// A reference field that is not a catalog ID (e.g. "new", "module-3")
    NewDraft(String),
    /// A well-formed catalog module ID
    Existing(String),
}

impl ModuleRef {
    /// Classify a raw reference value
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => ModuleRef::NoRef,
            Some(s) => match Uuid::parse_str(s) {
                Ok(id) => ModuleRef::Existing(id.hyphenated().to_string()),
                Err(_) => ModuleRef::NewDraft(s.to_string()),
            },
        }
    }

    pub fn existing_id(&self) -> Option<&str> {
        match self {
            ModuleRef::Existing(id) => Some(id),
            _ => None,
        }
    }
}

/// Canonical resource draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDraft {
    pub title: String,
    pub resource_type: String,
    pub url: Option<String>,
    pub estimated_minutes: i64,
}

/// Canonical task draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub task_type: String,
    pub estimated_minutes: i64,
    pub instructions: Option<String>,
}

/// Canonical module draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDraft {
    pub reference: ModuleRef,
    pub title: String,
    pub description: Option<String>,
    pub difficulty: Difficulty,
    pub estimated_hours: f64,
    pub skills: Vec<String>,
    pub prerequisites: Vec<String>,
    pub resources: Vec<ResourceDraft>,
    pub tasks: Vec<TaskDraft>,
}

impl ModuleDraft {
    /// A bare draft with only a title
    pub fn named(title: impl Into<String>) -> Self {
        Self {
            reference: ModuleRef::NoRef,
            title: title.into(),
            description: None,
            difficulty: Difficulty::default(),
            estimated_hours: 0.0,
            skills: vec![],
            prerequisites: vec![],
            resources: vec![],
            tasks: vec![],
        }
    }

    /// A draft pointing at an existing catalog module
    pub fn referencing(module_id: &str, title: impl Into<String>) -> Self {
        Self {
            reference: ModuleRef::parse(Some(module_id)),
            ..Self::named(title)
        }
    }

    pub fn with_hours(mut self, hours: f64) -> Self {
        self.estimated_hours = hours.max(0.0);
        self
    }

    pub fn normalized_title(&self) -> String {
        normalize_title(&self.title)
    }

    fn from_value(value: &Value, position: usize) -> Self {
        let obj = match value {
            Value::Object(obj) => obj,
            Value::String(title) => {
                return Self::named(title_or_placeholder(Some(title.trim()), "Module", position));
            }
            _ => return Self::named(placeholder("Module", position)),
        };

        let resources = first_array(obj, RESOURCE_KEYS)
            .iter()
            .enumerate()
            .map(|(i, v)| ResourceDraft::from_value(v, i + 1))
            .collect();
        let tasks = first_array(obj, TASK_KEYS)
            .iter()
            .enumerate()
            .map(|(i, v)| TaskDraft::from_value(v, i + 1))
            .collect();

        Self {
            reference: ModuleRef::parse(first_str(obj, REFERENCE_KEYS).as_deref()),
            title: title_or_placeholder(first_str(obj, TITLE_KEYS).as_deref(), "Module", position),
            description: first_str(obj, DESCRIPTION_KEYS),
            difficulty: first_value(obj, DIFFICULTY_KEYS)
                .map(Difficulty::from_value)
                .unwrap_or_default(),
            estimated_hours: first_number(obj, HOURS_KEYS).unwrap_or(0.0).max(0.0),
            skills: first_list(obj, SKILLS_KEYS),
            prerequisites: first_list(obj, PREREQUISITE_KEYS),
            resources,
            tasks,
        }
    }
}

impl ResourceDraft {
    fn from_value(value: &Value, position: usize) -> Self {
        let empty = Map::new();
        let obj = match value {
            Value::Object(obj) => obj,
            _ => &empty,
        };
        let fallback_title = value.as_str().map(str::trim);

        Self {
            title: title_or_placeholder(
                first_str(obj, ITEM_TITLE_KEYS).as_deref().or(fallback_title),
                "Resource",
                position,
            ),
            resource_type: first_str(obj, RESOURCE_TYPE_KEYS)
                .map(|t| t.to_lowercase())
                .unwrap_or_else(|| "article".to_string()),
            url: first_str(obj, URL_KEYS),
            estimated_minutes: minutes(first_number(obj, MINUTES_KEYS)),
        }
    }
}

impl TaskDraft {
    fn from_value(value: &Value, position: usize) -> Self {
        let empty = Map::new();
        let obj = match value {
            Value::Object(obj) => obj,
            _ => &empty,
        };
        let fallback_title = value.as_str().map(str::trim);

        let instructions = match first_value(obj, INSTRUCTION_KEYS) {
            Some(Value::Array(items)) => {
                let lines: Vec<String> = items.iter().filter_map(scalar_string).collect();
                (!lines.is_empty()).then(|| lines.join("\n"))
            }
            Some(other) => scalar_string(other),
            None => None,
        };

        Self {
            title: title_or_placeholder(
                first_str(obj, ITEM_TITLE_KEYS).as_deref().or(fallback_title),
                "Task",
                position,
            ),
            description: first_str(obj, DESCRIPTION_KEYS),
            task_type: first_str(obj, TASK_TYPE_KEYS)
                .map(|t| t.to_lowercase())
                .unwrap_or_else(|| "exercise".to_string()),
            estimated_minutes: minutes(first_number(obj, MINUTES_KEYS)),
            instructions,
        }
    }
}

/// Canonical target curriculum: an ordered list of module drafts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurriculumDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    pub modules: Vec<ModuleDraft>,
}

impl CurriculumDraft {
    pub fn new(modules: Vec<ModuleDraft>) -> Self {
        Self {
            title: None,
            description: None,
            modules,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Read a curriculum from an object with a module list, or a bare array
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Array(items) => Self::new(modules_from(items)),
            Value::Object(obj) => Self {
                title: first_str(obj, CURRICULUM_TITLE_KEYS),
                description: first_str(obj, DESCRIPTION_KEYS),
                modules: modules_from(first_array(obj, CURRICULUM_MODULE_KEYS)),
            },
            _ => Self::default(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, CurriculumError> {
        let value: Value = serde_json::from_str(json)?;
        Ok(Self::from_value(&value))
    }
}

fn modules_from(items: &[Value]) -> Vec<ModuleDraft> {
    items
        .iter()
        .enumerate()
        .map(|(i, v)| ModuleDraft::from_value(v, i + 1))
        .collect()
}

/// Identity key for titles: trimmed, case-folded, inner whitespace collapsed
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn placeholder(kind: &str, position: usize) -> String {
    format!("Untitled {} {}", kind, position)
}

fn title_or_placeholder(title: Option<&str>, kind: &str, position: usize) -> String {
    match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => t.to_string(),
        None => placeholder(kind, position),
    }
}

fn minutes(value: Option<f64>) -> i64 {
    value.map(|m| m.max(0.0).round() as i64).unwrap_or(0)
}

// ============================================================================
// Field sniffing helpers
// ============================================================================

fn first_value<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find_map(scalar_string)
}

/// JSON number, or a string starting with one ("12", "1.5 hours")
fn first_number(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().filter_map(|k| obj.get(*k)).find_map(|v| match v {
        Value::Number(n) => n.as_f64().filter(|n| n.is_finite()),
        Value::String(s) => leading_number(s),
        _ => None,
    })
}

fn leading_number(s: &str) -> Option<f64> {
    let s = s.trim();
    let end = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Array of strings, or a single comma-separated string
fn first_list(obj: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    match first_value(obj, keys) {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_string).collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => vec![],
    }
}

fn first_array<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find_map(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
