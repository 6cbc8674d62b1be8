//! Lamad Curriculum - reconciliation engine for personalized learning paths
//!
//! Takes a freshly generated or edited curriculum and merges it into a user's
//! persisted, progress-bearing learning path.
//!
//! ## Architecture
//!
//! - **draft**: boundary adapter from loose JSON to canonical drafts
//! - **resolver**: content identity, normalized-title dedup into the shared catalog
//! - **reconcile**: `IncrementalAdd` / `FullReplace` planning and per-entry application
//! - **progress**: which completion state survives a replacement
//! - **guard**: advisory snapshot before, best-effort restore after a failed call
//! - **stats**: read-side rollups (counts, percentage, ETA)
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/lamad-curriculum/
//! ├── curriculum.db          # SQLite (WAL): paths, assignments, catalog, backups
//! └── config.toml            # Configuration
//! ```

pub mod config;
pub mod curriculum;
pub mod db;
pub mod difficulty;
pub mod draft;
pub mod error;
pub mod guard;
pub mod progress;
pub mod reconcile;
pub mod resolver;
pub mod services;
pub mod stats;
pub mod views;

// Re-exports
pub use config::Config;
pub use curriculum::ActiveCurriculum;
pub use db::CurriculumDb;
pub use draft::{CurriculumDraft, ModuleDraft, ModuleRef};
pub use error::CurriculumError;
pub use guard::{GuardedOutcome, RestoreOutcome, SnapshotOutcome};
pub use reconcile::{Intent, ReconciliationResult};
pub use services::{CurriculumService, EventBus, Services};
pub use stats::CurriculumStats;
