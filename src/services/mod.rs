//! Service layer for lamad-curriculum
//!
//! Services sit between the CLI (or any other front end) and the
//! reconciliation engine. They validate input, take the database lock and
//! emit events for audit listeners.
//!
//! ## Architecture
//!
//! ```text
//! CLI / callers (thin)
//!     ↓
//! Service Layer (validation, events)
//!     ↓
//! reconcile / guard / stats
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod events;
pub mod curriculum_service;

// Re-exports
pub use events::{spawn_logging_listener, CurriculumEvent, EventBus, EventListener, LoggingEventListener};
pub use curriculum_service::CurriculumService;

use crate::config::Config;
use crate::db::CurriculumDb;
use std::sync::Arc;

/// Service container for dependency injection
pub struct Services {
    pub curriculum: Arc<CurriculumService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services with a shared database
    pub fn new(db: Arc<CurriculumDb>, config: &Config) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            curriculum: Arc::new(CurriculumService::new(db, events.clone(), config)),
            events,
        }
    }
}
