//! Event system for curriculum operations
//!
//! Services emit an event after each committed state change so audit
//! listeners can follow reconciliations without polling the store.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

/// Curriculum events emitted by services
#[derive(Debug, Clone)]
pub enum CurriculumEvent {
    // Path events
    PathCreated {
        user_id: String,
        path_id: String,
    },
    PathReconciled {
        user_id: String,
        path_id: String,
        intent: String,
        added: usize,
        carried: usize,
        skipped: usize,
        failed: usize,
    },

    // Catalog events
    CatalogEntriesCreated {
        modules: usize,
        content: usize,
    },

    // Backup events
    BackupCreated {
        user_id: String,
        backup_id: String,
    },
    BackupUnavailable {
        user_id: String,
        reason: String,
    },
    BackupRestored {
        user_id: String,
        backup_id: String,
    },
    RestoreFailed {
        user_id: String,
        reason: String,
    },

    // Progress events
    ProgressRecorded {
        user_id: String,
        module_id: String,
        progress_percentage: i64,
        is_completed: bool,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &CurriculumEvent);
}

/// Event bus for broadcasting curriculum events
pub struct EventBus {
    sender: broadcast::Sender<CurriculumEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: CurriculumEvent) {
        trace!(event = ?event, "Emitting curriculum event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CurriculumEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &CurriculumEvent) {
        match event {
            CurriculumEvent::PathCreated { user_id, path_id } => {
                info!(user_id = %user_id, path_id = %path_id, "Learning path created");
            }
            CurriculumEvent::PathReconciled {
                user_id,
                path_id,
                intent,
                added,
                failed,
                ..
            } => {
                debug!(
                    user_id = %user_id,
                    path_id = %path_id,
                    intent = %intent,
                    added,
                    failed,
                    "Path reconciled"
                );
            }
            CurriculumEvent::BackupUnavailable { user_id, reason } => {
                debug!(user_id = %user_id, reason = %reason, "Backup unavailable");
            }
            CurriculumEvent::RestoreFailed { user_id, reason } => {
                warn!(user_id = %user_id, reason = %reason, "Restore failed, regeneration needed");
            }
            _ => {
                trace!(event = ?event, "Curriculum event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
