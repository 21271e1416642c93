//! EventBus - broadcast of request and reload events for operators.
//!
//! Request events carry identifiers and counts only; results and request
//! text stay out of the stream. Reload events carry the full reload outcome.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;
use volcano_registry::ReloadEvent;

use crate::router::Route;
use crate::ErrorKind;

/// Events emitted by the engine and the reload supervisor
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VolcanoEvent {
    /// A request finished (either path)
    RequestCompleted {
        /// Request identifier
        request_id: Uuid,
        /// Path the request took
        path: Route,
        /// Whether it succeeded
        success: bool,
        /// Error category on failure
        #[serde(skip_serializing_if = "Option::is_none")]
        error_kind: Option<ErrorKind>,
        /// Wall time in milliseconds
        duration_ms: u64,
    },
    /// A durable workflow was started
    WorkflowStarted {
        /// Request identifier
        request_id: Uuid,
        /// Workflow id
        workflow_id: String,
        /// Engine run id
        run_id: String,
        /// Workflow type
        workflow_type: String,
    },
    /// A reload installed a new snapshot
    ReloadCompleted(ReloadEvent),
    /// A reload attempt failed before installing anything
    ReloadFailed {
        /// Branch
        branch: String,
        /// Error description
        error: String,
    },
}

impl VolcanoEvent {
    /// Branch for reload events
    #[must_use]
    pub fn branch(&self) -> Option<&str> {
        match self {
            Self::ReloadCompleted(event) => Some(&event.branch),
            Self::ReloadFailed { branch, .. } => Some(branch),
            _ => None,
        }
    }
}

/// Broadcast-based event bus.
///
/// Slow subscribers miss events (lagged) rather than blocking the publisher.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<VolcanoEvent>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<VolcanoEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; returns how many subscribers received it.
    pub fn publish(&self, event: VolcanoEvent) -> usize {
        // no receivers is fine
        self.sender.send(event).unwrap_or(0)
    }

    /// Current number of subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
