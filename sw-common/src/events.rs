//! Workflow event types and broadcast bus
//!
//! Events are published at workflow boundaries so log output and SSE
//! clients can be correlated with state transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Observation workflow events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ObservationEvent {
    /// Workflow advanced (or was reset)
    StateChanged {
        session_id: Uuid,
        from: String,
        to: String,
        timestamp: DateTime<Utc>,
    },

    /// Uploaded file set replaced
    FilesProcessed {
        session_id: Uuid,
        image_hashes: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// Batch classification finished for every observation
    ObservationsClassified {
        session_id: Uuid,
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// One observation written to the dataset store
    ObservationUploaded {
        session_id: Uuid,
        image_hash: String,
        path: String,
        timestamp: DateTime<Utc>,
    },

    /// One observation failed to upload (siblings continue)
    UploadFailed {
        session_id: Uuid,
        image_hash: String,
        path: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl ObservationEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            ObservationEvent::StateChanged { .. } => "StateChanged",
            ObservationEvent::FilesProcessed { .. } => "FilesProcessed",
            ObservationEvent::ObservationsClassified { .. } => "ObservationsClassified",
            ObservationEvent::ObservationUploaded { .. } => "ObservationUploaded",
            ObservationEvent::UploadFailed { .. } => "UploadFailed",
        }
    }

    pub fn session_id(&self) -> Uuid {
        match self {
            ObservationEvent::StateChanged { session_id, .. }
            | ObservationEvent::FilesProcessed { session_id, .. }
            | ObservationEvent::ObservationsClassified { session_id, .. }
            | ObservationEvent::ObservationUploaded { session_id, .. }
            | ObservationEvent::UploadFailed { session_id, .. } => *session_id,
        }
    }
}

/// Broadcast channel for [`ObservationEvent`]s
///
/// Publishing never blocks; with no subscribers the event is dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ObservationEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per receiver
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ObservationEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; returns the number of receivers reached
    pub fn emit(&self, event: ObservationEvent) -> usize {
        match self.tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                tracing::trace!("No event subscribers");
                0
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
