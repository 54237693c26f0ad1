//! Live sessions by id

use std::collections::HashMap;
use std::sync::Arc;
use sw_common::events::EventBus;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{ObservationSession, SessionError};

pub type SharedSession = Arc<Mutex<ObservationSession>>;

/// Sessions share nothing; each has its own lock, held for a whole action
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, SharedSession>>>,
    states: Arc<Vec<String>>,
    event_bus: EventBus,
}

impl SessionRegistry {
    pub fn new(states: Vec<String>, event_bus: EventBus) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            states: Arc::new(states),
            event_bus,
        }
    }

    pub async fn create(&self) -> Result<(Uuid, SharedSession), SessionError> {
        let session_id = Uuid::new_v4();
        let session = ObservationSession::new(session_id, &self.states, self.event_bus.clone())?;
        let shared = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(session_id, shared.clone());
        tracing::info!(session_id = %session_id, "Session created");
        Ok((session_id, shared))
    }

    pub async fn get(&self, session_id: Uuid) -> Option<SharedSession> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    pub async fn remove(&self, session_id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&session_id).is_some();
        if removed {
            tracing::info!(session_id = %session_id, "Session removed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
