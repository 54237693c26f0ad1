//! sw-ingest library interface
//!
//! Cetacean observation ingest: image upload, metadata entry, species
//! classification, manual review and publication to a dataset, sequenced by
//! a linear workflow machine per user session.

pub mod api;
pub mod error;
pub mod models;
pub mod services;
pub mod session;
pub mod species;
pub mod validation;
pub mod view;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use sw_common::config::TomlConfig;
use sw_common::events::EventBus;
use sw_common::log_buffer::LogBuffer;

use crate::services::{Classifier, DatasetStore, ImageMetadataReader};
use crate::session::SessionRegistry;
use crate::workflow::{WorkflowError, WorkflowStage};

/// Settings handlers need at request time
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub dataset_id: String,
    pub enable_push: bool,
    pub classifier_timeout: Duration,
    pub dataset_timeout: Duration,
}

impl From<&TomlConfig> for IngestSettings {
    fn from(config: &TomlConfig) -> Self {
        Self {
            dataset_id: config.dataset.dataset_id.clone(),
            enable_push: config.dataset.enable_push,
            classifier_timeout: config.classifier.timeout(),
            dataset_timeout: config.dataset.timeout(),
        }
    }
}

/// Startup check beyond [`TomlConfig::validate`]
///
/// Sessions can only be driven over the controller's stage order, so any
/// other `workflow.states` list is refused before the server starts.
pub fn check_workflow_config(config: &TomlConfig) -> Result<(), WorkflowError> {
    WorkflowStage::check_sequence(&config.workflow.states)
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRegistry,
    pub classifier: Arc<dyn Classifier>,
    pub dataset_store: Arc<dyn DatasetStore>,
    pub metadata_reader: Arc<dyn ImageMetadataReader>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub log_buffer: LogBuffer,
    pub settings: Arc<IngestSettings>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: &TomlConfig,
        classifier: Arc<dyn Classifier>,
        dataset_store: Arc<dyn DatasetStore>,
        metadata_reader: Arc<dyn ImageMetadataReader>,
        event_bus: EventBus,
        log_buffer: LogBuffer,
    ) -> Self {
        Self {
            sessions: SessionRegistry::new(config.workflow.states.clone(), event_bus.clone()),
            classifier,
            dataset_store,
            metadata_reader,
            event_bus,
            log_buffer,
            settings: Arc::new(IngestSettings::from(config)),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::ui_routes())
        .merge(api::session_routes())
        .merge(api::species_routes())
        .merge(api::log_routes())
        .merge(api::health_routes())
        .merge(api::event_routes())
        .with_state(state)
}
