//! Per-user session controller
//!
//! An [`ObservationSession`] owns one workflow machine and one observation
//! set. Every user action is a method here; each one checks the current
//! stage, mutates state, and advances the machine when the action completes
//! a stage. Callers render the session afresh after each action.

pub mod observation_set;
pub mod registry;

pub use observation_set::ObservationSet;
pub use registry::SessionRegistry;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use sw_common::events::{EventBus, ObservationEvent};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::{ImageHash, InputObservation, ObservationError, UploadedImage};
use crate::services::{
    observation_path, Classifier, ClassifierError, CommitInfo, DatasetError, DatasetStore,
    ImageMetadataReader,
};
use crate::species;
use crate::validation::{self, is_valid_email, is_valid_number, ValidationError};
use crate::workflow::{StateTransition, ViewMode, WorkflowError, WorkflowFsm, WorkflowProgress, WorkflowStage};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("Required inputs are not all set")]
    Incomplete,

    #[error("Action requires stage {expected}, session is in {actual}")]
    InvalidStage {
        expected: WorkflowStage,
        actual: WorkflowStage,
    },

    #[error("Inputs are locked once data entry is validated (stage {0})")]
    InputsLocked(WorkflowStage),

    #[error("No observation with hash {0}")]
    UnknownObservation(String),

    #[error("Unknown species: {0}")]
    UnknownSpecies(String),

    #[error("Classification failed for {image_hash}: {source}")]
    Classification {
        image_hash: ImageHash,
        #[source]
        source: ClassifierError,
    },

    #[error(transparent)]
    Observation(#[from] ObservationError),
}

/// A rejected field value; the field itself is left unset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    /// `None` for the session-wide author email
    pub image_hash: Option<ImageHash>,
    pub field: &'static str,
    pub value: String,
    pub message: String,
}

/// Partial edit of one observation's metadata
///
/// `None` leaves a field untouched; a blank string clears it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FieldUpdate {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadOutcome {
    Uploaded { path: String, commit: CommitInfo },
    Failed { path: String, error: String },
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Uploaded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationUpload {
    pub image_hash: ImageHash,
    #[serde(flatten)]
    pub outcome: UploadOutcome,
}

/// Per-observation result of the upload stage
///
/// The session reaches `data_uploaded` once every upload has been attempted,
/// whether or not each one succeeded; this report says which did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadReport {
    pub dataset_id: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<ObservationUpload>,
    pub completed_at: DateTime<Utc>,
}

fn has_required_fields(observation: &InputObservation) -> bool {
    let is_set = |v: Option<&str>| v.is_some_and(|s| !s.trim().is_empty());
    is_set(observation.latitude())
        && is_set(observation.longitude())
        && observation.date().is_some()
        && observation.time().is_some()
}

pub struct ObservationSession {
    session_id: Uuid,
    fsm: WorkflowFsm,
    observations: ObservationSet,
    author_email: String,
    field_errors: Vec<FieldError>,
    upload_report: Option<UploadReport>,
    event_bus: EventBus,
    created_at: DateTime<Utc>,
}

impl ObservationSession {
    /// `states` must be exactly the controller's stage order
    pub fn new(session_id: Uuid, states: &[String], event_bus: EventBus) -> Result<Self, SessionError> {
        WorkflowStage::check_sequence(states)?;
        let fsm = WorkflowFsm::new(states.iter().cloned())?;
        Ok(Self {
            session_id,
            fsm,
            observations: ObservationSet::new(),
            author_email: String::new(),
            field_errors: Vec::new(),
            upload_report: None,
            event_bus,
            created_at: Utc::now(),
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn fsm(&self) -> &WorkflowFsm {
        &self.fsm
    }

    pub fn observations(&self) -> &ObservationSet {
        &self.observations
    }

    pub fn author_email(&self) -> &str {
        &self.author_email
    }

    pub fn field_errors(&self) -> &[FieldError] {
        &self.field_errors
    }

    pub fn upload_report(&self) -> Option<&UploadReport> {
        self.upload_report.as_ref()
    }

    pub fn current_stage(&self) -> WorkflowStage {
        // check_sequence at construction pins index i to ALL[i]
        WorkflowStage::ALL[self.fsm.current_state_index()]
    }

    pub fn view_mode(&self) -> ViewMode {
        self.current_stage().view_mode()
    }

    pub fn progress(&self) -> WorkflowProgress {
        self.fsm.progress()
    }

    /// True while data entry is still open
    pub fn inputs_editable(&self) -> bool {
        !self
            .fsm
            .is_in_state_or_beyond(WorkflowStage::DataEntryValidated.as_str())
            .unwrap_or(true)
    }

    /// Every observation has latitude, longitude, date and time, and the
    /// author email is set; an empty set yields `empty_ok`
    pub fn check_inputs_are_set(&self, empty_ok: bool) -> bool {
        if self.observations.is_empty() {
            return empty_ok;
        }
        if self.author_email.trim().is_empty() {
            return false;
        }
        self.observations.iter().all(has_required_fields)
    }

    /// Hashes of observations still missing a required field
    pub fn incomplete_observations(&self) -> Vec<ImageHash> {
        self.observations
            .iter()
            .filter(|o| !has_required_fields(o))
            .map(|o| o.image_md5().clone())
            .collect()
    }

    /// Close data entry once every input is set
    ///
    /// Called after each data mutation. Returns whether the stage advanced.
    pub fn refresh(&mut self) -> bool {
        if self.current_stage() != WorkflowStage::DoingDataEntry {
            return false;
        }
        if !self.check_inputs_are_set(false) {
            return false;
        }
        self.complete(WorkflowStage::DoingDataEntry).is_some()
    }

    /// Replace the whole file set
    ///
    /// All files are decoded before anything changes; one bad file leaves
    /// the previous set in place. Metadata typed for a hash that is in both
    /// the old and new set is kept.
    pub fn replace_files(
        &mut self,
        uploads: Vec<UploadedImage>,
        metadata: &dyn ImageMetadataReader,
        now: NaiveDateTime,
    ) -> Result<(), SessionError> {
        self.ensure_editable()?;

        let mut built = Vec::with_capacity(uploads.len());
        for upload in uploads {
            built.push(InputObservation::from_upload(upload, &self.author_email, metadata, now)?);
        }
        let mut next = ObservationSet::from_observations(built);
        let carried = next.carry_metadata_from(&self.observations);

        self.field_errors.retain(|e| match &e.image_hash {
            Some(hash) => next.contains(hash.as_str()),
            None => true,
        });
        self.observations = next;

        info!(
            session_id = %self.session_id,
            files = self.observations.len(),
            carried,
            "Observation files replaced"
        );
        self.event_bus.emit(ObservationEvent::FilesProcessed {
            session_id: self.session_id,
            image_hashes: self
                .observations
                .image_hashes()
                .iter()
                .map(ToString::to_string)
                .collect(),
            timestamp: Utc::now(),
        });

        self.refresh();
        Ok(())
    }

    /// Set the session-wide author email; invalid input is recorded and
    /// leaves the email unset
    pub fn set_author_email(&mut self, email: &str) -> Result<(), SessionError> {
        self.ensure_editable()?;
        let email = email.trim();
        self.clear_field_error(None, "author_email");

        let accepted = if email.is_empty() || is_valid_email(email) {
            email
        } else {
            warn!(session_id = %self.session_id, "Invalid email entered: {}", email);
            self.field_errors.push(FieldError {
                image_hash: None,
                field: "author_email",
                value: email.to_string(),
                message: ValidationError::Email.to_string(),
            });
            ""
        };

        self.author_email = accepted.to_string();
        self.observations.for_each_mut(|o| o.set_author_email(accepted));
        self.refresh();
        Ok(())
    }

    /// Apply a partial edit to one observation
    pub fn set_observation_fields(&mut self, image_hash: &str, update: FieldUpdate) -> Result<(), SessionError> {
        self.ensure_editable()?;
        let hash = self
            .observations
            .get(image_hash)
            .map(|o| o.image_md5().clone())
            .ok_or_else(|| SessionError::UnknownObservation(image_hash.to_string()))?;

        if let Some(value) = update.latitude {
            let parsed = self.check_field(&hash, "latitude", &value, |v| {
                is_valid_number(v).then(|| v.to_string()).ok_or(ValidationError::Latitude)
            });
            self.with_observation(&hash, |o| o.set_latitude(parsed));
        }
        if let Some(value) = update.longitude {
            let parsed = self.check_field(&hash, "longitude", &value, |v| {
                is_valid_number(v).then(|| v.to_string()).ok_or(ValidationError::Longitude)
            });
            self.with_observation(&hash, |o| o.set_longitude(parsed));
        }
        if let Some(value) = update.date {
            let parsed = self.check_field(&hash, "date", &value, validation::parse_date);
            self.with_observation(&hash, |o| o.set_date(parsed));
        }
        if let Some(value) = update.time {
            let parsed = self.check_field(&hash, "time", &value, validation::parse_time);
            self.with_observation(&hash, |o| o.set_time(parsed));
        }

        self.refresh();
        Ok(())
    }

    /// Confirm the entered data; only from `data_entry_complete`
    pub fn validate(&mut self) -> Result<StateTransition, SessionError> {
        self.require_stage(WorkflowStage::DataEntryComplete)?;
        if !self.check_inputs_are_set(false) {
            return Err(SessionError::Incomplete);
        }
        self.complete(WorkflowStage::DataEntryComplete)
            .ok_or(SessionError::Incomplete)
    }

    /// Classify every observation, then advance
    ///
    /// Results are applied only once every call has succeeded. On the first
    /// failure or timeout nothing changes and the stage stays put so the
    /// caller can retry.
    pub async fn classify(
        &mut self,
        classifier: &dyn Classifier,
        timeout: Duration,
    ) -> Result<usize, SessionError> {
        self.require_stage(WorkflowStage::DataEntryValidated)?;

        let mut results: Vec<(ImageHash, Vec<String>)> = Vec::with_capacity(self.observations.len());
        for observation in self.observations.iter() {
            let hash = observation.image_md5().clone();
            let ranked = match tokio::time::timeout(timeout, classifier.classify(observation.image())).await {
                Ok(Ok(ranked)) => ranked,
                Ok(Err(source)) => return Err(self.classification_failed(hash, source)),
                Err(_) => {
                    return Err(self.classification_failed(hash, ClassifierError::Timeout(timeout)))
                }
            };
            let labels: Vec<String> = ranked.into_iter().map(|p| p.label).collect();
            debug!(
                session_id = %self.session_id,
                image_hash = %hash,
                top = ?labels.first(),
                "Observation classified"
            );
            results.push((hash, labels));
        }

        let count = results.len();
        for (hash, labels) in results {
            self.with_observation(&hash, |o| o.set_top_predictions(labels));
        }

        info!(session_id = %self.session_id, count, "Classification complete");
        self.event_bus.emit(ObservationEvent::ObservationsClassified {
            session_id: self.session_id,
            count,
            timestamp: Utc::now(),
        });
        self.complete(WorkflowStage::DataEntryValidated);
        Ok(count)
    }

    /// Override (or re-confirm) the species for one observation
    ///
    /// Accepts any catalogued species or any label the classifier returned
    /// for this observation.
    pub fn select_class(&mut self, image_hash: &str, label: &str) -> Result<(), SessionError> {
        self.require_stage(WorkflowStage::MlClassificationCompleted)?;
        let observation = self
            .observations
            .get_mut(image_hash)
            .ok_or_else(|| SessionError::UnknownObservation(image_hash.to_string()))?;

        let offered = observation.top_predictions().iter().any(|p| p == label);
        if !offered && !species::is_known(label) {
            return Err(SessionError::UnknownSpecies(label.to_string()));
        }

        observation.set_selected_class(label);
        info!(
            session_id = %self.session_id,
            image_hash = %image_hash,
            selected_class = %label,
            overridden = observation.class_overriden(),
            "Species selected"
        );
        Ok(())
    }

    /// Manual review checkpoint; never taken automatically
    pub fn confirm_review(&mut self) -> Result<StateTransition, SessionError> {
        self.require_stage(WorkflowStage::MlClassificationCompleted)?;
        self.complete(WorkflowStage::MlClassificationCompleted)
            .ok_or(SessionError::InvalidStage {
                expected: WorkflowStage::MlClassificationCompleted,
                actual: self.current_stage(),
            })
    }

    /// Write every observation to the dataset, one independent write each
    ///
    /// A failed write is logged and recorded; it does not stop the rest.
    /// The session advances to `data_uploaded` once all were attempted.
    pub async fn upload_all(
        &mut self,
        store: &dyn DatasetStore,
        dataset_id: &str,
        timeout: Duration,
    ) -> Result<UploadReport, SessionError> {
        self.require_stage(WorkflowStage::ManualInspectionCompleted)?;

        let mut items = Vec::with_capacity(self.observations.len());
        for observation in self.observations.iter() {
            let image_hash = observation.image_md5().clone();
            let path = observation_path(observation.author_email(), &image_hash);

            let result = match serde_json::to_vec(&observation.to_record()) {
                Ok(content) => {
                    info!(
                        session_id = %self.session_id,
                        image_hash = %image_hash,
                        path = %path,
                        "Uploading observation"
                    );
                    match tokio::time::timeout(timeout, store.upload(content, &path, dataset_id)).await {
                        Ok(result) => result,
                        Err(_) => Err(DatasetError::Timeout(timeout)),
                    }
                }
                Err(e) => Err(DatasetError::Parse(e.to_string())),
            };

            let outcome = match result {
                Ok(commit) => {
                    info!(
                        image_hash = %image_hash,
                        path = %path,
                        commit = %commit.commit_oid,
                        "Observation uploaded"
                    );
                    self.event_bus.emit(ObservationEvent::ObservationUploaded {
                        session_id: self.session_id,
                        image_hash: image_hash.to_string(),
                        path: path.clone(),
                        timestamp: Utc::now(),
                    });
                    UploadOutcome::Uploaded { path, commit }
                }
                Err(e) => {
                    error!(
                        session_id = %self.session_id,
                        image_hash = %image_hash,
                        path = %path,
                        error = %e,
                        "Observation upload failed"
                    );
                    self.event_bus.emit(ObservationEvent::UploadFailed {
                        session_id: self.session_id,
                        image_hash: image_hash.to_string(),
                        path: path.clone(),
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    UploadOutcome::Failed {
                        path,
                        error: e.to_string(),
                    }
                }
            };
            items.push(ObservationUpload { image_hash, outcome });
        }

        let succeeded = items.iter().filter(|i| i.outcome.is_success()).count();
        let report = UploadReport {
            dataset_id: dataset_id.to_string(),
            attempted: items.len(),
            succeeded,
            failed: items.len() - succeeded,
            items,
            completed_at: Utc::now(),
        };
        if report.failed > 0 {
            warn!(
                session_id = %self.session_id,
                failed = report.failed,
                attempted = report.attempted,
                "Some observations failed to upload"
            );
        }

        self.upload_report = Some(report.clone());
        self.complete(WorkflowStage::ManualInspectionCompleted);
        Ok(report)
    }

    /// Start over: drop all observations, keep the author email
    pub fn reset(&mut self) {
        self.observations = ObservationSet::new();
        self.field_errors.retain(|e| e.image_hash.is_none());
        self.upload_report = None;
        if let Some(transition) = self.fsm.reset() {
            self.publish_transition(&transition);
        }
        info!(session_id = %self.session_id, "Session reset");
    }

    fn ensure_editable(&self) -> Result<(), SessionError> {
        if self.inputs_editable() {
            Ok(())
        } else {
            Err(SessionError::InputsLocked(self.current_stage()))
        }
    }

    fn require_stage(&self, expected: WorkflowStage) -> Result<(), SessionError> {
        let actual = self.current_stage();
        if actual == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidStage { expected, actual })
        }
    }

    /// Guarded completion of `stage`; publishes the transition taken
    fn complete(&mut self, stage: WorkflowStage) -> Option<StateTransition> {
        let transition = match self.fsm.complete_state(stage.as_str()) {
            Ok(transition) => transition?,
            Err(e) => {
                // Unreachable with a checked sequence
                error!(session_id = %self.session_id, error = %e, "Workflow misconfigured");
                return None;
            }
        };
        self.publish_transition(&transition);
        Some(transition)
    }

    fn publish_transition(&self, transition: &StateTransition) {
        self.event_bus.emit(ObservationEvent::StateChanged {
            session_id: self.session_id,
            from: transition.from.clone(),
            to: transition.to.clone(),
            timestamp: transition.transitioned_at,
        });
    }

    fn classification_failed(&self, image_hash: ImageHash, source: ClassifierError) -> SessionError {
        error!(
            session_id = %self.session_id,
            image_hash = %image_hash,
            error = %source,
            "Classification failed; stage unchanged"
        );
        SessionError::Classification { image_hash, source }
    }

    fn with_observation(&mut self, hash: &ImageHash, f: impl FnOnce(&mut InputObservation)) {
        if let Some(observation) = self.observations.get_mut(hash.as_str()) {
            f(observation);
        }
    }

    fn clear_field_error(&mut self, image_hash: Option<&ImageHash>, field: &str) {
        self.field_errors
            .retain(|e| !(e.image_hash.as_ref() == image_hash && e.field == field));
    }

    /// Blank clears; invalid is recorded and clears
    fn check_field<T>(
        &mut self,
        hash: &ImageHash,
        field: &'static str,
        value: &str,
        parse: impl FnOnce(&str) -> Result<T, ValidationError>,
    ) -> Option<T> {
        self.clear_field_error(Some(hash), field);
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        match parse(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(image_hash = %hash, "Invalid {} entered: {}", field, value);
                self.field_errors.push(FieldError {
                    image_hash: Some(hash.clone()),
                    field,
                    value: value.to_string(),
                    message: e.to_string(),
                });
                None
            }
        }
    }
}

impl std::fmt::Debug for ObservationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationSession")
            .field("session_id", &self.session_id)
            .field("stage", &self.current_stage())
            .field("observations", &self.observations.len())
            .finish()
    }
}
