//! Session rendering
//!
//! [`render`] is a pure projection of an [`ObservationSession`]: the HTTP
//! layer calls it after every action and returns the result, so what a
//! client sees always follows from the current stage.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{ImageHash, InputObservation, DATE_FORMAT, TIME_FORMAT};
use crate::session::{FieldError, ObservationSession, UploadReport};
use crate::species::{self, format_whale_name};
use crate::workflow::{ViewMode, WorkflowProgress, WorkflowStage};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ActionState {
    Hidden,
    Disabled { reason: &'static str },
    Enabled,
}

impl ActionState {
    pub fn is_enabled(&self) -> bool {
        matches!(self, ActionState::Enabled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Actions {
    pub edit_inputs: ActionState,
    pub validate: ActionState,
    pub classify: ActionState,
    pub select_class: ActionState,
    pub confirm: ActionState,
    pub upload: ActionState,
    pub reset: ActionState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionView {
    /// 1-based
    pub rank: usize,
    pub label: String,
    pub display_name: String,
    pub reference_url: Option<&'static str>,
    pub reference_image: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationView {
    pub image_hash: ImageHash,
    pub image_filename: String,
    pub width: u32,
    pub height: u32,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub image_datetime_raw: Option<String>,
    /// A required field is missing
    pub incomplete: bool,
    pub predictions: Vec<PredictionView>,
    pub selected_class: Option<String>,
    pub class_overriden: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub stage: WorkflowStage,
    pub view_mode: ViewMode,
    pub progress: WorkflowProgress,
    pub message: &'static str,
    pub author_email: String,
    pub inputs_complete: bool,
    pub observations: Vec<ObservationView>,
    pub field_errors: Vec<FieldError>,
    pub actions: Actions,
    pub upload_report: Option<UploadReport>,
}

pub fn render(session: &ObservationSession) -> SessionView {
    let mode = session.view_mode();
    let inputs_complete = session.check_inputs_are_set(false);
    let incomplete = session.incomplete_observations();
    let show_results = matches!(
        mode,
        ViewMode::ReviewingResults | ViewMode::ReadyToUpload | ViewMode::Uploaded
    );

    let observations = session
        .observations()
        .iter()
        .map(|o| observation_view(o, incomplete.contains(o.image_md5()), show_results))
        .collect();

    SessionView {
        session_id: session.session_id(),
        created_at: session.created_at(),
        stage: session.current_stage(),
        view_mode: mode,
        progress: session.progress(),
        message: message(mode, session.observations().is_empty()),
        author_email: session.author_email().to_string(),
        inputs_complete,
        observations,
        field_errors: session.field_errors().to_vec(),
        actions: actions(mode, inputs_complete),
        upload_report: session.upload_report().cloned(),
    }
}

fn observation_view(o: &InputObservation, incomplete: bool, show_results: bool) -> ObservationView {
    let predictions = if show_results {
        o.top_predictions()
            .iter()
            .enumerate()
            .map(|(i, label)| prediction_view(i + 1, label))
            .collect()
    } else {
        Vec::new()
    };

    ObservationView {
        image_hash: o.image_md5().clone(),
        image_filename: o.uploaded_filename().to_string(),
        width: o.image().width(),
        height: o.image().height(),
        latitude: o.latitude().map(str::to_string),
        longitude: o.longitude().map(str::to_string),
        date: o.date().map(|d| d.format(DATE_FORMAT).to_string()),
        time: o.time().map(|t| t.format(TIME_FORMAT).to_string()),
        image_datetime_raw: o.image_datetime_raw().map(str::to_string),
        incomplete,
        predictions,
        selected_class: if show_results {
            o.selected_class().map(str::to_string)
        } else {
            None
        },
        class_overriden: show_results && o.class_overriden(),
    }
}

fn prediction_view(rank: usize, label: &str) -> PredictionView {
    let entry = species::find(label);
    PredictionView {
        rank,
        label: label.to_string(),
        display_name: format_whale_name(label),
        reference_url: entry.map(|s| s.reference_url),
        reference_image: entry.map(|s| s.image),
    }
}

fn message(mode: ViewMode, no_files: bool) -> &'static str {
    match mode {
        ViewMode::AwaitingDataEntry if no_files => "Upload one or more images to begin.",
        ViewMode::AwaitingDataEntry => "Fill in location, date, time and author email for every image.",
        ViewMode::ReadyToValidate => "All inputs set. Validate to continue.",
        ViewMode::ReadyToClassify => "Run the classifier to identify the species.",
        ViewMode::ReviewingResults => {
            "Review the top predictions; override the species if needed, then confirm."
        }
        ViewMode::ReadyToUpload => "Ready to upload the observations.",
        ViewMode::Uploaded => "Observations uploaded. Reset to start a new batch.",
    }
}

fn actions(mode: ViewMode, inputs_complete: bool) -> Actions {
    use ActionState::{Disabled, Enabled, Hidden};

    let editing = matches!(mode, ViewMode::AwaitingDataEntry | ViewMode::ReadyToValidate);
    let validate = match mode {
        ViewMode::ReadyToValidate if inputs_complete => Enabled,
        ViewMode::AwaitingDataEntry | ViewMode::ReadyToValidate => Disabled {
            reason: "Fill in all required fields first",
        },
        _ => Hidden,
    };
    let classify = match mode {
        ViewMode::ReadyToClassify => Enabled,
        _ if editing => Disabled {
            reason: "Validate data entry first",
        },
        _ => Hidden,
    };
    let reviewing = if mode == ViewMode::ReviewingResults {
        Enabled
    } else {
        Hidden
    };

    Actions {
        edit_inputs: if editing {
            Enabled
        } else {
            Disabled {
                reason: "Inputs are locked after validation",
            }
        },
        validate,
        classify,
        select_class: reviewing.clone(),
        confirm: reviewing,
        upload: if mode == ViewMode::ReadyToUpload {
            Enabled
        } else {
            Hidden
        },
        reset: Enabled,
    }
}
