//! Stage names driven by the session controller, and the view mode each selects

use serde::{Deserialize, Serialize};
use sw_common::config::DEFAULT_WORKFLOW_STATES;

use super::WorkflowError;

/// Stages the session controller knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    DoingDataEntry,
    DataEntryComplete,
    DataEntryValidated,
    MlClassificationCompleted,
    ManualInspectionCompleted,
    DataUploaded,
}

/// What the view layer should present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    AwaitingDataEntry,
    ReadyToValidate,
    ReadyToClassify,
    ReviewingResults,
    ReadyToUpload,
    Uploaded,
}

impl WorkflowStage {
    /// Controller order; matches [`DEFAULT_WORKFLOW_STATES`]
    pub const ALL: [WorkflowStage; 6] = [
        WorkflowStage::DoingDataEntry,
        WorkflowStage::DataEntryComplete,
        WorkflowStage::DataEntryValidated,
        WorkflowStage::MlClassificationCompleted,
        WorkflowStage::ManualInspectionCompleted,
        WorkflowStage::DataUploaded,
    ];

    pub fn as_str(self) -> &'static str {
        DEFAULT_WORKFLOW_STATES[self as usize]
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == name)
    }

    pub fn view_mode(self) -> ViewMode {
        match self {
            WorkflowStage::DoingDataEntry => ViewMode::AwaitingDataEntry,
            WorkflowStage::DataEntryComplete => ViewMode::ReadyToValidate,
            WorkflowStage::DataEntryValidated => ViewMode::ReadyToClassify,
            WorkflowStage::MlClassificationCompleted => ViewMode::ReviewingResults,
            WorkflowStage::ManualInspectionCompleted => ViewMode::ReadyToUpload,
            WorkflowStage::DataUploaded => ViewMode::Uploaded,
        }
    }

    /// Check a configured sequence is exactly the controller's stage order
    pub fn check_sequence(states: &[String]) -> Result<(), WorkflowError> {
        for (i, state) in states.iter().enumerate() {
            match Self::from_name(state) {
                Some(stage) if stage as usize == i => {}
                _ => return Err(WorkflowError::UnexpectedState(state.clone())),
            }
        }
        if states.len() != Self::ALL.len() {
            let missing = Self::ALL[states.len().min(Self::ALL.len() - 1)];
            return Err(WorkflowError::MissingState(missing.as_str().to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
