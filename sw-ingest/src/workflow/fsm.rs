//! Linear workflow state machine
//!
//! The machine is configured with an ordered list of unique stage names and
//! only ever moves forward one stage at a time. The only way back is an
//! explicit [`WorkflowFsm::reset`] to the first stage.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

/// Configuration and lookup errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("Workflow state sequence is empty")]
    EmptySequence,

    #[error("Duplicate workflow state: {0}")]
    DuplicateState(String),

    #[error("Unknown workflow state: {0}")]
    UnknownState(String),

    /// Configured sequence lacks a stage the controller drives
    #[error("Workflow state sequence is missing stage: {0}")]
    MissingState(String),

    /// Configured sequence has a stage the controller cannot drive, or out of order
    #[error("Unexpected workflow state in sequence: {0}")]
    UnexpectedState(String),
}

/// Record of a single transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateTransition {
    pub from: String,
    pub to: String,
    pub from_index: usize,
    pub to_index: usize,
    pub transitioned_at: DateTime<Utc>,
}

/// Position within the workflow, for progress display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowProgress {
    /// 0-based index of the current state
    pub index: usize,
    /// Index of the terminal state (`num_states - 1`)
    pub total: usize,
    pub state: String,
}

#[derive(Debug, Clone)]
pub struct WorkflowFsm {
    states: Vec<String>,
    index: HashMap<String, usize>,
    current: usize,
}

impl WorkflowFsm {
    /// Build a machine over `states`, starting at the first entry
    pub fn new<I, S>(states: I) -> Result<Self, WorkflowError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let states: Vec<String> = states.into_iter().map(Into::into).collect();
        if states.is_empty() {
            return Err(WorkflowError::EmptySequence);
        }

        let mut index = HashMap::with_capacity(states.len());
        for (i, state) in states.iter().enumerate() {
            if index.insert(state.clone(), i).is_some() {
                return Err(WorkflowError::DuplicateState(state.clone()));
            }
        }

        Ok(Self {
            states,
            index,
            current: 0,
        })
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn current_state(&self) -> &str {
        &self.states[self.current]
    }

    pub fn current_state_index(&self) -> usize {
        self.current
    }

    pub fn is_terminal(&self) -> bool {
        self.current + 1 == self.states.len()
    }

    /// Position of `name` in the configured sequence
    pub fn index_of(&self, name: &str) -> Result<usize, WorkflowError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| WorkflowError::UnknownState(name.to_string()))
    }

    pub fn is_in_state(&self, name: &str) -> Result<bool, WorkflowError> {
        Ok(self.index_of(name)? == self.current)
    }

    /// True when the current state is `name` or any later state
    pub fn is_in_state_or_beyond(&self, name: &str) -> Result<bool, WorkflowError> {
        Ok(self.current >= self.index_of(name)?)
    }

    /// Advance one step, returning the transition taken
    ///
    /// Returns `None` without changing anything at the terminal state.
    pub fn advance(&mut self) -> Option<StateTransition> {
        if self.is_terminal() {
            tracing::debug!(state = %self.current_state(), "[FSM] Already at final state");
            return None;
        }

        let from_index = self.current;
        let to_index = from_index + 1;
        info!(
            from = %self.states[from_index],
            "[FSM] -> Transitioning from {}", self.states[from_index]
        );
        self.current = to_index;
        info!(
            to = %self.states[to_index],
            "[FSM] -| Transitioned to {}", self.states[to_index]
        );

        Some(StateTransition {
            from: self.states[from_index].clone(),
            to: self.states[to_index].clone(),
            from_index,
            to_index,
            transitioned_at: Utc::now(),
        })
    }

    /// Complete whatever state the machine is in
    ///
    /// `true` if the machine moved; `false` (no change) at the terminal state.
    pub fn complete_current_state(&mut self) -> bool {
        self.advance().is_some()
    }

    /// Complete `name`, but only if it is the current state
    pub fn complete_state(&mut self, name: &str) -> Result<Option<StateTransition>, WorkflowError> {
        if !self.is_in_state(name)? {
            tracing::debug!(
                expected = %name,
                actual = %self.current_state(),
                "[FSM] Completion ignored, not in expected state"
            );
            return Ok(None);
        }
        Ok(self.advance())
    }

    /// Return to the first state
    pub fn reset(&mut self) -> Option<StateTransition> {
        if self.current == 0 {
            return None;
        }
        let from_index = self.current;
        info!(from = %self.states[from_index], "[FSM] Resetting workflow");
        self.current = 0;
        Some(StateTransition {
            from: self.states[from_index].clone(),
            to: self.states[0].clone(),
            from_index,
            to_index: 0,
            transitioned_at: Utc::now(),
        })
    }

    pub fn progress(&self) -> WorkflowProgress {
        WorkflowProgress {
            index: self.current,
            total: self.states.len() - 1,
            state: self.current_state().to_string(),
        }
    }
}
