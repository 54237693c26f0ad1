//! Observation workflow: generic stage machine plus the controller's stage table

pub mod fsm;
pub mod stage;

pub use fsm::{StateTransition, WorkflowError, WorkflowFsm, WorkflowProgress};
pub use stage::{ViewMode, WorkflowStage};
