//! Startup configuration checks

use sw_common::config::{TomlConfig, DEFAULT_WORKFLOW_STATES};
use sw_ingest::check_workflow_config;
use sw_ingest::workflow::WorkflowError;

#[test]
fn test_default_states_accepted() {
    let config = TomlConfig::default();
    assert!(config.validate().is_ok());
    assert!(check_workflow_config(&config).is_ok());
}

#[test]
fn test_foreign_states_rejected_at_startup() {
    let mut config = TomlConfig::default();
    config
        .apply_overrides(|k| (k == "SW_WORKFLOW_STATES").then(|| "init,entered,done".to_string()))
        .unwrap();

    // Well-formed, so the generic check passes
    assert!(config.validate().is_ok());
    assert_eq!(
        check_workflow_config(&config).unwrap_err(),
        WorkflowError::UnexpectedState("init".to_string())
    );
}

#[test]
fn test_reordered_or_short_states_rejected() {
    let mut config = TomlConfig::default();
    config.workflow.states.swap(3, 4);
    assert!(check_workflow_config(&config).is_err());

    config.workflow.states = DEFAULT_WORKFLOW_STATES[..5].iter().map(|s| s.to_string()).collect();
    assert_eq!(
        check_workflow_config(&config).unwrap_err(),
        WorkflowError::MissingState("data_uploaded".to_string())
    );
}
