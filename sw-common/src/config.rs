//! Configuration loading and resolution
//!
//! Resolution priority (highest first):
//! 1. Command-line argument (applied by the binary)
//! 2. Environment variable (`SW_*`, `HF_TOKEN`)
//! 3. TOML config file
//! 4. Compiled defaults

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default ordered workflow stages for the observation ingest flow
pub const DEFAULT_WORKFLOW_STATES: [&str; 6] = [
    "doing_data_entry",
    "data_entry_complete",
    "data_entry_validated",
    "ml_classification_completed",
    "manual_inspection_completed",
    "data_uploaded",
];

const CONFIG_DIR_NAME: &str = "saving-willy";
const CONFIG_FILE_NAME: &str = "sw-ingest.toml";

/// Service configuration as read from `sw-ingest.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Socket address the HTTP server binds to
    pub bind_address: String,
    /// Hugging Face access token (classifier + dataset)
    pub hf_token: Option<String>,
    pub logging: LoggingConfig,
    pub workflow: WorkflowConfig,
    pub classifier: ClassifierConfig,
    pub dataset: DatasetConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub level: String,
    /// Number of records kept for the log page
    pub buffer_len: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Ordered, unique stage names
    pub states: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Inference endpoint receiving raw image bytes
    pub endpoint: String,
    /// Timeout applied to each classification call
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Dataset repository, e.g. `Saving-Willy/temp_dataset`
    pub dataset_id: String,
    /// Hub base URL
    pub endpoint: String,
    /// Timeout applied to each store call
    pub timeout_secs: u64,
    /// When false, observations are written to an in-process store only
    pub enable_push: bool,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5731".to_string(),
            hf_token: None,
            logging: LoggingConfig::default(),
            workflow: WorkflowConfig::default(),
            classifier: ClassifierConfig::default(),
            dataset: DatasetConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "sw_ingest=debug,sw_common=info,tower_http=info".to_string(),
            buffer_len: 40,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            states: DEFAULT_WORKFLOW_STATES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api-inference.huggingface.co/models/Saving-Willy/cetacean-classifier"
                .to_string(),
            timeout_secs: 60,
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            dataset_id: "Saving-Willy/temp_dataset".to_string(),
            endpoint: "https://huggingface.co".to_string(),
            timeout_secs: 30,
            enable_push: false,
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DatasetConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl TomlConfig {
    /// Apply `SW_*` / `HF_TOKEN` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    ///
    /// Blank values are ignored so an exported-but-empty variable does not
    /// wipe a TOML setting.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = get("SW_BIND_ADDRESS") {
            self.bind_address = addr;
        }
        if let Some(token) = get("HF_TOKEN") {
            self.hf_token = Some(token);
        }
        if let Some(id) = get("SW_DATASET_ID") {
            self.dataset.dataset_id = id;
        }
        if let Some(endpoint) = get("SW_CLASSIFIER_ENDPOINT") {
            self.classifier.endpoint = endpoint;
        }
        if let Some(flag) = get("SW_ENABLE_PUSH") {
            self.dataset.enable_push = parse_bool("SW_ENABLE_PUSH", &flag)?;
        }
        if let Some(states) = get("SW_WORKFLOW_STATES") {
            self.workflow.states = states
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        Ok(())
    }

    /// Reject configurations the service cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.workflow.states.is_empty() {
            return Err(Error::Config("workflow.states must not be empty".to_string()));
        }
        let mut seen = HashSet::new();
        for state in &self.workflow.states {
            if !seen.insert(state.as_str()) {
                return Err(Error::Config(format!(
                    "workflow.states contains duplicate state '{}'",
                    state
                )));
            }
        }
        if self.classifier.timeout_secs == 0 || self.dataset.timeout_secs == 0 {
            return Err(Error::Config("timeouts must be at least one second".to_string()));
        }
        if self.dataset.dataset_id.trim().is_empty() {
            return Err(Error::Config("dataset.dataset_id must be set".to_string()));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{} must be a boolean, got '{}'", key, other))),
    }
}

/// Platform config file location (`~/.config/saving-willy/sw-ingest.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Resolve the TOML layer of the configuration
///
/// An explicitly requested file must exist. Otherwise the platform default
/// location is used when present, falling back to compiled defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        tracing::info!(path = %path.display(), "Loading configuration file");
        return load_toml_config(path);
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            tracing::info!(path = %path.display(), "Loading configuration file");
            load_toml_config(&path)
        }
        _ => {
            tracing::info!("No configuration file found, using defaults");
            Ok(TomlConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = TomlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.workflow.states.len(), 6);
        assert_eq!(config.workflow.states[0], "doing_data_entry");
        assert!(!config.dataset.enable_push);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            bind_address = "0.0.0.0:9000"

            [dataset]
            dataset_id = "Saving-Willy/main_dataset"
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_address, "0.0.0.0:9000");
        assert_eq!(config.dataset.dataset_id, "Saving-Willy/main_dataset");
        assert_eq!(config.dataset.timeout_secs, 30);
        assert_eq!(config.logging.buffer_len, 40);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("HF_TOKEN", "hf_secret"),
            ("SW_ENABLE_PUSH", "true"),
            ("SW_WORKFLOW_STATES", "a, b ,c"),
            ("SW_DATASET_ID", "   "),
        ]
        .into_iter()
        .collect();

        let mut config = TomlConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.hf_token.as_deref(), Some("hf_secret"));
        assert!(config.dataset.enable_push);
        assert_eq!(config.workflow.states, vec!["a", "b", "c"]);
        // Blank value ignored
        assert_eq!(config.dataset.dataset_id, "Saving-Willy/temp_dataset");
    }

    #[test]
    #[serial_test::serial]
    fn test_process_env_overrides() {
        std::env::set_var("SW_BIND_ADDRESS", "0.0.0.0:8123");
        std::env::remove_var("SW_WORKFLOW_STATES");
        let mut config = TomlConfig::default();
        let result = config.apply_env_overrides();
        std::env::remove_var("SW_BIND_ADDRESS");

        assert!(result.is_ok());
        assert_eq!(config.bind_address, "0.0.0.0:8123");
        assert_eq!(config.workflow.states.len(), 6);
    }

    #[test]
    fn test_bad_bool_rejected() {
        let mut config = TomlConfig::default();
        let result = config.apply_overrides(|k| {
            (k == "SW_ENABLE_PUSH").then(|| "maybe".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_states() {
        let mut config = TomlConfig::default();
        config.workflow.states = vec!["a".into(), "b".into(), "a".into()];
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.workflow.states.clear();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sw-ingest.toml");
        std::fs::write(
            &path,
            "[classifier]\nendpoint = \"http://localhost:8080/classify\"\ntimeout_secs = 5\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.classifier.endpoint, "http://localhost:8080/classify");
        assert_eq!(config.classifier.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_config_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(Some(&dir.path().join("nope.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_config_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "bind_address = [").unwrap();
        assert!(matches!(load_config(Some(&path)), Err(Error::Config(_))));
    }
}
