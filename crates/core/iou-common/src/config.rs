//! Node configuration
//!
//! Configuration is read from a YAML file named by `IOU_CONFIG_FILE` when it
//! exists, otherwise defaults are used. `IOU_*` environment variables then
//! override individual fields.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;
use crate::result::Result;

/// Environment variable naming the configuration file
pub const CONFIG_FILE_VAR: &str = "IOU_CONFIG_FILE";

/// Settings that govern how flows talk to counterparties and notaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSettings {
    /// Bounded wait for any single counterparty response, in milliseconds
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// How many times session establishment is attempted before giving up
    #[serde(default = "default_session_attempts")]
    pub session_attempts: u32,
    /// Initial backoff between session attempts, doubled after each failure
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Notary to use; the first notary in the directory when unset
    #[serde(default)]
    pub notary: Option<String>,
}

fn default_response_timeout_ms() -> u64 {
    30_000
}

fn default_session_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

impl FlowSettings {
    /// Bounded wait for a counterparty response
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Initial backoff between session attempts
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout_ms(),
            session_attempts: default_session_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            notary: None,
        }
    }
}

/// The issuance the node runner performs on start-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceSettings {
    #[serde(default = "default_lender")]
    pub lender: String,
    #[serde(default = "default_borrower")]
    pub borrower: String,
    #[serde(default = "default_notary")]
    pub notary: String,
    /// Amount owed, in whole currency units
    #[serde(default = "default_amount")]
    pub amount: u64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_lender() -> String {
    "Alice".to_string()
}

fn default_borrower() -> String {
    "Bob".to_string()
}

fn default_notary() -> String {
    "Notary".to_string()
}

fn default_amount() -> u64 {
    100
}

fn default_currency() -> String {
    "GBP".to_string()
}

impl Default for IssuanceSettings {
    fn default() -> Self {
        Self {
            lender: default_lender(),
            borrower: default_borrower(),
            notary: default_notary(),
            amount: default_amount(),
            currency: default_currency(),
        }
    }
}

/// Main node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for daily-rolling log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<String>,
    /// Directory for flow checkpoints; kept in memory when unset
    #[serde(default)]
    pub checkpoint_dir: Option<String>,
    #[serde(default)]
    pub flow: FlowSettings,
    #[serde(default)]
    pub issuance: IssuanceSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: None,
            checkpoint_dir: None,
            flow: FlowSettings::default(),
            issuance: IssuanceSettings::default(),
        }
    }
}

impl NodeConfig {
    /// Load the configuration file (if any), apply environment overrides and validate
    pub fn load() -> Result<Self> {
        let mut config = match env::var(CONFIG_FILE_VAR) {
            Ok(path) if Path::new(&path).exists() => {
                debug!("Loading configuration from {}", path);
                Self::from_file(&path)?
            }
            _ => Self::default(),
        };

        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Apply `IOU_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("IOU_LOG_LEVEL") {
            self.log_level = level;
        }

        if let Some(dir) = lookup("IOU_LOG_DIR") {
            self.log_dir = Some(dir);
        }

        if let Some(dir) = lookup("IOU_CHECKPOINT_DIR") {
            self.checkpoint_dir = Some(dir);
        }

        if let Some(value) = lookup("IOU_RESPONSE_TIMEOUT_MS") {
            self.flow.response_timeout_ms = parse_var("IOU_RESPONSE_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = lookup("IOU_SESSION_ATTEMPTS") {
            self.flow.session_attempts = parse_var("IOU_SESSION_ATTEMPTS", &value)?;
        }

        if let Some(value) = lookup("IOU_RETRY_BACKOFF_MS") {
            self.flow.retry_backoff_ms = parse_var("IOU_RETRY_BACKOFF_MS", &value)?;
        }

        if let Some(notary) = lookup("IOU_NOTARY") {
            self.flow.notary = Some(notary);
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(Error::validation(format!("Invalid log level: {}", other)));
            }
        }

        if self.flow.session_attempts == 0 {
            return Err(Error::validation("session_attempts must be at least 1"));
        }

        if self.flow.response_timeout_ms == 0 {
            return Err(Error::validation("response_timeout_ms must be positive"));
        }

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::configuration(format!("Invalid value for {}: {}", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.flow.response_timeout(), Duration::from_secs(30));
        assert_eq!(config.flow.session_attempts, 3);
        assert_eq!(config.flow.notary, None);
        assert_eq!(config.issuance.lender, "Alice");
        assert_eq!(config.issuance.borrower, "Bob");
        assert_eq!(config.issuance.currency, "GBP");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
log_level: debug
flow:
  response_timeout_ms: 500
  notary: "Notary B"
issuance:
  amount: 250
"#;
        let config = NodeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.flow.response_timeout_ms, 500);
        assert_eq!(config.flow.session_attempts, 3);
        assert_eq!(config.flow.notary.as_deref(), Some("Notary B"));
        assert_eq!(config.issuance.amount, 250);
        assert_eq!(config.issuance.lender, "Alice");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("IOU_LOG_LEVEL", "warn"),
            ("IOU_SESSION_ATTEMPTS", "5"),
            ("IOU_NOTARY", "Notary A"),
        ]
        .into_iter()
        .collect();

        let mut config = NodeConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.log_level, "warn");
        assert_eq!(config.flow.session_attempts, 5);
        assert_eq!(config.flow.notary.as_deref(), Some("Notary A"));
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let mut config = NodeConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "IOU_RESPONSE_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_validation() {
        let mut config = NodeConfig::default();
        config.log_level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.flow.session_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("node.yaml");

        let mut config = NodeConfig::default();
        config.checkpoint_dir = Some("/tmp/checkpoints".to_string());
        fs::write(&config_path, serde_yaml::to_string(&config).unwrap()).unwrap();

        let loaded = NodeConfig::from_file(&config_path).expect("Failed to load config");
        assert_eq!(loaded, config);

        assert!(NodeConfig::from_file(temp_dir.path().join("missing.yaml")).is_err());
    }
}
