use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Prompt printed before each command line when stdin is a terminal
    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Number of command lines kept for the `history` builtin
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Run jobs in their own process groups and manage the terminal.
    /// Only takes effect when stdin is a terminal.
    #[serde(default = "default_true")]
    pub job_control: bool,

    /// Print a description when a foreground job is killed by a signal
    /// (SIGINT and SIGPIPE are never reported)
    #[serde(default = "default_true")]
    pub report_signals: bool,
}

fn default_prompt() -> String {
    "jsh> ".to_string()
}

fn default_history_size() -> usize {
    500
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            history_size: default_history_size(),
            job_control: true,
            report_signals: true,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config =
            serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = self.to_json()?;
        std::fs::write(path.as_ref(), contents).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// The configuration as pretty-printed JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prompt.is_empty() {
            return Err(ConfigError::ValidationError(
                "prompt cannot be empty".to_string(),
            ));
        }

        if self.history_size == 0 {
            return Err(ConfigError::ValidationError(
                "history_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(msg) => write!(f, "IO error: {msg}"),
            ConfigError::ParseError(msg) => write!(f, "Parse error: {msg}"),
            ConfigError::SerializeError(msg) => write!(f, "Serialize error: {msg}"),
            ConfigError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.prompt, "jsh> ");
        assert_eq!(config.history_size, 500);
        assert!(config.job_control);
        assert!(config.report_signals);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.history_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = Config::default();
        config.prompt.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let config = Config {
            prompt: "$ ".to_string(),
            report_signals: false,
            ..Config::default()
        };
        config.save_to_file(&config_path).unwrap();

        let loaded = Config::load_from_file(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_fills_in_defaults() {
        let json = r#"{ "prompt": "% " }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.prompt, "% ");
        assert_eq!(config.history_size, 500);
        assert!(config.job_control);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.json");
        std::fs::write(&config_path, r#"{ "history_size": 0 }"#).unwrap();

        let err = Config::load_from_file(&config_path).unwrap_err();
        assert!(err.to_string().starts_with("Validation error"));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.json");
        std::fs::write(&config_path, "{ not json").unwrap();

        assert!(matches!(
            Config::load_from_file(&config_path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
