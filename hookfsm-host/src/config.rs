//! Model configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via HOOKFSM_CONFIG or --config)
//! 3. Environment variables

use hookfsm_core::{EventDefinition, TransitionTable, DEFAULT_STATE_FIELD};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default prefix of observer hook names.
pub const DEFAULT_OBSERVER_PREFIX: &str = "fsm:";

/// Host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Settings applied to every model unless the model overrides them.
    pub defaults: Defaults,
    /// Models with state machine support.
    pub models: Vec<ModelConfig>,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("HOOKFSM_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content)
            .map_err(|e| ConfigError::ParseError(PathBuf::from("<inline>"), e.to_string()))
    }

    /// Applies environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.defaults.apply_env_overrides();
    }

    /// Checks model names and event lists.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for model in &self.models {
            if model.name.is_empty() {
                return Err(ConfigError::ValidationError(
                    "model with an empty name".to_string(),
                ));
            }
            if !seen.insert(model.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "model '{}' is declared twice",
                    model.name
                )));
            }
            if model.events.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "model '{}' declares no events",
                    model.name
                )));
            }
        }
        Ok(())
    }

    /// Returns the configuration of a model.
    pub fn model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Settings shared by every model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Name of the persisted state field.
    pub state_field: String,
    /// Allow forcing every event.
    pub allow_force: bool,
    /// Prefix of observer hook names.
    pub observer_prefix: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            state_field: DEFAULT_STATE_FIELD.to_string(),
            allow_force: false,
            observer_prefix: DEFAULT_OBSERVER_PREFIX.to_string(),
        }
    }
}

impl Defaults {
    fn apply_env_overrides(&mut self) {
        if let Ok(field) = std::env::var("HOOKFSM_STATE_FIELD") {
            if !field.is_empty() {
                self.state_field = field;
            }
        }

        if let Ok(force) = std::env::var("HOOKFSM_ALLOW_FORCE") {
            self.allow_force = force == "1" || force.to_lowercase() == "true";
        }

        if let Ok(prefix) = std::env::var("HOOKFSM_OBSERVER_PREFIX") {
            self.observer_prefix = prefix;
        }
    }
}

/// A model with state machine support.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name.
    pub name: String,
    /// Overrides `defaults.state_field`.
    #[serde(default, alias = "stateProperty", skip_serializing_if = "Option::is_none")]
    pub state_field: Option<String>,
    /// Overrides `defaults.allow_force`.
    #[serde(default, alias = "allowForce", skip_serializing_if = "Option::is_none")]
    pub allow_force: Option<bool>,
    /// Declared events.
    pub events: Vec<EventDefinition>,
}

impl ModelConfig {
    pub fn state_field<'a>(&'a self, defaults: &'a Defaults) -> &'a str {
        self.state_field.as_deref().unwrap_or(&defaults.state_field)
    }

    pub fn allow_force(&self, defaults: &Defaults) -> bool {
        self.allow_force.unwrap_or(defaults.allow_force)
    }

    /// Compiles the event list.
    pub fn compile(&self) -> Result<TransitionTable, hookfsm_core::CoreError> {
        TransitionTable::compile(self.events.clone())
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
