//! Host error types.

use crate::config::ConfigError;
use thiserror::Error;

/// Host errors.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] hookfsm_core::CoreError),

    #[error("storage error: {0}")]
    Storage(#[from] hookfsm_storage::StorageError),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("unknown hook '{hook}' for {model}")]
    UnknownHook { model: String, hook: String },
}

impl HostError {
    /// Returns an error code suitable for host responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            HostError::Config(_) => "CONFIGURATION_ERROR",
            HostError::Core(e) => e.error_code(),
            HostError::Storage(_) => "STORAGE_ERROR",
            HostError::UnknownModel(_) => "CONFIGURATION_ERROR",
            HostError::UnknownHook { .. } => "BAD_REQUEST",
        }
    }

    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HostError::Core(e) if e.is_retryable())
    }
}
