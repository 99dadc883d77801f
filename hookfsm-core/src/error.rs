//! Core error types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Error raised by a host capability (a hook observer or the persistence layer).
///
/// The engine never wraps or rewrites a rejection: the value a hook returns is
/// the value the caller receives.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct Rejection {
    /// Human readable message.
    pub message: String,

    /// Optional status code attached by the rejecting hook.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    /// Free-form metadata attached by the rejecting hook.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Rejection {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: None,
            metadata: Map::new(),
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Errors from the state machine engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{model} does not have state machine support")]
    Configuration { model: String },

    #[error("invalid machine definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("Invalid event in current state: cannot apply '{event}' in state '{state}'")]
    InvalidTransition { event: String, state: String },

    #[error("Previous transition pending: {model} {id}")]
    TransitionPending { model: String, id: String },

    #[error("unknown event '{event}' for {model}")]
    UnknownEvent { model: String, event: String },

    #[error("state '{state}' is not declared by any event")]
    InvalidState { state: String },

    #[error(transparent)]
    Hook(Rejection),

    #[error(transparent)]
    Persistence(Rejection),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Returns whether this error indicates the operation can be retried.
    ///
    /// Only a pending transition is retryable; the engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::TransitionPending { .. })
    }

    /// Returns a stable error code suitable for host responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::Configuration { .. } => "CONFIGURATION_ERROR",
            CoreError::InvalidDefinition { .. } => "BAD_DEFINITION",
            CoreError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoreError::TransitionPending { .. } => "TRANSITION_PENDING",
            CoreError::UnknownEvent { .. } => "UNKNOWN_EVENT",
            CoreError::InvalidState { .. } => "INVALID_STATE",
            CoreError::Hook(_) => "HOOK_REJECTED",
            CoreError::Persistence(_) => "PERSISTENCE_ERROR",
            CoreError::Json(_) => "BAD_REQUEST",
        }
    }

    /// Returns the rejection raised by a hook or the store, if any.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            CoreError::Hook(r) | CoreError::Persistence(r) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_messages_match_taxonomy() {
        let err = CoreError::InvalidTransition {
            event: "reactivate".into(),
            state: "active".into(),
        };
        assert!(err.to_string().starts_with("Invalid event in current state"));

        let err = CoreError::TransitionPending {
            model: "Order".into(),
            id: "1".into(),
        };
        assert!(err.to_string().starts_with("Previous transition pending"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_rejection_is_transparent() {
        let rejection = Rejection::new("Disable method is not yet allowed")
            .with_status(405)
            .with_metadata("reason", json!("policy"));
        let err = CoreError::Hook(rejection.clone());

        assert_eq!(err.to_string(), "Disable method is not yet allowed");
        assert_eq!(err.rejection(), Some(&rejection));
        assert_eq!(err.error_code(), "HOOK_REJECTED");
        assert!(!err.is_retryable());
    }
}
