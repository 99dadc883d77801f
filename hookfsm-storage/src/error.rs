//! Storage error types.

use hookfsm_core::Rejection;
use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("entity not found: {model} {id}")]
    EntityNotFound { model: String, id: String },

    #[error("entity already exists: {model} {id}")]
    EntityExists { model: String, id: String },

    #[error("entity has not been saved: {model}")]
    Unsaved { model: String },

    #[error("invalid value for {model}.{field}: '{value}'")]
    InvalidState {
        model: String,
        field: String,
        value: String,
    },
}

impl StorageError {
    /// Returns an HTTP-style status code for the error.
    pub fn status_code(&self) -> u16 {
        match self {
            StorageError::EntityNotFound { .. } | StorageError::Unsaved { .. } => 404,
            StorageError::EntityExists { .. } => 409,
            StorageError::InvalidState { .. } => 422,
        }
    }
}

impl From<StorageError> for Rejection {
    fn from(e: StorageError) -> Self {
        let status = e.status_code();
        Rejection::new(e.to_string()).with_status(status)
    }
}
