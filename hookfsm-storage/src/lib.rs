//! # hookfsm-storage
//!
//! Storage layer for hookfsm.
//!
//! This crate provides:
//! - An in-memory entity store keyed by model and id
//! - State field validation against each model's declared states
//! - The `Persistence` capability the transition pipeline writes through

pub mod error;
pub mod store;

pub use error::StorageError;
pub use store::{EntityStore, CREATED_AT_FIELD, UPDATED_AT_FIELD};
