//! # hookfsm-host
//!
//! Host wiring for hookfsm.
//!
//! This crate provides:
//! - YAML model configuration with environment overrides
//! - A named observer bus implementing the engine's hook resolver
//! - `Host`, which compiles configured models and binds them to a store

pub mod config;
pub mod error;
pub mod host;
pub mod observers;

pub use config::{Config, ConfigError, Defaults, ModelConfig, DEFAULT_OBSERVER_PREFIX};
pub use error::HostError;
pub use host::{Host, ModelDescription};
pub use observers::{Observer, ObserverBus, ObserverFuture};
