//! # hookfsm-core
//!
//! Asynchronous state machine engine for host entities.
//!
//! This crate provides:
//! - Transition table compilation and validation
//! - A compiled hook table per model
//! - A machine registry guarding one in-flight transition per entity
//! - The ordered asynchronous hook pipeline that executes a transition
//! - Per-model event bindings for the host

pub mod binding;
pub mod context;
pub mod definition;
pub mod entity;
pub mod error;
pub mod hooks;
pub mod machine;
pub mod registry;

pub use binding::{EventMethod, ModelBinding};
pub use context::{ContextPatch, TransitionContext};
pub use definition::{
    derive_event_names, derive_states, EventDefinition, EventSettings, Origin, State,
    TransitionTable, WILDCARD,
};
pub use entity::{Entity, Persistence};
pub use error::{CoreError, Rejection};
pub use hooks::{HookResolver, HookTable, NoopResolver, Stage};
pub use machine::{
    CallOptions, Machine, MachineConfig, TransitionResult, DEFAULT_STATE_FIELD, INITIAL_STATE,
};
pub use registry::{MachineKey, MachineLease, MachineRegistry};
