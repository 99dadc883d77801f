//! Hook stages, the compiled hook table, and the injected hook resolver.

use crate::context::{ContextPatch, TransitionContext};
use crate::definition::State;
use crate::error::{CoreError, Rejection};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

/// A stage of the transition pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// `onleave<from>`
    LeaveState,
    /// `onleave`
    Leave,
    /// `on<event>`
    Event,
    /// `onenter<to>`
    EnterState,
    /// `onenter`
    Enter,
    /// `onentered<to>`
    EnteredState,
    /// `onentered`
    Entered,
}

impl Stage {
    /// Every stage, in the order the pipeline runs them.
    pub const ORDER: [Stage; 7] = [
        Stage::LeaveState,
        Stage::Leave,
        Stage::Event,
        Stage::EnterState,
        Stage::Enter,
        Stage::EnteredState,
        Stage::Entered,
    ];

    fn prefix(self) -> &'static str {
        match self {
            Stage::LeaveState | Stage::Leave => "onleave",
            Stage::Event => "on",
            Stage::EnterState | Stage::Enter => "onenter",
            Stage::EnteredState | Stage::Entered => "onentered",
        }
    }

    /// Generic stages are not specialised by a state or event name.
    pub fn is_generic(self) -> bool {
        matches!(self, Stage::Leave | Stage::Enter | Stage::Entered)
    }

    fn is_per_state(self) -> bool {
        matches!(
            self,
            Stage::LeaveState | Stage::EnterState | Stage::EnteredState
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self {
            Stage::LeaveState | Stage::EnterState | Stage::EnteredState => "<state>",
            Stage::Event => "<event>",
            _ => "",
        };
        write!(f, "{}{}", self.prefix(), suffix)
    }
}

/// Maps `(stage, state-or-event)` to a hook identifier.
///
/// Built once per model from the declared vocabulary, so dispatch never
/// formats names at call time and never sees an undeclared subject.
#[derive(Debug, Clone)]
pub struct HookTable {
    names: Vec<String>,
    index: HashMap<(Stage, String), usize>,
}

impl HookTable {
    /// Builds the table for the given states and events.
    ///
    /// Fails when two different `(stage, subject)` pairs would produce the same
    /// identifier, e.g. an event named `enteractive` next to a state `active`.
    pub fn build(states: &[State], events: &[String]) -> Result<Self, CoreError> {
        let mut table = Self {
            names: Vec::new(),
            index: HashMap::new(),
        };
        let mut owners: HashMap<String, String> = HashMap::new();

        for stage in Stage::ORDER {
            let subjects: Vec<&str> = if stage.is_generic() {
                vec![""]
            } else if stage.is_per_state() {
                states.iter().map(|s| s.as_str()).collect()
            } else {
                events.iter().map(|e| e.as_str()).collect()
            };

            for subject in subjects {
                let name = format!("{}{}", stage.prefix(), subject);
                let owner = format!("{} '{}'", stage, subject);
                if let Some(existing) = owners.insert(name.clone(), owner.clone()) {
                    return Err(CoreError::InvalidDefinition {
                        reason: format!(
                            "hook name '{}' is ambiguous between {} and {}",
                            name, existing, owner
                        ),
                    });
                }

                table
                    .index
                    .insert((stage, subject.to_string()), table.names.len());
                table.names.push(name);
            }
        }

        Ok(table)
    }

    /// Resolves the hook identifier for a stage. Generic stages ignore `subject`.
    pub fn resolve(&self, stage: Stage, subject: &str) -> Result<&str, CoreError> {
        let subject = if stage.is_generic() { "" } else { subject };
        self.index
            .get(&(stage, subject.to_string()))
            .map(|&idx| self.names[idx].as_str())
            .ok_or_else(|| CoreError::InvalidDefinition {
                reason: format!("no {} hook declared for '{}'", stage, subject),
            })
    }

    /// Returns every hook identifier, grouped by stage in pipeline order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Dispatches a pipeline stage to whatever observers the host has registered.
///
/// Returning an empty [`ContextPatch`] means "no observers, continue".
/// Returning an error aborts the transition with that error, unchanged.
#[async_trait]
pub trait HookResolver: Send + Sync {
    async fn notify(&self, hook: &str, ctx: &TransitionContext) -> Result<ContextPatch, Rejection>;
}

/// Resolver with no observers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopResolver;

#[async_trait]
impl HookResolver for NoopResolver {
    async fn notify(&self, _hook: &str, _ctx: &TransitionContext) -> Result<ContextPatch, Rejection> {
        Ok(ContextPatch::default())
    }
}
