//! Per-model machine configuration and the transition pipeline.

use crate::context::TransitionContext;
use crate::definition::{EventDefinition, State, TransitionTable};
use crate::entity::{Entity, Persistence};
use crate::error::CoreError;
use crate::hooks::{HookResolver, Stage};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Default name of the persisted state field.
pub const DEFAULT_STATE_FIELD: &str = "state";

/// State of an entity whose state field is unset.
pub const INITIAL_STATE: &str = "none";

/// Compiled, immutable configuration shared by every machine of one model.
pub struct MachineConfig {
    model: String,
    table: TransitionTable,
    state_field: String,
    allow_force: bool,
    resolver: Arc<dyn HookResolver>,
    persistence: Arc<dyn Persistence>,
}

impl MachineConfig {
    pub fn new(
        model: impl Into<String>,
        table: TransitionTable,
        resolver: Arc<dyn HookResolver>,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        Self {
            model: model.into(),
            table,
            state_field: DEFAULT_STATE_FIELD.to_string(),
            allow_force: false,
            resolver,
            persistence,
        }
    }

    pub fn with_state_field(mut self, field: impl Into<String>) -> Self {
        self.state_field = field.into();
        self
    }

    /// Allows forcing every event of this model.
    pub fn with_allow_force(mut self, allow: bool) -> Self {
        self.allow_force = allow;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    pub fn state_field(&self) -> &str {
        &self.state_field
    }

    pub fn allow_force(&self) -> bool {
        self.allow_force
    }

    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    /// Reads the current state of an entity through the host, or
    /// [`INITIAL_STATE`] when the field is unset.
    pub fn read_state(&self, entity: &Entity) -> State {
        self.persistence
            .read_state(entity, &self.state_field)
            .unwrap_or_else(|| State::from(INITIAL_STATE))
    }
}

impl fmt::Debug for MachineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineConfig")
            .field("model", &self.model)
            .field("state_field", &self.state_field)
            .field("allow_force", &self.allow_force)
            .field("states", &self.table.states())
            .field("events", &self.table.event_names())
            .finish_non_exhaustive()
    }
}

/// Per-call options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Accept the current state as an origin for this call only, when the
    /// event or model allows forcing.
    pub force: bool,
}

impl CallOptions {
    pub fn forced() -> Self {
        Self { force: true }
    }
}

/// Outcome of a settled transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionResult {
    pub event: String,
    pub from: State,
    pub to: State,

    /// The entity as returned by the store.
    pub entity: Entity,

    /// Hook-provided result, or the stored entity when no hook set one.
    pub result: Value,

    /// True if the origin was accepted only because the call was forced.
    pub forced: bool,
}

/// Runtime state of one entity for the duration of one transition attempt.
///
/// The machine has no state of its own beyond a snapshot of the entity's
/// persisted state field taken when it was created.
#[derive(Debug)]
pub struct Machine {
    config: Arc<MachineConfig>,
    current: State,
    id: Option<String>,
}

impl Machine {
    pub fn new(config: Arc<MachineConfig>, current: State, id: Option<String>) -> Self {
        Self {
            config,
            current,
            id,
        }
    }

    pub fn config(&self) -> &Arc<MachineConfig> {
        &self.config
    }

    pub fn current(&self) -> &State {
        &self.current
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns true if `event` is legal from the current state without forcing.
    pub fn can(&self, event: &str) -> bool {
        self.config.table.lookup(event, &self.current).is_some()
    }

    /// Returns all events legal from the current state.
    pub fn transitions(&self) -> Vec<&str> {
        self.config.table.events_from(&self.current)
    }

    /// Validates `event` against the table.
    ///
    /// Returns the matching definition and, for a forced call, the origin that
    /// was accepted for this call only.
    fn resolve(
        &self,
        event: &str,
        options: CallOptions,
    ) -> Result<(&EventDefinition, Option<State>), CoreError> {
        let table = &self.config.table;
        if !table.has_event(event) {
            return Err(CoreError::UnknownEvent {
                model: self.config.model.clone(),
                event: event.to_string(),
            });
        }

        if let Some(def) = table.lookup(event, &self.current) {
            return Ok((def, None));
        }

        if options.force {
            if let Some(def) = table
                .definitions(event)
                .find(|d| d.settings.allow_force || self.config.allow_force)
            {
                return Ok((def, Some(self.current.clone())));
            }
        }

        Err(CoreError::InvalidTransition {
            event: event.to_string(),
            state: self.current.to_string(),
        })
    }

    async fn notify(
        &self,
        stage: Stage,
        subject: &str,
        ctx: &mut TransitionContext,
    ) -> Result<(), CoreError> {
        let hook = self.config.table.hooks().resolve(stage, subject)?;
        tracing::debug!(model = %self.config.model, hook, event = %ctx.event, "calling hook");

        let patch = self
            .config
            .resolver
            .notify(hook, ctx)
            .await
            .map_err(CoreError::Hook)?;
        ctx.merge(patch);
        Ok(())
    }

    /// Fires `event` on `entity` and drives the hook pipeline to completion.
    ///
    /// Stages run strictly in order, each awaited before the next:
    /// `onleave<from>`, `onleave`, `on<event>`, `onenter<to>`, persist,
    /// `onenter`, `onentered<to>`, `onentered`.
    ///
    /// An error before the persist step leaves the stored state untouched. An
    /// error from `onentered<to>` or `onentered` is returned even though the new
    /// state has already been committed.
    pub async fn fire(
        &self,
        event: &str,
        entity: Entity,
        args: Vec<Value>,
        options: CallOptions,
    ) -> Result<TransitionResult, CoreError> {
        let (def, forced_from) = self.resolve(event, options)?;
        let to = def.to.clone();
        let from = self.current.clone();

        let mut ctx = TransitionContext::new(event, from.clone(), to.clone(), entity);
        ctx.options = def.transition_options.clone();
        ctx.forced_from = forced_from;

        // A wildcard or forced origin may be a state no event declares; it has
        // no onleave<state> hook.
        if self.config.table.has_state(from.as_str()) {
            self.notify(Stage::LeaveState, from.as_str(), &mut ctx).await?;
        } else {
            tracing::debug!(model = %self.config.model, state = %from, "undeclared origin");
        }

        tracing::debug!(model = %self.config.model, state = %from, "leaving state");
        ctx.args = args;
        self.notify(Stage::Leave, "", &mut ctx).await?;

        self.notify(Stage::Event, event, &mut ctx).await?;

        self.notify(Stage::EnterState, to.as_str(), &mut ctx).await?;

        tracing::debug!(model = %self.config.model, state = %to, "persisting state");
        let stored = self
            .config
            .persistence
            .persist(
                &ctx.entity,
                &self.config.state_field,
                &to,
                ctx.options.as_ref(),
            )
            .await
            .map_err(CoreError::Persistence)?;
        ctx.entity = stored;
        ctx.persisted = true;
        self.notify(Stage::Enter, "", &mut ctx).await?;

        self.notify(Stage::EnteredState, to.as_str(), &mut ctx).await?;
        self.notify(Stage::Entered, "", &mut ctx).await?;

        tracing::debug!(model = %self.config.model, state = %to, "state is now");

        let result = match ctx.result.take() {
            Some(result) => result,
            None => serde_json::to_value(&ctx.entity)?,
        };

        Ok(TransitionResult {
            event: ctx.event,
            from,
            to,
            entity: ctx.entity,
            result,
            forced: ctx.forced_from.is_some(),
        })
    }
}
