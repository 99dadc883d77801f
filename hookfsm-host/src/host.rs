//! Host bootstrap - compiles configured models and binds them to a store.

use crate::config::Config;
use crate::error::HostError;
use crate::observers::ObserverBus;
use hookfsm_core::{
    CallOptions, ContextPatch, Entity, EventDefinition, MachineConfig, MachineRegistry,
    ModelBinding, Rejection, TransitionContext, TransitionResult,
};
use hookfsm_storage::EntityStore;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Summary of a configured model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelDescription {
    pub name: String,
    pub state_field: String,
    pub allow_force: bool,
    pub states: Vec<String>,
    pub events: Vec<EventDefinition>,
    /// Observer names, prefix included.
    pub hooks: Vec<String>,
    pub checksum: String,
}

/// A process-scoped host: one registry, one store, one observer bus.
pub struct Host {
    registry: Arc<MachineRegistry>,
    store: Arc<EntityStore>,
    bus: Arc<ObserverBus>,
    bindings: HashMap<String, ModelBinding>,
}

impl Host {
    /// Compiles every configured model.
    pub fn new(config: &Config) -> Result<Self, HostError> {
        config.validate()?;

        let registry = Arc::new(MachineRegistry::new());
        let store = Arc::new(EntityStore::new());
        let bus = Arc::new(ObserverBus::new(config.defaults.observer_prefix.clone()));
        let mut bindings = HashMap::new();

        for model in &config.models {
            let table = model.compile()?;
            let machine_config =
                MachineConfig::new(model.name.clone(), table, bus.clone(), store.clone())
                    .with_state_field(model.state_field(&config.defaults))
                    .with_allow_force(model.allow_force(&config.defaults));

            store.register_model(&machine_config);
            let binding = ModelBinding::register(registry.clone(), machine_config)?;
            tracing::debug!(
                model = %model.name,
                events = ?binding.event_names(),
                "initialized model"
            );
            bindings.insert(model.name.clone(), binding);
        }

        Ok(Self {
            registry,
            store,
            bus,
            bindings,
        })
    }

    pub fn registry(&self) -> &Arc<MachineRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<ObserverBus> {
        &self.bus
    }

    /// Lists configured models, sorted.
    pub fn models(&self) -> Vec<&str> {
        let mut models: Vec<&str> = self.bindings.keys().map(|k| k.as_str()).collect();
        models.sort();
        models
    }

    pub fn binding(&self, model: &str) -> Result<&ModelBinding, HostError> {
        self.bindings
            .get(model)
            .ok_or_else(|| HostError::UnknownModel(model.to_string()))
    }

    /// Resolves an observer name, accepting it with or without the bus prefix,
    /// and checks it against the model's hook table.
    fn observer_name(&self, model: &str, hook: &str) -> Result<String, HostError> {
        let binding = self.binding(model)?;
        let bare = hook.strip_prefix(self.bus.prefix()).unwrap_or(hook);

        if !binding
            .config()
            .table()
            .hooks()
            .names()
            .iter()
            .any(|h| h == bare)
        {
            return Err(HostError::UnknownHook {
                model: model.to_string(),
                hook: hook.to_string(),
            });
        }
        Ok(self.bus.observer_name(bare))
    }

    /// Registers an observer for a declared hook of `model`.
    pub fn observe<F, Fut>(&self, model: &str, hook: &str, observer: F) -> Result<(), HostError>
    where
        F: Fn(TransitionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ContextPatch, Rejection>> + Send + 'static,
    {
        let name = self.observer_name(model, hook)?;
        self.bus.observe(model, &name, observer);
        Ok(())
    }

    /// Removes every observer of a declared hook of `model`.
    pub fn clear_observers(&self, model: &str, hook: &str) -> Result<usize, HostError> {
        let name = self.observer_name(model, hook)?;
        Ok(self.bus.clear_observers(model, &name))
    }

    /// Creates an entity of a configured model.
    pub fn create(&self, model: &str, attributes: Map<String, Value>) -> Result<Entity, HostError> {
        self.binding(model)?;
        Ok(self.store.create(model, attributes)?)
    }

    /// Returns the stored copy of an entity.
    pub fn reload(&self, entity: &Entity) -> Result<Entity, HostError> {
        Ok(self.store.reload(entity)?)
    }

    /// Fires `event` on `entity`.
    pub async fn fire(
        &self,
        entity: &Entity,
        event: &str,
        args: Vec<Value>,
    ) -> Result<TransitionResult, HostError> {
        self.fire_with(entity, event, args, CallOptions::default())
            .await
    }

    /// Fires `event` on `entity` with per-call options.
    pub async fn fire_with(
        &self,
        entity: &Entity,
        event: &str,
        args: Vec<Value>,
        options: CallOptions,
    ) -> Result<TransitionResult, HostError> {
        let binding = self.binding(&entity.model)?;
        Ok(binding.fire(event, entity, args, options).await?)
    }

    /// Describes a configured model.
    pub fn describe(&self, model: &str) -> Result<ModelDescription, HostError> {
        let config = self.binding(model)?.config();
        let table = config.table();

        Ok(ModelDescription {
            name: config.model().to_string(),
            state_field: config.state_field().to_string(),
            allow_force: config.allow_force(),
            states: table.states().iter().map(|s| s.to_string()).collect(),
            events: table.events().to_vec(),
            hooks: table
                .hooks()
                .names()
                .iter()
                .map(|h| self.bus.observer_name(h))
                .collect(),
            checksum: table.checksum().to_string(),
        })
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("models", &self.models())
            .field("entities", &self.store.len())
            .field("pending", &self.registry.pending_count())
            .finish()
    }
}
