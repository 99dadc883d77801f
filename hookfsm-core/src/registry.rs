//! Machine registry - compiled configs per model and live machines per entity.
//!
//! A machine is cached only while a transition on its entity is in flight. Its
//! presence under `(model, id)` is what marks the entity as busy; a second
//! acquire for the same key fails instead of waiting.

use crate::entity::Entity;
use crate::error::CoreError;
use crate::machine::{Machine, MachineConfig};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

/// Cache key: namespaced by model so ids of different models never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MachineKey {
    pub model: String,
    pub id: String,
}

impl MachineKey {
    pub fn new(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
        }
    }

    /// Returns the key for an entity, or `None` when it has no id.
    pub fn for_entity(entity: &Entity) -> Option<Self> {
        entity
            .id
            .as_ref()
            .map(|id| Self::new(entity.model.clone(), id.clone()))
    }
}

impl fmt::Display for MachineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.model, self.id)
    }
}

/// Process-scoped registry, injected into bindings rather than held globally.
#[derive(Debug, Default)]
pub struct MachineRegistry {
    /// Compiled configs indexed by model name.
    configs: DashMap<String, Arc<MachineConfig>>,

    /// Live machines indexed by (model, id).
    machines: DashMap<MachineKey, Arc<Machine>>,
}

impl MachineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Config Management
    // =========================================================================

    /// Registers a compiled model config. A model can be registered once.
    pub fn register(&self, config: MachineConfig) -> Result<Arc<MachineConfig>, CoreError> {
        match self.configs.entry(config.model().to_string()) {
            Entry::Occupied(_) => Err(CoreError::InvalidDefinition {
                reason: format!("model '{}' is already registered", config.model()),
            }),
            Entry::Vacant(slot) => {
                tracing::info!(
                    model = config.model(),
                    states = config.table().states().len(),
                    events = config.table().event_names().len(),
                    "registered state machine"
                );
                let config = Arc::new(config);
                slot.insert(config.clone());
                Ok(config)
            }
        }
    }

    /// Gets the compiled config for a model.
    pub fn config(&self, model: &str) -> Result<Arc<MachineConfig>, CoreError> {
        self.configs
            .get(model)
            .map(|r| r.clone())
            .ok_or_else(|| CoreError::Configuration {
                model: model.to_string(),
            })
    }

    /// Lists registered model names, sorted.
    pub fn models(&self) -> Vec<String> {
        let mut models: Vec<String> = self.configs.iter().map(|r| r.key().clone()).collect();
        models.sort();
        models
    }

    // =========================================================================
    // Machine Cache
    // =========================================================================

    fn create(&self, entity: &Entity) -> Result<Machine, CoreError> {
        let config = self.config(&entity.model)?;
        let current = config.read_state(entity);
        Ok(Machine::new(config, current, entity.id.clone()))
    }

    /// Fetches the cached machine for an entity, creating it if absent.
    ///
    /// A machine created here marks the entity busy until it is deleted.
    /// Entities without an id get a fresh, uncached machine.
    pub fn get_machine(&self, entity: &Entity) -> Result<Arc<Machine>, CoreError> {
        let Some(key) = MachineKey::for_entity(entity) else {
            return Ok(Arc::new(self.create(entity)?));
        };

        if let Some(machine) = self.machines.get(&key) {
            tracing::debug!(key = %key, "found cached state machine");
            return Ok(machine.clone());
        }

        tracing::debug!(key = %key, "no cached state machine, creating one");
        let machine = Arc::new(self.create(entity)?);
        Ok(self.machines.entry(key).or_insert(machine).clone())
    }

    /// Claims the entity for one transition attempt.
    ///
    /// Fails with [`CoreError::TransitionPending`] if a machine is already
    /// cached for the entity. The returned lease evicts the machine when it is
    /// released or dropped, whatever the outcome of the attempt.
    pub fn acquire(&self, entity: &Entity) -> Result<MachineLease<'_>, CoreError> {
        let Some(key) = MachineKey::for_entity(entity) else {
            return Ok(MachineLease {
                registry: self,
                key: None,
                machine: Arc::new(self.create(entity)?),
                released: false,
            });
        };

        match self.machines.entry(key) {
            Entry::Occupied(slot) => {
                let key = slot.key();
                tracing::warn!(key = %key, "previous transition pending");
                Err(CoreError::TransitionPending {
                    model: key.model.clone(),
                    id: key.id.clone(),
                })
            }
            Entry::Vacant(slot) => {
                let machine = Arc::new(self.create(entity)?);
                let key = slot.key().clone();
                slot.insert(machine.clone());
                Ok(MachineLease {
                    registry: self,
                    key: Some(key),
                    machine,
                    released: false,
                })
            }
        }
    }

    /// Evicts the machine cached under `key`. Returns true if one was present.
    pub fn release(&self, key: &MachineKey) -> bool {
        self.machines.remove(key).is_some()
    }

    /// Evicts the machine cached for an entity.
    pub fn delete_machine(&self, entity: &Entity) -> bool {
        MachineKey::for_entity(entity)
            .map(|key| self.release(&key))
            .unwrap_or(false)
    }

    /// Returns true if a transition is in flight for the entity.
    pub fn is_pending(&self, entity: &Entity) -> bool {
        MachineKey::for_entity(entity)
            .map(|key| self.machines.contains_key(&key))
            .unwrap_or(false)
    }

    /// Returns the number of cached machines.
    pub fn pending_count(&self) -> usize {
        self.machines.len()
    }
}

/// Exclusive claim on an entity's machine for one transition attempt.
pub struct MachineLease<'a> {
    registry: &'a MachineRegistry,
    key: Option<MachineKey>,
    machine: Arc<Machine>,
    released: bool,
}

impl MachineLease<'_> {
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn key(&self) -> Option<&MachineKey> {
        self.key.as_ref()
    }

    /// Evicts the machine. Returns true if this lease's machine was removed.
    pub fn release(mut self) -> bool {
        self.evict()
    }

    fn evict(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;

        let Some(key) = &self.key else {
            return false;
        };
        // Only evict our own machine; the slot may have been cleared and
        // re-acquired by someone else in between.
        let removed = self
            .registry
            .machines
            .remove_if(key, |_, cached| Arc::ptr_eq(cached, &self.machine))
            .is_some();
        tracing::debug!(key = %key, removed, "released state machine");
        removed
    }
}

impl Drop for MachineLease<'_> {
    fn drop(&mut self) {
        self.evict();
    }
}
