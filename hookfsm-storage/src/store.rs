//! In-memory entity store.

use crate::error::StorageError;
use async_trait::async_trait;
use dashmap::DashMap;
use hookfsm_core::{Entity, MachineConfig, Persistence, Rejection, State};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Attribute holding the creation timestamp (RFC 3339).
pub const CREATED_AT_FIELD: &str = "created_at";

/// Attribute holding the last update timestamp (RFC 3339).
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// State field validation for one model.
#[derive(Debug, Clone)]
struct ModelSchema {
    state_field: String,
    states: HashSet<String>,
}

/// Entities indexed by (model, id).
#[derive(Debug, Default)]
pub struct EntityStore {
    rows: DashMap<(String, String), Entity>,
    schemas: DashMap<String, ModelSchema>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the state field of `config`'s model to its declared states.
    pub fn register_model(&self, config: &MachineConfig) {
        let schema = ModelSchema {
            state_field: config.state_field().to_string(),
            states: config
                .table()
                .states()
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
        };
        self.schemas.insert(config.model().to_string(), schema);
    }

    fn validate(&self, model: &str, field: &str, value: Option<&Value>) -> Result<(), StorageError> {
        let Some(schema) = self.schemas.get(model) else {
            return Ok(());
        };
        if schema.state_field != field {
            return Ok(());
        }

        match value {
            None => Ok(()),
            Some(Value::String(s)) if schema.states.contains(s) => Ok(()),
            Some(other) => Err(StorageError::InvalidState {
                model: model.to_string(),
                field: field.to_string(),
                value: match other {
                    Value::String(s) => s.clone(),
                    v => v.to_string(),
                },
            }),
        }
    }

    /// Creates an entity. An `id` attribute is used as the id, otherwise one is generated.
    pub fn create(
        &self,
        model: &str,
        mut attributes: Map<String, Value>,
    ) -> Result<Entity, StorageError> {
        let id = match attributes.remove("id") {
            Some(Value::String(id)) => id,
            Some(other) => other.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };

        if let Some(schema) = self.schemas.get(model) {
            let field = schema.state_field.clone();
            drop(schema);
            self.validate(model, &field, attributes.get(&field))?;
        }

        let now = Value::String(chrono::Utc::now().to_rfc3339());
        attributes.insert(CREATED_AT_FIELD.to_string(), now.clone());
        attributes.insert(UPDATED_AT_FIELD.to_string(), now);

        let entity = Entity {
            model: model.to_string(),
            id: Some(id.clone()),
            attributes,
        };

        let key = (model.to_string(), id.clone());
        match self.rows.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StorageError::EntityExists {
                model: model.to_string(),
                id,
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(entity.clone());
                tracing::debug!(model, id = %id, "created entity");
                Ok(entity)
            }
        }
    }

    /// Gets an entity by model and id.
    pub fn get(&self, model: &str, id: &str) -> Result<Entity, StorageError> {
        self.rows
            .get(&(model.to_string(), id.to_string()))
            .map(|r| r.clone())
            .ok_or_else(|| StorageError::EntityNotFound {
                model: model.to_string(),
                id: id.to_string(),
            })
    }

    /// Returns the stored copy of an entity.
    pub fn reload(&self, entity: &Entity) -> Result<Entity, StorageError> {
        let id = entity.id.as_deref().ok_or_else(|| StorageError::Unsaved {
            model: entity.model.clone(),
        })?;
        self.get(&entity.model, id)
    }

    /// Lists all entities of a model, sorted by id.
    pub fn list(&self, model: &str) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self
            .rows
            .iter()
            .filter(|r| r.key().0 == model)
            .map(|r| r.value().clone())
            .collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        entities
    }

    /// Deletes an entity. Returns true if it existed.
    pub fn delete(&self, model: &str, id: &str) -> bool {
        self.rows
            .remove(&(model.to_string(), id.to_string()))
            .is_some()
    }

    /// Returns the number of stored entities.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Writes a single attribute and returns the stored entity.
    ///
    /// `options.touch = false` leaves the update timestamp alone.
    pub fn update_attribute(
        &self,
        entity: &Entity,
        field: &str,
        value: Value,
        options: Option<&Value>,
    ) -> Result<Entity, StorageError> {
        let id = entity.id.clone().ok_or_else(|| StorageError::Unsaved {
            model: entity.model.clone(),
        })?;
        self.validate(&entity.model, field, Some(&value))?;

        let touch = options
            .and_then(|o| o.get("touch"))
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let mut row = self
            .rows
            .get_mut(&(entity.model.clone(), id.clone()))
            .ok_or_else(|| StorageError::EntityNotFound {
                model: entity.model.clone(),
                id: id.clone(),
            })?;

        row.set(field, value);
        if touch {
            row.set(UPDATED_AT_FIELD, chrono::Utc::now().to_rfc3339());
        }

        tracing::debug!(model = %entity.model, id = %id, field, "updated attribute");
        Ok(row.clone())
    }
}

#[async_trait]
impl Persistence for EntityStore {
    async fn persist(
        &self,
        entity: &Entity,
        field: &str,
        value: &State,
        options: Option<&Value>,
    ) -> Result<Entity, Rejection> {
        self.update_attribute(entity, field, Value::String(value.as_str().to_string()), options)
            .map_err(Rejection::from)
    }
}
