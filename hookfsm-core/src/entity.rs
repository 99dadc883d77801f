//! Entity references and the host persistence capability.

use crate::definition::State;
use crate::error::Rejection;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A reference to a host entity (an order, a subscription, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Model (entity type) name.
    pub model: String,

    /// Instance id. Entities without an id cannot be guarded by the registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Entity attributes, including the state field.
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Entity {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id: None,
            attributes: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(field.into(), value.into());
    }

    /// Returns the string value of the given state field.
    pub fn state(&self, field: &str) -> Option<&str> {
        self.attributes.get(field).and_then(Value::as_str)
    }
}

/// Durable storage of the state field, provided by the host.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Writes `value` into `field` and returns the entity as stored.
    async fn persist(
        &self,
        entity: &Entity,
        field: &str,
        value: &State,
        options: Option<&Value>,
    ) -> Result<Entity, Rejection>;

    /// Reads the current state of an entity.
    fn read_state(&self, entity: &Entity, field: &str) -> Option<State> {
        entity.state(field).map(State::from)
    }
}
