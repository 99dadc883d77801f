//! Per-attempt transition context.

use crate::definition::State;
use crate::entity::Entity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mutable state threaded through every hook stage of one transition attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionContext {
    /// Event being fired.
    pub event: String,

    /// State the entity is leaving.
    pub from: State,

    /// State the entity is entering.
    pub to: State,

    /// The entity. Replaced by the stored entity once the new state is persisted.
    pub entity: Entity,

    /// Arguments passed by the caller.
    pub args: Vec<Value>,

    /// Persistence options declared on the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,

    /// Origin accepted for this call only because the caller forced it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forced_from: Option<State>,

    /// Explicit result override set by a hook.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Whether the new state has been written.
    pub persisted: bool,
}

impl TransitionContext {
    pub fn new(event: impl Into<String>, from: State, to: State, entity: Entity) -> Self {
        Self {
            event: event.into(),
            from,
            to,
            entity,
            args: Vec::new(),
            options: None,
            forced_from: None,
            result: None,
            persisted: false,
        }
    }

    /// Merges a hook response into the context.
    pub fn merge(&mut self, patch: ContextPatch) {
        if let Some(entity) = patch.entity {
            self.entity = entity;
        }
        if let Some(args) = patch.args {
            self.args = args;
        }
        if let Some(result) = patch.result {
            self.result = Some(result);
        }
    }
}

/// Partial context returned by a hook observer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<Entity>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ContextPatch {
    pub fn result(value: impl Into<Value>) -> Self {
        Self {
            result: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn entity(entity: Entity) -> Self {
        Self {
            entity: Some(entity),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entity.is_none() && self.args.is_none() && self.result.is_none()
    }

    /// Combines two patches; fields set in `other` win.
    pub fn and(mut self, other: ContextPatch) -> Self {
        if other.entity.is_some() {
            self.entity = other.entity;
        }
        if other.args.is_some() {
            self.args = other.args;
        }
        if other.result.is_some() {
            self.result = other.result;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> TransitionContext {
        TransitionContext::new(
            "cancel",
            State::from("active"),
            State::from("canceled"),
            Entity::new("Order").with_id("1"),
        )
    }

    #[test]
    fn test_empty_patch_changes_nothing() {
        let mut ctx = context();
        let before = ctx.clone();

        assert!(ContextPatch::default().is_empty());
        ctx.merge(ContextPatch::default());
        assert_eq!(ctx, before);
    }

    #[test]
    fn test_merge_patch() {
        let mut ctx = context();
        ctx.merge(ContextPatch::result(json!({"refunded": true})));
        ctx.merge(ContextPatch {
            args: Some(vec![json!("reason")]),
            ..ContextPatch::default()
        });

        assert_eq!(ctx.result, Some(json!({"refunded": true})));
        assert_eq!(ctx.args, vec![json!("reason")]);
        assert_eq!(ctx.event, "cancel");
    }

    #[test]
    fn test_and_prefers_later_fields() {
        let patch = ContextPatch::result(1).and(ContextPatch::result(2));
        assert_eq!(patch.result, Some(json!(2)));

        let patch = ContextPatch::result(1).and(ContextPatch::default());
        assert_eq!(patch.result, Some(json!(1)));
    }
}
