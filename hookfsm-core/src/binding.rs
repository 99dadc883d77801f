//! Entity binding - the per-model event surface exposed to the host.

use crate::entity::Entity;
use crate::error::CoreError;
use crate::machine::{CallOptions, MachineConfig, TransitionResult};
use crate::registry::MachineRegistry;
use serde_json::Value;
use std::sync::Arc;

/// Event methods of one model.
///
/// Every call acquires the entity's machine from the registry, fires the event,
/// and releases the machine before returning, on success and on failure.
#[derive(Debug, Clone)]
pub struct ModelBinding {
    registry: Arc<MachineRegistry>,
    config: Arc<MachineConfig>,
}

impl ModelBinding {
    /// Binds to a model already registered in `registry`.
    pub fn new(registry: Arc<MachineRegistry>, model: &str) -> Result<Self, CoreError> {
        let config = registry.config(model)?;
        Ok(Self { registry, config })
    }

    /// Registers `config` and binds to it.
    pub fn register(
        registry: Arc<MachineRegistry>,
        config: MachineConfig,
    ) -> Result<Self, CoreError> {
        let config = registry.register(config)?;
        Ok(Self { registry, config })
    }

    pub fn model(&self) -> &str {
        self.config.model()
    }

    pub fn config(&self) -> &Arc<MachineConfig> {
        &self.config
    }

    pub fn registry(&self) -> &Arc<MachineRegistry> {
        &self.registry
    }

    /// Names of the generated event methods.
    pub fn event_names(&self) -> &[String] {
        self.config.table().event_names()
    }

    /// Returns the method for a declared event.
    pub fn method(&self, event: &str) -> Result<EventMethod<'_>, CoreError> {
        if !self.config.table().has_event(event) {
            return Err(CoreError::UnknownEvent {
                model: self.model().to_string(),
                event: event.to_string(),
            });
        }
        Ok(EventMethod {
            binding: self,
            event: event.to_string(),
        })
    }

    /// Reads the current state of an entity of this model.
    pub fn current_state(&self, entity: &Entity) -> String {
        self.config.read_state(entity).0
    }

    /// Fires `event` on `entity`.
    pub async fn fire(
        &self,
        event: &str,
        entity: &Entity,
        args: Vec<Value>,
        options: CallOptions,
    ) -> Result<TransitionResult, CoreError> {
        if entity.model != self.model() {
            return Err(CoreError::Configuration {
                model: entity.model.clone(),
            });
        }

        let lease = self.registry.acquire(entity)?;
        let outcome = lease
            .machine()
            .fire(event, entity.clone(), args, options)
            .await;
        lease.release();

        match &outcome {
            Ok(result) => tracing::info!(
                model = self.model(),
                id = entity.id.as_deref().unwrap_or("-"),
                event,
                from = %result.from,
                to = %result.to,
                forced = result.forced,
                "transition complete"
            ),
            Err(e) => tracing::warn!(
                model = self.model(),
                id = entity.id.as_deref().unwrap_or("-"),
                event,
                error = %e,
                "transition failed"
            ),
        }

        outcome
    }
}

/// A generated per-event method.
#[derive(Debug, Clone)]
pub struct EventMethod<'a> {
    binding: &'a ModelBinding,
    event: String,
}

impl EventMethod<'_> {
    pub fn name(&self) -> &str {
        &self.event
    }

    pub async fn call(&self, entity: &Entity, args: Vec<Value>) -> Result<TransitionResult, CoreError> {
        self.binding
            .fire(&self.event, entity, args, CallOptions::default())
            .await
    }

    /// Calls the event, accepting the current state as origin for this call
    /// only if the event or model allows forcing.
    pub async fn call_forced(
        &self,
        entity: &Entity,
        args: Vec<Value>,
    ) -> Result<TransitionResult, CoreError> {
        self.binding
            .fire(&self.event, entity, args, CallOptions::forced())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextPatch, TransitionContext};
    use crate::definition::{EventDefinition, State, TransitionTable};
    use crate::entity::Persistence;
    use crate::error::Rejection;
    use crate::hooks::HookResolver;
    use async_trait::async_trait;
    use dashmap::DashMap;
    use tokio::sync::Notify;

    /// Keeps the stored copy of every entity.
    #[derive(Default)]
    struct Store {
        rows: DashMap<String, Entity>,
    }

    impl Store {
        fn insert(&self, entity: Entity) -> Entity {
            self.rows
                .insert(entity.id.clone().unwrap_or_default(), entity.clone());
            entity
        }

        fn state(&self, id: &str) -> Option<String> {
            self.rows
                .get(id)
                .and_then(|e| e.state("status").map(str::to_string))
        }
    }

    #[async_trait]
    impl Persistence for Store {
        async fn persist(
            &self,
            entity: &Entity,
            field: &str,
            value: &State,
            _options: Option<&Value>,
        ) -> Result<Entity, Rejection> {
            let mut stored = entity.clone();
            stored.set(field, value.as_str());
            Ok(self.insert(stored))
        }
    }

    /// Rejects `oncancel` and can park inside `onreactivate` until released.
    #[derive(Default)]
    struct Hooks {
        reached: Notify,
        proceed: Notify,
        reject_cancel: bool,
    }

    #[async_trait]
    impl HookResolver for Hooks {
        async fn notify(
            &self,
            hook: &str,
            _ctx: &TransitionContext,
        ) -> Result<ContextPatch, Rejection> {
            match hook {
                "oncancel" if self.reject_cancel => Err(Rejection::new("not implemented")),
                "onexpire" => {
                    self.reached.notify_one();
                    self.proceed.notified().await;
                    Ok(ContextPatch::default())
                }
                _ => Ok(ContextPatch::default()),
            }
        }
    }

    fn events() -> Vec<EventDefinition> {
        vec![
            EventDefinition::new("activate", "none", "active"),
            EventDefinition::new("cancel", "active", "canceled"),
            EventDefinition::new("reactivate", "canceled", "active"),
            EventDefinition::new("expire", ["active", "canceled"], "expired"),
        ]
    }

    fn binding(hooks: Arc<Hooks>) -> (ModelBinding, Arc<Store>) {
        let store = Arc::new(Store::default());
        let config = MachineConfig::new(
            "Subscription",
            TransitionTable::compile(events()).unwrap(),
            hooks,
            store.clone(),
        )
        .with_state_field("status");
        let binding = ModelBinding::register(Arc::new(MachineRegistry::new()), config).unwrap();
        (binding, store)
    }

    fn subscription(store: &Store, id: &str) -> Entity {
        store.insert(
            Entity::new("Subscription")
                .with_id(id)
                .with_attribute("status", "active"),
        )
    }

    #[tokio::test]
    async fn test_cancel_from_active() {
        let (binding, store) = binding(Arc::new(Hooks::default()));
        let entity = subscription(&store, "1");

        let result = binding.method("cancel").unwrap().call(&entity, vec![]).await.unwrap();

        assert_eq!(result.entity.state("status"), Some("canceled"));
        assert_eq!(store.state("1").as_deref(), Some("canceled"));
        assert!(!binding.registry().is_pending(&entity));
    }

    #[tokio::test]
    async fn test_reactivate_from_active_is_invalid() {
        let (binding, store) = binding(Arc::new(Hooks::default()));
        let entity = subscription(&store, "1");

        let err = binding
            .method("reactivate")
            .unwrap()
            .call(&entity, vec![])
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert_eq!(store.state("1").as_deref(), Some("active"));
        assert_eq!(binding.registry().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_hook_rejection_releases_machine() {
        let (binding, store) = binding(Arc::new(Hooks {
            reject_cancel: true,
            ..Default::default()
        }));
        let entity = subscription(&store, "1");

        let err = binding
            .fire("cancel", &entity, vec![], CallOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.rejection(), Some(&Rejection::new("not implemented")));
        assert_eq!(store.state("1").as_deref(), Some("active"));
        assert!(!binding.registry().is_pending(&entity));
    }

    #[tokio::test]
    async fn test_concurrent_call_is_rejected() {
        let hooks = Arc::new(Hooks::default());
        let (binding, store) = binding(hooks.clone());
        let entity = subscription(&store, "1");

        let first = {
            let binding = binding.clone();
            let entity = entity.clone();
            tokio::spawn(async move {
                binding
                    .fire("expire", &entity, vec![], CallOptions::default())
                    .await
            })
        };

        // Wait until the first call is parked inside its domain hook.
        hooks.reached.notified().await;
        assert!(binding.registry().is_pending(&entity));

        let err = binding
            .fire("cancel", &entity, vec![], CallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::TransitionPending { .. }));
        assert!(err.is_retryable());
        // The rejected call must not evict the first call's machine.
        assert!(binding.registry().is_pending(&entity));

        hooks.proceed.notify_one();
        let result = first.await.unwrap().unwrap();
        assert_eq!(result.to.as_str(), "expired");
        assert!(!binding.registry().is_pending(&entity));
        assert_eq!(store.state("1").as_deref(), Some("expired"));
    }

    #[tokio::test]
    async fn test_other_entities_are_independent() {
        let hooks = Arc::new(Hooks::default());
        let (binding, store) = binding(hooks.clone());
        let parked = subscription(&store, "1");
        let other = subscription(&store, "2");

        let first = {
            let binding = binding.clone();
            tokio::spawn(async move {
                binding
                    .fire("expire", &parked, vec![], CallOptions::default())
                    .await
            })
        };
        hooks.reached.notified().await;

        let result = binding
            .fire("cancel", &other, vec![], CallOptions::default())
            .await
            .unwrap();
        assert_eq!(result.to.as_str(), "canceled");

        hooks.proceed.notify_one();
        first.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unknown_event_method() {
        let (binding, _) = binding(Arc::new(Hooks::default()));
        assert!(matches!(
            binding.method("explode"),
            Err(CoreError::UnknownEvent { .. })
        ));
        assert_eq!(
            binding.event_names(),
            &["activate", "cancel", "reactivate", "expire"]
        );
    }

    #[tokio::test]
    async fn test_wrong_model_rejected() {
        let (binding, _) = binding(Arc::new(Hooks::default()));
        let order = Entity::new("Order")
            .with_id("1")
            .with_attribute("status", "active");

        let err = binding
            .fire("cancel", &order, vec![], CallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Configuration { .. }));
    }
}
