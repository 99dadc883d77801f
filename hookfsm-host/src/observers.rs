//! Observer bus - named, per-model observers behind the engine's hook resolver.
//!
//! Observers are registered under `<prefix><hook>` names such as
//! `fsm:oncancel` or `fsm:onenteredcanceled`. Observers of one hook run one
//! after another in registration order; each sees the context as patched by
//! the observers before it. The first rejection stops the chain.

use async_trait::async_trait;
use hookfsm_core::{ContextPatch, HookResolver, Rejection, TransitionContext};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by an observer.
pub type ObserverFuture = Pin<Box<dyn Future<Output = Result<ContextPatch, Rejection>> + Send>>;

/// A registered observer.
pub type Observer = Arc<dyn Fn(TransitionContext) -> ObserverFuture + Send + Sync>;

/// Observers indexed by (model, hook name).
pub struct ObserverBus {
    prefix: String,
    observers: RwLock<HashMap<(String, String), Vec<Observer>>>,
}

impl ObserverBus {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            observers: RwLock::new(HashMap::new()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the observer name of an engine hook, e.g. `oncancel` -> `fsm:oncancel`.
    pub fn observer_name(&self, hook: &str) -> String {
        format!("{}{}", self.prefix, hook)
    }

    /// Registers an observer for `name` on `model`.
    pub fn observe<F, Fut>(&self, model: &str, name: &str, observer: F)
    where
        F: Fn(TransitionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ContextPatch, Rejection>> + Send + 'static,
    {
        let observer: Observer = Arc::new(move |ctx| -> ObserverFuture { Box::pin(observer(ctx)) });
        self.observers
            .write()
            .entry((model.to_string(), name.to_string()))
            .or_default()
            .push(observer);
        tracing::debug!(model, name, "registered observer");
    }

    /// Removes every observer of `name` on `model`. Returns how many were removed.
    pub fn clear_observers(&self, model: &str, name: &str) -> usize {
        self.observers
            .write()
            .remove(&(model.to_string(), name.to_string()))
            .map(|v| v.len())
            .unwrap_or(0)
    }

    pub fn observer_count(&self, model: &str, name: &str) -> usize {
        self.observers
            .read()
            .get(&(model.to_string(), name.to_string()))
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Runs the observers of `name` on `model` in order.
    pub async fn notify_observers_of(
        &self,
        model: &str,
        name: &str,
        ctx: &TransitionContext,
    ) -> Result<ContextPatch, Rejection> {
        let observers = self
            .observers
            .read()
            .get(&(model.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_default();

        if observers.is_empty() {
            return Ok(ContextPatch::default());
        }

        tracing::debug!(model, name, count = observers.len(), "notifying observers");

        let mut ctx = ctx.clone();
        let mut combined = ContextPatch::default();
        for observer in observers {
            let patch = observer(ctx.clone()).await?;
            ctx.merge(patch.clone());
            combined = combined.and(patch);
        }

        Ok(combined)
    }
}

impl Default for ObserverBus {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_OBSERVER_PREFIX)
    }
}

impl std::fmt::Debug for ObserverBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverBus")
            .field("prefix", &self.prefix)
            .field("hooks", &self.observers.read().len())
            .finish()
    }
}

#[async_trait]
impl HookResolver for ObserverBus {
    async fn notify(&self, hook: &str, ctx: &TransitionContext) -> Result<ContextPatch, Rejection> {
        let name = self.observer_name(hook);
        self.notify_observers_of(&ctx.entity.model, &name, ctx).await
    }
}
