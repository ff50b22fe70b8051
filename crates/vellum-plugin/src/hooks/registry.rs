//! Hook registry. Plugins register handlers by hook point in insertion order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::definitions::{HookPayload, HookPoint, HookResult};

/// Installation id used for handlers registered by the application itself.
pub const APPLICATION_INSTALLATION: u64 = 0;

/// Trait for hook handler implementations.
#[async_trait]
pub trait HookHandler: Send + Sync + std::fmt::Debug {
    /// Handles a hook invocation.
    async fn handle(&self, payload: &mut HookPayload<'_>) -> HookResult;

    /// Returns the plugin ID owning this handler.
    fn plugin_id(&self) -> &str;
}

/// Entry in the hook registry.
#[derive(Debug, Clone)]
struct HookEntry {
    /// The handler.
    handler: Arc<dyn HookHandler>,
    /// Installation that registered this handler.
    installation: u64,
}

/// Registry of hook handlers organized by hook point.
///
/// Written only while plugins install; the request path takes read locks.
#[derive(Debug)]
pub struct HookRegistry {
    /// Hook point → handlers in registration order.
    handlers: RwLock<HashMap<HookPoint, Vec<HookEntry>>>,
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Appends a handler for a hook point.
    pub async fn register(&self, hook: HookPoint, handler: Arc<dyn HookHandler>, installation: u64) {
        let plugin_id = handler.plugin_id().to_string();

        let mut handlers = self.handlers.write().await;
        let entries = handlers.entry(hook).or_default();
        entries.push(HookEntry {
            handler,
            installation,
        });

        info!(
            hook = %hook,
            plugin_id = %plugin_id,
            installation = installation,
            position = entries.len(),
            "Hook handler registered"
        );
    }

    /// Removes every handler registered by one installation.
    pub async fn unregister_installation(&self, installation: u64) -> usize {
        let mut handlers = self.handlers.write().await;
        let mut removed = 0;

        for entries in handlers.values_mut() {
            let before = entries.len();
            entries.retain(|e| e.installation != installation);
            removed += before - entries.len();
        }

        handlers.retain(|_, entries| !entries.is_empty());

        debug!(installation = installation, removed = removed, "Hooks unregistered");
        removed
    }

    /// Returns the handlers for a hook point, in registration order.
    pub async fn get_handlers(&self, hook: &HookPoint) -> Vec<Arc<dyn HookHandler>> {
        let handlers = self.handlers.read().await;
        handlers
            .get(hook)
            .map(|entries| entries.iter().map(|e| e.handler.clone()).collect())
            .unwrap_or_default()
    }

    /// Returns whether any handlers are registered for a hook point.
    pub async fn has_handlers(&self, hook: &HookPoint) -> bool {
        let handlers = self.handlers.read().await;
        handlers
            .get(hook)
            .map(|entries| !entries.is_empty())
            .unwrap_or(false)
    }

    /// Returns the number of handlers registered for a hook point.
    pub async fn handler_count(&self, hook: &HookPoint) -> usize {
        let handlers = self.handlers.read().await;
        handlers.get(hook).map(|entries| entries.len()).unwrap_or(0)
    }

    /// Returns all hook points with at least one handler.
    pub async fn registered_hooks(&self) -> Vec<HookPoint> {
        let handlers = self.handlers.read().await;
        HookPoint::ALL
            .into_iter()
            .filter(|hook| handlers.contains_key(hook))
            .collect()
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::definitions::HookAction;
    use crate::traits::FnHandler;

    fn handler(id: &str) -> Arc<dyn HookHandler> {
        Arc::new(FnHandler::new(id, |_payload| Ok(HookAction::Continue)))
    }

    #[tokio::test]
    async fn test_keeps_registration_order() {
        let registry = HookRegistry::new();
        registry.register(HookPoint::Rendered, handler("b"), 1).await;
        registry.register(HookPoint::Rendered, handler("a"), 2).await;
        registry.register(HookPoint::Rendered, handler("c"), 3).await;

        let ids: Vec<String> = registry
            .get_handlers(&HookPoint::Rendered)
            .await
            .iter()
            .map(|h| h.plugin_id().to_string())
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_unregister_installation() {
        let registry = HookRegistry::new();
        registry.register(HookPoint::Rendered, handler("a"), 1).await;
        registry.register(HookPoint::BeforeRender, handler("a"), 1).await;
        registry.register(HookPoint::Rendered, handler("b"), 2).await;

        assert_eq!(registry.unregister_installation(1).await, 2);
        assert_eq!(registry.handler_count(&HookPoint::Rendered).await, 1);
        assert!(!registry.has_handlers(&HookPoint::BeforeRender).await);
        assert_eq!(registry.registered_hooks().await, vec![HookPoint::Rendered]);
    }

    #[tokio::test]
    async fn test_empty_hook() {
        let registry = HookRegistry::default();
        assert!(registry.get_handlers(&HookPoint::AfterResponse).await.is_empty());
        assert_eq!(registry.handler_count(&HookPoint::AfterResponse).await, 0);
    }
}
