//! Convenience handler types for plugin development.

use std::sync::Arc;

use async_trait::async_trait;

use crate::hooks::definitions::{HookPayload, HookResult};
use crate::hooks::registry::HookHandler;

type SyncHandlerFn = dyn Fn(&mut HookPayload<'_>) -> HookResult + Send + Sync;

/// A closure-based hook handler for handlers that never await.
///
/// Asynchronous handlers implement [`HookHandler`] directly.
pub struct FnHandler {
    /// Plugin ID.
    id: String,
    /// Handler function.
    handler: Arc<SyncHandlerFn>,
}

impl std::fmt::Debug for FnHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler")
            .field("id", &self.id)
            .field("handler", &"<closure>")
            .finish()
    }
}

impl FnHandler {
    /// Creates a new closure-based handler.
    pub fn new<F>(plugin_id: &str, handler: F) -> Self
    where
        F: Fn(&mut HookPayload<'_>) -> HookResult + Send + Sync + 'static,
    {
        Self {
            id: plugin_id.to_string(),
            handler: Arc::new(handler),
        }
    }

    /// Wraps a closure into an `Arc<dyn HookHandler>`.
    pub fn wrap<F>(plugin_id: &str, handler: F) -> Arc<dyn HookHandler>
    where
        F: Fn(&mut HookPayload<'_>) -> HookResult + Send + Sync + 'static,
    {
        Arc::new(Self::new(plugin_id, handler))
    }
}

#[async_trait]
impl HookHandler for FnHandler {
    async fn handle(&self, payload: &mut HookPayload<'_>) -> HookResult {
        (self.handler)(payload)
    }

    fn plugin_id(&self) -> &str {
        &self.id
    }
}
