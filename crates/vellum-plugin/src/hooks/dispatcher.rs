//! Hook bus: invokes the handlers of a hook as a sequential fold.
//!
//! - Handlers run strictly in registration order; each one is awaited
//!   before the next starts, so handler N observes the effects of N−1.
//! - A handler returning [`HookAction::Redirect`] stops the chain.
//! - A handler returning an error, or panicking, stops the chain with
//!   [`HookFlow::Fail`]. What happens next is decided by the caller.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use vellum_core::error::AppError;
use vellum_core::types::RedirectSignal;

use super::definitions::{HookAction, HookPayload, HookPoint, HookResult};
use super::registry::{APPLICATION_INSTALLATION, HookHandler, HookRegistry};
use crate::traits::FnHandler;

/// Outcome of invoking every handler of one hook.
#[derive(Debug)]
pub enum HookFlow {
    /// Every handler continued.
    Continue,
    /// A handler asked for a redirect; later handlers did not run.
    Redirect(RedirectSignal),
    /// A handler failed; later handlers did not run.
    Fail {
        /// Plugin owning the failing handler.
        plugin_id: String,
        /// The failure.
        error: AppError,
    },
}

impl HookFlow {
    /// Returns whether the chain completed without a signal.
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }
}

/// Registry plus sequential dispatcher. One instance per server, shared
/// through `Arc` with every component that registers or fires hooks.
#[derive(Debug)]
pub struct HookBus {
    /// Hook registry.
    registry: Arc<HookRegistry>,
}

impl HookBus {
    /// Creates a bus with an empty registry.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(HookRegistry::new()),
        }
    }

    /// Appends an application-level handler for a hook.
    pub async fn register(&self, hook: HookPoint, handler: Arc<dyn HookHandler>) {
        self.registry
            .register(hook, handler, APPLICATION_INSTALLATION)
            .await;
    }

    /// Appends a handler owned by a plugin installation.
    pub async fn register_owned(
        &self,
        hook: HookPoint,
        handler: Arc<dyn HookHandler>,
        installation: u64,
    ) {
        self.registry.register(hook, handler, installation).await;
    }

    /// Appends a synchronous closure handler for a hook.
    pub async fn on<F>(&self, hook: HookPoint, plugin_id: &str, f: F)
    where
        F: Fn(&mut HookPayload<'_>) -> HookResult + Send + Sync + 'static,
    {
        self.register(hook, Arc::new(FnHandler::new(plugin_id, f)))
            .await;
    }

    /// Runs every handler for the payload's hook, in order.
    pub async fn invoke(&self, payload: &mut HookPayload<'_>) -> HookFlow {
        let hook = payload.hook;
        let handlers = self.registry.get_handlers(&hook).await;

        if handlers.is_empty() {
            return HookFlow::Continue;
        }

        debug!(hook = %hook, handler_count = handlers.len(), "Invoking hook");

        for handler in &handlers {
            let plugin_id = handler.plugin_id().to_string();
            let result = AssertUnwindSafe(handler.handle(payload))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    let message = panic_message(panic.as_ref());
                    error!(
                        hook = %hook,
                        plugin_id = %plugin_id,
                        panic = %message,
                        "Hook handler panicked"
                    );
                    Err(AppError::plugin(format!(
                        "Handler of plugin '{plugin_id}' panicked during '{hook}': {message}"
                    )))
                });

            match result {
                Ok(HookAction::Continue) => {}
                Ok(HookAction::Redirect(signal)) => {
                    info!(
                        hook = %hook,
                        plugin_id = %plugin_id,
                        location = %signal.location,
                        status = signal.status,
                        "Handler requested redirect"
                    );
                    return HookFlow::Redirect(signal);
                }
                Err(error) => {
                    warn!(
                        hook = %hook,
                        plugin_id = %plugin_id,
                        error = %error,
                        "Hook handler failed"
                    );
                    return HookFlow::Fail { plugin_id, error };
                }
            }
        }

        HookFlow::Continue
    }

    /// Invokes a hook whose outcome cannot change anything anymore.
    ///
    /// Failures and redirects are logged, never propagated.
    pub async fn fire(&self, payload: &mut HookPayload<'_>) {
        let hook = payload.hook;
        match self.invoke(payload).await {
            HookFlow::Continue => {}
            HookFlow::Redirect(signal) => warn!(
                hook = %hook,
                location = %signal.location,
                "Redirect ignored, hook cannot redirect"
            ),
            HookFlow::Fail { plugin_id, error } => error!(
                hook = %hook,
                plugin_id = %plugin_id,
                error = %error,
                "Hook failed after response"
            ),
        }
    }

    /// Returns a reference to the hook registry.
    pub fn registry(&self) -> &Arc<HookRegistry> {
        &self.registry
    }
}

impl Default for HookBus {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
