//! Route resolution through the `routeResolve` hook chain.

use std::sync::Arc;

use tracing::{debug, error};

use vellum_core::error::AppError;
use vellum_core::types::{Context, RedirectSignal, RouteTarget};
use vellum_plugin::hooks::{HookBus, HookFlow, HookPayload};

/// Navigation continuation. Consumed by the call, so it runs at most once.
pub type Next = Box<dyn FnOnce() + Send>;

/// States of one resolution.
#[derive(Debug, Clone)]
pub enum ResolveState {
    /// Not started.
    Idle,
    /// `routeResolve` handlers are running.
    Resolving,
    /// A handler redirected; the redirect is applied to the context.
    Redirected(RedirectSignal),
    /// A handler failed; `routeError` has been fired.
    Errored(AppError),
    /// Every handler continued.
    Resolved,
}

impl ResolveState {
    /// Returns whether this is a final state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Idle | Self::Resolving)
    }

    /// Short state name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Redirected(_) => "redirected",
            Self::Errored(_) => "errored",
            Self::Resolved => "resolved",
        }
    }
}

/// Runs `routeResolve` for a navigation target and interprets the outcome.
#[derive(Debug, Clone)]
pub struct RouteResolver {
    bus: Arc<HookBus>,
}

impl RouteResolver {
    /// Creates a resolver over a hook bus.
    pub fn new(bus: Arc<HookBus>) -> Self {
        Self { bus }
    }

    /// Resolves `target` for the request in `ctx`.
    ///
    /// Exactly one of the following happens:
    /// - redirect: status and `Location` are applied, `next` is dropped
    /// - failure: `routeError` fires, then `next` runs
    /// - success: `next` runs
    pub async fn resolve(
        &self,
        ctx: &mut Context,
        target: RouteTarget,
        next: Option<Next>,
    ) -> ResolveState {
        let mut state = ResolveState::Idle;
        debug!(
            request_id = %ctx.request_id,
            path = %target.full_path,
            state = state.name(),
            "Resolving route"
        );

        ctx.set_route(target);
        state = ResolveState::Resolving;
        let flow = self.bus.invoke(&mut HookPayload::route(ctx)).await;

        state = match flow {
            HookFlow::Continue => {
                if let Some(next) = next {
                    next();
                }
                ResolveState::Resolved
            }
            HookFlow::Redirect(signal) => {
                if let Err(e) = ctx.redirect(&signal) {
                    error!(
                        request_id = %ctx.request_id,
                        location = %signal.location,
                        error = %e,
                        "Redirect could not be applied"
                    );
                }
                ResolveState::Redirected(signal)
            }
            HookFlow::Fail { plugin_id, error } => {
                debug!(
                    request_id = %ctx.request_id,
                    plugin_id = %plugin_id,
                    from = state.name(),
                    "Route resolution failed, notifying routeError"
                );
                self.bus
                    .fire(&mut HookPayload::route_error(&error, ctx))
                    .await;
                if let Some(next) = next {
                    next();
                }
                ResolveState::Errored(error)
            }
        };

        debug!(
            request_id = %ctx.request_id,
            path = %ctx.route().full_path,
            state = state.name(),
            "Route resolved"
        );
        state
    }

    /// Returns the hook bus.
    pub fn bus(&self) -> &Arc<HookBus> {
        &self.bus
    }
}
