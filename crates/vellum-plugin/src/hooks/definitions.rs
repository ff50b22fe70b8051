//! Hook point definitions with typed payloads.

use serde::{Deserialize, Serialize};

use vellum_core::error::AppError;
use vellum_core::types::{Context, RedirectSignal};

/// Enumeration of all hook points in the render lifecycle.
///
/// The serialized names are part of the public plugin contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookPoint {
    /// Fired once before the adapter starts listening.
    BeforeStart,
    /// Fired while resolving a navigation target. Can redirect.
    RouteResolve,
    /// Fired when resolution or rendering failed.
    RouteError,
    /// Fired before the page body is rendered. Can redirect.
    BeforeRender,
    /// Fired right before the bundle builds the body markup.
    BeforeBuild,
    /// Fired after the body is produced.
    Rendered,
    /// Fired after the response body was handed to the transport.
    AfterResponse,
}

impl HookPoint {
    /// All hook points, in lifecycle order.
    pub const ALL: [HookPoint; 7] = [
        Self::BeforeStart,
        Self::RouteResolve,
        Self::RouteError,
        Self::BeforeRender,
        Self::BeforeBuild,
        Self::Rendered,
        Self::AfterResponse,
    ];

    /// Returns the string name of this hook point.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeStart => "beforeStart",
            Self::RouteResolve => "routeResolve",
            Self::RouteError => "routeError",
            Self::BeforeRender => "beforeRender",
            Self::BeforeBuild => "beforeBuild",
            Self::Rendered => "rendered",
            Self::AfterResponse => "afterResponse",
        }
    }
}

impl std::fmt::Display for HookPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Arguments passed to hook handlers.
///
/// `beforeStart` carries nothing, `routeError` carries the failure and the
/// route context, every other hook carries the request context.
#[derive(Debug)]
pub struct HookPayload<'a> {
    /// The hook point being fired.
    pub hook: HookPoint,
    context: Option<&'a mut Context>,
    error: Option<&'a AppError>,
}

impl<'a> HookPayload<'a> {
    /// Payload for `beforeStart`.
    pub fn start() -> Self {
        Self {
            hook: HookPoint::BeforeStart,
            context: None,
            error: None,
        }
    }

    /// Payload for `routeResolve`.
    pub fn route(context: &'a mut Context) -> Self {
        Self::with_context(HookPoint::RouteResolve, context)
    }

    /// Payload for `routeError`.
    pub fn route_error(error: &'a AppError, context: &'a mut Context) -> Self {
        Self {
            hook: HookPoint::RouteError,
            context: Some(context),
            error: Some(error),
        }
    }

    /// Payload for a hook that only carries the request context.
    pub fn with_context(hook: HookPoint, context: &'a mut Context) -> Self {
        Self {
            hook,
            context: Some(context),
            error: None,
        }
    }

    /// The request context, if this hook carries one.
    pub fn context(&self) -> Option<&Context> {
        self.context.as_deref()
    }

    /// Mutable access to the request context.
    pub fn context_mut(&mut self) -> Option<&mut Context> {
        self.context.as_deref_mut()
    }

    /// The failure reported to `routeError`.
    pub fn error(&self) -> Option<&AppError> {
        self.error
    }
}

/// Action returned by a hook handler telling the bus what to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookAction {
    /// Continue to the next handler.
    Continue,
    /// Stop the chain and redirect the client.
    Redirect(RedirectSignal),
}

impl HookAction {
    /// Shorthand for a 302 redirect.
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::Redirect(RedirectSignal::to(location))
    }
}

/// Result returned from a hook handler invocation.
pub type HookResult = Result<HookAction, AppError>;
