//! Per-request rendering context.
//!
//! A [`Context`] is created when a request enters the render middleware,
//! threaded mutably through route resolution, every render hook and the
//! renderer, and finally handed to the `afterResponse` hook. It is owned by
//! exactly one request task and never shared.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use axum::http::header::{self, HeaderName};
use axum::http::{Extensions, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::result::AppResult;
use crate::types::redirect::RedirectSignal;

/// Terminal state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Still being resolved or rendered.
    Pending,
    /// A redirect was applied to the response.
    Redirect,
    /// Rendering failed and an error response was produced.
    Error,
    /// A page was rendered.
    Rendered,
}

impl Outcome {
    /// Returns whether this outcome is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Navigation target of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTarget {
    /// Path component, always starting with `/`.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    /// Path plus query, as requested.
    pub full_path: String,
}

impl RouteTarget {
    /// Parses a target from a path with optional query (`/a/b?x=1`).
    pub fn new(full_path: impl Into<String>) -> Self {
        let full_path = full_path.into();
        let (path, query) = match full_path.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (full_path.clone(), None),
        };
        let path = if path.is_empty() {
            "/".to_string()
        } else {
            path
        };
        Self {
            path,
            query,
            full_path,
        }
    }

    /// Builds a target from a request URI.
    pub fn from_uri(uri: &Uri) -> Self {
        let full_path = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        Self::new(full_path)
    }
}

/// Status and headers the core has decided for the response.
///
/// The adapter owns the transport; this is the handle the core mutates and
/// the adapter serializes once the pipeline completes.
#[derive(Debug, Clone)]
pub struct ResponseState {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
}

impl Default for ResponseState {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }
}

/// Mutable per-request state shared between the core, the bundle and
/// plugin hook handlers.
#[derive(Debug)]
pub struct Context {
    /// Unique request identifier.
    pub request_id: Uuid,
    /// Request method.
    pub method: Method,
    /// Request URI.
    pub uri: Uri,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request extensions inserted by middlewares (parsed cookies, keys).
    pub extensions: Extensions,
    /// Page title written into `<head>`.
    pub title: Option<String>,
    /// Raw HTML fragments appended to `<head>`.
    pub head: Vec<String>,
    /// Attributes rendered on the `<html>` tag.
    pub html_attrs: Vec<(String, String)>,
    /// Attributes rendered on the `<body>` tag.
    pub body_attrs: Vec<(String, String)>,
    /// Application state serialized into the hydration script.
    pub state: serde_json::Map<String, Value>,
    /// Free-form state contributed by plugins.
    pub data: HashMap<String, Value>,
    route: RouteTarget,
    response: ResponseState,
    rendered_modules: BTreeSet<String>,
    outcome: Outcome,
    started: Instant,
}

impl Context {
    /// Creates a context for an incoming request.
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        let route = RouteTarget::from_uri(&uri);
        Self {
            request_id: Uuid::new_v4(),
            method,
            uri,
            headers,
            extensions: Extensions::new(),
            title: None,
            head: Vec::new(),
            html_attrs: Vec::new(),
            body_attrs: Vec::new(),
            state: serde_json::Map::new(),
            data: HashMap::new(),
            route,
            response: ResponseState::default(),
            rendered_modules: BTreeSet::new(),
            outcome: Outcome::Pending,
            started: Instant::now(),
        }
    }

    /// Creates a `GET` context for a path, mostly useful in tests and for
    /// rendering outside of an HTTP request.
    pub fn for_path(path: &str) -> Self {
        let uri = path.parse::<Uri>().unwrap_or_else(|_| Uri::from_static("/"));
        Self::new(Method::GET, uri, HeaderMap::new())
    }

    /// Attaches the request extensions.
    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }

    /// Returns the current navigation target.
    pub fn route(&self) -> &RouteTarget {
        &self.route
    }

    /// Replaces the navigation target (merging the ambient request with a
    /// new target during resolution).
    pub fn set_route(&mut self, target: RouteTarget) {
        self.route = target;
    }

    /// Returns the request header value as a string, if present and valid.
    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the response status decided so far.
    pub fn status(&self) -> StatusCode {
        self.response.status
    }

    /// Returns the response headers decided so far.
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response.headers
    }

    /// Returns the response state.
    pub fn response(&self) -> &ResponseState {
        &self.response
    }

    /// Sets the response status.
    ///
    /// Returns `false` (and leaves the response untouched) once the context
    /// reached a terminal outcome.
    pub fn set_status(&mut self, status: StatusCode) -> bool {
        if self.guard_terminal("set_status") {
            return false;
        }
        self.response.status = status;
        true
    }

    /// Inserts a response header, replacing previous values.
    ///
    /// Returns `Ok(false)` once the context reached a terminal outcome.
    pub fn insert_header(&mut self, name: HeaderName, value: &str) -> AppResult<bool> {
        if self.guard_terminal("insert_header") {
            return Ok(false);
        }
        let value = HeaderValue::from_str(value).map_err(|e| {
            AppError::internal(format!("Invalid value for header '{}': {e}", name))
        })?;
        self.response.headers.insert(name, value);
        Ok(true)
    }

    /// Applies a redirect to the response and finishes the context.
    pub fn redirect(&mut self, signal: &RedirectSignal) -> AppResult<()> {
        if self.outcome.is_terminal() {
            return Err(AppError::internal(format!(
                "Cannot redirect to '{}': request already finished as {:?}",
                signal.location, self.outcome
            )));
        }
        let location = HeaderValue::from_str(&signal.location).map_err(|e| {
            AppError::route(format!("Invalid redirect location '{}': {e}", signal.location))
        })?;
        self.response.status = signal.status_code();
        self.response.headers.insert(header::LOCATION, location);
        self.finish(Outcome::Redirect)
    }

    /// Returns the current outcome.
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Returns whether the context reached a terminal outcome.
    pub fn is_finished(&self) -> bool {
        self.outcome.is_terminal()
    }

    /// Transitions the outcome from `Pending` to a terminal value.
    ///
    /// The transition happens at most once; later attempts are rejected.
    pub fn finish(&mut self, outcome: Outcome) -> AppResult<()> {
        if !outcome.is_terminal() {
            return Err(AppError::internal("Cannot finish a request as pending"));
        }
        if self.outcome.is_terminal() {
            return Err(AppError::internal(format!(
                "Request already finished as {:?}, refusing {:?}",
                self.outcome, outcome
            )));
        }
        self.outcome = outcome;
        Ok(())
    }

    /// Records that the bundle rendered the module with this identifier.
    pub fn register_module(&mut self, identifier: impl Into<String>) {
        self.rendered_modules.insert(identifier.into());
    }

    /// Module identifiers touched during rendering, in stable order.
    pub fn rendered_modules(&self) -> impl Iterator<Item = &str> {
        self.rendered_modules.iter().map(String::as_str)
    }

    /// Stores plugin data.
    pub fn set_data(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    /// Gets plugin data.
    pub fn get_data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Gets plugin data as a string.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Gets plugin data as a bool.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(|v| v.as_bool())
    }

    /// Time since the context was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn guard_terminal(&self, operation: &str) -> bool {
        if self.outcome.is_terminal() {
            warn!(
                request_id = %self.request_id,
                outcome = ?self.outcome,
                operation = operation,
                "Ignoring response mutation on a finished request"
            );
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_target_parsing() {
        let target = RouteTarget::new("/products/3?color=red");
        assert_eq!(target.path, "/products/3");
        assert_eq!(target.query.as_deref(), Some("color=red"));
        assert_eq!(target.full_path, "/products/3?color=red");

        let root = RouteTarget::new("?x=1");
        assert_eq!(root.path, "/");
    }

    #[test]
    fn test_new_context_is_pending() {
        let ctx = Context::for_path("/about?tab=team");
        assert_eq!(ctx.outcome(), Outcome::Pending);
        assert_eq!(ctx.status(), StatusCode::OK);
        assert_eq!(ctx.route().path, "/about");
    }

    #[test]
    fn test_finish_happens_once() {
        let mut ctx = Context::for_path("/");
        ctx.finish(Outcome::Rendered).unwrap();
        assert!(ctx.finish(Outcome::Error).is_err());
        assert_eq!(ctx.outcome(), Outcome::Rendered);
    }

    #[test]
    fn test_finish_rejects_pending() {
        let mut ctx = Context::for_path("/");
        assert!(ctx.finish(Outcome::Pending).is_err());
        assert!(!ctx.is_finished());
    }

    #[test]
    fn test_redirect_sets_status_and_location() {
        let mut ctx = Context::for_path("/account");
        ctx.redirect(&RedirectSignal::to("/login")).unwrap();

        assert_eq!(ctx.status(), StatusCode::FOUND);
        assert_eq!(ctx.response_headers()[header::LOCATION], "/login");
        assert_eq!(ctx.outcome(), Outcome::Redirect);
    }

    #[test]
    fn test_response_frozen_after_finish() {
        let mut ctx = Context::for_path("/");
        ctx.redirect(&RedirectSignal::to("/a")).unwrap();

        assert!(!ctx.set_status(StatusCode::OK));
        assert!(!ctx.insert_header(header::LOCATION, "/b").unwrap());
        assert!(ctx.redirect(&RedirectSignal::to("/b")).is_err());
        assert_eq!(ctx.status(), StatusCode::FOUND);
        assert_eq!(ctx.response_headers()[header::LOCATION], "/a");
    }

    #[test]
    fn test_rendered_modules_are_deduplicated() {
        let mut ctx = Context::for_path("/");
        ctx.register_module("./src/App.vue");
        ctx.register_module("./src/App.vue");
        ctx.register_module("./src/Home.vue");

        let modules: Vec<&str> = ctx.rendered_modules().collect();
        assert_eq!(modules, vec!["./src/App.vue", "./src/Home.vue"]);
    }

    #[test]
    fn test_plugin_data() {
        let mut ctx = Context::for_path("/");
        ctx.set_data("user", serde_json::json!("ada"));
        ctx.set_data("admin", serde_json::json!(true));

        assert_eq!(ctx.get_string("user"), Some("ada"));
        assert_eq!(ctx.get_bool("admin"), Some(true));
        assert!(ctx.get_data("missing").is_none());
    }
}
