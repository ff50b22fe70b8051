//! HTTP adapter contract.
//!
//! An adapter hosts the HTTP server for a concrete framework setup and
//! bridges incoming requests to the render pipeline. Every implementation
//! must behave identically from the server core's point of view; the only
//! framework-specific variation exposed to callers is the
//! [`CookieStrategy`] capability flag, consulted at plugin-install time.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::app::ServerConfig;
use crate::config::dev::ProxyRule;
use crate::error::AppError;
use crate::result::AppResult;

/// A middleware registered through [`Adapter::use_middleware`] or
/// [`Adapter::use_path`].
pub type Middleware = Arc<dyn Fn(Request, Next) -> BoxFuture<'static, Response> + Send + Sync>;

/// Wraps an async function into a [`Middleware`].
pub fn middleware_fn<F, Fut>(f: F) -> Middleware
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |request, next| Box::pin(f(request, next)))
}

/// The request handler installed by [`Adapter::setup_renderer`].
#[async_trait]
pub trait RenderHandler: Send + Sync {
    /// Renders the response for a request.
    async fn handle(&self, request: Request) -> Response;
}

/// How cookie signing is wired for a given adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieStrategy {
    /// The adapter keeps signing keys itself ([`Adapter::set_cookie_keys`]).
    KeyStore,
    /// Cookies are parsed by a middleware installed through the adapter.
    Middleware,
}

/// Cookie signing keys stored by a [`CookieStrategy::KeyStore`] adapter.
///
/// Inserted into the extensions of every request the adapter serves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieKeys(pub Arc<Vec<String>>);

impl CookieKeys {
    /// Wraps a list of keys; the first one signs, all of them verify.
    pub fn new(keys: Vec<String>) -> Self {
        Self(Arc::new(keys))
    }

    /// Key used to sign new cookies.
    pub fn signing_key(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }
}

/// Options for [`Adapter::proxy`].
#[derive(Debug, Clone)]
pub struct ProxyOptions {
    /// Upstream base URL.
    pub target: String,
    /// Whether the mount path is removed before forwarding.
    pub strip_prefix: bool,
}

impl ProxyOptions {
    /// Creates options forwarding to `target`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            strip_prefix: false,
        }
    }
}

impl From<&ProxyRule> for ProxyOptions {
    fn from(rule: &ProxyRule) -> Self {
        Self {
            target: rule.target.clone(),
            strip_prefix: rule.strip_prefix,
        }
    }
}

/// Handle on a listening HTTP server.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<(), std::io::Error>>,
}

impl ServerHandle {
    /// Creates a handle from the serving task and its shutdown channel.
    pub fn new(
        local_addr: SocketAddr,
        shutdown: watch::Sender<bool>,
        task: JoinHandle<Result<(), std::io::Error>>,
    ) -> Self {
        Self {
            local_addr,
            shutdown,
            task,
        }
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signals graceful shutdown and waits up to `grace` for in-flight
    /// requests to finish.
    pub async fn shutdown(self, grace: Duration) -> AppResult<()> {
        let _ = self.shutdown.send(true);
        let mut task = self.task;

        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(AppError::with_source(
                crate::error::ErrorKind::Adapter,
                format!("Server terminated with error: {e}"),
                e,
            )),
            Ok(Err(e)) => Err(AppError::adapter(format!("Server task failed: {e}"))),
            Err(_) => {
                warn!(
                    grace_seconds = grace.as_secs(),
                    "Graceful shutdown timed out, aborting server task"
                );
                task.abort();
                Ok(())
            }
        }
    }
}

/// Contract implemented by every HTTP adapter.
#[async_trait]
pub trait Adapter: Send + Sync + std::fmt::Debug {
    /// Short adapter name for logs.
    fn name(&self) -> &'static str;

    /// Creates the underlying application from server options.
    fn create_app(&mut self, options: &ServerConfig) -> AppResult<()>;

    /// Adds a global middleware. Middlewares run in registration order.
    fn use_middleware(&mut self, middleware: Middleware);

    /// Adds a middleware that only runs for requests under `path`.
    fn use_path(&mut self, path: &str, middleware: Middleware);

    /// Starts listening. Fails if the listener cannot be bound.
    async fn start(&mut self) -> AppResult<()>;

    /// Stops listening. Stopping a stopped adapter is a no-op.
    async fn stop(&mut self) -> AppResult<()>;

    /// Installs the handler that renders pages.
    fn setup_renderer(&mut self, handler: Arc<dyn RenderHandler>);

    /// Passes a request straight to the installed render handler.
    async fn render_middleware(&self, request: Request) -> Response;

    /// Forwards requests under `path` to an upstream.
    fn proxy(
        &mut self,
        path: &str,
        options: ProxyOptions,
        middleware: Option<Middleware>,
    ) -> AppResult<()>;

    /// The assembled application router, once created.
    fn app(&self) -> Option<Router>;

    /// The listening server, when the adapter binds a socket.
    fn http_server(&self) -> Option<&ServerHandle>;

    /// Bound port (the configured one before `start`).
    fn port(&self) -> u16;

    /// Bound host.
    fn host(&self) -> &str;

    /// Whether the adapter terminates TLS.
    fn is_https(&self) -> bool;

    /// How cookie signing must be wired for this adapter.
    fn cookie_strategy(&self) -> CookieStrategy;

    /// Stores cookie signing keys. Only supported by
    /// [`CookieStrategy::KeyStore`] adapters.
    fn set_cookie_keys(&mut self, keys: Vec<String>) -> AppResult<()>;
}
