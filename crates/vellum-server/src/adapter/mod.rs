//! HTTP adapters.
//!
//! Both adapters share [`AppSpec`], the framework-neutral description of the
//! application (middlewares, proxies, render handler) collected through the
//! [`Adapter`](vellum_core::traits::adapter::Adapter) contract. It is
//! turned into an Axum [`Router`] when the adapter starts.

pub mod axum;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use ::axum::Router;
use ::axum::extract::Request;
use ::axum::middleware::{self as axum_middleware, Next};
use ::axum::response::{IntoResponse, Response};
use ::axum::routing::any;
use ::axum::Extension;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use vellum_core::config::app::ServerConfig;
use vellum_core::error::{AppError, ErrorKind};
use vellum_core::result::AppResult;
use vellum_core::traits::adapter::{CookieKeys, Middleware, ProxyOptions, RenderHandler};

use crate::error::ErrorPage;
use crate::middleware::logging::request_logging;
use crate::proxy::{UpstreamProxy, path_matches};

pub use self::axum::AxumAdapter;
pub use self::memory::MemoryAdapter;

/// A registered middleware, optionally scoped to a path prefix.
#[derive(Clone)]
struct MiddlewareEntry {
    scope: Option<String>,
    middleware: Middleware,
}

/// A proxy mount with its optional route middleware.
#[derive(Clone)]
struct ProxyEntry {
    upstream: Arc<UpstreamProxy>,
    middleware: Option<Middleware>,
}

/// Everything an adapter collects before it builds its router.
#[derive(Clone, Default)]
pub struct AppSpec {
    config: Option<ServerConfig>,
    middlewares: Vec<MiddlewareEntry>,
    proxies: Vec<ProxyEntry>,
    renderer: Option<Arc<dyn RenderHandler>>,
    cookie_keys: Option<CookieKeys>,
}

impl std::fmt::Debug for AppSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let proxies: Vec<&str> = self.proxies.iter().map(|p| p.upstream.mount()).collect();
        f.debug_struct("AppSpec")
            .field("created", &self.config.is_some())
            .field("middlewares", &self.middlewares.len())
            .field("proxies", &proxies)
            .field("renderer", &self.renderer.is_some())
            .field("cookie_keys", &self.cookie_keys.as_ref().map(|k| k.0.len()))
            .finish()
    }
}

impl AppSpec {
    /// Records the server options. Resets nothing that was registered.
    pub fn create(&mut self, config: &ServerConfig) {
        self.config = Some(config.clone());
    }

    /// Server options, once [`AppSpec::create`] ran.
    pub fn config(&self) -> Option<&ServerConfig> {
        self.config.as_ref()
    }

    /// Adds a global middleware.
    pub fn use_middleware(&mut self, middleware: Middleware) {
        self.middlewares.push(MiddlewareEntry {
            scope: None,
            middleware,
        });
    }

    /// Adds a middleware for requests at or below `path`.
    pub fn use_path(&mut self, path: &str, middleware: Middleware) {
        let scope = path.trim_end_matches('/');
        let scope = if scope.is_empty() { "/" } else { scope };
        self.middlewares.push(MiddlewareEntry {
            scope: Some(scope.to_string()),
            middleware,
        });
    }

    /// Adds a proxy mount.
    pub fn proxy(
        &mut self,
        path: &str,
        options: ProxyOptions,
        middleware: Option<Middleware>,
    ) -> AppResult<()> {
        let upstream = UpstreamProxy::new(path, options)?;
        if self
            .proxies
            .iter()
            .any(|p| p.upstream.mount() == upstream.mount())
        {
            return Err(AppError::configuration(format!(
                "A proxy is already mounted at '{}'",
                upstream.mount()
            )));
        }
        debug!(mount = %upstream.mount(), "Proxy registered");
        self.proxies.push(ProxyEntry {
            upstream: Arc::new(upstream),
            middleware,
        });
        Ok(())
    }

    /// Installs the render handler.
    pub fn set_renderer(&mut self, handler: Arc<dyn RenderHandler>) {
        if self.renderer.is_some() {
            warn!("Replacing previously installed render handler");
        }
        self.renderer = Some(handler);
    }

    /// The installed render handler.
    pub fn renderer(&self) -> Option<&Arc<dyn RenderHandler>> {
        self.renderer.as_ref()
    }

    /// Stores cookie signing keys, exposed to requests as an extension.
    pub fn set_cookie_keys(&mut self, keys: Vec<String>) {
        self.cookie_keys = Some(CookieKeys::new(keys));
    }

    /// Stored cookie signing keys.
    pub fn cookie_keys(&self) -> Option<&CookieKeys> {
        self.cookie_keys.as_ref()
    }

    /// Passes a request to the render handler.
    pub async fn render(&self, request: Request) -> Response {
        match &self.renderer {
            Some(handler) => handler.handle(request).await,
            None => ErrorPage::from_error(&AppError::adapter("No render handler installed"))
                .into_response(),
        }
    }

    /// Builds the application router.
    ///
    /// Layering, outermost first: tracing, timeout, request logging, cookie
    /// keys, then middlewares in registration order. Proxy mounts are matched
    /// before the render fallback.
    pub fn build_router(&self) -> AppResult<Router> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| AppError::adapter("Adapter used before create_app"))?;
        let handler = self
            .renderer
            .clone()
            .ok_or_else(|| AppError::new(ErrorKind::Adapter, "No render handler installed"))?;

        let mut router = Router::new();
        for proxy in &self.proxies {
            let mount = proxy.upstream.mount().to_string();
            let upstream = proxy.upstream.clone();
            let mut route = any(move |request: Request| {
                let upstream = upstream.clone();
                async move { upstream.forward(request).await }
            });
            if let Some(middleware) = &proxy.middleware {
                let middleware = middleware.clone();
                route = route.layer(axum_middleware::from_fn(
                    move |request: Request, next: Next| middleware(request, next),
                ));
            }
            router = router
                .route(&mount, route.clone())
                .route(&format!("{mount}/{{*rest}}"), route);
        }

        router = router.fallback(move |request: Request| {
            let handler = handler.clone();
            async move { handler.handle(request).await }
        });

        for entry in self.middlewares.iter().rev() {
            router = match &entry.scope {
                None => {
                    let middleware = entry.middleware.clone();
                    router.layer(axum_middleware::from_fn(
                        move |request: Request, next: Next| middleware(request, next),
                    ))
                }
                Some(scope) => {
                    let middleware = entry.middleware.clone();
                    let scope = scope.clone();
                    router.layer(axum_middleware::from_fn(
                        move |request: Request, next: Next| {
                            let middleware = middleware.clone();
                            let scope = scope.clone();
                            async move {
                                if scope == "/" || path_matches(&scope, request.uri().path()) {
                                    middleware(request, next).await
                                } else {
                                    next.run(request).await
                                }
                            }
                        },
                    ))
                }
            };
        }

        if let Some(keys) = &self.cookie_keys {
            router = router.layer(Extension(keys.clone()));
        }

        Ok(router
            .layer(axum_middleware::from_fn(request_logging))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.request_timeout_seconds,
            )))
            .layer(TraceLayer::new_for_http()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ::axum::body::{Body, to_bytes};
    use ::axum::http::StatusCode;
    use async_trait::async_trait;
    use tower::ServiceExt;
    use vellum_core::traits::adapter::middleware_fn;

    use super::*;

    struct Echo;

    #[async_trait]
    impl RenderHandler for Echo {
        async fn handle(&self, request: Request) -> Response {
            let keys = request
                .extensions()
                .get::<CookieKeys>()
                .and_then(|k| k.signing_key().map(str::to_string))
                .unwrap_or_default();
            format!("page:{}:{keys}", request.uri().path()).into_response()
        }
    }

    fn recording(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Middleware {
        let log = log.clone();
        middleware_fn(move |request: Request, next: Next| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(name.to_string());
                next.run(request).await
            }
        })
    }

    fn app_spec() -> AppSpec {
        let mut app = AppSpec::default();
        app.create(&ServerConfig::default());
        app.set_renderer(Arc::new(Echo));
        app
    }

    async fn get(router: Router, path: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(::axum::http::Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_middlewares_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut app = app_spec();
        app.use_middleware(recording(&log, "first"));
        app.use_path("/admin", recording(&log, "admin"));
        app.use_middleware(recording(&log, "second"));

        let router = app.build_router().unwrap();
        let (status, body) = get(router.clone(), "/admin/users").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "page:/admin/users:");
        assert_eq!(*log.lock().unwrap(), vec!["first", "admin", "second"]);

        log.lock().unwrap().clear();
        get(router, "/administrator").await;
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_middleware_can_short_circuit() {
        let mut app = app_spec();
        app.use_middleware(middleware_fn(|_request: Request, _next: Next| async {
            (StatusCode::FORBIDDEN, "blocked").into_response()
        }));

        let (status, body) = get(app.build_router().unwrap(), "/").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, "blocked");
    }

    #[tokio::test]
    async fn test_cookie_keys_reach_handler() {
        let mut app = app_spec();
        app.set_cookie_keys(vec!["k1".to_string(), "k0".to_string()]);

        let (_, body) = get(app.build_router().unwrap(), "/").await;
        assert_eq!(body, "page:/:k1");
    }

    #[tokio::test]
    async fn test_unreachable_proxy_answers_502() {
        let mut app = app_spec();
        app.proxy("/assets", ProxyOptions::new("http://127.0.0.1:9"), None)
            .unwrap();

        let router = app.build_router().unwrap();
        let (status, _) = get(router.clone(), "/assets/app.js").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, body) = get(router, "/assetsx").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "page:/assetsx:");
    }

    #[test]
    fn test_duplicate_proxy_mount_rejected() {
        let mut app = app_spec();
        app.proxy("/api", ProxyOptions::new("http://a"), None).unwrap();
        assert!(
            app.proxy("/api/", ProxyOptions::new("http://b"), None)
                .is_err()
        );
    }

    #[test]
    fn test_router_requires_renderer_and_options() {
        let mut app = AppSpec::default();
        assert!(app.build_router().is_err());
        app.create(&ServerConfig::default());
        assert!(app.build_router().is_err());
        app.set_renderer(Arc::new(Echo));
        assert!(app.build_router().is_ok());
    }
}
