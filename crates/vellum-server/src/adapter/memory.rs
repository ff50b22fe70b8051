//! In-process adapter. Serves requests through the router without binding a
//! socket; used by tests and for embedding the server in another service.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::extract::Request;
use axum::response::Response;
use tower::ServiceExt;
use tracing::{debug, warn};

use vellum_core::config::app::ServerConfig;
use vellum_core::error::AppError;
use vellum_core::result::AppResult;
use vellum_core::traits::adapter::{
    Adapter, CookieStrategy, Middleware, ProxyOptions, RenderHandler, ServerHandle,
};

use super::AppSpec;

/// Adapter without a listener. Cookies are handled by middleware.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    app: AppSpec,
    router: Option<Router>,
}

impl MemoryAdapter {
    /// Creates an adapter. Call [`Adapter::create_app`] before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends a request through the started application.
    pub async fn dispatch(&self, request: Request) -> AppResult<Response> {
        let router = self
            .router
            .clone()
            .ok_or_else(|| AppError::adapter("Memory adapter is not started"))?;
        match router.oneshot(request).await {
            Ok(response) => Ok(response),
            Err(never) => match never {},
        }
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn create_app(&mut self, options: &ServerConfig) -> AppResult<()> {
        self.app.create(options);
        Ok(())
    }

    fn use_middleware(&mut self, middleware: Middleware) {
        self.app.use_middleware(middleware);
    }

    fn use_path(&mut self, path: &str, middleware: Middleware) {
        self.app.use_path(path, middleware);
    }

    async fn start(&mut self) -> AppResult<()> {
        if self.router.is_some() {
            warn!("Adapter already started");
            return Ok(());
        }
        self.router = Some(self.app.build_router()?);
        debug!("In-process application ready");
        Ok(())
    }

    async fn stop(&mut self) -> AppResult<()> {
        self.router = None;
        Ok(())
    }

    fn setup_renderer(&mut self, handler: Arc<dyn RenderHandler>) {
        self.app.set_renderer(handler);
    }

    async fn render_middleware(&self, request: Request) -> Response {
        self.app.render(request).await
    }

    fn proxy(
        &mut self,
        path: &str,
        options: ProxyOptions,
        middleware: Option<Middleware>,
    ) -> AppResult<()> {
        self.app.proxy(path, options, middleware)
    }

    fn app(&self) -> Option<Router> {
        self.router.clone()
    }

    fn http_server(&self) -> Option<&ServerHandle> {
        None
    }

    fn port(&self) -> u16 {
        self.app.config().map(|c| c.port).unwrap_or_default()
    }

    fn host(&self) -> &str {
        self.app.config().map(|c| c.host.as_str()).unwrap_or("")
    }

    fn is_https(&self) -> bool {
        false
    }

    fn cookie_strategy(&self) -> CookieStrategy {
        CookieStrategy::Middleware
    }

    fn set_cookie_keys(&mut self, _keys: Vec<String>) -> AppResult<()> {
        Err(AppError::adapter(
            "The memory adapter does not store cookie keys; install a cookie middleware instead",
        ))
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::response::IntoResponse;

    use super::*;

    struct PathEcho;

    #[async_trait]
    impl RenderHandler for PathEcho {
        async fn handle(&self, request: Request) -> Response {
            request.uri().path().to_string().into_response()
        }
    }

    #[tokio::test]
    async fn test_dispatch_after_start() {
        let mut adapter = MemoryAdapter::new();
        adapter.create_app(&ServerConfig::default()).unwrap();
        adapter.setup_renderer(Arc::new(PathEcho));

        let request = || axum::http::Request::get("/about").body(Body::empty()).unwrap();
        assert!(adapter.dispatch(request()).await.is_err());

        adapter.start().await.unwrap();
        let response = adapter.dispatch(request()).await.unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"/about");

        adapter.stop().await.unwrap();
        assert!(adapter.app().is_none());
    }

    #[tokio::test]
    async fn test_render_middleware_bypasses_router() {
        let mut adapter = MemoryAdapter::new();
        adapter.setup_renderer(Arc::new(PathEcho));
        let response = adapter
            .render_middleware(axum::http::Request::get("/direct").body(Body::empty()).unwrap())
            .await;
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"/direct");
    }

    #[test]
    fn test_rejects_cookie_keys() {
        let mut adapter = MemoryAdapter::new();
        assert_eq!(adapter.cookie_strategy(), CookieStrategy::Middleware);
        assert!(adapter.set_cookie_keys(vec!["k".to_string()]).is_err());
    }
}
