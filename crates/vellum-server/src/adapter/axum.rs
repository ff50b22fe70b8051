//! Socket-bound adapter serving the application with `axum::serve`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::Request;
use axum::response::Response;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use vellum_core::config::app::ServerConfig;
use vellum_core::error::{AppError, ErrorKind};
use vellum_core::result::AppResult;
use vellum_core::traits::adapter::{
    Adapter, CookieStrategy, Middleware, ProxyOptions, RenderHandler, ServerHandle,
};

use super::AppSpec;

/// Adapter that binds a TCP listener and keeps signing keys itself.
#[derive(Debug, Default)]
pub struct AxumAdapter {
    app: AppSpec,
    router: Option<Router>,
    server: Option<ServerHandle>,
}

impl AxumAdapter {
    /// Creates an adapter. Call [`Adapter::create_app`] before use.
    pub fn new() -> Self {
        Self::default()
    }

    fn options(&self) -> AppResult<&ServerConfig> {
        self.app
            .config()
            .ok_or_else(|| AppError::adapter("Adapter used before create_app"))
    }
}

#[async_trait]
impl Adapter for AxumAdapter {
    fn name(&self) -> &'static str {
        "axum"
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
        if self.server.is_some() {
            warn!("Adapter already started");
            return Ok(());
        }

        let options = self.options()?.clone();
        if options.tls.enabled {
            return Err(AppError::adapter(
                "TLS termination is not supported by the axum adapter; terminate TLS in front of the server",
            ));
        }

        let router = self.app.build_router()?;
        let addr = format!("{}:{}", options.host, options.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Adapter,
                format!("Failed to bind {addr}: {e}"),
                e,
            )
        })?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let app = router.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.wait_for(|stop| *stop).await;
                })
                .await
        });

        info!(address = %local_addr, "Server listening");
        self.router = Some(router);
        self.server = Some(ServerHandle::new(local_addr, shutdown_tx, task));
        Ok(())
    }

    async fn stop(&mut self) -> AppResult<()> {
        let Some(server) = self.server.take() else {
            return Ok(());
        };
        let grace = Duration::from_secs(self.options()?.shutdown_grace_seconds);
        let addr = server.local_addr();
        server.shutdown(grace).await?;
        info!(address = %addr, "Server stopped");
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
        self.server.as_ref()
    }

    fn port(&self) -> u16 {
        match &self.server {
            Some(server) => server.local_addr().port(),
            None => self.app.config().map(|c| c.port).unwrap_or_default(),
        }
    }

    fn host(&self) -> &str {
        self.app.config().map(|c| c.host.as_str()).unwrap_or("")
    }

    fn is_https(&self) -> bool {
        self.app.config().is_some_and(|c| c.tls.enabled)
    }

    fn cookie_strategy(&self) -> CookieStrategy {
        CookieStrategy::KeyStore
    }

    fn set_cookie_keys(&mut self, keys: Vec<String>) -> AppResult<()> {
        self.app.set_cookie_keys(keys);
        Ok(())
    }
}
