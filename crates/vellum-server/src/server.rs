//! Server core: plugin installation, startup sequence, and the per-request
//! render pipeline behind the adapter's render middleware.

use std::convert::Infallible;
use std::sync::Arc;
use std::task::Poll;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::{HeaderValue, Method, header};
use axum::response::Response;
use futures::{StreamExt, stream};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use vellum_core::config::AppConfig;
use vellum_core::error::{AppError, ErrorKind};
use vellum_core::result::AppResult;
use vellum_core::traits::adapter::{Adapter, ProxyOptions, RenderHandler};
use vellum_core::types::{Context, Outcome};
use vellum_plugin::hooks::{HookBus, HookFlow, HookPayload, HookPoint};
use vellum_plugin::{InstalledPlugin, Plugin, PluginHost};
use vellum_render::{
    AppBundle, AssetPredicate, Directive, HtmlTemplate, RenderCache, RenderManifest,
    RenderOutcome, Renderer, ResolveState, RouteResolver,
};

use crate::error::ErrorPage;

/// Context data key a `routeError` handler may set to an HTML string that
/// replaces the built-in error document.
pub const ERROR_PAGE_DATA_KEY: &str = "errorPage";

/// Programmatic server options: configuration plus the pieces that cannot
/// be expressed in a config file.
pub struct ServerOptions {
    config: AppConfig,
    bundle: Arc<dyn AppBundle>,
    template: Option<HtmlTemplate>,
    manifest: Option<RenderManifest>,
    directives: Vec<(String, Directive)>,
    preload: Option<AssetPredicate>,
    prefetch: Option<AssetPredicate>,
}

impl std::fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerOptions")
            .field("config", &self.config)
            .field("bundle", &self.bundle)
            .field("template", &self.template.is_some())
            .field("manifest", &self.manifest.is_some())
            .finish()
    }
}

impl ServerOptions {
    /// Options for a configuration and an application bundle.
    ///
    /// Template and manifest are read from `paths` when the server is built,
    /// unless provided here.
    pub fn new(config: AppConfig, bundle: Arc<dyn AppBundle>) -> Self {
        Self {
            config,
            bundle,
            template: None,
            manifest: None,
            directives: Vec::new(),
            preload: None,
            prefetch: None,
        }
    }

    /// Uses a parsed template instead of reading it from disk.
    pub fn with_template(mut self, template: HtmlTemplate) -> Self {
        self.template = Some(template);
        self
    }

    /// Uses a manifest instead of reading it from disk.
    pub fn with_manifest(mut self, manifest: RenderManifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Registers a template directive.
    pub fn with_directive(mut self, name: &str, directive: Directive) -> Self {
        self.directives.push((name.to_string(), directive));
        self
    }

    /// Replaces the preload predicate.
    pub fn with_preload(mut self, predicate: AssetPredicate) -> Self {
        self.preload = Some(predicate);
        self
    }

    /// Replaces the prefetch predicate.
    pub fn with_prefetch(mut self, predicate: AssetPredicate) -> Self {
        self.prefetch = Some(predicate);
        self
    }

    /// The configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    async fn build_renderer(self, bus: Arc<HookBus>) -> (AppConfig, Renderer) {
        let template = match self.template {
            Some(template) => template,
            None => HtmlTemplate::load_or_default(&self.config.paths.template_path()).await,
        };
        let manifest = match self.manifest {
            Some(manifest) => manifest,
            None => RenderManifest::load_or_default(&self.config.paths.manifest_path()).await,
        };

        let mut renderer = Renderer::new(bus, self.bundle)
            .with_template(template)
            .with_manifest(manifest)
            .with_cache(RenderCache::from_config(&self.config.renderer.cache));
        for (name, directive) in self.directives {
            renderer = renderer.with_directive(&name, directive);
        }
        if let Some(predicate) = self.preload {
            renderer = renderer.with_preload(predicate);
        }
        if let Some(predicate) = self.prefetch {
            renderer = renderer.with_prefetch(predicate);
        }
        (self.config, renderer)
    }
}

/// Per-request pipeline installed as the adapter's render handler.
#[derive(Debug)]
pub struct RenderPipeline {
    config: Arc<AppConfig>,
    bus: Arc<HookBus>,
    resolver: RouteResolver,
    renderer: Renderer,
}

impl RenderPipeline {
    /// Creates a pipeline over a renderer sharing `bus`.
    pub fn new(config: Arc<AppConfig>, bus: Arc<HookBus>, renderer: Renderer) -> Self {
        Self {
            config,
            resolver: RouteResolver::new(bus.clone()),
            bus,
            renderer,
        }
    }

    /// The renderer.
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Produces the document for a request. The context ends in a terminal
    /// outcome.
    pub async fn process(&self, ctx: &mut Context) -> String {
        let path = ctx.route().path.clone();
        if self.config.is_spa_path(&path) {
            debug!(request_id = %ctx.request_id, path = %path, "Serving SPA shell");
            let page = self.renderer.render_spa_page().await;
            self.finish(ctx, Outcome::Rendered);
            return page;
        }

        let target = ctx.route().clone();
        if let ResolveState::Redirected(signal) = self.resolver.resolve(ctx, target, None).await {
            if ctx.outcome() == Outcome::Redirect {
                return String::new();
            }
            let error = AppError::route(format!(
                "Redirect to '{}' could not be applied",
                signal.location
            ));
            return self.fail(ctx, error).await;
        }

        match self.renderer.render(ctx).await {
            Ok(RenderOutcome::Rendered(body)) => {
                let page = self.renderer.render_ssr_page(&body, ctx).await;
                self.finish(ctx, Outcome::Rendered);
                page
            }
            Ok(RenderOutcome::Redirect(signal)) => match ctx.redirect(&signal) {
                Ok(()) => String::new(),
                Err(e) => self.fail(ctx, e).await,
            },
            Err(e) => self.fail(ctx, e).await,
        }
    }

    async fn fail(&self, ctx: &mut Context, error: AppError) -> String {
        let page = ErrorPage::from_error(&error);
        ctx.set_status(page.status());
        self.finish(ctx, Outcome::Error);
        self.bus
            .fire(&mut HookPayload::route_error(&error, ctx))
            .await;
        match ctx.get_string(ERROR_PAGE_DATA_KEY) {
            Some(custom) => custom.to_string(),
            None => page.html(),
        }
    }

    fn finish(&self, ctx: &mut Context, outcome: Outcome) {
        if let Err(e) = ctx.finish(outcome) {
            warn!(request_id = %ctx.request_id, error = %e, "Outcome already decided");
        }
    }

    /// Builds the response and arranges for `afterResponse` to fire once the
    /// body reached end-of-stream.
    fn respond(&self, ctx: Context, page: String) -> Response {
        let (flushed_tx, flushed_rx) = oneshot::channel::<()>();
        let mut flushed_tx = Some(flushed_tx);
        // HEAD bodies are never polled by the transport.
        if ctx.method == Method::HEAD {
            if let Some(tx) = flushed_tx.take() {
                let _ = tx.send(());
            }
        }
        let chunks = stream::iter([Ok::<Bytes, Infallible>(Bytes::from(page))]).chain(
            stream::poll_fn(move |_cx| {
                if let Some(tx) = flushed_tx.take() {
                    let _ = tx.send(());
                }
                Poll::Ready(None)
            }),
        );

        let mut response = Response::new(Body::from_stream(chunks));
        *response.status_mut() = ctx.status();
        for (name, value) in ctx.response_headers() {
            response.headers_mut().insert(name.clone(), value.clone());
        }
        if ctx.outcome() != Outcome::Redirect {
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            );
        }

        let bus = self.bus.clone();
        tokio::spawn(async move {
            let mut ctx = ctx;
            match flushed_rx.await {
                Ok(()) => {
                    bus.fire(&mut HookPayload::with_context(
                        HookPoint::AfterResponse,
                        &mut ctx,
                    ))
                    .await;
                    debug!(
                        request_id = %ctx.request_id,
                        outcome = ?ctx.outcome(),
                        elapsed_ms = ctx.elapsed().as_millis() as u64,
                        "Response completed"
                    );
                }
                Err(_) => warn!(
                    request_id = %ctx.request_id,
                    path = %ctx.route().path,
                    "Client went away before the response was sent, skipping afterResponse"
                ),
            }
        });

        response
    }
}

#[async_trait]
impl RenderHandler for RenderPipeline {
    async fn handle(&self, request: Request) -> Response {
        let (parts, _body) = request.into_parts();
        let mut ctx = Context::new(parts.method, parts.uri, parts.headers)
            .with_extensions(parts.extensions);
        let page = self.process(&mut ctx).await;
        self.respond(ctx, page)
    }
}

/// The server: owns the plugin host, the adapter and the render pipeline.
#[derive(Debug)]
pub struct ServerCore {
    config: Arc<AppConfig>,
    host: PluginHost,
    adapter: Box<dyn Adapter>,
    pipeline: Arc<RenderPipeline>,
    wired: bool,
    started: bool,
}

impl ServerCore {
    /// Creates the server and the adapter's application. Nothing listens
    /// until [`ServerCore::start`].
    pub async fn new(options: ServerOptions, mut adapter: Box<dyn Adapter>) -> AppResult<Self> {
        let host = PluginHost::new();
        let (config, renderer) = options.build_renderer(host.bus().clone()).await;
        let config = Arc::new(config);

        adapter.create_app(&config.server)?;
        let pipeline = Arc::new(RenderPipeline::new(
            config.clone(),
            host.bus().clone(),
            renderer,
        ));

        info!(adapter = adapter.name(), "Server created");
        Ok(Self {
            config,
            host,
            adapter,
            pipeline,
            wired: false,
            started: false,
        })
    }

    /// Queues a plugin; it is installed by the next [`ServerCore::start`].
    pub fn add_plugin(&mut self, plugin: Arc<dyn Plugin>, options: Value) {
        if self.started {
            warn!(
                plugin_id = %plugin.info().id,
                "Plugin added after start; it is installed on the next start"
            );
        }
        self.host.add_plugin(plugin, options);
    }

    /// Installs plugins, fires `beforeStart`, wires the renderer and
    /// proxies, then starts the adapter.
    pub async fn start(&mut self) -> AppResult<()> {
        if self.started {
            warn!("Server already started");
            return Ok(());
        }

        let installed = self.host.install_pending(self.adapter.as_mut()).await?;
        debug!(installed = installed, "Plugins installed");

        match self.host.bus().invoke(&mut HookPayload::start()).await {
            HookFlow::Continue => {}
            HookFlow::Redirect(signal) => warn!(
                location = %signal.location,
                "Redirect ignored, beforeStart cannot redirect"
            ),
            HookFlow::Fail { plugin_id, error } => {
                return Err(AppError::with_source(
                    ErrorKind::Plugin,
                    format!(
                        "beforeStart handler of plugin '{plugin_id}' failed: {}",
                        error.message
                    ),
                    error,
                ));
            }
        }

        if !self.wired {
            self.adapter.setup_renderer(self.pipeline.clone());
            for rule in &self.config.dev_server.proxy {
                self.adapter
                    .proxy(&rule.path, ProxyOptions::from(rule), None)?;
                info!(path = %rule.path, target = %rule.target, "Dev proxy configured");
            }
            self.wired = true;
        }

        self.adapter.start().await?;
        self.started = true;
        info!(
            adapter = self.adapter.name(),
            host = %self.adapter.host(),
            port = self.adapter.port(),
            plugins = self.host.plugins().len(),
            "Server started"
        );
        Ok(())
    }

    /// Stops the adapter. Stopping a stopped server is a no-op.
    pub async fn stop(&mut self) -> AppResult<()> {
        self.adapter.stop().await?;
        if self.started {
            self.started = false;
            info!("Server stopped");
        }
        Ok(())
    }

    /// Renders a request without going through the adapter's router.
    pub async fn render_middleware(&self, request: Request) -> Response {
        self.pipeline.handle(request).await
    }

    /// Swaps the client manifest.
    pub async fn reload_manifest(&self, manifest: RenderManifest) {
        self.pipeline.renderer().reload_manifest(manifest).await;
    }

    /// Whether the server is started.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// The adapter.
    pub fn adapter(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }

    /// Mutable access to the adapter, for wiring middlewares before start.
    pub fn adapter_mut(&mut self) -> &mut dyn Adapter {
        self.adapter.as_mut()
    }

    /// The hook bus shared by plugins and the pipeline.
    pub fn bus(&self) -> &Arc<HookBus> {
        self.host.bus()
    }

    /// Installed plugins.
    pub fn plugins(&self) -> &[InstalledPlugin] {
        self.host.plugins()
    }

    /// Number of plugins installed or queued.
    pub fn plugin_count(&self) -> usize {
        self.host.plugin_count()
    }

    /// The renderer.
    pub fn renderer(&self) -> &Renderer {
        self.pipeline.renderer()
    }

    /// The configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Bound port.
    pub fn port(&self) -> u16 {
        self.adapter.port()
    }

    /// Bound host.
    pub fn host(&self) -> &str {
        self.adapter.host()
    }
}
