//! Page renderer: runs the render hooks around the bundle and assembles
//! full HTML documents.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use vellum_core::error::{AppError, ErrorKind};
use vellum_core::result::AppResult;
use vellum_core::types::{Context, RedirectSignal};
use vellum_plugin::hooks::{HookBus, HookFlow, HookPayload, HookPoint};

use crate::bundle::AppBundle;
use crate::cache::RenderCache;
use crate::manifest::{AssetKind, RenderManifest};
use crate::template::{
    DocumentParts, HtmlTemplate, escape_html, escape_script_json, render_attrs,
};

/// Attribute marking the hydration state script.
pub const STATE_MARKER: &str = "data-vellum-state";
/// Attribute marking the client takeover script of the SPA shell.
pub const SPA_MARKER: &str = "data-vellum-spa";
/// Id of the element the client application mounts on.
pub const MOUNT_ID: &str = "app";

/// Produces the markup of a `<!--vellum:NAME-->` template marker.
///
/// Receives the request context, or `None` when rendering the SPA shell.
pub type Directive = Arc<dyn Fn(Option<&Context>) -> String + Send + Sync>;

/// Decides whether a manifest file gets a resource hint.
pub type AssetPredicate = Arc<dyn Fn(&str, AssetKind) -> bool + Send + Sync>;

/// Result of [`Renderer::render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Body markup.
    Rendered(String),
    /// A render hook redirected.
    Redirect(RedirectSignal),
}

/// Renders request contexts into HTML documents.
pub struct Renderer {
    bus: Arc<HookBus>,
    bundle: Arc<dyn AppBundle>,
    template: HtmlTemplate,
    manifest: RwLock<Arc<RenderManifest>>,
    spa_page: RwLock<Option<Arc<str>>>,
    cache: Option<RenderCache>,
    directives: HashMap<String, Directive>,
    should_preload: AssetPredicate,
    should_prefetch: AssetPredicate,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut directives: Vec<&String> = self.directives.keys().collect();
        directives.sort();
        f.debug_struct("Renderer")
            .field("bundle", &self.bundle)
            .field("cache", &self.cache.is_some())
            .field("directives", &directives)
            .finish()
    }
}

impl Renderer {
    /// Creates a renderer with the built-in template and an empty manifest.
    pub fn new(bus: Arc<HookBus>, bundle: Arc<dyn AppBundle>) -> Self {
        Self {
            bus,
            bundle,
            template: HtmlTemplate::default(),
            manifest: RwLock::new(Arc::new(RenderManifest::default())),
            spa_page: RwLock::new(None),
            cache: None,
            directives: HashMap::new(),
            should_preload: Arc::new(default_should_preload),
            should_prefetch: Arc::new(default_should_prefetch),
        }
    }

    /// Uses a document template.
    pub fn with_template(mut self, template: HtmlTemplate) -> Self {
        self.template = template;
        self
    }

    /// Uses a client manifest.
    pub fn with_manifest(mut self, manifest: RenderManifest) -> Self {
        self.manifest = RwLock::new(Arc::new(manifest));
        self
    }

    /// Caches bodies for which the bundle returns a cache key.
    pub fn with_cache(mut self, cache: Option<RenderCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Registers a template directive.
    pub fn with_directive(mut self, name: &str, directive: Directive) -> Self {
        self.directives.insert(name.to_string(), directive);
        self
    }

    /// Replaces the preload predicate.
    pub fn with_preload(mut self, predicate: AssetPredicate) -> Self {
        self.should_preload = predicate;
        self
    }

    /// Replaces the prefetch predicate.
    pub fn with_prefetch(mut self, predicate: AssetPredicate) -> Self {
        self.should_prefetch = predicate;
        self
    }

    /// Renders the body for a request.
    ///
    /// Runs `beforeRender`, `beforeBuild`, the bundle (or a cache hit), then
    /// `rendered`. A redirect from any of them ends rendering early. Failures
    /// are returned as [`ErrorKind::Render`] errors and are not retried.
    pub async fn render(&self, ctx: &mut Context) -> AppResult<RenderOutcome> {
        for hook in [HookPoint::BeforeRender, HookPoint::BeforeBuild] {
            if let Some(signal) = self.run_hook(hook, ctx).await? {
                return Ok(RenderOutcome::Redirect(signal));
            }
        }

        let body = self.render_body(ctx).await?;

        if let Some(signal) = self.run_hook(HookPoint::Rendered, ctx).await? {
            return Ok(RenderOutcome::Redirect(signal));
        }

        Ok(RenderOutcome::Rendered(body))
    }

    async fn run_hook(
        &self,
        hook: HookPoint,
        ctx: &mut Context,
    ) -> AppResult<Option<RedirectSignal>> {
        match self
            .bus
            .invoke(&mut HookPayload::with_context(hook, ctx))
            .await
        {
            HookFlow::Continue => Ok(None),
            HookFlow::Redirect(signal) => Ok(Some(signal)),
            HookFlow::Fail { plugin_id, error } => Err(AppError::with_source(
                ErrorKind::Render,
                format!(
                    "Hook '{hook}' of plugin '{plugin_id}' failed: {}",
                    error.message
                ),
                error,
            )),
        }
    }

    async fn render_body(&self, ctx: &mut Context) -> AppResult<String> {
        let cache_key = match &self.cache {
            Some(_) => self.bundle.cache_key(ctx),
            None => None,
        };

        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(body) = cache.get(key).await {
                debug!(request_id = %ctx.request_id, key = %key, "Serving cached body");
                return Ok(body.to_string());
            }
        }

        let body = AssertUnwindSafe(self.bundle.render(ctx))
            .catch_unwind()
            .await
            .map_err(|_| AppError::render("Application bundle panicked while rendering"))?
            .map_err(|e| {
                let message = format!("Application bundle failed: {}", e.message);
                AppError::with_source(ErrorKind::Render, message, e)
            })?;

        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
            cache.insert(key, Arc::from(body.as_str())).await;
        }

        Ok(body)
    }

    /// Wraps a rendered body into a full document with hydration state.
    pub async fn render_ssr_page(&self, body: &str, ctx: &Context) -> String {
        let manifest = self.manifest().await;
        let modules: Vec<&str> = ctx.rendered_modules().collect();

        let mut head = String::new();
        if let Some(title) = &ctx.title {
            let _ = writeln!(head, "<title>{}</title>", escape_html(title));
        }
        for fragment in &ctx.head {
            head.push_str(fragment);
            head.push('\n');
        }
        self.push_resource_hints(&mut head, &manifest, &modules);
        push_styles(&mut head, &manifest, manifest.styles(modules.iter().copied()));

        let state = match serde_json::to_string(&ctx.state) {
            Ok(json) => json,
            Err(e) => {
                warn!(request_id = %ctx.request_id, error = %e, "Hydration state not serializable");
                "{}".to_string()
            }
        };

        let mut body_block = String::with_capacity(body.len() + state.len() + 128);
        body_block.push_str(body);
        let _ = write!(
            body_block,
            "<script {STATE_MARKER}>window.__VELLUM_STATE__={}</script>",
            escape_script_json(&state)
        );
        push_scripts(&mut body_block, &manifest);

        let html_attrs = render_attrs(&ctx.html_attrs);
        let body_attrs = render_attrs(&ctx.body_attrs);
        let parts = DocumentParts {
            html_attrs: &html_attrs,
            body_attrs: &body_attrs,
            head: &head,
            body: &body_block,
        };

        self.template
            .render(&parts, |name| self.directive(name, Some(ctx)))
    }

    /// Client-only shell for SPA paths. Built once per manifest.
    pub async fn render_spa_page(&self) -> String {
        if let Some(page) = self.spa_page.read().await.as_ref() {
            return page.to_string();
        }

        let manifest = self.manifest().await;
        let mut head = String::new();
        self.push_resource_hints(&mut head, &manifest, &[]);
        push_styles(&mut head, &manifest, manifest.styles([]));

        let mut body = format!(
            "<div id=\"{MOUNT_ID}\"></div><script {SPA_MARKER}>window.__VELLUM_SPA__=true</script>"
        );
        push_scripts(&mut body, &manifest);

        let parts = DocumentParts {
            head: &head,
            body: &body,
            ..DocumentParts::default()
        };
        let page: Arc<str> = Arc::from(self.template.render(&parts, |name| self.directive(name, None)));

        *self.spa_page.write().await = Some(page.clone());
        debug!(bytes = page.len(), "SPA shell built");
        page.to_string()
    }

    /// Replaces the client manifest, dropping everything derived from it.
    pub async fn reload_manifest(&self, manifest: RenderManifest) {
        let assets = manifest.all.len();
        *self.manifest.write().await = Arc::new(manifest);
        *self.spa_page.write().await = None;
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
        info!(assets = assets, "Client manifest reloaded");
    }

    /// Current client manifest.
    pub async fn manifest(&self) -> Arc<RenderManifest> {
        self.manifest.read().await.clone()
    }

    /// Whether a file gets `<link rel=preload>`.
    pub fn should_preload(&self, file: &str, kind: AssetKind) -> bool {
        (self.should_preload)(file, kind)
    }

    /// Whether a file gets `<link rel=prefetch>`.
    pub fn should_prefetch(&self, file: &str, kind: AssetKind) -> bool {
        (self.should_prefetch)(file, kind)
    }

    /// Returns the hook bus.
    pub fn bus(&self) -> &Arc<HookBus> {
        &self.bus
    }

    fn directive(&self, name: &str, ctx: Option<&Context>) -> Option<String> {
        self.directives.get(name).map(|directive| directive(ctx))
    }

    fn push_resource_hints(&self, head: &mut String, manifest: &RenderManifest, modules: &[&str]) {
        for hint in manifest.preload_candidates(modules.iter().copied()) {
            let Some(as_attr) = hint.kind.as_attr() else {
                continue;
            };
            if !self.should_preload(&hint.file, hint.kind) {
                continue;
            }
            let crossorigin = if hint.kind == AssetKind::Font {
                " crossorigin"
            } else {
                ""
            };
            let _ = writeln!(
                head,
                "<link rel=\"preload\" href=\"{}\" as=\"{as_attr}\"{crossorigin}>",
                escape_html(&manifest.asset_url(&hint.file))
            );
        }

        for hint in manifest.prefetch_candidates(modules.iter().copied()) {
            if self.should_prefetch(&hint.file, hint.kind) {
                let _ = writeln!(
                    head,
                    "<link rel=\"prefetch\" href=\"{}\">",
                    escape_html(&manifest.asset_url(&hint.file))
                );
            }
        }
    }
}

fn push_styles(head: &mut String, manifest: &RenderManifest, styles: Vec<&str>) {
    for style in styles {
        let _ = writeln!(
            head,
            "<link rel=\"stylesheet\" href=\"{}\">",
            escape_html(&manifest.asset_url(style))
        );
    }
}

fn push_scripts(body: &mut String, manifest: &RenderManifest) {
    for script in manifest.scripts() {
        let _ = write!(
            body,
            "<script src=\"{}\" defer></script>",
            escape_html(&manifest.asset_url(script))
        );
    }
}

fn default_should_preload(_file: &str, kind: AssetKind) -> bool {
    matches!(kind, AssetKind::Script | AssetKind::Style | AssetKind::Font)
}

fn default_should_prefetch(_file: &str, kind: AssetKind) -> bool {
    kind == AssetKind::Script
}
