//! Server bundle seam: the component renderer produced by the build.

use std::sync::Arc;

use async_trait::async_trait;

use vellum_core::result::AppResult;
use vellum_core::types::Context;

/// Renders the application markup for a request.
///
/// Implementations may fill `ctx.state` (hydration data), `ctx.title`,
/// `ctx.head` and record the modules they used with
/// [`Context::register_module`] so the renderer can emit asset hints.
#[async_trait]
pub trait AppBundle: Send + Sync + std::fmt::Debug {
    /// Produces the body markup.
    async fn render(&self, ctx: &mut Context) -> AppResult<String>;

    /// Key under which the body may be cached; `None` means uncacheable.
    fn cache_key(&self, _ctx: &Context) -> Option<String> {
        None
    }
}

type RenderFn = dyn Fn(&mut Context) -> AppResult<String> + Send + Sync;

/// Bundle backed by a synchronous closure.
#[derive(Clone)]
pub struct FnBundle {
    render: Arc<RenderFn>,
    cacheable: bool,
}

impl std::fmt::Debug for FnBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnBundle")
            .field("cacheable", &self.cacheable)
            .finish()
    }
}

impl FnBundle {
    /// Wraps a render function.
    pub fn new<F>(render: F) -> Self
    where
        F: Fn(&mut Context) -> AppResult<String> + Send + Sync + 'static,
    {
        Self {
            render: Arc::new(render),
            cacheable: false,
        }
    }

    /// Caches bodies by full request path.
    pub fn cached_by_path(mut self) -> Self {
        self.cacheable = true;
        self
    }
}

#[async_trait]
impl AppBundle for FnBundle {
    async fn render(&self, ctx: &mut Context) -> AppResult<String> {
        (self.render)(ctx)
    }

    fn cache_key(&self, ctx: &Context) -> Option<String> {
        self.cacheable.then(|| ctx.route().full_path.clone())
    }
}
