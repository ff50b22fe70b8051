//! Cookie plugin implementation.

use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::Next;
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use vellum_core::traits::adapter::middleware_fn;
use vellum_plugin::prelude::*;

/// Options accepted by [`CookiePlugin`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CookieSettings {
    /// Secret used to sign cookies.
    #[serde(default)]
    pub secret: String,
    /// Parser options handed to handlers along with the secret.
    #[serde(default)]
    pub options: Map<String, Value>,
}

/// Secret and parser options, inserted into request extensions by the
/// cookie middleware.
#[derive(Debug, Clone)]
pub struct CookieSecret {
    /// Signing secret.
    pub secret: Arc<str>,
    /// Parser options.
    pub options: Arc<Map<String, Value>>,
}

/// Registers cookie signing with the active adapter.
#[derive(Debug, Default)]
pub struct CookiePlugin;

impl CookiePlugin {
    /// Create a new cookie plugin
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Plugin for CookiePlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo::new("cookie", "Cookies", env!("CARGO_PKG_VERSION"))
            .with_description("Cookie parsing and signing keys")
    }

    fn default_options(&self) -> Value {
        json!({ "secret": "", "options": {} })
    }

    async fn install(
        &self,
        ctx: &mut InstallContext<'_>,
        options: &PluginOptions,
    ) -> AppResult<()> {
        let settings: CookieSettings = options.deserialize()?;
        if settings.secret.is_empty() {
            warn!(plugin_id = %ctx.plugin_id(), "No secret defined for cookies");
        }

        match ctx.cookie_strategy() {
            CookieStrategy::KeyStore => {
                ctx.adapter().set_cookie_keys(vec![settings.secret])?;
                debug!(adapter = ctx.adapter().name(), "Cookie keys stored in adapter");
            }
            CookieStrategy::Middleware => {
                let secret = CookieSecret {
                    secret: Arc::from(settings.secret.as_str()),
                    options: Arc::new(settings.options),
                };
                ctx.adapter()
                    .use_middleware(middleware_fn(move |mut request: Request, next: Next| {
                        let secret = secret.clone();
                        async move {
                            let jar = CookieJar::from_headers(request.headers());
                            request.extensions_mut().insert(jar);
                            request.extensions_mut().insert(secret);
                            next.run(request).await
                        }
                    }));
                debug!(adapter = ctx.adapter().name(), "Cookie middleware installed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::header;
    use axum::response::{IntoResponse, Response};
    use tower::ServiceExt;
    use vellum_core::config::app::ServerConfig;
    use vellum_core::traits::adapter::{Adapter, CookieKeys, RenderHandler};
    use vellum_plugin::PluginHost;
    use vellum_server::{AxumAdapter, MemoryAdapter};

    use super::*;

    struct CookieEcho;

    #[async_trait]
    impl RenderHandler for CookieEcho {
        async fn handle(&self, request: Request) -> Response {
            let session = request
                .extensions()
                .get::<CookieJar>()
                .and_then(|jar| jar.get("session").map(|c| c.value().to_string()))
                .unwrap_or_default();
            let secret = request
                .extensions()
                .get::<CookieSecret>()
                .map(|s| s.secret.to_string())
                .unwrap_or_default();
            let keys = request
                .extensions()
                .get::<CookieKeys>()
                .map(|k| k.0.join(","))
                .unwrap_or_default();
            format!("session={session};secret={secret};keys={keys}").into_response()
        }
    }

    fn local_options() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            shutdown_grace_seconds: 1,
            ..ServerConfig::default()
        }
    }

    async fn install_and_call(adapter: &mut dyn Adapter, options: Value) -> String {
        adapter.create_app(&local_options()).unwrap();
        let mut host = PluginHost::new();
        host.install(Arc::new(CookiePlugin::new()), options, adapter)
            .await
            .unwrap();
        adapter.setup_renderer(Arc::new(CookieEcho));
        adapter.start().await.unwrap();

        let request = axum::http::Request::get("/")
            .header(header::COOKIE, "session=abc123; theme=dark")
            .body(Body::empty())
            .unwrap();
        let response = adapter.app().unwrap().oneshot(request).await.unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        adapter.stop().await.unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_middleware_strategy_parses_cookies() {
        let mut adapter = MemoryAdapter::new();
        let body = install_and_call(&mut adapter, json!({ "secret": "s3cr3t" })).await;
        assert_eq!(body, "session=abc123;secret=s3cr3t;keys=");
    }

    #[tokio::test]
    async fn test_key_store_strategy_sets_adapter_keys() {
        let mut adapter = AxumAdapter::new();
        let body = install_and_call(&mut adapter, json!({ "secret": "s3cr3t" })).await;
        assert_eq!(body, "session=;secret=;keys=s3cr3t");
    }

    #[tokio::test]
    async fn test_empty_secret_still_installs() {
        let mut adapter = MemoryAdapter::new();
        let body = install_and_call(&mut adapter, Value::Null).await;
        assert_eq!(body, "session=abc123;secret=;keys=");
    }

    #[test]
    fn test_options_merge_over_defaults() {
        let plugin = CookiePlugin::new();
        let options = PluginOptions::merged(
            plugin.default_options(),
            json!({ "options": { "decode": false } }),
        );
        let settings: CookieSettings = options.deserialize().unwrap();
        assert_eq!(settings.secret, "");
        assert_eq!(settings.options["decode"], json!(false));
    }
}
