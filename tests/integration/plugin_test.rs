//! Integration tests for plugin installation.

mod helpers;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum_extra::extract::cookie::CookieJar;
use serde_json::{Value, json};
use tower::ServiceExt;

use plugin_cookie::CookiePlugin;
use vellum_core::config::AppConfig;
use vellum_core::error::{AppError, ErrorKind};
use vellum_core::result::AppResult;
use vellum_core::types::Context;
use vellum_plugin::hooks::{HookAction, HookPoint};
use vellum_plugin::{InstallContext, Plugin, PluginInfo, PluginOptions};
use vellum_render::{FnBundle, HtmlTemplate, RenderManifest};
use vellum_server::{MemoryAdapter, ServerCore, ServerOptions};

/// Appends `label` from its options to a shared log on `beforeRender`.
#[derive(Debug)]
struct Tagger {
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Plugin for Tagger {
    fn info(&self) -> PluginInfo {
        PluginInfo::new("tagger", "Tagger", "1.0.0")
    }

    fn default_options(&self) -> Value {
        json!({ "label": "default", "style": { "color": "red" } })
    }

    async fn install(&self, ctx: &mut InstallContext<'_>, options: &PluginOptions) -> AppResult<()> {
        let label = format!(
            "{}:{}",
            options.get_str("label").unwrap_or_default(),
            options
                .pointer("/style/color")
                .and_then(Value::as_str)
                .unwrap_or_default()
        );
        let seen = self.seen.clone();
        ctx.on(HookPoint::BeforeRender, move |_payload| {
            seen.lock().unwrap().push(label.clone());
            Ok(HookAction::Continue)
        })
        .await;
        Ok(())
    }
}

/// Registers a hook, then fails.
#[derive(Debug)]
struct Broken;

#[async_trait]
impl Plugin for Broken {
    fn info(&self) -> PluginInfo {
        PluginInfo::new("broken", "Broken", "0.0.1")
    }

    async fn install(&self, ctx: &mut InstallContext<'_>, _options: &PluginOptions) -> AppResult<()> {
        ctx.on(HookPoint::BeforeRender, |_payload| Ok(HookAction::Continue))
            .await;
        Err(AppError::configuration("missing api key"))
    }
}

/// Records `beforeStart` after checking its own install already happened.
#[derive(Debug)]
struct StartWatcher {
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Plugin for StartWatcher {
    fn info(&self) -> PluginInfo {
        PluginInfo::new("start-watcher", "Start watcher", "1.0.0")
    }

    async fn install(&self, ctx: &mut InstallContext<'_>, _options: &PluginOptions) -> AppResult<()> {
        self.log.lock().unwrap().push("install".to_string());
        let log = self.log.clone();
        ctx.on(HookPoint::BeforeStart, move |_payload| {
            log.lock().unwrap().push("beforeStart".to_string());
            Ok(HookAction::Continue)
        })
        .await;
        Ok(())
    }
}

#[tokio::test]
async fn test_same_plugin_installed_twice_runs_twice() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let plugin = Arc::new(Tagger { seen: seen.clone() });

    let mut server = ServerCore::new(
        helpers::app_options(AppConfig::default()),
        Box::new(MemoryAdapter::new()),
    )
    .await
    .unwrap();
    server.add_plugin(plugin.clone(), json!({ "label": "tenant-a" }));
    server.add_plugin(plugin, json!({ "style": { "color": "blue" } }));
    server.start().await.unwrap();

    assert_eq!(server.plugins().len(), 2);
    assert_eq!(server.plugins()[0].options.get_str("label"), Some("tenant-a"));
    assert_eq!(server.plugins()[1].options.get_str("label"), Some("default"));

    let request = Request::get("/").body(Body::empty()).unwrap();
    let response = server.adapter().app().unwrap().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        *seen.lock().unwrap(),
        vec!["tenant-a:red", "default:blue"]
    );
}

#[tokio::test]
async fn test_install_failure_aborts_start() {
    let mut server = ServerCore::new(
        helpers::app_options(AppConfig::default()),
        Box::new(MemoryAdapter::new()),
    )
    .await
    .unwrap();
    server.add_plugin(Arc::new(Broken), Value::Null);

    let err = server.start().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Plugin);
    assert!(err.message.contains("broken"));
    assert!(err.message.contains("missing api key"));

    assert!(!server.is_started());
    assert!(server.plugins().is_empty());
    assert_eq!(
        server
            .bus()
            .registry()
            .handler_count(&HookPoint::BeforeRender)
            .await,
        0
    );
}

#[tokio::test]
async fn test_before_start_fires_after_install() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut server = ServerCore::new(
        helpers::app_options(AppConfig::default()),
        Box::new(MemoryAdapter::new()),
    )
    .await
    .unwrap();
    server.add_plugin(Arc::new(StartWatcher { log: log.clone() }), Value::Null);

    server.start().await.unwrap();
    server.start().await.unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["install", "beforeStart"]);
}

#[tokio::test]
async fn test_cookie_plugin_exposes_jar_to_bundle() {
    let bundle = FnBundle::new(|ctx: &mut Context| {
        let user = ctx
            .extensions
            .get::<CookieJar>()
            .and_then(|jar| jar.get("user").map(|c| c.value().to_string()))
            .unwrap_or_else(|| "anonymous".to_string());
        Ok(format!("<p>Hi {user}</p>"))
    });
    let options = ServerOptions::new(AppConfig::default(), Arc::new(bundle))
        .with_template(HtmlTemplate::default())
        .with_manifest(RenderManifest::default());
    let mut server = ServerCore::new(options, Box::new(MemoryAdapter::new()))
        .await
        .unwrap();
    server.add_plugin(Arc::new(CookiePlugin::new()), json!({ "secret": "s3cr3t" }));
    server.start().await.unwrap();

    let request = Request::get("/")
        .header(header::COOKIE, "user=ada")
        .body(Body::empty())
        .unwrap();
    let response = server.adapter().app().unwrap().oneshot(request).await.unwrap();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(body.to_vec()).unwrap();

    assert!(html.contains("<p>Hi ada</p>"));
    assert_eq!(server.plugins()[0].options.get_str("secret"), Some("s3cr3t"));
}
