//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use vellum_core::config::AppConfig;
use vellum_core::types::Context;
use vellum_plugin::hooks::{HookAction, HookPoint};
use vellum_render::{FnBundle, HtmlTemplate, RenderManifest};
use vellum_server::{MemoryAdapter, ServerCore, ServerOptions};

/// Ordered log of hook names fired during a test.
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Test application context
pub struct TestApp {
    /// The started server
    pub server: ServerCore,
    /// Hooks observed by the recorder, in firing order
    pub events: EventLog,
}

/// Response captured from the test router
pub struct TestResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Body as text
    pub body: String,
}

/// Bundle rendering a small page that carries the request path.
pub fn app_bundle() -> FnBundle {
    FnBundle::new(|ctx: &mut Context| {
        let path = ctx.route().path.clone();
        ctx.state.insert("path".to_string(), Value::from(path.clone()));
        ctx.register_module("./src/App.vue");
        Ok(format!("<div id=\"app\"><h1>Hello from {path}</h1></div>"))
    })
}

/// Server options over [`app_bundle`] with the built-in template.
pub fn app_options(config: AppConfig) -> ServerOptions {
    ServerOptions::new(config, Arc::new(app_bundle()))
        .with_template(HtmlTemplate::default())
        .with_manifest(RenderManifest::default())
}

/// Registers a handler on every per-request hook that appends its name.
pub async fn record_hooks(server: &ServerCore) -> EventLog {
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));
    for hook in [
        HookPoint::RouteResolve,
        HookPoint::RouteError,
        HookPoint::BeforeRender,
        HookPoint::BeforeBuild,
        HookPoint::Rendered,
        HookPoint::AfterResponse,
    ] {
        let events = events.clone();
        server
            .bus()
            .on(hook, "recorder", move |_payload| {
                events.lock().unwrap().push(hook.as_str().to_string());
                Ok(HookAction::Continue)
            })
            .await;
    }
    events
}

/// Polls the log until `name` shows up or the timeout elapses.
pub async fn wait_for_event(events: &EventLog, name: &str, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if events.lock().unwrap().iter().any(|e| e == name) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

impl TestApp {
    /// Create and start a server on the in-process adapter
    pub async fn new() -> Self {
        Self::with_options(app_options(AppConfig::default())).await
    }

    /// Create and start a server from explicit options
    pub async fn with_options(options: ServerOptions) -> Self {
        let mut server = ServerCore::new(options, Box::new(MemoryAdapter::new()))
            .await
            .expect("Failed to create server");
        let events = record_hooks(&server).await;
        server.start().await.expect("Failed to start server");
        Self { server, events }
    }

    /// The started application router
    pub fn router(&self) -> Router {
        self.server.adapter().app().expect("Server not started")
    }

    /// Make a GET request and read the whole body
    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::get(path).body(Body::empty()).unwrap();
        let response = self.router().oneshot(request).await.unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        TestResponse {
            status,
            headers,
            body: String::from_utf8(body.to_vec()).unwrap(),
        }
    }

    /// Snapshot of the recorded hooks
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}
