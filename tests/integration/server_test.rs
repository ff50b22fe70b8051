//! Integration tests for the request lifecycle.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use regex::Regex;
use serde_json::json;
use tower::ServiceExt;

use vellum_core::config::AppConfig;
use vellum_core::config::app::ServerConfig;
use vellum_core::types::RedirectSignal;
use vellum_plugin::hooks::{HookAction, HookPoint};
use vellum_render::{RenderManifest, module_hash};
use vellum_server::{AxumAdapter, ServerCore};

const SETTLE: Duration = Duration::from_millis(100);
const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_get_root_renders_with_hooks_in_order() {
    let app = helpers::TestApp::new().await;

    let response = app.get("/").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("<h1>Hello from /</h1>"));
    assert!(helpers::wait_for_event(&app.events, "afterResponse", WAIT).await);
    assert_eq!(
        app.events(),
        vec![
            "routeResolve",
            "beforeRender",
            "beforeBuild",
            "rendered",
            "afterResponse"
        ]
    );
}

#[tokio::test]
async fn test_after_response_waits_for_body() {
    let app = helpers::TestApp::new().await;

    let request = Request::get("/").body(Body::empty()).unwrap();
    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::sleep(SETTLE).await;
    assert!(app.events().contains(&"rendered".to_string()));
    assert!(!app.events().contains(&"afterResponse".to_string()));

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(!body.is_empty());
    assert!(helpers::wait_for_event(&app.events, "afterResponse", WAIT).await);
}

#[tokio::test]
async fn test_dropped_body_skips_after_response() {
    let app = helpers::TestApp::new().await;

    let request = Request::get("/").body(Body::empty()).unwrap();
    let response = app.router().oneshot(request).await.unwrap();
    drop(response);

    assert!(!helpers::wait_for_event(&app.events, "afterResponse", SETTLE).await);
}

#[tokio::test]
async fn test_ssr_document_structure() {
    let app = helpers::TestApp::new().await;

    let html = app.get("/products/3").await.body;

    let count = |pattern: &str| Regex::new(pattern).unwrap().find_iter(&html).count();
    assert_eq!(count(r"<html[\s>]"), 1);
    assert_eq!(count(r"<head>"), 1);
    assert_eq!(count(r"<script data-vellum-state>"), 1);
    assert!(html.contains(r#"window.__VELLUM_STATE__={"path":"/products/3"}"#));

    let body = Regex::new(r"(?s)<body[^>]*>(.*)</body>")
        .unwrap()
        .captures(&html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap();
    let stripped = Regex::new(r"(?s)<script[^>]*>.*?</script>")
        .unwrap()
        .replace_all(&body, "");
    assert_eq!(stripped, "<div id=\"app\"><h1>Hello from /products/3</h1></div>");
}

#[tokio::test]
async fn test_spa_paths_get_shell_only() {
    let config = AppConfig {
        spa_paths: vec!["/dashboard/*".to_string()],
        ..AppConfig::default()
    };
    let app = helpers::TestApp::with_options(helpers::app_options(config)).await;

    let response = app.get("/dashboard/stats").await;

    assert_eq!(response.status, StatusCode::OK);
    let takeover = Regex::new(r"<script data-vellum-spa>").unwrap();
    assert_eq!(takeover.find_iter(&response.body).count(), 1);
    assert!(!response.body.contains("Hello from"));
    assert!(!response.body.contains("data-vellum-state"));

    assert!(helpers::wait_for_event(&app.events, "afterResponse", WAIT).await);
    assert_eq!(app.events(), vec!["afterResponse"]);
}

#[tokio::test]
async fn test_route_redirect_sends_location() {
    let app = helpers::TestApp::new().await;
    app.server
        .bus()
        .on(HookPoint::RouteResolve, "auth", |payload| {
            let private = payload
                .context()
                .is_some_and(|ctx| ctx.route().path.starts_with("/account"));
            if private {
                Ok(HookAction::Redirect(RedirectSignal::to("/login")))
            } else {
                Ok(HookAction::Continue)
            }
        })
        .await;

    let response = app.get("/account/settings").await;
    assert_eq!(response.status, StatusCode::FOUND);
    assert_eq!(response.headers[header::LOCATION], "/login");
    assert!(response.body.is_empty());

    assert!(helpers::wait_for_event(&app.events, "afterResponse", WAIT).await);
    assert!(!app.events().contains(&"beforeRender".to_string()));

    let response = app.get("/").await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_manifest_drives_resource_hints() {
    let manifest = RenderManifest::from_json(
        &json!({
            "publicPath": "/dist/",
            "all": ["app.js", "app.css", "about.js", "home.js"],
            "initial": ["app.js", "app.css"],
            "async": ["about.js", "home.js"],
            "modules": { module_hash("./src/App.vue"): [3] }
        })
        .to_string(),
    )
    .unwrap();
    let options = helpers::app_options(AppConfig::default()).with_manifest(manifest);
    let app = helpers::TestApp::with_options(options).await;

    let html = app.get("/").await.body;

    assert!(html.contains(r#"<link rel="preload" href="/dist/app.js" as="script">"#));
    assert!(html.contains(r#"<link rel="preload" href="/dist/home.js" as="script">"#));
    assert!(html.contains(r#"<link rel="prefetch" href="/dist/about.js">"#));
    assert!(html.contains(r#"<link rel="stylesheet" href="/dist/app.css">"#));
    assert!(html.contains(r#"<script src="/dist/app.js" defer></script>"#));
    assert!(!html.contains(r#"<link rel="prefetch" href="/dist/home.js">"#));
}

#[tokio::test]
async fn test_missing_build_files_fall_back_to_defaults() {
    let mut config = AppConfig::default();
    config.paths.dist_path = "does-not-exist".to_string();
    let options = vellum_server::ServerOptions::new(config, Arc::new(helpers::app_bundle()));
    let app = helpers::TestApp::with_options(options).await;

    let response = app.get("/").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.starts_with("<!DOCTYPE html>"));
    assert!(response.body.contains("Hello from /"));
}

#[tokio::test]
async fn test_serves_over_tcp() {
    let config = AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            shutdown_grace_seconds: 1,
            ..ServerConfig::default()
        },
        ..AppConfig::default()
    };
    let mut server = ServerCore::new(helpers::app_options(config), Box::new(AxumAdapter::new()))
        .await
        .unwrap();
    let events = helpers::record_hooks(&server).await;
    server.start().await.unwrap();
    assert!(server.adapter().http_server().is_some());

    let port = server.port();
    assert_ne!(port, 0);

    let response = reqwest::get(format!("http://127.0.0.1:{port}/about"))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("Hello from /about"));
    assert!(helpers::wait_for_event(&events, "afterResponse", WAIT).await);

    server.stop().await.unwrap();
    server.stop().await.unwrap();
    assert!(reqwest::get(format!("http://127.0.0.1:{port}/")).await.is_err());
}
