//! Vellum Server: server-side rendering host
//!
//! Main entry point that wires the crates together and starts the server.

use std::sync::Arc;

use serde_json::Value;
use tracing_subscriber::{EnvFilter, fmt};

use plugin_cookie::CookiePlugin;
use vellum_core::config::AppConfig;
use vellum_core::error::AppError;
use vellum_core::types::Context;
use vellum_plugin::Plugin;
use vellum_render::FnBundle;
use vellum_render::template::escape_html;
use vellum_server::{AxumAdapter, ServerCore, ServerOptions};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from files and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("VELLUM_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Plugins the binary knows by name.
fn plugin_catalog(name: &str) -> Option<Arc<dyn Plugin>> {
    match name {
        "cookie" => Some(Arc::new(CookiePlugin::new())),
        _ => None,
    }
}

/// Placeholder bundle used until a build provides one.
fn default_bundle() -> FnBundle {
    FnBundle::new(|ctx: &mut Context| {
        let path = ctx.route().path.clone();
        ctx.title = Some("Vellum".to_string());
        ctx.state.insert("path".to_string(), Value::from(path.clone()));
        Ok(format!(
            "<div id=\"app\"><h1>Vellum</h1><p>Rendered {}</p></div>",
            escape_html(&path)
        ))
    })
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Vellum v{}", env!("CARGO_PKG_VERSION"));

    let entries = config.plugins.clone();
    let options = ServerOptions::new(config, Arc::new(default_bundle()));
    let mut server = ServerCore::new(options, Box::new(AxumAdapter::new())).await?;

    for entry in entries {
        let plugin = plugin_catalog(&entry.name).ok_or_else(|| {
            AppError::configuration(format!("Unknown plugin '{}'", entry.name))
        })?;
        server.add_plugin(plugin, entry.options);
    }

    server.start().await?;
    tracing::info!(
        "Vellum listening on {}:{}",
        server.host(),
        server.port()
    );

    shutdown_signal().await;
    tracing::info!("Shutdown signal received");

    server.stop().await?;
    tracing::info!("Vellum shut down gracefully");
    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
