//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section. Every field has a default so an empty configuration boots a
//! development server.

pub mod app;
pub mod dev;
pub mod logging;
pub mod plugin;
pub mod renderer;

use serde::{Deserialize, Serialize};

use self::app::ServerConfig;
use self::dev::DevServerConfig;
use self::logging::LoggingConfig;
use self::plugin::PluginEntry;
use self::renderer::{PathsConfig, RendererConfig};

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Build output locations.
    #[serde(default)]
    pub paths: PathsConfig,
    /// Paths served as a client-only SPA shell, skipping SSR.
    #[serde(default)]
    pub spa_paths: Vec<String>,
    /// Renderer settings.
    #[serde(default)]
    pub renderer: RendererConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Development server settings.
    #[serde(default)]
    pub dev_server: DevServerConfig,
    /// Plugins to install, in order.
    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `VELLUM`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("VELLUM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }

    /// Parse configuration from an in-memory TOML document.
    pub fn from_toml(source: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Returns whether `path` is declared as a client-only SPA path.
    ///
    /// Entries ending in `/*` match the prefix and everything below it.
    pub fn is_spa_path(&self, path: &str) -> bool {
        self.spa_paths.iter().any(|spa| match spa.strip_suffix("/*") {
            Some(prefix) => {
                path == prefix
                    || path
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            None => spa == path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.logging.level, "info");
        assert!(config.spa_paths.is_empty());
        assert!(config.plugins.is_empty());
    }

    #[test]
    fn test_parses_sections() {
        let config = AppConfig::from_toml(
            r#"
            spa_paths = ["/admin/*", "/login"]

            [server]
            host = "127.0.0.1"
            port = 4000

            [paths]
            dist_path = "build"

            [[plugins]]
            name = "cookie"
            options = { secret = "s3cr3t" }
            "#,
        )
        .unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.paths.dist_path, "build");
        assert_eq!(config.plugins.len(), 1);
        assert_eq!(config.plugins[0].name, "cookie");
        assert_eq!(config.plugins[0].options["secret"], "s3cr3t");
    }

    #[test]
    fn test_spa_path_matching() {
        let config = AppConfig {
            spa_paths: vec!["/admin/*".to_string(), "/login".to_string()],
            ..Default::default()
        };

        assert!(config.is_spa_path("/login"));
        assert!(config.is_spa_path("/admin"));
        assert!(config.is_spa_path("/admin/users/3"));
        assert!(!config.is_spa_path("/administrator"));
        assert!(!config.is_spa_path("/login/extra"));
        assert!(!config.is_spa_path("/"));
    }
}
