//! Build output paths and renderer configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Locations of the build artifacts consumed by the renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory containing the client build output.
    #[serde(default = "default_dist_path")]
    pub dist_path: String,
    /// Working directory for SSR artifacts, relative to `dist_path`.
    #[serde(default = "default_ssr_dir")]
    pub ssr_dir: String,
    /// HTML template file name inside `dist_path`.
    #[serde(default = "default_template")]
    pub template: String,
    /// Client manifest file name inside `ssr_dir`.
    #[serde(default = "default_manifest")]
    pub client_manifest: String,
}

impl PathsConfig {
    /// Absolute-or-relative path of the HTML template.
    pub fn template_path(&self) -> PathBuf {
        PathBuf::from(&self.dist_path).join(&self.template)
    }

    /// Absolute-or-relative path of the client manifest.
    pub fn manifest_path(&self) -> PathBuf {
        PathBuf::from(&self.dist_path)
            .join(&self.ssr_dir)
            .join(&self.client_manifest)
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dist_path: default_dist_path(),
            ssr_dir: default_ssr_dir(),
            template: default_template(),
            client_manifest: default_manifest(),
        }
    }
}

/// Renderer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Rendered body cache.
    #[serde(default)]
    pub cache: RenderCacheConfig,
}

/// In-memory rendered body cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderCacheConfig {
    /// Whether bodies with a cache key are cached.
    #[serde(default)]
    pub enabled: bool,
    /// Maximum number of cached bodies.
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
    /// TTL of cached bodies in seconds.
    #[serde(default = "default_ttl")]
    pub time_to_live_seconds: u64,
}

impl Default for RenderCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_capacity: default_max_capacity(),
            time_to_live_seconds: default_ttl(),
        }
    }
}

fn default_dist_path() -> String {
    "dist".to_string()
}

fn default_ssr_dir() -> String {
    ".vellum".to_string()
}

fn default_template() -> String {
    "index.html".to_string()
}

fn default_manifest() -> String {
    "client-manifest.json".to_string()
}

fn default_max_capacity() -> u64 {
    1000
}

fn default_ttl() -> u64 {
    60
}
