//! Plugin registry. Stores installed plugins with their merged options.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use vellum_core::result::AppResult;

use crate::manager::InstallContext;
use crate::options::PluginOptions;

/// Metadata about a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Unique plugin identifier.
    pub id: String,
    /// Human-readable plugin name.
    pub name: String,
    /// Plugin version string.
    pub version: String,
    /// Plugin description.
    pub description: String,
}

impl PluginInfo {
    /// Creates metadata with an empty description.
    pub fn new(id: &str, name: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            description: String::new(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

/// Trait that all plugins must implement.
#[async_trait]
pub trait Plugin: Send + Sync + std::fmt::Debug {
    /// Returns plugin metadata.
    fn info(&self) -> PluginInfo;

    /// Options used when the caller supplies none.
    fn default_options(&self) -> Value {
        json!({})
    }

    /// Registers hooks and wires the adapter. Called once per installation.
    async fn install(&self, ctx: &mut InstallContext<'_>, options: &PluginOptions)
    -> AppResult<()>;
}

/// A completed installation.
#[derive(Debug, Clone)]
pub struct InstalledPlugin {
    /// Installation id; hooks registered during install carry it.
    pub installation: u64,
    /// Plugin metadata.
    pub info: PluginInfo,
    /// Options the plugin was installed with.
    pub options: PluginOptions,
    /// The plugin instance.
    pub plugin: Arc<dyn Plugin>,
}

/// Registry of installed plugins, in installation order.
///
/// The same plugin may appear several times, once per installation.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    installed: Vec<InstalledPlugin>,
}

impl PluginRegistry {
    /// Creates a new empty plugin registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed installation.
    pub fn register(&mut self, installed: InstalledPlugin) {
        info!(
            plugin_id = %installed.info.id,
            name = %installed.info.name,
            version = %installed.info.version,
            installation = installed.installation,
            "Plugin registered"
        );
        self.installed.push(installed);
    }

    /// Lists installations in order.
    pub fn list(&self) -> &[InstalledPlugin] {
        &self.installed
    }

    /// Returns the installations of one plugin id.
    pub fn by_id<'a>(&'a self, plugin_id: &'a str) -> impl Iterator<Item = &'a InstalledPlugin> {
        self.installed.iter().filter(move |p| p.info.id == plugin_id)
    }

    /// Checks whether a plugin id has been installed at least once.
    pub fn contains(&self, plugin_id: &str) -> bool {
        self.by_id(plugin_id).next().is_some()
    }

    /// Returns the number of installations.
    pub fn count(&self) -> usize {
        self.installed.len()
    }
}
