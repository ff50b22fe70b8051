//! Plugin list configuration.

use serde::{Deserialize, Serialize};

/// A plugin to install at startup, resolved by name against the plugins
/// compiled into the server binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEntry {
    /// Catalog name of the plugin (e.g. `"cookie"`).
    pub name: String,
    /// Options merged over the plugin's defaults at install time.
    #[serde(default = "default_options")]
    pub options: serde_json::Value,
}

impl PluginEntry {
    /// Creates an entry with empty options.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: default_options(),
        }
    }
}

fn default_options() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}
