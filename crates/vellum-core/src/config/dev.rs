//! Development server configuration.

use serde::{Deserialize, Serialize};

/// Development server settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevServerConfig {
    /// Path prefixes forwarded to an upstream (e.g. a client asset server).
    #[serde(default)]
    pub proxy: Vec<ProxyRule>,
}

/// A single upstream proxy rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRule {
    /// Path prefix handled by the proxy (e.g. `/assets`).
    pub path: String,
    /// Upstream base URL (e.g. `http://127.0.0.1:3001`).
    pub target: String,
    /// Whether the matched prefix is removed before forwarding.
    #[serde(default)]
    pub strip_prefix: bool,
}
