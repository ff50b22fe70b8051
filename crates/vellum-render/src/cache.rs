//! Rendered body cache backed by moka.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::debug;

use vellum_core::config::renderer::RenderCacheConfig;

/// In-memory cache of rendered bodies, keyed by the bundle's cache key.
#[derive(Debug, Clone)]
pub struct RenderCache {
    /// The underlying moka cache.
    cache: Cache<String, Arc<str>>,
}

impl RenderCache {
    /// Creates a cache from configuration.
    pub fn new(config: &RenderCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(Duration::from_secs(config.time_to_live_seconds))
            .build();

        Self { cache }
    }

    /// Creates a cache only when enabled in configuration.
    pub fn from_config(config: &RenderCacheConfig) -> Option<Self> {
        config.enabled.then(|| Self::new(config))
    }

    /// Looks up a rendered body.
    pub async fn get(&self, key: &str) -> Option<Arc<str>> {
        let hit = self.cache.get(key).await;
        debug!(key, hit = hit.is_some(), "Render cache lookup");
        hit
    }

    /// Stores a rendered body.
    pub async fn insert(&self, key: String, body: Arc<str>) {
        self.cache.insert(key, body).await;
    }

    /// Drops every cached body.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}
