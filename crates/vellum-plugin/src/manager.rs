//! Plugin host. Merges options and installs plugins against the hook bus
//! and the active adapter.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, info};

use vellum_core::error::{AppError, ErrorKind};
use vellum_core::result::AppResult;
use vellum_core::traits::adapter::{Adapter, CookieStrategy};

use crate::hooks::definitions::{HookPayload, HookPoint, HookResult};
use crate::hooks::dispatcher::{HookBus, panic_message};
use crate::hooks::registry::HookHandler;
use crate::options::PluginOptions;
use crate::registry::{InstalledPlugin, Plugin, PluginRegistry};
use crate::traits::FnHandler;

/// What a plugin sees while installing: the hook bus and the adapter.
pub struct InstallContext<'a> {
    bus: &'a HookBus,
    adapter: &'a mut dyn Adapter,
    plugin_id: &'a str,
    installation: u64,
}

impl InstallContext<'_> {
    /// Registers a handler owned by this installation.
    pub async fn register(&self, hook: HookPoint, handler: Arc<dyn HookHandler>) {
        self.bus
            .register_owned(hook, handler, self.installation)
            .await;
    }

    /// Registers a synchronous closure under this plugin's id.
    pub async fn on<F>(&self, hook: HookPoint, f: F)
    where
        F: Fn(&mut HookPayload<'_>) -> HookResult + Send + Sync + 'static,
    {
        self.register(hook, FnHandler::wrap(self.plugin_id, f)).await;
    }

    /// The adapter, for middleware and framework wiring.
    pub fn adapter(&mut self) -> &mut dyn Adapter {
        &mut *self.adapter
    }

    /// Shorthand for the adapter's cookie strategy.
    pub fn cookie_strategy(&self) -> CookieStrategy {
        self.adapter.cookie_strategy()
    }

    /// Id of the plugin being installed.
    pub fn plugin_id(&self) -> &str {
        self.plugin_id
    }

    /// Id of this installation.
    pub fn installation(&self) -> u64 {
        self.installation
    }
}

struct PendingPlugin {
    plugin: Arc<dyn Plugin>,
    overrides: Value,
}

/// Owns the hook bus, the plugin queue, and the installed plugin list.
pub struct PluginHost {
    /// Hook bus shared with the resolver and renderer.
    bus: Arc<HookBus>,
    /// Installed plugins.
    registry: PluginRegistry,
    /// Plugins added before start.
    pending: Vec<PendingPlugin>,
    /// Last issued installation id.
    last_installation: u64,
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost")
            .field("installed", &self.registry.count())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl PluginHost {
    /// Creates a host with a fresh hook bus.
    pub fn new() -> Self {
        Self::with_bus(Arc::new(HookBus::new()))
    }

    /// Creates a host around an existing hook bus.
    pub fn with_bus(bus: Arc<HookBus>) -> Self {
        Self {
            bus,
            registry: PluginRegistry::new(),
            pending: Vec::new(),
            last_installation: 0,
        }
    }

    /// Queues a plugin for installation at start.
    pub fn add_plugin(&mut self, plugin: Arc<dyn Plugin>, overrides: Value) {
        debug!(plugin_id = %plugin.info().id, "Plugin queued");
        self.pending.push(PendingPlugin { plugin, overrides });
    }

    /// Installs a plugin now.
    ///
    /// Handlers registered by a failing install are removed again and the
    /// failure is returned as an [`ErrorKind::Plugin`] error.
    pub async fn install(
        &mut self,
        plugin: Arc<dyn Plugin>,
        overrides: Value,
        adapter: &mut dyn Adapter,
    ) -> AppResult<PluginOptions> {
        let info = plugin.info();
        self.last_installation += 1;
        let installation = self.last_installation;
        let options = PluginOptions::merged(plugin.default_options(), overrides);

        debug!(
            plugin_id = %info.id,
            installation = installation,
            options = %options.as_value(),
            "Installing plugin"
        );

        let result = {
            let mut ctx = InstallContext {
                bus: self.bus.as_ref(),
                adapter,
                plugin_id: &info.id,
                installation,
            };
            AssertUnwindSafe(plugin.install(&mut ctx, &options))
                .catch_unwind()
                .await
        };

        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(AppError::with_source(
                ErrorKind::Plugin,
                format!("Plugin '{}' install failed: {}", info.id, e.message),
                e,
            )),
            Err(panic) => Some(AppError::plugin(format!(
                "Plugin '{}' panicked during install: {}",
                info.id,
                panic_message(panic.as_ref())
            ))),
        };

        if let Some(err) = failure {
            let removed = self
                .bus
                .registry()
                .unregister_installation(installation)
                .await;
            error!(
                plugin_id = %info.id,
                installation = installation,
                removed_hooks = removed,
                error = %err,
                "Plugin install failed"
            );
            return Err(err);
        }

        info!(
            plugin_id = %info.id,
            version = %info.version,
            installation = installation,
            "Plugin installed"
        );

        self.registry.register(InstalledPlugin {
            installation,
            info,
            options: options.clone(),
            plugin,
        });

        Ok(options)
    }

    /// Installs every queued plugin in the order they were added.
    ///
    /// Stops at the first failure; plugins after it stay queued.
    pub async fn install_pending(&mut self, adapter: &mut dyn Adapter) -> AppResult<usize> {
        let mut installed = 0;
        while !self.pending.is_empty() {
            let PendingPlugin { plugin, overrides } = self.pending.remove(0);
            self.install(plugin, overrides, adapter).await?;
            installed += 1;
        }
        Ok(installed)
    }

    /// Installed plugins with their merged options.
    pub fn plugins(&self) -> &[InstalledPlugin] {
        self.registry.list()
    }

    /// Number of plugins installed or queued.
    pub fn plugin_count(&self) -> usize {
        self.registry.count() + self.pending.len()
    }

    /// Number of plugins queued for installation.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns the hook bus.
    pub fn bus(&self) -> &Arc<HookBus> {
        &self.bus
    }

    /// Returns the plugin registry.
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }
}

impl Default for PluginHost {
    fn default() -> Self {
        Self::new()
    }
}
