//! # vellum-plugin
//!
//! Plugin framework for Vellum. Provides:
//!
//! - Ordered hook registration and sequential invocation ([`HookBus`])
//! - Redirect and failure signals as explicit [`HookFlow`] values
//! - Install-time option merging ([`PluginOptions`])
//! - Plugin installation against the active adapter ([`PluginHost`])

pub mod hooks;
pub mod manager;
pub mod options;
pub mod prelude;
pub mod registry;
pub mod traits;

pub use hooks::definitions::{HookAction, HookPayload, HookPoint, HookResult};
pub use hooks::dispatcher::{HookBus, HookFlow};
pub use hooks::registry::{HookHandler, HookRegistry};
pub use manager::{InstallContext, PluginHost};
pub use options::PluginOptions;
pub use registry::{InstalledPlugin, Plugin, PluginInfo, PluginRegistry};
