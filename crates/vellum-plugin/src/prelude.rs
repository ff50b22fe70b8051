//! Prelude for convenient imports.

pub use async_trait::async_trait;

pub use crate::hooks::definitions::{HookAction, HookPayload, HookPoint, HookResult};
pub use crate::hooks::registry::HookHandler;
pub use crate::manager::InstallContext;
pub use crate::options::PluginOptions;
pub use crate::registry::{Plugin, PluginInfo};
pub use crate::traits::FnHandler;

pub use vellum_core::error::AppError;
pub use vellum_core::result::AppResult;
pub use vellum_core::traits::adapter::CookieStrategy;
pub use vellum_core::types::{Context, RedirectSignal};
