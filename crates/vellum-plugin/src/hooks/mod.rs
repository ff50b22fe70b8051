//! Hook system: registry, bus, and typed hook definitions.

pub mod definitions;
pub mod dispatcher;
pub mod registry;

pub use definitions::{HookAction, HookPayload, HookPoint, HookResult};
pub use dispatcher::{HookBus, HookFlow};
pub use registry::{HookHandler, HookRegistry};
