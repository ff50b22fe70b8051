//! Request-scoped value types.

pub mod context;
pub mod redirect;

pub use context::{Context, Outcome, ResponseState, RouteTarget};
pub use redirect::RedirectSignal;
