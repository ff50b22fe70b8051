//! Core trait definitions shared across crates.

pub mod adapter;

pub use adapter::{
    Adapter, CookieKeys, CookieStrategy, Middleware, ProxyOptions, RenderHandler, ServerHandle,
    middleware_fn,
};
