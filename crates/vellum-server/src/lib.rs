//! # vellum-server
//!
//! HTTP layer for Vellum: the [`ServerCore`] startup sequence, the render
//! pipeline installed behind every adapter, and the concrete adapters
//! ([`AxumAdapter`] on a TCP listener, [`MemoryAdapter`] in-process).

pub mod adapter;
pub mod error;
pub mod middleware;
pub mod proxy;
pub mod server;

pub use adapter::{AppSpec, AxumAdapter, MemoryAdapter};
pub use error::ErrorPage;
pub use proxy::UpstreamProxy;
pub use server::{ERROR_PAGE_DATA_KEY, RenderPipeline, ServerCore, ServerOptions};
