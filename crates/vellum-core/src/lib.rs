//! # vellum-core
//!
//! Core crate for Vellum. Contains the unified error system, configuration
//! schemas, the per-request [`Context`](types::Context), the redirect
//! signal, and the HTTP adapter contract.
//!
//! This crate has **no** internal dependencies on other Vellum crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
