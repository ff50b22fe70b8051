//! Cookie plugin for Vellum.
//!
//! Wires cookie signing into the active adapter. Adapters that keep signing
//! keys themselves receive the secret; the others get a middleware that
//! parses the `Cookie` header into a [`CookieJar`](axum_extra::extract::cookie::CookieJar)
//! and exposes the secret to handlers.

pub mod plugin;

pub use plugin::{CookiePlugin, CookieSecret, CookieSettings};
