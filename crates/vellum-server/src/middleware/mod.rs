//! Middleware layers applied to every adapter router.

pub mod logging;
