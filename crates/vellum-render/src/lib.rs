//! # vellum-render
//!
//! Render pipeline for Vellum: route resolution through the
//! `routeResolve` hook, body rendering around the render hooks, document
//! assembly from the HTML template and the client asset manifest.

pub mod bundle;
pub mod cache;
pub mod manifest;
pub mod renderer;
pub mod resolver;
pub mod template;

pub use bundle::{AppBundle, FnBundle};
pub use cache::RenderCache;
pub use manifest::{AssetKind, RenderManifest, module_hash};
pub use renderer::{AssetPredicate, Directive, RenderOutcome, Renderer};
pub use resolver::{Next, ResolveState, RouteResolver};
pub use template::HtmlTemplate;
