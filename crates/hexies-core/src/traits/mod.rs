//! Collaborator seams between the plugin core and the outside world

pub mod backend;
pub mod cache;
pub mod canvas_surface;

pub use backend::{AccessToken, AuthGrant, CatalogBackend, UsageEvent};
pub use cache::{CachedCatalog, CatalogCache};
pub use canvas_surface::CanvasSurface;
