//! Core data structures for the plugin

pub mod canvas;
pub mod entities;
pub mod errors;
pub mod identifiers;

pub use canvas::{
    CardSnapshot, FaceState, Geometry, HostIdentity, Point, SelectionEvent, Size,
    WidgetHandle, WidgetMetadata, WidgetPayload, WidgetSpec, WIDGET_METADATA_KEY,
};
pub use entities::{
    CatalogDraft, CatalogItem, Category, CategoryFilter, Feature, PlanId, SubscriptionRecord,
    SubscriptionStatus, UserProfile,
};
pub use errors::{BackendError, CacheError, HexiesError, HostError};
pub use identifiers::{ItemId, UserId, WidgetId};

/// Result alias used by the services.
pub type HexiesResult<T> = Result<T, HexiesError>;
