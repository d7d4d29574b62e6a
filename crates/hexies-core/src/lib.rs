//! Hexies board plugin core
//!
//! Entitlement-gated catalog management and canvas widget synchronization
//! for a plugin embedded in a host whiteboard. The host, the backend and
//! the local cache are reached through the traits in [`traits`]; the
//! services in [`services`] are wired together by [`plugin::HexiesPlugin`].

pub mod adapters;
pub mod config;
pub mod data;
pub mod defaults;
pub mod entitlement;
pub mod payload;
pub mod plugin;
pub mod services;
pub mod traits;

pub mod test_utils;

pub use config::PluginConfig;
pub use data::{
    BackendError, CacheError, CardSnapshot, CatalogDraft, CatalogItem, Category, CategoryFilter,
    FaceState, Feature, Geometry, HexiesError, HexiesResult, HostError, HostIdentity, ItemId,
    PlanId, Point, SelectionEvent, Size, SubscriptionRecord, SubscriptionStatus, UserId,
    UserProfile, WidgetHandle, WidgetId, WidgetMetadata, WidgetPayload, WidgetSpec,
};
pub use entitlement::{
    can_access, can_access_feature, can_create_user_item, effective_plan, EntitlementPolicy,
};
pub use plugin::HexiesPlugin;
pub use services::{
    CatalogEntry, CatalogStore, EntitlementChanged, EventBus, FlipOutcome, PluginEvent,
    SessionController, SessionMode, SessionSnapshot, SessionState, WidgetSynchronizer,
};
pub use traits::{
    AccessToken, AuthGrant, CachedCatalog, CanvasSurface, CatalogBackend, CatalogCache,
    UsageEvent,
};

/// Installs the global tracing subscriber from the plugin configuration.
pub fn init_logging(config: &PluginConfig) -> anyhow::Result<()> {
    let monitoring = hexies_monitoring::MonitoringConfig::new("hexies-core")
        .with_filter(config.log_filter.clone())
        .with_json(config.json_logs);
    hexies_monitoring::init_logging(&monitoring)
}
