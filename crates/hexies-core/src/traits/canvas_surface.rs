//! CanvasSurface trait definition for the host canvas platform

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::data::{
    Geometry, HostError, HostIdentity, Point, SelectionEvent, WidgetHandle, WidgetId, WidgetSpec,
};

/// The host-owned, append-only visual surface.
///
/// Widgets cannot be mutated in place: changing what a widget shows means
/// creating a replacement and removing the original. Every call may fail
/// with a [`HostError`].
#[async_trait]
pub trait CanvasSurface: Send + Sync {
    async fn create_widget(&self, spec: WidgetSpec) -> Result<WidgetHandle, HostError>;

    /// Removes a widget. Fails with [`HostError::NotFound`] if it is already gone.
    async fn remove_widget(&self, id: &WidgetId) -> Result<(), HostError>;

    /// Current geometry of a widget, `None` if it does not exist.
    async fn widget_geometry(&self, id: &WidgetId) -> Result<Option<Geometry>, HostError>;

    async fn get_metadata(&self, id: &WidgetId, key: &str) -> Result<Option<Value>, HostError>;

    async fn set_metadata(&self, id: &WidgetId, key: &str, value: Value) -> Result<(), HostError>;

    async fn focus_view(&self, id: &WidgetId) -> Result<(), HostError>;

    async fn deselect_all(&self) -> Result<(), HostError>;

    async fn viewport_center(&self) -> Result<Point, HostError>;

    /// Identity of the user currently signed into the host.
    async fn current_identity(&self) -> Result<HostIdentity, HostError>;

    /// Subscribes to "selection changed" notifications.
    fn selection_events(&self) -> broadcast::Receiver<SelectionEvent>;
}
