//! Canvas widget synchronizer
//!
//! Keeps placed cards and their host widgets in step. The host cannot
//! change a widget in place, so a flip creates the opposite face at the same
//! geometry and only then removes the original.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::config::PluginConfig;
use crate::data::{
    CardSnapshot, CatalogItem, FaceState, Geometry, HexiesError, HexiesResult, HostError,
    ItemId, Point, SelectionEvent, Size, WidgetHandle, WidgetId, WidgetMetadata, WidgetSpec,
    WIDGET_METADATA_KEY,
};
use crate::entitlement::{can_access, EntitlementPolicy};
use crate::payload::synthesize;
use crate::services::events::{EventBus, PluginEvent};
use crate::services::flip_detector::{FlipDetector, SelectionDecision};
use crate::services::pending::PendingSet;
use crate::services::session::SessionController;
use crate::traits::{CanvasSurface, UsageEvent};

/// Result of a flip request.
#[derive(Debug, Clone, PartialEq)]
pub enum FlipOutcome {
    Flipped {
        replaced: WidgetId,
        widget: WidgetHandle,
        face: FaceState,
    },
    /// The object carries no card metadata; nothing was done.
    NotManaged,
}

/// A replaced widget whose removal failed.
#[derive(Debug, Clone, PartialEq)]
pub struct OrphanedWidget {
    pub widget_id: WidgetId,
    pub source_item_id: ItemId,
    pub leaked_at: DateTime<Utc>,
    pub reason: String,
}

pub struct WidgetSynchronizer {
    surface: Arc<dyn CanvasSurface>,
    session: Arc<SessionController>,
    events: EventBus,
    policy: EntitlementPolicy,
    widget_size: Size,
    placement_jitter: f64,
    detector: Mutex<FlipDetector>,
    in_flight: PendingSet<WidgetId>,
    orphans: Mutex<Vec<OrphanedWidget>>,
}

impl WidgetSynchronizer {
    pub fn new(
        surface: Arc<dyn CanvasSurface>,
        session: Arc<SessionController>,
        events: EventBus,
        config: &PluginConfig,
    ) -> Self {
        Self {
            surface,
            session,
            events,
            policy: config.entitlement_policy(),
            widget_size: config.widget_size,
            placement_jitter: config.placement_jitter,
            detector: Mutex::new(FlipDetector::new(config.click_window())),
            in_flight: PendingSet::new(),
            orphans: Mutex::new(Vec::new()),
        }
    }

    /// Places the front face of `item` at `position`.
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn place(&self, item: &CatalogItem, position: Point) -> HexiesResult<WidgetHandle> {
        let subscription = self.session.subscription();
        let user = self.session.current_user();
        if !can_access(item, subscription.as_ref(), user.as_ref(), &self.policy) {
            return Err(HexiesError::AccessDenied {
                item_id: item.id.clone(),
            });
        }

        let card = CardSnapshot::from(item);
        let spec = WidgetSpec {
            payload: synthesize(&card, FaceState::Front),
            geometry: Geometry {
                position,
                size: self.widget_size,
                rotation: 0.0,
            },
        };
        let handle = self.create_with_retry(spec).await?;

        let metadata = WidgetMetadata {
            source_item_id: item.id.clone(),
            face_state: FaceState::Front,
            placed_at: Utc::now(),
            last_flipped_at: None,
            card,
        };
        self.write_metadata_or_discard(&handle.id, &metadata).await?;
        self.focus(&handle.id).await;

        info!(widget_id = %handle.id, x = position.x, y = position.y, "Placed item on canvas");
        self.session
            .track(UsageEvent::new(
                UsageEvent::ITEM_ADDED_TO_BOARD,
                json!({
                    "hexie_id": item.id,
                    "title": item.title,
                    "category": item.category,
                }),
            ))
            .await;

        Ok(handle)
    }

    /// Places `item` near the centre of the current viewport.
    pub async fn place_at_viewport(&self, item: &CatalogItem) -> HexiesResult<WidgetHandle> {
        let center = self
            .surface
            .viewport_center()
            .await
            .map_err(|e| HexiesError::host("viewport_center", e))?;
        let position = jittered(center, self.placement_jitter);
        self.place(item, position).await
    }

    /// Replaces a widget with its opposite face at the same geometry.
    #[instrument(skip(self), fields(widget_id = %id))]
    pub async fn flip(&self, id: &WidgetId) -> HexiesResult<FlipOutcome> {
        let guard = self.in_flight.acquire(id)?;

        let Some(metadata) = self.metadata(id).await? else {
            debug!("Selected object is not a managed card");
            return Ok(FlipOutcome::NotManaged);
        };
        let geometry = self
            .surface
            .widget_geometry(id)
            .await
            .map_err(|e| HexiesError::host("widget_geometry", e))?
            .ok_or_else(|| HexiesError::host("widget_geometry", HostError::NotFound(id.clone())))?;

        let face = metadata.face_state.opposite();
        let spec = WidgetSpec {
            payload: synthesize(&metadata.card, face),
            geometry,
        };
        let widget = self.create_with_retry(spec).await?;

        let flipped = WidgetMetadata {
            face_state: face,
            last_flipped_at: Some(Utc::now()),
            ..metadata
        };
        self.write_metadata_or_discard(&widget.id, &flipped).await?;

        match self.surface.remove_widget(id).await {
            Ok(()) | Err(HostError::NotFound(_)) => {}
            Err(e) => self.record_orphan(id, &flipped.source_item_id, e),
        }
        self.focus(&widget.id).await;
        drop(guard);

        info!(new_widget_id = %widget.id, face = ?face, "Flipped card");
        self.session
            .track(UsageEvent::new(
                UsageEvent::flipped_to(face),
                json!({
                    "hexie_id": flipped.source_item_id,
                    "title": flipped.card.title,
                }),
            ))
            .await;

        Ok(FlipOutcome::Flipped {
            replaced: id.clone(),
            widget,
            face,
        })
    }

    /// Removes a widget. Removing a widget that is already gone succeeds.
    #[instrument(skip(self), fields(widget_id = %id))]
    pub async fn remove(&self, id: &WidgetId) -> HexiesResult<()> {
        match self.surface.remove_widget(id).await {
            Ok(()) => {}
            Err(HostError::NotFound(_)) => debug!("Widget already absent"),
            Err(e) => return Err(HexiesError::host("remove_widget", e)),
        }
        self.orphans.lock().retain(|o| &o.widget_id != id);
        Ok(())
    }

    /// Feeds a host selection event through flip-intent detection.
    /// Returns the flip outcome when the event completed a double selection.
    pub async fn handle_selection(&self, event: &SelectionEvent) -> HexiesResult<Option<FlipOutcome>> {
        let decision = self.detector.lock().on_selection(event);
        let SelectionDecision::Flip(id) = decision else {
            return Ok(None);
        };

        let outcome = self.flip(&id).await;
        if let Err(e) = self.surface.deselect_all().await {
            debug!(error = %e, "Deselect after flip failed");
        }
        outcome.map(Some)
    }

    /// Reads and decodes the card metadata of a widget.
    pub async fn metadata(&self, id: &WidgetId) -> HexiesResult<Option<WidgetMetadata>> {
        let raw = self
            .surface
            .get_metadata(id, WIDGET_METADATA_KEY)
            .await
            .map_err(|e| HexiesError::host("get_metadata", e))?;

        Ok(raw.and_then(|value| match serde_json::from_value(value) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                debug!(widget_id = %id, error = %e, "Ignoring malformed widget metadata");
                None
            }
        }))
    }

    pub fn orphaned_widgets(&self) -> Vec<OrphanedWidget> {
        self.orphans.lock().clone()
    }

    /// Retries removal of leaked widgets. Returns how many were cleaned up.
    #[instrument(skip(self))]
    pub async fn sweep_orphans(&self) -> usize {
        let pending = std::mem::take(&mut *self.orphans.lock());
        let mut removed = 0;
        let mut remaining = Vec::new();

        for orphan in pending {
            match self.surface.remove_widget(&orphan.widget_id).await {
                Ok(()) | Err(HostError::NotFound(_)) => removed += 1,
                Err(e) => {
                    debug!(widget_id = %orphan.widget_id, error = %e, "Orphan still not removable");
                    remaining.push(orphan);
                }
            }
        }

        if !remaining.is_empty() {
            self.orphans.lock().extend(remaining);
        }
        info!(removed, "Swept orphaned widgets");
        removed
    }

    async fn create_with_retry(&self, spec: WidgetSpec) -> HexiesResult<WidgetHandle> {
        match self.surface.create_widget(spec.clone()).await {
            Ok(handle) => Ok(handle),
            Err(first) => {
                warn!(error = %first, "Widget creation failed, retrying once");
                self.surface
                    .create_widget(spec)
                    .await
                    .map_err(|e| HexiesError::host("create_widget", e))
            }
        }
    }

    /// Writes card metadata to a fresh widget, removing the widget again if
    /// the write fails so no unmanaged card is left behind.
    async fn write_metadata_or_discard(
        &self,
        id: &WidgetId,
        metadata: &WidgetMetadata,
    ) -> HexiesResult<()> {
        let value = serde_json::to_value(metadata)?;
        let Err(error) = self.surface.set_metadata(id, WIDGET_METADATA_KEY, value).await else {
            return Ok(());
        };

        warn!(widget_id = %id, error = %error, "Metadata write failed, discarding widget");
        if let Err(e) = self.surface.remove_widget(id).await {
            self.record_orphan(id, &metadata.source_item_id, e);
        }
        Err(HexiesError::host("set_metadata", error))
    }

    async fn focus(&self, id: &WidgetId) {
        if let Err(e) = self.surface.focus_view(id).await {
            debug!(widget_id = %id, error = %e, "Focus failed");
        }
    }

    fn record_orphan(&self, id: &WidgetId, source_item_id: &ItemId, error: HostError) {
        warn!(widget_id = %id, error = %error, "Widget leaked on canvas");
        let orphan = OrphanedWidget {
            widget_id: id.clone(),
            source_item_id: source_item_id.clone(),
            leaked_at: Utc::now(),
            reason: error.to_string(),
        };
        self.orphans.lock().push(orphan);
        self.events.publish(PluginEvent::WidgetLeaked {
            widget_id: id.clone(),
            source_item_id: source_item_id.clone(),
            reason: error.to_string(),
        });
    }
}

fn jittered(center: Point, jitter: f64) -> Point {
    if jitter <= 0.0 {
        return center;
    }
    let half = jitter / 2.0;
    let mut rng = rand::thread_rng();
    Point::new(
        center.x + rng.gen_range(-half..=half),
        center.y + rng.gen_range(-half..=half),
    )
}
