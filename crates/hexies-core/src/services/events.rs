//! Plugin event bus

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::data::{ItemId, SubscriptionRecord, UserId, WidgetId};

const DEFAULT_CAPACITY: usize = 64;

/// Notifications published for UI-adjacent collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PluginEvent {
    /// The session fell back to the local catalog and free tier.
    DegradedMode { reason: String },
    SubscriptionUpdated { subscription: SubscriptionRecord },
    CatalogChanged { item_count: usize },
    /// A replaced widget could not be removed from the canvas.
    WidgetLeaked {
        widget_id: WidgetId,
        source_item_id: ItemId,
        reason: String,
    },
    SessionExpired,
}

/// Notification from the payment collaborator that a user's entitlements changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitlementChanged {
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// Broadcast bus for [`PluginEvent`]s. Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PluginEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn publish(&self, event: PluginEvent) {
        if self.sender.send(event).is_err() {
            trace!("No subscribers for plugin event");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
