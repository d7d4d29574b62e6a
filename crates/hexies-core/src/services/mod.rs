//! Plugin services

pub mod catalog;
pub mod event_bridge;
pub mod events;
pub mod flip_detector;
pub mod pending;
pub mod session;
pub mod widgets;

pub use catalog::{CatalogEntry, CatalogStore};
pub use event_bridge::EventBridge;
pub use events::{EntitlementChanged, EventBus, PluginEvent};
pub use flip_detector::{DetectorState, FlipDetector, SelectionDecision};
pub use pending::PendingSet;
pub use session::{SessionController, SessionMode, SessionSnapshot, SessionState};
pub use widgets::{FlipOutcome, OrphanedWidget, WidgetSynchronizer};
