//! Types describing widgets on the host canvas surface

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::entities::{CatalogItem, Category};
use crate::data::identifiers::{ItemId, WidgetId};

/// Metadata key under which managed widgets store their state on the host.
pub const WIDGET_METADATA_KEY: &str = "hexie";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Position, size and rotation of a widget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub position: Point,
    pub size: Size,
    #[serde(default)]
    pub rotation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaceState {
    Front,
    Back,
}

impl FaceState {
    pub fn opposite(&self) -> FaceState {
        match self {
            FaceState::Front => FaceState::Back,
            FaceState::Back => FaceState::Front,
        }
    }
}

/// The fields of a catalog item a widget needs to re-render either face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardSnapshot {
    pub title: String,
    pub category: Category,
    pub icon: String,
    pub summary: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl From<&CatalogItem> for CardSnapshot {
    fn from(item: &CatalogItem) -> Self {
        Self {
            title: item.title.clone(),
            category: item.category,
            icon: item.icon.clone(),
            summary: item.summary.clone(),
            details: item.details.clone(),
            reference: item.reference.clone(),
            tags: item.tags.clone(),
        }
    }
}

/// State written to every managed widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetMetadata {
    pub source_item_id: ItemId,
    pub face_state: FaceState,
    pub placed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_flipped_at: Option<DateTime<Utc>>,
    pub card: CardSnapshot,
}

/// Visual payload of one widget face, described at the data level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetPayload {
    pub face: FaceState,
    pub title: String,
    pub alt: String,
    pub content: String,
    pub fill_color: String,
}

/// A request to create a widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetSpec {
    pub payload: WidgetPayload,
    pub geometry: Geometry,
}

/// What the host hands back after creating a widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetHandle {
    pub id: WidgetId,
    pub geometry: Geometry,
}

/// A "selection changed" notification from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionEvent {
    pub object_ids: Vec<WidgetId>,
    pub timestamp: DateTime<Utc>,
}

impl SelectionEvent {
    pub fn single(object_id: WidgetId, timestamp: DateTime<Utc>) -> Self {
        Self {
            object_ids: vec![object_id],
            timestamp,
        }
    }

    /// The selected object when exactly one is selected.
    pub fn single_object(&self) -> Option<&WidgetId> {
        match self.object_ids.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

/// Identity of the user as reported by the host platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostIdentity {
    pub host_user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub board_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_state_opposite_is_an_involution() {
        for face in [FaceState::Front, FaceState::Back] {
            assert_ne!(face.opposite(), face);
            assert_eq!(face.opposite().opposite(), face);
        }
    }

    #[test]
    fn test_single_object_requires_exactly_one() {
        let now = Utc::now();
        let none = SelectionEvent { object_ids: vec![], timestamp: now };
        let two = SelectionEvent {
            object_ids: vec![WidgetId::new("a"), WidgetId::new("b")],
            timestamp: now,
        };
        assert!(none.single_object().is_none());
        assert!(two.single_object().is_none());
        assert_eq!(
            SelectionEvent::single(WidgetId::new("a"), now).single_object(),
            Some(&WidgetId::new("a"))
        );
    }
}
