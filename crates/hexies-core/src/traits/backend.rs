//! CatalogBackend trait definition for the remote persistence service

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::data::{
    BackendError, CatalogDraft, CatalogItem, CategoryFilter, FaceState, HostIdentity, ItemId,
    SubscriptionRecord, UserProfile,
};

/// Opaque bearer token issued by the backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Never print the token itself.
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Result of a successful authentication or token refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthGrant {
    pub token: AccessToken,
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
    pub subscription: SubscriptionRecord,
}

/// A best-effort usage analytics event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

impl UsageEvent {
    pub const ITEM_ADDED_TO_BOARD: &'static str = "hexie_added_to_board";
    pub const ITEM_FLIPPED_TO_BACK: &'static str = "hexie_flipped_to_back";
    pub const ITEM_FLIPPED_TO_FRONT: &'static str = "hexie_flipped_to_front";
    pub const ITEM_CREATED: &'static str = "hexie_created";
    pub const ITEM_DELETED: &'static str = "hexie_deleted";

    /// Event name for a flip that ended on `face`.
    pub fn flipped_to(face: FaceState) -> &'static str {
        match face {
            FaceState::Front => Self::ITEM_FLIPPED_TO_FRONT,
            FaceState::Back => Self::ITEM_FLIPPED_TO_BACK,
        }
    }

    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }
}

/// The remote persistence and auth service.
///
/// Every call except `authenticate` carries the bearer token. An expired
/// or rejected token is reported as [`BackendError::Unauthorized`].
#[async_trait]
pub trait CatalogBackend: Send + Sync {
    async fn authenticate(&self, identity: &HostIdentity) -> Result<AuthGrant, BackendError>;

    async fn refresh_token(&self, token: &AccessToken) -> Result<AuthGrant, BackendError>;

    async fn get_subscription(&self, token: &AccessToken)
        -> Result<SubscriptionRecord, BackendError>;

    /// System items plus the caller's own user-created items.
    async fn list_catalog_items(
        &self,
        token: &AccessToken,
        filter: CategoryFilter,
    ) -> Result<Vec<CatalogItem>, BackendError>;

    async fn create_catalog_item(
        &self,
        token: &AccessToken,
        draft: &CatalogDraft,
    ) -> Result<CatalogItem, BackendError>;

    async fn delete_catalog_item(&self, token: &AccessToken, id: &ItemId)
        -> Result<(), BackendError>;

    async fn track_event(&self, token: &AccessToken, event: UsageEvent)
        -> Result<(), BackendError>;

    async fn logout(&self, token: &AccessToken) -> Result<(), BackendError>;
}
