use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::data::{
    BackendError, CatalogDraft, CatalogItem, CategoryFilter, Geometry, HostError, HostIdentity,
    ItemId, PlanId, Point, SelectionEvent, SubscriptionRecord, SubscriptionStatus, UserId,
    UserProfile, WidgetHandle, WidgetId, WidgetPayload, WidgetSpec,
};
use crate::defaults::default_catalog;
use crate::traits::{AccessToken, AuthGrant, CanvasSurface, CatalogBackend, UsageEvent};

#[derive(Debug, Clone)]
struct FakeWidget {
    payload: WidgetPayload,
    geometry: Geometry,
    metadata: HashMap<String, Value>,
}

#[derive(Debug, Default)]
struct SurfaceFailures {
    creates: usize,
    metadata_writes: bool,
    removals: bool,
    identity: bool,
}

/// In-memory canvas with failure injection.
pub struct FakeCanvasSurface {
    widgets: Mutex<HashMap<WidgetId, FakeWidget>>,
    next_id: AtomicUsize,
    failures: Mutex<SurfaceFailures>,
    create_delay: Mutex<Option<Duration>>,
    viewport: Mutex<Point>,
    focused: Mutex<Vec<WidgetId>>,
    deselects: AtomicUsize,
    create_calls: AtomicUsize,
    selections: broadcast::Sender<SelectionEvent>,
}

impl FakeCanvasSurface {
    pub const HOST_USER_ID: &'static str = "host-user-1";

    pub fn new() -> Self {
        let (selections, _) = broadcast::channel(32);
        Self {
            widgets: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            failures: Mutex::new(SurfaceFailures::default()),
            create_delay: Mutex::new(None),
            viewport: Mutex::new(Point::new(0.0, 0.0)),
            focused: Mutex::new(Vec::new()),
            deselects: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            selections,
        }
    }

    /// The next `count` widget creations fail.
    pub fn fail_next_creates(&self, count: usize) {
        self.failures.lock().creates = count;
    }

    pub fn fail_metadata_writes(&self, fail: bool) {
        self.failures.lock().metadata_writes = fail;
    }

    pub fn fail_removals(&self, fail: bool) {
        self.failures.lock().removals = fail;
    }

    pub fn fail_identity(&self, fail: bool) {
        self.failures.lock().identity = fail;
    }

    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock() = Some(delay);
    }

    pub fn set_viewport_center(&self, center: Point) {
        *self.viewport.lock() = center;
    }

    /// Publishes a single-object selection to subscribers.
    pub fn select(&self, id: &WidgetId) {
        let _ = self
            .selections
            .send(SelectionEvent::single(id.clone(), Utc::now()));
    }

    pub fn widget_count(&self) -> usize {
        self.widgets.lock().len()
    }

    pub fn widget_ids(&self) -> Vec<WidgetId> {
        self.widgets.lock().keys().cloned().collect()
    }

    pub fn contains(&self, id: &WidgetId) -> bool {
        self.widgets.lock().contains_key(id)
    }

    pub fn payload(&self, id: &WidgetId) -> Option<WidgetPayload> {
        self.widgets.lock().get(id).map(|w| w.payload.clone())
    }

    pub fn geometry(&self, id: &WidgetId) -> Option<Geometry> {
        self.widgets.lock().get(id).map(|w| w.geometry)
    }

    /// Writes raw metadata, bypassing failure injection.
    pub fn put_metadata(&self, id: &WidgetId, key: &str, value: Value) {
        if let Some(widget) = self.widgets.lock().get_mut(id) {
            widget.metadata.insert(key.to_string(), value);
        }
    }

    /// Adds a widget that was not created through the plugin.
    pub fn insert_foreign_widget(&self, geometry: Geometry) -> WidgetId {
        let id = self.allocate_id();
        self.widgets.lock().insert(
            id.clone(),
            FakeWidget {
                payload: WidgetPayload {
                    face: crate::data::FaceState::Front,
                    title: "sticky".into(),
                    alt: String::new(),
                    content: String::new(),
                    fill_color: "#ffff00".into(),
                },
                geometry,
                metadata: HashMap::new(),
            },
        );
        id
    }

    pub fn focused(&self) -> Vec<WidgetId> {
        self.focused.lock().clone()
    }

    pub fn deselect_calls(&self) -> usize {
        self.deselects.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    fn allocate_id(&self) -> WidgetId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        WidgetId::new(format!("w{}", n))
    }
}

impl Default for FakeCanvasSurface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CanvasSurface for FakeCanvasSurface {
    async fn create_widget(&self, spec: WidgetSpec) -> Result<WidgetHandle, HostError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.create_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        {
            let mut failures = self.failures.lock();
            if failures.creates > 0 {
                failures.creates -= 1;
                return Err(HostError::Rejected("create refused".into()));
            }
        }

        let id = self.allocate_id();
        self.widgets.lock().insert(
            id.clone(),
            FakeWidget {
                payload: spec.payload,
                geometry: spec.geometry,
                metadata: HashMap::new(),
            },
        );
        Ok(WidgetHandle {
            id,
            geometry: spec.geometry,
        })
    }

    async fn remove_widget(&self, id: &WidgetId) -> Result<(), HostError> {
        if self.failures.lock().removals {
            return Err(HostError::Unavailable("remove refused".into()));
        }
        match self.widgets.lock().remove(id) {
            Some(_) => Ok(()),
            None => Err(HostError::NotFound(id.clone())),
        }
    }

    async fn widget_geometry(&self, id: &WidgetId) -> Result<Option<Geometry>, HostError> {
        Ok(self.geometry(id))
    }

    async fn get_metadata(&self, id: &WidgetId, key: &str) -> Result<Option<Value>, HostError> {
        Ok(self
            .widgets
            .lock()
            .get(id)
            .and_then(|w| w.metadata.get(key).cloned()))
    }

    async fn set_metadata(&self, id: &WidgetId, key: &str, value: Value) -> Result<(), HostError> {
        if self.failures.lock().metadata_writes {
            return Err(HostError::Rejected("metadata refused".into()));
        }
        match self.widgets.lock().get_mut(id) {
            Some(widget) => {
                widget.metadata.insert(key.to_string(), value);
                Ok(())
            }
            None => Err(HostError::NotFound(id.clone())),
        }
    }

    async fn focus_view(&self, id: &WidgetId) -> Result<(), HostError> {
        self.focused.lock().push(id.clone());
        Ok(())
    }

    async fn deselect_all(&self) -> Result<(), HostError> {
        self.deselects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn viewport_center(&self) -> Result<Point, HostError> {
        Ok(*self.viewport.lock())
    }

    async fn current_identity(&self) -> Result<HostIdentity, HostError> {
        if self.failures.lock().identity {
            return Err(HostError::Unavailable("identity unavailable".into()));
        }
        Ok(HostIdentity {
            host_user_id: Self::HOST_USER_ID.to_string(),
            name: Some("Test User".into()),
            email: Some("test@example.com".into()),
            board_id: Some("board-1".into()),
        })
    }

    fn selection_events(&self) -> broadcast::Receiver<SelectionEvent> {
        self.selections.subscribe()
    }
}

/// In-memory backend with switchable failure modes.
pub struct FakeBackend {
    user: UserProfile,
    items: Mutex<Vec<CatalogItem>>,
    subscription: Mutex<SubscriptionRecord>,
    token_lifetime: chrono::Duration,
    latency: Mutex<Option<Duration>>,
    unreachable: AtomicBool,
    rejections: AtomicUsize,
    fail_refresh: AtomicBool,
    fail_authenticate: AtomicBool,
    fail_create: AtomicBool,
    fail_delete: AtomicBool,
    tokens_issued: AtomicUsize,
    authenticate_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    create_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    tracked: Mutex<Vec<UsageEvent>>,
}

impl FakeBackend {
    pub const USER_ID: &'static str = "user-1";

    pub fn new() -> Self {
        Self {
            user: UserProfile {
                id: UserId::new(Self::USER_ID),
                name: Some("Test User".into()),
                email: Some("test@example.com".into()),
            },
            items: Mutex::new(default_catalog()),
            subscription: Mutex::new(SubscriptionRecord::free_tier(10)),
            token_lifetime: chrono::Duration::hours(1),
            latency: Mutex::new(None),
            unreachable: AtomicBool::new(false),
            rejections: AtomicUsize::new(0),
            fail_refresh: AtomicBool::new(false),
            fail_authenticate: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            tokens_issued: AtomicUsize::new(0),
            authenticate_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            tracked: Mutex::new(Vec::new()),
        }
    }

    pub fn with_plan(self, plan_id: PlanId) -> Self {
        {
            let mut subscription = self.subscription.lock();
            subscription.plan_id = plan_id;
            if plan_id != PlanId::Free {
                subscription.user_item_limit = SubscriptionRecord::UNLIMITED;
            }
        }
        self
    }

    pub fn with_status(self, status: SubscriptionStatus) -> Self {
        self.subscription.lock().status = status;
        self
    }

    pub fn with_item_quota(self, count: u32, limit: i64) -> Self {
        {
            let mut subscription = self.subscription.lock();
            subscription.user_item_count = count;
            subscription.user_item_limit = limit;
        }
        self
    }

    pub fn with_items(self, items: Vec<CatalogItem>) -> Self {
        *self.items.lock() = items;
        self
    }

    pub fn with_token_lifetime(mut self, lifetime: chrono::Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    pub fn user_id(&self) -> UserId {
        self.user.id.clone()
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// The next `count` token-bearing calls answer 401.
    pub fn reject_next_calls(&self, count: usize) {
        self.rejections.store(count, Ordering::SeqCst);
    }

    pub fn fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    pub fn fail_authenticate(&self, fail: bool) {
        self.fail_authenticate.store(fail, Ordering::SeqCst);
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    /// Replaces the subscription the backend reports from now on.
    pub fn set_subscription(&self, subscription: SubscriptionRecord) {
        *self.subscription.lock() = subscription;
    }

    pub fn stored_items(&self) -> Vec<CatalogItem> {
        self.items.lock().clone()
    }

    pub fn authenticate_calls(&self) -> usize {
        self.authenticate_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn tracked_events(&self) -> Vec<UsageEvent> {
        self.tracked.lock().clone()
    }

    fn grant(&self) -> AuthGrant {
        let n = self.tokens_issued.fetch_add(1, Ordering::SeqCst) + 1;
        AuthGrant {
            token: AccessToken::new(format!("token-{}", n)),
            expires_at: Utc::now() + self.token_lifetime,
            user: self.user.clone(),
            subscription: self.subscription.lock().clone(),
        }
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Connectivity and token checks shared by every token-bearing call.
    async fn check(&self) -> Result<(), BackendError> {
        self.simulate_latency().await;
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(BackendError::Unreachable("connection refused".into()));
        }
        let rejected = self
            .rejections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(BackendError::Unauthorized);
        }
        Ok(())
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogBackend for FakeBackend {
    async fn authenticate(&self, _identity: &HostIdentity) -> Result<AuthGrant, BackendError> {
        self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(BackendError::Unreachable("connection refused".into()));
        }
        if self.fail_authenticate.load(Ordering::SeqCst) {
            return Err(BackendError::Unauthorized);
        }
        Ok(self.grant())
    }

    async fn refresh_token(&self, _token: &AccessToken) -> Result<AuthGrant, BackendError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(BackendError::Unauthorized);
        }
        self.check().await?;
        Ok(self.grant())
    }

    async fn get_subscription(
        &self,
        _token: &AccessToken,
    ) -> Result<SubscriptionRecord, BackendError> {
        self.check().await?;
        Ok(self.subscription.lock().clone())
    }

    async fn list_catalog_items(
        &self,
        _token: &AccessToken,
        filter: CategoryFilter,
    ) -> Result<Vec<CatalogItem>, BackendError> {
        self.check().await?;
        Ok(self
            .items
            .lock()
            .iter()
            .filter(|i| filter.matches(i.category))
            .filter(|i| !i.is_user_created || i.is_owned_by(Some(&self.user.id)))
            .cloned()
            .collect())
    }

    async fn create_catalog_item(
        &self,
        _token: &AccessToken,
        draft: &CatalogDraft,
    ) -> Result<CatalogItem, BackendError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check().await?;
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                status: 500,
                message: "insert failed".into(),
            });
        }

        let mut item = CatalogItem::provisional(draft, self.user.id.clone());
        item.id = ItemId::new(format!("srv-{}", uuid::Uuid::new_v4()));
        self.items.lock().push(item.clone());
        let mut subscription = self.subscription.lock();
        subscription.user_item_count += 1;
        Ok(item)
    }

    async fn delete_catalog_item(
        &self,
        _token: &AccessToken,
        id: &ItemId,
    ) -> Result<(), BackendError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check().await?;
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                status: 500,
                message: "delete failed".into(),
            });
        }

        let mut items = self.items.lock();
        let before = items.len();
        items.retain(|i| &i.id != id);
        if items.len() == before {
            return Err(BackendError::NotFound(id.to_string()));
        }
        let mut subscription = self.subscription.lock();
        subscription.user_item_count = subscription.user_item_count.saturating_sub(1);
        Ok(())
    }

    async fn track_event(&self, _token: &AccessToken, event: UsageEvent) -> Result<(), BackendError> {
        self.check().await?;
        self.tracked.lock().push(event);
        Ok(())
    }

    async fn logout(&self, _token: &AccessToken) -> Result<(), BackendError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
