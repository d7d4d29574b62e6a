//! Session and fallback controller
//!
//! Owns the backend token, the current subscription and the choice between
//! authoritative and fallback mode. Every backend call made by the other
//! services goes through [`SessionController::authorized`].

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use hexies_monitoring::LogExt;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::PluginConfig;
use crate::data::{
    BackendError, CatalogItem, HexiesError, HexiesResult, HostIdentity, SubscriptionRecord,
    UserId, UserProfile,
};
use crate::defaults::default_catalog;
use crate::services::events::{EventBus, PluginEvent};
use crate::traits::{
    AccessToken, AuthGrant, CachedCatalog, CanvasSurface, CatalogBackend, CatalogCache, UsageEvent,
};

/// Whether the backend is the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Authoritative,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Authenticating,
    Ready(SessionMode),
    Expired,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub user: Option<UserProfile>,
    pub subscription: Option<SubscriptionRecord>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    pub fn is_fallback(&self) -> bool {
        self.state == SessionState::Ready(SessionMode::Fallback)
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user.as_ref().map(|u| &u.id)
    }
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    identity: Option<HostIdentity>,
    token: Option<AccessToken>,
    expires_at: Option<DateTime<Utc>>,
    user: Option<UserProfile>,
    subscription: Option<SubscriptionRecord>,
}

impl SessionInner {
    fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
            identity: None,
            token: None,
            expires_at: None,
            user: None,
            subscription: None,
        }
    }

    fn clear_credentials(&mut self) {
        self.token = None;
        self.expires_at = None;
        self.user = None;
    }

    fn install(&mut self, grant: AuthGrant) {
        self.token = Some(grant.token);
        self.expires_at = Some(grant.expires_at);
        self.user = Some(grant.user);
        self.subscription = Some(grant.subscription);
    }

    /// Authoritative and still using `token`.
    fn holds(&self, token: &AccessToken) -> bool {
        self.state == SessionState::Ready(SessionMode::Authoritative)
            && self.token.as_ref() == Some(token)
    }
}

/// Error for a backend call attempted outside authoritative mode.
fn unavailable(state: SessionState) -> HexiesError {
    match state {
        SessionState::Ready(SessionMode::Fallback) => {
            HexiesError::NetworkUnavailable("session is in fallback mode".to_string())
        }
        _ => HexiesError::AuthExpired,
    }
}

pub struct SessionController {
    backend: Arc<dyn CatalogBackend>,
    surface: Arc<dyn CanvasSurface>,
    cache: Arc<dyn CatalogCache>,
    events: EventBus,
    refresh_lead: Duration,
    cache_freshness: Duration,
    free_item_limit: i64,
    inner: RwLock<SessionInner>,
    reauth_lock: tokio::sync::Mutex<()>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    pub fn new(
        backend: Arc<dyn CatalogBackend>,
        surface: Arc<dyn CanvasSurface>,
        cache: Arc<dyn CatalogCache>,
        events: EventBus,
        config: &PluginConfig,
    ) -> Self {
        Self {
            backend,
            surface,
            cache,
            events,
            refresh_lead: config.refresh_lead(),
            cache_freshness: config.cache_freshness(),
            free_item_limit: config.free_item_limit,
            inner: RwLock::new(SessionInner::new()),
            reauth_lock: tokio::sync::Mutex::new(()),
            refresh_task: Mutex::new(None),
        }
    }

    /// Authenticates against the backend, falling back to the local catalog
    /// and the free tier on any failure. Never fails.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> SessionSnapshot {
        self.inner.write().state = SessionState::Authenticating;

        let identity = match self.surface.current_identity().await {
            Ok(identity) => identity,
            Err(e) => {
                self.enter_fallback(format!("host identity unavailable: {}", e));
                return self.snapshot();
            }
        };
        self.inner.write().identity = Some(identity.clone());

        match self.backend.authenticate(&identity).await {
            Ok(grant) => {
                info!(user_id = %grant.user.id, plan = ?grant.subscription.plan_id, "Session authenticated");
                let subscription = grant.subscription.clone();
                self.apply_grant(grant);
                self.events
                    .publish(PluginEvent::SubscriptionUpdated { subscription });
            }
            Err(e) => self.enter_fallback(format!("authentication failed: {}", e)),
        }

        self.snapshot()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.read();
        SessionSnapshot {
            state: inner.state,
            user: inner.user.clone(),
            subscription: inner.subscription.clone(),
            expires_at: inner.expires_at,
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.read().state
    }

    pub fn is_authoritative(&self) -> bool {
        self.state() == SessionState::Ready(SessionMode::Authoritative)
    }

    pub fn is_fallback(&self) -> bool {
        self.state() == SessionState::Ready(SessionMode::Fallback)
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.inner.read().user.as_ref().map(|u| u.id.clone())
    }

    pub fn subscription(&self) -> Option<SubscriptionRecord> {
        self.inner.read().subscription.clone()
    }

    /// Runs a backend call with the current token.
    ///
    /// A 401 triggers one re-authentication and one retry. A second 401 or
    /// a failed re-authentication expires the session. An unreachable
    /// backend moves the session into fallback mode.
    pub async fn authorized<T, F, Fut>(&self, op: F) -> HexiesResult<T>
    where
        F: Fn(Arc<dyn CatalogBackend>, AccessToken) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let token = self.current_token()?;

        match op(self.backend.clone(), token.clone()).await {
            Ok(value) => Ok(value),
            Err(BackendError::Unauthorized) => {
                debug!("Backend rejected token, re-authenticating");
                let fresh = self.reauthenticate(&token).await?;
                match op(self.backend.clone(), fresh).await {
                    Ok(value) => Ok(value),
                    Err(BackendError::Unauthorized) => {
                        self.expire("token rejected after re-authentication");
                        Err(HexiesError::AuthExpired)
                    }
                    Err(e) => Err(self.classify(e)),
                }
            }
            Err(e) => Err(self.classify(e)),
        }
    }

    /// Re-fetches the subscription, e.g. after an entitlement change.
    #[instrument(skip(self))]
    pub async fn refresh_subscription(&self) -> HexiesResult<SubscriptionRecord> {
        let subscription = self
            .authorized(|backend, token| async move { backend.get_subscription(&token).await })
            .await?;

        {
            let mut inner = self.inner.write();
            if inner.state != SessionState::Ready(SessionMode::Authoritative) {
                debug!(state = ?inner.state, "Session changed during subscription refresh");
                return Err(unavailable(inner.state));
            }
            inner.subscription = Some(subscription.clone());
        }
        info!(plan = ?subscription.plan_id, status = ?subscription.status, "Subscription refreshed");
        self.events.publish(PluginEvent::SubscriptionUpdated {
            subscription: subscription.clone(),
        });
        Ok(subscription)
    }

    /// Best-effort usage analytics. Never fails and never leaves fallback mode.
    pub async fn track(&self, event: UsageEvent) {
        if !self.is_authoritative() {
            debug!(event_type = %event.event_type, "Skipping analytics outside authoritative mode");
            return;
        }
        let result = self
            .authorized(|backend, token| {
                let event = event.clone();
                async move { backend.track_event(&token, event).await }
            })
            .await;
        if let Err(e) = result {
            debug!(error = %e, "Usage event dropped");
        }
    }

    /// Ends the session. Backend logout is best-effort.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        self.stop_refresh();
        let token = self.inner.read().token.clone();
        if let Some(token) = token {
            let _ = self.backend.logout(&token).await.log_warn("Backend logout failed");
        }
        let mut inner = self.inner.write();
        inner.clear_credentials();
        inner.subscription = None;
        inner.state = SessionState::Uninitialized;
        info!("Session logged out");
    }

    pub fn record_item_created(&self) {
        if let Some(subscription) = self.inner.write().subscription.as_mut() {
            subscription.user_item_count = subscription.user_item_count.saturating_add(1);
        }
    }

    pub fn record_item_removed(&self) {
        if let Some(subscription) = self.inner.write().subscription.as_mut() {
            subscription.user_item_count = subscription.user_item_count.saturating_sub(1);
        }
    }

    /// The catalog served in fallback mode: the cached snapshot when fresh,
    /// otherwise the built-in defaults.
    pub async fn fallback_catalog(&self) -> Vec<CatalogItem> {
        let Some(key) = self.cache_key() else {
            return default_catalog();
        };

        match self.cache.load(&key).await.log_warn("Failed to read catalog cache") {
            Ok(Some(snapshot)) if snapshot.is_fresh(self.cache_freshness, Utc::now()) => {
                debug!(items = snapshot.items.len(), "Serving cached catalog");
                snapshot.items
            }
            Ok(Some(_)) => {
                debug!("Cached catalog is stale, serving defaults");
                default_catalog()
            }
            _ => default_catalog(),
        }
    }

    /// Saves an authoritative catalog for later fallback use. Best-effort.
    pub async fn save_snapshot(&self, items: &[CatalogItem]) {
        let Some(key) = self.cache_key() else {
            return;
        };
        let snapshot = CachedCatalog::new(items.to_vec(), self.subscription());
        let _ = self
            .cache
            .store(&key, &snapshot)
            .await
            .log_warn("Failed to write catalog cache");
    }

    /// Starts the token refresh task, replacing a running one.
    pub fn start_refresh(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(refresh_loop(weak));
        if let Some(previous) = self.refresh_task.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn stop_refresh(&self) {
        if let Some(handle) = self.refresh_task.lock().take() {
            handle.abort();
            debug!("Token refresh task stopped");
        }
    }

    pub fn is_refresh_running(&self) -> bool {
        self.refresh_task
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Delay until the next refresh, `None` when there is nothing to refresh.
    fn next_refresh_delay(&self) -> Option<Duration> {
        let inner = self.inner.read();
        if inner.state != SessionState::Ready(SessionMode::Authoritative) {
            return None;
        }
        let expires_at = inner.expires_at?;
        let remaining = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        Some(remaining.saturating_sub(self.refresh_lead))
    }

    /// Refreshes the token, re-authenticating if the refresh is refused.
    /// Returns false once the session is no longer authoritative.
    #[instrument(skip(self))]
    async fn refresh_once(&self) -> bool {
        let (token, identity) = {
            let inner = self.inner.read();
            (inner.token.clone(), inner.identity.clone())
        };
        let Some(token) = token else {
            return false;
        };

        let grant = match self.backend.refresh_token(&token).await {
            Err(e) if !e.is_unreachable() => {
                warn!(error = %e, "Token refresh failed, re-authenticating");
                match identity {
                    Some(identity) => self.backend.authenticate(&identity).await,
                    None => Err(e),
                }
            }
            other => other,
        };

        match grant {
            Ok(grant) => {
                let expires_at = grant.expires_at;
                if self.replace_grant(&token, grant) {
                    debug!(expires_at = %expires_at, "Token refreshed");
                } else {
                    debug!("Session changed during token refresh, dropping new token");
                }
                self.is_authoritative()
            }
            Err(e) if e.is_unreachable() => {
                self.enter_fallback(format!("token refresh failed: {}", e));
                false
            }
            Err(e) => {
                self.expire_if_current(&token, &format!("token refresh failed: {}", e));
                false
            }
        }
    }

    fn current_token(&self) -> HexiesResult<AccessToken> {
        let inner = self.inner.read();
        match inner.state {
            SessionState::Ready(SessionMode::Authoritative) => {
                inner.token.clone().ok_or(HexiesError::AuthExpired)
            }
            state => Err(unavailable(state)),
        }
    }

    async fn reauthenticate(&self, rejected: &AccessToken) -> HexiesResult<AccessToken> {
        let _guard = self.reauth_lock.lock().await;

        let (current, identity) = {
            let inner = self.inner.read();
            (inner.token.clone(), inner.identity.clone())
        };
        // Another caller already replaced the rejected token or left
        // authoritative mode.
        if current.as_ref() != Some(rejected) {
            return self.current_token();
        }
        let Some(identity) = identity else {
            self.expire_if_current(rejected, "no host identity to re-authenticate with");
            return Err(HexiesError::AuthExpired);
        };

        match self.backend.authenticate(&identity).await {
            Ok(grant) => {
                let token = grant.token.clone();
                if !self.replace_grant(rejected, grant) {
                    debug!("Session changed during re-authentication, dropping new token");
                    return self.current_token();
                }
                info!("Re-authenticated after rejected token");
                Ok(token)
            }
            Err(e) if e.is_unreachable() => Err(self.classify(e)),
            Err(e) => {
                self.expire_if_current(rejected, &format!("re-authentication failed: {}", e));
                Err(HexiesError::AuthExpired)
            }
        }
    }

    fn classify(&self, error: BackendError) -> HexiesError {
        if error.is_unreachable() {
            self.enter_fallback(error.to_string());
        }
        HexiesError::from(error)
    }

    /// Installs the grant from `initialize`, the only path into authoritative mode.
    fn apply_grant(&self, grant: AuthGrant) {
        let mut inner = self.inner.write();
        inner.install(grant);
        inner.state = SessionState::Ready(SessionMode::Authoritative);
    }

    /// Swaps in a renewed grant, but only while the session is still
    /// authoritative and `replaced` is still its token.
    fn replace_grant(&self, replaced: &AccessToken, grant: AuthGrant) -> bool {
        let mut inner = self.inner.write();
        if !inner.holds(replaced) {
            return false;
        }
        inner.install(grant);
        true
    }

    fn enter_fallback(&self, reason: String) {
        {
            let mut inner = self.inner.write();
            if !matches!(
                inner.state,
                SessionState::Authenticating | SessionState::Ready(SessionMode::Authoritative)
            ) {
                return;
            }
            inner.clear_credentials();
            inner.subscription = Some(SubscriptionRecord::free_tier(self.free_item_limit));
            inner.state = SessionState::Ready(SessionMode::Fallback);
        }
        warn!(reason = %reason, "Entering fallback mode");
        self.events.publish(PluginEvent::DegradedMode { reason });
    }

    fn expire(&self, reason: &str) {
        {
            let mut inner = self.inner.write();
            if inner.state != SessionState::Ready(SessionMode::Authoritative) {
                return;
            }
            inner.clear_credentials();
            inner.subscription = None;
            inner.state = SessionState::Expired;
        }
        warn!(reason = %reason, "Session expired");
        self.events.publish(PluginEvent::SessionExpired);
    }

    fn expire_if_current(&self, token: &AccessToken, reason: &str) {
        if self.inner.read().holds(token) {
            self.expire(reason);
        }
    }

    fn cache_key(&self) -> Option<UserId> {
        self.inner
            .read()
            .identity
            .as_ref()
            .map(|identity| UserId::new(identity.host_user_id.clone()))
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(handle) = self.refresh_task.get_mut().take() {
            handle.abort();
        }
    }
}

async fn refresh_loop(session: Weak<SessionController>) {
    loop {
        let delay = match session.upgrade().and_then(|s| s.next_refresh_delay()) {
            Some(delay) => delay,
            None => break,
        };
        tokio::time::sleep(delay).await;

        let Some(controller) = session.upgrade() else {
            break;
        };
        if !controller.is_authoritative() || !controller.refresh_once().await {
            break;
        }
    }
    debug!("Token refresh loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_cache::MemoryCatalogCache;
    use crate::data::{CacheError, PlanId};
    use crate::test_utils::fakes::{FakeBackend, FakeCanvasSurface};
    use pretty_assertions::assert_eq;

    struct Harness {
        backend: Arc<FakeBackend>,
        cache: Arc<MemoryCatalogCache>,
        events: EventBus,
        session: Arc<SessionController>,
    }

    fn harness(backend: FakeBackend) -> Harness {
        let backend = Arc::new(backend);
        let cache = Arc::new(MemoryCatalogCache::new());
        let events = EventBus::new();
        let session = Arc::new(SessionController::new(
            backend.clone(),
            Arc::new(FakeCanvasSurface::new()),
            cache.clone(),
            events.clone(),
            &PluginConfig::default(),
        ));
        Harness {
            backend,
            cache,
            events,
            session,
        }
    }

    #[tokio::test]
    async fn test_initialize_authoritative() {
        let h = harness(FakeBackend::new().with_plan(PlanId::Pro));

        let snapshot = h.session.initialize().await;

        assert_eq!(snapshot.state, SessionState::Ready(SessionMode::Authoritative));
        assert_eq!(snapshot.subscription.unwrap().plan_id, PlanId::Pro);
        assert!(snapshot.user.is_some());
    }

    #[tokio::test]
    async fn test_initialize_falls_back_when_backend_unreachable() {
        let h = harness(FakeBackend::new());
        h.backend.set_unreachable(true);
        let mut events = h.events.subscribe();

        let snapshot = h.session.initialize().await;

        assert!(snapshot.is_fallback());
        let subscription = snapshot.subscription.unwrap();
        assert_eq!(subscription.plan_id, PlanId::Free);
        assert_eq!(subscription.user_item_limit, 5);
        assert!(matches!(events.recv().await.unwrap(), PluginEvent::DegradedMode { .. }));
    }

    #[tokio::test]
    async fn test_fallback_is_not_promoted_by_later_calls() {
        let h = harness(FakeBackend::new());
        h.backend.set_unreachable(true);
        h.session.initialize().await;
        h.backend.set_unreachable(false);

        let result = h.session.refresh_subscription().await;

        assert!(matches!(result, Err(HexiesError::NetworkUnavailable(_))));
        assert!(h.session.is_fallback());

        h.session.initialize().await;
        assert!(h.session.is_authoritative());
    }

    #[tokio::test]
    async fn test_unauthorized_is_retried_once_after_reauth() {
        let h = harness(FakeBackend::new());
        h.session.initialize().await;
        h.backend.reject_next_calls(1);

        let subscription = h.session.refresh_subscription().await.unwrap();

        assert_eq!(subscription.plan_id, PlanId::Free);
        assert_eq!(h.backend.authenticate_calls(), 2);
        assert!(h.session.is_authoritative());
    }

    #[tokio::test]
    async fn test_second_unauthorized_expires_session() {
        let h = harness(FakeBackend::new());
        h.session.initialize().await;
        h.backend.reject_next_calls(2);

        let result = h.session.refresh_subscription().await;

        assert!(matches!(result, Err(HexiesError::AuthExpired)));
        assert_eq!(h.session.state(), SessionState::Expired);
    }

    #[tokio::test]
    async fn test_unreachable_mid_session_enters_fallback() {
        let h = harness(FakeBackend::new());
        h.session.initialize().await;
        h.backend.set_unreachable(true);

        let result = h.session.refresh_subscription().await;

        assert!(matches!(result, Err(HexiesError::NetworkUnavailable(_))));
        assert!(h.session.is_fallback());
    }

    #[tokio::test]
    async fn test_fallback_catalog_prefers_fresh_cache() {
        let h = harness(FakeBackend::new());
        h.session.initialize().await;
        let mut cached = default_catalog();
        cached.truncate(2);
        h.session.save_snapshot(&cached).await;
        assert_eq!(h.cache.len(), 1);

        assert_eq!(h.session.fallback_catalog().await, cached);
    }

    #[tokio::test]
    async fn test_fallback_catalog_ignores_stale_cache() {
        let h = harness(FakeBackend::new());
        h.session.initialize().await;
        let key = UserId::new(FakeCanvasSurface::HOST_USER_ID);
        let mut stale = CachedCatalog::new(vec![default_catalog().remove(0)], None);
        stale.saved_at = Utc::now() - chrono::Duration::days(2);
        h.cache.store(&key, &stale).await.unwrap();

        assert_eq!(h.session.fallback_catalog().await, default_catalog());
    }

    #[tokio::test]
    async fn test_fallback_catalog_survives_cache_errors() {
        let mut cache = crate::traits::cache::MockCatalogCache::new();
        cache.expect_load().returning(|_| {
            Err(CacheError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "denied",
            )))
        });
        cache.expect_store().returning(|_, _| Ok(()));
        let session = SessionController::new(
            Arc::new(FakeBackend::new()),
            Arc::new(FakeCanvasSurface::new()),
            Arc::new(cache),
            EventBus::new(),
            &PluginConfig::default(),
        );
        session.initialize().await;

        assert_eq!(session.fallback_catalog().await, default_catalog());
    }

    #[tokio::test]
    async fn test_item_counters_track_creations() {
        let h = harness(FakeBackend::new());
        h.session.initialize().await;

        h.session.record_item_created();
        h.session.record_item_created();
        h.session.record_item_removed();

        assert_eq!(h.session.subscription().unwrap().user_item_count, 1);
    }

    #[tokio::test]
    async fn test_track_is_skipped_in_fallback() {
        let h = harness(FakeBackend::new());
        h.backend.set_unreachable(true);
        h.session.initialize().await;

        h.session
            .track(UsageEvent::new(UsageEvent::ITEM_ADDED_TO_BOARD, serde_json::json!({"id": "x"})))
            .await;

        assert!(h.backend.tracked_events().is_empty());
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let h = harness(FakeBackend::new());
        h.session.initialize().await;

        h.session.logout().await;

        assert_eq!(h.session.state(), SessionState::Uninitialized);
        assert_eq!(h.session.current_user(), None);
        assert_eq!(h.backend.logout_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_fires_before_expiry() {
        let h = harness(FakeBackend::new().with_token_lifetime(chrono::Duration::minutes(6)));
        h.session.initialize().await;
        h.session.start_refresh();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.backend.refresh_calls(), 0);

        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(h.backend.refresh_calls(), 1);
        assert!(h.session.is_authoritative());

        h.session.stop_refresh();
        assert!(!h.session.is_refresh_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_and_reauth_expires_session() {
        let h = harness(FakeBackend::new().with_token_lifetime(chrono::Duration::minutes(6)));
        h.session.initialize().await;
        h.backend.fail_refresh(true);
        h.backend.fail_authenticate(true);
        h.session.start_refresh();

        tokio::time::sleep(Duration::from_secs(90)).await;

        assert_eq!(h.session.state(), SessionState::Expired);
        assert!(!h.session.is_refresh_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_refresh_enters_fallback() {
        let h = harness(FakeBackend::new().with_token_lifetime(chrono::Duration::minutes(6)));
        h.session.initialize().await;
        h.session.start_refresh();
        h.backend.set_unreachable(true);

        tokio::time::sleep(Duration::from_secs(90)).await;

        assert!(h.session.is_fallback());
        assert_eq!(h.session.subscription(), Some(SubscriptionRecord::free_tier(5)));
        assert_eq!(h.backend.authenticate_calls(), 1);
        assert!(!h.session.is_refresh_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_completing_after_fallback_keeps_fallback() {
        let h = harness(FakeBackend::new().with_token_lifetime(chrono::Duration::minutes(6)));
        h.session.initialize().await;
        h.backend.set_latency(Duration::from_secs(5));
        h.session.start_refresh();

        tokio::time::sleep(Duration::from_secs(62)).await;
        assert_eq!(h.backend.refresh_calls(), 1);

        h.backend.set_latency(Duration::ZERO);
        h.backend.set_unreachable(true);
        let result = h.session.refresh_subscription().await;
        assert!(matches!(result, Err(HexiesError::NetworkUnavailable(_))));
        h.backend.set_unreachable(false);

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(h.session.is_fallback());
        assert_eq!(h.session.subscription(), Some(SubscriptionRecord::free_tier(5)));
        assert!(!h.session.is_refresh_running());
    }

    #[tokio::test]
    async fn test_reauth_after_fallback_is_not_applied() {
        let h = harness(FakeBackend::new());
        h.session.initialize().await;
        let stale = h.session.current_token().unwrap();
        h.backend.set_unreachable(true);
        let _ = h.session.refresh_subscription().await;
        h.backend.set_unreachable(false);

        let result = h.session.reauthenticate(&stale).await;

        assert!(matches!(result, Err(HexiesError::NetworkUnavailable(_))));
        assert!(h.session.is_fallback());
        assert_eq!(h.backend.authenticate_calls(), 1);
    }
}
