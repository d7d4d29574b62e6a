//! Catalog store
//!
//! Holds the loaded catalog, the active filters and the create/remove
//! flows for user items. Access annotations are computed against the
//! session's current subscription every time they are read.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::config::PluginConfig;
use crate::data::{
    CatalogDraft, CatalogItem, Category, CategoryFilter, HexiesError, HexiesResult, ItemId,
};
use crate::entitlement::{can_access, can_create_user_item, EntitlementPolicy};
use crate::services::events::{EventBus, PluginEvent};
use crate::services::pending::PendingSet;
use crate::services::session::SessionController;
use crate::traits::UsageEvent;

/// A catalog item annotated with whether the current user may use it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub item: CatalogItem,
    pub accessible: bool,
}

#[derive(Debug, Default)]
struct CatalogState {
    items: Vec<CatalogItem>,
    category: CategoryFilter,
    /// Lowercased search text.
    search: String,
}

impl CatalogState {
    fn is_visible(&self, item: &CatalogItem) -> bool {
        self.category.matches(item.category) && item.matches_search(&self.search)
    }
}

pub struct CatalogStore {
    session: Arc<SessionController>,
    events: EventBus,
    policy: EntitlementPolicy,
    state: RwLock<CatalogState>,
    pending: PendingSet<ItemId>,
}

impl CatalogStore {
    pub fn new(session: Arc<SessionController>, events: EventBus, config: &PluginConfig) -> Self {
        Self {
            session,
            events,
            policy: config.entitlement_policy(),
            state: RwLock::new(CatalogState::default()),
            pending: PendingSet::new(),
        }
    }

    /// Loads the catalog from the backend, or from the fallback sources
    /// when the session is (or becomes) degraded.
    #[instrument(skip(self))]
    pub async fn load(&self, filter: CategoryFilter) -> HexiesResult<Vec<CatalogItem>> {
        if !self.session.is_fallback() {
            let result = self
                .session
                .authorized(|backend, token| async move {
                    backend.list_catalog_items(&token, filter).await
                })
                .await;

            match result {
                Ok(items) => {
                    let items = keep_valid(items);
                    if filter == CategoryFilter::All {
                        self.session.save_snapshot(&items).await;
                    }
                    info!(count = items.len(), "Loaded catalog from backend");
                    return Ok(self.replace_items(items));
                }
                Err(HexiesError::NetworkUnavailable(reason)) => {
                    warn!(reason = %reason, "Backend unreachable, serving fallback catalog");
                }
                Err(e) => return Err(e),
            }
        }

        let items: Vec<CatalogItem> = self
            .session
            .fallback_catalog()
            .await
            .into_iter()
            .filter(|item| filter.matches(item.category))
            .collect();
        info!(count = items.len(), "Loaded fallback catalog");
        Ok(self.replace_items(keep_valid(items)))
    }

    pub fn apply_filter(&self, category: CategoryFilter, search_text: &str) {
        let mut state = self.state.write();
        state.category = category;
        state.search = search_text.trim().to_lowercase();
    }

    pub fn clear_filters(&self) {
        self.apply_filter(CategoryFilter::All, "");
    }

    /// Every loaded item, in load order.
    pub fn items(&self) -> Vec<CatalogItem> {
        self.state.read().items.clone()
    }

    pub fn get(&self, id: &ItemId) -> Option<CatalogItem> {
        self.state.read().items.iter().find(|i| &i.id == id).cloned()
    }

    /// Items passing the current category filter and search text.
    pub fn get_visible(&self) -> Vec<CatalogItem> {
        let state = self.state.read();
        state
            .items
            .iter()
            .filter(|item| state.is_visible(item))
            .cloned()
            .collect()
    }

    /// Visible items annotated with access for the current subscription.
    pub fn visible_entries(&self) -> Vec<CatalogEntry> {
        let subscription = self.session.subscription();
        let user = self.session.current_user();
        self.get_visible()
            .into_iter()
            .map(|item| CatalogEntry {
                accessible: can_access(&item, subscription.as_ref(), user.as_ref(), &self.policy),
                item,
            })
            .collect()
    }

    /// Visible items grouped by category, groups and items in load order.
    pub fn grouped_by_category(&self) -> Vec<(Category, Vec<CatalogItem>)> {
        let mut groups: Vec<(Category, Vec<CatalogItem>)> = Vec::new();
        for item in self.get_visible() {
            match groups.iter_mut().find(|(category, _)| *category == item.category) {
                Some((_, items)) => items.push(item),
                None => groups.push((item.category, vec![item])),
            }
        }
        groups
    }

    /// Re-evaluates access after a subscription change.
    pub fn refresh_access(&self) -> Vec<CatalogEntry> {
        let entries = self.visible_entries();
        let item_count = self.state.read().items.len();
        debug!(
            accessible = entries.iter().filter(|e| e.accessible).count(),
            "Refreshed catalog access"
        );
        self.events.publish(PluginEvent::CatalogChanged { item_count });
        entries
    }

    /// Creates a user item: quota check, provisional insert, backend persist,
    /// then swap in the backend record. The provisional item is rolled back
    /// if persisting fails.
    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub async fn create(&self, draft: CatalogDraft) -> HexiesResult<CatalogItem> {
        let draft = draft.normalized()?;

        let subscription = self.session.subscription();
        if !can_create_user_item(subscription.as_ref()) {
            let limit = subscription.map(|s| s.user_item_limit).unwrap_or(0);
            return Err(HexiesError::QuotaExceeded { limit });
        }
        let owner = self.session.current_user().ok_or_else(|| {
            if self.session.is_fallback() {
                HexiesError::NetworkUnavailable("cannot create items in fallback mode".into())
            } else {
                HexiesError::AuthExpired
            }
        })?;

        let provisional = CatalogItem::provisional(&draft, owner);
        let provisional_id = provisional.id.clone();
        let _guard = self.pending.acquire(&provisional_id)?;
        self.state.write().items.push(provisional);
        debug!(provisional_id = %provisional_id, "Inserted provisional item");

        let draft_ref = &draft;
        let persisted = self
            .session
            .authorized(|backend, token| async move {
                backend.create_catalog_item(&token, draft_ref).await
            })
            .await
            .and_then(|record| record.validate().map(|_| record));

        let record = match persisted {
            Ok(record) => record,
            Err(e) => {
                self.state.write().items.retain(|i| i.id != provisional_id);
                warn!(error = %e, "Persisting item failed, rolled back");
                return Err(e);
            }
        };

        let item_count = {
            let mut state = self.state.write();
            match state.items.iter_mut().find(|i| i.id == provisional_id) {
                Some(slot) => *slot = record.clone(),
                None => state.items.push(record.clone()),
            }
            state.items.len()
        };
        self.session.record_item_created();

        info!(item_id = %record.id, "Created user item");
        self.events.publish(PluginEvent::CatalogChanged { item_count });
        self.session
            .track(UsageEvent::new(
                UsageEvent::ITEM_CREATED,
                json!({ "hexie_id": record.id, "category": record.category }),
            ))
            .await;
        Ok(record)
    }

    /// Deletes a user item owned by the current user, backend first.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &ItemId) -> HexiesResult<()> {
        let _guard = self.pending.acquire(id)?;

        let item = self
            .get(id)
            .ok_or_else(|| HexiesError::NotFound(id.clone()))?;
        let user = self.session.current_user();
        if !item.is_user_created || !item.is_owned_by(user.as_ref()) {
            return Err(HexiesError::NotOwner(id.clone()));
        }

        self.session
            .authorized(|backend, token| async move {
                backend.delete_catalog_item(&token, id).await
            })
            .await?;

        let item_count = {
            let mut state = self.state.write();
            state.items.retain(|i| &i.id != id);
            state.items.len()
        };
        self.session.record_item_removed();

        info!("Removed user item");
        self.events.publish(PluginEvent::CatalogChanged { item_count });
        self.session
            .track(UsageEvent::new(UsageEvent::ITEM_DELETED, json!({ "hexie_id": id })))
            .await;
        Ok(())
    }

    fn replace_items(&self, items: Vec<CatalogItem>) -> Vec<CatalogItem> {
        let item_count = items.len();
        self.state.write().items = items.clone();
        self.events.publish(PluginEvent::CatalogChanged { item_count });
        items
    }
}

fn keep_valid(items: Vec<CatalogItem>) -> Vec<CatalogItem> {
    items
        .into_iter()
        .filter(|item| match item.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "Dropping invalid catalog item");
                false
            }
        })
        .collect()
}
