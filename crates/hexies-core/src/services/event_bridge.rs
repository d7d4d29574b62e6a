//! Event bridge
//!
//! Pumps host selection events into the widget synchronizer and
//! entitlement-changed notifications into a subscription refresh.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::data::SelectionEvent;
use crate::services::catalog::CatalogStore;
use crate::services::events::EntitlementChanged;
use crate::services::session::SessionController;
use crate::services::widgets::WidgetSynchronizer;

pub struct EventBridge {
    session: Arc<SessionController>,
    catalog: Arc<CatalogStore>,
    widgets: Arc<WidgetSynchronizer>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EventBridge {
    pub fn new(
        session: Arc<SessionController>,
        catalog: Arc<CatalogStore>,
        widgets: Arc<WidgetSynchronizer>,
    ) -> Self {
        Self {
            session,
            catalog,
            widgets,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the pump tasks. Any tasks from a previous start are stopped first.
    pub fn start(
        &self,
        selections: broadcast::Receiver<SelectionEvent>,
        entitlements: broadcast::Receiver<EntitlementChanged>,
    ) {
        self.shutdown();

        let selection_task = tokio::spawn(pump_selections(self.widgets.clone(), selections));
        let entitlement_task = tokio::spawn(pump_entitlements(
            self.session.clone(),
            self.catalog.clone(),
            entitlements,
        ));
        self.tasks.lock().extend([selection_task, entitlement_task]);
        info!("Event bridge started");
    }

    pub fn shutdown(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        if tasks.is_empty() {
            return;
        }
        for task in tasks {
            task.abort();
        }
        info!("Event bridge stopped");
    }

    pub fn is_running(&self) -> bool {
        self.tasks.lock().iter().any(|t| !t.is_finished())
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

async fn pump_selections(
    widgets: Arc<WidgetSynchronizer>,
    mut selections: broadcast::Receiver<SelectionEvent>,
) {
    loop {
        match selections.recv().await {
            Ok(event) => {
                if let Err(e) = widgets.handle_selection(&event).await {
                    warn!(error = %e, "Selection handling failed");
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Selection events dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!("Selection stream closed");
}

async fn pump_entitlements(
    session: Arc<SessionController>,
    catalog: Arc<CatalogStore>,
    mut entitlements: broadcast::Receiver<EntitlementChanged>,
) {
    loop {
        match entitlements.recv().await {
            Ok(change) => {
                let current = session.current_user();
                if let (Some(target), Some(current)) = (change.user_id.as_ref(), current.as_ref()) {
                    if target != current {
                        debug!(user_id = %target, "Ignoring entitlement change for another user");
                        continue;
                    }
                }
                match session.refresh_subscription().await {
                    Ok(_) => {
                        catalog.refresh_access();
                    }
                    Err(e) => warn!(error = %e, "Subscription refresh after entitlement change failed"),
                }
            }
            // Lagging only loses duplicates of "something changed"; refresh once.
            Err(RecvError::Lagged(_)) => {
                if session.refresh_subscription().await.is_ok() {
                    catalog.refresh_access();
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!("Entitlement stream closed");
}
