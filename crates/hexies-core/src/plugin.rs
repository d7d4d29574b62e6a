//! Composition root
//!
//! Builds every service exactly once and wires them to the host, backend
//! and cache collaborators.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::config::PluginConfig;
use crate::data::{CategoryFilter, HexiesResult};
use crate::services::{
    CatalogStore, EntitlementChanged, EventBridge, EventBus, PluginEvent, SessionController,
    SessionSnapshot, WidgetSynchronizer,
};
use crate::traits::{CanvasSurface, CatalogBackend, CatalogCache};

pub struct HexiesPlugin {
    config: PluginConfig,
    surface: Arc<dyn CanvasSurface>,
    events: EventBus,
    session: Arc<SessionController>,
    catalog: Arc<CatalogStore>,
    widgets: Arc<WidgetSynchronizer>,
    bridge: EventBridge,
}

impl HexiesPlugin {
    /// Wires the services, initializes the session, loads the catalog and
    /// starts the background tasks. Only an invalid configuration fails.
    #[instrument(skip_all)]
    pub async fn start(
        config: PluginConfig,
        surface: Arc<dyn CanvasSurface>,
        backend: Arc<dyn CatalogBackend>,
        cache: Arc<dyn CatalogCache>,
        entitlements: broadcast::Receiver<EntitlementChanged>,
    ) -> HexiesResult<Self> {
        config.validate()?;

        let events = EventBus::new();
        let session = Arc::new(SessionController::new(
            backend,
            surface.clone(),
            cache,
            events.clone(),
            &config,
        ));
        let catalog = Arc::new(CatalogStore::new(session.clone(), events.clone(), &config));
        let widgets = Arc::new(WidgetSynchronizer::new(
            surface.clone(),
            session.clone(),
            events.clone(),
            &config,
        ));
        let bridge = EventBridge::new(session.clone(), catalog.clone(), widgets.clone());

        let plugin = Self {
            config,
            surface,
            events,
            session,
            catalog,
            widgets,
            bridge,
        };
        plugin.connect().await;
        plugin
            .bridge
            .start(plugin.surface.selection_events(), entitlements);

        info!(fallback = plugin.session.is_fallback(), "Plugin started");
        Ok(plugin)
    }

    /// Builds the plugin against the HTTP backend, with a file cache when
    /// `cache_dir` is configured and an in-memory one otherwise.
    #[cfg(feature = "remote-backend")]
    pub async fn start_remote(
        config: PluginConfig,
        surface: Arc<dyn CanvasSurface>,
        entitlements: broadcast::Receiver<EntitlementChanged>,
    ) -> HexiesResult<Self> {
        use crate::adapters::{
            FileCatalogCache, MemoryCatalogCache, RemoteBackendClient, RemoteBackendConfig,
        };

        let backend = Arc::new(RemoteBackendClient::new(RemoteBackendConfig::from(&config))?);
        let cache: Arc<dyn CatalogCache> = match &config.cache_dir {
            Some(dir) => Arc::new(FileCatalogCache::new(dir.clone())),
            None => Arc::new(MemoryCatalogCache::new()),
        };
        Self::start(config, surface, backend, cache, entitlements).await
    }

    /// Runs session initialization again, e.g. to leave fallback mode.
    pub async fn reinitialize(&self) -> SessionSnapshot {
        self.connect().await;
        self.session.snapshot()
    }

    pub fn shutdown(&self) {
        self.bridge.shutdown();
        self.session.stop_refresh();
        info!("Plugin stopped");
    }

    pub async fn logout(&self) {
        self.session.logout().await;
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionController> {
        &self.session
    }

    pub fn catalog(&self) -> &Arc<CatalogStore> {
        &self.catalog
    }

    pub fn widgets(&self) -> &Arc<WidgetSynchronizer> {
        &self.widgets
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.events.subscribe()
    }

    async fn connect(&self) {
        let snapshot = self.session.initialize().await;
        if !snapshot.is_fallback() {
            self.session.start_refresh();
        }
        if let Err(e) = self.catalog.load(CategoryFilter::All).await {
            warn!(error = %e, "Initial catalog load failed");
        }
    }
}

impl Drop for HexiesPlugin {
    fn drop(&mut self) {
        self.bridge.shutdown();
        self.session.stop_refresh();
    }
}
