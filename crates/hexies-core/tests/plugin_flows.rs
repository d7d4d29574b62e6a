use std::sync::Arc;

use chrono::{Duration, Utc};
use hexies_core::adapters::MemoryCatalogCache;
use hexies_core::test_utils::{FakeBackend, FakeCanvasSurface};
use hexies_core::{
    CatalogDraft, CatalogItem, Category, CategoryFilter, EntitlementChanged, FaceState,
    FlipOutcome, HexiesError, HexiesPlugin, PlanId, PluginConfig, PluginEvent, Point,
    SelectionEvent,
};
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

struct TestPlugin {
    plugin: HexiesPlugin,
    surface: Arc<FakeCanvasSurface>,
    backend: Arc<FakeBackend>,
    _entitlements: broadcast::Sender<EntitlementChanged>,
}

async fn start(backend: FakeBackend) -> TestPlugin {
    let surface = Arc::new(FakeCanvasSurface::new());
    let backend = Arc::new(backend);
    let (entitlements, receiver) = broadcast::channel(4);

    let plugin = HexiesPlugin::start(
        PluginConfig::default(),
        surface.clone(),
        backend.clone(),
        Arc::new(MemoryCatalogCache::new()),
        receiver,
    )
    .await
    .expect("plugin should start");

    TestPlugin {
        plugin,
        surface,
        backend,
        _entitlements: entitlements,
    }
}

fn first_free(plugin: &HexiesPlugin) -> CatalogItem {
    plugin
        .catalog()
        .items()
        .into_iter()
        .find(|i| i.is_free)
        .expect("catalog has free items")
}

#[tokio::test]
async fn place_then_flip_keeps_geometry_and_replaces_widget() {
    let t = start(FakeBackend::new()).await;
    let item = first_free(&t.plugin);

    let w1 = t
        .plugin
        .widgets()
        .place(&item, Point::new(100.0, 100.0))
        .await
        .unwrap();
    let outcome = t.plugin.widgets().flip(&w1.id).await.unwrap();

    let FlipOutcome::Flipped { widget: w2, face, .. } = outcome else {
        panic!("expected the widget to flip");
    };
    assert_eq!(face, FaceState::Back);
    assert_eq!(w2.geometry.position, Point::new(100.0, 100.0));
    assert_eq!(w2.geometry, w1.geometry);
    assert!(!t.surface.contains(&w1.id));
    assert_eq!(t.surface.widget_ids(), vec![w2.id.clone()]);

    let metadata = t.plugin.widgets().metadata(&w2.id).await.unwrap().unwrap();
    assert_eq!(metadata.face_state, FaceState::Back);
    assert_eq!(metadata.source_item_id, item.id);
}

#[tokio::test]
async fn flipping_twice_leaves_exactly_one_front_widget() {
    let t = start(FakeBackend::new()).await;
    let item = first_free(&t.plugin);
    let widgets = t.plugin.widgets();

    let placed = widgets.place(&item, Point::new(0.0, 0.0)).await.unwrap();
    let FlipOutcome::Flipped { widget: back, .. } = widgets.flip(&placed.id).await.unwrap() else {
        panic!("expected a flip");
    };
    let FlipOutcome::Flipped { widget: front, .. } = widgets.flip(&back.id).await.unwrap() else {
        panic!("expected a flip");
    };

    assert_eq!(t.surface.widget_count(), 1);
    assert_eq!(
        t.surface.payload(&front.id).unwrap().face,
        FaceState::Front
    );
}

#[tokio::test]
async fn double_selection_inside_window_flips_once() {
    let t = start(FakeBackend::new()).await;
    let item = first_free(&t.plugin);
    let widgets = t.plugin.widgets();
    let placed = widgets.place(&item, Point::new(0.0, 0.0)).await.unwrap();
    let t0 = Utc::now();

    let mut flips = 0;
    for offset in [0, 200] {
        let event = SelectionEvent::single(placed.id.clone(), t0 + Duration::milliseconds(offset));
        if let Some(FlipOutcome::Flipped { .. }) = widgets.handle_selection(&event).await.unwrap() {
            flips += 1;
        }
    }

    assert_eq!(flips, 1);
    assert_eq!(t.surface.widget_count(), 1);
}

#[tokio::test]
async fn double_selection_outside_window_does_not_flip() {
    let t = start(FakeBackend::new()).await;
    let item = first_free(&t.plugin);
    let widgets = t.plugin.widgets();
    let placed = widgets.place(&item, Point::new(0.0, 0.0)).await.unwrap();
    let t0 = Utc::now();

    for offset in [0, 500] {
        let event = SelectionEvent::single(placed.id.clone(), t0 + Duration::milliseconds(offset));
        assert_eq!(widgets.handle_selection(&event).await.unwrap(), None);
    }

    assert!(t.surface.contains(&placed.id));
}

#[tokio::test]
async fn unreachable_backend_starts_in_fallback() {
    let backend = FakeBackend::new();
    backend.set_unreachable(true);
    let t = start(backend).await;

    let snapshot = t.plugin.session().snapshot();
    assert!(snapshot.is_fallback());
    let subscription = snapshot.subscription.unwrap();
    assert_eq!(subscription.plan_id, PlanId::Free);
    assert_eq!(subscription.user_item_limit, 5);
    assert_eq!(t.plugin.catalog().items(), hexies_core::defaults::default_catalog());

    // Free items can still be placed, premium ones cannot.
    let free = first_free(&t.plugin);
    assert!(t.plugin.widgets().place(&free, Point::new(0.0, 0.0)).await.is_ok());
    let premium = t
        .plugin
        .catalog()
        .items()
        .into_iter()
        .find(|i| !i.is_free)
        .unwrap();
    assert!(matches!(
        t.plugin.widgets().place(&premium, Point::new(0.0, 0.0)).await,
        Err(HexiesError::AccessDenied { .. })
    ));
}

#[tokio::test]
async fn reinitialize_leaves_fallback_once_backend_returns() {
    let backend = FakeBackend::new().with_plan(PlanId::Enterprise);
    backend.set_unreachable(true);
    let t = start(backend).await;
    let mut events = t.plugin.subscribe();
    assert!(t.plugin.session().is_fallback());

    t.backend.set_unreachable(false);
    let snapshot = t.plugin.reinitialize().await;

    assert!(!snapshot.is_fallback());
    assert_eq!(snapshot.subscription.unwrap().plan_id, PlanId::Enterprise);
    assert!(t.plugin.session().is_refresh_running());
    assert!(matches!(
        events.recv().await.unwrap(),
        PluginEvent::SubscriptionUpdated { .. }
    ));
    t.plugin.shutdown();
    assert!(!t.plugin.session().is_refresh_running());
}

#[tokio::test]
async fn quota_exceeded_leaves_visible_set_unchanged() {
    let t = start(FakeBackend::new().with_item_quota(5, 5)).await;
    t.plugin
        .catalog()
        .apply_filter(CategoryFilter::Only(Category::Teams), "");
    let before = t.plugin.catalog().get_visible();

    let result = t
        .plugin
        .catalog()
        .create(CatalogDraft::new("Team Charter v2", Category::Teams, "Ground rules"))
        .await;

    match result {
        Err(HexiesError::QuotaExceeded { limit }) => assert_eq!(limit, 5),
        other => panic!("expected quota error, got {:?}", other),
    }
    assert_eq!(t.plugin.catalog().get_visible(), before);
}

#[tokio::test]
async fn created_item_is_accessible_and_placeable_by_owner() {
    let t = start(FakeBackend::new()).await;

    let item = t
        .plugin
        .catalog()
        .create(CatalogDraft::new("Pairing Norms", Category::Teams, "How we pair"))
        .await
        .unwrap();

    let entry = t
        .plugin
        .catalog()
        .visible_entries()
        .into_iter()
        .find(|e| e.item.id == item.id)
        .unwrap();
    assert!(entry.accessible);
    assert!(t
        .plugin
        .widgets()
        .place(&item, Point::new(10.0, 10.0))
        .await
        .is_ok());
    assert_eq!(t.backend.stored_items().last().unwrap().id, item.id);
}
