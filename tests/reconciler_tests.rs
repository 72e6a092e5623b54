//! Reconciler decision table.

mod support;

use std::sync::Arc;

use backline::core::domain::{
    AttemptOutcome, ChangeData, ChangeType, EventStatus, EventNotes, LinkStatus, PlatformTag,
    ProductStatus, SyncRunId, UniversalStatus,
};
use backline::core::reconcile::{OutboundAction, PriceAuthority, Reconciler};
use backline::core::store::{EventStatusUpdate, MemoryStore, Store};
use backline::testkit::domain::product;
use chrono::Utc;
use rust_decimal_macros::dec;
use support::{
    insert_event, price_change_data, quantity_change_data, sold_change_data,
    three_platform_fixture,
};
use tokio::sync::watch;

const EPS: rust_decimal::Decimal = dec!(0.01);

fn reconciler(store: &Arc<MemoryStore>, authority: PriceAuthority) -> Reconciler {
    let (_tx, rx) = watch::channel(false);
    Reconciler::new(Arc::clone(store) as Arc<dyn Store>, authority, EPS, false, rx)
}

#[tokio::test]
async fn sale_fans_out_to_other_active_platforms() {
    // S1 decision half: canonical effects commit now, outbound legs queue.
    let fx = three_platform_fixture();
    let run_id = SyncRunId::new();
    insert_event(
        &fx.store,
        run_id,
        PlatformTag::Ebay,
        "A100",
        ChangeType::StatusChange,
        sold_change_data(None),
        Some(fx.product.id),
    )
    .await;

    let events = fx.store.fetch_open_events().await.unwrap();
    let report = reconciler(&fx.store, PriceAuthority::Canonical)
        .reconcile(events)
        .await
        .unwrap();

    assert_eq!(report.sales, 1);
    assert_eq!(report.product_plans.len(), 1);
    let actions: Vec<&OutboundAction> = report.product_plans[0]
        .plans
        .iter()
        .flat_map(|p| &p.actions)
        .collect();
    assert_eq!(actions.len(), 2);
    assert!(actions.iter().any(|a| matches!(
        a,
        OutboundAction::MarkSold { platform: PlatformTag::Reverb, external_id } if external_id.as_str() == "B200"
    )));
    assert!(actions.iter().any(|a| matches!(
        a,
        OutboundAction::MarkSold { platform: PlatformTag::Shopify, external_id } if external_id.as_str() == "C300"
    )));

    // Canonical product is SOLD before any outbound call happens.
    let product = fx.store.product(fx.product.id).unwrap();
    assert_eq!(product.status, ProductStatus::Sold);
    let links = fx.store.fetch_links_for_product(fx.product.id).await.unwrap();
    let ebay = links.iter().find(|l| l.platform == PlatformTag::Ebay).unwrap();
    assert_eq!(ebay.status, LinkStatus::Sold);
}

#[tokio::test]
async fn ended_status_updates_link_without_propagation() {
    let fx = three_platform_fixture();
    let run_id = SyncRunId::new();
    let mut data = ChangeData::default();
    data.old_status = Some(UniversalStatus::Active);
    data.new_status = Some(UniversalStatus::Ended);
    let event = insert_event(
        &fx.store,
        run_id,
        PlatformTag::Ebay,
        "A100",
        ChangeType::StatusChange,
        data,
        Some(fx.product.id),
    )
    .await;

    let events = fx.store.fetch_open_events().await.unwrap();
    let report = reconciler(&fx.store, PriceAuthority::Canonical)
        .reconcile(events)
        .await
        .unwrap();

    assert!(report.product_plans.is_empty());
    assert_eq!(report.resolved_processed, 1);
    assert_eq!(
        fx.store.event(event.id).unwrap().status,
        EventStatus::Processed
    );
    let links = fx.store.fetch_links_for_product(fx.product.id).await.unwrap();
    let ebay = links.iter().find(|l| l.platform == PlatformTag::Ebay).unwrap();
    assert_eq!(ebay.status, LinkStatus::Ended);
    // Other links untouched; no outbound action for a remote-side ending.
    let reverb = links.iter().find(|l| l.platform == PlatformTag::Reverb).unwrap();
    assert_eq!(reverb.status, LinkStatus::Active);
}

#[tokio::test]
async fn canonical_authority_restores_remote_drift() {
    // S2 decision half.
    let fx = three_platform_fixture();
    let run_id = SyncRunId::new();
    insert_event(
        &fx.store,
        run_id,
        PlatformTag::Reverb,
        "B200",
        ChangeType::Price,
        price_change_data(dec!(4999.00), dec!(4450.00)),
        Some(fx.product.id),
    )
    .await;

    let events = fx.store.fetch_open_events().await.unwrap();
    let report = reconciler(&fx.store, PriceAuthority::Canonical)
        .reconcile(events)
        .await
        .unwrap();

    assert_eq!(report.price_changes, 1);
    let actions: Vec<&OutboundAction> = report.product_plans[0]
        .plans
        .iter()
        .flat_map(|p| &p.actions)
        .collect();
    assert_eq!(actions.len(), 1);
    assert!(matches!(
        actions[0],
        OutboundAction::UpdatePrice { platform: PlatformTag::Reverb, external_id, price }
            if external_id.as_str() == "B200" && *price == dec!(4999.00)
    ));
    // Canonical price itself is untouched.
    assert_eq!(
        fx.store.product(fx.product.id).unwrap().base_price,
        dec!(4999.00)
    );
}

#[tokio::test]
async fn drift_within_epsilon_is_skipped() {
    let fx = three_platform_fixture();
    let event = insert_event(
        &fx.store,
        SyncRunId::new(),
        PlatformTag::Reverb,
        "B200",
        ChangeType::Price,
        price_change_data(dec!(4999.00), dec!(4999.01)),
        Some(fx.product.id),
    )
    .await;

    let events = fx.store.fetch_open_events().await.unwrap();
    let report = reconciler(&fx.store, PriceAuthority::Canonical)
        .reconcile(events)
        .await
        .unwrap();

    assert!(report.product_plans.is_empty());
    assert_eq!(report.resolved_skipped, 1);
    assert_eq!(fx.store.event(event.id).unwrap().status, EventStatus::Skipped);
}

#[tokio::test]
async fn last_writer_wins_propagates_remote_price() {
    let fx = three_platform_fixture();
    insert_event(
        &fx.store,
        SyncRunId::new(),
        PlatformTag::Reverb,
        "B200",
        ChangeType::Price,
        price_change_data(dec!(4999.00), dec!(4450.00)),
        Some(fx.product.id),
    )
    .await;

    let events = fx.store.fetch_open_events().await.unwrap();
    let report = reconciler(&fx.store, PriceAuthority::LastWriterWins)
        .reconcile(events)
        .await
        .unwrap();

    assert_eq!(
        fx.store.product(fx.product.id).unwrap().base_price,
        dec!(4450.00)
    );
    let actions: Vec<&OutboundAction> = report.product_plans[0]
        .plans
        .iter()
        .flat_map(|p| &p.actions)
        .collect();
    // Ebay and Shopify take the new price; Reverb already shows it.
    assert_eq!(actions.len(), 2);
    assert!(actions
        .iter()
        .all(|a| matches!(a, OutboundAction::UpdatePrice { price, .. } if *price == dec!(4450.00))));
}

#[tokio::test]
async fn per_platform_policy_records_drift_without_action() {
    let fx = three_platform_fixture();
    let event = insert_event(
        &fx.store,
        SyncRunId::new(),
        PlatformTag::Reverb,
        "B200",
        ChangeType::Price,
        price_change_data(dec!(4999.00), dec!(4450.00)),
        Some(fx.product.id),
    )
    .await;

    let events = fx.store.fetch_open_events().await.unwrap();
    let report = reconciler(&fx.store, PriceAuthority::PerPlatform)
        .reconcile(events)
        .await
        .unwrap();

    assert!(report.product_plans.is_empty());
    assert_eq!(fx.store.event(event.id).unwrap().status, EventStatus::Processed);
}

#[tokio::test]
async fn quantity_change_updates_canonical_and_fans_out() {
    // S6 decision half, with a single-quantity platform in the mix.
    let store = Arc::new(MemoryStore::new());
    let bag = product("BAG-1").id(9).stocked(5).price(dec!(49.99)).build();
    store.insert_product(bag.clone());
    store.insert_link(bag.id, PlatformTag::Ebay, Some("Q1".into()), LinkStatus::Active);
    store.insert_link(bag.id, PlatformTag::Reverb, Some("Q2".into()), LinkStatus::Active);
    store.insert_link(bag.id, PlatformTag::Vr, Some("Q3".into()), LinkStatus::Active);

    insert_event(
        &store,
        SyncRunId::new(),
        PlatformTag::Ebay,
        "Q1",
        ChangeType::QuantityChange,
        quantity_change_data(5, 3),
        Some(bag.id),
    )
    .await;

    let events = store.fetch_open_events().await.unwrap();
    let report = reconciler(&store, PriceAuthority::Canonical)
        .reconcile(events)
        .await
        .unwrap();

    let product = store.product(bag.id).unwrap();
    assert_eq!(product.quantity, 3);
    assert_eq!(product.status, ProductStatus::Active);

    let actions: Vec<&OutboundAction> = report.product_plans[0]
        .plans
        .iter()
        .flat_map(|p| &p.actions)
        .collect();
    // Reverb takes the new count; V&R is single-quantity and only hears
    // about the zero case.
    assert_eq!(actions.len(), 1);
    assert!(matches!(
        actions[0],
        OutboundAction::UpdateQuantity { platform: PlatformTag::Reverb, quantity: 3, .. }
    ));
}

#[tokio::test]
async fn quantity_zero_reaches_single_quantity_platforms() {
    let store = Arc::new(MemoryStore::new());
    let bag = product("BAG-1").id(9).stocked(1).build();
    store.insert_product(bag.clone());
    store.insert_link(bag.id, PlatformTag::Ebay, Some("Q1".into()), LinkStatus::Active);
    store.insert_link(bag.id, PlatformTag::Vr, Some("Q3".into()), LinkStatus::Active);

    insert_event(
        &store,
        SyncRunId::new(),
        PlatformTag::Ebay,
        "Q1",
        ChangeType::QuantityChange,
        quantity_change_data(1, 0),
        Some(bag.id),
    )
    .await;

    let events = store.fetch_open_events().await.unwrap();
    let report = reconciler(&store, PriceAuthority::Canonical)
        .reconcile(events)
        .await
        .unwrap();

    assert_eq!(store.product(bag.id).unwrap().status, ProductStatus::Sold);
    let actions: Vec<&OutboundAction> = report.product_plans[0]
        .plans
        .iter()
        .flat_map(|p| &p.actions)
        .collect();
    assert!(matches!(
        actions[0],
        OutboundAction::UpdateQuantity { platform: PlatformTag::Vr, quantity: 0, .. }
    ));
}

#[tokio::test]
async fn sale_supersedes_price_event_for_same_product() {
    let fx = three_platform_fixture();
    let run_id = SyncRunId::new();
    insert_event(
        &fx.store,
        run_id,
        PlatformTag::Ebay,
        "A100",
        ChangeType::StatusChange,
        sold_change_data(None),
        Some(fx.product.id),
    )
    .await;
    let price_event = insert_event(
        &fx.store,
        run_id,
        PlatformTag::Reverb,
        "B200",
        ChangeType::Price,
        price_change_data(dec!(4999.00), dec!(4450.00)),
        Some(fx.product.id),
    )
    .await;

    let events = fx.store.fetch_open_events().await.unwrap();
    let report = reconciler(&fx.store, PriceAuthority::Canonical)
        .reconcile(events)
        .await
        .unwrap();

    let event = fx.store.event(price_event.id).unwrap();
    assert_eq!(event.status, EventStatus::Skipped);
    assert_eq!(event.notes.reason.as_deref(), Some("superseded by sale"));
    // Only the sale produced outbound work.
    let actions: Vec<&OutboundAction> = report.product_plans[0]
        .plans
        .iter()
        .flat_map(|p| &p.actions)
        .collect();
    assert!(actions
        .iter()
        .all(|a| matches!(a, OutboundAction::MarkSold { .. })));
}

#[tokio::test]
async fn sold_product_never_gets_price_actions() {
    // Sold is terminal for non-stocked items: later drift on a closed
    // listing cannot produce outbound work.
    let store = Arc::new(MemoryStore::new());
    let strat = product("REV-1001")
        .id(1)
        .status(ProductStatus::Sold)
        .build();
    store.insert_product(strat.clone());
    store.insert_link(
        strat.id,
        PlatformTag::Ebay,
        Some("A100".into()),
        LinkStatus::Sold,
    );

    insert_event(
        &store,
        SyncRunId::new(),
        PlatformTag::Ebay,
        "A100",
        ChangeType::Price,
        price_change_data(dec!(4999.00), dec!(100.00)),
        Some(strat.id),
    )
    .await;

    let events = store.fetch_open_events().await.unwrap();
    let report = reconciler(&store, PriceAuthority::Canonical)
        .reconcile(events)
        .await
        .unwrap();

    assert!(report.product_plans.is_empty());
}

#[tokio::test]
async fn removed_listing_flags_last_active_link_for_review() {
    let store = Arc::new(MemoryStore::new());
    let strat = product("REV-1001").id(1).build();
    store.insert_product(strat.clone());
    store.insert_link(
        strat.id,
        PlatformTag::Vr,
        Some("D400".into()),
        LinkStatus::Active,
    );

    let mut data = ChangeData::default();
    data.old_status = Some(UniversalStatus::Active);
    let event = insert_event(
        &store,
        SyncRunId::new(),
        PlatformTag::Vr,
        "D400",
        ChangeType::RemovedListing,
        data,
        Some(strat.id),
    )
    .await;

    let events = store.fetch_open_events().await.unwrap();
    reconciler(&store, PriceAuthority::Canonical)
        .reconcile(events)
        .await
        .unwrap();

    let links = store.fetch_links_for_product(strat.id).await.unwrap();
    assert_eq!(links[0].status, LinkStatus::Removed);

    let event = store.event(event.id).unwrap();
    assert_eq!(event.status, EventStatus::Processed);
    assert!(event.notes.needs_review);
    // Never auto-sold on removal.
    assert_eq!(store.product(strat.id).unwrap().status, ProductStatus::Active);
}

#[tokio::test]
async fn confirmed_new_listing_upserts_link() {
    let store = Arc::new(MemoryStore::new());
    let strat = product("REV-77").id(77).build();
    store.insert_product(strat.clone());

    let mut data = ChangeData::default();
    data.new_status = Some(UniversalStatus::Active);
    data.listing_url = Some("https://shop.example/products/strat".into());
    data.raw_data = serde_json::json!({ "title": "Strat", "photos": ["https://img.example/1.jpg"] });
    let event = insert_event(
        &store,
        SyncRunId::new(),
        PlatformTag::Shopify,
        "C999",
        ChangeType::NewListing,
        data,
        Some(strat.id),
    )
    .await;

    let events = store.fetch_open_events().await.unwrap();
    reconciler(&store, PriceAuthority::Canonical)
        .reconcile(events)
        .await
        .unwrap();

    let links = store.fetch_links_for_product(strat.id).await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].platform, PlatformTag::Shopify);
    assert_eq!(links[0].external_id.as_ref().unwrap().as_str(), "C999");
    assert_eq!(links[0].status, LinkStatus::Active);
    assert_eq!(store.event(event.id).unwrap().status, EventStatus::Processed);

    // The captured payload became the listing detail snapshot.
    let listing = store.listing(links[0].id).unwrap();
    assert_eq!(listing.picture_urls, vec!["https://img.example/1.jpg"]);
    assert_eq!(listing.raw_snapshot["title"], "Strat");
}

#[tokio::test]
async fn rogue_listing_stays_pending() {
    let store = Arc::new(MemoryStore::new());
    let event = insert_event(
        &store,
        SyncRunId::new(),
        PlatformTag::Shopify,
        "C999",
        ChangeType::NewListing,
        ChangeData::default(),
        None,
    )
    .await;

    let events = store.fetch_open_events().await.unwrap();
    let report = reconciler(&store, PriceAuthority::Canonical)
        .reconcile(events)
        .await
        .unwrap();

    assert_eq!(report.left_pending, 1);
    assert_eq!(store.event(event.id).unwrap().status, EventStatus::Pending);
}

#[tokio::test]
async fn cancellation_stops_reconciliation_between_groups() {
    let fx = three_platform_fixture();
    let event = insert_event(
        &fx.store,
        SyncRunId::new(),
        PlatformTag::Ebay,
        "A100",
        ChangeType::StatusChange,
        sold_change_data(None),
        Some(fx.product.id),
    )
    .await;

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let reconciler = Reconciler::new(
        Arc::clone(&fx.store) as Arc<dyn Store>,
        PriceAuthority::Canonical,
        EPS,
        false,
        rx,
    );

    let events = fx.store.fetch_open_events().await.unwrap();
    let report = reconciler.reconcile(events).await.unwrap();

    // No group was decided; the event and canonical state are untouched.
    assert!(report.product_plans.is_empty());
    assert_eq!(report.sales, 0);
    assert_eq!(fx.store.event(event.id).unwrap().status, EventStatus::Pending);
    assert_eq!(
        fx.store.product(fx.product.id).unwrap().status,
        ProductStatus::Active
    );
}

#[tokio::test]
async fn partial_sale_retries_only_unsettled_legs() {
    let fx = three_platform_fixture();
    let run_id = SyncRunId::new();
    let event = insert_event(
        &fx.store,
        run_id,
        PlatformTag::Ebay,
        "A100",
        ChangeType::StatusChange,
        sold_change_data(None),
        Some(fx.product.id),
    )
    .await;

    // A previous run marked Reverb done and Shopify transient.
    let mut notes = EventNotes::default();
    notes.attempts.insert(PlatformTag::Reverb, AttemptOutcome::Ok);
    notes.attempts.insert(
        PlatformTag::Shopify,
        AttemptOutcome::Transient {
            message: "503".into(),
        },
    );
    fx.store
        .update_event_status(&EventStatusUpdate {
            event_id: event.id,
            status: EventStatus::Partial,
            notes,
            processed_at: Some(Utc::now()),
        })
        .await
        .unwrap();

    let events = fx.store.fetch_open_events().await.unwrap();
    let report = reconciler(&fx.store, PriceAuthority::Canonical)
        .reconcile(events)
        .await
        .unwrap();

    let actions: Vec<&OutboundAction> = report.product_plans[0]
        .plans
        .iter()
        .flat_map(|p| &p.actions)
        .collect();
    assert_eq!(actions.len(), 1);
    assert!(matches!(
        actions[0],
        OutboundAction::MarkSold { platform: PlatformTag::Shopify, .. }
    ));
}
