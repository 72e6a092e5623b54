//! End-to-end sync runs over scripted marketplaces.

mod support;

use std::sync::Arc;

use backline::app::SyncCoordinator;
use backline::core::domain::{
    EventStatus, LinkStatus, PlatformTag, ProductStatus, UniversalStatus,
};
use backline::core::platform::AdapterRegistry;
use backline::core::store::{MemoryStore, Store};
use backline::error::Error;
use backline::testkit::adapters::RecordedCall;
use backline::testkit::domain::{product, remote_listing};
use rust_decimal_macros::dec;
use support::{scripted_registry, three_platform_fixture};
use tokio::sync::watch;

fn coordinator(store: &Arc<MemoryStore>, registry: AdapterRegistry) -> SyncCoordinator {
    let (_tx, rx) = watch::channel(false);
    SyncCoordinator::new(
        Arc::clone(store) as Arc<dyn Store>,
        registry,
        backline::app::SyncConfig::default(),
        false,
        rx,
    )
}

/// Snapshot where every marketplace agrees with the local catalog.
fn consistent_world(
    handles: &std::collections::HashMap<
        PlatformTag,
        Arc<backline::testkit::adapters::ScriptedAdapter>,
    >,
) {
    handles[&PlatformTag::Ebay].set_listings(vec![remote_listing("A100").build()]);
    handles[&PlatformTag::Reverb].set_listings(vec![remote_listing("B200").build()]);
    handles[&PlatformTag::Shopify].set_listings(vec![remote_listing("C300").build()]);
}

#[tokio::test]
async fn sale_propagates_to_other_marketplaces() {
    // S1 end to end.
    let fx = three_platform_fixture();
    let (registry, handles) = scripted_registry(&[
        PlatformTag::Ebay,
        PlatformTag::Reverb,
        PlatformTag::Shopify,
    ]);
    consistent_world(&handles);
    handles[&PlatformTag::Ebay].set_listings(vec![remote_listing("A100")
        .status(UniversalStatus::Sold)
        .build()]);

    let outcome = coordinator(&fx.store, registry).run().await;
    assert_eq!(outcome.exit_code(), 0);

    // One status_change event, processed.
    let events = fx.store.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, EventStatus::Processed);

    // The other marketplaces heard about the sale.
    assert!(handles[&PlatformTag::Reverb]
        .calls()
        .iter()
        .any(|c| matches!(c, RecordedCall::MarkSold { external_id } if external_id.as_str() == "B200")));
    assert!(handles[&PlatformTag::Shopify]
        .calls()
        .iter()
        .any(|c| matches!(c, RecordedCall::MarkSold { external_id } if external_id.as_str() == "C300")));

    // Canonical state reflects the sale everywhere.
    let product = fx.store.product(fx.product.id).unwrap();
    assert_eq!(product.status, ProductStatus::Sold);
    let links = fx.store.fetch_links_for_product(fx.product.id).await.unwrap();
    assert!(links.iter().all(|l| l.status == LinkStatus::Sold));
}

#[tokio::test]
async fn price_drift_is_restored_and_not_reemitted() {
    // S2 end to end, two runs.
    let fx = three_platform_fixture();
    let (registry, handles) = scripted_registry(&[
        PlatformTag::Ebay,
        PlatformTag::Reverb,
        PlatformTag::Shopify,
    ]);
    consistent_world(&handles);
    handles[&PlatformTag::Reverb]
        .set_listings(vec![remote_listing("B200").price(dec!(4450.00)).build()]);

    let outcome = coordinator(&fx.store, registry.clone()).run().await;
    assert_eq!(outcome.exit_code(), 0);

    let events = fx.store.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, EventStatus::Processed);
    assert!(handles[&PlatformTag::Reverb].calls().iter().any(|c| matches!(
        c,
        RecordedCall::UpdatePrice { external_id, price }
            if external_id.as_str() == "B200" && *price == dec!(4999.00)
    )));

    // The restore landed: the next run sees the canonical price and stays
    // quiet.
    handles[&PlatformTag::Reverb]
        .set_listings(vec![remote_listing("B200").price(dec!(4999.00)).build()]);
    coordinator(&fx.store, registry).run().await;
    assert_eq!(fx.store.events().len(), 1, "no new events on second run");
}

#[tokio::test]
async fn stocked_quantity_syncs_across_marketplaces() {
    // S6 end to end.
    let store = Arc::new(MemoryStore::new());
    let bag = product("BAG-1").id(9).stocked(5).price(dec!(49.99)).build();
    store.insert_product(bag.clone());
    store.insert_link(bag.id, PlatformTag::Ebay, Some("Q1".into()), LinkStatus::Active);
    store.insert_link(bag.id, PlatformTag::Reverb, Some("Q2".into()), LinkStatus::Active);

    let (registry, handles) = scripted_registry(&[PlatformTag::Ebay, PlatformTag::Reverb]);
    handles[&PlatformTag::Ebay].set_listings(vec![remote_listing("Q1")
        .price(dec!(49.99))
        .quantity(3)
        .quantity_sold(2)
        .build()]);
    handles[&PlatformTag::Reverb].set_listings(vec![remote_listing("Q2")
        .price(dec!(49.99))
        .quantity(5)
        .build()]);

    let outcome = coordinator(&store, registry).run().await;
    assert_eq!(outcome.exit_code(), 0);

    let product = store.product(bag.id).unwrap();
    assert_eq!(product.quantity, 3);
    assert_eq!(product.status, ProductStatus::Active);
    assert!(handles[&PlatformTag::Reverb].calls().iter().any(|c| matches!(
        c,
        RecordedCall::UpdateQuantity { external_id, quantity: 3 } if external_id.as_str() == "Q2"
    )));
}

#[tokio::test]
async fn rerun_with_no_changes_writes_no_events() {
    // Idempotent reruns: a converged world yields an empty second run.
    let fx = three_platform_fixture();
    let (registry, handles) = scripted_registry(&[
        PlatformTag::Ebay,
        PlatformTag::Reverb,
        PlatformTag::Shopify,
    ]);
    consistent_world(&handles);

    coordinator(&fx.store, registry.clone()).run().await;
    assert_eq!(fx.store.events().len(), 0);

    let outcome = coordinator(&fx.store, registry).run().await;
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(fx.store.events().len(), 0);
}

#[tokio::test]
async fn partial_event_converges_on_next_run() {
    // S5 + partial retry convergence across two runs.
    let fx = three_platform_fixture();
    let (registry, handles) = scripted_registry(&[
        PlatformTag::Ebay,
        PlatformTag::Reverb,
        PlatformTag::Shopify,
    ]);
    consistent_world(&handles);
    handles[&PlatformTag::Ebay].set_listings(vec![remote_listing("A100")
        .status(UniversalStatus::Sold)
        .build()]);
    handles[&PlatformTag::Shopify].fail_next("mark_sold", Error::Transient("503".into()));

    coordinator(&fx.store, registry.clone()).run().await;

    let events = fx.store.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, EventStatus::Partial);
    // Canonical decision already committed despite the failed leg.
    assert_eq!(
        fx.store.product(fx.product.id).unwrap().status,
        ProductStatus::Sold
    );

    // Before run 2 the marketplace recovered; the retry hits only Shopify
    // and the remote reports the listing already closed.
    let shopify_calls_before = handles[&PlatformTag::Shopify].call_count();
    let reverb_calls_before = handles[&PlatformTag::Reverb].call_count();
    handles[&PlatformTag::Shopify].set_already_closed("C300");
    handles[&PlatformTag::Shopify].set_listings(vec![remote_listing("C300")
        .status(UniversalStatus::Sold)
        .build()]);

    coordinator(&fx.store, registry).run().await;

    let events = fx.store.events();
    let carried = &events[0];
    assert!(matches!(
        carried.status,
        EventStatus::Processed | EventStatus::Skipped
    ));
    // Reverb's settled leg was not redone (only its fetch_all ran).
    assert_eq!(
        handles[&PlatformTag::Reverb].call_count(),
        reverb_calls_before + 1
    );
    assert!(handles[&PlatformTag::Shopify].call_count() > shopify_calls_before);

    let links = fx.store.fetch_links_for_product(fx.product.id).await.unwrap();
    let shopify = links
        .iter()
        .find(|l| l.platform == PlatformTag::Shopify)
        .unwrap();
    assert_eq!(shopify.status, LinkStatus::Sold);
}

#[tokio::test]
async fn one_failing_marketplace_does_not_block_the_rest() {
    let fx = three_platform_fixture();
    let (registry, handles) = scripted_registry(&[
        PlatformTag::Ebay,
        PlatformTag::Reverb,
        PlatformTag::Shopify,
    ]);
    consistent_world(&handles);
    handles[&PlatformTag::Ebay].fail_next("fetch_all", Error::Transient("gateway timeout".into()));
    handles[&PlatformTag::Reverb]
        .set_listings(vec![remote_listing("B200").price(dec!(4000.00)).build()]);

    let outcome = coordinator(&fx.store, registry).run().await;
    assert_eq!(outcome.exit_code(), 0, "run still finalizes");

    // Reverb's drift was detected and handled despite the eBay failure.
    assert_eq!(fx.store.events().len(), 1);
    match outcome {
        backline::app::RunOutcome::Finalized { summary, .. } => {
            assert!(matches!(
                summary.detection[&PlatformTag::Ebay].outcome,
                backline::core::domain::DetectionOutcome::Failed { .. }
            ));
            assert!(matches!(
                summary.detection[&PlatformTag::Reverb].outcome,
                backline::core::domain::DetectionOutcome::Completed
            ));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn fatal_store_error_aborts_the_run() {
    let fx = three_platform_fixture();
    let (registry, handles) = scripted_registry(&[PlatformTag::Ebay]);
    handles[&PlatformTag::Ebay].fail_next("fetch_all", Error::Fatal("database unreachable".into()));

    let outcome = coordinator(&fx.store, registry).run().await;
    assert_eq!(outcome.exit_code(), 1);
}

#[tokio::test]
async fn reconcile_existing_run_retries_without_redetecting() {
    let fx = three_platform_fixture();
    let (registry, handles) = scripted_registry(&[
        PlatformTag::Ebay,
        PlatformTag::Reverb,
        PlatformTag::Shopify,
    ]);
    consistent_world(&handles);
    handles[&PlatformTag::Ebay].set_listings(vec![remote_listing("A100")
        .status(UniversalStatus::Sold)
        .build()]);
    handles[&PlatformTag::Shopify].fail_next("mark_sold", Error::Transient("503".into()));

    let outcome = coordinator(&fx.store, registry.clone()).run().await;
    assert_eq!(fx.store.events()[0].status, EventStatus::Partial);

    let fetches_before = handles[&PlatformTag::Ebay].call_count();
    let reconcile_outcome = coordinator(&fx.store, registry)
        .reconcile_existing(outcome.run_id())
        .await;
    assert_eq!(reconcile_outcome.exit_code(), 0);

    // No new detection happened; only the failed Shopify leg was retried.
    assert_eq!(handles[&PlatformTag::Ebay].call_count(), fetches_before);
    assert_eq!(fx.store.events()[0].status, EventStatus::Processed);
    let links = fx.store.fetch_links_for_product(fx.product.id).await.unwrap();
    let shopify = links
        .iter()
        .find(|l| l.platform == PlatformTag::Shopify)
        .unwrap();
    assert_eq!(shopify.status, LinkStatus::Sold);
}

#[tokio::test]
async fn run_summary_is_persisted_on_the_run_row() {
    let fx = three_platform_fixture();
    let (registry, handles) = scripted_registry(&[
        PlatformTag::Ebay,
        PlatformTag::Reverb,
        PlatformTag::Shopify,
    ]);
    consistent_world(&handles);
    handles[&PlatformTag::Ebay].set_listings(vec![remote_listing("A100")
        .status(UniversalStatus::Sold)
        .build()]);

    let outcome = coordinator(&fx.store, registry).run().await;
    let run = fx.store.run(outcome.run_id()).unwrap();
    assert_eq!(run.state, backline::core::domain::RunState::Finalized);
    assert!(run.finished_at.is_some());
    assert_eq!(run.summary.events_detected, 1);
    assert_eq!(run.summary.sales, 1);
}
