//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use backline::core::domain::{
    ChangeData, ChangeType, LinkStatus, NewSyncEvent, PlatformTag, Product, SyncEvent, SyncRunId,
    UniversalStatus,
};
use backline::core::platform::AdapterRegistry;
use backline::core::store::{MemoryStore, Store};
use backline::testkit::adapters::ScriptedAdapter;
use backline::testkit::domain;
use chrono::Utc;
use rust_decimal::Decimal;

/// The S1 catalog: one non-stocked Strat listed on eBay (A100), Reverb
/// (B200) and Shopify (C300), all active.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub product: Product,
}

pub fn three_platform_fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let product = domain::product("REV-1001").id(1).build();
    store.insert_product(product.clone());
    store.insert_link(
        product.id,
        PlatformTag::Ebay,
        Some("A100".into()),
        LinkStatus::Active,
    );
    store.insert_link(
        product.id,
        PlatformTag::Reverb,
        Some("B200".into()),
        LinkStatus::Active,
    );
    store.insert_link(
        product.id,
        PlatformTag::Shopify,
        Some("C300".into()),
        LinkStatus::Active,
    );
    Fixture { store, product }
}

/// Registry of scripted adapters, with handles kept for assertions.
pub fn scripted_registry(
    platforms: &[PlatformTag],
) -> (AdapterRegistry, HashMap<PlatformTag, Arc<ScriptedAdapter>>) {
    let mut registry = AdapterRegistry::new();
    let mut handles = HashMap::new();
    for &platform in platforms {
        let adapter = Arc::new(ScriptedAdapter::new(platform));
        registry.register(Arc::clone(&adapter) as Arc<dyn backline::core::platform::MarketplaceAdapter>);
        handles.insert(platform, adapter);
    }
    (registry, handles)
}

/// Persist one event and return it with its assigned id.
pub async fn insert_event(
    store: &Arc<MemoryStore>,
    run_id: SyncRunId,
    platform: PlatformTag,
    external_id: &str,
    change_type: ChangeType,
    change_data: ChangeData,
    product_id: Option<backline::core::domain::ProductId>,
) -> SyncEvent {
    let event = NewSyncEvent {
        sync_run_id: run_id,
        platform,
        product_id,
        link_id: None,
        external_id: external_id.into(),
        change_type,
        change_data,
        detected_at: Utc::now(),
    };
    let inserted = store.insert_sync_events(&[event]).await.unwrap();
    assert_eq!(inserted, 1, "event was deduplicated unexpectedly");
    store
        .events()
        .into_iter()
        .last()
        .expect("event just inserted")
}

/// Change data for a sale observed on the remote.
pub fn sold_change_data(quantity_sold: Option<i32>) -> ChangeData {
    ChangeData {
        old_status: Some(UniversalStatus::Active),
        new_status: Some(UniversalStatus::Sold),
        quantity_sold,
        ..ChangeData::default()
    }
}

/// Change data for remote price drift.
pub fn price_change_data(old: Decimal, new: Decimal) -> ChangeData {
    ChangeData {
        old_price: Some(old),
        new_price: Some(new),
        ..ChangeData::default()
    }
}

/// Change data for a stocked-item quantity change.
pub fn quantity_change_data(old: i32, new: i32) -> ChangeData {
    ChangeData {
        old_quantity: Some(old),
        new_quantity: Some(new),
        ..ChangeData::default()
    }
}
