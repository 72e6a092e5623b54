//! In-memory store implementation for testing.
//!
//! Mirrors the SQLite store's observable behavior, including the
//! pending-unique-index conflict semantics on event insertion.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{EventStatusUpdate, LocalListingRow, PendingKeys, ReconcileCommit, Store};
use crate::core::domain::{
    EventId, EventStatus, ExternalId, LinkId, NewSyncEvent, PlatformLink, PlatformListing,
    PlatformTag, Product, ProductId, ProductStatus, RunState, RunSummary, SyncEvent, SyncRun,
    SyncRunId,
};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Tables {
    products: BTreeMap<ProductId, Product>,
    links: BTreeMap<LinkId, PlatformLink>,
    listings: BTreeMap<LinkId, PlatformListing>,
    events: BTreeMap<EventId, SyncEvent>,
    runs: BTreeMap<String, SyncRun>,
    next_link_id: i32,
    next_event_id: i32,
}

/// In-memory store for testing purposes.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a product, returning its id.
    pub fn insert_product(&self, product: Product) -> ProductId {
        let id = product.id;
        self.tables.write().products.insert(id, product);
        id
    }

    /// Seed a platform link, assigning the next link id.
    pub fn insert_link(
        &self,
        product_id: ProductId,
        platform: PlatformTag,
        external_id: Option<ExternalId>,
        status: crate::core::domain::LinkStatus,
    ) -> LinkId {
        let mut tables = self.tables.write();
        tables.next_link_id += 1;
        let id = LinkId::new(tables.next_link_id);
        tables.links.insert(
            id,
            PlatformLink {
                id,
                product_id,
                platform,
                external_id,
                status,
                listing_url: None,
                last_sync: None,
                sync_status: crate::core::domain::SyncStatus::Synced,
                platform_specific_data: serde_json::Value::Null,
            },
        );
        id
    }

    /// Direct read of one event, for assertions.
    pub fn event(&self, id: EventId) -> Option<SyncEvent> {
        self.tables.read().events.get(&id).cloned()
    }

    /// All events in insertion order, for assertions.
    pub fn events(&self) -> Vec<SyncEvent> {
        self.tables.read().events.values().cloned().collect()
    }

    /// Direct read of one link, for assertions.
    pub fn link(&self, id: LinkId) -> Option<PlatformLink> {
        self.tables.read().links.get(&id).cloned()
    }

    /// Direct read of one listing detail record, for assertions.
    pub fn listing(&self, link_id: LinkId) -> Option<PlatformListing> {
        self.tables.read().listings.get(&link_id).cloned()
    }

    /// Direct read of one product, for assertions.
    pub fn product(&self, id: ProductId) -> Option<Product> {
        self.tables.read().products.get(&id).cloned()
    }

    /// Stored run row, for assertions.
    pub fn run(&self, id: SyncRunId) -> Option<SyncRun> {
        self.tables.read().runs.get(&id.to_string()).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_sync_run(&self, run: &SyncRun) -> Result<()> {
        self.tables
            .write()
            .runs
            .insert(run.id.to_string(), run.clone());
        Ok(())
    }

    async fn finish_sync_run(
        &self,
        run_id: SyncRunId,
        state: RunState,
        summary: &RunSummary,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = self.tables.write();
        let run = tables
            .runs
            .get_mut(&run_id.to_string())
            .ok_or_else(|| Error::Fatal(format!("unknown sync run {run_id}")))?;
        run.state = state;
        run.summary = summary.clone();
        run.finished_at = Some(finished_at);
        Ok(())
    }

    async fn fetch_sync_run(&self, run_id: SyncRunId) -> Result<Option<SyncRun>> {
        Ok(self.tables.read().runs.get(&run_id.to_string()).cloned())
    }

    async fn fetch_local_snapshot(&self, platform: PlatformTag) -> Result<Vec<LocalListingRow>> {
        let tables = self.tables.read();
        let mut rows = Vec::new();
        for link in tables.links.values().filter(|l| l.platform == platform) {
            let product = tables
                .products
                .get(&link.product_id)
                .ok_or_else(|| Error::Fatal(format!("dangling link {}", link.id)))?;
            rows.push(LocalListingRow {
                product_id: product.id,
                link_id: link.id,
                sku: product.sku.clone(),
                title: product.title.clone(),
                brand: product.brand.clone(),
                model: product.model.clone(),
                year: product.year,
                external_id: link.external_id.clone(),
                link_status: link.status,
                sync_status: link.sync_status,
                listing_url: link.listing_url.clone(),
                canonical_price: product.canonical_price(),
                quantity: product.quantity,
                is_stocked_item: product.is_stocked_item,
                product_status: product.status,
            });
        }
        Ok(rows)
    }

    async fn fetch_pending_event_keys(&self, platform: PlatformTag) -> Result<PendingKeys> {
        let tables = self.tables.read();
        Ok(tables
            .events
            .values()
            .filter(|e| e.platform == platform && e.status == EventStatus::Pending)
            .map(|e| (e.external_id.clone(), e.change_type))
            .collect())
    }

    async fn insert_sync_events(&self, events: &[NewSyncEvent]) -> Result<usize> {
        let mut tables = self.tables.write();
        let mut pending: HashSet<(PlatformTag, ExternalId, crate::core::domain::ChangeType)> =
            tables
                .events
                .values()
                .filter(|e| e.status == EventStatus::Pending)
                .map(SyncEvent::dedup_key)
                .collect();

        let mut inserted = 0;
        for event in events {
            let key = (
                event.platform,
                event.external_id.clone(),
                event.change_type,
            );
            if pending.contains(&key) {
                continue;
            }
            pending.insert(key);
            tables.next_event_id += 1;
            let id = EventId::new(tables.next_event_id);
            tables.events.insert(
                id,
                SyncEvent {
                    id,
                    sync_run_id: event.sync_run_id,
                    platform: event.platform,
                    product_id: event.product_id,
                    link_id: event.link_id,
                    external_id: event.external_id.clone(),
                    change_type: event.change_type,
                    change_data: event.change_data.clone(),
                    status: EventStatus::Pending,
                    notes: crate::core::domain::EventNotes::default(),
                    detected_at: event.detected_at,
                    processed_at: None,
                },
            );
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn fetch_open_events(&self) -> Result<Vec<SyncEvent>> {
        let tables = self.tables.read();
        let mut events: Vec<SyncEvent> = tables
            .events
            .values()
            .filter(|e| e.status.is_open())
            .cloned()
            .collect();
        events.sort_by_key(|e| e.detected_at);
        Ok(events)
    }

    async fn fetch_pending_events_for_run(&self, run_id: SyncRunId) -> Result<Vec<SyncEvent>> {
        let tables = self.tables.read();
        let mut events: Vec<SyncEvent> = tables
            .events
            .values()
            .filter(|e| e.sync_run_id == run_id && e.status.is_open())
            .cloned()
            .collect();
        events.sort_by_key(|e| e.detected_at);
        Ok(events)
    }

    async fn update_event_status(&self, update: &EventStatusUpdate) -> Result<()> {
        let mut tables = self.tables.write();
        let event = tables
            .events
            .get_mut(&update.event_id)
            .ok_or_else(|| Error::Fatal(format!("unknown event {}", update.event_id)))?;
        event.status = update.status;
        event.notes = update.notes.clone();
        event.processed_at = update.processed_at;
        Ok(())
    }

    async fn commit_reconciliation(&self, commit: &ReconcileCommit) -> Result<()> {
        let mut tables = self.tables.write();
        if let Some(product) = &commit.product {
            tables.products.insert(product.id, product.clone());
        }
        for link in &commit.link_updates {
            tables.links.insert(link.id, link.clone());
        }
        for upsert in &commit.link_upserts {
            let existing = tables
                .links
                .values()
                .find(|l| l.product_id == upsert.product_id && l.platform == upsert.platform)
                .map(|l| l.id);
            match existing {
                Some(id) => {
                    if let Some(link) = tables.links.get_mut(&id) {
                        link.external_id = upsert.external_id.clone();
                        link.status = upsert.status;
                        link.listing_url = upsert.listing_url.clone();
                        link.sync_status = upsert.sync_status;
                        link.platform_specific_data = upsert.platform_specific_data.clone();
                    }
                }
                None => {
                    tables.next_link_id += 1;
                    let id = LinkId::new(tables.next_link_id);
                    tables.links.insert(
                        id,
                        PlatformLink {
                            id,
                            product_id: upsert.product_id,
                            platform: upsert.platform,
                            external_id: upsert.external_id.clone(),
                            status: upsert.status,
                            listing_url: upsert.listing_url.clone(),
                            last_sync: None,
                            sync_status: upsert.sync_status,
                            platform_specific_data: upsert.platform_specific_data.clone(),
                        },
                    );
                }
            }
        }
        for update in &commit.event_updates {
            let event = tables
                .events
                .get_mut(&update.event_id)
                .ok_or_else(|| Error::Fatal(format!("unknown event {}", update.event_id)))?;
            event.status = update.status;
            event.notes = update.notes.clone();
            event.processed_at = update.processed_at;
        }
        Ok(())
    }

    async fn fetch_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.tables.read().products.get(&id).cloned())
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        self.tables
            .write()
            .products
            .insert(product.id, product.clone());
        Ok(())
    }

    async fn fetch_links_for_product(&self, product_id: ProductId) -> Result<Vec<PlatformLink>> {
        Ok(self
            .tables
            .read()
            .links
            .values()
            .filter(|l| l.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn find_link(
        &self,
        platform: PlatformTag,
        external_id: &ExternalId,
    ) -> Result<Option<PlatformLink>> {
        Ok(self
            .tables
            .read()
            .links
            .values()
            .find(|l| l.platform == platform && l.external_id.as_ref() == Some(external_id))
            .cloned())
    }

    async fn update_platform_link(&self, link: &PlatformLink) -> Result<()> {
        self.tables.write().links.insert(link.id, link.clone());
        Ok(())
    }

    async fn upsert_platform_listing(&self, listing: &PlatformListing) -> Result<()> {
        self.tables
            .write()
            .listings
            .insert(listing.link_id, listing.clone());
        Ok(())
    }

    async fn fetch_match_pool(&self, platform: PlatformTag) -> Result<Vec<Product>> {
        let tables = self.tables.read();
        let linked: HashSet<ProductId> = tables
            .links
            .values()
            .filter(|l| l.platform == platform)
            .map(|l| l.product_id)
            .collect();
        Ok(tables
            .products
            .values()
            .filter(|p| !linked.contains(&p.id) && p.status != ProductStatus::Sold)
            .cloned()
            .collect())
    }

    async fn fetch_linked_platforms(&self, product_id: ProductId) -> Result<Vec<PlatformTag>> {
        use crate::core::domain::LinkStatus;
        Ok(self
            .tables
            .read()
            .links
            .values()
            .filter(|l| {
                l.product_id == product_id
                    && matches!(l.status, LinkStatus::Active | LinkStatus::Draft)
            })
            .map(|l| l.platform)
            .collect())
    }

    async fn list_events_by_status(&self, statuses: &[EventStatus]) -> Result<Vec<SyncEvent>> {
        let tables = self.tables.read();
        let mut events: Vec<SyncEvent> = tables
            .events
            .values()
            .filter(|e| statuses.contains(&e.status))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        Ok(events)
    }
}
