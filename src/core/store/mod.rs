//! Transactional persistence boundary.
//!
//! The store exposes primitives only; no business rules live here. Every
//! operation runs in its own transaction, and the only error kinds that
//! cross this boundary are `Transient` (retryable) and `Fatal` (not).

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::core::domain::{
    ChangeType, EventId, EventNotes, EventStatus, ExternalId, LinkId, LinkStatus, NewPlatformLink,
    NewSyncEvent, PlatformLink, PlatformListing, PlatformTag, Product, ProductId, RunState,
    RunSummary, SyncEvent, SyncRun, SyncRunId, SyncStatus,
};
use crate::error::Result;

/// One row of the local snapshot: Product × PlatformLink × listing detail
/// for a single platform, keyed by external id. Rows whose `external_id` is
/// `None` describe listings still in flight on that marketplace.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalListingRow {
    pub product_id: ProductId,
    pub link_id: LinkId,
    pub sku: String,
    pub title: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub external_id: Option<ExternalId>,
    pub link_status: LinkStatus,
    pub sync_status: SyncStatus,
    pub listing_url: Option<String>,
    /// `specialist_price ?? base_price` at snapshot time.
    pub canonical_price: Decimal,
    pub quantity: i32,
    pub is_stocked_item: bool,
    pub product_status: crate::core::domain::ProductStatus,
}

/// Dedup key set for the event writer.
pub type PendingKeys = HashSet<(ExternalId, ChangeType)>;

/// Local mutations the reconciler commits atomically for one event group.
#[derive(Debug, Clone, Default)]
pub struct ReconcileCommit {
    pub product: Option<Product>,
    pub link_updates: Vec<PlatformLink>,
    pub link_upserts: Vec<NewPlatformLink>,
    pub event_updates: Vec<EventStatusUpdate>,
}

impl ReconcileCommit {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.product.is_none()
            && self.link_updates.is_empty()
            && self.link_upserts.is_empty()
            && self.event_updates.is_empty()
    }
}

/// A pending event-status transition.
#[derive(Debug, Clone)]
pub struct EventStatusUpdate {
    pub event_id: EventId,
    pub status: EventStatus,
    pub notes: EventNotes,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Transactional interface over the canonical tables.
#[async_trait]
pub trait Store: Send + Sync {
    // --- sync runs ---

    async fn create_sync_run(&self, run: &SyncRun) -> Result<()>;

    async fn finish_sync_run(
        &self,
        run_id: SyncRunId,
        state: RunState,
        summary: &RunSummary,
        finished_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn fetch_sync_run(&self, run_id: SyncRunId) -> Result<Option<SyncRun>>;

    // --- detection ---

    /// Joined snapshot for one platform, including in-flight rows whose
    /// external id is not assigned yet.
    async fn fetch_local_snapshot(&self, platform: PlatformTag) -> Result<Vec<LocalListingRow>>;

    /// Currently-pending `(external_id, change_type)` pairs for one
    /// platform, loaded once per detection task for deduplication.
    async fn fetch_pending_event_keys(&self, platform: PlatformTag) -> Result<PendingKeys>;

    /// Bulk insert with conflict-ignore semantics over the pending unique
    /// index. Returns the number of rows actually inserted.
    async fn insert_sync_events(&self, events: &[NewSyncEvent]) -> Result<usize>;

    // --- reconciliation ---

    /// All open (pending or partial) events ordered by detection time, so
    /// carried-over work from earlier runs is reconciled first.
    async fn fetch_open_events(&self) -> Result<Vec<SyncEvent>>;

    /// Open events belonging to a single run, for `sync reconcile --run-id`.
    async fn fetch_pending_events_for_run(&self, run_id: SyncRunId) -> Result<Vec<SyncEvent>>;

    async fn update_event_status(&self, update: &EventStatusUpdate) -> Result<()>;

    /// Commit a group's local effects in one transaction.
    async fn commit_reconciliation(&self, commit: &ReconcileCommit) -> Result<()>;

    // --- catalog ---

    async fn fetch_product(&self, id: ProductId) -> Result<Option<Product>>;

    async fn update_product(&self, product: &Product) -> Result<()>;

    async fn fetch_links_for_product(&self, product_id: ProductId) -> Result<Vec<PlatformLink>>;

    async fn find_link(
        &self,
        platform: PlatformTag,
        external_id: &ExternalId,
    ) -> Result<Option<PlatformLink>>;

    async fn update_platform_link(&self, link: &PlatformLink) -> Result<()>;

    async fn upsert_platform_listing(&self, listing: &PlatformListing) -> Result<()>;

    /// Candidate pool for the match suggester: products without a link on
    /// the given platform.
    async fn fetch_match_pool(&self, platform: PlatformTag) -> Result<Vec<Product>>;

    /// Platforms a product already has a link on, for candidate payloads.
    async fn fetch_linked_platforms(&self, product_id: ProductId) -> Result<Vec<PlatformTag>>;

    // --- operator surface ---

    async fn list_events_by_status(&self, statuses: &[EventStatus]) -> Result<Vec<SyncEvent>>;
}
