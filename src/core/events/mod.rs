//! Durable event writer.
//!
//! Persists diff output as pending sync events, deduplicating against the
//! pending set loaded once per detection task. The partial unique index on
//! the table absorbs any race two concurrent runs might still hit.

mod matcher;

pub use matcher::MatchSuggester;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::core::diff::{DiffOutcome, ListingChange, ListingDelta};
use crate::core::domain::{
    ChangeData, ChangeType, NewSyncEvent, PlatformTag, RemoteListing, SyncRunId,
};
use crate::core::store::{LocalListingRow, Store};
use crate::error::Result;

/// Counters for one write pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub candidates: usize,
    pub written: usize,
    pub deduplicated: usize,
}

pub struct EventWriter {
    store: Arc<dyn Store>,
    suggester: MatchSuggester,
}

impl EventWriter {
    pub fn new(store: Arc<dyn Store>, suggester: MatchSuggester) -> Self {
        Self { store, suggester }
    }

    /// Persist one platform's diff outcome. Loads the pending key set once,
    /// skips candidates already pending, and bulk-inserts the rest with
    /// conflict-ignore semantics.
    pub async fn write(
        &self,
        run_id: SyncRunId,
        platform: PlatformTag,
        outcome: &DiffOutcome,
    ) -> Result<WriteReport> {
        let pending = self.store.fetch_pending_event_keys(platform).await?;
        let mut events = Vec::new();
        let mut report = WriteReport::default();

        for listing in &outcome.creates {
            report.candidates += 1;
            if pending.contains(&(listing.external_id.clone(), ChangeType::NewListing)) {
                debug!(platform = %platform, external_id = %listing.external_id,
                    "Skipping duplicate pending new_listing event");
                report.deduplicated += 1;
                continue;
            }
            events.push(self.new_listing_event(run_id, platform, listing).await?);
        }

        for delta in &outcome.updates {
            for change in &delta.changes {
                report.candidates += 1;
                let change_type = change_type_of(change);
                if pending.contains(&(delta.remote.external_id.clone(), change_type)) {
                    debug!(platform = %platform, external_id = %delta.remote.external_id,
                        change_type = %change_type, "Skipping duplicate pending event");
                    report.deduplicated += 1;
                    continue;
                }
                events.push(update_event(run_id, platform, delta, change));
            }
        }

        for row in &outcome.removes {
            report.candidates += 1;
            let Some(external_id) = row.external_id.clone() else {
                continue;
            };
            if pending.contains(&(external_id.clone(), ChangeType::RemovedListing)) {
                report.deduplicated += 1;
                continue;
            }
            events.push(removed_event(run_id, platform, row, external_id));
        }

        report.written = self.store.insert_sync_events(&events).await?;
        if report.written < events.len() {
            // The insert-time conflict handler absorbed a race with a
            // concurrent run.
            report.deduplicated += events.len() - report.written;
        }
        Ok(report)
    }

    async fn new_listing_event(
        &self,
        run_id: SyncRunId,
        platform: PlatformTag,
        listing: &RemoteListing,
    ) -> Result<NewSyncEvent> {
        warn!(platform = %platform, external_id = %listing.external_id,
            title = %listing.title, "Rogue listing detected, logging for review");

        let mut change_data = ChangeData {
            title: Some(listing.title.clone()),
            new_status: Some(listing.status),
            new_price: Some(listing.price),
            listing_url: listing.listing_url.clone(),
            raw_data: listing.raw.clone(),
            ..ChangeData::default()
        };

        let pool = self.store.fetch_match_pool(platform).await?;
        if let Some((candidate, product)) = self.suggester.suggest(listing, &pool) {
            let platforms = self.store.fetch_linked_platforms(product.id).await?;
            change_data.match_candidate =
                Some(MatchSuggester::with_existing_platforms(candidate, platforms));
            change_data.suggested_action = Some("match".into());
        }

        Ok(NewSyncEvent {
            sync_run_id: run_id,
            platform,
            product_id: None,
            link_id: None,
            external_id: listing.external_id.clone(),
            change_type: ChangeType::NewListing,
            change_data,
            detected_at: Utc::now(),
        })
    }
}

const fn change_type_of(change: &ListingChange) -> ChangeType {
    match change {
        ListingChange::Status { .. } => ChangeType::StatusChange,
        ListingChange::Quantity { .. } => ChangeType::QuantityChange,
        ListingChange::Price { .. } => ChangeType::Price,
    }
}

fn update_event(
    run_id: SyncRunId,
    platform: PlatformTag,
    delta: &ListingDelta,
    change: &ListingChange,
) -> NewSyncEvent {
    let mut change_data = ChangeData {
        title: Some(delta.remote.title.clone()),
        listing_url: delta.url_change.clone(),
        raw_data: delta.remote.raw.clone(),
        ..ChangeData::default()
    };

    match change {
        ListingChange::Status { old, new } => {
            change_data.old_status = Some(*old);
            change_data.new_status = Some(*new);
            change_data.quantity_sold = delta.remote.quantity_sold;
        }
        ListingChange::Quantity { old, new, sold } => {
            change_data.old_quantity = Some(*old);
            change_data.new_quantity = Some(*new);
            change_data.quantity_sold = *sold;
        }
        ListingChange::Price { old, new } => {
            change_data.old_price = Some(*old);
            change_data.new_price = Some(*new);
        }
    }

    NewSyncEvent {
        sync_run_id: run_id,
        platform,
        product_id: Some(delta.local.product_id),
        link_id: Some(delta.local.link_id),
        external_id: delta.remote.external_id.clone(),
        change_type: change_type_of(change),
        change_data,
        detected_at: Utc::now(),
    }
}

fn removed_event(
    run_id: SyncRunId,
    platform: PlatformTag,
    row: &LocalListingRow,
    external_id: crate::core::domain::ExternalId,
) -> NewSyncEvent {
    NewSyncEvent {
        sync_run_id: run_id,
        platform,
        product_id: Some(row.product_id),
        link_id: Some(row.link_id),
        external_id,
        change_type: ChangeType::RemovedListing,
        change_data: ChangeData {
            title: Some(row.title.clone()),
            old_status: Some(row.link_status.as_universal()),
            ..ChangeData::default()
        },
        detected_at: Utc::now(),
    }
}
