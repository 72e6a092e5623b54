//! Cross-marketplace reconciler.
//!
//! Runs single-threaded: events are grouped by the canonical product they
//! refer to and decided in a deterministic order, so the dispatcher can run
//! products in parallel without reordering any product's actions.
//!
//! Decision priority within a group: a sale supersedes everything else,
//! quantity is applied before price, and price events are dropped entirely
//! when the same product also sold. Events that need no outbound call are
//! settled here; everything else becomes an [`EventPlan`] for the
//! dispatcher.

mod decision;

pub use decision::{
    EventPlan, OutboundAction, PriceAuthority, ProductPlan, ReconcileReport,
};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::core::domain::{
    AttemptOutcome, ChangeType, EventNotes, EventStatus, ExternalId, LinkStatus, NewPlatformLink,
    PlatformLink, PlatformListing, PlatformTag, Product, ProductId, ProductStatus, SyncEvent,
    SyncStatus, UniversalStatus,
};
use crate::core::platform::QuantityHints;
use crate::core::store::{EventStatusUpdate, ReconcileCommit, Store};
use crate::error::Result;

pub struct Reconciler {
    store: Arc<dyn Store>,
    authority: PriceAuthority,
    price_epsilon: Decimal,
    dry_run: bool,
    cancel: watch::Receiver<bool>,
}

/// Working state for one product group.
struct GroupState {
    product: Product,
    links: BTreeMap<PlatformTag, PlatformLink>,
    commit: ReconcileCommit,
    plans: Vec<EventPlan>,
    /// The group contains a sale; quantity/price events are superseded.
    has_sale: bool,
    /// Raw payloads captured for newly linked listings, persisted as the
    /// listing detail snapshot after the links exist.
    listing_snapshots: Vec<(PlatformTag, ExternalId, serde_json::Value)>,
}

impl GroupState {
    fn active_targets(&self, origin: PlatformTag) -> Vec<&PlatformLink> {
        self.links
            .values()
            .filter(|link| link.platform != origin && link.is_active())
            .collect()
    }

    fn finalize(&mut self, event: &SyncEvent, status: EventStatus, notes: EventNotes) {
        self.commit.event_updates.push(EventStatusUpdate {
            event_id: event.id,
            status,
            notes,
            processed_at: Some(Utc::now()),
        });
    }

    fn touch_link(&mut self, platform: PlatformTag, status: LinkStatus) -> bool {
        let Some(link) = self.links.get_mut(&platform) else {
            return false;
        };
        if link.status == status {
            return false;
        }
        link.status = status;
        link.sync_status = SyncStatus::Synced;
        link.last_sync = Some(Utc::now());
        let updated = link.clone();
        self.commit
            .link_updates
            .retain(|existing| existing.id != updated.id);
        self.commit.link_updates.push(updated);
        true
    }
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Store>,
        authority: PriceAuthority,
        price_epsilon: Decimal,
        dry_run: bool,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            authority,
            price_epsilon,
            dry_run,
            cancel,
        }
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Decide every open event. Local canonical effects are committed here
    /// (unless dry-run); outbound work is returned for the dispatcher.
    pub async fn reconcile(&self, events: Vec<SyncEvent>) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let mut groups: BTreeMap<ProductId, Vec<SyncEvent>> = BTreeMap::new();
        let mut rogue: Vec<SyncEvent> = Vec::new();

        for mut event in events {
            if event.product_id.is_none() {
                // A later run may find the link confirmed by an operator.
                if let Some(link) = self
                    .store
                    .find_link(event.platform, &event.external_id)
                    .await?
                {
                    event.product_id = Some(link.product_id);
                    event.link_id = Some(link.id);
                }
            }
            match event.product_id {
                Some(product_id) => groups.entry(product_id).or_default().push(event),
                None => rogue.push(event),
            }
        }

        // Cancellation takes effect between product groups; events not yet
        // decided stay open and are picked up by the next run.
        for (product_id, group) in groups {
            if self.cancelled() {
                warn!("Cancellation requested, leaving remaining groups open");
                return Ok(report);
            }
            self.reconcile_group(product_id, group, &mut report).await?;
        }

        for event in rogue {
            if self.cancelled() {
                warn!("Cancellation requested, leaving remaining rogue events open");
                return Ok(report);
            }
            self.reconcile_rogue(event, &mut report).await?;
        }

        info!(
            plans = report.product_plans.len(),
            actions = report.queued_actions(),
            processed = report.resolved_processed,
            skipped = report.resolved_skipped,
            pending = report.left_pending,
            "Reconciliation pass complete"
        );
        Ok(report)
    }

    async fn reconcile_group(
        &self,
        product_id: ProductId,
        mut events: Vec<SyncEvent>,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let Some(product) = self.store.fetch_product(product_id).await? else {
            for event in &events {
                self.settle(
                    event,
                    EventStatus::Error,
                    EventNotes::with_reason(format!("product {product_id} not found")),
                    report,
                )
                .await?;
                report.resolved_error += 1;
            }
            return Ok(());
        };

        let links = self.store.fetch_links_for_product(product_id).await?;
        let mut state = GroupState {
            product,
            links: links.into_iter().map(|l| (l.platform, l)).collect(),
            commit: ReconcileCommit::default(),
            plans: Vec::new(),
            has_sale: false,
            listing_snapshots: Vec::new(),
        };

        events.sort_by_key(|e| (priority(e), e.detected_at));
        state.has_sale = events
            .iter()
            .any(|e| sold_status_change(e) && e.status.is_open());

        let product_before = state.product.clone();
        for event in events {
            self.decide(event, &mut state, report)?;
        }
        if state.product != product_before {
            state.commit.product = Some(state.product.clone());
        }

        if self.dry_run {
            debug!(product_id = %product_id, plans = state.plans.len(),
                "Dry run: skipping local commit");
        } else {
            self.store.commit_reconciliation(&state.commit).await?;
            self.persist_listing_snapshots(&state.listing_snapshots)
                .await?;
        }

        if !state.plans.is_empty() {
            report.product_plans.push(ProductPlan {
                product_id: Some(product_id),
                plans: state.plans,
            });
        }
        Ok(())
    }

    fn decide(
        &self,
        event: SyncEvent,
        state: &mut GroupState,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        match event.change_type {
            ChangeType::StatusChange => self.decide_status_change(event, state, report),
            ChangeType::QuantityChange => self.decide_quantity(event, state, report),
            ChangeType::Price => self.decide_price(event, state, report),
            ChangeType::NewListing => self.decide_confirmed_listing(event, state, report),
            ChangeType::RemovedListing => self.decide_removed(event, state, report),
        }
    }

    fn decide_status_change(
        &self,
        event: SyncEvent,
        state: &mut GroupState,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let Some(new_status) = event.change_data.new_status else {
            report.resolved_error += 1;
            state.finalize(
                &event,
                EventStatus::Error,
                EventNotes::with_reason("status_change event carries no new status"),
            );
            return Ok(());
        };

        if new_status != UniversalStatus::Sold {
            // Ended/removed/draft/active: the marketplace is authoritative
            // for its own link; mirror it locally, no propagation.
            let changed = state.touch_link(event.platform, LinkStatus::from(new_status));
            if changed {
                report.resolved_processed += 1;
                state.finalize(&event, EventStatus::Processed, event.notes.clone());
            } else {
                report.resolved_skipped += 1;
                state.finalize(
                    &event,
                    EventStatus::Skipped,
                    EventNotes::with_reason("matched existing state"),
                );
            }
            return Ok(());
        }

        // A sale on one marketplace.
        let mut changed = state.touch_link(event.platform, LinkStatus::Sold);
        if state.product.status != ProductStatus::Sold {
            let sold = event.change_data.quantity_sold.unwrap_or(1);
            state.product.apply_sale(sold);
            state.product.updated_at = Utc::now();
            report.sales += 1;
            changed = true;
        }

        let notes = event.notes.clone();
        let actions: Vec<OutboundAction> = state
            .active_targets(event.platform)
            .into_iter()
            .filter(|link| !notes.leg_settled(link.platform))
            .filter_map(|link| {
                link.external_id.as_ref().map(|external_id| {
                    OutboundAction::MarkSold {
                        platform: link.platform,
                        external_id: external_id.clone(),
                    }
                })
            })
            .collect();

        if actions.is_empty() {
            let already_ok = notes
                .attempts
                .values()
                .any(|outcome| matches!(outcome, AttemptOutcome::Ok));
            if changed || already_ok {
                report.resolved_processed += 1;
                state.finalize(&event, EventStatus::Processed, notes);
            } else {
                report.resolved_skipped += 1;
                state.finalize(
                    &event,
                    EventStatus::Skipped,
                    EventNotes::with_reason("matched existing state"),
                );
            }
        } else {
            state.plans.push(EventPlan {
                event,
                notes,
                actions,
            });
        }
        Ok(())
    }

    fn decide_quantity(
        &self,
        event: SyncEvent,
        state: &mut GroupState,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        if state.has_sale {
            report.resolved_skipped += 1;
            state.finalize(
                &event,
                EventStatus::Skipped,
                EventNotes::with_reason("superseded by sale"),
            );
            return Ok(());
        }
        let Some(new_quantity) = event.change_data.new_quantity else {
            report.resolved_error += 1;
            state.finalize(
                &event,
                EventStatus::Error,
                EventNotes::with_reason("quantity_change event carries no new quantity"),
            );
            return Ok(());
        };

        if state.product.quantity != new_quantity {
            state.product.quantity = new_quantity.max(0);
            if state.product.quantity == 0 {
                state.product.status = ProductStatus::Sold;
            }
            state.product.updated_at = Utc::now();
            report.quantity_changes += 1;
        }

        let hints = QuantityHints {
            quantity_total: event.change_data.old_quantity,
            quantity_sold: event.change_data.quantity_sold,
        };
        let notes = event.notes.clone();
        let actions: Vec<OutboundAction> = state
            .active_targets(event.platform)
            .into_iter()
            .filter(|link| !notes.leg_settled(link.platform))
            .filter(|link| link.platform.supports_multi_quantity() || new_quantity == 0)
            .filter_map(|link| {
                link.external_id.as_ref().map(|external_id| {
                    OutboundAction::UpdateQuantity {
                        platform: link.platform,
                        external_id: external_id.clone(),
                        quantity: new_quantity,
                        hints,
                    }
                })
            })
            .collect();

        if actions.is_empty() {
            report.resolved_processed += 1;
            state.finalize(&event, EventStatus::Processed, notes);
        } else {
            state.plans.push(EventPlan {
                event,
                notes,
                actions,
            });
        }
        Ok(())
    }

    fn decide_price(
        &self,
        event: SyncEvent,
        state: &mut GroupState,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        if state.has_sale {
            report.resolved_skipped += 1;
            state.finalize(
                &event,
                EventStatus::Skipped,
                EventNotes::with_reason("superseded by sale"),
            );
            return Ok(());
        }
        let Some(remote_price) = event.change_data.new_price else {
            report.resolved_error += 1;
            state.finalize(
                &event,
                EventStatus::Error,
                EventNotes::with_reason("price event carries no new price"),
            );
            return Ok(());
        };

        let notes = event.notes.clone();
        match self.authority {
            PriceAuthority::Canonical => {
                let canonical = state.product.canonical_price();
                if (remote_price - canonical).abs() <= self.price_epsilon {
                    report.resolved_skipped += 1;
                    state.finalize(
                        &event,
                        EventStatus::Skipped,
                        EventNotes::with_reason("matched existing state"),
                    );
                    return Ok(());
                }
                let origin_active = state
                    .links
                    .get(&event.platform)
                    .is_some_and(PlatformLink::is_active);
                if !origin_active || notes.leg_settled(event.platform) {
                    report.resolved_processed += 1;
                    state.finalize(&event, EventStatus::Processed, notes);
                    return Ok(());
                }
                report.price_changes += 1;
                let action = OutboundAction::UpdatePrice {
                    platform: event.platform,
                    external_id: event.external_id.clone(),
                    price: canonical,
                };
                state.plans.push(EventPlan {
                    event,
                    notes,
                    actions: vec![action],
                });
            }
            PriceAuthority::LastWriterWins => {
                if state.product.base_price != remote_price {
                    state.product.base_price = remote_price;
                    state.product.specialist_price = None;
                    state.product.updated_at = Utc::now();
                    report.price_changes += 1;
                }
                let actions: Vec<OutboundAction> = state
                    .active_targets(event.platform)
                    .into_iter()
                    .filter(|link| !notes.leg_settled(link.platform))
                    .filter_map(|link| {
                        link.external_id.as_ref().map(|external_id| {
                            OutboundAction::UpdatePrice {
                                platform: link.platform,
                                external_id: external_id.clone(),
                                price: remote_price,
                            }
                        })
                    })
                    .collect();
                if actions.is_empty() {
                    report.resolved_processed += 1;
                    state.finalize(&event, EventStatus::Processed, notes);
                } else {
                    state.plans.push(EventPlan {
                        event,
                        notes,
                        actions,
                    });
                }
            }
            PriceAuthority::PerPlatform => {
                report.resolved_processed += 1;
                state.finalize(
                    &event,
                    EventStatus::Processed,
                    EventNotes::with_reason("per-platform pricing policy, drift recorded"),
                );
            }
        }
        Ok(())
    }

    fn decide_confirmed_listing(
        &self,
        event: SyncEvent,
        state: &mut GroupState,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let status = event
            .change_data
            .new_status
            .map(LinkStatus::from)
            .unwrap_or(LinkStatus::Active);
        state.commit.link_upserts.push(NewPlatformLink {
            product_id: state.product.id,
            platform: event.platform,
            external_id: Some(event.external_id.clone()),
            status,
            listing_url: event.change_data.listing_url.clone(),
            sync_status: SyncStatus::Synced,
            platform_specific_data: serde_json::Value::Null,
        });
        if !event.change_data.raw_data.is_null() {
            state.listing_snapshots.push((
                event.platform,
                event.external_id.clone(),
                event.change_data.raw_data.clone(),
            ));
        }
        report.listings_linked += 1;

        // A partially propagated discovery records one attempt per target
        // marketplace; retry only the unsettled legs.
        let notes = event.notes.clone();
        let actions: Vec<OutboundAction> = notes
            .attempts
            .iter()
            .filter(|(_, outcome)| !outcome.is_settled())
            .filter(|(platform, _)| {
                state
                    .links
                    .get(platform)
                    .map_or(true, |link| !link.is_active())
            })
            .map(|(platform, _)| OutboundAction::CreateListing {
                platform: *platform,
                product_id: state.product.id,
            })
            .collect();

        if actions.is_empty() {
            report.resolved_processed += 1;
            state.finalize(&event, EventStatus::Processed, notes);
        } else {
            state.plans.push(EventPlan {
                event,
                notes,
                actions,
            });
        }
        Ok(())
    }

    fn decide_removed(
        &self,
        event: SyncEvent,
        state: &mut GroupState,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let changed = state.touch_link(event.platform, LinkStatus::Removed);
        if changed {
            report.listings_removed += 1;
        }

        let mut notes = event.notes.clone();
        let remaining_active = state.links.values().filter(|l| l.is_active()).count();
        if remaining_active == 0 && !state.product.is_stocked_item {
            // Removal could be operator error on the marketplace; never
            // auto-sell, flag for a human instead.
            notes.needs_review = true;
            notes.reason = Some("no active listings remain".into());
            warn!(product_id = %state.product.id, sku = %state.product.sku,
                "Product has no active listings left, flagged for review");
        }

        if changed {
            report.resolved_processed += 1;
            state.finalize(&event, EventStatus::Processed, notes);
        } else {
            report.resolved_skipped += 1;
            state.finalize(
                &event,
                EventStatus::Skipped,
                EventNotes::with_reason("matched existing state"),
            );
        }
        Ok(())
    }

    /// Rogue events have no canonical product. New-listing events wait for
    /// an operator; anything else cannot be reconciled.
    async fn reconcile_rogue(
        &self,
        event: SyncEvent,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        match event.change_type {
            ChangeType::NewListing => {
                report.left_pending += 1;
                debug!(platform = %event.platform, external_id = %event.external_id,
                    "Rogue listing awaiting operator match");
                Ok(())
            }
            other => {
                report.resolved_error += 1;
                self.settle(
                    &event,
                    EventStatus::Error,
                    EventNotes::with_reason(format!(
                        "{other} event cannot be linked to a product"
                    )),
                    report,
                )
                .await
            }
        }
    }

    /// Store the raw marketplace payload as the listing detail record for
    /// links created this pass. Runs after the commit so the link rows
    /// exist to hang the snapshot on.
    async fn persist_listing_snapshots(
        &self,
        snapshots: &[(PlatformTag, ExternalId, serde_json::Value)],
    ) -> Result<()> {
        for (platform, external_id, raw) in snapshots {
            let Some(link) = self.store.find_link(*platform, external_id).await? else {
                continue;
            };
            let picture_urls = raw
                .get("photos")
                .or_else(|| raw.pointer("/PictureDetails/PictureURL"))
                .and_then(serde_json::Value::as_array)
                .map(|urls| {
                    urls.iter()
                        .filter_map(|u| {
                            u.as_str()
                                .or_else(|| u.pointer("/_links/full/href").and_then(|v| v.as_str()))
                                .map(str::to_string)
                        })
                        .collect()
                })
                .unwrap_or_default();
            self.store
                .upsert_platform_listing(&PlatformListing {
                    link_id: link.id,
                    platform: *platform,
                    category_id: None,
                    category_name: None,
                    secondary_category_id: None,
                    shipping_policy_id: None,
                    payment_policy_id: None,
                    return_policy_id: None,
                    picture_urls,
                    raw_snapshot: raw.clone(),
                    updated_at: Utc::now(),
                })
                .await?;
        }
        Ok(())
    }

    async fn settle(
        &self,
        event: &SyncEvent,
        status: EventStatus,
        notes: EventNotes,
        _report: &mut ReconcileReport,
    ) -> Result<()> {
        if self.dry_run {
            debug!(event_id = %event.id, status = %status, "Dry run: skipping event settle");
            return Ok(());
        }
        self.store
            .update_event_status(&EventStatusUpdate {
                event_id: event.id,
                status,
                notes,
                processed_at: Some(Utc::now()),
            })
            .await
    }
}

fn sold_status_change(event: &SyncEvent) -> bool {
    event.change_type == ChangeType::StatusChange
        && event.change_data.new_status == Some(UniversalStatus::Sold)
}

/// Decision order within a product group.
fn priority(event: &SyncEvent) -> u8 {
    if sold_status_change(event) {
        return 0;
    }
    match event.change_type {
        ChangeType::QuantityChange => 1,
        ChangeType::Price => 2,
        ChangeType::StatusChange => 3,
        ChangeType::NewListing => 4,
        ChangeType::RemovedListing => 5,
    }
}
