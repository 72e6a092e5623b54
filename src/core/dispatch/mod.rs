//! Outbound action dispatcher.
//!
//! Executes the reconciler's plans through the adapters: products run in
//! parallel up to the configured fan-out, actions for one product run
//! strictly in plan order. Every leg's outcome lands in the event notes so
//! the next run can resume without redoing successful work; only fatal
//! store failures propagate out of the dispatch phase.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::core::domain::{
    AttemptOutcome, EventStatus, LinkStatus, NewPlatformLink, PlatformTag, SyncStatus,
};
use crate::core::platform::{AdapterRegistry, CloseOutcome, CreateContext, MarketplaceAdapter};
use crate::core::reconcile::{EventPlan, OutboundAction, ProductPlan};
use crate::core::service::{ActionOutcome, RunStatsRecorder};
use crate::core::store::{EventStatusUpdate, Store};
use crate::error::{Error, Result};

/// Counters for one dispatch phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub events_processed: u32,
    pub events_partial: u32,
    pub events_error: u32,
    pub actions_succeeded: u32,
    pub actions_failed: u32,
}

impl DispatchReport {
    fn absorb(&mut self, other: Self) {
        self.events_processed += other.events_processed;
        self.events_partial += other.events_partial;
        self.events_error += other.events_error;
        self.actions_succeeded += other.actions_succeeded;
        self.actions_failed += other.actions_failed;
    }
}

pub struct ActionDispatcher {
    store: Arc<dyn Store>,
    adapters: AdapterRegistry,
    stats: Arc<RunStatsRecorder>,
    concurrency: usize,
    per_call_timeout: Duration,
    dry_run: bool,
    cancel: watch::Receiver<bool>,
}

impl ActionDispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        adapters: AdapterRegistry,
        stats: Arc<RunStatsRecorder>,
        concurrency: usize,
        per_call_timeout: Duration,
        dry_run: bool,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            adapters,
            stats,
            concurrency: concurrency.max(1),
            per_call_timeout,
            dry_run,
            cancel,
        }
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Run every product plan. Adapter failures are recorded on the events;
    /// only a fatal store error aborts.
    pub async fn dispatch(&self, plans: Vec<ProductPlan>) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();
        let mut outcomes = stream::iter(
            plans
                .into_iter()
                .map(|plan| self.run_product_plan(plan)),
        )
        .buffer_unordered(self.concurrency);

        while let Some(outcome) = outcomes.next().await {
            report.absorb(outcome?);
        }

        info!(
            processed = report.events_processed,
            partial = report.events_partial,
            errors = report.events_error,
            "Dispatch phase complete"
        );
        Ok(report)
    }

    async fn run_product_plan(&self, plan: ProductPlan) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();
        for event_plan in plan.plans {
            // Cancellation takes effect between plans; in-flight calls may
            // complete, undispatched events stay open for the next run.
            if self.cancelled() {
                debug!(product_id = ?plan.product_id,
                    "Cancellation requested, leaving remaining plans open");
                return Ok(report);
            }
            let outcome = self.run_event_plan(event_plan).await?;
            report.absorb(outcome);
        }
        Ok(report)
    }

    async fn run_event_plan(&self, plan: EventPlan) -> Result<DispatchReport> {
        let EventPlan {
            event,
            mut notes,
            actions,
        } = plan;
        let mut report = DispatchReport::default();

        if self.dry_run {
            for action in &actions {
                info!(event_id = %event.id, platform = %action.platform(),
                    kind = action.kind(), "Dry run: would dispatch action");
            }
            return Ok(report);
        }

        let mut saw_transient = false;
        let mut permanent_reason: Option<String> = None;

        for action in actions {
            let platform = action.platform();
            let started = Instant::now();
            let outcome = self.execute(&action).await;
            let duration = started.elapsed();

            match outcome {
                Ok(()) => {
                    self.stats
                        .record_action(platform, action.kind(), duration, ActionOutcome::Succeeded);
                    report.actions_succeeded += 1;
                    notes.attempts.insert(platform, AttemptOutcome::Ok);
                }
                Err(Error::Fatal(message)) => return Err(Error::Fatal(message)),
                Err(Error::NotFound(message)) => {
                    self.stats
                        .record_action(platform, action.kind(), duration, ActionOutcome::Succeeded);
                    if action.not_found_is_success() {
                        notes
                            .attempts
                            .insert(platform, AttemptOutcome::AlreadyConsistent);
                        report.actions_succeeded += 1;
                    } else {
                        // The listing vanished; the next detection pass
                        // raises removed_listing for it.
                        notes
                            .attempts
                            .insert(platform, AttemptOutcome::NotFound { message });
                    }
                }
                Err(Error::Transient(message)) => {
                    self.stats
                        .record_action(platform, action.kind(), duration, ActionOutcome::Failed);
                    report.actions_failed += 1;
                    warn!(event_id = %event.id, platform = %platform, kind = action.kind(),
                        error = %message, "Outbound action failed transiently");
                    saw_transient = true;
                    notes
                        .attempts
                        .insert(platform, AttemptOutcome::Transient { message });
                }
                Err(err) => {
                    let message = err.to_string();
                    self.stats
                        .record_action(platform, action.kind(), duration, ActionOutcome::Failed);
                    report.actions_failed += 1;
                    warn!(event_id = %event.id, platform = %platform, kind = action.kind(),
                        error = %message, "Outbound action rejected");
                    permanent_reason.get_or_insert_with(|| message.clone());
                    notes
                        .attempts
                        .insert(platform, AttemptOutcome::Permanent { message });
                }
            }
        }

        let status = if let Some(reason) = permanent_reason {
            notes.reason = Some(reason);
            report.events_error += 1;
            EventStatus::Error
        } else if saw_transient {
            report.events_partial += 1;
            EventStatus::Partial
        } else {
            report.events_processed += 1;
            EventStatus::Processed
        };

        self.stats.record_event_resolution(status);
        self.store
            .update_event_status(&EventStatusUpdate {
                event_id: event.id,
                status,
                notes,
                processed_at: Some(Utc::now()),
            })
            .await?;
        Ok(report)
    }

    async fn execute(&self, action: &OutboundAction) -> Result<()> {
        let platform = action.platform();
        let Some(adapter) = self.adapters.get(platform) else {
            return Err(Error::permanent(format!("no adapter for {platform}")));
        };

        let call = self.call_adapter(adapter, action);
        match tokio::time::timeout(self.per_call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Transient(format!(
                "{} on {platform} timed out after {:?}",
                action.kind(),
                self.per_call_timeout
            ))),
        }
    }

    async fn call_adapter(
        &self,
        adapter: Arc<dyn MarketplaceAdapter>,
        action: &OutboundAction,
    ) -> Result<()> {
        match action {
            OutboundAction::MarkSold {
                platform,
                external_id,
            } => {
                let outcome = adapter.mark_as_sold(external_id).await?;
                if outcome == CloseOutcome::AlreadyClosed {
                    debug!(platform = %platform, external_id = %external_id,
                        "Remote already closed, treating as success");
                }
                self.settle_link(*platform, external_id, LinkStatus::Sold)
                    .await
            }
            OutboundAction::UpdatePrice {
                platform,
                external_id,
                price,
            } => {
                adapter.update_price(external_id, *price).await?;
                self.touch_link_sync(*platform, external_id).await
            }
            OutboundAction::UpdateQuantity {
                platform,
                external_id,
                quantity,
                hints,
            } => {
                adapter
                    .update_quantity(external_id, *quantity, hints)
                    .await?;
                if *quantity == 0 {
                    self.settle_link(*platform, external_id, LinkStatus::Sold)
                        .await
                } else {
                    self.touch_link_sync(*platform, external_id).await
                }
            }
            OutboundAction::CreateListing {
                platform,
                product_id,
            } => {
                let Some(product) = self.store.fetch_product(*product_id).await? else {
                    return Err(Error::permanent(format!("product {product_id} not found")));
                };
                let result = adapter
                    .create_listing(&product, &CreateContext::default())
                    .await?;
                let sync_status = if result.external_id.is_some() {
                    SyncStatus::Synced
                } else {
                    SyncStatus::Pending
                };
                self.store
                    .commit_reconciliation(&crate::core::store::ReconcileCommit {
                        link_upserts: vec![NewPlatformLink {
                            product_id: *product_id,
                            platform: *platform,
                            external_id: result.external_id,
                            status: LinkStatus::from(result.status),
                            listing_url: result.listing_url,
                            sync_status,
                            platform_specific_data: serde_json::Value::Null,
                        }],
                        ..Default::default()
                    })
                    .await?;
                self.stats.record_listings_created(1);
                Ok(())
            }
        }
    }

    /// Record the remote reaching a terminal status on the local link so the
    /// next run's diff sees the new reality.
    async fn settle_link(
        &self,
        platform: PlatformTag,
        external_id: &crate::core::domain::ExternalId,
        status: LinkStatus,
    ) -> Result<()> {
        if let Some(mut link) = self.store.find_link(platform, external_id).await? {
            link.status = status;
            link.sync_status = SyncStatus::Synced;
            link.last_sync = Some(Utc::now());
            self.store.update_platform_link(&link).await?;
        }
        Ok(())
    }

    async fn touch_link_sync(
        &self,
        platform: PlatformTag,
        external_id: &crate::core::domain::ExternalId,
    ) -> Result<()> {
        if let Some(mut link) = self.store.find_link(platform, external_id).await? {
            link.sync_status = SyncStatus::Synced;
            link.last_sync = Some(Utc::now());
            self.store.update_platform_link(&link).await?;
        }
        Ok(())
    }
}
