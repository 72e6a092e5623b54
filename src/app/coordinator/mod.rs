//! Sync run coordinator.
//!
//! Top-level state machine per run:
//!
//! ```text
//! INIT → DETECTING → RECONCILING → DISPATCHING → FINALIZED
//!                               ↘ ABORTED
//! ```
//!
//! Detection runs one task per enabled marketplace in parallel; failure of
//! one never aborts the others. Reconciliation is single-threaded for
//! deterministic ordering; dispatch is bounded-parallel. ABORTED is reached
//! only when the persistence layer reports a fatal error. A run with ERROR
//! events still finalizes, partial progress being the normal operating mode.

mod builder;
mod detection;

pub use builder::build_adapter_registry;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::app::config::SyncConfig;
use crate::core::dispatch::ActionDispatcher;
use crate::core::domain::{DetectionOutcome, RunState, RunSummary, SyncRun, SyncRunId};
use crate::core::platform::AdapterRegistry;
use crate::core::reconcile::Reconciler;
use crate::core::service::RunStatsRecorder;
use crate::core::store::Store;
use crate::error::Result;

use detection::{detect_platform, is_detection_fatal};

/// How a run ended, with the exit code the CLI maps it to.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Finalized {
        run_id: SyncRunId,
        summary: RunSummary,
    },
    Aborted {
        run_id: SyncRunId,
        reason: String,
    },
    TimedOut {
        run_id: SyncRunId,
        summary: RunSummary,
    },
}

impl RunOutcome {
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Finalized { .. } => 0,
            Self::Aborted { .. } => 1,
            Self::TimedOut { .. } => 2,
        }
    }

    #[must_use]
    pub const fn run_id(&self) -> SyncRunId {
        match self {
            Self::Finalized { run_id, .. }
            | Self::Aborted { run_id, .. }
            | Self::TimedOut { run_id, .. } => *run_id,
        }
    }
}

pub struct SyncCoordinator {
    store: Arc<dyn Store>,
    adapters: AdapterRegistry,
    config: SyncConfig,
    stats: Arc<RunStatsRecorder>,
    dry_run: bool,
    cancel: watch::Receiver<bool>,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<dyn Store>,
        adapters: AdapterRegistry,
        config: SyncConfig,
        dry_run: bool,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            adapters,
            config,
            stats: Arc::new(RunStatsRecorder::new()),
            dry_run,
            cancel,
        }
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Execute one full run: detection → reconciliation → dispatch.
    pub async fn run(&self) -> RunOutcome {
        let run = SyncRun::start();
        let run_id = run.id;
        info!(run_id = %run_id, dry_run = self.dry_run, "Starting sync run");

        if let Err(err) = self.store.create_sync_run(&run).await {
            error!(error = %err, "Could not create sync run row");
            return RunOutcome::Aborted {
                run_id,
                reason: err.to_string(),
            };
        }

        let phases = self.execute_phases(run_id);
        match tokio::time::timeout(self.config.run_timeout(), phases).await {
            Ok(Ok(())) => {
                let summary = self.stats.snapshot();
                self.finalize(run_id, RunState::Finalized, &summary).await;
                info!(run_id = %run_id, "Sync run finalized");
                RunOutcome::Finalized { run_id, summary }
            }
            Ok(Err(err)) => {
                error!(run_id = %run_id, error = %err, "Sync run aborted");
                let summary = self.stats.snapshot();
                self.finalize(run_id, RunState::Aborted, &summary).await;
                RunOutcome::Aborted {
                    run_id,
                    reason: err.to_string(),
                }
            }
            Err(_) => {
                warn!(run_id = %run_id, timeout = ?self.config.run_timeout(),
                    "Run wall-clock timeout expired");
                let summary = self.stats.snapshot();
                self.finalize(run_id, RunState::Finalized, &summary).await;
                RunOutcome::TimedOut { run_id, summary }
            }
        }
    }

    /// Re-run reconciliation and dispatch over an existing run's open
    /// events without re-detecting.
    pub async fn reconcile_existing(&self, run_id: SyncRunId) -> RunOutcome {
        let existing = match self.store.fetch_sync_run(run_id).await {
            Ok(Some(run)) => run,
            Ok(None) => {
                return RunOutcome::Aborted {
                    run_id,
                    reason: format!("sync run {run_id} not found"),
                }
            }
            Err(err) => {
                return RunOutcome::Aborted {
                    run_id,
                    reason: err.to_string(),
                }
            }
        };

        let result = async {
            let events = self.store.fetch_pending_events_for_run(run_id).await?;
            info!(run_id = %run_id, events = events.len(), "Re-reconciling existing run");
            self.reconcile_and_dispatch(events).await
        }
        .await;

        match result {
            Ok(()) => {
                let mut summary = existing.summary;
                summary.absorb(&self.stats.snapshot());
                self.finalize(run_id, RunState::Finalized, &summary).await;
                RunOutcome::Finalized { run_id, summary }
            }
            Err(err) => {
                error!(run_id = %run_id, error = %err, "Reconcile pass aborted");
                RunOutcome::Aborted {
                    run_id,
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn execute_phases(&self, run_id: SyncRunId) -> Result<()> {
        info!(run_id = %run_id, state = %RunState::Detecting, "Entering detection phase");
        self.detect_all(run_id).await?;

        if self.cancelled() {
            warn!("Cancellation requested, skipping reconciliation");
            return Ok(());
        }

        let events = self.store.fetch_open_events().await?;
        self.reconcile_and_dispatch(events).await
    }

    async fn detect_all(&self, run_id: SyncRunId) -> Result<()> {
        let tasks = self.adapters.iter().map(|(platform, adapter)| {
            let store = Arc::clone(&self.store);
            let epsilon = self.config.price_match_epsilon;
            let threshold = self.config.matcher_confidence_threshold;
            let detection_timeout = self.config.per_detection_timeout();
            async move {
                let started = Instant::now();
                let result = tokio::time::timeout(
                    detection_timeout,
                    detect_platform(store, adapter, run_id, epsilon, threshold),
                )
                .await;
                (platform, started.elapsed(), result)
            }
        });

        let mut results =
            stream::iter(tasks).buffer_unordered(self.config.detection_concurrency.max(1));

        while let Some((platform, elapsed, result)) = results.next().await {
            match result {
                Ok(Ok(numbers)) => {
                    self.stats.record_detection(
                        platform,
                        numbers.listings_fetched,
                        numbers.events_written,
                        elapsed,
                        DetectionOutcome::Completed,
                    );
                }
                Ok(Err(err)) if is_detection_fatal(&err) => {
                    return Err(err);
                }
                Ok(Err(err)) => {
                    warn!(platform = %platform, error = %err, "Detection failed");
                    self.stats.record_detection(
                        platform,
                        0,
                        0,
                        elapsed,
                        DetectionOutcome::Failed {
                            message: err.to_string(),
                        },
                    );
                }
                Err(_) => {
                    warn!(platform = %platform, "Detection timed out");
                    self.stats.record_detection(
                        platform,
                        0,
                        0,
                        elapsed,
                        DetectionOutcome::TimedOut,
                    );
                }
            }
        }
        Ok(())
    }

    async fn reconcile_and_dispatch(
        &self,
        events: Vec<crate::core::domain::SyncEvent>,
    ) -> Result<()> {
        info!(state = %RunState::Reconciling, events = events.len(), "Entering reconciliation phase");
        let reconciler = Reconciler::new(
            Arc::clone(&self.store),
            self.config.default_price_authority,
            self.config.price_match_epsilon,
            self.dry_run,
            self.cancel.clone(),
        );
        let report = reconciler.reconcile(events).await?;

        self.stats.record_sales(report.sales);
        self.stats.record_price_changes(report.price_changes);
        self.stats.record_listings_removed(report.listings_removed);
        self.stats.record_listings_updated(report.listings_linked);
        for _ in 0..report.resolved_processed {
            self.stats
                .record_event_resolution(crate::core::domain::EventStatus::Processed);
        }
        for _ in 0..report.resolved_skipped {
            self.stats
                .record_event_resolution(crate::core::domain::EventStatus::Skipped);
        }
        for _ in 0..report.resolved_error {
            self.stats
                .record_event_resolution(crate::core::domain::EventStatus::Error);
        }

        if self.cancelled() {
            warn!("Cancellation requested, skipping dispatch");
            return Ok(());
        }

        info!(state = %RunState::Dispatching, plans = report.product_plans.len(),
            actions = report.queued_actions(), "Entering dispatch phase");
        let dispatcher = ActionDispatcher::new(
            Arc::clone(&self.store),
            self.adapters.clone(),
            Arc::clone(&self.stats),
            self.config.dispatch_concurrency,
            self.config.per_call_timeout(),
            self.dry_run,
            self.cancel.clone(),
        );
        dispatcher.dispatch(report.product_plans).await?;
        Ok(())
    }

    async fn finalize(&self, run_id: SyncRunId, state: RunState, summary: &RunSummary) {
        if let Err(err) = self
            .store
            .finish_sync_run(run_id, state, summary, Utc::now())
            .await
        {
            // Nothing left to escalate to; the run itself is over.
            error!(run_id = %run_id, error = %err, "Failed to persist run summary");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_map_to_outcomes() {
        let run_id = SyncRunId::new();
        assert_eq!(
            RunOutcome::Finalized {
                run_id,
                summary: RunSummary::default()
            }
            .exit_code(),
            0
        );
        assert_eq!(
            RunOutcome::Aborted {
                run_id,
                reason: "db".into()
            }
            .exit_code(),
            1
        );
        assert_eq!(
            RunOutcome::TimedOut {
                run_id,
                summary: RunSummary::default()
            }
            .exit_code(),
            2
        );
    }
}
