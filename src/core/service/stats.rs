//! Per-run statistics recorder.
//!
//! Accumulates counters and per-action timings behind a mutex while the
//! detection and dispatch phases run concurrently; the coordinator takes a
//! snapshot at FINALIZE and persists it on the run row.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::core::domain::{
    DetectionOutcome, DetectionReport, EventStatus, PlatformTag, RunSummary,
};

/// How one outbound action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Succeeded,
    Failed,
}

#[derive(Default)]
pub struct RunStatsRecorder {
    summary: Mutex<RunSummary>,
}

impl RunStatsRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_detection(
        &self,
        platform: PlatformTag,
        listings_fetched: usize,
        events_written: usize,
        duration: Duration,
        outcome: DetectionOutcome,
    ) {
        let mut summary = self.summary.lock();
        summary.events_detected += events_written as u32;
        summary.detection.insert(
            platform,
            DetectionReport {
                listings_fetched,
                events_written,
                duration_ms: duration.as_millis() as u64,
                outcome,
            },
        );
    }

    /// Record an event reaching a terminal (or retryable-terminal) status.
    pub fn record_event_resolution(&self, status: EventStatus) {
        let mut summary = self.summary.lock();
        match status {
            EventStatus::Processed => summary.events_processed += 1,
            EventStatus::Partial => summary.events_partial += 1,
            EventStatus::Error => summary.events_error += 1,
            EventStatus::Skipped => summary.events_skipped += 1,
            EventStatus::Pending => {}
        }
    }

    pub fn record_action(
        &self,
        platform: PlatformTag,
        kind: &str,
        duration: Duration,
        outcome: ActionOutcome,
    ) {
        debug!(platform = %platform, kind, duration_ms = duration.as_millis() as u64,
            ok = outcome == ActionOutcome::Succeeded, "Outbound action finished");
        let mut summary = self.summary.lock();
        match outcome {
            ActionOutcome::Succeeded => summary.actions_succeeded += 1,
            ActionOutcome::Failed => summary.actions_failed += 1,
        }
    }

    pub fn record_sales(&self, count: u32) {
        self.summary.lock().sales += count;
    }

    pub fn record_price_changes(&self, count: u32) {
        self.summary.lock().price_changes += count;
    }

    pub fn record_listings_created(&self, count: u32) {
        self.summary.lock().listings_created += count;
    }

    pub fn record_listings_updated(&self, count: u32) {
        self.summary.lock().listings_updated += count;
    }

    pub fn record_listings_removed(&self, count: u32) {
        self.summary.lock().listings_removed += count;
    }

    /// Current counters; the run summary written at FINALIZE.
    #[must_use]
    pub fn snapshot(&self) -> RunSummary {
        self.summary.lock().clone()
    }
}
