//! Sync runs and their summaries.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::SyncRunId;
use super::platform::PlatformTag;

/// Coordinator state machine. `Aborted` is reached only when the
/// persistence layer reports a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Init,
    Detecting,
    Reconciling,
    Dispatching,
    Finalized,
    Aborted,
}

impl RunState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Detecting => "detecting",
            Self::Reconciling => "reconciling",
            Self::Dispatching => "dispatching",
            Self::Finalized => "finalized",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "init" => Ok(Self::Init),
            "detecting" => Ok(Self::Detecting),
            "reconciling" => Ok(Self::Reconciling),
            "dispatching" => Ok(Self::Dispatching),
            "finalized" => Ok(Self::Finalized),
            "aborted" => Ok(Self::Aborted),
            other => Err(format!("unknown run state: {other}")),
        }
    }
}

/// How a platform's detection task ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DetectionOutcome {
    Completed,
    TimedOut,
    Failed { message: String },
}

/// Per-platform detection result recorded in the run summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub listings_fetched: usize,
    pub events_written: usize,
    pub duration_ms: u64,
    pub outcome: DetectionOutcome,
}

/// Counters accumulated over one run, persisted at FINALIZE and printed as
/// the run summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSummary {
    pub events_detected: u32,
    pub events_processed: u32,
    pub events_partial: u32,
    pub events_error: u32,
    pub events_skipped: u32,
    pub sales: u32,
    pub listings_created: u32,
    pub listings_updated: u32,
    pub listings_removed: u32,
    pub price_changes: u32,
    pub actions_succeeded: u32,
    pub actions_failed: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub detection: BTreeMap<PlatformTag, DetectionReport>,
}

impl RunSummary {
    /// Whether any event finished in a failure class.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.events_error > 0 || self.actions_failed > 0
    }

    /// Fold another pass's counters into this summary. Used when a run's
    /// reconciliation is re-executed over its remaining open events.
    pub fn absorb(&mut self, other: &Self) {
        self.events_detected += other.events_detected;
        self.events_processed += other.events_processed;
        self.events_partial += other.events_partial;
        self.events_error += other.events_error;
        self.events_skipped += other.events_skipped;
        self.sales += other.sales;
        self.listings_created += other.listings_created;
        self.listings_updated += other.listings_updated;
        self.listings_removed += other.listings_removed;
        self.price_changes += other.price_changes;
        self.actions_succeeded += other.actions_succeeded;
        self.actions_failed += other.actions_failed;
        for (platform, report) in &other.detection {
            self.detection.insert(*platform, report.clone());
        }
    }
}

/// A single end-to-end invocation of detection, reconciliation and dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: SyncRunId,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: RunSummary,
}

impl SyncRun {
    /// Fresh run in INIT.
    #[must_use]
    pub fn start() -> Self {
        Self {
            id: SyncRunId::new(),
            state: RunState::Init,
            started_at: Utc::now(),
            finished_at: None,
            summary: RunSummary::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_state_round_trips() {
        for state in [
            RunState::Init,
            RunState::Detecting,
            RunState::Reconciling,
            RunState::Dispatching,
            RunState::Finalized,
            RunState::Aborted,
        ] {
            assert_eq!(state.as_str().parse::<RunState>().unwrap(), state);
        }
    }

    #[test]
    fn fresh_run_starts_in_init() {
        let run = SyncRun::start();
        assert_eq!(run.state, RunState::Init);
        assert!(run.finished_at.is_none());
        assert_eq!(run.summary, RunSummary::default());
    }

    #[test]
    fn summary_error_detection() {
        let mut summary = RunSummary::default();
        assert!(!summary.has_errors());
        summary.events_error = 1;
        assert!(summary.has_errors());
    }
}
