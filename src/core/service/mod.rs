//! Cross-cutting services.

mod stats;

pub use stats::{ActionOutcome, RunStatsRecorder};
