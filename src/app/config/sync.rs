//! Sync engine tuning.

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::core::reconcile::PriceAuthority;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Which side wins a price disagreement.
    pub default_price_authority: PriceAuthority,
    /// Detection tasks running at once (one per marketplace).
    pub detection_concurrency: usize,
    /// Outbound actions in flight at once, serialized per product.
    pub dispatch_concurrency: usize,
    pub per_call_timeout_seconds: u64,
    pub per_detection_timeout_seconds: u64,
    pub run_timeout_seconds: u64,
    /// Price differences at or below this are not drift.
    pub price_match_epsilon: Decimal,
    /// Minimum score for a match candidate to be suggested.
    pub matcher_confidence_threshold: u8,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_price_authority: PriceAuthority::Canonical,
            detection_concurrency: 4,
            dispatch_concurrency: 8,
            per_call_timeout_seconds: 60,
            per_detection_timeout_seconds: 900,
            run_timeout_seconds: 3600,
            price_match_epsilon: dec!(0.01),
            matcher_confidence_threshold: 50,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_secs(self.per_call_timeout_seconds)
    }

    #[must_use]
    pub fn per_detection_timeout(&self) -> Duration {
        Duration::from_secs(self.per_detection_timeout_seconds)
    }

    #[must_use]
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_seconds)
    }
}
