//! Normalized remote listing snapshots.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ExternalId;
use super::status::UniversalStatus;

/// One listing as a marketplace currently reports it, normalized at the
/// adapter boundary: status translated into the universal vocabulary, price
/// in two-decimal GBP, quantities absent where the marketplace does not
/// expose them. The raw payload is preserved untouched for event capture
/// and downstream enrichment; nothing outside the adapter reaches into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteListing {
    pub external_id: ExternalId,
    pub status: UniversalStatus,
    pub price: Decimal,
    pub quantity_total: Option<i32>,
    pub quantity_available: Option<i32>,
    pub quantity_sold: Option<i32>,
    pub title: String,
    pub listing_url: Option<String>,
    pub raw: serde_json::Value,
}

impl RemoteListing {
    /// Available quantity, deriving `total - sold` when the marketplace
    /// reports totals but not availability.
    #[must_use]
    pub fn effective_available(&self) -> Option<i32> {
        self.quantity_available.or_else(|| {
            match (self.quantity_total, self.quantity_sold) {
                (Some(total), Some(sold)) => Some((total - sold).max(0)),
                _ => None,
            }
        })
    }
}
