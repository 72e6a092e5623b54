//! Per-marketplace status translation tables.
//!
//! Each marketplace speaks its own status dialect; these functions collapse
//! every native token into the universal vocabulary at the adapter boundary.
//! Unknown tokens map into the off-market class so a misread listing can
//! never fabricate a ghost `new_listing`.

use tracing::warn;

use crate::core::domain::{PlatformTag, UniversalStatus};

/// eBay `GetMyeBaySelling` list membership: active, sold or unsold.
#[must_use]
pub fn from_ebay_list(list_type: &str) -> UniversalStatus {
    match list_type {
        "active" => UniversalStatus::Active,
        "sold" => UniversalStatus::Sold,
        "unsold" => UniversalStatus::Ended,
        other => unknown_token(PlatformTag::Ebay, other),
    }
}

/// Reverb listing `state` slugs.
#[must_use]
pub fn from_reverb_state(state: &str) -> UniversalStatus {
    match state {
        "live" => UniversalStatus::Active,
        "sold" | "sold_out" => UniversalStatus::Sold,
        "ended" => UniversalStatus::Ended,
        "draft" => UniversalStatus::Draft,
        "suspended" | "deleted" => UniversalStatus::Removed,
        other => unknown_token(PlatformTag::Reverb, other),
    }
}

/// Shopify product status plus inventory. Shopify has no sold status: a
/// one-off product that sells out stays ACTIVE with zero inventory, so the
/// zero-inventory case reads as sold.
#[must_use]
pub fn from_shopify_status(status: &str, quantity_available: Option<i32>) -> UniversalStatus {
    match status.to_ascii_uppercase().as_str() {
        "ACTIVE" if quantity_available == Some(0) => UniversalStatus::Sold,
        "ACTIVE" => UniversalStatus::Active,
        "ARCHIVED" => UniversalStatus::Ended,
        "DRAFT" => UniversalStatus::Draft,
        other => unknown_token(PlatformTag::Shopify, other),
    }
}

/// Vintage & Rare inventory-table state cells.
#[must_use]
pub fn from_vr_state(state: &str) -> UniversalStatus {
    match state.to_ascii_lowercase().as_str() {
        "active" | "live" => UniversalStatus::Active,
        "sold" => UniversalStatus::Sold,
        "ended" => UniversalStatus::Ended,
        "removed" | "deleted" => UniversalStatus::Removed,
        other => unknown_token(PlatformTag::Vr, other),
    }
}

fn unknown_token(platform: PlatformTag, token: &str) -> UniversalStatus {
    warn!(platform = %platform, token, "Unknown marketplace status token, treating as ended");
    UniversalStatus::Ended
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ebay_list_types() {
        assert_eq!(from_ebay_list("active"), UniversalStatus::Active);
        assert_eq!(from_ebay_list("sold"), UniversalStatus::Sold);
        assert_eq!(from_ebay_list("unsold"), UniversalStatus::Ended);
        assert_eq!(from_ebay_list("mystery"), UniversalStatus::Ended);
    }

    #[test]
    fn reverb_states() {
        assert_eq!(from_reverb_state("live"), UniversalStatus::Active);
        assert_eq!(from_reverb_state("sold_out"), UniversalStatus::Sold);
        assert_eq!(from_reverb_state("suspended"), UniversalStatus::Removed);
        assert_eq!(from_reverb_state("draft"), UniversalStatus::Draft);
    }

    #[test]
    fn shopify_sold_out_reads_as_sold() {
        assert_eq!(
            from_shopify_status("ACTIVE", Some(0)),
            UniversalStatus::Sold
        );
        assert_eq!(
            from_shopify_status("ACTIVE", Some(3)),
            UniversalStatus::Active
        );
        assert_eq!(from_shopify_status("active", None), UniversalStatus::Active);
        assert_eq!(
            from_shopify_status("ARCHIVED", Some(0)),
            UniversalStatus::Ended
        );
    }

    #[test]
    fn vr_states() {
        assert_eq!(from_vr_state("Active"), UniversalStatus::Active);
        assert_eq!(from_vr_state("SOLD"), UniversalStatus::Sold);
        assert_eq!(from_vr_state("deleted"), UniversalStatus::Removed);
    }
}
