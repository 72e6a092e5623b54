//! Differential detection engine.
//!
//! A pure function from (remote snapshot, local snapshot) to three disjoint
//! change sets. No I/O, no clock, no ordering dependence beyond the input
//! maps; calling it twice with the same snapshots yields the same result.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::core::domain::{ExternalId, LinkStatus, RemoteListing, UniversalStatus};
use crate::core::store::LocalListingRow;

/// A single comparison result for one listing present on both sides,
/// ordered by reconciliation priority: status first, then quantity, then
/// price.
#[derive(Debug, Clone, PartialEq)]
pub enum ListingChange {
    Status {
        old: UniversalStatus,
        new: UniversalStatus,
    },
    Quantity {
        old: i32,
        new: i32,
        sold: Option<i32>,
    },
    Price {
        old: Decimal,
        new: Decimal,
    },
}

/// Changes detected for one listing known to both sides.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingDelta {
    pub remote: RemoteListing,
    pub local: LocalListingRow,
    pub changes: Vec<ListingChange>,
    /// New listing URL, piggybacked on the status/price event payload.
    /// A URL change alone never raises an event.
    pub url_change: Option<String>,
}

/// Output of one diff pass. The three sets are disjoint by construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffOutcome {
    /// Remote-only listings that are on-market: rogue listings to report.
    pub creates: Vec<RemoteListing>,
    /// Listings on both sides whose comparison fired at least one rule.
    pub updates: Vec<ListingDelta>,
    /// Locally-active listings the remote no longer exposes.
    pub removes: Vec<LocalListingRow>,
}

impl DiffOutcome {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.removes.is_empty()
    }
}

/// Compare one remote snapshot against the local snapshot for the same
/// platform.
///
/// Rules:
/// - create candidates are remote-only keys with an `active` status;
///   off-market remote-only listings are ignored (no fabricated history);
/// - remove candidates are local-only keys whose link is `active`;
/// - update candidates are shared keys run through [`compare`].
#[must_use]
pub fn diff(
    remote: &BTreeMap<ExternalId, RemoteListing>,
    local: &BTreeMap<ExternalId, LocalListingRow>,
    price_epsilon: Decimal,
) -> DiffOutcome {
    let mut outcome = DiffOutcome::default();

    for (external_id, listing) in remote {
        if !local.contains_key(external_id) && listing.status == UniversalStatus::Active {
            outcome.creates.push(listing.clone());
        }
    }

    for (external_id, row) in local {
        if !remote.contains_key(external_id) && row.link_status == LinkStatus::Active {
            outcome.removes.push(row.clone());
        }
    }

    for (external_id, listing) in remote {
        let Some(row) = local.get(external_id) else {
            continue;
        };
        if let Some(delta) = compare(listing, row, price_epsilon) {
            outcome.updates.push(delta);
        }
    }

    outcome
}

/// Compare one listing known to both sides.
///
/// The comparison short-circuits: a status mismatch (outside the off-market
/// equivalence class) stops all further checks, and nothing but status is
/// ever compared for listings that are not locally active. Links marked
/// `refreshed` are import-time placeholders and are skipped entirely.
#[must_use]
pub fn compare(
    remote: &RemoteListing,
    local: &LocalListingRow,
    price_epsilon: Decimal,
) -> Option<ListingDelta> {
    if local.link_status == LinkStatus::Refreshed {
        return None;
    }

    let url_change = remote.listing_url.as_deref().and_then(|url| {
        if !url.is_empty() && local.listing_url.as_deref() != Some(url) {
            Some(url.to_string())
        } else {
            None
        }
    });

    let local_status = local.link_status.as_universal();
    if !remote.status.equivalent(local_status) {
        return Some(ListingDelta {
            remote: remote.clone(),
            local: local.clone(),
            changes: vec![ListingChange::Status {
                old: local_status,
                new: remote.status,
            }],
            url_change,
        });
    }

    if local.link_status != LinkStatus::Active {
        return None;
    }

    let mut changes = Vec::new();

    if local.is_stocked_item {
        if let Some(available) = remote.effective_available() {
            if available != local.quantity {
                changes.push(ListingChange::Quantity {
                    old: local.quantity,
                    new: available,
                    sold: remote.quantity_sold,
                });
            }
        }
    }

    if (remote.price - local.canonical_price).abs() > price_epsilon {
        changes.push(ListingChange::Price {
            old: local.canonical_price,
            new: remote.price,
        });
    }

    if changes.is_empty() {
        return None;
    }

    Some(ListingDelta {
        remote: remote.clone(),
        local: local.clone(),
        changes,
        url_change,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{LinkId, ProductId, ProductStatus, SyncStatus};
    use rust_decimal_macros::dec;

    fn remote(id: &str, status: UniversalStatus, price: Decimal) -> RemoteListing {
        RemoteListing {
            external_id: ExternalId::new(id),
            status,
            price,
            quantity_total: None,
            quantity_available: None,
            quantity_sold: None,
            title: "Test listing".into(),
            listing_url: None,
            raw: serde_json::Value::Null,
        }
    }

    fn row(id: &str, status: LinkStatus, price: Decimal) -> LocalListingRow {
        LocalListingRow {
            product_id: ProductId::new(1),
            link_id: LinkId::new(1),
            sku: "REV-1001".into(),
            title: "Test listing".into(),
            brand: None,
            model: None,
            year: None,
            external_id: Some(ExternalId::new(id)),
            link_status: status,
            sync_status: SyncStatus::Synced,
            listing_url: None,
            canonical_price: price,
            quantity: 1,
            is_stocked_item: false,
            product_status: ProductStatus::Active,
        }
    }

    fn to_map<K: Clone + Ord, V: Clone>(pairs: &[(K, V)]) -> BTreeMap<K, V> {
        pairs.iter().cloned().collect()
    }

    const EPS: Decimal = dec!(0.01);

    #[test]
    fn remote_only_active_listing_is_a_create() {
        let remote_map = to_map(&[(
            ExternalId::new("X1"),
            remote("X1", UniversalStatus::Active, dec!(100)),
        )]);
        let outcome = diff(&remote_map, &BTreeMap::new(), EPS);
        assert_eq!(outcome.creates.len(), 1);
        assert!(outcome.updates.is_empty());
        assert!(outcome.removes.is_empty());
    }

    #[test]
    fn remote_only_off_market_listing_is_ignored() {
        for status in [
            UniversalStatus::Sold,
            UniversalStatus::Ended,
            UniversalStatus::Removed,
            UniversalStatus::Draft,
        ] {
            let remote_map = to_map(&[(ExternalId::new("X1"), remote("X1", status, dec!(100)))]);
            let outcome = diff(&remote_map, &BTreeMap::new(), EPS);
            assert!(outcome.is_empty(), "ghost create for {status:?}");
        }
    }

    #[test]
    fn missing_active_local_listing_is_a_remove() {
        let local_map = to_map(&[(
            ExternalId::new("X1"),
            row("X1", LinkStatus::Active, dec!(100)),
        )]);
        let outcome = diff(&BTreeMap::new(), &local_map, EPS);
        assert_eq!(outcome.removes.len(), 1);
    }

    #[test]
    fn already_ended_local_listing_stays_quiet() {
        for status in [
            LinkStatus::Sold,
            LinkStatus::Ended,
            LinkStatus::Removed,
            LinkStatus::Draft,
            LinkStatus::Refreshed,
        ] {
            let local_map = to_map(&[(ExternalId::new("X1"), row("X1", status, dec!(100)))]);
            let outcome = diff(&BTreeMap::new(), &local_map, EPS);
            assert!(outcome.is_empty(), "ghost remove for {status:?}");
        }
    }

    #[test]
    fn status_change_detected_and_stops_further_checks() {
        let delta = compare(
            &remote("X1", UniversalStatus::Sold, dec!(50)),
            &row("X1", LinkStatus::Active, dec!(100)),
            EPS,
        )
        .unwrap();
        // Price also drifted, but status short-circuits.
        assert_eq!(
            delta.changes,
            vec![ListingChange::Status {
                old: UniversalStatus::Active,
                new: UniversalStatus::Sold,
            }]
        );
    }

    #[test]
    fn off_market_statuses_never_raise_status_change() {
        assert!(compare(
            &remote("X1", UniversalStatus::Sold, dec!(100)),
            &row("X1", LinkStatus::Ended, dec!(100)),
            EPS,
        )
        .is_none());
        assert!(compare(
            &remote("X1", UniversalStatus::Removed, dec!(100)),
            &row("X1", LinkStatus::Sold, dec!(100)),
            EPS,
        )
        .is_none());
    }

    #[test]
    fn no_price_drift_checks_on_sold_items() {
        // Statuses are equivalent (both off-market); local is not active, so
        // the drifted price is ignored.
        assert!(compare(
            &remote("X1", UniversalStatus::Ended, dec!(50)),
            &row("X1", LinkStatus::Sold, dec!(100)),
            EPS,
        )
        .is_none());
    }

    #[test]
    fn price_drift_beyond_epsilon_fires() {
        let delta = compare(
            &remote("X1", UniversalStatus::Active, dec!(1450.00)),
            &row("X1", LinkStatus::Active, dec!(1500.00)),
            EPS,
        )
        .unwrap();
        assert_eq!(
            delta.changes,
            vec![ListingChange::Price {
                old: dec!(1500.00),
                new: dec!(1450.00),
            }]
        );
    }

    #[test]
    fn price_drift_within_epsilon_is_quiet() {
        assert!(compare(
            &remote("X1", UniversalStatus::Active, dec!(1500.01)),
            &row("X1", LinkStatus::Active, dec!(1500.00)),
            EPS,
        )
        .is_none());
    }

    #[test]
    fn quantity_change_only_for_stocked_items() {
        let mut listing = remote("X1", UniversalStatus::Active, dec!(100));
        listing.quantity_available = Some(3);

        let plain = row("X1", LinkStatus::Active, dec!(100));
        assert!(compare(&listing, &plain, EPS).is_none());

        let mut stocked = plain;
        stocked.is_stocked_item = true;
        stocked.quantity = 5;
        let delta = compare(&listing, &stocked, EPS).unwrap();
        assert_eq!(
            delta.changes,
            vec![ListingChange::Quantity {
                old: 5,
                new: 3,
                sold: None,
            }]
        );
    }

    #[test]
    fn quantity_precedes_price_when_both_fire() {
        let mut listing = remote("X1", UniversalStatus::Active, dec!(90));
        listing.quantity_available = Some(3);
        let mut local = row("X1", LinkStatus::Active, dec!(100));
        local.is_stocked_item = true;
        local.quantity = 5;

        let delta = compare(&listing, &local, EPS).unwrap();
        assert!(matches!(delta.changes[0], ListingChange::Quantity { .. }));
        assert!(matches!(delta.changes[1], ListingChange::Price { .. }));
    }

    #[test]
    fn url_change_alone_raises_nothing() {
        let mut listing = remote("X1", UniversalStatus::Active, dec!(100));
        listing.listing_url = Some("https://example.com/new".into());
        assert!(compare(&listing, &row("X1", LinkStatus::Active, dec!(100)), EPS).is_none());
    }

    #[test]
    fn url_change_rides_along_with_price_event() {
        let mut listing = remote("X1", UniversalStatus::Active, dec!(90));
        listing.listing_url = Some("https://example.com/new".into());
        let delta = compare(&listing, &row("X1", LinkStatus::Active, dec!(100)), EPS).unwrap();
        assert_eq!(delta.url_change.as_deref(), Some("https://example.com/new"));
    }

    #[test]
    fn diff_is_deterministic() {
        let remote_map = to_map(&[
            (
                ExternalId::new("A"),
                remote("A", UniversalStatus::Active, dec!(100)),
            ),
            (
                ExternalId::new("B"),
                remote("B", UniversalStatus::Sold, dec!(200)),
            ),
        ]);
        let local_map = to_map(&[
            (ExternalId::new("B"), row("B", LinkStatus::Active, dec!(200))),
            (ExternalId::new("C"), row("C", LinkStatus::Active, dec!(300))),
        ]);

        let first = diff(&remote_map, &local_map, EPS);
        let second = diff(&remote_map, &local_map, EPS);
        assert_eq!(first, second);
        assert_eq!(first.creates.len(), 1);
        assert_eq!(first.updates.len(), 1);
        assert_eq!(first.removes.len(), 1);
    }
}
