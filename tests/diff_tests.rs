//! Diff engine properties over realistic snapshots.

mod support;

use std::collections::BTreeMap;

use backline::core::diff::{diff, ListingChange};
use backline::core::domain::{ExternalId, LinkStatus, UniversalStatus};
use backline::testkit::domain::{local_row, product, remote_listing};
use rust_decimal_macros::dec;

const EPS: rust_decimal::Decimal = dec!(0.01);

#[test]
fn diff_depends_only_on_inputs() {
    let strat = product("REV-1001").build();
    let remote = BTreeMap::from([
        (
            ExternalId::new("A100"),
            remote_listing("A100").price(dec!(4500)).build(),
        ),
        (
            ExternalId::new("A200"),
            remote_listing("A200").status(UniversalStatus::Sold).build(),
        ),
    ]);
    let local = BTreeMap::from([(
        ExternalId::new("A100"),
        local_row(&strat, 1, "A100", LinkStatus::Active),
    )]);

    assert_eq!(diff(&remote, &local, EPS), diff(&remote, &local, EPS));
}

#[test]
fn no_ghost_creates_for_off_market_remotes() {
    for status in [
        UniversalStatus::Sold,
        UniversalStatus::Ended,
        UniversalStatus::Removed,
    ] {
        let remote = BTreeMap::from([(
            ExternalId::new("X9"),
            remote_listing("X9").status(status).build(),
        )]);
        let outcome = diff(&remote, &BTreeMap::new(), EPS);
        assert!(outcome.creates.is_empty(), "ghost create for {status:?}");
    }
}

#[test]
fn no_ghost_removes_for_inactive_locals() {
    let strat = product("REV-1001").build();
    for status in [
        LinkStatus::Sold,
        LinkStatus::Ended,
        LinkStatus::Removed,
        LinkStatus::Draft,
        LinkStatus::Refreshed,
    ] {
        let local = BTreeMap::from([(
            ExternalId::new("X9"),
            local_row(&strat, 1, "X9", status),
        )]);
        let outcome = diff(&BTreeMap::new(), &local, EPS);
        assert!(outcome.removes.is_empty(), "ghost remove for {status:?}");
    }
}

#[test]
fn off_market_statuses_never_differ() {
    let strat = product("REV-1001").build();
    for remote_status in [
        UniversalStatus::Sold,
        UniversalStatus::Ended,
        UniversalStatus::Removed,
    ] {
        for local_status in [LinkStatus::Sold, LinkStatus::Ended, LinkStatus::Removed] {
            let remote = BTreeMap::from([(
                ExternalId::new("A100"),
                remote_listing("A100")
                    .status(remote_status)
                    .price(dec!(1.00))
                    .build(),
            )]);
            let local = BTreeMap::from([(
                ExternalId::new("A100"),
                local_row(&strat, 1, "A100", local_status),
            )]);
            let outcome = diff(&remote, &local, EPS);
            assert!(
                outcome.updates.is_empty(),
                "{remote_status:?} vs {local_status:?} raised a change"
            );
        }
    }
}

#[test]
fn sale_detected_as_single_status_change() {
    let strat = product("REV-1001").build();
    let remote = BTreeMap::from([(
        ExternalId::new("A100"),
        remote_listing("A100")
            .status(UniversalStatus::Sold)
            // Drifted price must be ignored once the status changed.
            .price(dec!(1.00))
            .build(),
    )]);
    let local = BTreeMap::from([(
        ExternalId::new("A100"),
        local_row(&strat, 1, "A100", LinkStatus::Active),
    )]);

    let outcome = diff(&remote, &local, EPS);
    assert_eq!(outcome.updates.len(), 1);
    assert_eq!(
        outcome.updates[0].changes,
        vec![ListingChange::Status {
            old: UniversalStatus::Active,
            new: UniversalStatus::Sold,
        }]
    );
}

#[test]
fn stocked_item_quantity_and_price_fire_in_order() {
    let bag = product("BAG-1").stocked(5).price(dec!(49.99)).build();
    let remote = BTreeMap::from([(
        ExternalId::new("Q1"),
        remote_listing("Q1")
            .quantity(3)
            .price(dec!(44.99))
            .build(),
    )]);
    let local = BTreeMap::from([(
        ExternalId::new("Q1"),
        local_row(&bag, 1, "Q1", LinkStatus::Active),
    )]);

    let outcome = diff(&remote, &local, EPS);
    let changes = &outcome.updates[0].changes;
    assert_eq!(changes.len(), 2);
    assert!(matches!(changes[0], ListingChange::Quantity { old: 5, new: 3, .. }));
    assert!(matches!(changes[1], ListingChange::Price { .. }));
}

#[test]
fn mixed_snapshot_partitions_into_disjoint_sets() {
    let strat = product("REV-1001").build();
    let remote = BTreeMap::from([
        // Rogue active listing: create.
        (
            ExternalId::new("NEW-1"),
            remote_listing("NEW-1").build(),
        ),
        // Known listing with price drift: update.
        (
            ExternalId::new("A100"),
            remote_listing("A100").price(dec!(4000)).build(),
        ),
    ]);
    let local = BTreeMap::from([
        (
            ExternalId::new("A100"),
            local_row(&strat, 1, "A100", LinkStatus::Active),
        ),
        // Active locally, gone remotely: remove.
        (
            ExternalId::new("GONE-1"),
            local_row(&strat, 2, "GONE-1", LinkStatus::Active),
        ),
    ]);

    let outcome = diff(&remote, &local, EPS);
    assert_eq!(outcome.creates.len(), 1);
    assert_eq!(outcome.updates.len(), 1);
    assert_eq!(outcome.removes.len(), 1);
    assert_eq!(outcome.creates[0].external_id.as_str(), "NEW-1");
    assert_eq!(
        outcome.removes[0].external_id.as_ref().unwrap().as_str(),
        "GONE-1"
    );
}
