//! Reconciliation decision types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::domain::{EventNotes, ExternalId, PlatformTag, ProductId, SyncEvent};
use crate::core::platform::QuantityHints;

/// Which side owns the price when canonical and remote disagree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceAuthority {
    /// Canonical price wins; remote drift is restored.
    #[default]
    Canonical,
    /// The drifted remote price becomes canonical and propagates outward.
    LastWriterWins,
    /// Each marketplace prices independently; drift is recorded, nothing
    /// propagates.
    PerPlatform,
}

/// One outbound marketplace call decided by the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundAction {
    MarkSold {
        platform: PlatformTag,
        external_id: ExternalId,
    },
    UpdatePrice {
        platform: PlatformTag,
        external_id: ExternalId,
        price: Decimal,
    },
    UpdateQuantity {
        platform: PlatformTag,
        external_id: ExternalId,
        quantity: i32,
        hints: QuantityHints,
    },
    CreateListing {
        platform: PlatformTag,
        product_id: ProductId,
    },
}

impl OutboundAction {
    /// The marketplace this action targets.
    #[must_use]
    pub const fn platform(&self) -> PlatformTag {
        match self {
            Self::MarkSold { platform, .. }
            | Self::UpdatePrice { platform, .. }
            | Self::UpdateQuantity { platform, .. }
            | Self::CreateListing { platform, .. } => *platform,
        }
    }

    /// Short label for logs and per-action stats.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MarkSold { .. } => "mark_sold",
            Self::UpdatePrice { .. } => "update_price",
            Self::UpdateQuantity { .. } => "update_quantity",
            Self::CreateListing { .. } => "create_listing",
        }
    }

    /// Whether a NotFound from the marketplace counts as reaching the
    /// desired state (close intents) or as drift for the next detection
    /// pass (price/quantity intents).
    #[must_use]
    pub const fn not_found_is_success(&self) -> bool {
        matches!(self, Self::MarkSold { .. })
    }
}

/// One event with its decided outbound legs, ready for dispatch.
#[derive(Debug, Clone)]
pub struct EventPlan {
    pub event: SyncEvent,
    /// Notes carried forward from earlier attempts, already containing the
    /// settled legs a retry must not redo.
    pub notes: EventNotes,
    pub actions: Vec<OutboundAction>,
}

/// All dispatchable work for one canonical product. Actions for the same
/// product run sequentially in plan order; different products may run in
/// parallel.
#[derive(Debug, Clone)]
pub struct ProductPlan {
    pub product_id: Option<ProductId>,
    pub plans: Vec<EventPlan>,
}

/// Output of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Work queued for the dispatcher.
    pub product_plans: Vec<ProductPlan>,
    /// Events settled without any outbound call, by terminal status.
    pub resolved_processed: u32,
    pub resolved_skipped: u32,
    pub resolved_error: u32,
    /// Events intentionally left pending (rogue listings awaiting an
    /// operator).
    pub left_pending: u32,
    pub sales: u32,
    pub price_changes: u32,
    pub quantity_changes: u32,
    pub listings_removed: u32,
    pub listings_linked: u32,
}

impl ReconcileReport {
    /// Total outbound actions queued.
    #[must_use]
    pub fn queued_actions(&self) -> usize {
        self.product_plans
            .iter()
            .flat_map(|p| &p.plans)
            .map(|plan| plan.actions.len())
            .sum()
    }
}
