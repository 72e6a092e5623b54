//! Durable sync events.
//!
//! One row per detected change. The partial unique index over
//! `(platform_name, external_id, change_type) WHERE status = 'pending'` is
//! the dedup primitive: the event writer inserts with conflict-ignore
//! semantics and concurrent runs cannot stack duplicate pending events.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{EventId, ExternalId, LinkId, ProductId, SyncRunId};
use super::platform::PlatformTag;
use super::status::UniversalStatus;

/// Classification of a detected change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Remote has a listing the local DB does not recognize.
    NewListing,
    /// Local DB has an active listing the remote no longer exposes.
    RemovedListing,
    /// Remote status differs from local outside the off-market class.
    StatusChange,
    /// Remote price differs from canonical by more than the epsilon.
    Price,
    /// Remote available quantity differs from local (stocked items only).
    QuantityChange,
}

impl ChangeType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NewListing => "new_listing",
            Self::RemovedListing => "removed_listing",
            Self::StatusChange => "status_change",
            Self::Price => "price",
            Self::QuantityChange => "quantity_change",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new_listing" => Ok(Self::NewListing),
            "removed_listing" => Ok(Self::RemovedListing),
            "status_change" => Ok(Self::StatusChange),
            "price" => Ok(Self::Price),
            "quantity_change" => Ok(Self::QuantityChange),
            other => Err(format!("unknown change type: {other}")),
        }
    }
}

/// Event lifecycle. `Pending` is the only state the dedup index guards;
/// `Processed`, `Error` and `Skipped` are terminal, `Partial` stays eligible
/// for retry on the next run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Processed,
    Partial,
    Error,
    Skipped,
}

impl EventStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Partial => "partial",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }

    /// Whether the reconciler should pick the event up again.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Partial)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processed" => Ok(Self::Processed),
            "partial" => Ok(Self::Partial),
            "error" => Ok(Self::Error),
            "skipped" => Ok(Self::Skipped),
            other => Err(format!("unknown event status: {other}")),
        }
    }
}

/// A suggested local product for a rogue listing, written by the match
/// suggester for operator review. The event keeps `product_id = NULL` until
/// a human (or a later run that finds the link confirmed) attaches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub product_id: ProductId,
    pub sku: String,
    pub title: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub status: String,
    pub base_price: Decimal,
    pub confidence: u8,
    pub reason: String,
    /// Platforms the candidate already has a link on.
    pub existing_platforms: Vec<PlatformTag>,
}

/// Typed payload carried in `change_data`, old/new values plus the raw
/// marketplace context captured at detection time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_status: Option<UniversalStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_status: Option<UniversalStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_quantity: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_quantity: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity_sold: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_candidate: Option<MatchCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    #[serde(skip_serializing_if = "serde_json::Value::is_null", default)]
    pub raw_data: serde_json::Value,
}

/// Per-platform outcome of one outbound attempt, recorded in event notes so
/// a later run can resume without redoing successful legs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Ok,
    /// Remote already reflected the desired state; no call was made or the
    /// call reported already-closed.
    AlreadyConsistent,
    Transient { message: String },
    Permanent { message: String },
    NotFound { message: String },
}

impl AttemptOutcome {
    /// Whether this leg needs no further work.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            Self::Ok | Self::AlreadyConsistent | Self::NotFound { .. }
        )
    }
}

/// Reconciliation trace persisted in the event's `notes` column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventNotes {
    /// One entry per target platform, keyed by platform tag.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attempts: BTreeMap<PlatformTag, AttemptOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub needs_review: bool,
}

impl EventNotes {
    #[must_use]
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Whether a previous run already settled the given leg.
    #[must_use]
    pub fn leg_settled(&self, platform: PlatformTag) -> bool {
        self.attempts
            .get(&platform)
            .is_some_and(AttemptOutcome::is_settled)
    }
}

/// A persisted sync event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub id: EventId,
    pub sync_run_id: SyncRunId,
    pub platform: PlatformTag,
    pub product_id: Option<ProductId>,
    pub link_id: Option<LinkId>,
    pub external_id: ExternalId,
    pub change_type: ChangeType,
    pub change_data: ChangeData,
    pub status: EventStatus,
    pub notes: EventNotes,
    pub detected_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl SyncEvent {
    /// Dedup key under the pending-unique-index.
    #[must_use]
    pub fn dedup_key(&self) -> (PlatformTag, ExternalId, ChangeType) {
        (self.platform, self.external_id.clone(), self.change_type)
    }
}

/// A detected change not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSyncEvent {
    pub sync_run_id: SyncRunId,
    pub platform: PlatformTag,
    pub product_id: Option<ProductId>,
    pub link_id: Option<LinkId>,
    pub external_id: ExternalId,
    pub change_type: ChangeType,
    pub change_data: ChangeData,
    pub detected_at: DateTime<Utc>,
}
