//! Per-marketplace listing links and denormalized listing detail.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ExternalId, LinkId, ProductId};
use super::platform::PlatformTag;
use super::status::UniversalStatus;

/// Canonical view of what a marketplace currently shows for a product.
///
/// `Refreshed` is an import-time marker; such links are excluded from
/// update/remove candidacy during detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Active,
    Sold,
    Ended,
    Draft,
    Removed,
    Refreshed,
}

impl LinkStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Sold => "sold",
            Self::Ended => "ended",
            Self::Draft => "draft",
            Self::Removed => "removed",
            Self::Refreshed => "refreshed",
        }
    }

    /// Project onto the universal vocabulary for equivalence checks against
    /// remote statuses. `Refreshed` reads as draft-like and never matches an
    /// on-market remote state.
    #[must_use]
    pub const fn as_universal(&self) -> UniversalStatus {
        match self {
            Self::Active => UniversalStatus::Active,
            Self::Sold => UniversalStatus::Sold,
            Self::Ended => UniversalStatus::Ended,
            Self::Draft | Self::Refreshed => UniversalStatus::Draft,
            Self::Removed => UniversalStatus::Removed,
        }
    }
}

impl From<UniversalStatus> for LinkStatus {
    fn from(status: UniversalStatus) -> Self {
        match status {
            UniversalStatus::Active => Self::Active,
            UniversalStatus::Sold => Self::Sold,
            UniversalStatus::Ended => Self::Ended,
            UniversalStatus::Draft => Self::Draft,
            UniversalStatus::Removed => Self::Removed,
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "sold" => Ok(Self::Sold),
            "ended" => Ok(Self::Ended),
            "draft" => Ok(Self::Draft),
            "removed" => Ok(Self::Removed),
            "refreshed" => Ok(Self::Refreshed),
            other => Err(format!("unknown link status: {other}")),
        }
    }
}

/// Outcome of the last outbound synchronization attempt for a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

/// Association between one product and one marketplace. At most one link
/// exists per (product, platform) pair; links are never deleted, only
/// transitioned to `Removed`/`Ended`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformLink {
    pub id: LinkId,
    pub product_id: ProductId,
    pub platform: PlatformTag,
    /// Nullable while a listing is being created on the marketplace.
    pub external_id: Option<ExternalId>,
    pub status: LinkStatus,
    pub listing_url: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
    /// Opaque marketplace-specific context (policy overrides, template ids).
    pub platform_specific_data: serde_json::Value,
}

impl PlatformLink {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == LinkStatus::Active
    }
}

/// A link that has not been persisted yet, discovered or pushed this run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPlatformLink {
    pub product_id: ProductId,
    pub platform: PlatformTag,
    pub external_id: Option<ExternalId>,
    pub status: LinkStatus,
    pub listing_url: Option<String>,
    pub sync_status: SyncStatus,
    pub platform_specific_data: serde_json::Value,
}

/// Marketplace-specific denormalized listing detail, one-to-one with a link.
/// Shared columns are typed; the remainder of the marketplace payload is
/// preserved verbatim in `raw_snapshot` for audit and later enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformListing {
    pub link_id: LinkId,
    pub platform: PlatformTag,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub secondary_category_id: Option<String>,
    pub shipping_policy_id: Option<String>,
    pub payment_policy_id: Option<String>,
    pub return_policy_id: Option<String>,
    pub picture_urls: Vec<String>,
    pub raw_snapshot: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}
