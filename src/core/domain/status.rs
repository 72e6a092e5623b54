//! Universal listing status vocabulary.
//!
//! Every marketplace-specific status token is translated into this closed set
//! at the adapter boundary; the diff engine never sees raw tokens.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Normalized status of a remote listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UniversalStatus {
    Active,
    Sold,
    Ended,
    Draft,
    Removed,
}

impl UniversalStatus {
    /// Whether the status is in the off-market equivalence class. Two
    /// off-market statuses are treated as equal by the diff engine: a
    /// listing that is sold on the remote and ended locally has not
    /// changed in any way the reconciler cares about.
    #[must_use]
    pub const fn is_off_market(&self) -> bool {
        matches!(self, Self::Sold | Self::Ended | Self::Removed)
    }

    /// Equality under the off-market equivalence class.
    #[must_use]
    pub fn equivalent(self, other: Self) -> bool {
        self == other || (self.is_off_market() && other.is_off_market())
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Sold => "sold",
            Self::Ended => "ended",
            Self::Draft => "draft",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for UniversalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UniversalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "sold" => Ok(Self::Sold),
            "ended" => Ok(Self::Ended),
            "draft" => Ok(Self::Draft),
            // Legacy tokens from older snapshots collapse into the class
            // they belong to.
            "removed" | "deleted" | "archived" => Ok(Self::Removed),
            other => Err(format!("unknown universal status: {other}")),
        }
    }
}
