//! Marketplace tags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The four marketplaces the seller lists on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformTag {
    /// Auction marketplace, legacy XML trading-call transport.
    Ebay,
    /// Music-gear marketplace, JSON REST.
    Reverb,
    /// E-commerce storefront, GraphQL admin API.
    Shopify,
    /// Vintage & Rare, form-post plus scraped HTML.
    Vr,
}

impl PlatformTag {
    /// All platforms in stable order.
    pub const ALL: [Self; 4] = [Self::Ebay, Self::Reverb, Self::Shopify, Self::Vr];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ebay => "ebay",
            Self::Reverb => "reverb",
            Self::Shopify => "shopify",
            Self::Vr => "vr",
        }
    }

    /// Whether the marketplace supports listings with quantity greater
    /// than one. Single-quantity marketplaces only accept the
    /// quantity-zero (end listing) case of a quantity update.
    #[must_use]
    pub const fn supports_multi_quantity(&self) -> bool {
        !matches!(self, Self::Vr)
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ebay" => Ok(Self::Ebay),
            "reverb" => Ok(Self::Reverb),
            "shopify" => Ok(Self::Shopify),
            "vr" | "vintageandrare" => Ok(Self::Vr),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}
