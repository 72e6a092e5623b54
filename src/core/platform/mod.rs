//! Marketplace adapters.
//!
//! One implementation per marketplace, each encapsulating the marketplace's
//! transport, authentication and payload shapes behind the uniform
//! [`MarketplaceAdapter`] contract. Adapters translate every native status
//! token into the universal vocabulary, normalize prices to two-decimal GBP,
//! paginate transparently, and preserve raw payloads for event capture.
//! Outbound calls are individually idempotent: repeating a successful call
//! is a no-op, and "already closed" responses to a close intent are success.

mod ebay;
mod reverb;
mod shopify;
pub mod status;
mod vr;

pub use ebay::{EbayAdapter, EbayCredentials, EbayTradingClient, HttpEbayClient};
pub use reverb::{HttpReverbClient, ReverbAdapter, ReverbClient, ReverbCredentials};
pub use shopify::{HttpShopifyClient, ShopifyAdapter, ShopifyClient, ShopifyCredentials};
pub use vr::{HttpVrClient, VrAdapter, VrClient, VrCredentials};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::core::domain::{
    ExternalId, PlatformLink, PlatformTag, Product, RemoteListing, UniversalStatus,
};
use crate::error::Result;

/// Result of a close intent (mark-as-sold or end-listing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The call closed the listing.
    Closed,
    /// The remote had already reached the desired state by other means.
    AlreadyClosed,
}

/// Quantity context passed alongside an absolute quantity update, for
/// marketplaces that want totals rather than availability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuantityHints {
    pub quantity_total: Option<i32>,
    pub quantity_sold: Option<i32>,
}

/// Marketplace policy overrides for listing creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyOverrides {
    pub shipping_policy_id: Option<String>,
    pub payment_policy_id: Option<String>,
    pub return_policy_id: Option<String>,
}

/// Enrichment context for creating a listing, typically sourced from the
/// marketplace the product was first discovered on.
#[derive(Debug, Clone, Default)]
pub struct CreateContext {
    pub source_platform: Option<PlatformTag>,
    /// Raw payload from the originating marketplace, used for category and
    /// shipping enrichment.
    pub source_raw: serde_json::Value,
    pub policies: PolicyOverrides,
}

/// Outcome of a successful listing creation. Some marketplaces assign the
/// listing identifier asynchronously; the external id stays `None` until a
/// later detection pass discovers it.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateResult {
    pub external_id: Option<ExternalId>,
    pub listing_url: Option<String>,
    pub status: UniversalStatus,
}

/// Canonical product fields an edit can touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductField {
    Title,
    Description,
    Price,
    Quantity,
    Images,
    Category,
    Condition,
}

impl fmt::Display for ProductField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::Price => "price",
            Self::Quantity => "quantity",
            Self::Images => "images",
            Self::Category => "category",
            Self::Condition => "condition",
        };
        f.write_str(name)
    }
}

/// Outcome of pushing a product edit to one marketplace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditResult {
    pub applied: Vec<ProductField>,
    /// Fields the marketplace could not take, with the reason.
    pub skipped: Vec<(ProductField, String)>,
}

/// Uniform detection + action contract, one implementation per marketplace.
#[async_trait]
pub trait MarketplaceAdapter: Send + Sync {
    fn platform(&self) -> PlatformTag;

    /// Full remote snapshot as a single slice, pagination handled inside.
    async fn fetch_all(&self) -> Result<Vec<RemoteListing>>;

    async fn mark_as_sold(&self, external_id: &ExternalId) -> Result<CloseOutcome>;

    async fn update_price(&self, external_id: &ExternalId, new_price: Decimal) -> Result<()>;

    /// Set the available quantity. Single-quantity marketplaces accept only
    /// the zero case, which ends the listing.
    async fn update_quantity(
        &self,
        external_id: &ExternalId,
        quantity: i32,
        hints: &QuantityHints,
    ) -> Result<()>;

    async fn create_listing(
        &self,
        product: &Product,
        context: &CreateContext,
    ) -> Result<CreateResult>;

    async fn apply_product_edit(
        &self,
        product: &Product,
        link: &PlatformLink,
        changed: &[ProductField],
    ) -> Result<EditResult>;
}

/// Adapter registry owned by the coordinator and injected at startup.
/// Components never look adapters up by name at runtime; they receive the
/// registry as a constructor argument.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<PlatformTag, Arc<dyn MarketplaceAdapter>>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn MarketplaceAdapter>) {
        self.adapters.insert(adapter.platform(), adapter);
    }

    #[must_use]
    pub fn get(&self, platform: PlatformTag) -> Option<Arc<dyn MarketplaceAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    /// Enabled platforms in stable order.
    #[must_use]
    pub fn platforms(&self) -> Vec<PlatformTag> {
        self.adapters.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlatformTag, Arc<dyn MarketplaceAdapter>)> + '_ {
        self.adapters.iter().map(|(tag, a)| (*tag, Arc::clone(a)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Round a marketplace price to the canonical two-decimal representation.
#[must_use]
pub fn normalize_price(price: Decimal) -> Decimal {
    price.round_dp(2)
}
