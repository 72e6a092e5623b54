//! Builders for domain fixtures.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::core::domain::{
    ChangeData, ChangeType, Condition, EventId, EventNotes, EventStatus, ExternalId, LinkId,
    LinkStatus, PlatformTag, Product, ProductId, ProductStatus, RemoteListing, SyncEvent,
    SyncRunId, SyncStatus, UniversalStatus,
};
use crate::core::store::LocalListingRow;

/// Start building a product with sensible vintage-shop defaults.
#[must_use]
pub fn product(sku: &str) -> ProductBuilder {
    ProductBuilder {
        inner: Product {
            id: ProductId::new(1),
            sku: sku.to_string(),
            title: "1965 Fender Stratocaster Sunburst".into(),
            description: Some("Player-grade vintage Strat.".into()),
            brand: Some("Fender".into()),
            model: Some("Stratocaster".into()),
            year: Some(1965),
            finish: Some("Sunburst".into()),
            category: Some("Electric Guitars".into()),
            condition: Condition::Excellent,
            base_price: dec!(4999.00),
            specialist_price: None,
            quantity: 1,
            is_stocked_item: false,
            primary_image: None,
            additional_images: vec![],
            status: ProductStatus::Active,
            manufacturing_country: Some("US".into()),
            shipping_profile_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        },
    }
}

pub struct ProductBuilder {
    inner: Product,
}

impl ProductBuilder {
    #[must_use]
    pub fn id(mut self, id: i32) -> Self {
        self.inner.id = ProductId::new(id);
        self
    }

    #[must_use]
    pub fn title(mut self, title: &str) -> Self {
        self.inner.title = title.to_string();
        self
    }

    #[must_use]
    pub fn brand(mut self, brand: &str) -> Self {
        self.inner.brand = Some(brand.to_string());
        self
    }

    #[must_use]
    pub fn model(mut self, model: &str) -> Self {
        self.inner.model = Some(model.to_string());
        self
    }

    #[must_use]
    pub fn year(mut self, year: i32) -> Self {
        self.inner.year = Some(year);
        self
    }

    #[must_use]
    pub fn price(mut self, price: Decimal) -> Self {
        self.inner.base_price = price;
        self
    }

    #[must_use]
    pub fn specialist_price(mut self, price: Decimal) -> Self {
        self.inner.specialist_price = Some(price);
        self
    }

    #[must_use]
    pub fn stocked(mut self, quantity: i32) -> Self {
        self.inner.is_stocked_item = true;
        self.inner.quantity = quantity;
        self
    }

    #[must_use]
    pub fn status(mut self, status: ProductStatus) -> Self {
        self.inner.status = status;
        self
    }

    #[must_use]
    pub fn build(self) -> Product {
        self.inner
    }
}

/// Start building a remote listing snapshot.
#[must_use]
pub fn remote_listing(external_id: &str) -> RemoteListingBuilder {
    RemoteListingBuilder {
        inner: RemoteListing {
            external_id: ExternalId::new(external_id),
            status: UniversalStatus::Active,
            price: dec!(4999.00),
            quantity_total: None,
            quantity_available: None,
            quantity_sold: None,
            title: "1965 Fender Stratocaster Sunburst".into(),
            listing_url: None,
            raw: serde_json::Value::Null,
        },
    }
}

pub struct RemoteListingBuilder {
    inner: RemoteListing,
}

impl RemoteListingBuilder {
    #[must_use]
    pub fn status(mut self, status: UniversalStatus) -> Self {
        self.inner.status = status;
        self
    }

    #[must_use]
    pub fn price(mut self, price: Decimal) -> Self {
        self.inner.price = price;
        self
    }

    #[must_use]
    pub fn title(mut self, title: &str) -> Self {
        self.inner.title = title.to_string();
        self
    }

    #[must_use]
    pub fn quantity(mut self, available: i32) -> Self {
        self.inner.quantity_available = Some(available);
        self
    }

    #[must_use]
    pub fn quantity_sold(mut self, sold: i32) -> Self {
        self.inner.quantity_sold = Some(sold);
        self
    }

    #[must_use]
    pub fn url(mut self, url: &str) -> Self {
        self.inner.listing_url = Some(url.to_string());
        self
    }

    #[must_use]
    pub fn build(self) -> RemoteListing {
        self.inner
    }
}

/// A local snapshot row derived from a product and link state.
#[must_use]
pub fn local_row(
    product: &Product,
    link_id: i32,
    external_id: &str,
    link_status: LinkStatus,
) -> LocalListingRow {
    LocalListingRow {
        product_id: product.id,
        link_id: LinkId::new(link_id),
        sku: product.sku.clone(),
        title: product.title.clone(),
        brand: product.brand.clone(),
        model: product.model.clone(),
        year: product.year,
        external_id: Some(ExternalId::new(external_id)),
        link_status,
        sync_status: SyncStatus::Synced,
        listing_url: None,
        canonical_price: product.canonical_price(),
        quantity: product.quantity,
        is_stocked_item: product.is_stocked_item,
        product_status: product.status,
    }
}

/// A pending sync event with empty change data.
#[must_use]
pub fn sync_event(
    run_id: SyncRunId,
    platform: PlatformTag,
    external_id: &str,
    change_type: ChangeType,
) -> SyncEvent {
    SyncEvent {
        id: EventId::new(1),
        sync_run_id: run_id,
        platform,
        product_id: None,
        link_id: None,
        external_id: ExternalId::new(external_id),
        change_type,
        change_data: ChangeData::default(),
        status: EventStatus::Pending,
        notes: EventNotes::default(),
        detected_at: Utc::now(),
        processed_at: None,
    }
}
