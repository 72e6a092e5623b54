//! Database model types for Diesel ORM.
//!
//! Rows store decimals, timestamps and JSON as text (RFC 3339 for times);
//! conversions to domain types live here so the store implementation stays
//! mechanical. A stored row that fails to parse is an invariant violation
//! and surfaces as a fatal error.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use super::schema::{platform_links, platform_listings, product_mappings, products, sync_events, sync_runs};
use crate::core::domain::{
    ChangeData, Condition, EventId, EventNotes, EventStatus, ExternalId, LinkId, LinkStatus,
    NewPlatformLink, NewSyncEvent, PlatformLink, PlatformListing, PlatformTag, Product, ProductId,
    ProductStatus, RunState, RunSummary, SyncEvent, SyncRun, SyncRunId, SyncStatus,
};
use crate::error::{Error, Result};

fn parse_fatal<T, E: std::fmt::Display>(
    what: &str,
    value: std::result::Result<T, E>,
) -> Result<T> {
    value.map_err(|e| Error::Fatal(format!("corrupt {what} in database: {e}")))
}

pub(crate) fn parse_decimal(what: &str, raw: &str) -> Result<Decimal> {
    parse_fatal(what, Decimal::from_str(raw))
}

pub(crate) fn parse_timestamp(what: &str, raw: &str) -> Result<DateTime<Utc>> {
    parse_fatal(what, DateTime::parse_from_rfc3339(raw)).map(|dt| dt.with_timezone(&Utc))
}

/// Database row for a product.
#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = products)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProductRow {
    pub id: i32,
    pub sku: String,
    pub title: String,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub finish: Option<String>,
    pub category: Option<String>,
    pub condition: String,
    pub base_price: String,
    pub specialist_price: Option<String>,
    pub quantity: i32,
    pub is_stocked_item: bool,
    pub primary_image: Option<String>,
    pub additional_images: String,
    pub status: String,
    pub manufacturing_country: Option<String>,
    pub shipping_profile_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ProductRow {
    pub fn from_domain(product: &Product) -> Result<Self> {
        Ok(Self {
            id: product.id.value(),
            sku: product.sku.clone(),
            title: product.title.clone(),
            description: product.description.clone(),
            brand: product.brand.clone(),
            model: product.model.clone(),
            year: product.year,
            finish: product.finish.clone(),
            category: product.category.clone(),
            condition: product.condition.as_str().to_string(),
            base_price: product.base_price.to_string(),
            specialist_price: product.specialist_price.map(|p| p.to_string()),
            quantity: product.quantity,
            is_stocked_item: product.is_stocked_item,
            primary_image: product.primary_image.clone(),
            additional_images: serde_json::to_string(&product.additional_images)?,
            status: product.status.as_str().to_string(),
            manufacturing_country: product.manufacturing_country.clone(),
            shipping_profile_id: product.shipping_profile_id.clone(),
            created_at: product.created_at.to_rfc3339(),
            updated_at: product.updated_at.to_rfc3339(),
        })
    }

    pub fn into_domain(self) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(self.id),
            condition: parse_fatal("condition", Condition::from_str(&self.condition))?,
            base_price: parse_decimal("base_price", &self.base_price)?,
            specialist_price: self
                .specialist_price
                .as_deref()
                .map(|p| parse_decimal("specialist_price", p))
                .transpose()?,
            additional_images: parse_fatal(
                "additional_images",
                serde_json::from_str(&self.additional_images),
            )?,
            status: parse_fatal("product status", ProductStatus::from_str(&self.status))?,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
            sku: self.sku,
            title: self.title,
            description: self.description,
            brand: self.brand,
            model: self.model,
            year: self.year,
            finish: self.finish,
            category: self.category,
            quantity: self.quantity,
            is_stocked_item: self.is_stocked_item,
            primary_image: self.primary_image,
            manufacturing_country: self.manufacturing_country,
            shipping_profile_id: self.shipping_profile_id,
        })
    }
}

/// Database row for a platform link.
#[derive(Queryable, Selectable, AsChangeset, Debug, Clone)]
#[diesel(table_name = platform_links)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PlatformLinkRow {
    pub id: i32,
    pub product_id: i32,
    pub platform_name: String,
    pub external_id: Option<String>,
    pub status: String,
    pub listing_url: Option<String>,
    pub last_sync: Option<String>,
    pub sync_status: String,
    pub platform_specific_data: String,
}

impl PlatformLinkRow {
    pub fn from_domain(link: &PlatformLink) -> Result<Self> {
        Ok(Self {
            id: link.id.value(),
            product_id: link.product_id.value(),
            platform_name: link.platform.as_str().to_string(),
            external_id: link.external_id.as_ref().map(|e| e.as_str().to_string()),
            status: link.status.as_str().to_string(),
            listing_url: link.listing_url.clone(),
            last_sync: link.last_sync.map(|t| t.to_rfc3339()),
            sync_status: link.sync_status.as_str().to_string(),
            platform_specific_data: serde_json::to_string(&link.platform_specific_data)?,
        })
    }

    pub fn into_domain(self) -> Result<PlatformLink> {
        Ok(PlatformLink {
            id: LinkId::new(self.id),
            product_id: ProductId::new(self.product_id),
            platform: parse_fatal("platform", PlatformTag::from_str(&self.platform_name))?,
            external_id: self.external_id.map(ExternalId::new),
            status: parse_fatal("link status", LinkStatus::from_str(&self.status))?,
            listing_url: self.listing_url,
            last_sync: self
                .last_sync
                .as_deref()
                .map(|t| parse_timestamp("last_sync", t))
                .transpose()?,
            sync_status: parse_fatal("sync status", SyncStatus::from_str(&self.sync_status))?,
            platform_specific_data: parse_fatal(
                "platform_specific_data",
                serde_json::from_str(&self.platform_specific_data),
            )?,
        })
    }
}

/// Insertable row for a newly discovered or pushed link.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = platform_links)]
pub struct NewPlatformLinkRow {
    pub product_id: i32,
    pub platform_name: String,
    pub external_id: Option<String>,
    pub status: String,
    pub listing_url: Option<String>,
    pub last_sync: Option<String>,
    pub sync_status: String,
    pub platform_specific_data: String,
}

impl NewPlatformLinkRow {
    pub fn from_domain(link: &NewPlatformLink) -> Result<Self> {
        Ok(Self {
            product_id: link.product_id.value(),
            platform_name: link.platform.as_str().to_string(),
            external_id: link.external_id.as_ref().map(|e| e.as_str().to_string()),
            status: link.status.as_str().to_string(),
            listing_url: link.listing_url.clone(),
            last_sync: None,
            sync_status: link.sync_status.as_str().to_string(),
            platform_specific_data: serde_json::to_string(&link.platform_specific_data)?,
        })
    }
}

/// Database row for marketplace-specific listing detail.
#[derive(Queryable, Selectable, AsChangeset, Debug, Clone)]
#[diesel(table_name = platform_listings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PlatformListingRow {
    pub id: i32,
    pub link_id: i32,
    pub platform_name: String,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub secondary_category_id: Option<String>,
    pub shipping_policy_id: Option<String>,
    pub payment_policy_id: Option<String>,
    pub return_policy_id: Option<String>,
    pub picture_urls: String,
    pub raw_snapshot: String,
    pub updated_at: String,
}

/// Insertable row for listing detail.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = platform_listings)]
pub struct NewPlatformListingRow {
    pub link_id: i32,
    pub platform_name: String,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub secondary_category_id: Option<String>,
    pub shipping_policy_id: Option<String>,
    pub payment_policy_id: Option<String>,
    pub return_policy_id: Option<String>,
    pub picture_urls: String,
    pub raw_snapshot: String,
    pub updated_at: String,
}

impl NewPlatformListingRow {
    pub fn from_domain(listing: &PlatformListing) -> Result<Self> {
        Ok(Self {
            link_id: listing.link_id.value(),
            platform_name: listing.platform.as_str().to_string(),
            category_id: listing.category_id.clone(),
            category_name: listing.category_name.clone(),
            secondary_category_id: listing.secondary_category_id.clone(),
            shipping_policy_id: listing.shipping_policy_id.clone(),
            payment_policy_id: listing.payment_policy_id.clone(),
            return_policy_id: listing.return_policy_id.clone(),
            picture_urls: serde_json::to_string(&listing.picture_urls)?,
            raw_snapshot: serde_json::to_string(&listing.raw_snapshot)?,
            updated_at: listing.updated_at.to_rfc3339(),
        })
    }
}

/// Database row for a sync run.
#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = sync_runs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncRunRow {
    pub id: String,
    pub state: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub summary: String,
}

impl SyncRunRow {
    pub fn from_domain(run: &SyncRun) -> Result<Self> {
        Ok(Self {
            id: run.id.to_string(),
            state: run.state.as_str().to_string(),
            started_at: run.started_at.to_rfc3339(),
            finished_at: run.finished_at.map(|t| t.to_rfc3339()),
            summary: serde_json::to_string(&run.summary)?,
        })
    }

    pub fn into_domain(self) -> Result<SyncRun> {
        let id = SyncRunId::parse(&self.id)
            .ok_or_else(|| Error::Fatal(format!("corrupt sync run id: {}", self.id)))?;
        Ok(SyncRun {
            id,
            state: parse_fatal("run state", RunState::from_str(&self.state))?,
            started_at: parse_timestamp("started_at", &self.started_at)?,
            finished_at: self
                .finished_at
                .as_deref()
                .map(|t| parse_timestamp("finished_at", t))
                .transpose()?,
            summary: parse_fatal::<RunSummary, _>(
                "run summary",
                serde_json::from_str(&self.summary),
            )?,
        })
    }
}

/// Database row for a sync event (queryable).
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = sync_events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncEventRow {
    pub id: i32,
    pub sync_run_id: String,
    pub platform_name: String,
    pub product_id: Option<i32>,
    pub platform_link_id: Option<i32>,
    pub external_id: String,
    pub change_type: String,
    pub change_data: String,
    pub status: String,
    pub notes: String,
    pub detected_at: String,
    pub processed_at: Option<String>,
}

impl SyncEventRow {
    pub fn into_domain(self) -> Result<SyncEvent> {
        let sync_run_id = SyncRunId::parse(&self.sync_run_id)
            .ok_or_else(|| Error::Fatal(format!("corrupt sync run id: {}", self.sync_run_id)))?;
        Ok(SyncEvent {
            id: EventId::new(self.id),
            sync_run_id,
            platform: parse_fatal("platform", PlatformTag::from_str(&self.platform_name))?,
            product_id: self.product_id.map(ProductId::new),
            link_id: self.platform_link_id.map(LinkId::new),
            external_id: ExternalId::new(self.external_id),
            change_type: parse_fatal("change type", self.change_type.parse())?,
            change_data: parse_fatal::<ChangeData, _>(
                "change_data",
                serde_json::from_str(&self.change_data),
            )?,
            status: parse_fatal("event status", EventStatus::from_str(&self.status))?,
            notes: parse_fatal::<EventNotes, _>("notes", serde_json::from_str(&self.notes))?,
            detected_at: parse_timestamp("detected_at", &self.detected_at)?,
            processed_at: self
                .processed_at
                .as_deref()
                .map(|t| parse_timestamp("processed_at", t))
                .transpose()?,
        })
    }
}

/// Database row for a sync event (insertable).
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = sync_events)]
pub struct NewSyncEventRow {
    pub sync_run_id: String,
    pub platform_name: String,
    pub product_id: Option<i32>,
    pub platform_link_id: Option<i32>,
    pub external_id: String,
    pub change_type: String,
    pub change_data: String,
    pub status: String,
    pub notes: String,
    pub detected_at: String,
    pub processed_at: Option<String>,
}

impl NewSyncEventRow {
    pub fn from_domain(event: &NewSyncEvent) -> Result<Self> {
        Ok(Self {
            sync_run_id: event.sync_run_id.to_string(),
            platform_name: event.platform.as_str().to_string(),
            product_id: event.product_id.map(|p| p.value()),
            platform_link_id: event.link_id.map(|l| l.value()),
            external_id: event.external_id.as_str().to_string(),
            change_type: event.change_type.as_str().to_string(),
            change_data: serde_json::to_string(&event.change_data)?,
            status: EventStatus::Pending.as_str().to_string(),
            notes: serde_json::to_string(&EventNotes::default())?,
            detected_at: event.detected_at.to_rfc3339(),
            processed_at: None,
        })
    }
}

/// Database row for a product-mapping hint.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = product_mappings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProductMappingRow {
    pub id: i32,
    pub master_product_id: i32,
    pub related_product_id: i32,
    pub match_confidence: Option<f32>,
    pub match_method: Option<String>,
    pub created_at: String,
}
