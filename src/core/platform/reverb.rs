//! Reverb adapter.
//!
//! JSON REST with a bearer token. Detection walks `/my/listings` pages;
//! outbound actions are listing PUTs plus the end-listing state transition.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::status::from_reverb_state;
use super::{
    normalize_price, CloseOutcome, CreateContext, CreateResult, EditResult, MarketplaceAdapter,
    ProductField, QuantityHints,
};
use crate::core::domain::{
    ExternalId, PlatformLink, PlatformTag, Product, RemoteListing, UniversalStatus,
};
use crate::error::{Error, Result};

/// Reverb API credentials.
#[derive(Debug, Clone)]
pub struct ReverbCredentials {
    pub api_url: String,
    pub api_token: String,
}

/// Operation-level REST transport.
#[async_trait]
pub trait ReverbClient: Send + Sync {
    async fn get_listings_page(&self, page: u32) -> Result<Value>;
    async fn update_listing(&self, external_id: &str, body: Value) -> Result<Value>;
    async fn end_listing(&self, external_id: &str, reason: &str) -> Result<Value>;
    async fn create_listing(&self, body: Value) -> Result<Value>;
}

/// Reqwest-backed Reverb client.
pub struct HttpReverbClient {
    credentials: ReverbCredentials,
    http: reqwest::Client,
}

impl HttpReverbClient {
    pub fn new(credentials: ReverbCredentials, http: reqwest::Client) -> Self {
        Self { credentials, http }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.credentials.api_url))
            .bearer_auth(&self.credentials.api_token)
            .header("Accept-Version", "3.0")
            .header("Content-Type", "application/hal+json")
    }
}

#[async_trait]
impl ReverbClient for HttpReverbClient {
    async fn get_listings_page(&self, page: u32) -> Result<Value> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/my/listings?state=all&per_page=50&page={page}"),
            )
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn update_listing(&self, external_id: &str, body: Value) -> Result<Value> {
        let response = self
            .request(reqwest::Method::PUT, &format!("/listings/{external_id}"))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn end_listing(&self, external_id: &str, reason: &str) -> Result<Value> {
        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("/my/listings/{external_id}/state/end"),
            )
            .json(&json!({ "reason": reason }))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn create_listing(&self, body: Value) -> Result<Value> {
        let response = self
            .request(reqwest::Method::POST, "/listings")
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Reverb marketplace adapter.
pub struct ReverbAdapter {
    client: Box<dyn ReverbClient>,
}

impl ReverbAdapter {
    pub fn new(client: Box<dyn ReverbClient>) -> Self {
        Self { client }
    }
}

fn listing_from_value(value: &Value) -> Option<RemoteListing> {
    let id = match value.get("id") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => return None,
    };

    let state = value
        .pointer("/state/slug")
        .and_then(Value::as_str)
        .unwrap_or("live");
    let price = value
        .pointer("/price/amount")
        .and_then(Value::as_str)
        .and_then(|amount| amount.parse::<Decimal>().ok())
        .unwrap_or_default();
    let inventory = value
        .get("inventory")
        .and_then(Value::as_i64)
        .map(|n| n as i32);
    let listing_url = value
        .pointer("/_links/web/href")
        .and_then(Value::as_str)
        .map(str::to_string);
    let title = value
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(RemoteListing {
        external_id: ExternalId::new(id),
        status: from_reverb_state(state),
        price: normalize_price(price),
        quantity_total: inventory,
        quantity_available: inventory,
        quantity_sold: None,
        title,
        listing_url,
        raw: value.clone(),
    })
}

fn is_already_ended(err: &Error) -> bool {
    match err {
        Error::NotFound(_) => true,
        Error::Permanent { reason } => {
            let reason = reason.to_lowercase();
            reason.contains("already ended") || reason.contains("state transition")
        }
        _ => false,
    }
}

#[async_trait]
impl MarketplaceAdapter for ReverbAdapter {
    fn platform(&self) -> PlatformTag {
        PlatformTag::Reverb
    }

    #[instrument(skip(self))]
    async fn fetch_all(&self) -> Result<Vec<RemoteListing>> {
        let mut listings = Vec::new();
        let mut page = 1;
        loop {
            let body = self.client.get_listings_page(page).await?;
            let page_listings = body
                .get("listings")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            debug!(page, count = page_listings.len(), "Fetched listings page");
            listings.extend(page_listings.iter().filter_map(listing_from_value));

            let total_pages = body
                .get("total_pages")
                .and_then(Value::as_u64)
                .unwrap_or(1) as u32;
            if page >= total_pages || page_listings.is_empty() {
                break;
            }
            page += 1;
        }
        Ok(listings)
    }

    async fn mark_as_sold(&self, external_id: &ExternalId) -> Result<CloseOutcome> {
        match self
            .client
            .end_listing(external_id.as_str(), "reverb_sale")
            .await
        {
            Ok(_) => Ok(CloseOutcome::Closed),
            Err(err) if is_already_ended(&err) => Ok(CloseOutcome::AlreadyClosed),
            Err(err) => Err(err),
        }
    }

    async fn update_price(&self, external_id: &ExternalId, new_price: Decimal) -> Result<()> {
        let body = json!({
            "price": {
                "amount": normalize_price(new_price).to_string(),
                "currency": "GBP",
            }
        });
        self.client
            .update_listing(external_id.as_str(), body)
            .await?;
        Ok(())
    }

    async fn update_quantity(
        &self,
        external_id: &ExternalId,
        quantity: i32,
        _hints: &QuantityHints,
    ) -> Result<()> {
        if quantity == 0 {
            return self.mark_as_sold(external_id).await.map(|_| ());
        }
        let body = json!({ "inventory": quantity, "has_inventory": true });
        self.client
            .update_listing(external_id.as_str(), body)
            .await?;
        Ok(())
    }

    async fn create_listing(
        &self,
        product: &Product,
        _context: &CreateContext,
    ) -> Result<CreateResult> {
        let mut photos: Vec<&str> = Vec::new();
        if let Some(primary) = product.primary_image.as_deref() {
            photos.push(primary);
        }
        photos.extend(product.additional_images.iter().map(String::as_str));

        let body = json!({
            "title": product.title,
            "description": product.description.clone().unwrap_or_default(),
            "make": product.brand,
            "model": product.model,
            "year": product.year.map(|y| y.to_string()),
            "finish": product.finish,
            "sku": product.sku,
            "condition": { "slug": reverb_condition_slug(product) },
            "price": {
                "amount": normalize_price(product.canonical_price()).to_string(),
                "currency": "GBP",
            },
            "inventory": product.quantity.max(1),
            "has_inventory": product.is_stocked_item,
            "photos": photos,
            "publish": true,
        });
        let response = self.client.create_listing(body).await?;
        let id = response
            .pointer("/listing/id")
            .or_else(|| response.get("id"))
            .map(|v| match v {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.clone(),
                _ => String::new(),
            })
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::permanent("listing creation returned no id"))?;
        let listing_url = response
            .pointer("/listing/_links/web/href")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(CreateResult {
            external_id: Some(ExternalId::new(id)),
            listing_url,
            status: UniversalStatus::Active,
        })
    }

    async fn apply_product_edit(
        &self,
        product: &Product,
        link: &PlatformLink,
        changed: &[ProductField],
    ) -> Result<EditResult> {
        let Some(external_id) = link.external_id.as_ref() else {
            return Err(Error::permanent("link has no external id to update"));
        };

        let mut body = serde_json::Map::new();
        let mut result = EditResult::default();
        for field in changed {
            match field {
                ProductField::Title => {
                    body.insert("title".into(), json!(product.title));
                    result.applied.push(*field);
                }
                ProductField::Description => {
                    body.insert(
                        "description".into(),
                        json!(product.description.clone().unwrap_or_default()),
                    );
                    result.applied.push(*field);
                }
                ProductField::Price => {
                    body.insert(
                        "price".into(),
                        json!({
                            "amount": normalize_price(product.canonical_price()).to_string(),
                            "currency": "GBP",
                        }),
                    );
                    result.applied.push(*field);
                }
                ProductField::Quantity => {
                    body.insert("inventory".into(), json!(product.quantity));
                    result.applied.push(*field);
                }
                ProductField::Condition => {
                    body.insert(
                        "condition".into(),
                        json!({ "slug": reverb_condition_slug(product) }),
                    );
                    result.applied.push(*field);
                }
                other => {
                    result
                        .skipped
                        .push((*other, "not updatable via listing PUT".to_string()));
                }
            }
        }

        if !result.applied.is_empty() {
            self.client
                .update_listing(external_id.as_str(), Value::Object(body))
                .await?;
        }
        Ok(result)
    }
}

fn reverb_condition_slug(product: &Product) -> &'static str {
    use crate::core::domain::Condition;
    match product.condition {
        Condition::New => "brand-new",
        Condition::Excellent => "excellent",
        Condition::VeryGood => "very-good",
        Condition::Good => "good",
        Condition::Fair => "fair",
        Condition::Poor => "poor",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[derive(Default)]
    struct ScriptedClient {
        pages: Mutex<Vec<Value>>,
        updates: Mutex<Vec<(String, Value)>>,
        ended: Mutex<Vec<String>>,
        end_error: Mutex<Option<Error>>,
    }

    #[async_trait]
    impl ReverbClient for Arc<ScriptedClient> {
        async fn get_listings_page(&self, _page: u32) -> Result<Value> {
            let mut pages = self.pages.lock();
            if pages.is_empty() {
                return Ok(json!({ "listings": [], "total_pages": 0 }));
            }
            Ok(pages.remove(0))
        }

        async fn update_listing(&self, external_id: &str, body: Value) -> Result<Value> {
            self.updates.lock().push((external_id.to_string(), body));
            Ok(json!({}))
        }

        async fn end_listing(&self, external_id: &str, _reason: &str) -> Result<Value> {
            if let Some(err) = self.end_error.lock().take() {
                return Err(err);
            }
            self.ended.lock().push(external_id.to_string());
            Ok(json!({}))
        }

        async fn create_listing(&self, _body: Value) -> Result<Value> {
            Ok(json!({ "listing": { "id": 91978708, "_links": { "web": { "href": "https://reverb.example/item/91978708" } } } }))
        }
    }

    fn listing_page() -> Value {
        json!({
            "listings": [
                {
                    "id": 91978708,
                    "title": "Fender Stratocaster 1965",
                    "state": { "slug": "live" },
                    "price": { "amount": "4999.00", "currency": "GBP" },
                    "inventory": 1,
                    "_links": { "web": { "href": "https://reverb.example/item/91978708" } }
                },
                {
                    "id": 91978709,
                    "title": "Sold amp",
                    "state": { "slug": "sold_out" },
                    "price": { "amount": "800.00", "currency": "GBP" }
                }
            ],
            "total_pages": 1,
            "current_page": 1
        })
    }

    fn adapter() -> (Arc<ScriptedClient>, ReverbAdapter) {
        let client = Arc::new(ScriptedClient::default());
        let adapter = ReverbAdapter::new(Box::new(Arc::clone(&client)));
        (client, adapter)
    }

    #[tokio::test]
    async fn fetch_all_translates_states_and_prices() {
        let (client, adapter) = adapter();
        client.pages.lock().push(listing_page());

        let listings = adapter.fetch_all().await.unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].status, UniversalStatus::Active);
        assert_eq!(listings[0].price, dec!(4999.00));
        assert_eq!(listings[0].quantity_available, Some(1));
        assert_eq!(listings[1].status, UniversalStatus::Sold);
        assert!(listings[0].raw.get("state").is_some());
    }

    #[tokio::test]
    async fn update_price_puts_gbp_amount() {
        let (client, adapter) = adapter();
        adapter
            .update_price(&ExternalId::new("B200"), dec!(1500.00))
            .await
            .unwrap();
        let updates = client.updates.lock();
        assert_eq!(updates[0].0, "B200");
        assert_eq!(updates[0].1["price"]["amount"], "1500.00");
        assert_eq!(updates[0].1["price"]["currency"], "GBP");
    }

    #[tokio::test]
    async fn mark_as_sold_maps_state_transition_error() {
        let (client, adapter) = adapter();
        *client.end_error.lock() = Some(Error::permanent(
            "Invalid state transition: listing already ended",
        ));
        let outcome = adapter
            .mark_as_sold(&ExternalId::new("B200"))
            .await
            .unwrap();
        assert_eq!(outcome, CloseOutcome::AlreadyClosed);
    }

    #[tokio::test]
    async fn quantity_zero_ends_listing() {
        let (client, adapter) = adapter();
        adapter
            .update_quantity(&ExternalId::new("B200"), 0, &QuantityHints::default())
            .await
            .unwrap();
        assert_eq!(client.ended.lock().as_slice(), ["B200"]);
    }

    #[tokio::test]
    async fn create_listing_returns_new_external_id() {
        let (_, adapter) = adapter();
        let product = crate::testkit::domain::product("REV-77").build();
        let result = adapter
            .create_listing(&product, &CreateContext::default())
            .await
            .unwrap();
        assert_eq!(result.external_id.unwrap().as_str(), "91978708");
        assert!(result.listing_url.is_some());
    }
}
