//! Vintage & Rare adapter.
//!
//! The marketplace has no API: a form-post login establishes a session
//! cookie, the inventory is scraped from an HTML table, and outbound
//! actions are form submissions against the seller dashboard. Listings are
//! single-quantity; the only quantity update the adapter accepts is the
//! zero case, executed as an end-listing form.

use async_trait::async_trait;
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use serde_json::json;
use tracing::{debug, instrument, warn};

use super::status::from_vr_state;
use super::{
    normalize_price, CloseOutcome, CreateContext, CreateResult, EditResult, MarketplaceAdapter,
    ProductField, QuantityHints,
};
use crate::core::domain::{
    ExternalId, PlatformLink, PlatformTag, Product, RemoteListing, UniversalStatus,
};
use crate::error::{Error, Result};

/// Dashboard credentials.
#[derive(Debug, Clone)]
pub struct VrCredentials {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

/// Session-based form transport. `login` must be called before any other
/// operation; implementations keep the session cookie internally.
#[async_trait]
pub trait VrClient: Send + Sync {
    async fn login(&self) -> Result<()>;
    /// The seller's inventory page as HTML.
    async fn download_inventory(&self) -> Result<String>;
    /// Submit a dashboard form, returning the response body.
    async fn submit_form(&self, path: &str, fields: &[(String, String)]) -> Result<String>;
}

/// Reqwest-backed session client with a cookie store.
pub struct HttpVrClient {
    credentials: VrCredentials,
    http: reqwest::Client,
}

impl HttpVrClient {
    /// The client must be built with a cookie store so the login session
    /// persists across calls.
    pub fn new(credentials: VrCredentials, http: reqwest::Client) -> Self {
        Self { credentials, http }
    }
}

#[async_trait]
impl VrClient for HttpVrClient {
    async fn login(&self) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/do_login", self.credentials.base_url))
            .form(&[
                ("username", self.credentials.username.as_str()),
                ("pass", self.credentials.password.as_str()),
                ("open_where", "header"),
            ])
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        if body.contains("login_error") || body.contains("Invalid username") {
            return Err(Error::permanent("authentication rejected"));
        }
        Ok(())
    }

    async fn download_inventory(&self) -> Result<String> {
        let response = self
            .http
            .get(format!(
                "{}/instruments/show_all",
                self.credentials.base_url
            ))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    async fn submit_form(&self, path: &str, fields: &[(String, String)]) -> Result<String> {
        let response = self
            .http
            .post(format!("{}{path}", self.credentials.base_url))
            .form(fields)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}

/// Parse the inventory table. Expected row shape:
///
/// ```html
/// <tr class="inventory-row" data-item-id="12345">
///   <td class="item-title"><a href="/instruments/12345">1965 Strat</a></td>
///   <td class="item-price">£4,999</td>
///   <td class="item-status">active</td>
/// </tr>
/// ```
///
/// Hrefs in the table are site-relative; they are resolved against
/// `base_url` so the stored listing URL is absolute.
fn parse_inventory(html: &str, base_url: &str) -> Result<Vec<RemoteListing>> {
    let document = Html::parse_document(html);
    let row_selector = Selector::parse("tr.inventory-row")
        .map_err(|e| Error::permanent(format!("bad row selector: {e}")))?;
    let title_selector = Selector::parse("td.item-title a")
        .map_err(|e| Error::permanent(format!("bad title selector: {e}")))?;
    let price_selector = Selector::parse("td.item-price")
        .map_err(|e| Error::permanent(format!("bad price selector: {e}")))?;
    let status_selector = Selector::parse("td.item-status")
        .map_err(|e| Error::permanent(format!("bad status selector: {e}")))?;

    let mut listings = Vec::new();
    for row in document.select(&row_selector) {
        let Some(item_id) = row.value().attr("data-item-id").filter(|id| !id.is_empty())
        else {
            warn!("Inventory row without item id, skipping");
            continue;
        };

        let title_el = row.select(&title_selector).next();
        let title = title_el
            .map(|a| a.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        let listing_url = title_el
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| resolve_listing_url(base_url, href));
        let price_text = row
            .select(&price_selector)
            .next()
            .map(|td| td.text().collect::<String>())
            .unwrap_or_default();
        let state = row
            .select(&status_selector)
            .next()
            .map(|td| td.text().collect::<String>().trim().to_lowercase())
            .unwrap_or_else(|| "active".to_string());

        let price = parse_price(&price_text);

        listings.push(RemoteListing {
            external_id: ExternalId::new(item_id),
            status: from_vr_state(&state),
            price: normalize_price(price),
            quantity_total: None,
            quantity_available: None,
            quantity_sold: None,
            title: title.clone(),
            listing_url,
            raw: json!({
                "vr_id": item_id,
                "title": title,
                "price": price_text.trim(),
                "state": state,
            }),
        });
    }
    Ok(listings)
}

fn parse_price(text: &str) -> Decimal {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse().unwrap_or_default()
}

fn resolve_listing_url(base_url: &str, href: &str) -> Option<String> {
    let base = url::Url::parse(base_url).ok()?;
    base.join(href).ok().map(String::from)
}

/// Vintage & Rare marketplace adapter.
pub struct VrAdapter {
    client: Box<dyn VrClient>,
    base_url: String,
}

impl VrAdapter {
    pub fn new(client: Box<dyn VrClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn end_listing(&self, external_id: &ExternalId) -> Result<CloseOutcome> {
        self.client.login().await?;
        let body = self
            .client
            .submit_form(
                "/instruments/mark_sold",
                &[("item_id".to_string(), external_id.as_str().to_string())],
            )
            .await?;
        if body.contains("already sold") || body.contains("not found") {
            return Ok(CloseOutcome::AlreadyClosed);
        }
        if body.contains("error") {
            return Err(Error::permanent(format!(
                "mark sold rejected for item {external_id}"
            )));
        }
        Ok(CloseOutcome::Closed)
    }
}

#[async_trait]
impl MarketplaceAdapter for VrAdapter {
    fn platform(&self) -> PlatformTag {
        PlatformTag::Vr
    }

    #[instrument(skip(self))]
    async fn fetch_all(&self) -> Result<Vec<RemoteListing>> {
        self.client.login().await?;
        let html = self.client.download_inventory().await?;
        let listings = parse_inventory(&html, &self.base_url)?;
        debug!(count = listings.len(), "Scraped inventory table");
        Ok(listings)
    }

    async fn mark_as_sold(&self, external_id: &ExternalId) -> Result<CloseOutcome> {
        self.end_listing(external_id).await
    }

    async fn update_price(&self, external_id: &ExternalId, new_price: Decimal) -> Result<()> {
        self.client.login().await?;
        self.client
            .submit_form(
                "/instruments/edit_price",
                &[
                    ("item_id".to_string(), external_id.as_str().to_string()),
                    (
                        "price".to_string(),
                        normalize_price(new_price).to_string(),
                    ),
                ],
            )
            .await?;
        Ok(())
    }

    async fn update_quantity(
        &self,
        external_id: &ExternalId,
        quantity: i32,
        _hints: &QuantityHints,
    ) -> Result<()> {
        match quantity {
            0 => self.end_listing(external_id).await.map(|_| ()),
            1 => Ok(()),
            n => Err(Error::permanent(format!(
                "single-quantity marketplace cannot hold {n} units"
            ))),
        }
    }

    async fn create_listing(
        &self,
        product: &Product,
        _context: &CreateContext,
    ) -> Result<CreateResult> {
        self.client.login().await?;
        let mut fields = vec![
            ("brand".to_string(), product.brand.clone().unwrap_or_default()),
            ("model".to_string(), product.model.clone().unwrap_or_default()),
            (
                "year".to_string(),
                product.year.map(|y| y.to_string()).unwrap_or_default(),
            ),
            ("finish".to_string(), product.finish.clone().unwrap_or_default()),
            (
                "description".to_string(),
                product.description.clone().unwrap_or_default(),
            ),
            (
                "price".to_string(),
                normalize_price(product.canonical_price()).to_string(),
            ),
            ("sku".to_string(), product.sku.clone()),
        ];
        for (index, url) in product
            .primary_image
            .iter()
            .chain(product.additional_images.iter())
            .enumerate()
        {
            fields.push((format!("image_{index}"), url.clone()));
        }

        let body = self.client.submit_form("/instruments/add", &fields).await?;
        // Listing ids are assigned asynchronously; the next detection pass
        // links the new listing once it appears in the inventory table.
        let external_id = extract_item_id(&body).map(ExternalId::new);
        Ok(CreateResult {
            external_id,
            listing_url: None,
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
            return Err(Error::permanent("link has no external id to edit"));
        };
        self.client.login().await?;

        let mut fields = vec![("item_id".to_string(), external_id.as_str().to_string())];
        let mut result = EditResult::default();
        for field in changed {
            match field {
                ProductField::Title | ProductField::Description => {
                    fields.push((
                        "description".to_string(),
                        product.description.clone().unwrap_or_default(),
                    ));
                    result.applied.push(*field);
                }
                ProductField::Price => {
                    fields.push((
                        "price".to_string(),
                        normalize_price(product.canonical_price()).to_string(),
                    ));
                    result.applied.push(*field);
                }
                other => {
                    result
                        .skipped
                        .push((*other, "not editable via dashboard form".to_string()));
                }
            }
        }

        if !result.applied.is_empty() {
            self.client.submit_form("/instruments/edit", &fields).await?;
        }
        Ok(result)
    }
}

fn extract_item_id(body: &str) -> Option<String> {
    let marker = "data-item-id=\"";
    let start = body.find(marker)? + marker.len();
    let end = body[start..].find('"')? + start;
    let id = &body[start..end];
    (!id.is_empty()).then(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[derive(Default)]
    struct ScriptedClient {
        inventory: Mutex<String>,
        forms: Mutex<Vec<(String, Vec<(String, String)>)>>,
        form_response: Mutex<String>,
        logins: Mutex<u32>,
    }

    #[async_trait]
    impl VrClient for Arc<ScriptedClient> {
        async fn login(&self) -> Result<()> {
            *self.logins.lock() += 1;
            Ok(())
        }

        async fn download_inventory(&self) -> Result<String> {
            Ok(self.inventory.lock().clone())
        }

        async fn submit_form(
            &self,
            path: &str,
            fields: &[(String, String)],
        ) -> Result<String> {
            self.forms.lock().push((path.to_string(), fields.to_vec()));
            Ok(self.form_response.lock().clone())
        }
    }

    fn adapter() -> (Arc<ScriptedClient>, VrAdapter) {
        let client = Arc::new(ScriptedClient::default());
        let adapter = VrAdapter::new(
            Box::new(Arc::clone(&client)),
            "https://www.vintageandrare.example",
        );
        (client, adapter)
    }

    const INVENTORY_HTML: &str = r#"
        <html><body><table>
        <tr class="inventory-row" data-item-id="D400">
          <td class="item-title"><a href="/instruments/D400">1959 Les Paul</a></td>
          <td class="item-price">£28,500</td>
          <td class="item-status">active</td>
        </tr>
        <tr class="inventory-row" data-item-id="D401">
          <td class="item-title"><a href="/instruments/D401">Sold bass</a></td>
          <td class="item-price">£1,200.50</td>
          <td class="item-status">sold</td>
        </tr>
        </table></body></html>"#;

    #[tokio::test]
    async fn fetch_all_scrapes_inventory_table() {
        let (client, adapter) = adapter();
        *client.inventory.lock() = INVENTORY_HTML.to_string();

        let listings = adapter.fetch_all().await.unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].external_id.as_str(), "D400");
        assert_eq!(listings[0].status, UniversalStatus::Active);
        assert_eq!(listings[0].price, dec!(28500.00));
        assert_eq!(listings[0].title, "1959 Les Paul");
        assert_eq!(
            listings[0].listing_url.as_deref(),
            Some("https://www.vintageandrare.example/instruments/D400")
        );
        assert_eq!(listings[1].status, UniversalStatus::Sold);
        assert_eq!(listings[1].price, dec!(1200.50));
        assert_eq!(*client.logins.lock(), 1);
    }

    #[tokio::test]
    async fn mark_as_sold_submits_form() {
        let (client, adapter) = adapter();
        let outcome = adapter
            .mark_as_sold(&ExternalId::new("D400"))
            .await
            .unwrap();
        assert_eq!(outcome, CloseOutcome::Closed);
        let forms = client.forms.lock();
        assert_eq!(forms[0].0, "/instruments/mark_sold");
        assert_eq!(forms[0].1[0], ("item_id".to_string(), "D400".to_string()));
    }

    #[tokio::test]
    async fn already_sold_is_idempotent_success() {
        let (client, adapter) = adapter();
        *client.form_response.lock() = "item already sold".to_string();
        let outcome = adapter
            .mark_as_sold(&ExternalId::new("D400"))
            .await
            .unwrap();
        assert_eq!(outcome, CloseOutcome::AlreadyClosed);
    }

    #[tokio::test]
    async fn multi_quantity_update_is_rejected() {
        let (_, adapter) = adapter();
        let err = adapter
            .update_quantity(&ExternalId::new("D400"), 3, &QuantityHints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Permanent { .. }));
    }

    #[tokio::test]
    async fn quantity_zero_ends_listing() {
        let (client, adapter) = adapter();
        adapter
            .update_quantity(&ExternalId::new("D400"), 0, &QuantityHints::default())
            .await
            .unwrap();
        assert_eq!(client.forms.lock()[0].0, "/instruments/mark_sold");
    }

    #[test]
    fn price_parsing_strips_currency_formatting() {
        assert_eq!(parse_price("£4,999"), dec!(4999));
        assert_eq!(parse_price(" £1,200.50 "), dec!(1200.50));
        assert_eq!(parse_price(""), dec!(0));
    }
}
