//! eBay adapter.
//!
//! Speaks the legacy trading-call XML envelope: `GetMyeBaySelling` for
//! detection across the active/sold/unsold lists, `ReviseItem` for price and
//! quantity, `EndItem` for close intents and `AddFixedPriceItem` for new
//! listings. The wire transport is abstracted behind [`EbayTradingClient`]
//! so tests can script responses.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::status::from_ebay_list;
use super::{
    normalize_price, CloseOutcome, CreateContext, CreateResult, EditResult, MarketplaceAdapter,
    ProductField, QuantityHints,
};
use crate::core::domain::{
    ExternalId, PlatformLink, PlatformTag, Product, RemoteListing, UniversalStatus,
};
use crate::error::{Error, Result};

const ENTRIES_PER_PAGE: u32 = 200;
const COMPATIBILITY_LEVEL: &str = "1193";

/// Trading API credentials.
#[derive(Debug, Clone)]
pub struct EbayCredentials {
    pub api_url: String,
    pub auth_token: String,
    pub site_id: String,
}

/// Raw trading-call transport. Implementations add the authentication
/// headers and return the response envelope verbatim.
#[async_trait]
pub trait EbayTradingClient: Send + Sync {
    async fn call(&self, call_name: &str, request_xml: &str) -> Result<String>;
}

/// Reqwest-backed trading client.
pub struct HttpEbayClient {
    credentials: EbayCredentials,
    http: reqwest::Client,
}

impl HttpEbayClient {
    pub fn new(credentials: EbayCredentials, http: reqwest::Client) -> Self {
        Self { credentials, http }
    }
}

#[async_trait]
impl EbayTradingClient for HttpEbayClient {
    async fn call(&self, call_name: &str, request_xml: &str) -> Result<String> {
        let response = self
            .http
            .post(&self.credentials.api_url)
            .header("X-EBAY-API-CALL-NAME", call_name)
            .header("X-EBAY-API-COMPATIBILITY-LEVEL", COMPATIBILITY_LEVEL)
            .header("X-EBAY-API-SITEID", &self.credentials.site_id)
            .header("X-EBAY-API-IAF-TOKEN", &self.credentials.auth_token)
            .header("Content-Type", "text/xml")
            .body(request_xml.to_string())
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}

// --- response envelope ---

#[derive(Debug, Clone, Deserialize, Serialize)]
struct CurrencyAmount {
    #[serde(rename = "currencyID", default)]
    currency: Option<String>,
    #[serde(rename = "$value", default)]
    value: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct SellingStatus {
    #[serde(rename = "CurrentPrice")]
    current_price: Option<CurrencyAmount>,
    #[serde(rename = "QuantitySold")]
    quantity_sold: Option<String>,
    #[serde(rename = "ListingStatus")]
    listing_status: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct ListingDetails {
    #[serde(rename = "ViewItemURL")]
    view_item_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct TradingItem {
    #[serde(rename = "ItemID")]
    item_id: Option<String>,
    #[serde(rename = "Title", default)]
    title: String,
    #[serde(rename = "Quantity")]
    quantity: Option<String>,
    #[serde(rename = "QuantityAvailable")]
    quantity_available: Option<String>,
    #[serde(rename = "SellingStatus")]
    selling_status: Option<SellingStatus>,
    #[serde(rename = "ListingDetails")]
    listing_details: Option<ListingDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ItemArray {
    #[serde(rename = "Item", default)]
    items: Vec<TradingItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct Transaction {
    #[serde(rename = "Item")]
    item: Option<TradingItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct OrderTransactionArray {
    #[serde(rename = "OrderTransaction", default)]
    transactions: Vec<OrderTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
struct OrderTransaction {
    #[serde(rename = "Transaction")]
    transaction: Option<Transaction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PaginationResult {
    #[serde(rename = "TotalNumberOfPages")]
    total_pages: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ListContainer {
    #[serde(rename = "ItemArray", default)]
    item_array: ItemArray,
    #[serde(rename = "OrderTransactionArray", default)]
    order_transactions: OrderTransactionArray,
    #[serde(rename = "PaginationResult", default)]
    pagination: PaginationResult,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorEntry {
    #[serde(rename = "ErrorCode")]
    code: Option<String>,
    #[serde(rename = "LongMessage", default)]
    long_message: String,
    #[serde(rename = "SeverityCode", default)]
    severity: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TradingResponse {
    #[serde(rename = "Ack", default)]
    ack: String,
    #[serde(rename = "Errors", default)]
    errors: Vec<ErrorEntry>,
    #[serde(rename = "ActiveList")]
    active_list: Option<ListContainer>,
    #[serde(rename = "SoldList")]
    sold_list: Option<ListContainer>,
    #[serde(rename = "UnsoldList")]
    unsold_list: Option<ListContainer>,
    #[serde(rename = "ItemID")]
    item_id: Option<String>,
}

fn parse_response(xml: &str) -> Result<TradingResponse> {
    serde_xml_rs::from_str(xml)
        .map_err(|e| Error::permanent(format!("malformed trading response: {e}")))
}

fn parse_count(raw: &Option<String>) -> Option<i32> {
    raw.as_deref().and_then(|v| v.trim().parse().ok())
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// The trading API reports "already closed" as a hard error; for a close
/// intent that is success by other means. Codes 1046 and 1047 both carry
/// that meaning, and the message wording varies ("has already been
/// closed", "auction already closed"), so match the bare substring.
fn is_already_closed(errors: &[ErrorEntry]) -> bool {
    errors.iter().any(|e| {
        matches!(e.code.as_deref(), Some("1046") | Some("1047"))
            || e.long_message.to_lowercase().contains("already closed")
            || e.long_message.to_lowercase().contains("already been closed")
            || e.long_message.to_lowercase().contains("already ended")
    })
}

fn check_ack(response: &TradingResponse, intent: &str) -> Result<()> {
    if response.ack == "Success" || response.ack == "Warning" {
        return Ok(());
    }
    let message = response
        .errors
        .iter()
        .map(|e| e.long_message.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    if response
        .errors
        .iter()
        .any(|e| e.severity == "SeriousError" || e.code.as_deref() == Some("931"))
    {
        // 931: auth token invalid.
        return Err(Error::permanent(format!("{intent} rejected: {message}")));
    }
    if message.to_lowercase().contains("not found")
        || message.to_lowercase().contains("invalid item id")
    {
        return Err(Error::NotFound(message));
    }
    Err(Error::permanent(format!("{intent} failed: {message}")))
}

/// eBay marketplace adapter.
pub struct EbayAdapter {
    client: Box<dyn EbayTradingClient>,
}

impl EbayAdapter {
    pub fn new(client: Box<dyn EbayTradingClient>) -> Self {
        Self { client }
    }

    fn selling_request(list: &str, page: u32) -> String {
        let container = match list {
            "active" => "ActiveList",
            "sold" => "SoldList",
            _ => "UnsoldList",
        };
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <GetMyeBaySellingRequest xmlns=\"urn:ebay:apis:eBLBaseComponents\">\
             <{container}><Include>true</Include>\
             <Pagination><EntriesPerPage>{ENTRIES_PER_PAGE}</EntriesPerPage>\
             <PageNumber>{page}</PageNumber></Pagination>\
             </{container}>\
             <DetailLevel>ReturnAll</DetailLevel>\
             </GetMyeBaySellingRequest>"
        )
    }

    async fn fetch_list(&self, list: &str) -> Result<Vec<RemoteListing>> {
        let mut listings = Vec::new();
        let mut page = 1;
        loop {
            let xml = self
                .client
                .call("GetMyeBaySelling", &Self::selling_request(list, page))
                .await?;
            let response = parse_response(&xml)?;
            check_ack(&response, "GetMyeBaySelling")?;

            let container = match list {
                "active" => response.active_list,
                "sold" => response.sold_list,
                _ => response.unsold_list,
            }
            .unwrap_or_default();

            let mut items = container.item_array.items;
            items.extend(
                container
                    .order_transactions
                    .transactions
                    .into_iter()
                    .filter_map(|ot| ot.transaction.and_then(|t| t.item)),
            );

            let total_pages = parse_count(&container.pagination.total_pages).unwrap_or(1);
            debug!(list, page, items = items.len(), total_pages, "Fetched trading page");

            for item in items {
                if let Some(listing) = to_remote_listing(list, item)? {
                    listings.push(listing);
                }
            }

            if page as i32 >= total_pages {
                break;
            }
            page += 1;
        }
        Ok(listings)
    }
}

fn to_remote_listing(list: &str, item: TradingItem) -> Result<Option<RemoteListing>> {
    let Some(item_id) = item.item_id.clone().filter(|id| !id.is_empty()) else {
        return Ok(None);
    };

    let quantity_total = parse_count(&item.quantity);
    let quantity_available = parse_count(&item.quantity_available);
    let quantity_sold = item
        .selling_status
        .as_ref()
        .and_then(|s| parse_count(&s.quantity_sold));

    let price = item
        .selling_status
        .as_ref()
        .and_then(|s| s.current_price.as_ref())
        .and_then(|p| p.value.trim().parse::<Decimal>().ok())
        .unwrap_or_default();

    let listing_url = item
        .listing_details
        .as_ref()
        .and_then(|d| d.view_item_url.clone());

    let raw = serde_json::to_value(&item)?;

    Ok(Some(RemoteListing {
        external_id: ExternalId::new(item_id),
        status: from_ebay_list(list),
        price: normalize_price(price),
        quantity_total,
        quantity_available,
        quantity_sold,
        title: item.title,
        listing_url,
        raw,
    }))
}

#[async_trait]
impl MarketplaceAdapter for EbayAdapter {
    fn platform(&self) -> PlatformTag {
        PlatformTag::Ebay
    }

    #[instrument(skip(self))]
    async fn fetch_all(&self) -> Result<Vec<RemoteListing>> {
        let mut listings = self.fetch_list("active").await?;
        listings.extend(self.fetch_list("sold").await?);
        listings.extend(self.fetch_list("unsold").await?);
        Ok(listings)
    }

    async fn mark_as_sold(&self, external_id: &ExternalId) -> Result<CloseOutcome> {
        let request = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <EndItemRequest xmlns=\"urn:ebay:apis:eBLBaseComponents\">\
             <ItemID>{}</ItemID><EndingReason>NotAvailable</EndingReason>\
             </EndItemRequest>",
            xml_escape(external_id.as_str())
        );
        let xml = self.client.call("EndItem", &request).await?;
        let response = parse_response(&xml)?;
        if response.ack != "Success" && is_already_closed(&response.errors) {
            return Ok(CloseOutcome::AlreadyClosed);
        }
        match check_ack(&response, "EndItem") {
            Ok(()) => Ok(CloseOutcome::Closed),
            // The listing being gone means the desired state holds.
            Err(Error::NotFound(_)) => Ok(CloseOutcome::AlreadyClosed),
            Err(e) => Err(e),
        }
    }

    async fn update_price(&self, external_id: &ExternalId, new_price: Decimal) -> Result<()> {
        let request = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <ReviseItemRequest xmlns=\"urn:ebay:apis:eBLBaseComponents\">\
             <Item><ItemID>{}</ItemID><StartPrice>{}</StartPrice></Item>\
             </ReviseItemRequest>",
            xml_escape(external_id.as_str()),
            normalize_price(new_price)
        );
        let xml = self.client.call("ReviseItem", &request).await?;
        check_ack(&parse_response(&xml)?, "ReviseItem")
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
        let request = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <ReviseItemRequest xmlns=\"urn:ebay:apis:eBLBaseComponents\">\
             <Item><ItemID>{}</ItemID><Quantity>{quantity}</Quantity></Item>\
             </ReviseItemRequest>",
            xml_escape(external_id.as_str())
        );
        let xml = self.client.call("ReviseItem", &request).await?;
        check_ack(&parse_response(&xml)?, "ReviseItem")
    }

    async fn create_listing(
        &self,
        product: &Product,
        context: &CreateContext,
    ) -> Result<CreateResult> {
        let category_id = context
            .source_raw
            .pointer("/categories/0/ebay_id")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("33034");
        let shipping_profile = context
            .policies
            .shipping_policy_id
            .as_deref()
            .unwrap_or_default();

        let mut pictures = String::new();
        for url in product
            .primary_image
            .iter()
            .chain(product.additional_images.iter())
        {
            pictures.push_str(&format!("<PictureURL>{}</PictureURL>", xml_escape(url)));
        }

        let request = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <AddFixedPriceItemRequest xmlns=\"urn:ebay:apis:eBLBaseComponents\">\
             <Item>\
             <Title>{title}</Title>\
             <Description>{description}</Description>\
             <PrimaryCategory><CategoryID>{category_id}</CategoryID></PrimaryCategory>\
             <StartPrice>{price}</StartPrice>\
             <Quantity>{quantity}</Quantity>\
             <SKU>{sku}</SKU>\
             <Country>GB</Country><Currency>GBP</Currency>\
             <ListingDuration>GTC</ListingDuration>\
             <SellerProfiles><SellerShippingProfile><ShippingProfileID>{shipping_profile}</ShippingProfileID></SellerShippingProfile></SellerProfiles>\
             <PictureDetails>{pictures}</PictureDetails>\
             </Item>\
             </AddFixedPriceItemRequest>",
            title = xml_escape(&product.title),
            description = xml_escape(product.description.as_deref().unwrap_or(&product.title)),
            price = normalize_price(product.canonical_price()),
            quantity = product.quantity.max(1),
            sku = xml_escape(&product.sku),
        );
        let xml = self.client.call("AddFixedPriceItem", &request).await?;
        let response = parse_response(&xml)?;
        check_ack(&response, "AddFixedPriceItem")?;
        let item_id = response
            .item_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::permanent("AddFixedPriceItem returned no ItemID"))?;
        Ok(CreateResult {
            external_id: Some(ExternalId::new(item_id)),
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
            return Err(Error::permanent("link has no external id to revise"));
        };

        let mut fields = String::new();
        let mut result = EditResult::default();
        for field in changed {
            match field {
                ProductField::Title => {
                    fields.push_str(&format!("<Title>{}</Title>", xml_escape(&product.title)));
                    result.applied.push(*field);
                }
                ProductField::Description => {
                    fields.push_str(&format!(
                        "<Description>{}</Description>",
                        xml_escape(product.description.as_deref().unwrap_or_default())
                    ));
                    result.applied.push(*field);
                }
                ProductField::Price => {
                    fields.push_str(&format!(
                        "<StartPrice>{}</StartPrice>",
                        normalize_price(product.canonical_price())
                    ));
                    result.applied.push(*field);
                }
                ProductField::Quantity => {
                    fields.push_str(&format!("<Quantity>{}</Quantity>", product.quantity));
                    result.applied.push(*field);
                }
                other => {
                    result
                        .skipped
                        .push((*other, "not revisable via ReviseItem".to_string()));
                }
            }
        }

        if result.applied.is_empty() {
            return Ok(result);
        }

        let request = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <ReviseItemRequest xmlns=\"urn:ebay:apis:eBLBaseComponents\">\
             <Item><ItemID>{}</ItemID>{fields}</Item>\
             </ReviseItemRequest>",
            xml_escape(external_id.as_str())
        );
        let xml = self.client.call("ReviseItem", &request).await?;
        check_ack(&parse_response(&xml)?, "ReviseItem")?;
        Ok(result)
    }
}
