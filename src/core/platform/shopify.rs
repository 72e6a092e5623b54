//! Shopify adapter.
//!
//! GraphQL admin API with an access token. Detection pages the products
//! connection by cursor; outbound actions resolve the product's GIDs first
//! and then issue the matching mutation. Shopify has no sold status, so
//! close intents zero the on-hand inventory and the status translation
//! reads zero-inventory ACTIVE products as sold.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::status::from_shopify_status;
use super::{
    normalize_price, CloseOutcome, CreateContext, CreateResult, EditResult, MarketplaceAdapter,
    ProductField, QuantityHints,
};
use crate::core::domain::{
    ExternalId, PlatformLink, PlatformTag, Product, RemoteListing, UniversalStatus,
};
use crate::error::{Error, Result};

const PAGE_SIZE: u32 = 50;

/// Admin API credentials.
#[derive(Debug, Clone)]
pub struct ShopifyCredentials {
    /// `https://{shop}.myshopify.com/admin/api/{version}`
    pub api_url: String,
    pub access_token: String,
}

/// GraphQL transport.
#[async_trait]
pub trait ShopifyClient: Send + Sync {
    async fn graphql(&self, query: &str, variables: Value) -> Result<Value>;
}

/// Reqwest-backed GraphQL client.
pub struct HttpShopifyClient {
    credentials: ShopifyCredentials,
    http: reqwest::Client,
}

impl HttpShopifyClient {
    pub fn new(credentials: ShopifyCredentials, http: reqwest::Client) -> Self {
        Self { credentials, http }
    }
}

#[async_trait]
impl ShopifyClient for HttpShopifyClient {
    async fn graphql(&self, query: &str, variables: Value) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}/graphql.json", self.credentials.api_url))
            .header("X-Shopify-Access-Token", &self.credentials.access_token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?
            .error_for_status()?;
        let body: Value = response.json().await?;
        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let message = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("; ");
                let throttled = errors.iter().any(|e| {
                    e.pointer("/extensions/code").and_then(Value::as_str) == Some("THROTTLED")
                });
                return Err(if throttled {
                    Error::Transient(message)
                } else {
                    Error::permanent(message)
                });
            }
        }
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}

const PRODUCTS_QUERY: &str = "\
query Products($cursor: String, $pageSize: Int!) {\n\
  products(first: $pageSize, after: $cursor) {\n\
    pageInfo { hasNextPage endCursor }\n\
    nodes {\n\
      id\n\
      legacyResourceId\n\
      title\n\
      status\n\
      totalInventory\n\
      onlineStoreUrl\n\
      variants(first: 1) { nodes { id price inventoryQuantity inventoryItem { id } } }\n\
    }\n\
  }\n\
}";

const PRODUCT_GIDS_QUERY: &str = "\
query ProductGids($query: String!) {\n\
  products(first: 1, query: $query) {\n\
    nodes {\n\
      id\n\
      totalInventory\n\
      variants(first: 1) { nodes { id inventoryItem { id } } }\n\
    }\n\
  }\n\
}";

const LOCATIONS_QUERY: &str = "\
query Locations {\n\
  locations(first: 1) { nodes { id } }\n\
}";

struct ResolvedProduct {
    product_gid: String,
    variant_gid: String,
    inventory_item_gid: String,
    total_inventory: Option<i32>,
}

/// Shopify marketplace adapter.
pub struct ShopifyAdapter {
    client: Box<dyn ShopifyClient>,
}

impl ShopifyAdapter {
    pub fn new(client: Box<dyn ShopifyClient>) -> Self {
        Self { client }
    }

    async fn resolve(&self, external_id: &ExternalId) -> Result<ResolvedProduct> {
        let data = self
            .client
            .graphql(
                PRODUCT_GIDS_QUERY,
                json!({ "query": format!("id:{}", external_id) }),
            )
            .await?;
        let node = data
            .pointer("/products/nodes/0")
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("product {external_id} not on shopify")))?;
        let product_gid = node
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::permanent("product node missing id"))?
            .to_string();
        let variant_gid = node
            .pointer("/variants/nodes/0/id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::permanent("product has no variants"))?
            .to_string();
        let inventory_item_gid = node
            .pointer("/variants/nodes/0/inventoryItem/id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::permanent("variant has no inventory item"))?
            .to_string();
        Ok(ResolvedProduct {
            product_gid,
            variant_gid,
            inventory_item_gid,
            total_inventory: node
                .get("totalInventory")
                .and_then(Value::as_i64)
                .map(|n| n as i32),
        })
    }

    async fn primary_location(&self) -> Result<String> {
        let data = self.client.graphql(LOCATIONS_QUERY, json!({})).await?;
        data.pointer("/locations/nodes/0/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::permanent("shop has no locations"))
    }

    async fn set_on_hand(&self, external_id: &ExternalId, quantity: i32) -> Result<()> {
        let resolved = self.resolve(external_id).await?;
        let location = self.primary_location().await?;
        let data = self
            .client
            .graphql(
                "mutation SetOnHand($input: InventorySetOnHandQuantitiesInput!) {\n\
                 inventorySetOnHandQuantities(input: $input) { userErrors { field message } }\n\
                 }",
                json!({
                    "input": {
                        "reason": "correction",
                        "setQuantities": [{
                            "inventoryItemId": resolved.inventory_item_gid,
                            "locationId": location,
                            "quantity": quantity,
                        }],
                    }
                }),
            )
            .await?;
        check_user_errors(&data, "/inventorySetOnHandQuantities/userErrors")
    }
}

fn check_user_errors(data: &Value, pointer: &str) -> Result<()> {
    let errors = data.pointer(pointer).and_then(Value::as_array);
    match errors {
        Some(errors) if !errors.is_empty() => {
            let message = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("; ");
            Err(Error::permanent(message))
        }
        _ => Ok(()),
    }
}

fn listing_from_node(node: &Value) -> Option<RemoteListing> {
    let external_id = node
        .get("legacyResourceId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())?
        .to_string();
    let status = node.get("status").and_then(Value::as_str).unwrap_or("ACTIVE");
    let total_inventory = node
        .get("totalInventory")
        .and_then(Value::as_i64)
        .map(|n| n as i32);
    let price = node
        .pointer("/variants/nodes/0/price")
        .and_then(Value::as_str)
        .and_then(|p| p.parse::<Decimal>().ok())
        .unwrap_or_default();

    Some(RemoteListing {
        external_id: ExternalId::new(external_id),
        status: from_shopify_status(status, total_inventory),
        price: normalize_price(price),
        quantity_total: total_inventory,
        quantity_available: total_inventory,
        quantity_sold: None,
        title: node
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        listing_url: node
            .get("onlineStoreUrl")
            .and_then(Value::as_str)
            .map(str::to_string),
        raw: node.clone(),
    })
}

#[async_trait]
impl MarketplaceAdapter for ShopifyAdapter {
    fn platform(&self) -> PlatformTag {
        PlatformTag::Shopify
    }

    #[instrument(skip(self))]
    async fn fetch_all(&self) -> Result<Vec<RemoteListing>> {
        let mut listings = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let data = self
                .client
                .graphql(
                    PRODUCTS_QUERY,
                    json!({ "cursor": cursor, "pageSize": PAGE_SIZE }),
                )
                .await?;
            let nodes = data
                .pointer("/products/nodes")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            debug!(count = nodes.len(), "Fetched products page");
            listings.extend(nodes.iter().filter_map(listing_from_node));

            let has_next = data
                .pointer("/products/pageInfo/hasNextPage")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !has_next {
                break;
            }
            cursor = data
                .pointer("/products/pageInfo/endCursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }
        Ok(listings)
    }

    async fn mark_as_sold(&self, external_id: &ExternalId) -> Result<CloseOutcome> {
        let resolved = self.resolve(external_id).await?;
        if resolved.total_inventory == Some(0) {
            return Ok(CloseOutcome::AlreadyClosed);
        }
        self.set_on_hand(external_id, 0).await?;
        Ok(CloseOutcome::Closed)
    }

    async fn update_price(&self, external_id: &ExternalId, new_price: Decimal) -> Result<()> {
        let resolved = self.resolve(external_id).await?;
        let data = self
            .client
            .graphql(
                "mutation UpdatePrice($productId: ID!, $variants: [ProductVariantsBulkInput!]!) {\n\
                 productVariantsBulkUpdate(productId: $productId, variants: $variants) { userErrors { field message } }\n\
                 }",
                json!({
                    "productId": resolved.product_gid,
                    "variants": [{
                        "id": resolved.variant_gid,
                        "price": normalize_price(new_price).to_string(),
                    }],
                }),
            )
            .await?;
        check_user_errors(&data, "/productVariantsBulkUpdate/userErrors")
    }

    async fn update_quantity(
        &self,
        external_id: &ExternalId,
        quantity: i32,
        _hints: &QuantityHints,
    ) -> Result<()> {
        self.set_on_hand(external_id, quantity).await
    }

    async fn create_listing(
        &self,
        product: &Product,
        _context: &CreateContext,
    ) -> Result<CreateResult> {
        let data = self
            .client
            .graphql(
                "mutation CreateProduct($input: ProductInput!) {\n\
                 productCreate(input: $input) {\n\
                 product { id legacyResourceId onlineStoreUrl }\n\
                 userErrors { field message }\n\
                 }\n\
                 }",
                json!({
                    "input": {
                        "title": product.title,
                        "descriptionHtml": product.description.clone().unwrap_or_default(),
                        "vendor": product.brand,
                        "status": "ACTIVE",
                        "tags": [product.category.clone().unwrap_or_default()],
                    }
                }),
            )
            .await?;
        check_user_errors(&data, "/productCreate/userErrors")?;

        let external_id = data
            .pointer("/productCreate/product/legacyResourceId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::permanent("productCreate returned no id"))?;
        let listing_url = data
            .pointer("/productCreate/product/onlineStoreUrl")
            .and_then(Value::as_str)
            .map(str::to_string);

        // A fresh product carries a default variant; push the price onto it.
        self.update_price(&ExternalId::new(external_id.clone()), product.canonical_price())
            .await?;

        Ok(CreateResult {
            external_id: Some(ExternalId::new(external_id)),
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

        let mut result = EditResult::default();
        let mut input = serde_json::Map::new();
        for field in changed {
            match field {
                ProductField::Title => {
                    input.insert("title".into(), json!(product.title));
                    result.applied.push(*field);
                }
                ProductField::Description => {
                    input.insert(
                        "descriptionHtml".into(),
                        json!(product.description.clone().unwrap_or_default()),
                    );
                    result.applied.push(*field);
                }
                ProductField::Category => {
                    input.insert(
                        "tags".into(),
                        json!([product.category.clone().unwrap_or_default()]),
                    );
                    result.applied.push(*field);
                }
                ProductField::Price => {
                    self.update_price(external_id, product.canonical_price())
                        .await?;
                    result.applied.push(*field);
                }
                ProductField::Quantity => {
                    self.set_on_hand(external_id, product.quantity).await?;
                    result.applied.push(*field);
                }
                other => {
                    result
                        .skipped
                        .push((*other, "not updatable via productUpdate".to_string()));
                }
            }
        }

        if !input.is_empty() {
            let resolved = self.resolve(external_id).await?;
            input.insert("id".into(), json!(resolved.product_gid));
            let data = self
                .client
                .graphql(
                    "mutation UpdateProduct($input: ProductInput!) {\n\
                     productUpdate(input: $input) { userErrors { field message } }\n\
                     }",
                    json!({ "input": Value::Object(input) }),
                )
                .await?;
            check_user_errors(&data, "/productUpdate/userErrors")?;
        }
        Ok(result)
    }
}
