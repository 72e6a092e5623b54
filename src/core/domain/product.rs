//! Canonical product types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// Physical condition grading used across the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Condition {
    New,
    Excellent,
    VeryGood,
    Good,
    Fair,
    Poor,
}

impl Condition {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Excellent => "EXCELLENT",
            Self::VeryGood => "VERY_GOOD",
            Self::Good => "GOOD",
            Self::Fair => "FAIR",
            Self::Poor => "POOR",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NEW" => Ok(Self::New),
            "EXCELLENT" => Ok(Self::Excellent),
            "VERY_GOOD" | "VERYGOOD" => Ok(Self::VeryGood),
            "GOOD" => Ok(Self::Good),
            "FAIR" => Ok(Self::Fair),
            "POOR" => Ok(Self::Poor),
            other => Err(format!("unknown condition: {other}")),
        }
    }
}

/// Lifecycle status of the canonical product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    Active,
    Inactive,
    Pending,
    Sold,
    Draft,
}

impl ProductStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Pending => "PENDING",
            Self::Sold => "SOLD",
            Self::Draft => "DRAFT",
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "INACTIVE" => Ok(Self::Inactive),
            "PENDING" => Ok(Self::Pending),
            "SOLD" => Ok(Self::Sold),
            "DRAFT" => Ok(Self::Draft),
            other => Err(format!("unknown product status: {other}")),
        }
    }
}

/// The seller's internal item. `sku` is unique and immutable; products are
/// never destroyed, only transitioned through [`ProductStatus`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub title: String,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub finish: Option<String>,
    pub category: Option<String>,
    pub condition: Condition,
    pub base_price: Decimal,
    /// Overrides `base_price` as the canonical asking price when set.
    pub specialist_price: Option<Decimal>,
    pub quantity: i32,
    /// Stocked items carry multiple interchangeable units; a sale decrements
    /// the count. Non-stocked items are one-off and a sale anywhere sells
    /// them everywhere.
    pub is_stocked_item: bool,
    pub primary_image: Option<String>,
    pub additional_images: Vec<String>,
    pub status: ProductStatus,
    /// ISO-2 manufacturing country code.
    pub manufacturing_country: Option<String>,
    pub shipping_profile_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// The price other marketplaces are held to under the canonical price
    /// authority policy.
    #[must_use]
    pub fn canonical_price(&self) -> Decimal {
        self.specialist_price.unwrap_or(self.base_price)
    }

    /// Apply a sale of `quantity_sold` units. Non-stocked items transition
    /// straight to SOLD; stocked items decrement and only go SOLD when the
    /// count reaches zero. Quantity never goes below zero.
    pub fn apply_sale(&mut self, quantity_sold: i32) {
        if self.is_stocked_item {
            self.quantity = (self.quantity - quantity_sold.max(1)).max(0);
            if self.quantity == 0 {
                self.status = ProductStatus::Sold;
            }
        } else {
            self.quantity = 0;
            self.status = ProductStatus::Sold;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(stocked: bool, quantity: i32) -> Product {
        Product {
            id: ProductId::new(1),
            sku: "REV-1001".into(),
            title: "1965 Fender Stratocaster".into(),
            description: None,
            brand: Some("Fender".into()),
            model: Some("Stratocaster".into()),
            year: Some(1965),
            finish: Some("Sunburst".into()),
            category: Some("Electric Guitars".into()),
            condition: Condition::Excellent,
            base_price: dec!(4999.00),
            specialist_price: None,
            quantity,
            is_stocked_item: stocked,
            primary_image: None,
            additional_images: vec![],
            status: ProductStatus::Active,
            manufacturing_country: Some("US".into()),
            shipping_profile_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn canonical_price_prefers_specialist() {
        let mut p = product(false, 1);
        assert_eq!(p.canonical_price(), dec!(4999.00));
        p.specialist_price = Some(dec!(5250.00));
        assert_eq!(p.canonical_price(), dec!(5250.00));
    }

    #[test]
    fn sale_on_non_stocked_is_terminal() {
        let mut p = product(false, 1);
        p.apply_sale(1);
        assert_eq!(p.status, ProductStatus::Sold);
        assert_eq!(p.quantity, 0);
    }

    #[test]
    fn sale_on_stocked_decrements() {
        let mut p = product(true, 5);
        p.apply_sale(2);
        assert_eq!(p.status, ProductStatus::Active);
        assert_eq!(p.quantity, 3);
    }

    #[test]
    fn stocked_goes_sold_at_zero() {
        let mut p = product(true, 1);
        p.apply_sale(1);
        assert_eq!(p.status, ProductStatus::Sold);
    }

    #[test]
    fn sale_never_underflows_quantity() {
        let mut p = product(true, 1);
        p.apply_sale(4);
        assert_eq!(p.quantity, 0);
        assert_eq!(p.status, ProductStatus::Sold);
    }

    #[test]
    fn condition_parses_both_spellings() {
        assert_eq!("very_good".parse::<Condition>().unwrap(), Condition::VeryGood);
        assert_eq!("VERYGOOD".parse::<Condition>().unwrap(), Condition::VeryGood);
    }
}
