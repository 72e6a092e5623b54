//! Match suggester for rogue listings.
//!
//! Scores local products against a remote listing on brand, model, year,
//! finish, price proximity and SKU-in-description. A candidate at or above
//! the configured confidence threshold is attached to the `new_listing`
//! event for operator review; the event itself stays unlinked until a human
//! confirms.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::core::domain::{MatchCandidate, PlatformTag, Product, RemoteListing};

/// Weighted scorer over the local product pool.
#[derive(Debug, Clone, Copy)]
pub struct MatchSuggester {
    confidence_threshold: u8,
}

const SKU_IN_LISTING: u8 = 40;
const BRAND_IN_TITLE: u8 = 20;
const MODEL_IN_TITLE: u8 = 25;
const YEAR_IN_TITLE: u8 = 15;
const FINISH_IN_TITLE: u8 = 10;
const PRICE_EXACT: u8 = 25;
const PRICE_CLOSE: u8 = 15;

impl MatchSuggester {
    #[must_use]
    pub fn new(confidence_threshold: u8) -> Self {
        Self {
            confidence_threshold,
        }
    }

    /// Best candidate at or above the threshold, if any. Ties resolve to the
    /// lowest product id so reruns are stable.
    #[must_use]
    pub fn suggest<'a>(
        &self,
        listing: &RemoteListing,
        pool: impl IntoIterator<Item = &'a Product>,
    ) -> Option<(MatchCandidate, &'a Product)> {
        let mut best: Option<(u8, Vec<&'static str>, &Product)> = None;

        for product in pool {
            let (score, reasons) = score_product(product, listing);
            let better = match &best {
                None => score >= self.confidence_threshold,
                Some((best_score, _, best_product)) => {
                    score > *best_score || (score == *best_score && product.id < best_product.id)
                }
            };
            if better && score >= self.confidence_threshold {
                best = Some((score, reasons, product));
            }
        }

        best.map(|(confidence, reasons, product)| {
            (
                MatchCandidate {
                    product_id: product.id,
                    sku: product.sku.clone(),
                    title: product.title.clone(),
                    brand: product.brand.clone(),
                    model: product.model.clone(),
                    status: product.status.to_string(),
                    base_price: product.base_price,
                    confidence,
                    reason: reasons.join(", "),
                    existing_platforms: Vec::new(),
                },
                product,
            )
        })
    }

    /// Attach the platforms the candidate is already listed on.
    #[must_use]
    pub fn with_existing_platforms(
        candidate: MatchCandidate,
        platforms: Vec<PlatformTag>,
    ) -> MatchCandidate {
        MatchCandidate {
            existing_platforms: platforms,
            ..candidate
        }
    }
}

fn score_product(product: &Product, listing: &RemoteListing) -> (u8, Vec<&'static str>) {
    let title = listing.title.to_lowercase();
    let haystack = format!(
        "{} {}",
        title,
        listing
            .raw
            .get("description")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_lowercase()
    );

    let mut score: u32 = 0;
    let mut reasons = Vec::new();

    if haystack.contains(&product.sku.to_lowercase()) {
        score += u32::from(SKU_IN_LISTING);
        reasons.push("sku referenced in listing");
    }
    if contains_field(&title, product.brand.as_deref()) {
        score += u32::from(BRAND_IN_TITLE);
        reasons.push("brand matches");
    }
    if contains_field(&title, product.model.as_deref()) {
        score += u32::from(MODEL_IN_TITLE);
        reasons.push("model matches");
    }
    if let Some(year) = product.year {
        if title.contains(&year.to_string()) {
            score += u32::from(YEAR_IN_TITLE);
            reasons.push("year matches");
        }
    }
    if contains_field(&title, product.finish.as_deref()) {
        score += u32::from(FINISH_IN_TITLE);
        reasons.push("finish matches");
    }
    match price_proximity(product.canonical_price(), listing.price) {
        PriceProximity::Exact => {
            score += u32::from(PRICE_EXACT);
            reasons.push("price matches");
        }
        PriceProximity::Close => {
            score += u32::from(PRICE_CLOSE);
            reasons.push("price within 5%");
        }
        PriceProximity::Far => {}
    }

    (score.min(100) as u8, reasons)
}

fn contains_field(title: &str, field: Option<&str>) -> bool {
    field
        .map(str::to_lowercase)
        .is_some_and(|needle| !needle.is_empty() && title.contains(&needle))
}

enum PriceProximity {
    Exact,
    Close,
    Far,
}

fn price_proximity(ours: Decimal, theirs: Decimal) -> PriceProximity {
    if (ours - theirs).abs() <= dec!(0.01) {
        return PriceProximity::Exact;
    }
    if ours > Decimal::ZERO && ((ours - theirs).abs() / ours) <= dec!(0.05) {
        return PriceProximity::Close;
    }
    PriceProximity::Far
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{Condition, ExternalId, ProductId, ProductStatus, UniversalStatus};
    use chrono::Utc;

    fn strat() -> Product {
        Product {
            id: ProductId::new(77),
            sku: "REV-77".into(),
            title: "1965 Fender Stratocaster Sunburst".into(),
            description: None,
            brand: Some("Fender".into()),
            model: Some("Stratocaster".into()),
            year: Some(1965),
            finish: Some("Sunburst".into()),
            category: None,
            condition: Condition::Excellent,
            base_price: dec!(4999.00),
            specialist_price: None,
            quantity: 1,
            is_stocked_item: false,
            primary_image: None,
            additional_images: vec![],
            status: ProductStatus::Active,
            manufacturing_country: None,
            shipping_profile_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn listing(title: &str, price: Decimal) -> RemoteListing {
        RemoteListing {
            external_id: ExternalId::new("C999"),
            status: UniversalStatus::Active,
            price,
            quantity_total: None,
            quantity_available: None,
            quantity_sold: None,
            title: title.into(),
            listing_url: None,
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn full_attribute_match_scores_high() {
        let pool = [strat()];
        let suggester = MatchSuggester::new(50);
        let (candidate, _) = suggester
            .suggest(
                &listing("1965 Fender Stratocaster Sunburst", dec!(4999.00)),
                &pool,
            )
            .unwrap();
        assert_eq!(candidate.product_id, ProductId::new(77));
        assert!(candidate.confidence >= 50);
        assert!(candidate.reason.contains("brand matches"));
    }

    #[test]
    fn unrelated_listing_scores_below_threshold() {
        let pool = [strat()];
        let suggester = MatchSuggester::new(50);
        assert!(suggester
            .suggest(&listing("Roland JC-120 Jazz Chorus", dec!(800.00)), &pool)
            .is_none());
    }

    #[test]
    fn sku_reference_dominates() {
        let mut raw = serde_json::Map::new();
        raw.insert(
            "description".into(),
            serde_json::Value::String("Consignment item REV-77, plays great".into()),
        );
        let mut l = listing("Vintage electric guitar", dec!(100.00));
        l.raw = serde_json::Value::Object(raw);

        let pool = [strat()];
        let suggester = MatchSuggester::new(40);
        let (candidate, _) = suggester.suggest(&l, &pool).unwrap();
        assert!(candidate.reason.contains("sku referenced"));
    }

    #[test]
    fn close_price_earns_partial_credit() {
        let pool = [strat()];
        let suggester = MatchSuggester::new(50);
        // Brand + model + 2% price gap: 20 + 25 + 15.
        let (candidate, _) = suggester
            .suggest(&listing("Fender Stratocaster", dec!(4899.00)), &pool)
            .unwrap();
        assert_eq!(candidate.confidence, 60);
    }

    #[test]
    fn ties_resolve_to_lowest_product_id() {
        let mut a = strat();
        let mut b = strat();
        a.id = ProductId::new(5);
        a.sku = "REV-5".into();
        b.id = ProductId::new(3);
        b.sku = "REV-3".into();
        let pool = [a, b];
        let suggester = MatchSuggester::new(50);
        let (candidate, _) = suggester
            .suggest(
                &listing("1965 Fender Stratocaster Sunburst", dec!(4999.00)),
                &pool,
            )
            .unwrap();
        assert_eq!(candidate.product_id, ProductId::new(3));
    }
}
