//! Product mapping hints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// A hint that two product records may describe the same physical item,
/// recorded during initial imports. Input to matching heuristics only; the
/// mapping itself never merges records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductMapping {
    pub master_product_id: ProductId,
    pub related_product_id: ProductId,
    pub match_confidence: Option<f32>,
    /// `"manual"` or `"algorithm"`.
    pub match_method: Option<String>,
    pub created_at: DateTime<Utc>,
}
