use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Physical dimensions in centimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length_cm: f64,
    pub width_cm: f64,
    pub height_cm: f64,
}

/// A purchasable configuration of a product: one attribute-value combination
/// with its own SKU, pricing, and stock record.
///
/// Never hard-deleted while referenced by historical movements; `active`
/// flips to `false` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub cost_price: Decimal,
    pub weight_kg: Option<f64>,
    pub dimensions: Option<Dimensions>,
    /// Attribute values keyed by the product's declared attribute names.
    /// Ordered map so combination identity and SKU suggestions are
    /// deterministic.
    pub attributes: BTreeMap<String, String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Variant {
    /// Effective selling price: sale price when present, list price
    /// otherwise.
    pub fn effective_price(&self) -> Decimal {
        self.sale_price.unwrap_or(self.price)
    }
}

/// How a movement line names its variant: directly by id, or by the
/// product's attribute combination. Unmatched combinations are rejected at
/// validation; they never create a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantSelector {
    Id(Uuid),
    Combination {
        product_id: Uuid,
        attributes: BTreeMap<String, String>,
    },
}
