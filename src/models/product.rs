use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

lazy_static! {
    static ref SKU_SEPARATOR: Regex = Regex::new("[^A-Za-z0-9]+").expect("valid regex");
}

/// A vendor's product. Declares the attribute axes (e.g. `color`, `size`)
/// every variant of the product must carry a value for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub name: String,
    pub brand: Option<String>,
    /// Attribute names each variant must provide a value for. Empty for
    /// single-variant products with no option axes.
    pub declared_attributes: Vec<String>,
    /// Default low-stock threshold applied to this product's stock records.
    pub low_stock_threshold: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Declared attributes for which `attributes` has no non-empty value.
    pub fn missing_attributes(&self, attributes: &BTreeMap<String, String>) -> Vec<String> {
        self.declared_attributes
            .iter()
            .filter(|name| {
                attributes
                    .get(name.as_str())
                    .map_or(true, |v| v.trim().is_empty())
            })
            .cloned()
            .collect()
    }
}

/// Deterministic SKU suggestion: brand prefix, then name tokens, then
/// attribute-value tokens, uppercased and hyphen-joined.
///
/// A suggestion only; a user-supplied SKU always wins, and identity stays
/// with the variant's generated id.
pub fn suggest_sku(
    brand: Option<&str>,
    name: &str,
    attributes: &BTreeMap<String, String>,
) -> String {
    let mut tokens: Vec<String> = Vec::new();
    if let Some(brand) = brand {
        tokens.extend(tokenize(brand));
    }
    tokens.extend(tokenize(name));
    for value in attributes.values() {
        tokens.extend(tokenize(value));
    }
    tokens.join("-")
}

fn tokenize(input: &str) -> Vec<String> {
    SKU_SEPARATOR
        .split(input)
        .filter(|t| !t.is_empty())
        .map(|t| t.to_uppercase())
        .collect()
}
