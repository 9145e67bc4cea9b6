//! Product catalog service: product publication, variant matrix
//! enforcement, SKU suggestion, and soft-deactivation.
//!
//! The catalog is where variant identity is minted. The matrix rules run
//! at creation time: every variant of a multi-attribute product must carry
//! a complete attribute set, and no two variants of a product may share an
//! attribute combination. Movement validation only ever resolves against
//! what this service has accepted.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::{FieldError, ValidationFailure};
use crate::events::{Event, EventSender};
use crate::ledger::StockLedger;
use crate::models::product::{suggest_sku, Product};
use crate::models::variant::{Dimensions, Variant, VariantSelector};
use crate::validation::CatalogView;

/// Input for publishing a product together with its variant rows.
#[derive(Debug, Clone)]
pub struct ProductInput {
    pub vendor_id: Uuid,
    pub name: String,
    pub brand: Option<String>,
    pub declared_attributes: Vec<String>,
    /// Falls back to the configured default when absent.
    pub low_stock_threshold: Option<i64>,
    pub variants: Vec<VariantInput>,
}

/// One variant row of a product being published.
#[derive(Debug, Clone)]
pub struct VariantInput {
    /// User-supplied SKU; when absent a deterministic suggestion is
    /// generated from brand, name, and attribute values.
    pub sku: Option<String>,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub cost_price: Decimal,
    pub weight_kg: Option<f64>,
    pub dimensions: Option<Dimensions>,
    pub attributes: BTreeMap<String, String>,
}

/// Pricing fields a vendor may edit after publication.
#[derive(Debug, Clone, Default)]
pub struct PricingUpdate {
    pub price: Option<Decimal>,
    /// `Some(None)` clears the sale price.
    pub sale_price: Option<Option<Decimal>>,
    pub cost_price: Option<Decimal>,
}

#[derive(Clone)]
pub struct CatalogService {
    products: DashMap<Uuid, Product>,
    variants: DashMap<Uuid, Variant>,
    sku_index: DashMap<String, Uuid>,
    ledger: Arc<StockLedger>,
    event_sender: EventSender,
    default_low_stock_threshold: i64,
}

impl CatalogService {
    pub fn new(
        ledger: Arc<StockLedger>,
        event_sender: EventSender,
        default_low_stock_threshold: i64,
    ) -> Self {
        Self {
            products: DashMap::new(),
            variants: DashMap::new(),
            sku_index: DashMap::new(),
            ledger,
            event_sender,
            default_low_stock_threshold,
        }
    }

    /// Publish a product with one or more variant rows. Every rule
    /// violation across all rows is collected into one response; on success
    /// each variant gets a zeroed stock record.
    #[instrument(skip(self, input), fields(vendor_id = %input.vendor_id, name = %input.name))]
    pub async fn publish_product(&self, input: ProductInput) -> Result<Product, ValidationFailure> {
        let mut errors: Vec<FieldError> = Vec::new();

        if input.name.trim().is_empty() {
            errors.push(FieldError::new("name", "product name cannot be empty"));
        }
        if input.variants.is_empty() {
            errors.push(FieldError::new(
                "variants",
                "a product is published with at least one variant row",
            ));
        }
        if let Some(threshold) = input.low_stock_threshold {
            if threshold < 0 {
                errors.push(FieldError::new(
                    "low_stock_threshold",
                    "low-stock threshold cannot be negative",
                ));
            }
        }

        let product = Product {
            id: Uuid::new_v4(),
            vendor_id: input.vendor_id,
            name: input.name.clone(),
            brand: input.brand.clone(),
            declared_attributes: input.declared_attributes.clone(),
            low_stock_threshold: input
                .low_stock_threshold
                .unwrap_or(self.default_low_stock_threshold),
            active: true,
            created_at: Utc::now(),
        };

        let mut rows: Vec<(String, VariantInput)> = Vec::with_capacity(input.variants.len());
        let mut combinations: Vec<BTreeMap<String, String>> = Vec::new();
        for (index, row) in input.variants.into_iter().enumerate() {
            self.check_variant_row(&product, &row, &combinations, index, &mut errors);
            combinations.push(row.attributes.clone());

            let sku = self.resolve_sku(&product, &row, index, &rows, &mut errors);
            rows.push((sku, row));
        }

        if !errors.is_empty() {
            return Err(ValidationFailure::new(errors));
        }

        self.products.insert(product.id, product.clone());
        for (sku, row) in rows {
            self.insert_variant(&product, sku, row);
        }

        self.event_sender
            .send_or_log(Event::ProductPublished(product.id))
            .await;
        info!(product_id = %product.id, "product published");
        Ok(product)
    }

    /// Add a variant to an already-published product, under the same matrix
    /// rules.
    #[instrument(skip(self, input))]
    pub async fn create_variant(
        &self,
        product_id: Uuid,
        input: VariantInput,
    ) -> Result<Variant, ValidationFailure> {
        let product = self
            .products
            .get(&product_id)
            .map(|p| p.value().clone())
            .ok_or_else(|| {
                ValidationFailure::single("product_id", format!("unknown product {}", product_id))
            })?;

        let existing: Vec<BTreeMap<String, String>> = self
            .variants_of_product(product_id)
            .into_iter()
            .map(|v| v.attributes)
            .collect();

        let mut errors = Vec::new();
        self.check_variant_row(&product, &input, &existing, 0, &mut errors);
        let sku = self.resolve_sku(&product, &input, 0, &[], &mut errors);
        if !errors.is_empty() {
            return Err(ValidationFailure::new(errors));
        }

        let variant = self.insert_variant(&product, sku, input);
        info!(variant_id = %variant.id, product_id = %product_id, "variant created");
        Ok(variant)
    }

    /// Edit pricing fields on a variant.
    #[instrument(skip(self, update))]
    pub fn update_variant_pricing(
        &self,
        variant_id: Uuid,
        update: PricingUpdate,
    ) -> Result<Variant, ValidationFailure> {
        let mut errors = Vec::new();
        for (path, value) in [
            ("price", update.price),
            ("cost_price", update.cost_price),
            ("sale_price", update.sale_price.flatten()),
        ] {
            if let Some(value) = value {
                if value < Decimal::ZERO {
                    errors.push(FieldError::new(path, format!("{} cannot be negative", path)));
                }
            }
        }
        if !errors.is_empty() {
            return Err(ValidationFailure::new(errors));
        }

        let mut variant = self.variants.get_mut(&variant_id).ok_or_else(|| {
            ValidationFailure::single("variant_id", format!("unknown variant {}", variant_id))
        })?;
        if let Some(price) = update.price {
            variant.price = price;
        }
        if let Some(sale_price) = update.sale_price {
            variant.sale_price = sale_price;
        }
        if let Some(cost_price) = update.cost_price {
            variant.cost_price = cost_price;
        }
        variant.updated_at = Utc::now();
        Ok(variant.clone())
    }

    /// Soft-deactivate a variant. The variant and its movement history stay
    /// addressable; it just stops validating on new documents.
    #[instrument(skip(self))]
    pub async fn deactivate_variant(&self, variant_id: Uuid) -> Result<(), ValidationFailure> {
        {
            let mut variant = self.variants.get_mut(&variant_id).ok_or_else(|| {
                ValidationFailure::single("variant_id", format!("unknown variant {}", variant_id))
            })?;
            variant.active = false;
            variant.updated_at = Utc::now();
        }
        self.event_sender
            .send_or_log(Event::VariantDeactivated(variant_id))
            .await;
        info!(variant_id = %variant_id, "variant deactivated");
        Ok(())
    }

    pub fn get_product(&self, product_id: Uuid) -> Option<Product> {
        self.products.get(&product_id).map(|p| p.value().clone())
    }

    pub fn get_variant(&self, variant_id: Uuid) -> Option<Variant> {
        self.variants.get(&variant_id).map(|v| v.value().clone())
    }

    pub fn get_variant_by_sku(&self, sku: &str) -> Option<Variant> {
        let variant_id = *self.sku_index.get(sku)?;
        self.get_variant(variant_id)
    }

    pub fn variants_of_product(&self, product_id: Uuid) -> Vec<Variant> {
        let mut variants: Vec<Variant> = self
            .variants
            .iter()
            .filter(|entry| entry.product_id == product_id)
            .map(|entry| entry.value().clone())
            .collect();
        variants.sort_by(|a, b| a.sku.cmp(&b.sku));
        variants
    }

    /// Resolve a movement-line selector to a concrete variant.
    pub fn resolve_selector(&self, selector: &VariantSelector) -> Option<Variant> {
        match selector {
            VariantSelector::Id(variant_id) => self.get_variant(*variant_id),
            VariantSelector::Combination {
                product_id,
                attributes,
            } => self.variant_by_combination(*product_id, attributes),
        }
    }

    fn check_variant_row(
        &self,
        product: &Product,
        row: &VariantInput,
        sibling_combinations: &[BTreeMap<String, String>],
        index: usize,
        errors: &mut Vec<FieldError>,
    ) {
        let path = |field: &str| format!("variants[{}].{}", index, field);

        let missing = product.missing_attributes(&row.attributes);
        if !missing.is_empty() {
            errors.push(FieldError::new(
                path("attributes"),
                format!("missing required attribute(s): {}", missing.join(", ")),
            ));
        }

        let duplicate_existing = self
            .variants
            .iter()
            .any(|v| v.product_id == product.id && v.attributes == row.attributes);
        if duplicate_existing || sibling_combinations.contains(&row.attributes) {
            errors.push(FieldError::new(
                path("attributes"),
                "another variant of this product already uses this attribute combination",
            ));
        }

        if row.price < Decimal::ZERO {
            errors.push(FieldError::new(path("price"), "price cannot be negative"));
        }
        if row.cost_price < Decimal::ZERO {
            errors.push(FieldError::new(
                path("cost_price"),
                "cost price cannot be negative",
            ));
        }
        if let Some(sale_price) = row.sale_price {
            if sale_price < Decimal::ZERO {
                errors.push(FieldError::new(
                    path("sale_price"),
                    "sale price cannot be negative",
                ));
            }
        }
    }

    fn resolve_sku(
        &self,
        product: &Product,
        row: &VariantInput,
        index: usize,
        siblings: &[(String, VariantInput)],
        errors: &mut Vec<FieldError>,
    ) -> String {
        let sku = match &row.sku {
            Some(sku) if !sku.trim().is_empty() => sku.trim().to_string(),
            _ => suggest_sku(product.brand.as_deref(), &product.name, &row.attributes),
        };

        let taken = self.sku_index.contains_key(&sku)
            || siblings.iter().any(|(existing, _)| existing == &sku);
        if taken {
            errors.push(FieldError::new(
                format!("variants[{}].sku", index),
                format!("SKU {} is already in use", sku),
            ));
        }
        sku
    }

    fn insert_variant(&self, product: &Product, sku: String, row: VariantInput) -> Variant {
        let now = Utc::now();
        let variant = Variant {
            id: Uuid::new_v4(),
            product_id: product.id,
            sku: sku.clone(),
            price: row.price,
            sale_price: row.sale_price,
            cost_price: row.cost_price,
            weight_kg: row.weight_kg,
            dimensions: row.dimensions,
            attributes: row.attributes,
            active: true,
            created_at: now,
            updated_at: now,
        };
        self.variants.insert(variant.id, variant.clone());
        self.sku_index.insert(sku, variant.id);
        self.ledger
            .create_record(variant.id, Some(product.low_stock_threshold))
            .expect("stock record created exactly once per variant");
        variant
    }
}

impl CatalogView for CatalogService {
    fn product(&self, product_id: Uuid) -> Option<Product> {
        self.get_product(product_id)
    }

    fn variant(&self, variant_id: Uuid) -> Option<Variant> {
        self.get_variant(variant_id)
    }

    fn variant_by_combination(
        &self,
        product_id: Uuid,
        attributes: &BTreeMap<String, String>,
    ) -> Option<Variant> {
        self.variants
            .iter()
            .find(|v| v.product_id == product_id && &v.attributes == attributes)
            .map(|v| v.value().clone())
    }

    fn product_variant_count(&self, product_id: Uuid) -> usize {
        self.variants
            .iter()
            .filter(|v| v.product_id == product_id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn service() -> CatalogService {
        let (events, _rx) = EventSender::channel(64);
        let ledger = Arc::new(StockLedger::new(events.clone(), 5));
        CatalogService::new(ledger, events, 5)
    }

    fn row(attrs: &[(&str, &str)]) -> VariantInput {
        VariantInput {
            sku: None,
            price: dec!(29.90),
            sale_price: None,
            cost_price: dec!(12.00),
            weight_kg: Some(0.2),
            dimensions: None,
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn tee_input(variants: Vec<VariantInput>) -> ProductInput {
        ProductInput {
            vendor_id: Uuid::new_v4(),
            name: "Trail Tee".into(),
            brand: Some("Acme".into()),
            declared_attributes: vec!["color".into(), "size".into()],
            low_stock_threshold: None,
            variants,
        }
    }

    #[tokio::test]
    async fn publishing_creates_variants_with_zeroed_stock() {
        let catalog = service();
        let product = catalog
            .publish_product(tee_input(vec![
                row(&[("color", "red"), ("size", "M")]),
                row(&[("color", "red"), ("size", "L")]),
            ]))
            .await
            .unwrap();

        let variants = catalog.variants_of_product(product.id);
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].sku, "ACME-TRAIL-TEE-RED-L");
        for variant in &variants {
            let levels = catalog.ledger.levels(variant.id).unwrap();
            assert_eq!(levels.on_hand, 0);
            assert_eq!(levels.reserved, 0);
        }
    }

    #[tokio::test]
    async fn duplicate_combination_is_rejected_at_creation_time() {
        let catalog = service();
        let failure = catalog
            .publish_product(tee_input(vec![
                row(&[("color", "red"), ("size", "M")]),
                row(&[("color", "red"), ("size", "M")]),
            ]))
            .await
            .unwrap_err();
        assert!(failure.for_path("variants[1].attributes").is_some());

        let product = catalog
            .publish_product(tee_input(vec![row(&[("color", "red"), ("size", "M")])]))
            .await
            .unwrap();
        let failure = catalog
            .create_variant(product.id, row(&[("color", "red"), ("size", "M")]))
            .await
            .unwrap_err();
        assert!(failure.for_path("variants[0].attributes").is_some());
    }

    #[tokio::test]
    async fn incomplete_attribute_set_is_rejected() {
        let catalog = service();
        let failure = catalog
            .publish_product(tee_input(vec![row(&[("color", "red")])]))
            .await
            .unwrap_err();
        assert_eq!(
            failure.for_path("variants[0].attributes").unwrap().message,
            "missing required attribute(s): size"
        );
    }

    #[tokio::test]
    async fn supplied_sku_wins_over_suggestion_and_must_be_unique() {
        let catalog = service();
        let mut custom = row(&[("color", "red"), ("size", "M")]);
        custom.sku = Some("CUSTOM-1".into());
        let product = catalog
            .publish_product(tee_input(vec![custom]))
            .await
            .unwrap();
        assert_eq!(
            catalog.variants_of_product(product.id)[0].sku,
            "CUSTOM-1"
        );

        let mut clash = row(&[("color", "blue"), ("size", "M")]);
        clash.sku = Some("CUSTOM-1".into());
        let failure = catalog.create_variant(product.id, clash).await.unwrap_err();
        assert!(failure.for_path("variants[0].sku").is_some());
    }

    #[tokio::test]
    async fn deactivation_is_soft() {
        let catalog = service();
        let product = catalog
            .publish_product(tee_input(vec![row(&[("color", "red"), ("size", "M")])]))
            .await
            .unwrap();
        let variant = catalog.variants_of_product(product.id).remove(0);

        catalog.deactivate_variant(variant.id).await.unwrap();
        let reloaded = catalog.get_variant(variant.id).unwrap();
        assert!(!reloaded.active);
        assert!(catalog.get_variant_by_sku(&reloaded.sku).is_some());
    }
}
