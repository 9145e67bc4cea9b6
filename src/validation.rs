//! The validation engine: pure checks of a proposed movement document
//! against the catalog and a read-only stock snapshot.
//!
//! Validation has no side effects and may run against a stale snapshot;
//! commit re-validates under the per-variant locks, so the decision made
//! here is advisory until the ledger confirms it.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

use crate::errors::{FieldError, ValidationFailure};
use crate::models::movement::{
    DocumentTotals, MovementDirection, MovementDraft, MovementKind, MovementLine,
    ValidatedDocument,
};
use crate::models::product::Product;
use crate::models::stock_record::StockLevels;
use crate::models::variant::{Variant, VariantSelector};

/// Read-only catalog surface the engine resolves line items against.
pub trait CatalogView {
    fn product(&self, product_id: Uuid) -> Option<Product>;
    fn variant(&self, variant_id: Uuid) -> Option<Variant>;
    fn variant_by_combination(
        &self,
        product_id: Uuid,
        attributes: &BTreeMap<String, String>,
    ) -> Option<Variant>;
    fn product_variant_count(&self, product_id: Uuid) -> usize;
}

/// Read-only stock surface; each call observes a fully-committed value.
pub trait StockView {
    fn stock_levels(&self, variant_id: Uuid) -> Option<StockLevels>;
}

/// Validate a draft document. Returns the immutable [`ValidatedDocument`]
/// with engine-recomputed totals, or every field error in one response.
pub fn validate_document(
    draft: &MovementDraft,
    catalog: &dyn CatalogView,
    stock: &dyn StockView,
    max_lines: usize,
) -> Result<ValidatedDocument, ValidationFailure> {
    let mut errors: Vec<FieldError> = Vec::new();

    collect_draft_field_errors(draft, &mut errors);
    check_document_header(draft, &mut errors);

    if draft.lines.is_empty() {
        errors.push(FieldError::new(
            "lines",
            "document must contain at least one line item",
        ));
        return Err(ValidationFailure::new(errors));
    }
    if draft.lines.len() > max_lines {
        errors.push(FieldError::new(
            "lines",
            format!(
                "document has {} lines; at most {} are allowed",
                draft.lines.len(),
                max_lines
            ),
        ));
    }

    let mut seen_variants: HashSet<Uuid> = HashSet::new();
    let mut lines: Vec<MovementLine> = Vec::with_capacity(draft.lines.len());

    for (index, line) in draft.lines.iter().enumerate() {
        let variant = match resolve_selector(&line.variant, catalog, index, &mut errors) {
            Some(v) => v,
            None => continue,
        };

        check_variant_integrity(&variant, catalog, index, &mut errors);

        if !seen_variants.insert(variant.id) {
            errors.push(FieldError::new(
                line_path(index, "variant"),
                format!(
                    "variant {} appears more than once in this document",
                    variant.sku
                ),
            ));
            continue;
        }

        check_unit_cost(draft, line.unit_cost, index, &mut errors);

        if line.quantity < 1 {
            errors.push(FieldError::new(
                line_path(index, "quantity"),
                "quantity must be at least 1",
            ));
            continue;
        }

        if draft.kind.direction() == MovementDirection::Outbound {
            check_availability(&variant, line.quantity, stock, index, &mut errors);
        }

        let line_total = line.unit_cost * Decimal::from(line.quantity);
        lines.push(MovementLine {
            variant_id: variant.id,
            quantity: line.quantity,
            delta: draft.kind.signed_delta(line.quantity),
            unit_cost: line.unit_cost,
            line_total,
            note: line.note.clone(),
        });
    }

    let totals = compute_totals(&lines);
    // Only meaningful when every line parsed; a partial total would produce
    // a misleading second error on an already-rejected document.
    if let (Some(expected), true) = (
        draft.expected_grand_total,
        lines.len() == draft.lines.len(),
    ) {
        if expected != totals.grand_total {
            errors.push(FieldError::new(
                "expected_grand_total",
                format!(
                    "supplied grand total ({}) does not match computed total ({})",
                    expected, totals.grand_total
                ),
            ));
        }
    }

    if !errors.is_empty() {
        return Err(ValidationFailure::new(errors));
    }

    Ok(ValidatedDocument::new(
        draft.kind,
        draft.sequence_number.clone(),
        draft.effective_date,
        draft.counterparty_id,
        draft.reason.clone(),
        draft.goodwill,
        lines,
        totals,
    ))
}

fn line_path(index: usize, field: &str) -> String {
    format!("lines[{}].{}", index, field)
}

/// Map the derive-level constraints (lengths) onto field errors so callers
/// get one uniform error shape.
fn collect_draft_field_errors(draft: &MovementDraft, errors: &mut Vec<FieldError>) {
    if let Err(violations) = draft.validate() {
        for (field, field_errors) in violations.field_errors() {
            for violation in field_errors {
                let message = violation
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("invalid value for {}", field));
                errors.push(FieldError::new(field.to_string(), message));
            }
        }
    }
}

fn check_document_header(draft: &MovementDraft, errors: &mut Vec<FieldError>) {
    match (draft.kind.requires_counterparty(), draft.counterparty_id) {
        (true, None) => errors.push(FieldError::new(
            "counterparty_id",
            format!("a supplier is required for {} documents", draft.kind),
        )),
        (false, Some(_)) => errors.push(FieldError::new(
            "counterparty_id",
            format!("{} documents have no counterparty", draft.kind),
        )),
        _ => {}
    }

    if draft.goodwill && !draft.kind.allows_goodwill() {
        errors.push(FieldError::new(
            "goodwill",
            format!("{} documents cannot be marked goodwill", draft.kind),
        ));
    }

    if draft.effective_date > Utc::now().date_naive() {
        errors.push(FieldError::new(
            "effective_date",
            "effective date cannot be in the future",
        ));
    }
}

fn resolve_selector(
    selector: &VariantSelector,
    catalog: &dyn CatalogView,
    index: usize,
    errors: &mut Vec<FieldError>,
) -> Option<Variant> {
    match selector {
        VariantSelector::Id(variant_id) => {
            let variant = catalog.variant(*variant_id);
            if variant.is_none() {
                errors.push(FieldError::new(
                    line_path(index, "variant"),
                    format!("unknown variant {}", variant_id),
                ));
            }
            variant
        }
        VariantSelector::Combination {
            product_id,
            attributes,
        } => {
            let product = match catalog.product(*product_id) {
                Some(p) => p,
                None => {
                    errors.push(FieldError::new(
                        line_path(index, "variant"),
                        format!("unknown product {}", product_id),
                    ));
                    return None;
                }
            };

            let missing = product.missing_attributes(attributes);
            if !missing.is_empty() {
                errors.push(FieldError::new(
                    line_path(index, "attributes"),
                    format!("missing required attribute(s): {}", missing.join(", ")),
                ));
                return None;
            }

            let variant = catalog.variant_by_combination(*product_id, attributes);
            if variant.is_none() {
                errors.push(FieldError::new(
                    line_path(index, "attributes"),
                    format!(
                        "no variant of product {} matches the attribute combination {}",
                        product_id,
                        describe_combination(attributes)
                    ),
                ));
            }
            variant
        }
    }
}

/// A resolved variant must still be active and, within a multi-variant
/// product, carry a complete attribute set.
fn check_variant_integrity(
    variant: &Variant,
    catalog: &dyn CatalogView,
    index: usize,
    errors: &mut Vec<FieldError>,
) {
    if !variant.active {
        errors.push(FieldError::new(
            line_path(index, "variant"),
            format!("variant {} is deactivated", variant.sku),
        ));
    }

    let product = match catalog.product(variant.product_id) {
        Some(p) => p,
        None => {
            errors.push(FieldError::new(
                line_path(index, "variant"),
                format!("variant {} belongs to no known product", variant.sku),
            ));
            return;
        }
    };

    if catalog.product_variant_count(product.id) > 1 {
        let missing = product.missing_attributes(&variant.attributes);
        if !missing.is_empty() {
            errors.push(FieldError::new(
                line_path(index, "attributes"),
                format!(
                    "variant {} is missing required attribute(s): {}",
                    variant.sku,
                    missing.join(", ")
                ),
            ));
        }
    }
}

fn check_unit_cost(
    draft: &MovementDraft,
    unit_cost: Decimal,
    index: usize,
    errors: &mut Vec<FieldError>,
) {
    if unit_cost < Decimal::ZERO {
        errors.push(FieldError::new(
            line_path(index, "unit_cost"),
            "unit cost cannot be negative",
        ));
        return;
    }
    if unit_cost > Decimal::ZERO {
        return;
    }
    // Zero cost from here on.
    match draft.kind {
        MovementKind::SupplierReturn if draft.goodwill => {}
        MovementKind::SupplierReturn => errors.push(FieldError::new(
            line_path(index, "unit_cost"),
            "unit cost must be greater than zero unless the return is marked goodwill",
        )),
        MovementKind::PurchaseOrder | MovementKind::LossDamage => errors.push(FieldError::new(
            line_path(index, "unit_cost"),
            "unit cost must be greater than zero",
        )),
    }
}

fn check_availability(
    variant: &Variant,
    quantity: u32,
    stock: &dyn StockView,
    index: usize,
    errors: &mut Vec<FieldError>,
) {
    match stock.stock_levels(variant.id) {
        Some(levels) => {
            if i64::from(quantity) > levels.available {
                errors.push(FieldError::new(
                    line_path(index, "quantity"),
                    format!(
                        "Quantity ({}) exceeds available stock ({})",
                        quantity, levels.available
                    ),
                ));
            }
        }
        None => errors.push(FieldError::new(
            line_path(index, "variant"),
            format!("no stock record exists for variant {}", variant.sku),
        )),
    }
}

fn compute_totals(lines: &[MovementLine]) -> DocumentTotals {
    let line_totals: Vec<Decimal> = lines.iter().map(|l| l.line_total).collect();
    DocumentTotals {
        grand_total: line_totals.iter().copied().sum(),
        total_units: lines.iter().map(|l| u64::from(l.quantity)).sum(),
        line_totals,
    }
}

fn describe_combination(attributes: &BTreeMap<String, String>) -> String {
    let pairs: Vec<String> = attributes
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect();
    format!("{{{}}}", pairs.join(", "))
}
