use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;
use validator::Validate;

use crate::models::variant::VariantSelector;

/// The business event a movement document represents. A closed set: the
/// kind decides the delta sign, the counterparty rule, and the cost rule,
/// and every match over it is exhaustive.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MovementKind {
    /// Inbound receipt from a supplier.
    PurchaseOrder,
    /// Outbound shipment back to a supplier.
    SupplierReturn,
    /// Outbound write-off for lost or damaged units.
    LossDamage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementDirection {
    Inbound,
    Outbound,
}

impl MovementKind {
    pub fn direction(self) -> MovementDirection {
        match self {
            MovementKind::PurchaseOrder => MovementDirection::Inbound,
            MovementKind::SupplierReturn | MovementKind::LossDamage => MovementDirection::Outbound,
        }
    }

    /// Purchase orders and supplier returns name a supplier; loss/damage
    /// reports have no counterparty.
    pub fn requires_counterparty(self) -> bool {
        match self {
            MovementKind::PurchaseOrder | MovementKind::SupplierReturn => true,
            MovementKind::LossDamage => false,
        }
    }

    /// Only supplier returns may be flagged as goodwill (zero-cost) returns.
    pub fn allows_goodwill(self) -> bool {
        matches!(self, MovementKind::SupplierReturn)
    }

    /// The signed stock delta for a line of `quantity` units. Callers never
    /// supply a sign; the kind owns the convention.
    pub fn signed_delta(self, quantity: u32) -> i64 {
        match self.direction() {
            MovementDirection::Inbound => i64::from(quantity),
            MovementDirection::Outbound => -i64::from(quantity),
        }
    }
}

/// One caller-proposed line of a draft document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftLine {
    pub variant: VariantSelector,
    pub quantity: u32,
    pub unit_cost: Decimal,
    pub note: Option<String>,
}

/// A caller-assembled movement document. Mutable, unvalidated, and without
/// side effects until it passes the validation engine.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MovementDraft {
    pub kind: MovementKind,
    /// Human-readable document number, e.g. `PO-2026-0114`.
    #[validate(length(min = 1, max = 64))]
    pub sequence_number: String,
    pub effective_date: NaiveDate,
    /// Supplier for purchase orders and supplier returns; `None` for
    /// loss/damage.
    pub counterparty_id: Option<Uuid>,
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
    /// Marks a supplier return as a goodwill (zero-cost) return.
    #[serde(default)]
    pub goodwill: bool,
    /// Caller's own grand total, if it computed one. Checked against the
    /// engine-recomputed total; never trusted.
    pub expected_grand_total: Option<Decimal>,
    pub lines: Vec<DraftLine>,
}

impl MovementDraft {
    pub fn new(kind: MovementKind, sequence_number: impl Into<String>) -> Self {
        Self {
            kind,
            sequence_number: sequence_number.into(),
            effective_date: Utc::now().date_naive(),
            counterparty_id: None,
            reason: None,
            goodwill: false,
            expected_grand_total: None,
            lines: Vec::new(),
        }
    }
}

/// One movement inside a validated document: a resolved variant, the
/// positive unit quantity, and the signed delta the ledger will apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementLine {
    pub variant_id: Uuid,
    pub quantity: u32,
    pub delta: i64,
    pub unit_cost: Decimal,
    pub line_total: Decimal,
    pub note: Option<String>,
}

/// Engine-recomputed document totals. Derived values only; caller-supplied
/// totals are checked against these, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub line_totals: Vec<Decimal>,
    pub grand_total: Decimal,
    pub total_units: u64,
}

/// A document that passed the validation engine. Immutable: fields are only
/// reachable through accessors, and the sole constructor is the engine
/// itself. The ledger consumes it by value, so committing the same validated
/// document twice is unrepresentable.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatedDocument {
    id: Uuid,
    kind: MovementKind,
    sequence_number: String,
    effective_date: NaiveDate,
    counterparty_id: Option<Uuid>,
    reason: Option<String>,
    goodwill: bool,
    lines: Vec<MovementLine>,
    totals: DocumentTotals,
    validated_at: DateTime<Utc>,
}

impl ValidatedDocument {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        kind: MovementKind,
        sequence_number: String,
        effective_date: NaiveDate,
        counterparty_id: Option<Uuid>,
        reason: Option<String>,
        goodwill: bool,
        lines: Vec<MovementLine>,
        totals: DocumentTotals,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            sequence_number,
            effective_date,
            counterparty_id,
            reason,
            goodwill,
            lines,
            totals,
            validated_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> MovementKind {
        self.kind
    }

    pub fn sequence_number(&self) -> &str {
        &self.sequence_number
    }

    pub fn effective_date(&self) -> NaiveDate {
        self.effective_date
    }

    pub fn counterparty_id(&self) -> Option<Uuid> {
        self.counterparty_id
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn goodwill(&self) -> bool {
        self.goodwill
    }

    pub fn lines(&self) -> &[MovementLine] {
        &self.lines
    }

    pub fn totals(&self) -> &DocumentTotals {
        &self.totals
    }

    pub fn validated_at(&self) -> DateTime<Utc> {
        self.validated_at
    }

    /// Unique variant ids touched by this document, sorted for deterministic
    /// lock acquisition.
    pub fn variant_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.lines.iter().map(|l| l.variant_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub(crate) fn into_committed(self, committed_at: DateTime<Utc>) -> CommittedDocument {
        CommittedDocument {
            id: self.id,
            kind: self.kind,
            sequence_number: self.sequence_number,
            effective_date: self.effective_date,
            counterparty_id: self.counterparty_id,
            reason: self.reason,
            goodwill: self.goodwill,
            lines: self.lines,
            totals: self.totals,
            validated_at: self.validated_at,
            committed_at,
        }
    }
}

/// A fully-applied document: the terminal lifecycle state, kept as an
/// immutable historical record for audit and reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CommittedDocument {
    id: Uuid,
    kind: MovementKind,
    sequence_number: String,
    effective_date: NaiveDate,
    counterparty_id: Option<Uuid>,
    reason: Option<String>,
    goodwill: bool,
    lines: Vec<MovementLine>,
    totals: DocumentTotals,
    validated_at: DateTime<Utc>,
    committed_at: DateTime<Utc>,
}

impl CommittedDocument {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> MovementKind {
        self.kind
    }

    pub fn sequence_number(&self) -> &str {
        &self.sequence_number
    }

    pub fn effective_date(&self) -> NaiveDate {
        self.effective_date
    }

    pub fn counterparty_id(&self) -> Option<Uuid> {
        self.counterparty_id
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn goodwill(&self) -> bool {
        self.goodwill
    }

    pub fn lines(&self) -> &[MovementLine] {
        &self.lines
    }

    pub fn totals(&self) -> &DocumentTotals {
        &self.totals
    }

    pub fn validated_at(&self) -> DateTime<Utc> {
        self.validated_at
    }

    pub fn committed_at(&self) -> DateTime<Utc> {
        self.committed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(MovementKind::PurchaseOrder, 5, 5)]
    #[case(MovementKind::SupplierReturn, 5, -5)]
    #[case(MovementKind::LossDamage, 3, -3)]
    fn kind_owns_the_sign_convention(
        #[case] kind: MovementKind,
        #[case] quantity: u32,
        #[case] expected: i64,
    ) {
        assert_eq!(kind.signed_delta(quantity), expected);
    }

    #[test]
    fn counterparty_and_goodwill_rules() {
        assert!(MovementKind::PurchaseOrder.requires_counterparty());
        assert!(MovementKind::SupplierReturn.requires_counterparty());
        assert!(!MovementKind::LossDamage.requires_counterparty());
        assert!(MovementKind::SupplierReturn.allows_goodwill());
        assert!(!MovementKind::PurchaseOrder.allows_goodwill());
        assert!(!MovementKind::LossDamage.allows_goodwill());
    }

    #[test]
    fn kind_round_trips_through_strings() {
        assert_eq!(MovementKind::LossDamage.to_string(), "loss_damage");
        assert_eq!(
            "purchase_order".parse::<MovementKind>().unwrap(),
            MovementKind::PurchaseOrder
        );
        assert!("write_off".parse::<MovementKind>().is_err());
    }

    #[test]
    fn draft_validator_rules() {
        let mut draft = MovementDraft::new(MovementKind::PurchaseOrder, "PO-1");
        assert!(draft.validate().is_ok());
        draft.sequence_number = String::new();
        assert!(draft.validate().is_err());
    }
}
