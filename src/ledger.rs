//! The stock ledger: authoritative per-variant counters, the atomic
//! document applier, and the committed-document journal.
//!
//! Commit is serialized per variant through a lock table keyed by variant
//! id; locks are acquired in sorted id order, so documents touching
//! disjoint variant sets commit fully in parallel and overlapping ones
//! never deadlock. Validation runs lock-free against a snapshot; commit
//! re-validates under the locks and is the sole point of truth.

use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::LedgerError;
use crate::events::{Event, EventSender};
use crate::models::movement::{
    CommittedDocument, DocumentTotals, MovementKind, ValidatedDocument,
};
use crate::models::stock_record::{StockLevels, StockRecord};
use crate::validation::StockView;

lazy_static! {
    static ref DOCUMENTS_COMMITTED: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "stock_documents_committed_total",
            "Total number of committed movement documents"
        ),
        &["kind"]
    )
    .expect("metric can be created");
    static ref COMMIT_CONFLICTS: IntCounter = IntCounter::new(
        "stock_commit_conflicts_total",
        "Total number of commits rejected by commit-time re-validation"
    )
    .expect("metric can be created");
    static ref RESERVATION_FAILURES: IntCounter = IntCounter::new(
        "stock_reservation_failures_total",
        "Total number of failed reserve operations"
    )
    .expect("metric can be created");
}

/// Result of a successful commit: the terminal document, the updated stock
/// view for every touched variant, and the recomputed totals.
#[derive(Debug, Clone, Serialize)]
pub struct CommitReceipt {
    pub document: CommittedDocument,
    pub stock: Vec<StockLevels>,
    pub totals: DocumentTotals,
}

/// Journal aggregate for one variant, for audit/reporting screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MovementSummary {
    pub variant_id: Uuid,
    pub received: u64,
    pub returned_to_supplier: u64,
    pub written_off: u64,
    pub net_units: i64,
}

impl MovementSummary {
    fn empty(variant_id: Uuid) -> Self {
        Self {
            variant_id,
            received: 0,
            returned_to_supplier: 0,
            written_off: 0,
            net_units: 0,
        }
    }
}

/// The stock record set and its single writer.
pub struct StockLedger {
    records: DashMap<Uuid, StockRecord>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    journal: RwLock<Vec<CommittedDocument>>,
    events: EventSender,
    default_low_stock_threshold: i64,
}

impl StockLedger {
    pub fn new(events: EventSender, default_low_stock_threshold: i64) -> Self {
        Self {
            records: DashMap::new(),
            locks: DashMap::new(),
            journal: RwLock::new(Vec::new()),
            events,
            default_low_stock_threshold: default_low_stock_threshold.max(0),
        }
    }

    /// Create the zeroed record for a newly created variant. The catalog is
    /// the only caller; a second creation for the same variant is an
    /// internal error.
    pub(crate) fn create_record(
        &self,
        variant_id: Uuid,
        low_stock_threshold: Option<i64>,
    ) -> Result<(), LedgerError> {
        let threshold = low_stock_threshold.unwrap_or(self.default_low_stock_threshold);
        match self.records.entry(variant_id) {
            Entry::Occupied(_) => Err(LedgerError::invariant(format!(
                "stock record for variant {} already exists",
                variant_id
            ))),
            Entry::Vacant(entry) => {
                entry.insert(StockRecord::new(variant_id, threshold));
                Ok(())
            }
        }
    }

    /// Current levels for one variant; always the result of a
    /// fully-committed document, never a partially-applied intermediate.
    pub fn levels(&self, variant_id: Uuid) -> Option<StockLevels> {
        self.records.get(&variant_id).map(|r| r.levels())
    }

    fn lock_handle(&self, variant_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(variant_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the per-variant locks in sorted id order.
    async fn lock_all(&self, variant_ids: &[Uuid]) -> Vec<OwnedMutexGuard<()>> {
        let mut guards = Vec::with_capacity(variant_ids.len());
        for variant_id in variant_ids {
            guards.push(self.lock_handle(*variant_id).lock_owned().await);
        }
        guards
    }

    /// Atomically apply a validated document.
    ///
    /// Every line is re-checked against the current records under the
    /// variant locks, and new counters are staged on clones; nothing in the
    /// record set changes until the whole document has applied cleanly. Any
    /// failed re-check rejects the document with a retryable
    /// [`LedgerError::Conflict`] and zero mutated records.
    #[instrument(skip(self, document), fields(document_id = %document.id(), kind = %document.kind()))]
    pub async fn commit(&self, document: ValidatedDocument) -> Result<CommitReceipt, LedgerError> {
        let variant_ids = document.variant_ids();
        for variant_id in &variant_ids {
            if !self.records.contains_key(variant_id) {
                return Err(LedgerError::UnknownVariant(*variant_id));
            }
        }

        let _guards = self.lock_all(&variant_ids).await;
        let now = Utc::now();

        // Validation rejects duplicate variants per document, so each line
        // stages against a distinct record.
        let mut staged: Vec<(StockLevels, StockRecord)> = Vec::with_capacity(document.lines().len());
        for line in document.lines() {
            let current = self
                .records
                .get(&line.variant_id)
                .ok_or(LedgerError::UnknownVariant(line.variant_id))?;
            let previous = current.levels();
            let mut record = current.value().clone();
            drop(current);

            if line.delta < 0 {
                let requested = i64::from(line.quantity);
                if requested > record.available() {
                    COMMIT_CONFLICTS.inc();
                    warn!(
                        variant_id = %line.variant_id,
                        requested,
                        available = record.available(),
                        "commit-time re-validation failed; rejecting document"
                    );
                    return Err(LedgerError::Conflict {
                        variant_id: line.variant_id,
                        requested,
                        available: record.available(),
                    });
                }
            }

            record.apply_delta(line.delta, now)?;
            record.bump_version();
            staged.push((previous, record));
        }

        let mut transitions = Vec::with_capacity(staged.len());
        for (previous, record) in staged {
            let levels = record.levels();
            self.records.insert(record.variant_id(), record);
            transitions.push((previous, levels));
        }

        let committed = document.into_committed(now);
        let totals = committed.totals().clone();
        self.journal.write().await.push(committed.clone());
        // Every record is in place; a slow event subscriber must not hold up
        // other commits on these variants.
        drop(_guards);

        DOCUMENTS_COMMITTED
            .with_label_values(&[&committed.kind().to_string()])
            .inc();
        info!(
            sequence = committed.sequence_number(),
            units = totals.total_units,
            %totals.grand_total,
            "movement document committed"
        );

        self.events
            .send_or_log(Event::DocumentCommitted {
                document_id: committed.id(),
                kind: committed.kind(),
                sequence_number: committed.sequence_number().to_string(),
                total_units: totals.total_units,
                grand_total: totals.grand_total,
                committed_at: committed.committed_at(),
            })
            .await;
        for (previous, levels) in &transitions {
            self.events
                .send_or_log(Event::StockLevelChanged {
                    variant_id: levels.variant_id,
                    document_id: committed.id(),
                    previous_on_hand: previous.on_hand,
                    new_on_hand: levels.on_hand,
                })
                .await;
            if previous.status != levels.status {
                self.events
                    .send_or_log(Event::StockStatusChanged {
                        variant_id: levels.variant_id,
                        previous: previous.status,
                        current: levels.status,
                    })
                    .await;
            }
        }

        Ok(CommitReceipt {
            document: committed,
            stock: transitions.into_iter().map(|(_, levels)| levels).collect(),
            totals,
        })
    }

    /// Hold units for an order. Serialized with commits on the same variant;
    /// never changes `on_hand`.
    #[instrument(skip(self))]
    pub async fn reserve(
        &self,
        variant_id: Uuid,
        quantity: i64,
    ) -> Result<StockLevels, LedgerError> {
        let handle = self.lock_handle(variant_id);
        let _guard = handle.lock_owned().await;
        let levels = {
            let mut record = self
                .records
                .get_mut(&variant_id)
                .ok_or(LedgerError::UnknownVariant(variant_id))?;
            record.reserve(quantity, Utc::now()).map_err(|e| {
                RESERVATION_FAILURES.inc();
                e
            })?;
            record.levels()
        };
        self.events
            .send_or_log(Event::StockReserved {
                variant_id,
                quantity,
                reserved: levels.reserved,
            })
            .await;
        Ok(levels)
    }

    /// Release previously reserved units.
    #[instrument(skip(self))]
    pub async fn release(
        &self,
        variant_id: Uuid,
        quantity: i64,
    ) -> Result<StockLevels, LedgerError> {
        let handle = self.lock_handle(variant_id);
        let _guard = handle.lock_owned().await;
        let levels = {
            let mut record = self
                .records
                .get_mut(&variant_id)
                .ok_or(LedgerError::UnknownVariant(variant_id))?;
            record.release(quantity, Utc::now())?;
            record.levels()
        };
        self.events
            .send_or_log(Event::StockReleased {
                variant_id,
                quantity,
                reserved: levels.reserved,
            })
            .await;
        Ok(levels)
    }

    /// Per-variant audit aggregate over every committed document.
    pub async fn movement_summary(&self, variant_id: Uuid) -> MovementSummary {
        let journal = self.journal.read().await;
        let mut summary = MovementSummary::empty(variant_id);
        for document in journal.iter() {
            for line in document.lines().iter().filter(|l| l.variant_id == variant_id) {
                let units = u64::from(line.quantity);
                match document.kind() {
                    MovementKind::PurchaseOrder => summary.received += units,
                    MovementKind::SupplierReturn => summary.returned_to_supplier += units,
                    MovementKind::LossDamage => summary.written_off += units,
                }
                summary.net_units += line.delta;
            }
        }
        summary
    }

    /// Immutable history of committed documents, oldest first.
    pub async fn committed_documents(&self) -> Vec<CommittedDocument> {
        self.journal.read().await.clone()
    }
}

impl StockView for StockLedger {
    fn stock_levels(&self, variant_id: Uuid) -> Option<StockLevels> {
        self.levels(variant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::movement::MovementLine;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn ledger() -> StockLedger {
        let (events, _rx) = EventSender::channel(64);
        StockLedger::new(events, 5)
    }

    fn line(variant_id: Uuid, kind: MovementKind, quantity: u32, unit_cost: Decimal) -> MovementLine {
        MovementLine {
            variant_id,
            quantity,
            delta: kind.signed_delta(quantity),
            unit_cost,
            line_total: unit_cost * Decimal::from(quantity),
            note: None,
        }
    }

    fn document(kind: MovementKind, lines: Vec<MovementLine>) -> ValidatedDocument {
        let line_totals: Vec<Decimal> = lines.iter().map(|l| l.line_total).collect();
        let totals = DocumentTotals {
            grand_total: line_totals.iter().copied().sum(),
            total_units: lines.iter().map(|l| u64::from(l.quantity)).sum(),
            line_totals,
        };
        ValidatedDocument::new(
            kind,
            "DOC-1".into(),
            Utc::now().date_naive(),
            kind.requires_counterparty().then(Uuid::new_v4),
            None,
            false,
            lines,
            totals,
        )
    }

    #[tokio::test]
    async fn purchase_order_raises_on_hand() {
        let ledger = ledger();
        let variant_id = Uuid::new_v4();
        ledger.create_record(variant_id, None).unwrap();

        let receipt = ledger
            .commit(document(
                MovementKind::PurchaseOrder,
                vec![line(variant_id, MovementKind::PurchaseOrder, 5, dec!(2.00))],
            ))
            .await
            .unwrap();

        assert_eq!(receipt.totals.grand_total, dec!(10.00));
        assert_eq!(receipt.totals.total_units, 5);
        assert_eq!(receipt.stock[0].on_hand, 5);
        assert_eq!(ledger.levels(variant_id).unwrap().version, 1);
    }

    #[tokio::test]
    async fn stale_outbound_document_conflicts_and_mutates_nothing() {
        let ledger = ledger();
        let variant_id = Uuid::new_v4();
        ledger.create_record(variant_id, None).unwrap();
        ledger
            .commit(document(
                MovementKind::PurchaseOrder,
                vec![line(variant_id, MovementKind::PurchaseOrder, 8, dec!(1.00))],
            ))
            .await
            .unwrap();

        // Validated against available=8, but a competing write-off lands
        // first and shrinks availability to 2.
        let stale = document(
            MovementKind::LossDamage,
            vec![line(variant_id, MovementKind::LossDamage, 6, dec!(1.00))],
        );
        ledger
            .commit(document(
                MovementKind::LossDamage,
                vec![line(variant_id, MovementKind::LossDamage, 6, dec!(1.00))],
            ))
            .await
            .unwrap();

        let error = ledger.commit(stale).await.unwrap_err();
        assert_matches!(
            error,
            LedgerError::Conflict { requested: 6, available: 2, .. }
        );
        assert_eq!(ledger.levels(variant_id).unwrap().on_hand, 2);
    }

    #[tokio::test]
    async fn conflict_on_any_line_leaves_every_record_untouched() {
        let ledger = ledger();
        let healthy = Uuid::new_v4();
        let starved = Uuid::new_v4();
        ledger.create_record(healthy, None).unwrap();
        ledger.create_record(starved, None).unwrap();
        ledger
            .commit(document(
                MovementKind::PurchaseOrder,
                vec![
                    line(healthy, MovementKind::PurchaseOrder, 10, dec!(1.00)),
                    line(starved, MovementKind::PurchaseOrder, 1, dec!(1.00)),
                ],
            ))
            .await
            .unwrap();

        let error = ledger
            .commit(document(
                MovementKind::SupplierReturn,
                vec![
                    line(healthy, MovementKind::SupplierReturn, 4, dec!(1.00)),
                    line(starved, MovementKind::SupplierReturn, 2, dec!(1.00)),
                ],
            ))
            .await
            .unwrap_err();

        assert_matches!(error, LedgerError::Conflict { .. });
        assert_eq!(ledger.levels(healthy).unwrap().on_hand, 10);
        assert_eq!(ledger.levels(starved).unwrap().on_hand, 1);
        assert_eq!(ledger.levels(healthy).unwrap().version, 1);
    }

    #[tokio::test]
    async fn journal_aggregates_per_variant() {
        let ledger = ledger();
        let variant_id = Uuid::new_v4();
        let other = Uuid::new_v4();
        ledger.create_record(variant_id, None).unwrap();
        ledger.create_record(other, None).unwrap();

        for (kind, quantity) in [
            (MovementKind::PurchaseOrder, 20),
            (MovementKind::LossDamage, 3),
            (MovementKind::SupplierReturn, 2),
        ] {
            ledger
                .commit(document(kind, vec![line(variant_id, kind, quantity, dec!(1.00))]))
                .await
                .unwrap();
        }
        ledger
            .commit(document(
                MovementKind::PurchaseOrder,
                vec![line(other, MovementKind::PurchaseOrder, 7, dec!(1.00))],
            ))
            .await
            .unwrap();

        let summary = ledger.movement_summary(variant_id).await;
        assert_eq!(summary.received, 20);
        assert_eq!(summary.written_off, 3);
        assert_eq!(summary.returned_to_supplier, 2);
        assert_eq!(summary.net_units, 15);
        assert_eq!(ledger.committed_documents().await.len(), 4);
    }

    #[tokio::test]
    async fn reserve_and_release_round_trip() {
        let ledger = ledger();
        let variant_id = Uuid::new_v4();
        ledger.create_record(variant_id, None).unwrap();
        ledger
            .commit(document(
                MovementKind::PurchaseOrder,
                vec![line(variant_id, MovementKind::PurchaseOrder, 10, dec!(1.00))],
            ))
            .await
            .unwrap();

        let levels = ledger.reserve(variant_id, 4).await.unwrap();
        assert_eq!(levels.available, 6);
        assert_matches!(
            ledger.reserve(variant_id, 7).await,
            Err(LedgerError::Conflict { requested: 7, available: 6, .. })
        );
        let levels = ledger.release(variant_id, 4).await.unwrap();
        assert_eq!(levels.available, 10);
        assert_matches!(
            ledger.reserve(Uuid::new_v4(), 1).await,
            Err(LedgerError::UnknownVariant(_))
        );
    }
}
