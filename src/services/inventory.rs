//! The inbound surface of the engine: validate a draft, commit the result,
//! and read stock for UI/reporting collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::config::InventoryConfig;
use crate::errors::{LedgerError, ValidationFailure};
use crate::ledger::{CommitReceipt, MovementSummary, StockLedger};
use crate::models::movement::{MovementDraft, ValidatedDocument};
use crate::models::stock_record::StockLevels;
use crate::services::catalog::CatalogService;
use crate::validation::validate_document;

lazy_static! {
    static ref DOCUMENTS_VALIDATED: IntCounter = IntCounter::new(
        "stock_documents_validated_total",
        "Total number of movement documents that passed validation"
    )
    .expect("metric can be created");
    static ref DOCUMENTS_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "stock_documents_rejected_total",
            "Total number of movement documents rejected by validation"
        ),
        &["kind"]
    )
    .expect("metric can be created");
}

/// Read-only stock surface for reporting collaborators. Keeps them off the
/// ledger's mutable API entirely.
#[async_trait]
pub trait StockReader: Send + Sync {
    async fn stock_levels(&self, variant_id: Uuid) -> Option<StockLevels>;
    async fn movement_summary(&self, variant_id: Uuid) -> MovementSummary;
}

/// Service for proposing and committing movement documents.
#[derive(Clone)]
pub struct InventoryService {
    catalog: Arc<CatalogService>,
    ledger: Arc<StockLedger>,
    config: InventoryConfig,
}

impl InventoryService {
    pub fn new(
        catalog: Arc<CatalogService>,
        ledger: Arc<StockLedger>,
        config: InventoryConfig,
    ) -> Self {
        Self {
            catalog,
            ledger,
            config,
        }
    }

    /// Run the validation engine over a draft against current stock.
    ///
    /// Pure and non-blocking; the snapshot may be stale by commit time,
    /// which is why [`commit`](Self::commit) re-validates under the
    /// per-variant locks.
    #[instrument(skip(self, draft), fields(kind = %draft.kind, lines = draft.lines.len()))]
    pub fn validate(&self, draft: &MovementDraft) -> Result<ValidatedDocument, ValidationFailure> {
        match validate_document(
            draft,
            self.catalog.as_ref(),
            self.ledger.as_ref(),
            self.config.max_document_lines,
        ) {
            Ok(document) => {
                DOCUMENTS_VALIDATED.inc();
                Ok(document)
            }
            Err(failure) => {
                DOCUMENTS_REJECTED
                    .with_label_values(&[&draft.kind.to_string()])
                    .inc();
                warn!(
                    sequence = %draft.sequence_number,
                    errors = failure.errors.len(),
                    "movement document rejected by validation"
                );
                Err(failure)
            }
        }
    }

    /// Atomically apply a validated document. On a [`LedgerError::Conflict`]
    /// the caller must re-run [`validate`](Self::validate) against fresh
    /// stock before retrying.
    #[instrument(skip(self, document), fields(document_id = %document.id()))]
    pub async fn commit(
        &self,
        document: ValidatedDocument,
    ) -> Result<CommitReceipt, LedgerError> {
        self.ledger.commit(document).await
    }

    /// Convenience for callers that hold a draft and want a one-shot
    /// validate-then-commit.
    pub async fn validate_and_commit(
        &self,
        draft: &MovementDraft,
    ) -> Result<CommitReceipt, CommitError> {
        let document = self.validate(draft)?;
        Ok(self.commit(document).await?)
    }

    pub fn stock_levels(&self, variant_id: Uuid) -> Option<StockLevels> {
        self.ledger.levels(variant_id)
    }

    pub async fn movement_summary(&self, variant_id: Uuid) -> MovementSummary {
        self.ledger.movement_summary(variant_id).await
    }

    pub fn catalog(&self) -> &CatalogService {
        self.catalog.as_ref()
    }

    pub fn ledger(&self) -> &StockLedger {
        self.ledger.as_ref()
    }
}

/// Either failure mode of the one-shot path, kept distinct so callers can
/// tell a field-level rejection from a retryable conflict.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[async_trait]
impl StockReader for InventoryService {
    async fn stock_levels(&self, variant_id: Uuid) -> Option<StockLevels> {
        self.ledger.levels(variant_id)
    }

    async fn movement_summary(&self, variant_id: Uuid) -> MovementSummary {
        self.ledger.movement_summary(variant_id).await
    }
}
