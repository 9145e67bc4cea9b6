use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single rule violation, addressed to the input field that caused it.
///
/// Paths follow the `lines[<index>].<field>` convention for line items
/// (`lines[2].quantity`) and plain field names for document-level problems
/// (`counterparty_id`, `lines`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// The complete set of field errors for a rejected document or catalog input.
///
/// Always returned as structured data, never panicked or logged-and-dropped:
/// the caller receives every violation in one response and can surface each
/// message next to the originating input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("input rejected with {} field error(s)", .errors.len())]
pub struct ValidationFailure {
    pub errors: Vec<FieldError>,
}

impl ValidationFailure {
    pub fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError::new(path, message)],
        }
    }

    /// First error recorded against `path`, if any.
    pub fn for_path(&self, path: &str) -> Option<&FieldError> {
        self.errors.iter().find(|e| e.path == path)
    }
}

/// Failures raised by the ledger at commit time.
///
/// `Conflict` is retryable: the caller must re-run validation against fresh
/// stock before retrying. `Invariant` is a programming error and is never
/// triggered by caller input; it aborts the commit with zero records mutated.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(
        "stock for variant {variant_id} changed since validation: requested {requested}, available {available}"
    )]
    Conflict {
        variant_id: Uuid,
        requested: i64,
        available: i64,
    },

    #[error("no stock record exists for variant {0}")]
    UnknownVariant(Uuid),

    #[error("quantity must be positive (got {0})")]
    InvalidQuantity(i64),

    #[error("ledger invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn invariant(message: impl Into<String>) -> Self {
        LedgerError::Invariant(message.into())
    }

    /// Whether the caller may retry after re-validating against fresh stock.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Conflict { .. })
    }
}
