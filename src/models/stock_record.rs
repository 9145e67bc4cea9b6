use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::LedgerError;

/// Stock availability bucket derived from the on-hand counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

/// The authoritative counters for one variant.
///
/// Counters are private: every mutation goes through the invariant-checked
/// methods below, and those are crate-internal so the ledger is the only
/// writer. `on_hand` never goes negative and `reserved` never exceeds
/// `on_hand`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRecord {
    variant_id: Uuid,
    on_hand: i64,
    reserved: i64,
    low_stock_threshold: i64,
    version: u64,
    updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// A zeroed record, created alongside its variant.
    pub fn new(variant_id: Uuid, low_stock_threshold: i64) -> Self {
        Self {
            variant_id,
            on_hand: 0,
            reserved: 0,
            low_stock_threshold: low_stock_threshold.max(0),
            version: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn variant_id(&self) -> Uuid {
        self.variant_id
    }

    pub fn on_hand(&self) -> i64 {
        self.on_hand
    }

    pub fn reserved(&self) -> i64 {
        self.reserved
    }

    pub fn available(&self) -> i64 {
        self.on_hand - self.reserved
    }

    pub fn low_stock_threshold(&self) -> i64 {
        self.low_stock_threshold
    }

    /// Bumped once per committed document touching this record.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn status(&self) -> StockStatus {
        if self.on_hand < 1 {
            StockStatus::OutOfStock
        } else if self.on_hand <= self.low_stock_threshold {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    /// Read view handed to callers; always the result of a fully-committed
    /// document.
    pub fn levels(&self) -> StockLevels {
        StockLevels {
            variant_id: self.variant_id,
            on_hand: self.on_hand,
            reserved: self.reserved,
            available: self.available(),
            status: self.status(),
            version: self.version,
        }
    }

    /// Apply a signed movement delta. The ledger has already re-checked
    /// availability under the variant lock; a violation here is an internal
    /// error, not caller input.
    pub(crate) fn apply_delta(&mut self, delta: i64, at: DateTime<Utc>) -> Result<(), LedgerError> {
        let next = self.on_hand.checked_add(delta).ok_or_else(|| {
            LedgerError::invariant(format!(
                "on-hand overflow for variant {}: {} + {}",
                self.variant_id, self.on_hand, delta
            ))
        })?;
        if next < 0 {
            return Err(LedgerError::invariant(format!(
                "on-hand for variant {} would go negative ({} + {})",
                self.variant_id, self.on_hand, delta
            )));
        }
        if self.reserved > next {
            return Err(LedgerError::invariant(format!(
                "reserved ({}) would exceed on-hand ({}) for variant {}",
                self.reserved, next, self.variant_id
            )));
        }
        self.on_hand = next;
        self.updated_at = at;
        Ok(())
    }

    pub(crate) fn reserve(&mut self, quantity: i64, at: DateTime<Utc>) -> Result<(), LedgerError> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }
        if quantity > self.available() {
            return Err(LedgerError::Conflict {
                variant_id: self.variant_id,
                requested: quantity,
                available: self.available(),
            });
        }
        self.reserved += quantity;
        self.updated_at = at;
        Ok(())
    }

    pub(crate) fn release(&mut self, quantity: i64, at: DateTime<Utc>) -> Result<(), LedgerError> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }
        if quantity > self.reserved {
            return Err(LedgerError::invariant(format!(
                "release of {} exceeds reserved {} for variant {}",
                quantity, self.reserved, self.variant_id
            )));
        }
        self.reserved -= quantity;
        self.updated_at = at;
        Ok(())
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }
}

/// Point-in-time read of one variant's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    pub variant_id: Uuid,
    pub on_hand: i64,
    pub reserved: i64,
    pub available: i64,
    pub status: StockStatus,
    pub version: u64,
}
