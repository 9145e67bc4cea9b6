//! Stockline
//!
//! Inventory ledger and movement validation engine for multi-vendor
//! marketplace backends. The crate owns the authoritative per-variant stock
//! counters and the rules that govern how stock-affecting documents
//! (purchase orders, supplier returns, loss/damage reports) are validated
//! and applied. Transport, persistence, and presentation live in the
//! surrounding application and talk to this crate through
//! [`services::inventory::InventoryService`] and
//! [`services::catalog::CatalogService`].
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod models;
pub mod services;
pub mod validation;

pub use config::InventoryConfig;
pub use errors::{FieldError, LedgerError, ValidationFailure};
pub use events::{Event, EventSender};
pub use ledger::{CommitReceipt, MovementSummary, StockLedger};
pub use models::movement::{
    CommittedDocument, DocumentTotals, DraftLine, MovementDraft, MovementKind, MovementLine,
    ValidatedDocument,
};
pub use models::stock_record::{StockLevels, StockStatus};
pub use services::catalog::CatalogService;
pub use services::inventory::{CommitError, InventoryService, StockReader};
