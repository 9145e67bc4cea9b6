use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::models::movement::MovementKind;
use crate::models::stock_record::StockStatus;

/// Events published by the inventory engine.
///
/// Subscribers (notification, reporting, and sync collaborators) consume
/// these from the receiving half of the channel; delivery failure never
/// affects a commit that has already applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    DocumentCommitted {
        document_id: Uuid,
        kind: MovementKind,
        sequence_number: String,
        total_units: u64,
        grand_total: Decimal,
        committed_at: DateTime<Utc>,
    },
    StockLevelChanged {
        variant_id: Uuid,
        document_id: Uuid,
        previous_on_hand: i64,
        new_on_hand: i64,
    },
    StockStatusChanged {
        variant_id: Uuid,
        previous: StockStatus,
        current: StockStatus,
    },
    StockReserved {
        variant_id: Uuid,
        quantity: i64,
        reserved: i64,
    },
    StockReleased {
        variant_id: Uuid,
        quantity: i64,
        reserved: i64,
    },
    ProductPublished(Uuid),
    VariantDeactivated(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Convenience constructor returning the sender together with the
    /// receiving half for subscribers.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when no subscriber is
    /// listening. Used on paths where the state change has already applied.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "event dropped; no active subscriber");
        }
    }
}
