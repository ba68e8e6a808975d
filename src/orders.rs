use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    New,
    Submitted,
    PartiallyFilled,
    Filled,
    Canceled,
    Invalid,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Submitted => "submitted",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Invalid => "invalid",
        }
    }
}

/// Read-only view of an order from the algorithm's ledger. Ids increase monotonically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: u64,
    pub symbol: String,
    pub quantity: f64,
    pub price: f64,
    pub status: OrderStatus,
    pub time: DateTime<Utc>,
    pub tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderEvent {
    pub order_id: u64,
    pub symbol: String,
    pub status: OrderStatus,
    pub fill_price: f64,
    pub fill_quantity: f64,
    pub time: DateTime<Utc>,
    pub message: String,
}

/// Cursor over order ids already reported as deltas.
#[derive(Debug, Default)]
pub struct OrderDeltaTracker {
    last_seen_id: Option<u64>,
}

impl OrderDeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_seen_id(&self) -> Option<u64> {
        self.last_seen_id
    }

    /// Orders with an id above the cursor, in id order. The cursor moves to the largest id
    /// returned and never moves backwards; an empty delta leaves it untouched.
    pub fn take_new(&mut self, orders: &[Order]) -> Vec<Order> {
        let mut fresh: Vec<Order> = orders
            .iter()
            .filter(|o| self.last_seen_id.map_or(true, |last| o.id > last))
            .cloned()
            .collect();
        fresh.sort_by_key(|o| o.id);
        if let Some(max) = fresh.last().map(|o| o.id) {
            self.last_seen_id = Some(self.last_seen_id.map_or(max, |last| last.max(max)));
        }
        fresh
    }
}
