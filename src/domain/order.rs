//! Order-side value types shared by the risk gate, the execution core, and reconciliation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    StopLoss,
    TakeProfit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopLoss => "STOP_LOSS",
            OrderType::TakeProfit => "TAKE_PROFIT",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Submitted,
    Filled,
    Cancelled,
    Rejected,
}

/// Order value. `size` is always in contracts (never notional) once the order has
/// been constructed; notional->contract conversion happens earlier, in the sizing
/// helpers (spec.md §4.5.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub client_order_id: String,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub size: Decimal,
    pub price: Option<Decimal>,
    pub status: OrderStatus,
    pub filled_size: Decimal,
    pub filled_price: Option<Decimal>,
    pub filled_at: Option<DateTime<Utc>>,
    pub parent_order_id: Option<String>,
    pub reduce_only: bool,
}

impl Order {
    /// A placeholder id assigned before the venue has acknowledged the order.
    /// Per spec.md §4.5.8, placeholders starting with `unknown_` are never cancelled
    /// because they never made it to the venue.
    pub fn placeholder_id() -> String {
        format!("unknown_{}", uuid::Uuid::new_v4())
    }

    pub fn is_placeholder(&self) -> bool {
        self.order_id.starts_with("unknown_")
    }

    pub fn remaining_size(&self) -> Decimal {
        (self.size - self.filled_size).max(Decimal::ZERO)
    }
}
