//! Order monitoring (spec.md §4.5.8): each submitted order gets a timeout and a
//! price-invalidation guard. Placeholder order ids (never acknowledged by the venue)
//! are never cancelled — there is nothing at the venue to cancel.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::order::Order;

#[derive(Debug, Clone, Copy)]
pub struct OrderMonitorConfig {
    pub order_timeout_seconds: i64,
    /// Fraction the mark price may move away from a resting limit/stop price before
    /// the order is considered invalidated and cancelled.
    pub price_invalidation_pct: Decimal,
}

impl Default for OrderMonitorConfig {
    fn default() -> Self {
        Self {
            order_timeout_seconds: 30,
            price_invalidation_pct: dec!(0.02),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorVerdict {
    Keep,
    Cancel,
}

/// Evaluates one submitted order. Placeholder ids (assigned before the venue ack)
/// are always kept — cancelling them is a no-op the venue has no record of.
pub fn evaluate_order(order: &Order, mark_price: Decimal, now: DateTime<Utc>, config: &OrderMonitorConfig) -> MonitorVerdict {
    if order.is_placeholder() {
        return MonitorVerdict::Keep;
    }

    let age_seconds = (now - order.timestamp).num_seconds();
    if age_seconds > config.order_timeout_seconds {
        return MonitorVerdict::Cancel;
    }

    if let Some(resting_price) = order.price {
        if resting_price > Decimal::ZERO {
            let move_pct = (mark_price - resting_price).abs() / resting_price;
            if move_pct > config.price_invalidation_pct {
                return MonitorVerdict::Cancel;
            }
        }
    }

    MonitorVerdict::Keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderStatus, OrderType, Side};

    fn order(order_id: &str, timestamp: DateTime<Utc>, price: Option<Decimal>) -> Order {
        Order {
            order_id: order_id.to_string(),
            client_order_id: "coid-1".to_string(),
            timestamp,
            symbol: "PF_XBTUSD".to_string(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            size: dec!(1),
            price,
            status: OrderStatus::Submitted,
            filled_size: Decimal::ZERO,
            filled_price: None,
            filled_at: None,
            parent_order_id: None,
            reduce_only: false,
        }
    }

    #[test]
    fn placeholder_order_is_never_cancelled_even_when_stale() {
        let ancient = Utc::now() - chrono::Duration::seconds(3600);
        let o = order("unknown_abc", ancient, Some(dec!(50000)));
        assert_eq!(evaluate_order(&o, dec!(100000), Utc::now(), &OrderMonitorConfig::default()), MonitorVerdict::Keep);
    }

    #[test]
    fn order_past_timeout_is_cancelled() {
        let old = Utc::now() - chrono::Duration::seconds(60);
        let o = order("real-order-1", old, Some(dec!(50000)));
        assert_eq!(evaluate_order(&o, dec!(50000), Utc::now(), &OrderMonitorConfig::default()), MonitorVerdict::Cancel);
    }

    #[test]
    fn price_invalidation_cancels_fresh_order() {
        let o = order("real-order-1", Utc::now(), Some(dec!(50000)));
        let verdict = evaluate_order(&o, dec!(52000), Utc::now(), &OrderMonitorConfig::default());
        assert_eq!(verdict, MonitorVerdict::Cancel);
    }

    #[test]
    fn fresh_order_within_tolerance_is_kept() {
        let o = order("real-order-1", Utc::now(), Some(dec!(50000)));
        let verdict = evaluate_order(&o, dec!(50100), Utc::now(), &OrderMonitorConfig::default());
        assert_eq!(verdict, MonitorVerdict::Keep);
    }
}
