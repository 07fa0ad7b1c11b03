//! External collaborators, expressed as traits (spec.md §6). Production connectors are
//! out of scope; the crate ships test doubles in `execution::simulated` sufficient to
//! drive the core end-to-end.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::domain::candle::{Candle, Timeframe};
use crate::domain::errors::ExecutionError;
use crate::domain::order::{Order, OrderType, Side};
use crate::domain::position::ManagedPosition;
use crate::domain::trace::Trace;

/// A raw position/order snapshot as reported by the exchange, kept as dynamic
/// key/value per the adapter contract in spec.md §6, with a typed fast path for the
/// fields the core actually reads.
#[derive(Debug, Clone, Default)]
pub struct RawExchangePayload {
    pub fields: HashMap<String, Value>,
}

impl RawExchangePayload {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn get_decimal(&self, key: &str) -> Option<Decimal> {
        self.fields.get(key).and_then(|v| match v {
            Value::Number(n) => n.as_f64().and_then(Decimal::from_f64_retain),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }
}

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn get_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<Candle>>;

    async fn get_futures_tickers_bulk(&self) -> anyhow::Result<HashMap<String, Decimal>>;

    async fn get_futures_instruments(&self) -> anyhow::Result<Vec<RawExchangePayload>>;

    async fn get_all_futures_positions(&self) -> anyhow::Result<Vec<RawExchangePayload>>;

    async fn get_futures_open_orders(&self) -> anyhow::Result<Vec<RawExchangePayload>>;

    async fn get_futures_balance(&self) -> anyhow::Result<RawExchangePayload>;

    #[allow(clippy::too_many_arguments)]
    async fn place_futures_order(
        &self,
        symbol: &str,
        side: Side,
        order_type: OrderType,
        size_contracts: Decimal,
        price: Option<Decimal>,
        stop_price: Option<Decimal>,
        reduce_only: bool,
        leverage: Option<Decimal>,
        client_order_id: &str,
    ) -> Result<Order, ExecutionError>;

    async fn cancel_futures_order(&self, order_id: &str, symbol: &str) -> anyhow::Result<()>;

    async fn edit_futures_order(
        &self,
        order_id: &str,
        symbol: &str,
        stop_price: Option<Decimal>,
        price: Option<Decimal>,
    ) -> anyhow::Result<()>;

    async fn close_position(&self, symbol: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn save_position(&self, position: &ManagedPosition) -> anyhow::Result<()>;
    async fn get_active_positions(&self) -> anyhow::Result<Vec<ManagedPosition>>;
    async fn delete_position(&self, symbol: &str) -> anyhow::Result<()>;
    async fn save_intent_hash(&self, hash: &str, symbol: &str, ts: DateTime<Utc>) -> anyhow::Result<()>;
    async fn load_recent_intent_hashes(&self, lookback_hours: i64) -> anyhow::Result<Vec<String>>;
}

#[async_trait]
pub trait TraceSink: Send + Sync {
    async fn record(&self, trace: Trace) -> anyhow::Result<()>;
}

#[async_trait]
pub trait KillSwitchGate: Send + Sync {
    async fn is_active(&self) -> bool;
    async fn activate(&self, activated_by: &str, reason: &str) -> anyhow::Result<()>;
    async fn deactivate(&self) -> anyhow::Result<()>;
}
