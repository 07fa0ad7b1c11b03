//! In-memory test doubles for the external ports (domain::ports), grounded in the
//! teacher's `infrastructure::mock` module. Sufficient to drive the execution core
//! end-to-end in tests without a live exchange connection.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::info;

use crate::domain::candle::{Candle, Timeframe};
use crate::domain::errors::ExecutionError;
use crate::domain::order::{Order, OrderStatus, OrderType, Side};
use crate::domain::position::ManagedPosition;
use crate::domain::ports::{ExchangeClient, KillSwitchGate, PositionStore, RawExchangePayload, TraceSink};
use crate::domain::trace::Trace;

/// Fills every order immediately at a caller-set mark price, tracks submitted orders,
/// and never rejects — a deterministic double for exercising the state machine and
/// reconciliation without network I/O.
#[derive(Default)]
pub struct SimulatedExchangeClient {
    marks: RwLock<HashMap<String, Decimal>>,
    orders: RwLock<Vec<Order>>,
    instruments: RwLock<Vec<RawExchangePayload>>,
    positions: RwLock<Vec<RawExchangePayload>>,
}

impl SimulatedExchangeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_mark(&self, symbol: &str, price: Decimal) {
        self.marks.write().await.insert(symbol.to_string(), price);
    }

    pub async fn set_instruments(&self, instruments: Vec<RawExchangePayload>) {
        *self.instruments.write().await = instruments;
    }

    pub async fn set_positions(&self, positions: Vec<RawExchangePayload>) {
        *self.positions.write().await = positions;
    }

    pub async fn placed_orders(&self) -> Vec<Order> {
        self.orders.read().await.clone()
    }
}

#[async_trait]
impl ExchangeClient for SimulatedExchangeClient {
    async fn get_ohlcv(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        _since: Option<DateTime<Utc>>,
        _limit: Option<usize>,
    ) -> anyhow::Result<Vec<Candle>> {
        Ok(Vec::new())
    }

    async fn get_futures_tickers_bulk(&self) -> anyhow::Result<HashMap<String, Decimal>> {
        Ok(self.marks.read().await.clone())
    }

    async fn get_futures_instruments(&self) -> anyhow::Result<Vec<RawExchangePayload>> {
        Ok(self.instruments.read().await.clone())
    }

    async fn get_all_futures_positions(&self) -> anyhow::Result<Vec<RawExchangePayload>> {
        Ok(self.positions.read().await.clone())
    }

    async fn get_futures_open_orders(&self) -> anyhow::Result<Vec<RawExchangePayload>> {
        Ok(Vec::new())
    }

    async fn get_futures_balance(&self) -> anyhow::Result<RawExchangePayload> {
        Ok(RawExchangePayload::default())
    }

    async fn place_futures_order(
        &self,
        symbol: &str,
        side: Side,
        order_type: OrderType,
        size_contracts: Decimal,
        price: Option<Decimal>,
        stop_price: Option<Decimal>,
        reduce_only: bool,
        _leverage: Option<Decimal>,
        client_order_id: &str,
    ) -> Result<Order, ExecutionError> {
        let mark = self.marks.read().await.get(symbol).copied();
        let fill_price = price.or(stop_price).or(mark).unwrap_or(Decimal::ZERO);
        let now = Utc::now();
        let order = Order {
            order_id: format!("sim-{}", uuid::Uuid::new_v4()),
            client_order_id: client_order_id.to_string(),
            timestamp: now,
            symbol: symbol.to_string(),
            side,
            order_type,
            size: size_contracts,
            price,
            status: OrderStatus::Filled,
            filled_size: size_contracts,
            filled_price: Some(fill_price),
            filled_at: Some(now),
            parent_order_id: None,
            reduce_only,
        };
        info!(order_id = %order.order_id, %symbol, %size_contracts, "simulated fill");
        self.orders.write().await.push(order.clone());
        Ok(order)
    }

    async fn cancel_futures_order(&self, order_id: &str, _symbol: &str) -> anyhow::Result<()> {
        let mut orders = self.orders.write().await;
        if let Some(o) = orders.iter_mut().find(|o| o.order_id == order_id) {
            o.status = OrderStatus::Cancelled;
        }
        Ok(())
    }

    async fn edit_futures_order(
        &self,
        order_id: &str,
        _symbol: &str,
        stop_price: Option<Decimal>,
        price: Option<Decimal>,
    ) -> anyhow::Result<()> {
        let mut orders = self.orders.write().await;
        if let Some(o) = orders.iter_mut().find(|o| o.order_id == order_id) {
            if price.is_some() {
                o.price = price;
            } else {
                o.price = stop_price;
            }
        }
        Ok(())
    }

    async fn close_position(&self, symbol: &str) -> anyhow::Result<()> {
        let mut positions = self.positions.write().await;
        positions.retain(|p| p.get_str("symbol") != Some(symbol));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPositionStore {
    positions: RwLock<HashMap<String, ManagedPosition>>,
    intent_hashes: RwLock<Vec<(String, String, DateTime<Utc>)>>,
}

impl InMemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PositionStore for InMemoryPositionStore {
    async fn save_position(&self, position: &ManagedPosition) -> anyhow::Result<()> {
        self.positions.write().await.insert(position.symbol.clone(), position.clone());
        Ok(())
    }

    async fn get_active_positions(&self) -> anyhow::Result<Vec<ManagedPosition>> {
        Ok(self.positions.read().await.values().cloned().collect())
    }

    async fn delete_position(&self, symbol: &str) -> anyhow::Result<()> {
        self.positions.write().await.remove(symbol);
        Ok(())
    }

    async fn save_intent_hash(&self, hash: &str, symbol: &str, ts: DateTime<Utc>) -> anyhow::Result<()> {
        self.intent_hashes.write().await.push((hash.to_string(), symbol.to_string(), ts));
        Ok(())
    }

    async fn load_recent_intent_hashes(&self, lookback_hours: i64) -> anyhow::Result<Vec<String>> {
        let cutoff = Utc::now() - chrono::Duration::hours(lookback_hours);
        Ok(self
            .intent_hashes
            .read()
            .await
            .iter()
            .filter(|(_, _, ts)| *ts >= cutoff)
            .map(|(hash, _, _)| hash.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryTraceSink {
    traces: RwLock<Vec<Trace>>,
}

impl InMemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Trace> {
        self.traces.read().await.clone()
    }
}

#[async_trait]
impl TraceSink for InMemoryTraceSink {
    async fn record(&self, trace: Trace) -> anyhow::Result<()> {
        self.traces.write().await.push(trace);
        Ok(())
    }
}

/// Always-inactive kill switch, with an in-memory override for tests that need to
/// exercise the suppressed-entries path without a file on disk.
pub struct InMemoryKillSwitchGate {
    active: Arc<RwLock<bool>>,
}

impl Default for InMemoryKillSwitchGate {
    fn default() -> Self {
        Self { active: Arc::new(RwLock::new(false)) }
    }
}

impl InMemoryKillSwitchGate {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KillSwitchGate for InMemoryKillSwitchGate {
    async fn is_active(&self) -> bool {
        *self.active.read().await
    }

    async fn activate(&self, activated_by: &str, reason: &str) -> anyhow::Result<()> {
        info!(%activated_by, %reason, "kill switch activated");
        *self.active.write().await = true;
        Ok(())
    }

    async fn deactivate(&self) -> anyhow::Result<()> {
        *self.active.write().await = false;
        Ok(())
    }
}
