//! Order placement core (spec.md §4.5.4): resolves instrument spec and size,
//! enforces the idempotency window, pyramiding guard, and entry blocklist, then
//! submits through `ExchangeClient`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::domain::errors::ExecutionError;
use crate::domain::instrument::InstrumentSpec;
use crate::domain::order::{Order, OrderType, Side};
use crate::domain::ports::{ExchangeClient, KillSwitchGate};
use crate::domain::symbol::normalized_base;
use crate::execution::sizing_helpers::{compute_size_contracts, ensure_size_step_aligned, resolve_leverage};

/// Bases that are never tradeable entries regardless of exchange listing (fiat and
/// stablecoin quote-like assets, spec.md §4.5.4 "global exclusion").
const GLOBAL_EXCLUDED_BASES: &[&str] = &[
    "USD", "USDT", "USDC", "DAI", "EUR", "GBP", "TUSD", "BUSD", "FDUSD",
];

pub fn is_globally_excluded(base: &str) -> bool {
    GLOBAL_EXCLUDED_BASES.iter().any(|b| b.eq_ignore_ascii_case(base))
}

/// `symbol + timestamp (to the minute) + signal_type + notional`, hashed so the
/// persisted dedupe record stays a fixed-width opaque string.
pub fn intent_hash(symbol: &str, timestamp: DateTime<Utc>, signal_kind: &str, notional: Decimal) -> String {
    let minute_bucket = timestamp.timestamp() / 60;
    let raw = format!("{symbol}|{minute_bucket}|{signal_kind}|{notional}");
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// An open position or a pending (unfilled) entry order exists for this
    /// normalized symbol and side.
    Blocked,
    Clear,
}

/// Pyramiding guard (spec.md §4.5.4, invariant I7): refuses a new entry whenever an
/// open position or pending entry already exists for the same normalized symbol and
/// side, regardless of which of the venue's symbol spellings the existing one uses.
pub fn pyramiding_guard(
    new_symbol: &str,
    new_side: Side,
    open_positions: &[(String, Side)],
    pending_entries: &[(String, Side)],
) -> EntryState {
    let new_base = normalized_base(new_symbol);
    let conflicts = |items: &[(String, Side)]| {
        items
            .iter()
            .any(|(sym, side)| normalized_base(sym) == new_base && *side == new_side)
    };
    if conflicts(open_positions) || conflicts(pending_entries) {
        EntryState::Blocked
    } else {
        EntryState::Clear
    }
}

pub struct PlaceOrderRequest<'a> {
    pub symbol: &'a str,
    pub side: Side,
    pub size_notional: Option<Decimal>,
    pub size_contracts_override: Option<Decimal>,
    pub requested_leverage: Decimal,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub reduce_only: bool,
    pub mark_price: Decimal,
    /// True only for protective stop-loss (re)placement on an existing position.
    /// The kill switch still blocks new entries and TP ladder updates but lets this
    /// through (spec.md §5 "safety priority").
    pub is_safety_stop: bool,
}

/// Steps 1-6 of spec.md §4.5.4 `place_order`. Idempotency, pyramiding, and the
/// blocklist are checked by the caller before this is invoked (they require access
/// to the intent-hash store and the position/order snapshot, not just the spec).
pub async fn place_order(
    client: &dyn ExchangeClient,
    kill_switch: &dyn KillSwitchGate,
    spec: &InstrumentSpec,
    request: PlaceOrderRequest<'_>,
) -> Result<Order, ExecutionError> {
    if !request.is_safety_stop && kill_switch.is_active().await {
        return Err(ExecutionError::KillSwitchActive);
    }
    let contracts = match request.size_contracts_override {
        Some(size) => size,
        None => {
            let notional = request.size_notional.ok_or_else(|| ExecutionError::SpecNotFound {
                symbol: request.symbol.to_string(),
            })?;
            compute_size_contracts(spec, notional, request.mark_price)?
        }
    };
    let aligned = ensure_size_step_aligned(spec, contracts, request.reduce_only)?;
    let leverage = resolve_leverage(spec, request.requested_leverage);
    let client_order_id = format!("coid-{}", uuid::Uuid::new_v4());

    client
        .place_futures_order(
            request.symbol,
            request.side,
            request.order_type,
            aligned,
            request.price,
            request.stop_price,
            request.reduce_only,
            leverage,
            &client_order_id,
        )
        .await
}

/// Drops local-only pending entry client order ids that the exchange no longer
/// reports, per spec.md §4.5.4 "clean up local-only pending orders... stale state".
pub fn reconcile_stale_pending(local_pending_ids: &HashSet<String>, exchange_order_ids: &HashSet<String>) -> Vec<String> {
    local_pending_ids.difference(exchange_order_ids).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use crate::domain::instrument::{LeverageMode, SizeStepSource};
    use crate::execution::simulated::{InMemoryKillSwitchGate, SimulatedExchangeClient};

    fn test_spec() -> InstrumentSpec {
        InstrumentSpec {
            symbol_raw: "PF_XBTUSD".into(),
            symbol_ccxt: "BTC/USD:USD".into(),
            base: "BTC".into(),
            quote: "USD".into(),
            contract_size: Decimal::ONE,
            min_size: dec!(0.001),
            size_step: dec!(0.001),
            size_step_source: SizeStepSource::AmountPrecision,
            price_tick: None,
            max_leverage: dec!(20),
            leverage_mode: LeverageMode::Flexible,
            allowed_leverages: None,
            supports_reduce_only: true,
        }
    }

    fn base_request(is_safety_stop: bool) -> PlaceOrderRequest<'static> {
        PlaceOrderRequest {
            symbol: "PF_XBTUSD",
            side: Side::Buy,
            size_notional: Some(dec!(1000)),
            size_contracts_override: None,
            requested_leverage: dec!(5),
            order_type: OrderType::Market,
            price: None,
            stop_price: None,
            reduce_only: false,
            mark_price: dec!(50000),
            is_safety_stop,
        }
    }

    #[tokio::test]
    async fn places_order_when_kill_switch_inactive() {
        let client = SimulatedExchangeClient::new();
        client.set_mark("PF_XBTUSD", dec!(50000)).await;
        let kill_switch = InMemoryKillSwitchGate::new();
        let spec = test_spec();
        let order = place_order(&client, &kill_switch, &spec, base_request(false)).await.unwrap();
        assert_eq!(order.symbol, "PF_XBTUSD");
    }

    #[tokio::test]
    async fn kill_switch_active_blocks_new_entry() {
        let client = SimulatedExchangeClient::new();
        client.set_mark("PF_XBTUSD", dec!(50000)).await;
        let kill_switch = InMemoryKillSwitchGate::new();
        kill_switch.activate("test", "manual drill").await.unwrap();
        let spec = test_spec();
        let result = place_order(&client, &kill_switch, &spec, base_request(false)).await;
        assert!(matches!(result, Err(ExecutionError::KillSwitchActive)));
    }

    #[tokio::test]
    async fn kill_switch_active_still_allows_safety_stop() {
        let client = SimulatedExchangeClient::new();
        client.set_mark("PF_XBTUSD", dec!(50000)).await;
        let kill_switch = InMemoryKillSwitchGate::new();
        kill_switch.activate("test", "manual drill").await.unwrap();
        let spec = test_spec();
        let order = place_order(&client, &kill_switch, &spec, base_request(true)).await.unwrap();
        assert_eq!(order.symbol, "PF_XBTUSD");
    }

    #[test]
    fn usdt_and_usd_are_globally_excluded() {
        assert!(is_globally_excluded("USDT"));
        assert!(is_globally_excluded("usd"));
        assert!(!is_globally_excluded("BTC"));
    }

    #[test]
    fn pyramiding_guard_blocks_same_base_same_side_across_symbol_spellings() {
        let open = vec![("PF_XBTUSD".to_string(), Side::Buy)];
        let state = pyramiding_guard("BTC/USD:USD", Side::Buy, &open, &[]);
        assert_eq!(state, EntryState::Blocked);
    }

    #[test]
    fn pyramiding_guard_allows_opposite_side() {
        let open = vec![("PF_XBTUSD".to_string(), Side::Buy)];
        let state = pyramiding_guard("BTC/USD:USD", Side::Sell, &open, &[]);
        assert_eq!(state, EntryState::Clear);
    }

    #[test]
    fn pyramiding_guard_checks_pending_entries_too() {
        let pending = vec![("PF_ETHUSD".to_string(), Side::Sell)];
        let state = pyramiding_guard("ETH/USD:USD", Side::Sell, &[], &pending);
        assert_eq!(state, EntryState::Blocked);
    }

    #[test]
    fn intent_hash_differs_by_notional() {
        let ts = Utc::now();
        let a = intent_hash("PF_XBTUSD", ts, "long", dec!(100));
        let b = intent_hash("PF_XBTUSD", ts, "long", dec!(200));
        assert_ne!(a, b);
    }

    #[test]
    fn intent_hash_is_stable_within_the_same_minute() {
        let ts = Utc::now();
        let a = intent_hash("PF_XBTUSD", ts, "long", dec!(100));
        let b = intent_hash("PF_XBTUSD", ts, "long", dec!(100));
        assert_eq!(a, b);
    }

    #[test]
    fn reconcile_stale_pending_drops_ids_missing_from_exchange() {
        let local: HashSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        let exchange: HashSet<String> = ["a".to_string()].into_iter().collect();
        let stale = reconcile_stale_pending(&local, &exchange);
        assert_eq!(stale, vec!["b".to_string()]);
    }
}
