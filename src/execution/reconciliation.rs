//! Exchange/local reconciliation (spec.md §4.5.7). Runs on a 15 s timer and on any
//! fill: adopts or force-closes exchange positions with no local record, deletes
//! local records with no matching exchange position (zombie cleanup), and settles
//! order tracking drift (ghost orders, un-ingested SUBMITTED orders).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::errors::ReconciliationError;
use crate::domain::order::Side;
use crate::domain::position::ManagedPosition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmatchedPositionPolicy {
    Adopt,
    ForceClose,
}

#[derive(Debug, Clone)]
pub struct ExchangePositionSnapshot {
    pub symbol: String,
    pub side: Side,
    /// Size as reported by the venue — notional or contracts depending on
    /// `position_size_is_notional`; already converted to contracts by the caller.
    pub size_contracts: Decimal,
    pub entry_price: Decimal,
    pub liquidation_price: Option<Decimal>,
    pub matching_reduce_only_stop_price: Option<Decimal>,
}

#[derive(Debug, Clone, Copy)]
pub struct ReconciliationConfig {
    pub risk_per_trade_pct: Decimal,
    /// Emergency synthesized stops are clamped to at least this far from the
    /// exchange-reported liquidation price (spec.md §4.5.7).
    pub min_liquidation_buffer_pct: Decimal,
    pub unmatched_position_policy: UnmatchedPositionPolicy,
    pub order_submission_timeout_seconds: i64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            risk_per_trade_pct: dec!(0.02),
            min_liquidation_buffer_pct: dec!(0.35),
            unmatched_position_policy: UnmatchedPositionPolicy::Adopt,
            order_submission_timeout_seconds: 30,
        }
    }
}

/// Converts a venue-reported size to contracts when the venue reports USD notional
/// instead (spec.md §4.5.7 "Size-format handling").
pub fn normalize_reported_size(reported_size: Decimal, mark_price: Decimal, position_size_is_notional: bool) -> Decimal {
    if position_size_is_notional && mark_price > Decimal::ZERO {
        reported_size / mark_price
    } else {
        reported_size
    }
}

/// Synthesizes an emergency stop for an adopted position with no matching reduce-only
/// stop order: `risk_per_trade_pct` away from entry, clamped to at least
/// `min_liquidation_buffer_pct` away from the exchange liquidation price.
fn synthesize_emergency_stop(
    side: Side,
    entry_price: Decimal,
    liquidation_price: Option<Decimal>,
    config: &ReconciliationConfig,
) -> Option<Decimal> {
    if entry_price <= Decimal::ZERO {
        return None;
    }
    let risk_based = match side {
        Side::Buy => entry_price * (Decimal::ONE - config.risk_per_trade_pct),
        Side::Sell => entry_price * (Decimal::ONE + config.risk_per_trade_pct),
    };
    let Some(liq) = liquidation_price else {
        return Some(risk_based);
    };
    let buffer = (entry_price - liq).abs() * config.min_liquidation_buffer_pct;
    let min_safe = match side {
        Side::Buy => liq + buffer,
        Side::Sell => liq - buffer,
    };
    Some(match side {
        Side::Buy => risk_based.max(min_safe),
        Side::Sell => risk_based.min(min_safe),
    })
}

pub enum AdoptionOutcome {
    Adopted { position: ManagedPosition, synthesized_stop: Option<Decimal> },
    ForceClose,
}

/// Policy-driven handling of an exchange position with no local `ManagedPosition`
/// (spec.md §4.5.7). Adopt reconstructs the record and, if no matching reduce-only
/// stop order exists, synthesizes and flags an emergency stop to be placed; when even
/// that cannot be derived, the caller must mark the adopted position UNPROTECTED.
pub fn reconcile_unmatched_exchange_position(
    snapshot: &ExchangePositionSnapshot,
    config: &ReconciliationConfig,
    now: DateTime<Utc>,
) -> Result<AdoptionOutcome, ReconciliationError> {
    if config.unmatched_position_policy == UnmatchedPositionPolicy::ForceClose {
        return Ok(AdoptionOutcome::ForceClose);
    }

    let mut position = ManagedPosition::pending(
        snapshot.symbol.clone(),
        snapshot.side,
        snapshot.size_contracts,
        snapshot.entry_price,
        None,
        None,
        Decimal::ZERO,
        now,
    );
    position.state = crate::domain::position::PositionState::Open;
    position.entry_acknowledged = true;

    let stop = snapshot.matching_reduce_only_stop_price.or_else(|| {
        synthesize_emergency_stop(snapshot.side, snapshot.entry_price, snapshot.liquidation_price, config)
    });

    match stop {
        Some(price) => {
            position.initial_stop_price = Some(price);
            let synthesized = snapshot.matching_reduce_only_stop_price.is_none();
            if !synthesized {
                position.mark_protected();
            }
            Ok(AdoptionOutcome::Adopted {
                position,
                synthesized_stop: synthesized.then_some(price),
            })
        }
        None => {
            position.mark_unprotected("no reduce-only stop found and no stop could be synthesized on adoption");
            Ok(AdoptionOutcome::Adopted { position, synthesized_stop: None })
        }
    }
}

/// Local `ManagedPosition`s with no corresponding exchange position are deleted
/// (zombie cleanup): returns the symbols to drop from the local store.
pub fn find_zombie_positions<'a>(
    local_positions: &'a [ManagedPosition],
    exchange_symbols: &std::collections::HashSet<String>,
) -> Vec<&'a str> {
    local_positions
        .iter()
        .filter(|p| !exchange_symbols.contains(&p.symbol))
        .map(|p| p.symbol.as_str())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderDriftAction {
    /// Locally tracked order no longer seen on the exchange past its submission
    /// window: treat as a ghost and drop it from local tracking.
    DropGhost { client_order_id: String },
    /// Exchange order not locally tracked: ingest it as SUBMITTED.
    IngestUnknown { order_id: String },
}

pub fn reconcile_order_drift(
    locally_tracked: &[(String, DateTime<Utc>)],
    exchange_order_ids: &std::collections::HashSet<String>,
    exchange_untracked_ids: &[String],
    now: DateTime<Utc>,
    config: &ReconciliationConfig,
) -> Vec<OrderDriftAction> {
    let mut actions = Vec::new();
    for (client_order_id, submitted_at) in locally_tracked {
        let age = (now - *submitted_at).num_seconds();
        if !exchange_order_ids.contains(client_order_id) && age > config.order_submission_timeout_seconds {
            actions.push(OrderDriftAction::DropGhost {
                client_order_id: client_order_id.clone(),
            });
        }
    }
    for order_id in exchange_untracked_ids {
        actions.push(OrderDriftAction::IngestUnknown { order_id: order_id.clone() });
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn snapshot(liquidation_price: Option<Decimal>) -> ExchangePositionSnapshot {
        ExchangePositionSnapshot {
            symbol: "PF_XBTUSD".into(),
            side: Side::Buy,
            size_contracts: dec!(1),
            entry_price: dec!(50000),
            liquidation_price,
            matching_reduce_only_stop_price: None,
        }
    }

    #[test]
    fn notional_size_is_converted_to_contracts() {
        let contracts = normalize_reported_size(dec!(5000), dec!(50000), true);
        assert_eq!(contracts, dec!(0.1));
    }

    #[test]
    fn adoption_without_matching_stop_synthesizes_one_clamped_to_liquidation_buffer() {
        let config = ReconciliationConfig::default();
        let outcome = reconcile_unmatched_exchange_position(&snapshot(Some(dec!(45000))), &config, Utc::now()).unwrap();
        match outcome {
            AdoptionOutcome::Adopted { position, synthesized_stop } => {
                assert!(synthesized_stop.is_some());
                let stop = position.initial_stop_price.unwrap();
                // buffer = |50000-45000|*0.35 = 1750 -> min_safe = 46750; risk_based = 49000.
                assert!(stop >= dec!(46750));
                assert!(!position.is_protected);
            }
            AdoptionOutcome::ForceClose => panic!("expected adoption"),
        }
    }

    #[test]
    fn force_close_policy_skips_adoption_entirely() {
        let config = ReconciliationConfig {
            unmatched_position_policy: UnmatchedPositionPolicy::ForceClose,
            ..ReconciliationConfig::default()
        };
        let outcome = reconcile_unmatched_exchange_position(&snapshot(None), &config, Utc::now()).unwrap();
        assert!(matches!(outcome, AdoptionOutcome::ForceClose));
    }

    #[test]
    fn local_position_absent_from_exchange_is_flagged_zombie() {
        let local = vec![ManagedPosition::pending(
            "PF_ETHUSD", Side::Buy, dec!(1), dec!(3000), None, None, Decimal::ZERO, Utc::now(),
        )];
        let exchange: HashSet<String> = HashSet::new();
        let zombies = find_zombie_positions(&local, &exchange);
        assert_eq!(zombies, vec!["PF_ETHUSD"]);
    }

    #[test]
    fn stale_local_order_past_timeout_is_dropped_as_ghost() {
        let old = Utc::now() - chrono::Duration::seconds(60);
        let locally_tracked = vec![("coid-1".to_string(), old)];
        let actions = reconcile_order_drift(&locally_tracked, &HashSet::new(), &[], Utc::now(), &ReconciliationConfig::default());
        assert_eq!(actions, vec![OrderDriftAction::DropGhost { client_order_id: "coid-1".to_string() }]);
    }

    #[test]
    fn untracked_exchange_order_is_ingested() {
        let actions = reconcile_order_drift(&[], &HashSet::new(), &["ex-order-9".to_string()], Utc::now(), &ReconciliationConfig::default());
        assert_eq!(actions, vec![OrderDriftAction::IngestUnknown { order_id: "ex-order-9".to_string() }]);
    }
}
