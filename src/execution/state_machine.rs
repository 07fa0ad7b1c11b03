//! Position state machine (spec.md §4.5.6): canonical state transitions and the
//! follow-up emission contract. `process_order_update` is pure — it mutates the
//! `ManagedPosition` in place and returns the `ManagementAction`s the caller must
//! execute, in order, within the same cycle.

use rust_decimal::Decimal;

use crate::domain::instrument::InstrumentSpec;
use crate::domain::position::{FillRecord, ManagedPosition, ManagementAction, PositionState};
use crate::execution::protective_orders::{plan_protective_orders, TpLadderMode, TpSplits};

#[derive(Debug, Clone, Copy)]
pub struct StateMachineConfig {
    pub tp_splits: TpSplits,
    pub tp_ladder_mode: TpLadderMode,
    /// Minimum ATR multiple of favorable excursion required before trailing may
    /// activate off the TP1 fill (spec.md §4.5.6 "guard").
    pub trailing_activation_atr_min: Decimal,
    pub trailing_atr_multiple: Decimal,
    /// Minimum price move (as a fraction of mark) required before a trailing
    /// candidate is even considered, to avoid spamming stop updates.
    pub min_stop_update_pct: Decimal,
}

#[derive(Debug, Clone)]
pub enum PositionEvent {
    EntryFilled(FillRecord),
    StopPlaceSucceeded,
    StopPlaceFailed,
    Tp1Filled { fill: FillRecord, atr: Decimal },
    Tp2Filled(FillRecord),
    FinalExitFilled(FillRecord),
    MarkPriceTick { mark_price: Decimal, atr: Decimal },
    PremiseInvalidated,
}

fn tp_price_ladder(position: &ManagedPosition) -> Vec<Decimal> {
    [position.initial_tp1_price, position.initial_tp2_price, position.final_target_price]
        .into_iter()
        .flatten()
        .collect()
}

fn breakeven_price(position: &ManagedPosition, offset_pct: Decimal) -> Decimal {
    let offset = position.initial_entry_price * offset_pct;
    match position.side {
        crate::domain::order::Side::Buy => position.initial_entry_price + offset,
        crate::domain::order::Side::Sell => position.initial_entry_price - offset,
    }
}

fn trailing_candidate(position: &ManagedPosition, atr: Decimal, atr_multiple: Decimal) -> Option<Decimal> {
    let extreme = position.favorable_extreme?;
    let distance = atr * atr_multiple;
    Some(match position.side {
        crate::domain::order::Side::Buy => extreme - distance,
        crate::domain::order::Side::Sell => extreme + distance,
    })
}

/// Price crossing `initial_stop_price` against the position takes absolute priority
/// over every other rule (spec.md §4.5.6): it protects against SL order ghosting.
pub fn price_crossed_initial_stop(position: &ManagedPosition, mark_price: Decimal) -> bool {
    let Some(stop) = position.initial_stop_price else {
        return false;
    };
    match position.side {
        crate::domain::order::Side::Buy => mark_price <= stop,
        crate::domain::order::Side::Sell => mark_price >= stop,
    }
}

/// Advances `position`'s state for `event` and returns the ManagementActions the
/// caller must execute, in emission order, within the same cycle.
pub fn process_order_update(
    position: &mut ManagedPosition,
    event: PositionEvent,
    spec: &InstrumentSpec,
    config: &StateMachineConfig,
) -> Vec<ManagementAction> {
    match event {
        PositionEvent::EntryFilled(fill) => {
            position.record_entry_fill(fill);
            position.freeze_snapshot_targets_if_needed(config.tp_splits.tp1_pct, config.tp_splits.tp2_pct);
            if position.state == PositionState::Pending {
                position.state = PositionState::Open;
            }
            let Some(stop) = position.initial_stop_price else {
                return vec![ManagementAction::MarkUnprotected {
                    symbol: position.symbol.clone(),
                    reason: "no initial stop price set at entry fill".to_string(),
                }];
            };
            let entry_contracts = position.entry_size_initial.unwrap_or(position.initial_size);
            plan_protective_orders(
                &position.symbol,
                entry_contracts,
                stop,
                &tp_price_ladder(position),
                spec,
                config.tp_ladder_mode,
                config.tp_splits,
            )
        }

        PositionEvent::StopPlaceSucceeded => {
            position.mark_protected();
            Vec::new()
        }

        PositionEvent::StopPlaceFailed => {
            position.mark_unprotected("stop-loss placement failed");
            Vec::new()
        }

        PositionEvent::Tp1Filled { fill, atr } => {
            position.record_exit_fill(fill);
            position.tp1_filled = true;
            position.state = PositionState::Partial;
            let mut actions = Vec::new();
            let candidate = breakeven_price(position, config.min_stop_update_pct);
            if position.can_tighten_stop_to(candidate) {
                position.initial_stop_price = Some(candidate);
                position.break_even_active = true;
                actions.push(ManagementAction::UpdateStop {
                    symbol: position.symbol.clone(),
                    price: candidate,
                });
            }
            let favorable_move = (position.initial_tp1_price.unwrap_or(position.initial_entry_price)
                - position.initial_entry_price)
                .abs();
            let guard_threshold = atr * config.trailing_activation_atr_min;
            if !position.trailing_active && atr > Decimal::ZERO && favorable_move >= guard_threshold {
                position.trailing_active = true;
                actions.push(ManagementAction::ActivateTrailing {
                    symbol: position.symbol.clone(),
                });
            }
            actions
        }

        PositionEvent::Tp2Filled(fill) => {
            position.record_exit_fill(fill);
            position.tp2_filled = true;
            position.state = PositionState::Partial;
            Vec::new()
        }

        PositionEvent::FinalExitFilled(fill) => {
            position.record_exit_fill(fill);
            position.state = PositionState::Closed;
            Vec::new()
        }

        PositionEvent::MarkPriceTick { mark_price, atr } => {
            let mut actions = Vec::new();
            if price_crossed_initial_stop(position, mark_price) {
                return vec![ManagementAction::ClosePosition {
                    symbol: position.symbol.clone(),
                    reason: "mark price crossed initial stop".to_string(),
                }];
            }
            position.update_favorable_extreme(mark_price);
            if position.trailing_active {
                if let Some(candidate) = trailing_candidate(position, atr, config.trailing_atr_multiple) {
                    let min_move = mark_price * config.min_stop_update_pct;
                    let moved_enough = position
                        .initial_stop_price
                        .map(|current| (candidate - current).abs() >= min_move)
                        .unwrap_or(true);
                    if moved_enough && position.can_tighten_stop_to(candidate) {
                        position.initial_stop_price = Some(candidate);
                        actions.push(ManagementAction::UpdateStop {
                            symbol: position.symbol.clone(),
                            price: candidate,
                        });
                    }
                }
            }
            actions
        }

        PositionEvent::PremiseInvalidated => vec![ManagementAction::ClosePosition {
            symbol: position.symbol.clone(),
            reason: "premise invalidated".to_string(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::{LeverageMode, SizeStepSource};
    use crate::domain::order::Side;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn spec() -> InstrumentSpec {
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

    fn config() -> StateMachineConfig {
        StateMachineConfig {
            tp_splits: TpSplits::default(),
            tp_ladder_mode: TpLadderMode::FixedTp3,
            trailing_activation_atr_min: dec!(1.5),
            trailing_atr_multiple: dec!(2),
            min_stop_update_pct: dec!(0.001),
        }
    }

    fn long_position() -> ManagedPosition {
        let mut pos = ManagedPosition::pending("PF_XBTUSD", Side::Buy, dec!(1), dec!(50000), None, None, dec!(80), Utc::now());
        pos.initial_stop_price = Some(dec!(49000));
        pos.initial_tp1_price = Some(dec!(50500));
        pos.initial_tp2_price = Some(dec!(51000));
        pos.final_target_price = Some(dec!(52000));
        pos
    }

    #[test]
    fn entry_fill_emits_stop_then_tp_ladder() {
        let mut pos = long_position();
        let fill = FillRecord { order_id: "1".into(), price: dec!(50000), size: dec!(1), at: Utc::now() };
        let actions = process_order_update(&mut pos, PositionEvent::EntryFilled(fill), &spec(), &config());
        assert!(matches!(actions[0], ManagementAction::PlaceStop { .. }));
        assert!(actions.len() >= 2);
        assert_eq!(pos.state, PositionState::Open);
    }

    #[test]
    fn missing_initial_stop_marks_unprotected_instead_of_placing() {
        let mut pos = long_position();
        pos.initial_stop_price = None;
        let fill = FillRecord { order_id: "1".into(), price: dec!(50000), size: dec!(1), at: Utc::now() };
        let actions = process_order_update(&mut pos, PositionEvent::EntryFilled(fill), &spec(), &config());
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], ManagementAction::MarkUnprotected { .. }));
    }

    #[test]
    fn tp1_fill_moves_to_partial_and_tightens_stop_to_breakeven() {
        let mut pos = long_position();
        pos.entry_size_initial = Some(dec!(1));
        let tp1_fill = FillRecord { order_id: "tp1".into(), price: dec!(50500), size: dec!(0.4), at: Utc::now() };
        let actions = process_order_update(
            &mut pos,
            PositionEvent::Tp1Filled { fill: tp1_fill, atr: dec!(100) },
            &spec(),
            &config(),
        );
        assert_eq!(pos.state, PositionState::Partial);
        assert!(pos.tp1_filled);
        assert!(actions.iter().any(|a| matches!(a, ManagementAction::UpdateStop { .. })));
        assert!(pos.initial_stop_price.unwrap() > dec!(49000));
        assert!(actions.iter().any(|a| matches!(a, ManagementAction::ActivateTrailing { .. })));
    }

    #[test]
    fn price_crossing_initial_stop_takes_absolute_priority() {
        let mut pos = long_position();
        let actions = process_order_update(
            &mut pos,
            PositionEvent::MarkPriceTick { mark_price: dec!(48900), atr: dec!(200) },
            &spec(),
            &config(),
        );
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], ManagementAction::ClosePosition { .. }));
    }

    #[test]
    fn premise_invalidation_closes_at_market() {
        let mut pos = long_position();
        let actions = process_order_update(&mut pos, PositionEvent::PremiseInvalidated, &spec(), &config());
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], ManagementAction::ClosePosition { .. }));
    }

    #[test]
    fn stop_cannot_loosen_during_trailing_tick() {
        let mut pos = long_position();
        pos.trailing_active = true;
        pos.favorable_extreme = Some(dec!(49500));
        // Candidate from this extreme/atr would sit below the current stop; must be rejected.
        let actions = process_order_update(
            &mut pos,
            PositionEvent::MarkPriceTick { mark_price: dec!(49600), atr: dec!(1000) },
            &spec(),
            &config(),
        );
        assert!(actions.is_empty());
        assert_eq!(pos.initial_stop_price, Some(dec!(49000)));
    }
}
