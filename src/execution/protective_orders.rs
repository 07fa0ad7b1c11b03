//! Protective order planning (spec.md §4.5.5): computes the stop-loss and TP ladder
//! to place immediately after an entry fill. Pure planning — placing the resulting
//! orders and reacting to placement failure (UNPROTECTED + lock) is the caller's job,
//! since that requires the exchange client and the auction's lock bookkeeping.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::instrument::InstrumentSpec;
use crate::domain::position::ManagementAction;

/// Legacy fixed-TP3 mode splits 40/40/20 across three take-profits; runner mode
/// places only the first two (40/40) and leaves the remaining 20% as an unbounded
/// runner governed by trailing stop updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpLadderMode {
    FixedTp3,
    Runner,
}

#[derive(Debug, Clone, Copy)]
pub struct TpSplits {
    pub tp1_pct: Decimal,
    pub tp2_pct: Decimal,
    pub tp3_pct: Decimal,
}

impl Default for TpSplits {
    fn default() -> Self {
        Self {
            tp1_pct: dec!(0.4),
            tp2_pct: dec!(0.4),
            tp3_pct: dec!(0.2),
        }
    }
}

fn round_down_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    (value / step).floor() * step
}

/// Builds the protective-order action list for a freshly filled entry. `tp_prices`
/// supplies up to 3 candidate take-profit prices in ladder order; entries beyond what
/// `mode` uses are ignored. Returns `PlaceStop` always first, followed by whichever TP
/// legs clear `min_size` after rounding to `size_step`. If none clear it, the ladder
/// collapses to stop-only (spec.md "unsplittable position").
pub fn plan_protective_orders(
    symbol: &str,
    entry_contracts: Decimal,
    futures_stop: Decimal,
    tp_prices: &[Decimal],
    spec: &InstrumentSpec,
    mode: TpLadderMode,
    splits: TpSplits,
) -> Vec<ManagementAction> {
    let mut actions = vec![ManagementAction::PlaceStop {
        symbol: symbol.to_string(),
        price: futures_stop,
    }];

    let legs: &[(Decimal, fn(String, Decimal, Decimal) -> ManagementAction)] = match mode {
        TpLadderMode::FixedTp3 => &[
            (splits.tp1_pct, |symbol, price, qty| ManagementAction::PlaceTp1 { symbol, price, qty }),
            (splits.tp2_pct, |symbol, price, qty| ManagementAction::PlaceTp2 { symbol, price, qty }),
            (splits.tp3_pct, |symbol, price, qty| ManagementAction::PlaceTp3 { symbol, price, qty }),
        ],
        TpLadderMode::Runner => &[
            (splits.tp1_pct, |symbol, price, qty| ManagementAction::PlaceTp1 { symbol, price, qty }),
            (splits.tp2_pct, |symbol, price, qty| ManagementAction::PlaceTp2 { symbol, price, qty }),
        ],
    };

    let mut any_tp_placed = false;
    for (i, (split_pct, ctor)) in legs.iter().enumerate() {
        let Some(&price) = tp_prices.get(i) else {
            continue;
        };
        let raw_qty = entry_contracts * split_pct;
        let qty = round_down_to_step(raw_qty, spec.size_step);
        if qty < spec.min_size {
            continue;
        }
        actions.push(ctor(symbol.to_string(), price, qty));
        any_tp_placed = true;
    }

    if !any_tp_placed {
        return vec![ManagementAction::PlaceStop {
            symbol: symbol.to_string(),
            price: futures_stop,
        }];
    }

    actions
}
