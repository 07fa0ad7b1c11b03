//! Spot-to-futures price translation (spec.md §4.5.3). The strategy pipeline reasons
//! over spot candles; orders are placed on the futures venue. We preserve the
//! percent distance from entry observed on spot and re-anchor it to the current
//! futures mark, rather than carrying the spot price straight across.

use rust_decimal::Decimal;

use crate::domain::signal::SignalType;

/// `|entry - other| / entry`, or `None` if entry is non-positive (undefined distance).
fn pct_distance(entry: Decimal, other: Decimal) -> Option<Decimal> {
    if entry <= Decimal::ZERO {
        return None;
    }
    Some((entry - other).abs() / entry)
}

/// Re-anchors a spot-derived stop/TP price onto the futures mark, preserving the
/// percent distance from spot entry and choosing the sign by side: a long's stop is
/// below mark, short's stop is above; long's TP is above mark, short's TP is below.
fn reanchor(mark: Decimal, pct: Decimal, side: SignalType, is_stop: bool) -> Decimal {
    let below = match (side, is_stop) {
        (SignalType::Long, true) => true,
        (SignalType::Long, false) => false,
        (SignalType::Short, true) => false,
        (SignalType::Short, false) => true,
        (SignalType::NoSignal, _) => true,
    };
    if below {
        mark * (Decimal::ONE - pct)
    } else {
        mark * (Decimal::ONE + pct)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConvertedPrices {
    pub futures_stop: Decimal,
    pub futures_take_profit: Option<Decimal>,
}

/// Converts a spot entry/stop/take-profit triple into futures-anchored prices at the
/// given futures mark. Returns `None` if the spot entry price is non-positive
/// (distance is undefined and no safe conversion exists).
pub fn convert_to_futures_prices(
    side: SignalType,
    spot_entry: Decimal,
    spot_stop: Decimal,
    spot_take_profit: Option<Decimal>,
    futures_mark: Decimal,
) -> Option<ConvertedPrices> {
    let stop_pct = pct_distance(spot_entry, spot_stop)?;
    let futures_stop = reanchor(futures_mark, stop_pct, side, true);
    let futures_take_profit = match spot_take_profit {
        Some(tp) => {
            let tp_pct = pct_distance(spot_entry, tp)?;
            Some(reanchor(futures_mark, tp_pct, side, false))
        }
        None => None,
    };
    Some(ConvertedPrices {
        futures_stop,
        futures_take_profit,
    })
}
