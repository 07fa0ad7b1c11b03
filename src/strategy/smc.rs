//! Smart Money Concepts structure detection: Order Blocks, Fair Value Gaps, Break of
//! Structure (spec.md §4.2 step 2, GLOSSARY). Grounded on the reference's
//! `SMCStrategy::detect_fvg`/order-block scan, generalized to return a structured
//! `StructureSetup` instead of ad hoc tuples, and extended with BOS detection.

use rust_decimal::Decimal;

use crate::domain::candle::Candle;
use crate::domain::order::Side;
use crate::domain::signal::SetupType;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StructureSetup {
    pub setup_type: SetupType,
    pub side: Side,
    /// Entry-facing edge of the zone (OB high / FVG bottom for bullish, etc).
    pub entry_edge: Decimal,
    /// Opposite edge of the zone, used as the stop anchor.
    pub far_edge: Decimal,
}

/// Detect the most recent valid, unmitigated Fair Value Gap.
///
/// A bullish FVG is `c3.low > c1.high` with the middle candle unmitigated by any
/// later wick re-entering the gap zone. Scans recent-to-old so the *most recent*
/// unmitigated instance wins, per spec.md §4.2 step 2.
pub fn detect_fvg(candles: &[Candle]) -> Option<StructureSetup> {
    if candles.len() < 5 {
        return None;
    }
    let scan_depth = 20.min(candles.len() - 3);
    let start = candles.len() - scan_depth - 2;

    for i in (start..candles.len() - 2).rev() {
        let c1 = &candles[i];
        let c3 = &candles[i + 2];

        if c3.low > c1.high {
            let bottom = c1.high;
            let top = c3.low;
            let mitigated = candles[i + 3..].iter().any(|c| c.low < bottom);
            if !mitigated {
                return Some(StructureSetup {
                    setup_type: SetupType::FairValueGap,
                    side: Side::Buy,
                    entry_edge: bottom,
                    far_edge: top,
                });
            }
        }

        if c1.low > c3.high {
            let top = c1.low;
            let bottom = c3.high;
            let mitigated = candles[i + 3..].iter().any(|c| c.high > top);
            if !mitigated {
                return Some(StructureSetup {
                    setup_type: SetupType::FairValueGap,
                    side: Side::Sell,
                    entry_edge: top,
                    far_edge: bottom,
                });
            }
        }
    }
    None
}

/// Detect the most recent Order Block: the last bearish (resp. bullish) candle before
/// a displacement impulse whose range is >= 1.5x the median of the last 20 candle
/// ranges. OB zone is `[low, high]` of that candle.
pub fn detect_order_block(candles: &[Candle]) -> Option<StructureSetup> {
    if candles.len() < 22 {
        return None;
    }

    let median_range = median_of_last_n_ranges(candles, 20);
    if median_range <= Decimal::ZERO {
        return None;
    }
    let impulse_threshold = median_range * Decimal::new(15, 1); // 1.5x

    for i in (1..candles.len()).rev() {
        let impulse = &candles[i];
        if impulse.range() < impulse_threshold {
            continue;
        }
        let preceding = &candles[i - 1];
        if impulse.is_bullish() && preceding.is_bearish() {
            return Some(StructureSetup {
                setup_type: SetupType::OrderBlock,
                side: Side::Buy,
                entry_edge: preceding.high,
                far_edge: preceding.low,
            });
        }
        if impulse.is_bearish() && preceding.is_bullish() {
            return Some(StructureSetup {
                setup_type: SetupType::OrderBlock,
                side: Side::Sell,
                entry_edge: preceding.low,
                far_edge: preceding.high,
            });
        }
    }
    None
}

fn median_of_last_n_ranges(candles: &[Candle], n: usize) -> Decimal {
    let depth = n.min(candles.len().saturating_sub(1));
    if depth == 0 {
        return Decimal::ZERO;
    }
    let mut ranges: Vec<Decimal> = candles[candles.len() - depth - 1..candles.len() - 1]
        .iter()
        .map(|c| c.range())
        .collect();
    ranges.sort();
    let mid = ranges.len() / 2;
    if ranges.len() % 2 == 0 && mid > 0 {
        (ranges[mid - 1] + ranges[mid]) / Decimal::TWO
    } else {
        ranges[mid]
    }
}

/// Break of Structure: the last `lookback` candles break the previous swing
/// high (bullish) / low (bearish).
pub fn detect_bos(candles: &[Candle], lookback: usize) -> Option<StructureSetup> {
    if candles.len() < lookback + 5 {
        return None;
    }
    let recent = &candles[candles.len() - lookback..];
    let prior = &candles[..candles.len() - lookback];

    let prior_swing_high = prior.iter().map(|c| c.high).max().unwrap_or(Decimal::ZERO);
    let prior_swing_low = prior.iter().map(|c| c.low).min().unwrap_or(Decimal::ZERO);

    let breaks_high = recent.iter().any(|c| c.close > prior_swing_high);
    let breaks_low = recent.iter().any(|c| c.close < prior_swing_low);

    let last = candles.last().unwrap();
    if breaks_high && !breaks_low {
        Some(StructureSetup {
            setup_type: SetupType::BreakOfStructure,
            side: Side::Buy,
            entry_edge: last.close,
            far_edge: prior_swing_low,
        })
    } else if breaks_low && !breaks_high {
        Some(StructureSetup {
            setup_type: SetupType::BreakOfStructure,
            side: Side::Sell,
            entry_edge: last.close,
            far_edge: prior_swing_high,
        })
    } else {
        None
    }
}

/// Select the most recent valid structure across OB, FVG, BOS, preferring the
/// tighter SMC setups (OB, then FVG) before falling back to BOS, matching the
/// regime ordering in spec.md §4.2 step 2 (`tight_smc` setups take priority over
/// `wide_structure`).
pub fn detect_structure(candles: &[Candle]) -> Option<StructureSetup> {
    detect_order_block(candles)
        .or_else(|| detect_fvg(candles))
        .or_else(|| detect_bos(candles, 5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::Timeframe;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn candle(i: i64, o: Decimal, h: Decimal, l: Decimal, c: Decimal) -> Candle {
        Candle::new(
            Utc.timestamp_opt(1_700_000_000 + i * 3600, 0).unwrap(),
            "BTC/USD",
            Timeframe::H4,
            o,
            h,
            l,
            c,
            dec!(10),
        )
        .unwrap()
    }

    fn flat_series(n: i64) -> Vec<Candle> {
        (0..n)
            .map(|i| candle(i, dec!(100), dec!(101), dec!(99), dec!(100)))
            .collect()
    }

    #[test]
    fn bullish_fvg_detected_and_unmitigated() {
        let mut candles = flat_series(10);
        // c1 high=101, c2 impulsive, c3 low=110 (gap 101..110)
        candles.push(candle(100, dec!(100), dec!(101), dec!(99), dec!(100)));
        candles.push(candle(101, dec!(101), dec!(108), dec!(101), dec!(107)));
        candles.push(candle(102, dec!(110), dec!(112), dec!(110), dec!(111)));
        // later candle touches the zone but does not close below bottom
        candles.push(candle(103, dec!(110), dec!(111), dec!(101.5), dec!(110)));

        let setup = detect_fvg(&candles).unwrap();
        assert_eq!(setup.setup_type, SetupType::FairValueGap);
        assert_eq!(setup.side, Side::Buy);
        assert_eq!(setup.entry_edge, dec!(101));
    }

    #[test]
    fn mitigated_fvg_is_not_returned() {
        let mut candles = flat_series(10);
        candles.push(candle(100, dec!(100), dec!(101), dec!(99), dec!(100)));
        candles.push(candle(101, dec!(101), dec!(108), dec!(101), dec!(107)));
        candles.push(candle(102, dec!(110), dec!(112), dec!(110), dec!(111)));
        // fully closes the gap: low goes below c1.high
        candles.push(candle(103, dec!(110), dec!(111), dec!(100), dec!(110)));

        assert!(detect_fvg(&candles).is_none());
    }

    #[test]
    fn order_block_detected_before_impulse() {
        let mut candles = flat_series(25);
        // bearish candle then a large bullish impulse (>= 1.5x median range of ~2)
        candles.push(candle(200, dec!(100), dec!(101), dec!(97), dec!(98)));
        candles.push(candle(201, dec!(98), dec!(115), dec!(98), dec!(114)));

        let setup = detect_order_block(&candles).unwrap();
        assert_eq!(setup.setup_type, SetupType::OrderBlock);
        assert_eq!(setup.side, Side::Buy);
        assert_eq!(setup.entry_edge, dec!(101));
        assert_eq!(setup.far_edge, dec!(97));
    }

    #[test]
    fn bos_detects_break_above_prior_swing_high() {
        let mut candles = flat_series(20);
        candles.push(candle(300, dec!(100), dec!(105), dec!(99), dec!(104)));

        let setup = detect_bos(&candles, 5).unwrap();
        assert_eq!(setup.setup_type, SetupType::BreakOfStructure);
        assert_eq!(setup.side, Side::Buy);
    }
}
