//! Fibonacci confluence scoring component (spec.md §4.2 step 5, 0-20 points).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// The "Optimal Trade Entry" zone: retracement between 0.618 and 0.79 of the swing.
const OTE_LOW: Decimal = dec!(0.618);
const OTE_HIGH: Decimal = dec!(0.79);

const RETRACEMENT_LEVELS: &[Decimal] = &[dec!(0.382), dec!(0.5), dec!(0.618), dec!(0.786)];
const EXTENSION_LEVELS: &[Decimal] = &[dec!(1.272), dec!(1.618)];

/// Retracement ratio of `entry` within the `[swing_low, swing_high]` range, expressed
/// as a fraction of the range from the side the impulse came from. Returns `None` if
/// the range is degenerate.
fn retracement_ratio(entry: Decimal, swing_low: Decimal, swing_high: Decimal) -> Option<Decimal> {
    let range = swing_high - swing_low;
    if range <= Decimal::ZERO {
        return None;
    }
    Some((swing_high - entry) / range)
}

/// Fibonacci confluence score in [0, 20]: OTE zone (+15), near a standard retracement
/// level (+10), near a standard extension level (+5). `tolerance_bps` controls the
/// "near" tolerance for both retracement and extension checks.
pub fn fib_confluence_score(
    entry: Decimal,
    swing_low: Decimal,
    swing_high: Decimal,
    tolerance_bps: Decimal,
) -> Decimal {
    let Some(ratio) = retracement_ratio(entry, swing_low, swing_high) else {
        return Decimal::ZERO;
    };
    let tolerance = tolerance_bps / dec!(10000);

    let mut score = Decimal::ZERO;

    if ratio >= OTE_LOW - tolerance && ratio <= OTE_HIGH + tolerance {
        score += dec!(15);
    } else if RETRACEMENT_LEVELS.iter().any(|lvl| (ratio - lvl).abs() <= tolerance) {
        score += dec!(10);
    }

    let range = swing_high - swing_low;
    if range > Decimal::ZERO {
        let extension_ratio = (swing_high - entry).abs() / range;
        if EXTENSION_LEVELS
            .iter()
            .any(|lvl| (extension_ratio - lvl).abs() <= tolerance)
        {
            score += dec!(5);
        }
    }

    score.min(dec!(20))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ote_zone_scores_fifteen() {
        // ratio = (120 - 100) / (120 - 100) evaluated against swing 100..120, entry at 107 => ratio = 0.65
        let score = fib_confluence_score(dec!(107), dec!(100), dec!(120), dec!(10));
        assert_eq!(score, dec!(15));
    }

    #[test]
    fn standard_retracement_level_scores_ten() {
        // 0.5 retracement: entry = swing_high - 0.5*range
        let entry = dec!(120) - dec!(0.5) * dec!(20);
        let score = fib_confluence_score(entry, dec!(100), dec!(120), dec!(10));
        assert_eq!(score, dec!(10));
    }

    #[test]
    fn far_from_any_level_scores_zero() {
        let score = fib_confluence_score(dec!(110), dec!(100), dec!(120), dec!(10));
        assert_eq!(score, dec!(0));
    }

    #[test]
    fn degenerate_range_scores_zero() {
        let score = fib_confluence_score(dec!(100), dec!(100), dec!(100), dec!(10));
        assert_eq!(score, dec!(0));
    }
}
