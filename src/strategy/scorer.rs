//! Signal scoring: five capped components summing to a score in [0, 100]
//! (spec.md §4.2 step 5).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::candle::Candle;
use crate::domain::signal::{HtfBias, ScoreBreakdown, SignalType};
use crate::strategy::cost::cost_efficiency_score;
use crate::strategy::smc::{detect_bos, detect_fvg, detect_order_block};

/// SMC quality (0-25): presence of OB (+10), FVG (+8), BOS (+7), independently
/// detected (a chart can show more than one structure even though the pipeline only
/// trades the single selected setup).
pub fn smc_quality_score(candles: &[Candle]) -> Decimal {
    let mut score = Decimal::ZERO;
    if detect_order_block(candles).is_some() {
        score += dec!(10);
    }
    if detect_fvg(candles).is_some() {
        score += dec!(8);
    }
    if detect_bos(candles, 5).is_some() {
        score += dec!(7);
    }
    score
}

/// HTF alignment (0-20): direction matches bias (+20), neutral bias (+10),
/// counter-trend (0).
pub fn htf_alignment_score(signal_type: SignalType, bias: HtfBias) -> Decimal {
    match (signal_type, bias) {
        (SignalType::Long, HtfBias::Bullish) | (SignalType::Short, HtfBias::Bearish) => dec!(20),
        (_, HtfBias::Neutral) => dec!(10),
        _ => Decimal::ZERO,
    }
}

/// ADX strength (0-15): step function at 20/25/30/40.
pub fn adx_strength_score(adx: Decimal) -> Decimal {
    if adx >= dec!(40) {
        dec!(15)
    } else if adx >= dec!(30) {
        dec!(11)
    } else if adx >= dec!(25) {
        dec!(7)
    } else if adx >= dec!(20) {
        dec!(3)
    } else {
        Decimal::ZERO
    }
}

pub fn total_score(breakdown: &ScoreBreakdown) -> Decimal {
    breakdown.total().min(dec!(100)).max(Decimal::ZERO)
}

pub fn build_cost_score(round_trip_cost_bps: Decimal) -> Decimal {
    cost_efficiency_score(round_trip_cost_bps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn htf_alignment_rewards_matching_direction() {
        assert_eq!(
            htf_alignment_score(SignalType::Long, HtfBias::Bullish),
            dec!(20)
        );
        assert_eq!(
            htf_alignment_score(SignalType::Long, HtfBias::Bearish),
            dec!(0)
        );
        assert_eq!(
            htf_alignment_score(SignalType::Short, HtfBias::Neutral),
            dec!(10)
        );
    }

    #[test]
    fn adx_strength_step_function() {
        assert_eq!(adx_strength_score(dec!(45)), dec!(15));
        assert_eq!(adx_strength_score(dec!(32)), dec!(11));
        assert_eq!(adx_strength_score(dec!(26)), dec!(7));
        assert_eq!(adx_strength_score(dec!(21)), dec!(3));
        assert_eq!(adx_strength_score(dec!(10)), dec!(0));
    }

    #[test]
    fn total_score_is_capped_to_100() {
        let breakdown = ScoreBreakdown {
            smc: dec!(25),
            fib: dec!(20),
            htf: dec!(20),
            adx: dec!(15),
            cost: dec!(20),
        };
        assert_eq!(total_score(&breakdown), dec!(100));
    }
}
