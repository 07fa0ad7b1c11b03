//! Round-trip cost estimation shared by the score's cost-efficiency component
//! (spec.md §4.2 step 5) and the risk gate's regime cost gates (spec.md §4.3).
//! Pure function of fee/funding constants and a holding-period estimate — no I/O.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone, Copy)]
pub struct CostModelConfig {
    pub taker_fee_bps: Decimal,
    pub funding_rate_bps_per_8h: Decimal,
}

impl Default for CostModelConfig {
    fn default() -> Self {
        Self {
            taker_fee_bps: dec!(6),
            funding_rate_bps_per_8h: dec!(1),
        }
    }
}

/// Estimated round-trip cost in bps: two taker fills (entry + exit) plus
/// probabilistic funding accrued over `avg_hold_hours` at the configured 8h rate.
pub fn estimate_round_trip_cost_bps(
    config: &CostModelConfig,
    avg_hold_hours: Decimal,
) -> Decimal {
    let fee_leg = config.taker_fee_bps * Decimal::TWO;
    let funding_periods = (avg_hold_hours / dec!(8)).max(Decimal::ZERO);
    let funding_leg = config.funding_rate_bps_per_8h * funding_periods;
    fee_leg + funding_leg
}

/// Step function mapping estimated round-trip cost (bps) to the 0-20 cost-efficiency
/// score component (spec.md §4.2 step 5).
pub fn cost_efficiency_score(round_trip_cost_bps: Decimal) -> Decimal {
    if round_trip_cost_bps <= dec!(10) {
        dec!(20)
    } else if round_trip_cost_bps <= dec!(20) {
        dec!(15)
    } else if round_trip_cost_bps <= dec!(35) {
        dec!(10)
    } else if round_trip_cost_bps <= dec!(50) {
        dec!(5)
    } else {
        Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cheap_round_trip_scores_max() {
        assert_eq!(cost_efficiency_score(dec!(5)), dec!(20));
    }

    #[test]
    fn expensive_round_trip_scores_zero() {
        assert_eq!(cost_efficiency_score(dec!(75)), dec!(0));
    }

    #[test]
    fn cost_grows_with_holding_period() {
        let cfg = CostModelConfig::default();
        let short = estimate_round_trip_cost_bps(&cfg, dec!(1));
        let long = estimate_round_trip_cost_bps(&cfg, dec!(24));
        assert!(long > short);
    }
}
