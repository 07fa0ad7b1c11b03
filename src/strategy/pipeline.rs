//! The strategy signal pipeline: a pure, sequential, side-effect-free transform from
//! four candle slices (1d, 4h, 1h, 15m) to a `Signal` (spec.md §4.2).
//!
//! Forbidden by construction: this module never reads a clock, never calls a network
//! primitive, and never names a price-fetching function — the only data it touches is
//! the candle slices passed in by the caller (spec.md §4.2 "Forbidden", property 3).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::candle::{Candle, Timeframe};
use crate::domain::order::Side;
use crate::domain::signal::{HtfBias, Regime, ScoreBreakdown, Signal, SignalType};
use crate::strategy::cost::{estimate_round_trip_cost_bps, CostModelConfig};
use crate::strategy::fibonacci::fib_confluence_score;
use crate::strategy::indicators::{adx, atr, ema, ema_slope, Slope};
use crate::strategy::scorer::{adx_strength_score, htf_alignment_score, smc_quality_score};
use crate::strategy::smc::{detect_structure, StructureSetup};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub ema_period: usize,
    pub slope_window: usize,
    pub flat_band_pct: Decimal,
    pub adx_period: usize,
    pub atr_period: usize,
    pub adx_threshold: Decimal,
    pub k_tight: Decimal,
    pub k_wide: Decimal,
    pub fib_tolerance_bps: Decimal,
    pub cost: CostModelConfig,
    pub tight_smc_avg_hold_hours: Decimal,
    pub wide_structure_avg_hold_hours: Decimal,
    pub tight_smc_aligned_score_gate: Decimal,
    pub wide_structure_neutral_score_gate: Decimal,
    pub generic_score_gate: Decimal,
    pub max_tp_candidates: usize,
    pub bos_lookback: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ema_period: 200,
            slope_window: 10,
            flat_band_pct: dec!(0.001),
            adx_period: 14,
            atr_period: 14,
            adx_threshold: dec!(20),
            k_tight: dec!(0.5),
            k_wide: dec!(1.5),
            fib_tolerance_bps: dec!(10),
            cost: CostModelConfig::default(),
            tight_smc_avg_hold_hours: dec!(4),
            wide_structure_avg_hold_hours: dec!(18),
            tight_smc_aligned_score_gate: dec!(75),
            wide_structure_neutral_score_gate: dec!(75),
            generic_score_gate: dec!(60),
            max_tp_candidates: 5,
            bos_lookback: 5,
        }
    }
}

fn bias_from_daily(d1: &[Candle], config: &PipelineConfig) -> (HtfBias, Decimal, Decimal) {
    let Some(ema_values) = ema(d1, config.ema_period) else {
        return (HtfBias::Neutral, Decimal::ZERO, Decimal::ZERO);
    };
    let Some(last_ema) = ema_values.last().copied() else {
        return (HtfBias::Neutral, Decimal::ZERO, Decimal::ZERO);
    };
    let Some(close) = d1.last().map(|c| c.close) else {
        return (HtfBias::Neutral, Decimal::ZERO, Decimal::ZERO);
    };
    let slope = ema_slope(&ema_values, config.slope_window, config.flat_band_pct);

    let (bias, slope_value) = match slope {
        Some(Slope::Up) if close > last_ema => (HtfBias::Bullish, Decimal::ONE),
        Some(Slope::Down) if close < last_ema => (HtfBias::Bearish, -Decimal::ONE),
        _ => (HtfBias::Neutral, Decimal::ZERO),
    };
    (bias, slope_value, last_ema)
}

/// Structural swing highs (bullish TP ladder) / lows (bearish) above/below entry,
/// deduped and bounded to `max` entries, nearest-first.
fn structural_tp_ladder(
    candles: &[Candle],
    side: Side,
    entry: Decimal,
    max: usize,
) -> Vec<Decimal> {
    let mut levels: Vec<Decimal> = match side {
        Side::Buy => candles
            .iter()
            .map(|c| c.high)
            .filter(|&h| h > entry)
            .collect(),
        Side::Sell => candles
            .iter()
            .map(|c| c.low)
            .filter(|&l| l < entry)
            .collect(),
    };
    levels.sort();
    if side == Side::Buy {
        levels.dedup();
    } else {
        levels.sort_by(|a, b| b.cmp(a));
        levels.dedup();
    }
    levels.truncate(max);
    levels
}

fn r_multiple_fallbacks(entry: Decimal, stop: Decimal, side: Side) -> Vec<Decimal> {
    let risk_unit = (entry - stop).abs();
    [Decimal::ONE, Decimal::TWO, dec!(3)]
        .into_iter()
        .map(|r| match side {
            Side::Buy => entry + risk_unit * r,
            Side::Sell => entry - risk_unit * r,
        })
        .collect()
}

fn score_gate_for(regime: Regime, bias: HtfBias, config: &PipelineConfig) -> Decimal {
    match (regime, bias) {
        (Regime::TightSmc, HtfBias::Bullish | HtfBias::Bearish) => {
            config.tight_smc_aligned_score_gate
        }
        (Regime::WideStructure, HtfBias::Neutral) => config.wide_structure_neutral_score_gate,
        _ => config.generic_score_gate,
    }
}

/// Run the full pipeline. `timestamp` is supplied by the caller (no internal clock
/// read), satisfying the determinism contract in spec.md §4.2/§8. `m15` is consulted
/// only for the freshness contract (spec.md §4.1): stale or missing 15m data refuses
/// the symbol before any of the heavier timeframes are touched.
pub fn generate_signal(
    symbol: &str,
    timestamp: DateTime<Utc>,
    d1: &[Candle],
    h4: &[Candle],
    h1: &[Candle],
    m15: &[Candle],
    config: &PipelineConfig,
) -> Signal {
    let mut reasoning = String::new();

    // Step 0: 15m freshness gate (spec.md §4.1 — "else the signal pipeline refuses
    // to analyze that symbol").
    match m15.last() {
        None => {
            reasoning.push_str("no 15m data available");
            return Signal::no_signal(timestamp, symbol, reasoning);
        }
        Some(latest) => {
            let age = (timestamp - latest.timestamp).to_std().unwrap_or_default();
            if age > Timeframe::M15.freshness_budget() {
                reasoning.push_str("15m data stale");
                return Signal::no_signal(timestamp, symbol, reasoning);
            }
        }
    }

    // Step 1: bias.
    let (bias, slope_value, _last_ema) = bias_from_daily(d1, config);
    reasoning.push_str(&format!("bias={bias:?}; "));

    // Step 2: structure on the decision timeframe (4h).
    let Some(StructureSetup {
        setup_type,
        side,
        entry_edge,
        far_edge,
    }) = detect_structure(h4)
    else {
        reasoning.push_str("no valid structure found on decision timeframe");
        return Signal::no_signal(timestamp, symbol, reasoning);
    };
    let regime = Regime::from_setup(setup_type);
    reasoning.push_str(&format!("setup={setup_type:?} regime={regime:?} side={side}; "));

    // Step 3: filters (ADX/ATR on 1h).
    let Some(adx_value) = adx(h1, config.adx_period) else {
        reasoning.push_str("ADX unavailable on 1h");
        return Signal::no_signal(timestamp, symbol, reasoning);
    };
    if adx_value < config.adx_threshold {
        reasoning.push_str(&format!("ADX {adx_value} below threshold {}", config.adx_threshold));
        return Signal::no_signal(timestamp, symbol, reasoning);
    }
    let Some(atr_value) = atr(h1, config.atr_period) else {
        reasoning.push_str("ATR unavailable on 1h");
        return Signal::no_signal(timestamp, symbol, reasoning);
    };
    if atr_value <= Decimal::ZERO {
        reasoning.push_str("ATR non-positive");
        return Signal::no_signal(timestamp, symbol, reasoning);
    }
    reasoning.push_str(&format!("adx={adx_value} atr={atr_value}; "));

    // Step 4: levels.
    let entry_price = entry_edge;
    let k = match regime {
        Regime::TightSmc => config.k_tight,
        Regime::WideStructure => config.k_wide,
    };
    let stop_loss = match side {
        Side::Buy => far_edge - k * atr_value,
        Side::Sell => far_edge + k * atr_value,
    };

    if (side == Side::Buy && stop_loss >= entry_price) || (side == Side::Sell && stop_loss <= entry_price) {
        reasoning.push_str("computed stop on wrong side of entry");
        return Signal::no_signal(timestamp, symbol, reasoning);
    }

    let mut tp_candidates = structural_tp_ladder(h4, side, entry_price, config.max_tp_candidates);
    if tp_candidates.is_empty() {
        tp_candidates = r_multiple_fallbacks(entry_price, stop_loss, side);
    }
    let take_profit = tp_candidates.first().copied();

    // Step 5: score.
    let avg_hold_hours = match regime {
        Regime::TightSmc => config.tight_smc_avg_hold_hours,
        Regime::WideStructure => config.wide_structure_avg_hold_hours,
    };
    let round_trip_cost_bps = estimate_round_trip_cost_bps(&config.cost, avg_hold_hours);

    let signal_type = match side {
        Side::Buy => SignalType::Long,
        Side::Sell => SignalType::Short,
    };

    let swing_low = h4.iter().map(|c| c.low).min().unwrap_or(entry_price);
    let swing_high = h4.iter().map(|c| c.high).max().unwrap_or(entry_price);

    let breakdown = ScoreBreakdown {
        smc: smc_quality_score(h4),
        fib: fib_confluence_score(entry_price, swing_low, swing_high, config.fib_tolerance_bps),
        htf: htf_alignment_score(signal_type, bias),
        adx: adx_strength_score(adx_value),
        cost: crate::strategy::scorer::build_cost_score(round_trip_cost_bps),
    };
    let score = breakdown.total().min(dec!(100)).max(Decimal::ZERO);

    let gate = score_gate_for(regime, bias, config);
    reasoning.push_str(&format!("score={score} gate={gate}; "));
    if score < gate {
        reasoning.push_str("score below regime gate");
        return Signal::no_signal(timestamp, symbol, reasoning);
    }

    reasoning.push_str("accepted");

    Signal {
        timestamp,
        symbol: symbol.to_string(),
        signal_type,
        entry_price,
        stop_loss,
        take_profit,
        setup_type: Some(setup_type),
        regime: Some(regime),
        higher_tf_bias: bias,
        adx: adx_value,
        atr: atr_value,
        ema200_slope: slope_value,
        tp_candidates,
        score,
        score_breakdown: breakdown,
        reasoning,
    }
}
