//! Position sizing modes (spec.md §4.3 "Sizing"). Pure functions of the inputs the
//! risk gate already has in hand; no I/O.

use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingMode {
    LeverageBased,
    Fixed,
    Kelly,
    KellyVolatility,
}

impl Default for SizingMode {
    /// `leverage_based` needs nothing beyond what's always available
    /// (equity, leverage, risk_per_trade_pct); the other three modes require a
    /// stop distance or a fitted kelly fraction that may not yet be populated.
    fn default() -> Self {
        SizingMode::LeverageBased
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SizingInputs {
    pub equity: Decimal,
    pub leverage: Decimal,
    pub risk_per_trade_pct: Decimal,
    pub stop_distance_pct: Decimal,
    pub kelly_fraction: Decimal,
    pub kelly_cap: Decimal,
    /// ATR ratio used by `kelly_volatility` to scale size: < 1 in high vol, > 1 in low vol.
    pub atr_vol_scalar: Decimal,
}

/// Raw notional before any caps are applied (spec.md §4.3 "Sizing" then "Caps").
pub fn raw_notional(mode: SizingMode, inputs: &SizingInputs) -> Decimal {
    match mode {
        SizingMode::LeverageBased => {
            inputs.equity * inputs.leverage * inputs.risk_per_trade_pct
        }
        SizingMode::Fixed => {
            if inputs.stop_distance_pct <= Decimal::ZERO {
                return Decimal::ZERO;
            }
            (inputs.equity * inputs.risk_per_trade_pct) / inputs.stop_distance_pct
        }
        SizingMode::Kelly => {
            if inputs.stop_distance_pct <= Decimal::ZERO {
                return Decimal::ZERO;
            }
            let fraction = inputs.kelly_fraction.min(inputs.kelly_cap);
            (inputs.equity * fraction) / inputs.stop_distance_pct
        }
        SizingMode::KellyVolatility => {
            if inputs.stop_distance_pct <= Decimal::ZERO {
                return Decimal::ZERO;
            }
            let fraction = inputs.kelly_fraction.min(inputs.kelly_cap);
            ((inputs.equity * fraction) / inputs.stop_distance_pct) * inputs.atr_vol_scalar
        }
    }
}
