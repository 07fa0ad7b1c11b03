//! The Signal value produced by the strategy pipeline (spec.md §3, §4.2).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::Signed;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalType {
    Long,
    Short,
    NoSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetupType {
    OrderBlock,
    FairValueGap,
    BreakOfStructure,
    Trend,
}

/// Regime tag driving stop sizing, cost limits, and cooldowns (GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    TightSmc,
    WideStructure,
}

impl Regime {
    pub fn from_setup(setup: SetupType) -> Self {
        match setup {
            SetupType::OrderBlock | SetupType::FairValueGap => Regime::TightSmc,
            SetupType::BreakOfStructure | SetupType::Trend => Regime::WideStructure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HtfBias {
    Bullish,
    Bearish,
    Neutral,
}

/// The five capped scoring components from spec.md §4.2 step 5, summed into `Signal.score`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ScoreBreakdown {
    pub smc: Decimal,
    pub fib: Decimal,
    pub htf: Decimal,
    pub adx: Decimal,
    pub cost: Decimal,
}

impl ScoreBreakdown {
    pub fn total(&self) -> Decimal {
        self.smc + self.fib + self.htf + self.adx + self.cost
    }
}

/// A structured trade proposal. A `Signal` with `signal_type == NoSignal` carries a
/// `reasoning` string explaining why and all other numeric fields at their defaults;
/// it is a pure value either way, never an `Option`/`Result` wrapper, so the pipeline
/// has exactly one return type (mirrors the reference's `TradingStrategy::analyze`
/// signature returning a concrete `Signal`, not an enum of signal/no-signal types).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub signal_type: SignalType,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Option<Decimal>,
    pub setup_type: Option<SetupType>,
    pub regime: Option<Regime>,
    pub higher_tf_bias: HtfBias,
    pub adx: Decimal,
    pub atr: Decimal,
    pub ema200_slope: Decimal,
    pub tp_candidates: Vec<Decimal>,
    pub score: Decimal,
    pub score_breakdown: ScoreBreakdown,
    pub reasoning: String,
}

impl Signal {
    pub fn no_signal(timestamp: DateTime<Utc>, symbol: impl Into<String>, reasoning: String) -> Self {
        Self {
            timestamp,
            symbol: symbol.into(),
            signal_type: SignalType::NoSignal,
            entry_price: Decimal::ZERO,
            stop_loss: Decimal::ZERO,
            take_profit: None,
            setup_type: None,
            regime: None,
            higher_tf_bias: HtfBias::Neutral,
            adx: Decimal::ZERO,
            atr: Decimal::ZERO,
            ema200_slope: Decimal::ZERO,
            tp_candidates: Vec::new(),
            score: Decimal::ZERO,
            score_breakdown: ScoreBreakdown::default(),
            reasoning,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.signal_type != SignalType::NoSignal
    }

    /// Invariant from spec.md §4.2 step 4: `sign(stop - entry) = -sign(tp - entry)`.
    pub fn stop_tp_signs_are_opposed(&self) -> bool {
        let Some(tp) = self.take_profit else {
            return true;
        };
        let stop_sign = (self.stop_loss - self.entry_price).signum();
        let tp_sign = (tp - self.entry_price).signum();
        stop_sign == -tp_sign || stop_sign.is_zero() || tp_sign.is_zero()
    }

    /// R-multiple: distance from entry to stop (GLOSSARY: "R (risk unit)").
    pub fn risk_unit(&self) -> Decimal {
        (self.entry_price - self.stop_loss).abs()
    }
}
