//! InstrumentSpec — per-contract exchange metadata (spec.md §3, §4.5.1).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeverageMode {
    Flexible,
    Fixed,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeStepSource {
    AmountPrecision,
    LotSize,
    QuantityIncrement,
    ContractValueTradePrecision,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub symbol_raw: String,
    pub symbol_ccxt: String,
    pub base: String,
    pub quote: String,
    pub contract_size: Decimal,
    pub min_size: Decimal,
    pub size_step: Decimal,
    pub size_step_source: SizeStepSource,
    pub price_tick: Option<Decimal>,
    pub max_leverage: Decimal,
    pub leverage_mode: LeverageMode,
    pub allowed_leverages: Option<Vec<Decimal>>,
    /// Per open question in spec.md §9: the source system assumes this is always
    /// true for perpetuals on the primary venue; we keep the field for fidelity but
    /// never observed it false.
    pub supports_reduce_only: bool,
}

impl InstrumentSpec {
    pub fn inferred_precision_amount(&self) -> Option<u32> {
        if self.size_step <= Decimal::ZERO {
            return None;
        }
        let mut n = 0u32;
        let mut step = self.size_step;
        while step < Decimal::ONE && n < 18 {
            step *= Decimal::TEN;
            n += 1;
        }
        Some(n)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InstrumentSanityError {
    #[error(
        "size_step/min_size ratio {ratio} exceeds 10 for {symbol}: likely a precision parsing bug"
    )]
    PrecisionRatioTooHigh { symbol: String, ratio: String },
}

/// Sanity check at load time (spec.md §4.5.1): fail fast if `size_step / min_size > 10`.
/// A ratio > 2 should be logged as a warning by the caller but is not fatal here.
pub fn sanity_check_ratio(spec: &InstrumentSpec) -> Result<Option<Decimal>, InstrumentSanityError> {
    if spec.min_size <= Decimal::ZERO {
        return Ok(None);
    }
    let ratio = spec.size_step / spec.min_size;
    if ratio > Decimal::TEN {
        return Err(InstrumentSanityError::PrecisionRatioTooHigh {
            symbol: spec.symbol_raw.clone(),
            ratio: ratio.to_string(),
        });
    }
    Ok(Some(ratio))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn spec(size_step: Decimal, min_size: Decimal) -> InstrumentSpec {
        InstrumentSpec {
            symbol_raw: "PF_XBTUSD".into(),
            symbol_ccxt: "BTC/USD:USD".into(),
            base: "BTC".into(),
            quote: "USD".into(),
            contract_size: Decimal::ONE,
            min_size,
            size_step,
            size_step_source: SizeStepSource::AmountPrecision,
            price_tick: None,
            max_leverage: dec!(20),
            leverage_mode: LeverageMode::Flexible,
            allowed_leverages: None,
            supports_reduce_only: true,
        }
    }

    #[test]
    fn sanity_check_passes_for_reasonable_ratio() {
        let s = spec(dec!(0.001), dec!(0.001));
        assert_eq!(sanity_check_ratio(&s).unwrap(), Some(Decimal::ONE));
    }

    #[test]
    fn sanity_check_fails_fast_above_ten() {
        let s = spec(dec!(1), dec!(0.001));
        assert!(sanity_check_ratio(&s).is_err());
    }
}
