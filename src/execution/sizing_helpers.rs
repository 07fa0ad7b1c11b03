//! Shared size/leverage resolution helpers used by order placement (spec.md §4.5.2).
//! All rounding is explicit and Decimal-native; entries round down (never increase
//! exposure), reduce-only exits round up (may be needed to fully close).

use rust_decimal::Decimal;

use crate::domain::errors::ExecutionError;
use crate::domain::instrument::{InstrumentSpec, LeverageMode};

fn round_to_step(value: Decimal, step: Decimal, round_up: bool) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    let units = value / step;
    let rounded_units = if round_up { units.ceil() } else { units.floor() };
    rounded_units * step
}

/// `notional / (price * contract_size)`, rounded DOWN to `size_step`.
pub fn compute_size_contracts(
    spec: &InstrumentSpec,
    notional: Decimal,
    price: Decimal,
) -> Result<Decimal, ExecutionError> {
    if price <= Decimal::ZERO || spec.contract_size <= Decimal::ZERO {
        return Err(ExecutionError::SizeStepRoundToZero {
            symbol: spec.symbol_raw.clone(),
            notional,
            price,
        });
    }
    let raw = notional / (price * spec.contract_size);
    let rounded = round_to_step(raw, spec.size_step, false);
    if rounded <= Decimal::ZERO {
        return Err(ExecutionError::SizeStepRoundToZero {
            symbol: spec.symbol_raw.clone(),
            notional,
            price,
        });
    }
    if rounded < spec.min_size {
        return Err(ExecutionError::SizeBelowMin {
            symbol: spec.symbol_raw.clone(),
            size: rounded,
            min_size: spec.min_size,
        });
    }
    Ok(rounded)
}

/// `flexible` clamps to `[1, max_leverage]`; `fixed` snaps to the nearest allowed
/// leverage at or above the request (falling back to the max allowed); `unknown`
/// returns `None`, meaning "do not send leverage, use the venue default."
pub fn resolve_leverage(spec: &InstrumentSpec, requested: Decimal) -> Option<Decimal> {
    match spec.leverage_mode {
        LeverageMode::Flexible => Some(requested.clamp(Decimal::ONE, spec.max_leverage)),
        LeverageMode::Fixed => {
            let allowed = spec.allowed_leverages.as_ref()?;
            let mut sorted = allowed.clone();
            sorted.sort();
            sorted
                .iter()
                .find(|&&lev| lev >= requested)
                .copied()
                .or_else(|| sorted.last().copied())
        }
        LeverageMode::Unknown => None,
    }
}

/// Final guard at placement time: rounds DOWN for entries, UP for reduce-only exits.
/// Rejects if the rounded value falls below `min_size`.
pub fn ensure_size_step_aligned(
    spec: &InstrumentSpec,
    contracts: Decimal,
    reduce_only: bool,
) -> Result<Decimal, ExecutionError> {
    let rounded = round_to_step(contracts, spec.size_step, reduce_only);
    if rounded < spec.min_size {
        return Err(ExecutionError::SizeStepMisaligned {
            symbol: spec.symbol_raw.clone(),
            size: rounded,
        });
    }
    Ok(rounded)
}
