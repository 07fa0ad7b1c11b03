//! Instrument spec registry (spec.md §4.5.1): single source of truth for contract
//! metadata, loaded from a disk cache and refreshed from the exchange on TTL expiry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::warn;

use crate::domain::errors::InstrumentSpecError;
use crate::domain::instrument::{sanity_check_ratio, InstrumentSpec, LeverageMode, SizeStepSource};
use crate::domain::ports::RawExchangePayload;

#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    pub cache_ttl_seconds: i64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { cache_ttl_seconds: 24 * 3600 }
    }
}

pub struct InstrumentRegistry {
    specs: HashMap<String, InstrumentSpec>,
    loaded_at: DateTime<Utc>,
}

impl InstrumentRegistry {
    pub fn empty() -> Self {
        Self {
            specs: HashMap::new(),
            loaded_at: DateTime::<Utc>::MIN_UTC,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, config: &RegistryConfig) -> bool {
        (now - self.loaded_at).num_seconds() > config.cache_ttl_seconds
    }

    pub fn get(&self, symbol: &str) -> Option<&InstrumentSpec> {
        self.specs.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Replaces the registry contents with freshly parsed specs, running the
    /// startup sanity check on each (spec.md §4.5.1 "Sanity check at load time").
    pub fn replace(&mut self, specs: Vec<InstrumentSpec>, loaded_at: DateTime<Utc>) -> Result<(), InstrumentSpecError> {
        let mut map = HashMap::with_capacity(specs.len());
        for spec in specs {
            match sanity_check_ratio(&spec) {
                Ok(Some(ratio)) if ratio > Decimal::TWO => {
                    warn!(symbol = %spec.symbol_raw, %ratio, "size_step/min_size ratio above 2, check precision parsing");
                }
                Ok(_) => {}
                Err(err) => return Err(InstrumentSpecError::Sanity(err)),
            }
            map.insert(spec.symbol_raw.clone(), spec);
        }
        self.specs = map;
        self.loaded_at = loaded_at;
        Ok(())
    }
}

/// Parses a single raw exchange instrument payload into a typed `InstrumentSpec`
/// (spec.md §4.5.1 "Parse rules"). `ccxt_amount_precision`/`ccxt_min_amount` are the
/// CCXT-market enrichment values when available; `None` falls back to the raw fields.
pub fn parse_instrument_spec(
    raw: &RawExchangePayload,
    symbol_ccxt: &str,
    ccxt_amount_precision: Option<Decimal>,
) -> InstrumentSpec {
    let symbol_raw = raw.get_str("symbol").unwrap_or(symbol_ccxt).to_string();
    let base = raw.get_str("base").unwrap_or("").to_string();
    let quote = raw.get_str("quote").unwrap_or("USD").to_string();
    let contract_size = raw.get_decimal("contractSize").unwrap_or(Decimal::ONE);

    let (size_step, size_step_source) = if let Some(precision) = ccxt_amount_precision {
        (precision_to_step(precision), SizeStepSource::AmountPrecision)
    } else if let Some(lot_size) = raw.get_decimal("lotSize") {
        (lot_size, SizeStepSource::LotSize)
    } else if let Some(increment) = raw.get_decimal("quantityIncrement") {
        (increment, SizeStepSource::QuantityIncrement)
    } else if let Some(precision) = raw.get_decimal("contractValueTradePrecision") {
        (precision_to_step(precision), SizeStepSource::ContractValueTradePrecision)
    } else {
        warn!(symbol = %symbol_raw, "no size_step source found, falling back to 0.001");
        (dec!(0.001), SizeStepSource::Fallback)
    };

    let min_size = raw
        .get_decimal("contractValueTradePrecision")
        .map(precision_to_step)
        .or_else(|| raw.get_decimal("limits.amount.min"))
        .or_else(|| raw.get_decimal("minSize"))
        .unwrap_or_else(|| {
            warn!(symbol = %symbol_raw, "no min_size source found, falling back to 0.001");
            dec!(0.001)
        });

    let flexible_leverage = raw.get_bool("flexibleLeverage");
    let leverage_mode = match flexible_leverage {
        Some(true) => LeverageMode::Flexible,
        Some(false) => LeverageMode::Fixed,
        None => LeverageMode::Unknown,
    };

    InstrumentSpec {
        symbol_raw,
        symbol_ccxt: symbol_ccxt.to_string(),
        base,
        quote,
        contract_size,
        min_size,
        size_step,
        size_step_source,
        price_tick: raw.get_decimal("tickSize"),
        max_leverage: raw.get_decimal("maxLeverage").unwrap_or(Decimal::ONE),
        leverage_mode,
        allowed_leverages: None,
        supports_reduce_only: true,
    }
}

/// Converts a CCXT `precision.amount` value to a size step. CCXT reports this two
/// ways: an integer digit count (`prec >= 1`, step = 10^-prec) or, on exchanges that
/// report it as a fraction, the step value directly (`prec < 1`).
fn precision_to_step(precision: Decimal) -> Decimal {
    if precision <= Decimal::ZERO {
        return Decimal::ONE;
    }
    if precision < Decimal::ONE {
        return precision;
    }
    let digits = precision.trunc().to_string().parse::<u32>().unwrap_or(0);
    let mut step = Decimal::ONE;
    for _ in 0..digits {
        step /= Decimal::TEN;
    }
    step
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_with(fields: &[(&str, serde_json::Value)]) -> RawExchangePayload {
        RawExchangePayload {
            fields: fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        }
    }

    #[test]
    fn integer_precision_becomes_negative_power_of_ten_step() {
        let raw = raw_with(&[("symbol", json!("PF_XBTUSD")), ("base", json!("BTC"))]);
        let spec = parse_instrument_spec(&raw, "BTC/USD:USD", Some(dec!(3)));
        assert_eq!(spec.size_step, dec!(0.001));
    }

    #[test]
    fn fractional_precision_below_one_is_taken_as_the_step_directly() {
        let raw = raw_with(&[("symbol", json!("PF_XBTUSD")), ("base", json!("BTC"))]);
        let spec = parse_instrument_spec(&raw, "BTC/USD:USD", Some(dec!(0.001)));
        assert_eq!(spec.size_step, dec!(0.001));
    }

    #[test]
    fn missing_all_sources_falls_back_loudly() {
        let raw = raw_with(&[("symbol", json!("PF_XYZUSD"))]);
        let spec = parse_instrument_spec(&raw, "XYZ/USD:USD", None);
        assert_eq!(spec.size_step, dec!(0.001));
        assert_eq!(spec.size_step_source, SizeStepSource::Fallback);
    }

    #[test]
    fn zero_precision_falls_back_to_whole_units() {
        let raw = raw_with(&[("symbol", json!("PF_XBTUSD")), ("base", json!("BTC"))]);
        let spec = parse_instrument_spec(&raw, "BTC/USD:USD", Some(dec!(0)));
        assert_eq!(spec.size_step, dec!(1));
    }

    #[test]
    fn registry_rejects_specs_with_bad_precision_ratio() {
        let mut registry = InstrumentRegistry::empty();
        let bad_spec = InstrumentSpec {
            symbol_raw: "PF_BADUSD".into(),
            symbol_ccxt: "BAD/USD:USD".into(),
            base: "BAD".into(),
            quote: "USD".into(),
            contract_size: Decimal::ONE,
            min_size: dec!(0.001),
            size_step: dec!(1),
            size_step_source: SizeStepSource::Fallback,
            price_tick: None,
            max_leverage: dec!(10),
            leverage_mode: LeverageMode::Unknown,
            allowed_leverages: None,
            supports_reduce_only: true,
        };
        let result = registry.replace(vec![bad_spec], Utc::now());
        assert!(result.is_err());
    }
}
