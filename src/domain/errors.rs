//! Typed error taxonomies at each subsystem boundary (SPEC_FULL.md §1.1 "Error handling").
//!
//! These are *data errors* and *operational errors* in the spec.md §7 sense. Ordinary
//! rejections (a signal failing a gate, a risk check failing) are never represented as
//! `Err` — they are fields on a `RiskDecision`/`Signal`/`AllocationPlan` value, per the
//! design note "exceptions-for-control-flow in the risk gate."

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("insufficient candle history on {timeframe} for {symbol}: need {need}, have {have}")]
    InsufficientHistory {
        symbol: String,
        timeframe: String,
        need: usize,
        have: usize,
    },
    #[error("stale candles for {symbol} on {timeframe}")]
    StaleData { symbol: String, timeframe: String },
}

#[derive(Debug, Error)]
pub enum RiskGateError {
    #[error("malformed risk gate input: {reason}")]
    MalformedInput { reason: String },
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("instrument spec not found for {symbol}")]
    SpecNotFound { symbol: String },
    #[error("size step rounds to zero for {symbol} (notional {notional}, price {price})")]
    SizeStepRoundToZero { symbol: String, notional: Decimal, price: Decimal },
    #[error("size below minimum for {symbol}: {size} < {min_size}")]
    SizeBelowMin {
        symbol: String,
        size: Decimal,
        min_size: Decimal,
    },
    #[error("size step misaligned for {symbol} after final rounding: {size}")]
    SizeStepMisaligned { symbol: String, size: Decimal },
    #[error("duplicate intent within dedupe window: {intent_hash}")]
    DuplicateIntent { intent_hash: String },
    #[error("pyramiding guard: open position or pending entry already exists for {symbol} {side}")]
    PyramidingGuard { symbol: String, side: String },
    #[error("symbol blocklisted: {symbol}")]
    Blocklisted { symbol: String },
    #[error("legacy position manager refuses to run in production mode")]
    LegacyPathDisabled,
    #[error("kill switch active: new entries suppressed")]
    KillSwitchActive,
    #[error("exchange adapter error: {reason}")]
    Adapter { reason: String },
}

#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("could not reconstruct stop price for adopted position {symbol}")]
    UnreconstructableStop { symbol: String },
    #[error("exchange adapter error during reconciliation: {reason}")]
    Adapter { reason: String },
}

#[derive(Debug, Error)]
pub enum InstrumentSpecError {
    #[error("failed to load instrument specs from cache: {reason}")]
    CacheLoad { reason: String },
    #[error("failed to fetch instrument specs from exchange: {reason}")]
    ExchangeFetch { reason: String },
    #[error(transparent)]
    Sanity(#[from] crate::domain::instrument::InstrumentSanityError),
}
