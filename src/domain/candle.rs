//! Immutable OHLCV candle and the bounded per-symbol ring buffer that stores them.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A timeframe identifier. Kept as a small enum rather than a free-form string so the
/// candle store and the signal pipeline agree on a closed set of keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn freshness_budget(self) -> Duration {
        match self {
            Timeframe::M15 => Duration::from_secs(30 * 60),
            Timeframe::D1 => Duration::from_secs(48 * 60 * 60),
            // Only 15m and 1d carry an explicit freshness contract (spec.md §4.1);
            // 1h/4h inherit the 15m budget as the tightest reasonable bound.
            Timeframe::H1 | Timeframe::H4 => Duration::from_secs(30 * 60),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        };
        write!(f, "{s}")
    }
}

/// Immutable OHLCV record. No data-source field: the signal path must not be able to
/// tell futures data from spot data (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CandleError {
    #[error("candle range invariant violated: low {low} must be <= min(open,close) and high {high} must be >= max(open,close)")]
    InvalidRange { low: Decimal, high: Decimal },
}

impl Candle {
    pub fn new(
        timestamp: DateTime<Utc>,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Result<Self, CandleError> {
        let candle = Self {
            timestamp,
            symbol: symbol.into(),
            timeframe,
            open,
            high,
            low,
            close,
            volume,
        };
        candle.validate()?;
        Ok(candle)
    }

    /// I: `low <= min(open,close) <= max(open,close) <= high`.
    pub fn validate(&self) -> Result<(), CandleError> {
        let lower = self.open.min(self.close);
        let upper = self.open.max(self.close);
        if self.low <= lower && upper <= self.high {
            Ok(())
        } else {
            Err(CandleError::InvalidRange {
                low: self.low,
                high: self.high,
            })
        }
    }

    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

const MAX_RING_LEN: usize = 300;

/// Per-(symbol, timeframe) bounded ring of candles plus the write-side merge rules
/// from spec.md §4.1: duplicate timestamps replace, stale out-of-order candles are
/// dropped once something newer exists.
#[derive(Debug, Default)]
struct SymbolTimeframeRing {
    candles: VecDeque<Candle>,
}

impl SymbolTimeframeRing {
    fn merge(&mut self, candle: Candle) {
        if let Some(pos) = self
            .candles
            .iter()
            .position(|c| c.timestamp == candle.timestamp)
        {
            self.candles[pos] = candle;
            return;
        }

        if let Some(last) = self.candles.back() {
            if candle.timestamp < last.timestamp {
                // Out-of-order and older than the newest entry: ignored.
                return;
            }
        }

        self.candles.push_back(candle);
        while self.candles.len() > MAX_RING_LEN {
            self.candles.pop_front();
        }
    }

    fn tail(&self, max_count: usize) -> Vec<Candle> {
        let len = self.candles.len();
        let start = len.saturating_sub(max_count);
        self.candles.iter().skip(start).cloned().collect()
    }

    fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.candles.back().map(|c| c.timestamp)
    }
}

/// Process-wide candle store. Single writer (the cycle driver); readers get
/// independent, immutable snapshots (never a live reference), per spec.md §4.1.
#[derive(Debug, Default)]
pub struct CandleStore {
    rings: HashMap<(String, Timeframe), SymbolTimeframeRing>,
}

impl CandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, candle: Candle) {
        let key = (candle.symbol.clone(), candle.timeframe);
        self.rings.entry(key).or_default().merge(candle);
    }

    pub fn merge_all(&mut self, candles: impl IntoIterator<Item = Candle>) {
        for candle in candles {
            self.merge(candle);
        }
    }

    /// Returns an owned, immutable slice of at most `max_count` candles, oldest first.
    pub fn get(&self, symbol: &str, timeframe: Timeframe, max_count: usize) -> Vec<Candle> {
        self.rings
            .get(&(symbol.to_string(), timeframe))
            .map(|ring| ring.tail(max_count))
            .unwrap_or_default()
    }

    /// Age of the most recent candle relative to `now`, or `None` if no candles exist.
    pub fn age_of_latest(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        self.rings
            .get(&(symbol.to_string(), timeframe))
            .and_then(|ring| ring.latest_timestamp())
            .map(|ts| (now - ts).to_std().unwrap_or(Duration::ZERO))
    }

    pub fn is_fresh(&self, symbol: &str, timeframe: Timeframe, now: DateTime<Utc>) -> bool {
        match self.age_of_latest(symbol, timeframe, now) {
            Some(age) => age <= timeframe.freshness_budget(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn candle_at(secs: i64, close: Decimal) -> Candle {
        Candle::new(
            ts(secs),
            "BTC/USD",
            Timeframe::M15,
            close,
            close + dec!(1),
            close - dec!(1),
            close,
            dec!(10),
        )
        .unwrap()
    }

    #[test]
    fn rejects_invalid_range() {
        let err = Candle::new(
            ts(0),
            "BTC/USD",
            Timeframe::M15,
            dec!(100),
            dec!(99), // high < open
            dec!(95),
            dec!(98),
            dec!(1),
        )
        .unwrap_err();
        assert_eq!(
            err,
            CandleError::InvalidRange {
                low: dec!(95),
                high: dec!(99)
            }
        );
    }

    #[test]
    fn duplicate_timestamp_replaces() {
        let mut store = CandleStore::new();
        store.merge(candle_at(0, dec!(100)));
        store.merge(candle_at(0, dec!(105)));
        let slice = store.get("BTC/USD", Timeframe::M15, 10);
        assert_eq!(slice.len(), 1);
        assert_eq!(slice[0].close, dec!(105));
    }

    #[test]
    fn stale_out_of_order_candle_is_ignored() {
        let mut store = CandleStore::new();
        store.merge(candle_at(100, dec!(100)));
        store.merge(candle_at(50, dec!(999)));
        let slice = store.get("BTC/USD", Timeframe::M15, 10);
        assert_eq!(slice.len(), 1);
        assert_eq!(slice[0].close, dec!(100));
    }

    #[test]
    fn ring_is_bounded() {
        let mut store = CandleStore::new();
        for i in 0..(MAX_RING_LEN as i64 + 50) {
            store.merge(candle_at(i * 900, dec!(1)));
        }
        let slice = store.get("BTC/USD", Timeframe::M15, MAX_RING_LEN + 50);
        assert_eq!(slice.len(), MAX_RING_LEN);
    }

    #[test]
    fn freshness_contract() {
        let mut store = CandleStore::new();
        store.merge(candle_at(0, dec!(1)));
        let now_fresh = ts(60 * 10); // 10 min later
        let now_stale = ts(60 * 60); // 60 min later
        assert!(store.is_fresh("BTC/USD", Timeframe::M15, now_fresh));
        assert!(!store.is_fresh("BTC/USD", Timeframe::M15, now_stale));
    }

    #[test]
    fn get_never_aliases_store_state() {
        let mut store = CandleStore::new();
        store.merge(candle_at(0, dec!(1)));
        let mut slice = store.get("BTC/USD", Timeframe::M15, 10);
        slice[0].close = dec!(999);
        let again = store.get("BTC/USD", Timeframe::M15, 10);
        assert_eq!(again[0].close, dec!(1));
    }
}
