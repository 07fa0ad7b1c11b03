//! Pure indicator functions over candle slices. Spec.md §1 treats indicator
//! mathematics as "pure functions of a candle sequence" and out of scope beyond that
//! interface; this module is the interface. No clock reads, no I/O, no randomness —
//! required by the determinism properties in spec.md §8.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::candle::Candle;

/// Exponential moving average of `close` over `period` candles. Returns one EMA value
/// per candle once the seed window is available (simple-average seed, matching the
/// common EMA-warm-up convention), `None` if there isn't enough history.
pub fn ema(candles: &[Candle], period: usize) -> Option<Vec<Decimal>> {
    if period == 0 || candles.len() < period {
        return None;
    }
    let alpha = Decimal::TWO / Decimal::from(period + 1);
    let seed: Decimal = candles[..period].iter().map(|c| c.close).sum::<Decimal>()
        / Decimal::from(period);

    let mut out = Vec::with_capacity(candles.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for candle in &candles[period..] {
        let next = (candle.close - prev) * alpha + prev;
        out.push(next);
        prev = next;
    }
    Some(out)
}

/// Slope classification over the last `n` EMA values, with a +/-0.1% flat band
/// (spec.md §4.2 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slope {
    Up,
    Down,
    Flat,
}

pub fn ema_slope(ema_values: &[Decimal], n: usize, flat_band_pct: Decimal) -> Option<Slope> {
    if ema_values.len() < n || n < 2 {
        return None;
    }
    let window = &ema_values[ema_values.len() - n..];
    let first = window[0];
    let last = *window.last().unwrap();
    if first == Decimal::ZERO {
        return None;
    }
    let change_pct = (last - first) / first.abs();
    if change_pct > flat_band_pct {
        Some(Slope::Up)
    } else if change_pct < -flat_band_pct {
        Some(Slope::Down)
    } else {
        Some(Slope::Flat)
    }
}

/// True range for candle `i` (needs the previous close for i > 0).
fn true_range(candles: &[Candle], i: usize) -> Decimal {
    let c = &candles[i];
    if i == 0 {
        return c.high - c.low;
    }
    let prev_close = candles[i - 1].close;
    let a = c.high - c.low;
    let b = (c.high - prev_close).abs();
    let d = (c.low - prev_close).abs();
    a.max(b).max(d)
}

/// Wilder-smoothed ATR(period). Returns `None` if there isn't enough history.
pub fn atr(candles: &[Candle], period: usize) -> Option<Decimal> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }
    let trs: Vec<Decimal> = (0..candles.len()).map(|i| true_range(candles, i)).collect();
    let mut atr_val: Decimal = trs[1..=period].iter().sum::<Decimal>() / Decimal::from(period);
    for tr in &trs[period + 1..] {
        atr_val = (atr_val * Decimal::from(period - 1) + tr) / Decimal::from(period);
    }
    Some(atr_val)
}

/// Wilder's ADX(period). Returns `None` without enough history (needs ~2*period+1).
pub fn adx(candles: &[Candle], period: usize) -> Option<Decimal> {
    if period == 0 || candles.len() < 2 * period + 1 {
        return None;
    }

    let n = candles.len();
    let mut plus_dm = vec![Decimal::ZERO; n];
    let mut minus_dm = vec![Decimal::ZERO; n];
    let mut tr = vec![Decimal::ZERO; n];

    for i in 1..n {
        let up_move = candles[i].high - candles[i - 1].high;
        let down_move = candles[i - 1].low - candles[i].low;
        plus_dm[i] = if up_move > down_move && up_move > Decimal::ZERO {
            up_move
        } else {
            Decimal::ZERO
        };
        minus_dm[i] = if down_move > up_move && down_move > Decimal::ZERO {
            down_move
        } else {
            Decimal::ZERO
        };
        tr[i] = true_range(candles, i);
    }

    let smooth = |values: &[Decimal], period: usize| -> Vec<Decimal> {
        let mut smoothed = vec![Decimal::ZERO; values.len()];
        let mut sum: Decimal = values[1..=period].iter().sum();
        smoothed[period] = sum;
        for i in (period + 1)..values.len() {
            sum = sum - (sum / Decimal::from(period)) + values[i];
            smoothed[i] = sum;
        }
        smoothed
    };

    let smoothed_tr = smooth(&tr, period);
    let smoothed_plus = smooth(&plus_dm, period);
    let smoothed_minus = smooth(&minus_dm, period);

    let mut dx_values = Vec::new();
    for i in period..n {
        if smoothed_tr[i] == Decimal::ZERO {
            continue;
        }
        let plus_di = smoothed_plus[i] / smoothed_tr[i] * dec!(100);
        let minus_di = smoothed_minus[i] / smoothed_tr[i] * dec!(100);
        let di_sum = plus_di + minus_di;
        if di_sum == Decimal::ZERO {
            dx_values.push(Decimal::ZERO);
            continue;
        }
        dx_values.push((plus_di - minus_di).abs() / di_sum * dec!(100));
    }

    if dx_values.len() < period {
        return None;
    }
    let adx_val: Decimal =
        dx_values[dx_values.len() - period..].iter().sum::<Decimal>() / Decimal::from(period);
    Some(adx_val)
}

/// Wilder's RSI(period), informational-only per spec.md §4.2 step 3.
pub fn rsi(candles: &[Candle], period: usize) -> Option<Decimal> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }
    let mut gains = Decimal::ZERO;
    let mut losses = Decimal::ZERO;
    for w in candles.windows(2).take(period) {
        let change = w[1].close - w[0].close;
        if change > Decimal::ZERO {
            gains += change;
        } else {
            losses += -change;
        }
    }
    let mut avg_gain = gains / Decimal::from(period);
    let mut avg_loss = losses / Decimal::from(period);

    for w in candles.windows(2).skip(period) {
        let change = w[1].close - w[0].close;
        let (gain, loss) = if change > Decimal::ZERO {
            (change, Decimal::ZERO)
        } else {
            (Decimal::ZERO, -change)
        };
        avg_gain = (avg_gain * Decimal::from(period - 1) + gain) / Decimal::from(period);
        avg_loss = (avg_loss * Decimal::from(period - 1) + loss) / Decimal::from(period);
    }

    if avg_loss == Decimal::ZERO {
        return Some(dec!(100));
    }
    let rs = avg_gain / avg_loss;
    Some(dec!(100) - (dec!(100) / (Decimal::ONE + rs)))
}
