//! Shock guard (SPEC_FULL.md §4.6, supplemented from original_source's
//! `risk/shock_guard.py`): an optional external collaborator that suppresses new
//! entries and advises trimming/closing positions whose liquidation buffer has
//! collapsed. A small struct + pure function, not a background service — the cycle
//! driver decides when to call it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::config::ShockGuardConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShockAdvice {
    None,
    Trim,
    Close,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ShockGuardState {
    pub active: bool,
    pub entered_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl ShockGuardState {
    /// Whether new entries should currently be suppressed.
    pub fn suppresses_entries(&self, now: DateTime<Utc>) -> bool {
        self.active || matches!(self.cooldown_until, Some(until) if now < until)
    }

    /// Evaluates one position's liquidation buffer and updates guard state if the
    /// buffer crosses into shock territory, entering a cooldown window on exit.
    pub fn evaluate(
        &mut self,
        liquidation_buffer_pct: Decimal,
        config: &ShockGuardConfig,
        now: DateTime<Utc>,
    ) -> ShockAdvice {
        if !config.enabled {
            return ShockAdvice::None;
        }

        let advice = if liquidation_buffer_pct < config.close_buffer_pct {
            ShockAdvice::Close
        } else if liquidation_buffer_pct < config.trim_buffer_pct {
            ShockAdvice::Trim
        } else {
            ShockAdvice::None
        };

        match advice {
            ShockAdvice::None => {
                if self.active {
                    self.active = false;
                    self.cooldown_until = Some(now + chrono::Duration::seconds(config.cooldown_seconds));
                }
            }
            ShockAdvice::Trim | ShockAdvice::Close => {
                if !self.active {
                    self.active = true;
                    self.entered_at = Some(now);
                }
            }
        }

        advice
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> ShockGuardConfig {
        ShockGuardConfig {
            enabled: true,
            close_buffer_pct: dec!(0.10),
            trim_buffer_pct: dec!(0.18),
            cooldown_seconds: 1800,
        }
    }

    #[test]
    fn buffer_below_ten_pct_advises_close() {
        let mut state = ShockGuardState::default();
        let advice = state.evaluate(dec!(0.05), &config(), Utc::now());
        assert_eq!(advice, ShockAdvice::Close);
        assert!(state.active);
    }

    #[test]
    fn buffer_between_ten_and_eighteen_pct_advises_trim() {
        let mut state = ShockGuardState::default();
        let advice = state.evaluate(dec!(0.15), &config(), Utc::now());
        assert_eq!(advice, ShockAdvice::Trim);
    }

    #[test]
    fn healthy_buffer_gives_no_advice() {
        let mut state = ShockGuardState::default();
        let advice = state.evaluate(dec!(0.5), &config(), Utc::now());
        assert_eq!(advice, ShockAdvice::None);
        assert!(!state.active);
    }

    #[test]
    fn recovering_from_shock_enters_cooldown_window() {
        let mut state = ShockGuardState::default();
        let now = Utc::now();
        state.evaluate(dec!(0.05), &config(), now);
        assert!(state.active);
        state.evaluate(dec!(0.5), &config(), now);
        assert!(!state.active);
        assert!(state.suppresses_entries(now));
        assert!(!state.suppresses_entries(now + chrono::Duration::seconds(1801)));
    }

    #[test]
    fn disabled_guard_never_advises() {
        let mut state = ShockGuardState::default();
        let disabled = ShockGuardConfig { enabled: false, ..config() };
        let advice = state.evaluate(dec!(0.01), &disabled, Utc::now());
        assert_eq!(advice, ShockAdvice::None);
    }
}
