//! Streak-based cooldowns by regime (spec.md §4.3 "Cooldowns").

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::signal::Regime;

#[derive(Debug, Clone, Copy)]
pub struct CooldownConfig {
    pub tight_smc_streak_limit: u32,
    pub tight_smc_pause_minutes: i64,
    pub wide_structure_streak_limit: u32,
    pub wide_structure_pause_minutes: i64,
    pub loss_streak_min_loss_bps: Decimal,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            tight_smc_streak_limit: 3,
            tight_smc_pause_minutes: 120,
            wide_structure_streak_limit: 4,
            wide_structure_pause_minutes: 90,
            loss_streak_min_loss_bps: Decimal::new(50, 0), // 50 bps
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CooldownState {
    pub tight_smc_streak: u32,
    pub wide_structure_streak: u32,
    pub tight_smc_paused_until: Option<DateTime<Utc>>,
    pub wide_structure_paused_until: Option<DateTime<Utc>>,
}

impl CooldownState {
    pub fn is_active(&self, regime: Regime, now: DateTime<Utc>) -> bool {
        let paused_until = match regime {
            Regime::TightSmc => self.tight_smc_paused_until,
            Regime::WideStructure => self.wide_structure_paused_until,
        };
        matches!(paused_until, Some(until) if now < until)
    }

    /// A loss only counts toward the streak if `|pnl_bps| >= loss_streak_min_loss_bps`.
    pub fn record_trade_outcome(
        &mut self,
        config: &CooldownConfig,
        regime: Regime,
        pnl_bps: Decimal,
        now: DateTime<Utc>,
    ) {
        if pnl_bps >= Decimal::ZERO {
            // Any win resets both counters and clears any active pause.
            self.tight_smc_streak = 0;
            self.wide_structure_streak = 0;
            self.tight_smc_paused_until = None;
            self.wide_structure_paused_until = None;
            return;
        }

        if pnl_bps.abs() < config.loss_streak_min_loss_bps {
            return;
        }

        match regime {
            Regime::TightSmc => {
                self.tight_smc_streak += 1;
                if self.tight_smc_streak >= config.tight_smc_streak_limit {
                    self.activate(config, regime, now);
                }
            }
            Regime::WideStructure => {
                self.wide_structure_streak += 1;
                if self.wide_structure_streak >= config.wide_structure_streak_limit {
                    self.activate(config, regime, now);
                }
            }
        }
    }

    /// Activating a cooldown resets both counters to avoid an immediate re-trigger.
    fn activate(&mut self, config: &CooldownConfig, regime: Regime, now: DateTime<Utc>) {
        match regime {
            Regime::TightSmc => {
                self.tight_smc_paused_until =
                    Some(now + Duration::minutes(config.tight_smc_pause_minutes));
            }
            Regime::WideStructure => {
                self.wide_structure_paused_until =
                    Some(now + Duration::minutes(config.wide_structure_pause_minutes));
            }
        }
        self.tight_smc_streak = 0;
        self.wide_structure_streak = 0;
    }
}
