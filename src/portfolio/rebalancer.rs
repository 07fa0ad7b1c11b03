//! Reduce-only concentration trims (spec.md §4.4 "Rebalancer"). Runs after the
//! auction proper; never opens anything, only plans partial reductions on
//! positions that have grown too large relative to equity.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone, Copy)]
pub struct RebalancerConfig {
    pub enabled: bool,
    pub trigger_pct_equity: Decimal,
    pub clear_pct_equity: Decimal,
    pub per_symbol_trim_cooldown_cycles: i64,
    pub max_reductions_per_cycle: usize,
    pub max_total_margin_reduced_pct_equity: Decimal,
}

impl Default for RebalancerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trigger_pct_equity: dec!(0.32),
            clear_pct_equity: dec!(0.24),
            per_symbol_trim_cooldown_cycles: 2,
            max_reductions_per_cycle: 1,
            max_total_margin_reduced_pct_equity: dec!(0.25),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrimCandidate {
    pub symbol: String,
    pub size_notional: Decimal,
    pub size_qty: Decimal,
    pub margin_used: Decimal,
    pub locked: bool,
}

/// Plans reduce-only trims for every oversized, non-cooling-down position, largest
/// concentration offender first. `closing_symbols` excludes positions the auction
/// already plans to close outright this cycle. Locked positions are skipped unless
/// `new_entries_enabled` is false: when the recovery gate has closed new entries,
/// trims on locked positions still fire, since the lock only protects a position
/// from being swapped out by a fresh signal, not from concentration risk.
pub fn plan_reductions(
    positions: &[TrimCandidate],
    closing_symbols: &std::collections::HashSet<String>,
    account_equity: Decimal,
    current_cycle: i64,
    last_trim_cycle_by_symbol: &HashMap<String, i64>,
    config: &RebalancerConfig,
    new_entries_enabled: bool,
) -> Vec<(String, Decimal)> {
    let mut reductions = Vec::new();
    if !config.enabled || config.max_reductions_per_cycle == 0 || account_equity <= Decimal::ZERO {
        return reductions;
    }
    if config.clear_pct_equity >= config.trigger_pct_equity {
        return reductions;
    }

    let mut ranked: Vec<&TrimCandidate> = positions.iter().collect();
    ranked.sort_by(|a, b| {
        let ca = if account_equity > Decimal::ZERO {
            a.size_notional / account_equity
        } else {
            Decimal::ZERO
        };
        let cb = if account_equity > Decimal::ZERO {
            b.size_notional / account_equity
        } else {
            Decimal::ZERO
        };
        cb.cmp(&ca)
    });

    let max_total_margin_reduction = account_equity * config.max_total_margin_reduced_pct_equity;
    let mut total_margin_reduction = Decimal::ZERO;
    let target_notional = account_equity * config.clear_pct_equity;

    for position in ranked {
        if reductions.len() >= config.max_reductions_per_cycle {
            break;
        }
        if closing_symbols.contains(&position.symbol) {
            continue;
        }
        if position.locked && new_entries_enabled {
            continue;
        }
        if position.size_notional <= Decimal::ZERO || position.size_qty <= Decimal::ZERO {
            continue;
        }

        let concentration_pct = position.size_notional / account_equity;
        if concentration_pct <= config.trigger_pct_equity {
            continue;
        }

        if let Some(&last_trim_cycle) = last_trim_cycle_by_symbol.get(&position.symbol) {
            if config.per_symbol_trim_cooldown_cycles > 0
                && current_cycle > 0
                && current_cycle - last_trim_cycle < config.per_symbol_trim_cooldown_cycles
            {
                continue;
            }
        }

        let trim_notional = (position.size_notional - target_notional).max(Decimal::ZERO);
        if trim_notional <= Decimal::ZERO {
            continue;
        }

        let mut trim_fraction = trim_notional / position.size_notional;
        let mut est_margin_reduction = if position.margin_used > Decimal::ZERO {
            position.margin_used * trim_fraction
        } else {
            Decimal::ZERO
        };

        let remaining_budget = max_total_margin_reduction - total_margin_reduction;
        if remaining_budget <= Decimal::ZERO {
            break;
        }
        if est_margin_reduction > remaining_budget && est_margin_reduction > Decimal::ZERO {
            let scale = remaining_budget / est_margin_reduction;
            trim_fraction *= scale;
            est_margin_reduction = remaining_budget;
        }

        let trim_qty = position.size_qty * trim_fraction;
        if trim_qty <= Decimal::ZERO {
            continue;
        }

        reductions.push((position.symbol.clone(), trim_qty));
        total_margin_reduction += est_margin_reduction;
    }

    reductions
}
