//! Risk gate: leverage-independent sizing, cost/R:R gates, and safety checks
//! (spec.md §4.3). A pure function of its inputs; the gate never touches the
//! network or a clock — callers pass in account/market state and cooldown
//! status they already fetched.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::signal::{Regime, Signal};
use crate::risk::sizing::{raw_notional, SizingInputs, SizingMode};
use crate::strategy::cost::CostModelConfig;

#[derive(Debug, Clone, Copy)]
pub struct TierOverride {
    pub max_leverage: Option<Decimal>,
    pub max_position_size_usd: Option<Decimal>,
}

#[derive(Debug, Clone, Copy)]
pub struct RiskConfig {
    pub sizing_mode: SizingMode,
    pub risk_per_trade_pct: Decimal,
    pub kelly_fraction: Decimal,
    pub kelly_cap: Decimal,
    pub target_leverage: Decimal,
    pub max_leverage: Decimal,
    pub max_position_size_usd: Decimal,
    pub single_position_cap_pct: Decimal,
    pub min_notional: Decimal,
    pub basis_max_pct: Decimal,
    pub max_concurrent_positions: usize,
    pub auction_max_positions: usize,
    pub auction_mode_enabled: bool,
    pub tight_smc_cost_cap_bps: Decimal,
    pub tight_smc_min_rr_multiple: Decimal,
    pub tight_smc_avg_hold_hours: Decimal,
    pub wide_structure_max_distortion_pct: Decimal,
    pub wide_structure_avg_hold_hours: Decimal,
    pub cost: CostModelConfig,
    /// Legacy opportunity-cost replacement (spec.md §4.3 return shape
    /// `should_close_existing`/`close_symbol`): disabled by default. When enabled and
    /// the position limit is reached outside auction mode, a candidate whose R:R is
    /// more than double the weakest open position's R:R may recommend closing it
    /// instead of being rejected outright.
    pub replacement_enabled: bool,
    /// Utilisation boost (spec.md §4.3 "Utilisation boost"): minimum fraction of
    /// equity that should be committed as margin before boosting is skipped.
    pub target_margin_util_min: Decimal,
    pub utilisation_boost_max_factor: Decimal,
    pub max_single_position_margin_pct_equity: Decimal,
    pub max_aggregate_margin_pct_equity: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            sizing_mode: SizingMode::LeverageBased,
            risk_per_trade_pct: dec!(0.02),
            kelly_fraction: dec!(0.1),
            kelly_cap: dec!(0.05),
            target_leverage: dec!(5),
            max_leverage: dec!(10),
            max_position_size_usd: dec!(50000),
            single_position_cap_pct: dec!(0.25),
            min_notional: dec!(10),
            basis_max_pct: dec!(0.0075),
            max_concurrent_positions: 5,
            auction_max_positions: 10,
            auction_mode_enabled: false,
            tight_smc_cost_cap_bps: dec!(25),
            tight_smc_min_rr_multiple: dec!(1.5),
            tight_smc_avg_hold_hours: dec!(6),
            wide_structure_max_distortion_pct: dec!(0.15),
            wide_structure_avg_hold_hours: dec!(36),
            cost: CostModelConfig::default(),
            replacement_enabled: false,
            target_margin_util_min: dec!(0.70),
            utilisation_boost_max_factor: dec!(1.0),
            max_single_position_margin_pct_equity: dec!(0.25),
            max_aggregate_margin_pct_equity: dec!(2.0),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RiskDecision {
    pub approved: bool,
    pub position_notional: Decimal,
    pub leverage: Decimal,
    pub margin_required: Decimal,
    pub stop_distance_pct: Decimal,
    pub basis_divergence_pct: Decimal,
    pub estimated_fees_funding: Decimal,
    pub rejection_reasons: Vec<String>,
    /// Set when the opportunity-cost replacement fires: the candidate should be
    /// accepted in place of closing `close_symbol`.
    pub should_close_existing: bool,
    pub close_symbol: Option<String>,
    pub utilisation_boost_applied: bool,
}

impl RiskDecision {
    fn rejected(reason: &str) -> Self {
        Self {
            approved: false,
            leverage: Decimal::ONE,
            rejection_reasons: vec![reason.to_string()],
            ..Default::default()
        }
    }
}

/// Dollar cost for a tight-stop SMC entry: two taker fills plus funding whose
/// probability of accruing at all is capped at 1 (can't pay for more than one
/// full 8h funding interval's worth of certainty).
fn estimate_tight_smc_cost(notional: Decimal, config: &RiskConfig) -> Decimal {
    let entry_exit_fees = notional * config.cost.taker_fee_bps * Decimal::TWO / dec!(10000);
    let funding_probability = (config.tight_smc_avg_hold_hours / dec!(8)).min(Decimal::ONE);
    let funding = notional * config.cost.funding_rate_bps_per_8h / dec!(10000) * funding_probability;
    entry_exit_fees + funding
}

/// Dollar cost for a wide-structure entry: funding accrues over however many
/// 8h intervals the hold is expected to span, uncapped.
fn estimate_wide_structure_cost(notional: Decimal, config: &RiskConfig) -> Decimal {
    let entry_exit_fees = notional * config.cost.taker_fee_bps * Decimal::TWO / dec!(10000);
    let funding_intervals = config.wide_structure_avg_hold_hours / dec!(8);
    let funding = notional * config.cost.funding_rate_bps_per_8h / dec!(10000) * funding_intervals;
    entry_exit_fees + funding
}

pub struct ValidateInput<'a> {
    pub signal: &'a Signal,
    pub account_equity: Decimal,
    pub spot_price: Decimal,
    pub futures_mark_price: Decimal,
    pub futures_entry_price: Option<Decimal>,
    pub futures_stop_loss: Option<Decimal>,
    pub available_margin: Option<Decimal>,
    pub notional_override: Option<Decimal>,
    pub skip_margin_check: bool,
    pub tier: Option<TierOverride>,
    pub open_positions_count: usize,
    pub cooldown_active: bool,
    pub kelly_atr_vol_scalar: Decimal,
    /// Aggregate margin already committed to other open positions, used by the
    /// utilisation boost's aggregate-margin cap.
    pub existing_margin_used: Decimal,
    /// `(symbol, r:r_multiple)` for every currently open position, used by the
    /// opportunity-cost replacement to find the weakest open to swap out.
    pub open_position_rr_by_symbol: &'a [(String, Decimal)],
}

/// Validates a proposed trade against sizing, leverage, cost, and safety limits.
/// Returns a `RiskDecision` that always carries its reasoning; the gate never
/// panics or throws for an ordinary rejection (spec.md §9 "exceptions-for-control-flow").
pub fn validate(input: &ValidateInput, config: &RiskConfig) -> RiskDecision {
    let signal = input.signal;

    let (entry_for_risk, stop_for_risk) = match (input.futures_entry_price, input.futures_stop_loss)
    {
        (Some(entry), Some(stop)) => (entry, stop),
        _ => (signal.entry_price, signal.stop_loss),
    };

    if entry_for_risk <= Decimal::ZERO {
        return RiskDecision::rejected("Invalid entry price (zero or negative)");
    }

    let stop_distance_pct = (entry_for_risk - stop_for_risk).abs() / entry_for_risk;
    if stop_distance_pct <= Decimal::ZERO {
        return RiskDecision::rejected("Invalid stop distance (stop equals entry)");
    }

    if input.account_equity <= Decimal::ZERO {
        return RiskDecision::rejected("Invalid account equity (zero or negative)");
    }

    let mut requested_leverage = config.target_leverage.min(config.max_leverage);
    let mut effective_max_usd = config.max_position_size_usd;
    if let Some(tier) = input.tier {
        if let Some(tier_leverage) = tier.max_leverage {
            if requested_leverage > tier_leverage {
                requested_leverage = tier_leverage;
            }
        }
        if let Some(tier_size) = tier.max_position_size_usd {
            effective_max_usd = effective_max_usd.min(tier_size);
        }
    }

    let buying_power = input.account_equity * requested_leverage;

    let mut rejection_reasons = Vec::new();

    let mut position_notional = if let Some(override_notional) = input.notional_override {
        override_notional
    } else {
        let sizing_inputs = SizingInputs {
            equity: input.account_equity,
            leverage: requested_leverage,
            risk_per_trade_pct: config.risk_per_trade_pct,
            stop_distance_pct,
            kelly_fraction: config.kelly_fraction,
            kelly_cap: config.kelly_cap,
            atr_vol_scalar: input.kelly_atr_vol_scalar,
        };
        raw_notional(config.sizing_mode, &sizing_inputs)
    };

    // Utilisation boost: in auction mode with leverage-based sizing, an override
    // notional that leaves margin utilisation below target may be boosted up to
    // `utilisation_boost_max_factor`, bounded by the single-position margin cap,
    // the aggregate margin cap, and 95% of available margin.
    let mut utilisation_boost_applied = false;
    if input.notional_override.is_some()
        && config.sizing_mode == SizingMode::LeverageBased
        && config.auction_mode_enabled
    {
        let utilisation = (position_notional / requested_leverage) / input.account_equity;
        if utilisation < config.target_margin_util_min {
            let boosted = position_notional * config.utilisation_boost_max_factor;
            let single_position_cap =
                config.max_single_position_margin_pct_equity * input.account_equity * requested_leverage;
            let aggregate_cap = (config.max_aggregate_margin_pct_equity * input.account_equity
                - input.existing_margin_used)
                .max(Decimal::ZERO)
                * requested_leverage;
            let mut capped = boosted.min(single_position_cap).min(aggregate_cap);
            if let Some(available_margin) = input.available_margin {
                capped = capped.min(available_margin * dec!(0.95) * requested_leverage);
            }
            if capped > position_notional {
                position_notional = capped;
                utilisation_boost_applied = true;
            }
        }
    }

    // Caps, applied in order; each can only shrink the notional further.
    if input.notional_override.is_none() {
        if position_notional > effective_max_usd {
            position_notional = effective_max_usd;
        }
        if position_notional > buying_power {
            position_notional = buying_power;
        }
        let max_notional_from_equity = input.account_equity * config.single_position_cap_pct;
        if position_notional > max_notional_from_equity {
            position_notional = max_notional_from_equity;
        }
    }

    if position_notional < config.min_notional {
        return RiskDecision {
            approved: false,
            position_notional: Decimal::ZERO,
            leverage: requested_leverage,
            margin_required: Decimal::ZERO,
            stop_distance_pct,
            basis_divergence_pct: Decimal::ZERO,
            estimated_fees_funding: Decimal::ZERO,
            rejection_reasons: vec![format!(
                "Position notional ${position_notional:.2} below minimum ${}",
                config.min_notional
            )],
            should_close_existing: false,
            close_symbol: None,
            utilisation_boost_applied,
        };
    }

    if !input.skip_margin_check {
        if let Some(available_margin) = input.available_margin {
            if available_margin <= Decimal::ZERO {
                return RiskDecision::rejected("No available margin");
            }
            let max_margin_use = available_margin * dec!(0.95);
            let max_notional_from_avail = max_margin_use * requested_leverage;
            if position_notional > max_notional_from_avail {
                position_notional = max_notional_from_avail;
            }
            if position_notional < config.min_notional {
                return RiskDecision::rejected("Insufficient available margin for minimum notional");
            }
        }
    }

    let effective_leverage = position_notional / input.account_equity;
    if effective_leverage > requested_leverage {
        rejection_reasons.push(format!(
            "Effective leverage {effective_leverage:.2}x exceeds max {requested_leverage}x"
        ));
    }

    let margin_required = position_notional / requested_leverage;

    let max_effective_leverage = requested_leverage * dec!(0.90);
    if effective_leverage > max_effective_leverage {
        rejection_reasons.push(format!(
            "Effective leverage {effective_leverage:.2}x too close to max {requested_leverage}x"
        ));
    }
    let free_margin_pct = (input.account_equity - margin_required) / input.account_equity;
    if free_margin_pct < dec!(0.15) {
        rejection_reasons.push(format!(
            "Insufficient margin buffer: {free_margin_pct:.2} < 0.15"
        ));
    }

    let basis_divergence_pct = if input.spot_price <= Decimal::ZERO {
        rejection_reasons.push("Invalid spot price (zero or negative)".to_string());
        Decimal::ZERO
    } else {
        (input.spot_price - input.futures_mark_price).abs() / input.spot_price
    };
    if basis_divergence_pct > config.basis_max_pct {
        rejection_reasons.push(format!(
            "Basis divergence {basis_divergence_pct:.4} > limit {}",
            config.basis_max_pct
        ));
    }

    let position_limit = if config.auction_mode_enabled {
        config.auction_max_positions
    } else {
        config.max_concurrent_positions
    };
    let mut should_close_existing = false;
    let mut close_symbol: Option<String> = None;
    if !config.auction_mode_enabled && input.open_positions_count >= position_limit {
        let weakest = config.replacement_enabled.then(|| {
            input
                .open_position_rr_by_symbol
                .iter()
                .min_by(|a, b| a.1.cmp(&b.1))
        }).flatten();
        let new_rr = signal
            .take_profit
            .map(|tp| {
                let reward = (tp - signal.entry_price).abs();
                let risk = (signal.entry_price - signal.stop_loss).abs();
                if risk > Decimal::ZERO { reward / risk } else { Decimal::ZERO }
            })
            .unwrap_or(Decimal::ZERO);
        match weakest {
            Some((symbol, lowest_rr)) if new_rr > *lowest_rr * dec!(2.0) => {
                should_close_existing = true;
                close_symbol = Some(symbol.clone());
            }
            _ => {
                rejection_reasons.push(format!("Max concurrent positions ({position_limit}) reached"));
            }
        }
    }

    if input.cooldown_active {
        rejection_reasons.push("Loss streak cooldown active".to_string());
    }

    let estimated_fees_funding = match signal.regime {
        Some(Regime::TightSmc) => {
            let cost = estimate_tight_smc_cost(position_notional, config);
            let cost_cap = position_notional * config.tight_smc_cost_cap_bps / dec!(10000);
            if cost > cost_cap {
                rejection_reasons.push(format!(
                    "Total cost ${cost:.2} exceeds {} bps cap on ${position_notional:.2} notional",
                    config.tight_smc_cost_cap_bps
                ));
            }
            if let Some(take_profit) = signal.take_profit {
                let tp_distance = (take_profit - signal.entry_price).abs();
                let stop_distance = (signal.stop_loss - signal.entry_price).abs();
                let rr_multiple = if stop_distance > Decimal::ZERO {
                    tp_distance / stop_distance
                } else {
                    Decimal::ZERO
                };
                if rr_multiple < config.tight_smc_min_rr_multiple {
                    rejection_reasons.push(format!(
                        "R:R multiple {rr_multiple:.2} < minimum {} for tight-stop SMC",
                        config.tight_smc_min_rr_multiple
                    ));
                }
            }
            cost
        }
        Some(Regime::WideStructure) => {
            let cost = estimate_wide_structure_cost(position_notional, config);
            let risk_amount = position_notional * stop_distance_pct;
            let rr_distortion = if risk_amount > Decimal::ZERO {
                cost / risk_amount
            } else {
                Decimal::ZERO
            };
            if rr_distortion > config.wide_structure_max_distortion_pct {
                rejection_reasons.push(format!(
                    "Fees+funding distort R:R by {rr_distortion:.4} > max {}",
                    config.wide_structure_max_distortion_pct
                ));
            }
            cost
        }
        None => {
            rejection_reasons.push("Signal carries no regime classification".to_string());
            Decimal::ZERO
        }
    };

    RiskDecision {
        approved: rejection_reasons.is_empty(),
        position_notional,
        leverage: requested_leverage,
        margin_required,
        stop_distance_pct,
        basis_divergence_pct,
        estimated_fees_funding,
        rejection_reasons,
        should_close_existing,
        close_symbol,
        utilisation_boost_applied,
    }
}
