//! Cycle-scoped portfolio auction allocator (spec.md §4.4). Runs once per cycle,
//! a pure function of the current open book and this cycle's candidates: wraps
//! both as `Contender`s on a common value scale, sorts deterministically, and
//! selects winners under margin/cluster/symbol/exposure caps with a hysteresis
//! rule to damp churn between cycles.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::order::Side;
use crate::domain::signal::Signal;
use crate::domain::symbol::normalized_base;

#[derive(Debug, Clone, Copy)]
pub struct PortfolioLimits {
    pub max_positions: usize,
    pub max_margin_util: Decimal,
    pub max_per_cluster: usize,
    pub max_per_symbol: usize,
    pub max_net_long: Option<Decimal>,
    pub max_net_short: Option<Decimal>,
    pub direction_concentration_penalty: Decimal,
}

impl Default for PortfolioLimits {
    fn default() -> Self {
        Self {
            max_positions: 50,
            max_margin_util: dec!(0.90),
            max_per_cluster: 12,
            max_per_symbol: 1,
            max_net_long: None,
            max_net_short: None,
            direction_concentration_penalty: dec!(10),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AuctionConfig {
    pub limits: PortfolioLimits,
    pub swap_threshold: Decimal,
    pub min_hold_seconds: i64,
    pub max_new_opens_per_cycle: usize,
    pub max_closes_per_cycle: usize,
    pub max_trades_per_cycle: usize,
    pub entry_cost: Decimal,
    pub exit_cost: Decimal,
    /// spec.md §4.4 "Capital-reallocation cooldown": if a partial close (rebalancer
    /// trim) happened within this many seconds, skip new opens this cycle. Trims and
    /// closes are unaffected.
    pub partial_close_cooldown_seconds: i64,
    /// spec.md §4.4 "No-signal persistence": when enabled, a non-winner open with no
    /// matching new-signal swap partner is not strategically closed once no new
    /// candidate signal has appeared for `no_signal_close_persistence_cycles` cycles.
    /// Rebalancer trims are untouched by this.
    pub no_signal_close_persistence_enabled: bool,
    pub no_signal_close_persistence_cycles: i64,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            limits: PortfolioLimits::default(),
            swap_threshold: dec!(10),
            min_hold_seconds: 15 * 60,
            max_new_opens_per_cycle: 5,
            max_closes_per_cycle: 5,
            max_trades_per_cycle: 5,
            entry_cost: dec!(2),
            exit_cost: dec!(2),
            partial_close_cooldown_seconds: 300,
            no_signal_close_persistence_enabled: false,
            no_signal_close_persistence_cycles: 3,
        }
    }
}

/// Metadata the auction needs for an already-open position. `symbol` should be
/// the spot-form symbol when available so it matches candidate symbols after
/// normalization (spec.md §4.4 "per-symbol cap").
#[derive(Debug, Clone)]
pub struct OpenPositionMeta {
    pub symbol: String,
    pub cluster: String,
    pub direction: Side,
    pub required_margin: Decimal,
    pub entry_score: Decimal,
    pub current_pnl_r: Decimal,
    pub age_seconds: i64,
    pub is_protective_orders_live: bool,
    pub is_protected: bool,
}

#[derive(Debug, Clone)]
pub struct CandidateSignal {
    pub signal: Signal,
    pub symbol: String,
    pub cluster: String,
    pub direction: Side,
    pub required_margin: Decimal,
    pub score: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContenderKind {
    Open,
    New,
}

#[derive(Debug, Clone)]
struct Contender {
    kind: ContenderKind,
    symbol: String,
    cluster: String,
    direction: Side,
    required_margin: Decimal,
    value: Decimal,
    locked: bool,
    age_seconds: i64,
    open_index: Option<usize>,
    candidate_index: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct AllocationPlan {
    pub opens: Vec<Signal>,
    pub closes: Vec<String>,
    pub reductions: Vec<(String, Decimal)>,
}

#[derive(Debug, Clone, Copy)]
pub struct PortfolioState {
    pub account_equity: Decimal,
    pub available_margin: Decimal,
}

fn open_value(meta: &OpenPositionMeta, config: &AuctionConfig) -> Decimal {
    meta.entry_score + meta.current_pnl_r * dec!(5) - config.exit_cost
}

fn new_value(candidate: &CandidateSignal, config: &AuctionConfig) -> Decimal {
    candidate.score - config.entry_cost
}

fn is_locked(meta: &OpenPositionMeta, config: &AuctionConfig) -> bool {
    meta.age_seconds < config.min_hold_seconds
        || !meta.is_protective_orders_live
        || !meta.is_protected
}

fn build_contenders(
    open_positions: &[OpenPositionMeta],
    candidates: &[CandidateSignal],
    config: &AuctionConfig,
) -> Vec<Contender> {
    let mut contenders = Vec::with_capacity(open_positions.len() + candidates.len());
    for (i, meta) in open_positions.iter().enumerate() {
        contenders.push(Contender {
            kind: ContenderKind::Open,
            symbol: meta.symbol.clone(),
            cluster: meta.cluster.clone(),
            direction: meta.direction,
            required_margin: meta.required_margin,
            value: open_value(meta, config),
            locked: is_locked(meta, config),
            age_seconds: meta.age_seconds,
            open_index: Some(i),
            candidate_index: None,
        });
    }
    for (i, candidate) in candidates.iter().enumerate() {
        contenders.push(Contender {
            kind: ContenderKind::New,
            symbol: candidate.symbol.clone(),
            cluster: candidate.cluster.clone(),
            direction: candidate.direction,
            required_margin: candidate.required_margin,
            value: new_value(candidate, config),
            locked: false,
            age_seconds: 0,
            open_index: None,
            candidate_index: Some(i),
        });
    }
    contenders
}

/// Sort order (spec.md §4.4): `(-value, kind_rank(OPEN=0,NEW=1), -age_seconds, required_margin)`.
fn sort_contenders(contenders: &mut [Contender]) {
    contenders.sort_by(|a, b| {
        b.value
            .cmp(&a.value)
            .then_with(|| {
                let rank = |k: ContenderKind| if k == ContenderKind::Open { 0 } else { 1 };
                rank(a.kind).cmp(&rank(b.kind))
            })
            .then_with(|| b.age_seconds.cmp(&a.age_seconds))
            .then_with(|| a.required_margin.cmp(&b.required_margin))
    });
}

fn direction_penalty(
    limits: &PortfolioLimits,
    direction: Side,
    long_count: usize,
    short_count: usize,
) -> Decimal {
    let total = long_count + short_count;
    if total == 0 {
        return Decimal::ZERO;
    }
    let same_side = if direction == Side::Buy { long_count } else { short_count };
    let imbalance_ratio = Decimal::from(same_side as i64) / Decimal::from(total as i64);
    let over_half = (imbalance_ratio - dec!(0.5)).max(Decimal::ZERO);
    limits.direction_concentration_penalty * over_half * Decimal::TWO
}

fn select_winners(contenders: &[Contender], state: &PortfolioState, limits: &PortfolioLimits) -> Vec<Contender> {
    let mut winners: Vec<Contender> = Vec::new();
    let mut margin_used = Decimal::ZERO;
    let mut cluster_counts: HashMap<String, usize> = HashMap::new();
    let mut symbol_counts: HashMap<String, usize> = HashMap::new();
    let mut long_count = 0usize;
    let mut short_count = 0usize;
    let max_margin = state.available_margin * limits.max_margin_util;

    for contender in contenders {
        if winners.len() >= limits.max_positions {
            break;
        }
        if margin_used + contender.required_margin > max_margin {
            continue;
        }
        let normalized = normalized_base(&contender.symbol);
        let existing = *symbol_counts.get(&normalized).unwrap_or(&0);
        if existing >= limits.max_per_symbol {
            continue;
        }
        let cluster_count = *cluster_counts.get(&contender.cluster).unwrap_or(&0);
        if cluster_count >= limits.max_per_cluster {
            continue;
        }
        if let Some(max_net_long) = limits.max_net_long {
            if contender.direction == Side::Buy {
                let net_long: Decimal = winners
                    .iter()
                    .filter(|w| w.direction == Side::Buy)
                    .map(|w| w.required_margin)
                    .sum();
                if net_long + contender.required_margin > max_net_long {
                    continue;
                }
            }
        }
        if let Some(max_net_short) = limits.max_net_short {
            if contender.direction == Side::Sell {
                let net_short: Decimal = winners
                    .iter()
                    .filter(|w| w.direction == Side::Sell)
                    .map(|w| w.required_margin)
                    .sum();
                if net_short + contender.required_margin > max_net_short {
                    continue;
                }
            }
        }

        let penalty = direction_penalty(limits, contender.direction, long_count, short_count);
        let adjusted_value = contender.value - penalty;
        if adjusted_value < Decimal::ZERO && !contender.locked {
            continue;
        }

        margin_used += contender.required_margin;
        *cluster_counts.entry(contender.cluster.clone()).or_insert(0) += 1;
        *symbol_counts.entry(normalized).or_insert(0) += 1;
        match contender.direction {
            Side::Buy => long_count += 1,
            Side::Sell => short_count += 1,
        }
        winners.push(contender.clone());
    }
    winners
}

/// For each non-winner open, find the best same-cluster (else globally best) new
/// winner and only swap if `value_new >= value_open + swap_threshold` (spec.md §4.4
/// "Hysteresis swap rule").
fn apply_hysteresis<'a>(
    non_winner_opens: &[&'a Contender],
    new_winners: &[&'a Contender],
    config: &AuctionConfig,
    no_signal_persistence_active: bool,
) -> (Vec<&'a Contender>, Vec<&'a Contender>) {
    let mut final_closes = Vec::new();
    let mut final_opens: Vec<&Contender> = Vec::new();

    for close in non_winner_opens {
        if close.locked {
            continue;
        }
        let matching = new_winners
            .iter()
            .filter(|c| c.cluster == close.cluster)
            .max_by(|a, b| a.value.cmp(&b.value))
            .or_else(|| new_winners.iter().max_by(|a, b| a.value.cmp(&b.value)));

        match matching {
            Some(new_contender) => {
                if new_contender.value >= close.value + config.swap_threshold {
                    final_closes.push(*close);
                    if !final_opens.iter().any(|o| o.symbol == new_contender.symbol) {
                        final_opens.push(new_contender);
                    }
                }
                // else: swap rejected, the open survives and the candidate is dropped here
                // (it may still appear below if another close pairs with it instead).
            }
            None if no_signal_persistence_active => {}
            None => final_closes.push(*close),
        }
    }

    for new_contender in new_winners {
        if !final_opens.iter().any(|o| o.symbol == new_contender.symbol) {
            final_opens.push(new_contender);
        }
    }

    (final_closes, final_opens)
}

/// Runs one cycle of the auction (spec.md §4.4). `open_positions` and `candidates`
/// are this cycle's full snapshot; the function holds no state across calls.
/// `seconds_since_last_partial_close` is `None` when no rebalancer trim has ever
/// fired; `Some(age)` inside `config.partial_close_cooldown_seconds` skips new opens
/// this cycle (trims and closes are unaffected, per the capital-reallocation
/// cooldown rule). `cycles_since_last_new_signal` is `None` when a new candidate
/// signal has appeared every cycle so far; `Some(n) >= no_signal_close_persistence_cycles`
/// with persistence enabled suppresses strategic closes this cycle (rebalancer trims
/// are unaffected, per "No-signal persistence").
pub fn allocate(
    open_positions: &[OpenPositionMeta],
    candidates: &[CandidateSignal],
    state: &PortfolioState,
    config: &AuctionConfig,
    seconds_since_last_partial_close: Option<i64>,
    cycles_since_last_new_signal: Option<i64>,
) -> AllocationPlan {
    let mut contenders = build_contenders(open_positions, candidates, config);
    if contenders.is_empty() {
        return AllocationPlan::default();
    }
    sort_contenders(&mut contenders);

    let winners = select_winners(&contenders, state, &config.limits);
    let winner_symbols: std::collections::HashSet<&str> =
        winners.iter().map(|w| w.symbol.as_str()).collect();

    let non_winner_opens: Vec<&Contender> = contenders
        .iter()
        .filter(|c| c.kind == ContenderKind::Open && !winner_symbols.contains(c.symbol.as_str()))
        .collect();
    let new_winners: Vec<&Contender> = winners.iter().filter(|w| w.kind == ContenderKind::New).collect();

    let no_signal_persistence_active = config.no_signal_close_persistence_enabled
        && cycles_since_last_new_signal.is_some_and(|cycles| cycles >= config.no_signal_close_persistence_cycles);
    let (final_closes, final_opens) = apply_hysteresis(&non_winner_opens, &new_winners, config, no_signal_persistence_active);

    let max_swaps = config
        .max_new_opens_per_cycle
        .min(config.max_closes_per_cycle)
        .min(config.max_trades_per_cycle);
    let swap_count = final_closes.len().min(final_opens.len()).min(max_swaps);

    let mut closes: Vec<String> = final_closes[..swap_count].iter().map(|c| c.symbol.clone()).collect();
    let remaining_close_budget = config.max_closes_per_cycle.saturating_sub(swap_count);
    closes.extend(
        final_closes[swap_count..]
            .iter()
            .take(remaining_close_budget)
            .map(|c| c.symbol.clone()),
    );

    let mut opens: Vec<Signal> = final_opens[..swap_count]
        .iter()
        .filter_map(|c| c.candidate_index)
        .map(|i| candidates[i].signal.clone())
        .collect();
    let remaining_open_budget = config.max_new_opens_per_cycle.saturating_sub(swap_count);
    opens.extend(
        final_opens[swap_count..]
            .iter()
            .take(remaining_open_budget)
            .filter_map(|c| c.candidate_index)
            .map(|i| candidates[i].signal.clone()),
    );

    let free_slots = config.limits.max_positions.saturating_sub(open_positions.len());
    let allowed_opens = closes.len() + free_slots;
    opens.truncate(allowed_opens);

    let cooldown_active = seconds_since_last_partial_close
        .is_some_and(|age| age < config.partial_close_cooldown_seconds);
    if cooldown_active {
        opens.clear();
    }

    AllocationPlan {
        opens,
        closes,
        reductions: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::{HtfBias, Regime, ScoreBreakdown, SetupType, SignalType};
    use chrono::Utc;

    fn signal(symbol: &str) -> Signal {
        Signal {
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            signal_type: SignalType::Long,
            entry_price: dec!(100),
            stop_loss: dec!(98),
            take_profit: Some(dec!(106)),
            setup_type: Some(SetupType::OrderBlock),
            regime: Some(Regime::TightSmc),
            higher_tf_bias: HtfBias::Bullish,
            adx: dec!(25),
            atr: dec!(1),
            ema200_slope: dec!(0.1),
            tp_candidates: vec![dec!(106)],
            score: dec!(90),
            score_breakdown: ScoreBreakdown::default(),
            reasoning: String::new(),
        }
    }

    fn candidate(symbol: &str, cluster: &str, score: Decimal, margin: Decimal) -> CandidateSignal {
        CandidateSignal {
            signal: signal(symbol),
            symbol: symbol.to_string(),
            cluster: cluster.to_string(),
            direction: Side::Buy,
            required_margin: margin,
            score,
        }
    }

    fn open(symbol: &str, cluster: &str, score: Decimal, margin: Decimal) -> OpenPositionMeta {
        OpenPositionMeta {
            symbol: symbol.to_string(),
            cluster: cluster.to_string(),
            direction: Side::Buy,
            required_margin: margin,
            entry_score: score,
            current_pnl_r: Decimal::ZERO,
            age_seconds: 20 * 60,
            is_protective_orders_live: true,
            is_protected: true,
        }
    }

    #[test]
    fn max_per_symbol_keeps_at_most_one_contender_per_base() {
        let candidates = vec![
            candidate("AXS/USD:USD", "tight_smc_ob", dec!(90), dec!(100)),
            candidate("AXS/USD:USD", "wide_structure_bos", dec!(89), dec!(100)),
            candidate("BTC/USD:USD", "tight_smc_ob", dec!(85), dec!(100)),
            candidate("ETH/USD:USD", "tight_smc_ob", dec!(80), dec!(100)),
            candidate("SOL/USD:USD", "tight_smc_ob", dec!(75), dec!(100)),
        ];
        let config = AuctionConfig::default();
        let state = PortfolioState {
            account_equity: dec!(100000),
            available_margin: dec!(100000),
        };
        let plan = allocate(&[], &candidates, &state, &config, None, None);
        let axs_count = plan.opens.iter().filter(|s| s.symbol.starts_with("AXS")).count();
        assert!(axs_count <= 1, "expected at most one AXS open, got {axs_count}");
        assert!(plan.opens.iter().any(|s| s.symbol.starts_with("BTC")));
        assert!(plan.opens.iter().any(|s| s.symbol.starts_with("ETH")));
    }

    #[test]
    fn locked_open_position_survives_even_when_outscored() {
        let opens = vec![OpenPositionMeta {
            age_seconds: 60, // younger than min_hold_seconds, therefore locked
            ..open("BTC/USD:USD", "tight_smc_ob", dec!(10), dec!(1000))
        }];
        let candidates = vec![candidate("ETH/USD:USD", "tight_smc_ob", dec!(99), dec!(1000))];
        let config = AuctionConfig::default();
        let state = PortfolioState {
            account_equity: dec!(100000),
            available_margin: dec!(100000),
        };
        let plan = allocate(&opens, &candidates, &state, &config, None, None);
        assert!(!plan.closes.contains(&"BTC/USD:USD".to_string()));
    }

    #[test]
    fn hysteresis_blocks_swap_below_threshold() {
        let opens = vec![open("BTC/USD:USD", "tight_smc_ob", dec!(80), dec!(1000))];
        let candidates = vec![candidate("ETH/USD:USD", "tight_smc_ob", dec!(85), dec!(1000))];
        let config = AuctionConfig {
            swap_threshold: dec!(10),
            limits: PortfolioLimits {
                max_positions: 1,
                ..PortfolioLimits::default()
            },
            ..AuctionConfig::default()
        };
        let state = PortfolioState {
            account_equity: dec!(100000),
            available_margin: dec!(100000),
        };
        let plan = allocate(&opens, &candidates, &state, &config, None, None);
        // value_open = 80 - 2 = 78; value_new = 85 - 2 = 83; gap of 5 < swap_threshold 10.
        assert!(plan.closes.is_empty());
        assert!(plan.opens.is_empty());
    }

    #[test]
    fn capital_reallocation_cooldown_suppresses_new_opens_but_not_closes() {
        let opens = vec![open("BTC/USD:USD", "tight_smc_ob", dec!(10), dec!(1000))];
        let candidates = vec![candidate("ETH/USD:USD", "tight_smc_ob", dec!(99), dec!(1000))];
        let config = AuctionConfig {
            limits: PortfolioLimits { max_positions: 1, ..PortfolioLimits::default() },
            ..AuctionConfig::default()
        };
        let state = PortfolioState {
            account_equity: dec!(100000),
            available_margin: dec!(100000),
        };

        // A trim fired 60s ago, well inside the 300s default cooldown.
        let plan = allocate(&opens, &candidates, &state, &config, Some(60), None);
        assert!(plan.opens.is_empty());
        assert!(!plan.closes.is_empty(), "closes must still fire during the cooldown");

        // Past the cooldown window, the swap proceeds normally.
        let plan = allocate(&opens, &candidates, &state, &config, Some(600), None);
        assert!(!plan.opens.is_empty());
    }

    #[test]
    fn no_signal_persistence_suppresses_strategic_close_when_enabled_and_stale() {
        // BTC outscored but no new candidate has appeared in a while; persistence
        // should keep it open instead of closing it for lack of a winner.
        let opens = vec![open("BTC/USD:USD", "tight_smc_ob", dec!(10), dec!(1000))];
        let candidates: Vec<CandidateSignal> = Vec::new();
        let config = AuctionConfig {
            limits: PortfolioLimits { max_positions: 0, ..PortfolioLimits::default() },
            no_signal_close_persistence_enabled: true,
            no_signal_close_persistence_cycles: 3,
            ..AuctionConfig::default()
        };
        let state = PortfolioState {
            account_equity: dec!(100000),
            available_margin: dec!(100000),
        };

        let plan = allocate(&opens, &candidates, &state, &config, None, Some(5));
        assert!(plan.closes.is_empty(), "persistence should suppress the close");

        // Below the persistence threshold, the close proceeds as normal.
        let plan = allocate(&opens, &candidates, &state, &config, None, Some(1));
        assert!(!plan.closes.is_empty(), "close should fire once below the persistence threshold");
    }

    #[test]
    fn deterministic_sort_is_stable_across_runs() {
        let candidates = vec![
            candidate("AAA/USD:USD", "c1", dec!(50), dec!(100)),
            candidate("BBB/USD:USD", "c2", dec!(50), dec!(50)),
        ];
        let config = AuctionConfig::default();
        let state = PortfolioState {
            account_equity: dec!(100000),
            available_margin: dec!(100000),
        };
        let plan1 = allocate(&[], &candidates, &state, &config, None, None);
        let plan2 = allocate(&[], &candidates, &state, &config, None, None);
        let symbols1: Vec<_> = plan1.opens.iter().map(|s| s.symbol.clone()).collect();
        let symbols2: Vec<_> = plan2.opens.iter().map(|s| s.symbol.clone()).collect();
        assert_eq!(symbols1, symbols2);
        // Equal value, lower required_margin sorts first.
        assert_eq!(symbols1.first(), Some(&"BBB/USD:USD".to_string()));
    }

    #[test]
    fn direction_penalty_grows_monotonically_with_imbalance() {
        let limits = PortfolioLimits::default();
        // Below the 50/50 split the penalty is flat zero.
        let balanced = direction_penalty(&limits, Side::Buy, 5, 5);
        assert_eq!(balanced, Decimal::ZERO);

        // Past 50/50, pushing the same-side count up never decreases the penalty.
        let mut prev = balanced;
        for longs in 6..=10 {
            let penalty = direction_penalty(&limits, Side::Buy, longs, 10 - longs);
            assert!(penalty >= prev, "penalty regressed at longs={longs}: {penalty} < {prev}");
            prev = penalty;
        }

        // The minority side never pays the majority's penalty.
        let minority_penalty = direction_penalty(&limits, Side::Sell, 9, 1);
        assert_eq!(minority_penalty, Decimal::ZERO);
    }
}
