//! Typed configuration loaded from the environment (SPEC_FULL.md §1.1, spec.md §6
//! "Configuration"/"Environment variables"). `.env` is loaded first via `dotenvy`,
//! mirroring the reference's binaries; every field is parsed with a descriptive
//! `anyhow::Context` so a bad value fails fast at startup instead of downstream.

use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use rust_decimal::Decimal;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = env_or(key, default);
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("failed to parse {key}={raw}: {e}"))
        .with_context(|| format!("invalid value for {key}"))
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"),
        Err(_) => default,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Prod),
            _ => anyhow::bail!("invalid ENVIRONMENT: {s}. Must be dev, staging, or prod"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
    pub quote_currency: String,
}

impl ExchangeConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            api_key: env_or("EXCHANGE_API_KEY", ""),
            api_secret: env_or("EXCHANGE_API_SECRET", ""),
            base_url: env_or("EXCHANGE_BASE_URL", "https://futures.kraken.com"),
            quote_currency: env_or("EXCHANGE_QUOTE_CURRENCY", "USD"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub min_score: Decimal,
    pub adx_trend_threshold: Decimal,
    pub fib_tolerance_pct: Decimal,
}

impl StrategyConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            min_score: parse_env("STRATEGY_MIN_SCORE", "60")?,
            adx_trend_threshold: parse_env("STRATEGY_ADX_TREND_THRESHOLD", "20")?,
            fib_tolerance_pct: parse_env("STRATEGY_FIB_TOLERANCE_PCT", "0.003")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub target_leverage: Decimal,
    pub max_leverage: Decimal,
    pub single_position_cap_pct: Decimal,
    pub min_notional_usd: Decimal,
}

impl RiskConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            target_leverage: parse_env("RISK_TARGET_LEVERAGE", "5")?,
            max_leverage: parse_env("RISK_MAX_LEVERAGE", "10")?,
            single_position_cap_pct: parse_env("RISK_SINGLE_POSITION_CAP_PCT", "0.25")?,
            min_notional_usd: parse_env("RISK_MIN_NOTIONAL_USD", "10")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub environment: Environment,
    pub order_timeout_seconds: i64,
    pub order_price_invalidation_pct: Decimal,
    pub instrument_specs_cache_path: String,
    pub use_state_machine_v2: bool,
    pub skip_spec_sanity: bool,
}

impl ExecutionConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            environment: parse_env("ENVIRONMENT", "dev")?,
            order_timeout_seconds: parse_env("ORDER_TIMEOUT_SECONDS", "30")?,
            order_price_invalidation_pct: parse_env("ORDER_PRICE_INVALIDATION_PCT", "0.02")?,
            instrument_specs_cache_path: env_or(
                "INSTRUMENT_SPECS_CACHE_PATH",
                "data/instrument_specs_cache.json",
            ),
            use_state_machine_v2: parse_bool_env("USE_STATE_MACHINE_V2", true),
            skip_spec_sanity: parse_bool_env("TRADING_SYSTEM_SKIP_SPEC_SANITY", false),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MultiTpConfig {
    pub tp1_split_pct: Decimal,
    pub tp2_split_pct: Decimal,
    pub tp3_split_pct: Decimal,
    pub runner_mode: bool,
}

impl MultiTpConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            tp1_split_pct: parse_env("MULTI_TP_TP1_SPLIT_PCT", "0.4")?,
            tp2_split_pct: parse_env("MULTI_TP_TP2_SPLIT_PCT", "0.4")?,
            tp3_split_pct: parse_env("MULTI_TP_TP3_SPLIT_PCT", "0.2")?,
            runner_mode: parse_bool_env("MULTI_TP_RUNNER_MODE", true),
        })
    }
}

#[derive(Debug, Clone)]
pub struct AuctionConfig {
    pub max_positions: usize,
    pub max_margin_utilization: Decimal,
    pub swap_threshold: Decimal,
    pub min_hold_seconds: i64,
    pub partial_close_cooldown_seconds: i64,
    pub no_signal_close_persistence_enabled: bool,
    pub no_signal_close_persistence_cycles: i64,
}

impl AuctionConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            max_positions: parse_env("AUCTION_MAX_POSITIONS", "50")?,
            max_margin_utilization: parse_env("AUCTION_MAX_MARGIN_UTILIZATION", "0.90")?,
            swap_threshold: parse_env("AUCTION_SWAP_THRESHOLD", "10")?,
            min_hold_seconds: parse_env("AUCTION_MIN_HOLD_SECONDS", "900")?,
            partial_close_cooldown_seconds: parse_env("AUCTION_PARTIAL_CLOSE_COOLDOWN_SECONDS", "300")?,
            no_signal_close_persistence_enabled: parse_bool_env("AUCTION_NO_SIGNAL_CLOSE_PERSISTENCE_ENABLED", false),
            no_signal_close_persistence_cycles: parse_env("AUCTION_NO_SIGNAL_CLOSE_PERSISTENCE_CYCLES", "3")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub interval_seconds: i64,
    pub risk_per_trade_pct: Decimal,
    pub min_liquidation_buffer_pct: Decimal,
}

impl ReconciliationConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            interval_seconds: parse_env("RECONCILIATION_INTERVAL_SECONDS", "15")?,
            risk_per_trade_pct: parse_env("RECONCILIATION_RISK_PER_TRADE_PCT", "0.02")?,
            min_liquidation_buffer_pct: parse_env("RECONCILIATION_MIN_LIQUIDATION_BUFFER_PCT", "0.35")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ShockGuardConfig {
    pub enabled: bool,
    pub close_buffer_pct: Decimal,
    pub trim_buffer_pct: Decimal,
    pub cooldown_seconds: i64,
}

impl ShockGuardConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            enabled: parse_bool_env("SHOCK_GUARD_ENABLED", false),
            close_buffer_pct: parse_env("SHOCK_GUARD_CLOSE_BUFFER_PCT", "0.10")?,
            trim_buffer_pct: parse_env("SHOCK_GUARD_TRIM_BUFFER_PCT", "0.18")?,
            cooldown_seconds: parse_env("SHOCK_GUARD_COOLDOWN_SECONDS", "1800")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub execution: ExecutionConfig,
    pub multi_tp: MultiTpConfig,
    pub auction: AuctionConfig,
    pub reconciliation: ReconciliationConfig,
    pub shock_guard: ShockGuardConfig,
    pub new_entries_enabled: bool,
    pub dry_run: bool,
}

impl Config {
    /// Loads `.env` (if present) then builds the typed config from the process
    /// environment. Missing `.env` is not an error — production deployments set
    /// real environment variables directly.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let dry_run = parse_bool_env("DRY_RUN", false) || parse_bool_env("SYSTEM_DRY_RUN", false);
        let new_entries_enabled = parse_bool_env("TRADING_NEW_ENTRIES_ENABLED", true);

        Ok(Self {
            exchange: ExchangeConfig::from_env()?,
            strategy: StrategyConfig::from_env()?,
            risk: RiskConfig::from_env()?,
            execution: ExecutionConfig::from_env()?,
            multi_tp: MultiTpConfig::from_env()?,
            auction: AuctionConfig::from_env()?,
            reconciliation: ReconciliationConfig::from_env()?,
            shock_guard: ShockGuardConfig::from_env()?,
            new_entries_enabled,
            dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_known_aliases() {
        assert_eq!(Environment::from_str("prod").unwrap(), Environment::Prod);
        assert_eq!(Environment::from_str("Production").unwrap(), Environment::Prod);
        assert_eq!(Environment::from_str("dev").unwrap(), Environment::Dev);
    }

    #[test]
    fn environment_rejects_unknown_value() {
        assert!(Environment::from_str("bogus").is_err());
    }

    #[test]
    fn bool_env_accepts_loose_truthy_spellings() {
        // SYSTEM_DRY_RUN accepts {1,true,yes,y,on} per spec.md §6.
        unsafe { env::set_var("TEST_LOOSE_BOOL_FLAG", "yes") };
        assert!(parse_bool_env("TEST_LOOSE_BOOL_FLAG", false));
        unsafe { env::remove_var("TEST_LOOSE_BOOL_FLAG") };
    }

    #[test]
    fn missing_optional_values_fall_back_to_documented_defaults() {
        let risk = RiskConfig::from_env().unwrap();
        assert_eq!(risk.target_leverage, Decimal::from(5));
    }
}
