use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Dex, TradeMode, TradeSettings};
use crate::relay::ConfirmPolicy;

pub const DEFAULT_TIP_ACCOUNT: &str = "96gYZMGz6LgT4b2M775x6JygM8P22sZc5AETXjQcBCzJ";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // RPC
    pub rpc_http_url: String,

    // Execution
    pub jupiter_base_url: String,
    pub jito_engine_url: Option<String>,
    pub jito_tip_account: String,
    pub allow_unbundled_tip: bool,
    pub skip_preflight: bool,
    pub confirm_timeout_ms: u64,
    pub confirm_poll_ms: u64,
    pub max_slippage_bps: u16,

    // Prices
    pub price_api_url: String,
    #[serde(skip_serializing)]
    pub price_api_key: Option<String>,
    pub price_check_delay_ms: u64,

    // Keys
    pub sol_keypair_path: Option<String>,

    // Persistence
    pub database_path: String,

    // Defaults for new trades
    pub slippage_pct: Decimal,
    pub tip_sol: Decimal,
    pub trade_mode: TradeMode,
    pub preferred_dex: Dex,
    pub take_profit_pct: Option<f64>,
    pub stop_loss_pct: Option<f64>,
    pub trailing_stop_distance_pct: Option<f64>,
    pub trailing_stop_activation_pct: Option<f64>,
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().map(|s| s.trim().to_lowercase()) {
        None => default,
        Some(v) if v.is_empty() => default,
        Some(v) if v == "1" || v == "true" || v == "yes" || v == "y" || v == "on" => true,
        Some(v) if v == "0" || v == "false" || v == "no" || v == "n" || v == "off" => false,
        Some(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|x| x.trim().parse().ok())
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Unset keeps the default; "0" or "off" disables the threshold.
fn env_pct(key: &str, default: Option<f64>) -> Option<f64> {
    match env_nonempty(key).map(|s| s.trim().to_lowercase()) {
        None => default,
        Some(v) if v == "off" || v == "none" => None,
        Some(v) => match v.parse::<f64>() {
            Ok(p) if p > 0.0 => Some(p),
            Ok(_) => None,
            Err(_) => default,
        },
    }
}

/// Without a relay (or an explicit opt-in to unbundled tips) the default tip
/// would refuse every trade, so it drops to zero.
fn default_tip(relay: bool, allow_unbundled_tip: bool) -> Decimal {
    if relay || allow_unbundled_tip {
        TradeSettings::default().tip_sol
    } else {
        Decimal::ZERO
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let rpc_http_url = std::env::var("SOLANA_RPC")
            .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".to_string());

        // Execution
        let jupiter_base_url = std::env::var("JUPITER_BASE_URL")
            .unwrap_or_else(|_| "https://quote-api.jup.ag/v6".to_string());
        let jito_engine_url = env_nonempty("JITO_ENGINE");
        let jito_tip_account =
            env_nonempty("JITO_TIP_ACCOUNT").unwrap_or_else(|| DEFAULT_TIP_ACCOUNT.to_string());
        let allow_unbundled_tip = env_bool("ALLOW_UNBUNDLED_TIP", false);
        let skip_preflight = env_bool("SKIP_PREFLIGHT", false);
        let confirm_timeout_ms = env_parse::<u64>("CONFIRM_TIMEOUT_MS").unwrap_or(60_000);
        let confirm_poll_ms = env_parse::<u64>("CONFIRM_POLL_MS").unwrap_or(500);
        let max_slippage_bps = env_parse::<u16>("MAX_SLIPPAGE_BPS").unwrap_or(5000);

        // Prices
        let price_api_url = std::env::var("PRICE_API_URL")
            .unwrap_or_else(|_| "https://api.coinvera.io/api/v1/price".to_string());
        let price_api_key = env_nonempty("COINVERA_API");
        let price_check_delay_ms = env_parse::<u64>("PRICE_CHECK_DELAY").unwrap_or(5000);

        let sol_keypair_path = env_nonempty("SOL_KEYPAIR_PATH");
        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/positions.db".to_string());

        // Trade defaults
        let defaults = TradeSettings::default();
        let slippage_pct = env_parse::<Decimal>("SLIPPAGE").unwrap_or(defaults.slippage_pct);
        let tip_sol = env_parse::<Decimal>("JITO_TIP")
            .unwrap_or_else(|| default_tip(jito_engine_url.is_some(), allow_unbundled_tip));
        let trade_mode = match env_nonempty("TRADE_TYPE") {
            Some(v) => v.parse::<TradeMode>().with_context(|| format!("TRADE_TYPE={v}"))?,
            None => defaults.trade_mode,
        };
        let preferred_dex = match env_nonempty("PREFERRED_DEX") {
            Some(v) => v.parse::<Dex>().with_context(|| format!("PREFERRED_DEX={v}"))?,
            None => defaults.preferred_dex,
        };
        let take_profit_pct = env_pct("TAKE_PROFIT", defaults.take_profit_pct);
        let stop_loss_pct = env_pct("STOP_LOSS", defaults.stop_loss_pct);
        let trailing_stop_distance_pct = env_pct("TRAILING_STOP_DISTANCE", None);
        let trailing_stop_activation_pct = env_parse::<f64>("TRAILING_STOP_ACTIVATION");

        let cfg = Self {
            rpc_http_url,
            jupiter_base_url,
            jito_engine_url,
            jito_tip_account,
            allow_unbundled_tip,
            skip_preflight,
            confirm_timeout_ms,
            confirm_poll_ms,
            max_slippage_bps,
            price_api_url,
            price_api_key,
            price_check_delay_ms,
            sol_keypair_path,
            database_path,
            slippage_pct,
            tip_sol,
            trade_mode,
            preferred_dex,
            take_profit_pct,
            stop_loss_pct,
            trailing_stop_distance_pct,
            trailing_stop_activation_pct,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.confirm_poll_ms == 0 {
            return Err(anyhow!("CONFIRM_POLL_MS must be positive"));
        }
        if self.confirm_poll_ms >= self.confirm_timeout_ms {
            return Err(anyhow!("CONFIRM_POLL_MS must be below CONFIRM_TIMEOUT_MS"));
        }
        if self.price_check_delay_ms == 0 {
            return Err(anyhow!("PRICE_CHECK_DELAY must be positive"));
        }
        if self.slippage_pct.is_sign_negative() || self.tip_sol.is_sign_negative() {
            return Err(anyhow!("SLIPPAGE and JITO_TIP cannot be negative"));
        }
        if self.tip_sol > Decimal::ZERO && self.jito_engine_url.is_none() && !self.allow_unbundled_tip {
            return Err(anyhow!(
                "JITO_TIP is set but JITO_ENGINE is not; set ALLOW_UNBUNDLED_TIP=true to send the tip as a separate transaction"
            ));
        }
        if self.slippage_pct * Decimal::ONE_HUNDRED > Decimal::from(self.max_slippage_bps) {
            return Err(anyhow!("SLIPPAGE cannot exceed MAX_SLIPPAGE_BPS"));
        }
        if let Some(d) = self.trailing_stop_distance_pct {
            if d >= 100.0 {
                return Err(anyhow!("TRAILING_STOP_DISTANCE must be below 100"));
            }
        }
        Ok(())
    }

    pub fn confirm_policy(&self) -> ConfirmPolicy {
        ConfirmPolicy {
            timeout: Duration::from_millis(self.confirm_timeout_ms),
            poll_interval: Duration::from_millis(self.confirm_poll_ms),
        }
    }

    /// Trailing stop is enabled when both trailing parameters are configured.
    pub fn default_settings(&self) -> TradeSettings {
        TradeSettings {
            slippage_pct: self.slippage_pct,
            tip_sol: self.tip_sol,
            trade_mode: self.trade_mode,
            preferred_dex: self.preferred_dex,
            take_profit_pct: self.take_profit_pct,
            stop_loss_pct: self.stop_loss_pct,
            enable_trailing_stop: self.trailing_stop_distance_pct.is_some()
                && self.trailing_stop_activation_pct.is_some(),
            trailing_stop_distance_pct: self.trailing_stop_distance_pct,
            trailing_stop_activation_pct: self.trailing_stop_activation_pct,
        }
    }
}
