use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signer::Signer;

use crate::amount::{lamports, NATIVE_MINT};
use crate::error::{Result, TradeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

/// A single buy or sell request. Built once per request and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeIntent {
    pub direction: Direction,
    /// Asset received: the traded token on a buy, native SOL on a sell.
    pub base_mint: Pubkey,
    /// Asset spent: native SOL on a buy, the traded token on a sell.
    pub quote_mint: Pubkey,
    /// Human units of `quote_mint`.
    pub amount: Decimal,
    pub slippage_bps: u16,
}

impl TradeIntent {
    pub fn buy(mint: Pubkey, sol_amount: Decimal, slippage_bps: u16) -> Result<Self> {
        Self::new(Direction::Buy, mint, native_mint(), sol_amount, slippage_bps)
    }

    pub fn sell(mint: Pubkey, token_amount: Decimal, slippage_bps: u16) -> Result<Self> {
        Self::new(Direction::Sell, native_mint(), mint, token_amount, slippage_bps)
    }

    fn new(
        direction: Direction,
        base_mint: Pubkey,
        quote_mint: Pubkey,
        amount: Decimal,
        slippage_bps: u16,
    ) -> Result<Self> {
        if amount <= Decimal::ZERO {
            return Err(TradeError::InvalidIntent(format!(
                "amount must be positive, got {amount}"
            )));
        }
        Ok(Self {
            direction,
            base_mint,
            quote_mint,
            amount,
            slippage_bps,
        })
    }

    pub fn input_mint(&self) -> &Pubkey {
        &self.quote_mint
    }

    pub fn output_mint(&self) -> &Pubkey {
        &self.base_mint
    }

    /// The non-native side of the trade.
    pub fn traded_mint(&self) -> &Pubkey {
        match self.direction {
            Direction::Buy => &self.base_mint,
            Direction::Sell => &self.quote_mint,
        }
    }
}

pub fn native_mint() -> Pubkey {
    Pubkey::from_str(NATIVE_MINT).unwrap_or_default()
}

pub fn parse_mint(s: &str) -> Result<Pubkey> {
    Pubkey::from_str(s.trim()).map_err(|e| TradeError::InvalidIntent(format!("bad mint {s}: {e}")))
}

/// `Safe` is accepted and persisted but currently executes exactly like `Exact`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeMode {
    #[default]
    Exact,
    Safe,
}

impl fmt::Display for TradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeMode::Exact => f.write_str("EXACT"),
            TradeMode::Safe => f.write_str("SAFE"),
        }
    }
}

impl FromStr for TradeMode {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "EXACT" => Ok(TradeMode::Exact),
            "SAFE" => Ok(TradeMode::Safe),
            other => Err(TradeError::InvalidIntent(format!("unknown trade mode: {other}"))),
        }
    }
}

/// Venue preference recorded on a position. Routing itself is left to the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dex {
    None,
    Auto,
    Pumpfun,
    Meteora,
    Raydium,
    Moonshot,
    #[default]
    Jupiter,
}

impl Dex {
    pub const ALL: [Dex; 7] = [
        Dex::None,
        Dex::Auto,
        Dex::Pumpfun,
        Dex::Meteora,
        Dex::Raydium,
        Dex::Moonshot,
        Dex::Jupiter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dex::None => "none",
            Dex::Auto => "auto",
            Dex::Pumpfun => "pumpfun",
            Dex::Meteora => "meteora",
            Dex::Raydium => "raydium",
            Dex::Moonshot => "moonshot",
            Dex::Jupiter => "jupiter",
        }
    }
}

impl fmt::Display for Dex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dex {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        Dex::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| TradeError::InvalidIntent(format!("unknown dex: {s}")))
    }
}

/// Per-user trade parameters, passed explicitly with each request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSettings {
    pub slippage_pct: Decimal,
    /// Relay tip in SOL; zero disables the tip transaction.
    pub tip_sol: Decimal,
    pub trade_mode: TradeMode,
    pub preferred_dex: Dex,
    pub take_profit_pct: Option<f64>,
    pub stop_loss_pct: Option<f64>,
    pub enable_trailing_stop: bool,
    pub trailing_stop_distance_pct: Option<f64>,
    pub trailing_stop_activation_pct: Option<f64>,
}

impl Default for TradeSettings {
    fn default() -> Self {
        Self {
            slippage_pct: Decimal::TEN,
            tip_sol: Decimal::new(1, 4),
            trade_mode: TradeMode::Exact,
            preferred_dex: Dex::Jupiter,
            take_profit_pct: Some(100.0),
            stop_loss_pct: Some(50.0),
            enable_trailing_stop: false,
            trailing_stop_distance_pct: None,
            trailing_stop_activation_pct: None,
        }
    }
}

impl TradeSettings {
    pub fn tip_lamports(&self) -> Result<Option<u64>> {
        let tip = lamports(self.tip_sol)?;
        Ok((tip > 0).then_some(tip))
    }
}

/// Everything one request needs beyond shared configuration.
#[derive(Clone, Copy)]
pub struct TradeContext<'a> {
    pub signer: &'a dyn Signer,
    pub settings: &'a TradeSettings,
}

impl<'a> TradeContext<'a> {
    pub fn new(signer: &'a dyn Signer, settings: &'a TradeSettings) -> Self {
        Self { signer, settings }
    }
}

impl fmt::Debug for TradeContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TradeContext")
            .field("signer", &self.signer.pubkey())
            .field("settings", self.settings)
            .finish()
    }
}
