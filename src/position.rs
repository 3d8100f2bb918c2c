use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Dex, TradeMode};
use crate::error::TradeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Active,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Active => "ACTIVE",
            PositionStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionStatus {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(PositionStatus::Active),
            "CLOSED" => Ok(PositionStatus::Closed),
            other => Err(TradeError::Storage(format!("unknown position status: {other}"))),
        }
    }
}

/// An opened trade and its exit policy. Prices are SOL per token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub mint: String,
    /// SOL spent
    pub buy_amount: f64,
    /// Tokens received, human units
    pub token_amount: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub status: PositionStatus,
    pub trade_mode: TradeMode,
    pub dex: Dex,
    pub parent_signature: Option<String>,
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub highest_price: f64,
    pub trailing_stop_price: Option<f64>,
    pub trailing_stop_activated: bool,
    pub trailing_stop_distance_pct: Option<f64>,
    pub trailing_stop_activation_pct: Option<f64>,
}

impl Position {
    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    /// Unrealized PnL of the position in percent of entry.
    pub fn pnl_pct(&self) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        (self.current_price - self.entry_price) / self.entry_price * 100.0
    }

    /// In-memory merge, same semantics as `PositionStore::update`.
    pub fn apply(&mut self, update: &PositionUpdate) {
        if let Some(v) = update.current_price {
            self.current_price = v;
        }
        if let Some(v) = update.highest_price {
            self.highest_price = v;
        }
        if let Some(v) = update.trailing_stop_price {
            self.trailing_stop_price = Some(v);
        }
        if let Some(v) = update.trailing_stop_activated {
            self.trailing_stop_activated = v;
        }
        if let Some(v) = update.status {
            self.status = v;
        }
        if let Some(v) = update.token_amount {
            self.token_amount = v;
        }
        if let Some(v) = update.stop_loss_pct {
            self.stop_loss_pct = Some(v);
        }
        if let Some(v) = update.take_profit_pct {
            self.take_profit_pct = Some(v);
        }
        if let Some(v) = update.trailing_stop_distance_pct {
            self.trailing_stop_distance_pct = Some(v);
        }
        if let Some(v) = update.trailing_stop_activation_pct {
            self.trailing_stop_activation_pct = Some(v);
        }
    }
}

/// Fields supplied when a buy fills. Id, timestamp, status and price tracking are seeded by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPosition {
    pub mint: String,
    pub buy_amount: f64,
    pub token_amount: f64,
    pub entry_price: f64,
    pub trade_mode: TradeMode,
    pub dex: Dex,
    pub parent_signature: Option<String>,
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub trailing_stop_distance_pct: Option<f64>,
    pub trailing_stop_activation_pct: Option<f64>,
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub current_price: Option<f64>,
    pub highest_price: Option<f64>,
    pub trailing_stop_price: Option<f64>,
    pub trailing_stop_activated: Option<bool>,
    pub status: Option<PositionStatus>,
    pub token_amount: Option<f64>,
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub trailing_stop_distance_pct: Option<f64>,
    pub trailing_stop_activation_pct: Option<f64>,
}

impl PositionUpdate {
    pub fn close() -> Self {
        Self {
            status: Some(PositionStatus::Closed),
            ..Self::default()
        }
    }

    pub fn price(current_price: f64) -> Self {
        Self {
            current_price: Some(current_price),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
pub(crate) fn sample_position() -> Position {
    Position {
        id: "pos-1".into(),
        created_at: Utc::now(),
        mint: "Mint1111111111111111111111111111111111111111".into(),
        buy_amount: 0.01,
        token_amount: 10.0,
        entry_price: 1.0,
        current_price: 1.0,
        status: PositionStatus::Active,
        trade_mode: TradeMode::Exact,
        dex: Dex::Jupiter,
        parent_signature: None,
        stop_loss_pct: None,
        take_profit_pct: None,
        highest_price: 1.0,
        trailing_stop_price: None,
        trailing_stop_activated: false,
        trailing_stop_distance_pct: None,
        trailing_stop_activation_pct: None,
    }
}
