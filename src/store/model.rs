//! Row types for the `positions` table.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::schema::positions;
use crate::error::{Result, TradeError};
use crate::position::{Position, PositionUpdate};

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = positions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PositionRow {
    pub id: String,
    pub created_at: String,
    pub mint: String,
    pub buy_amount: f64,
    pub token_amount: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub status: String,
    pub trade_mode: String,
    pub dex: String,
    pub parent_signature: Option<String>,
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub highest_price: f64,
    pub trailing_stop_price: Option<f64>,
    pub trailing_stop_activated: bool,
    pub trailing_stop_distance_pct: Option<f64>,
    pub trailing_stop_activation_pct: Option<f64>,
}

/// Column-level changes for one row. `None` fields are left out of the UPDATE.
#[derive(AsChangeset, Debug, Clone, Default, PartialEq)]
#[diesel(table_name = positions)]
pub struct PositionChangeset {
    pub current_price: Option<f64>,
    pub highest_price: Option<f64>,
    pub trailing_stop_price: Option<f64>,
    pub trailing_stop_activated: Option<bool>,
    pub status: Option<String>,
    pub token_amount: Option<f64>,
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub trailing_stop_distance_pct: Option<f64>,
    pub trailing_stop_activation_pct: Option<f64>,
}

impl From<&PositionUpdate> for PositionChangeset {
    fn from(u: &PositionUpdate) -> Self {
        Self {
            current_price: u.current_price,
            highest_price: u.highest_price,
            trailing_stop_price: u.trailing_stop_price,
            trailing_stop_activated: u.trailing_stop_activated,
            status: u.status.map(|s| s.as_str().to_string()),
            token_amount: u.token_amount,
            stop_loss_pct: u.stop_loss_pct,
            take_profit_pct: u.take_profit_pct,
            trailing_stop_distance_pct: u.trailing_stop_distance_pct,
            trailing_stop_activation_pct: u.trailing_stop_activation_pct,
        }
    }
}

impl From<&Position> for PositionRow {
    fn from(p: &Position) -> Self {
        Self {
            id: p.id.clone(),
            created_at: p.created_at.to_rfc3339(),
            mint: p.mint.clone(),
            buy_amount: p.buy_amount,
            token_amount: p.token_amount,
            entry_price: p.entry_price,
            current_price: p.current_price,
            status: p.status.as_str().to_string(),
            trade_mode: p.trade_mode.to_string(),
            dex: p.dex.to_string(),
            parent_signature: p.parent_signature.clone(),
            stop_loss_pct: p.stop_loss_pct,
            take_profit_pct: p.take_profit_pct,
            highest_price: p.highest_price,
            trailing_stop_price: p.trailing_stop_price,
            trailing_stop_activated: p.trailing_stop_activated,
            trailing_stop_distance_pct: p.trailing_stop_distance_pct,
            trailing_stop_activation_pct: p.trailing_stop_activation_pct,
        }
    }
}

impl TryFrom<PositionRow> for Position {
    type Error = TradeError;

    fn try_from(row: PositionRow) -> Result<Self> {
        let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| TradeError::Storage(format!("bad created_at on {}: {e}", row.id)))?
            .with_timezone(&Utc);
        let trade_mode = row
            .trade_mode
            .parse()
            .map_err(|e: TradeError| TradeError::Storage(e.to_string()))?;
        let dex = row
            .dex
            .parse()
            .map_err(|e: TradeError| TradeError::Storage(e.to_string()))?;

        Ok(Position {
            status: row.status.parse()?,
            id: row.id,
            created_at,
            mint: row.mint,
            buy_amount: row.buy_amount,
            token_amount: row.token_amount,
            entry_price: row.entry_price,
            current_price: row.current_price,
            trade_mode,
            dex,
            parent_signature: row.parent_signature,
            stop_loss_pct: row.stop_loss_pct,
            take_profit_pct: row.take_profit_pct,
            highest_price: row.highest_price,
            trailing_stop_price: row.trailing_stop_price,
            trailing_stop_activated: row.trailing_stop_activated,
            trailing_stop_distance_pct: row.trailing_stop_distance_pct,
            trailing_stop_activation_pct: row.trailing_stop_activation_pct,
        })
    }
}
