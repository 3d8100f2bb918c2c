//! Durable position records backed by SQLite.
//!
//! Each mutation is a single-row statement inside an immediate transaction, so
//! concurrent updates to different positions (or to different columns of the
//! same position) never overwrite each other.

pub mod model;
pub mod schema;

use std::path::Path;

use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::{debug, info};

use crate::domain::TradeMode;
use crate::error::{Result, TradeError};
use crate::position::{NewPosition, Position, PositionStatus, PositionUpdate};
use model::{PositionChangeset, PositionRow};
use schema::positions;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

const IN_MEMORY: &str = ":memory:";

#[derive(Debug)]
struct BusyTimeout;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for BusyTimeout {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        diesel::sql_query("PRAGMA busy_timeout = 5000")
            .execute(conn)
            .map(|_| ())
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

pub struct PositionStore {
    pool: DbPool,
}

impl PositionStore {
    /// Opens (creating if needed) the database at `path` and applies migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| TradeError::Storage(format!("create {}: {e}", dir.display())))?;
        }
        Self::connect(&path.to_string_lossy(), Pool::builder().max_size(5))
    }

    /// Private database living as long as the store. Single connection.
    pub fn in_memory() -> Result<Self> {
        // Recycling the only connection would drop the database with it.
        Self::connect(
            IN_MEMORY,
            Pool::builder().max_size(1).max_lifetime(None).idle_timeout(None),
        )
    }

    fn connect(
        database_url: &str,
        builder: diesel::r2d2::Builder<ConnectionManager<SqliteConnection>>,
    ) -> Result<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = builder
            .connection_customizer(Box::new(BusyTimeout))
            .build(manager)
            .map_err(|e| TradeError::Storage(e.to_string()))?;

        let store = Self { pool };
        store
            .conn()?
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| TradeError::Storage(format!("migrations: {e}")))?;
        info!(database = database_url, "store.open");
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<ConnectionManager<SqliteConnection>>> {
        self.pool
            .get()
            .map_err(|e| TradeError::Storage(e.to_string()))
    }

    /// Assigns id and timestamp, marks Active, seeds current/highest price from entry.
    pub fn create(&self, new: NewPosition) -> Result<Position> {
        let position = Position {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            mint: new.mint,
            buy_amount: new.buy_amount,
            token_amount: new.token_amount,
            entry_price: new.entry_price,
            current_price: new.entry_price,
            status: PositionStatus::Active,
            trade_mode: new.trade_mode,
            dex: new.dex,
            parent_signature: new.parent_signature,
            stop_loss_pct: new.stop_loss_pct,
            take_profit_pct: new.take_profit_pct,
            highest_price: new.entry_price,
            trailing_stop_price: None,
            trailing_stop_activated: false,
            trailing_stop_distance_pct: new.trailing_stop_distance_pct,
            trailing_stop_activation_pct: new.trailing_stop_activation_pct,
        };

        let mut conn = self.conn()?;
        diesel::insert_into(positions::table)
            .values(PositionRow::from(&position))
            .execute(&mut conn)?;

        info!(id = %position.id, mint = %position.mint, entry_price = position.entry_price, "store.create");
        Ok(position)
    }

    pub fn list_all(&self) -> Result<Vec<Position>> {
        let mut conn = self.conn()?;
        let rows = positions::table
            .order(positions::created_at.asc())
            .select(PositionRow::as_select())
            .load(&mut conn)?;
        rows.into_iter().map(Position::try_from).collect()
    }

    pub fn list_active(&self) -> Result<Vec<Position>> {
        let mut conn = self.conn()?;
        let rows = positions::table
            .filter(positions::status.eq(PositionStatus::Active.as_str()))
            .order(positions::created_at.asc())
            .select(PositionRow::as_select())
            .load(&mut conn)?;
        rows.into_iter().map(Position::try_from).collect()
    }

    pub fn get(&self, id: &str) -> Result<Position> {
        let mut conn = self.conn()?;
        Self::find(&mut conn, id)
    }

    fn find(conn: &mut SqliteConnection, id: &str) -> Result<Position> {
        positions::table
            .find(id)
            .select(PositionRow::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| TradeError::PositionNotFound(id.to_string()))
            .and_then(Position::try_from)
    }

    /// Merges `update` into the record `id` and returns the merged record.
    pub fn update(&self, id: &str, update: &PositionUpdate) -> Result<Position> {
        let changes = PositionChangeset::from(update);
        let mut conn = self.conn()?;
        let position = conn.immediate_transaction(|conn| {
            if !update.is_empty() {
                let touched = diesel::update(positions::table.find(id))
                    .set(&changes)
                    .execute(conn)?;
                if touched == 0 {
                    return Err(TradeError::PositionNotFound(id.to_string()));
                }
            }
            Self::find(conn, id)
        })?;
        debug!(id, ?update, "store.update");
        Ok(position)
    }

    pub fn find_active_exact_by_mint(&self, mint: &str) -> Result<Option<Position>> {
        let mut conn = self.conn()?;
        positions::table
            .filter(positions::mint.eq(mint))
            .filter(positions::status.eq(PositionStatus::Active.as_str()))
            .filter(positions::trade_mode.eq(TradeMode::Exact.to_string()))
            .order(positions::created_at.asc())
            .select(PositionRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(Position::try_from)
            .transpose()
    }
}
