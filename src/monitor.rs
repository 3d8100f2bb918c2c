//! Price-tick driver for open positions.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rust_decimal::Decimal;
use solana_sdk::signer::Signer;
use tracing::{debug, error, info, warn};

use crate::domain::{parse_mint, TradeContext, TradeSettings};
use crate::engine::Engine;
use crate::error::{FundsMoved, Result, TradeError};
use crate::exit::{evaluate_exit, ExitReason};
use crate::position::{Position, PositionUpdate};
use crate::price::PriceSource;
use crate::store::PositionStore;

/// Merges one price observation into `position` and persists it.
/// Returns the stored row and the exit signal, if any. The row stays Active;
/// closing is up to the caller.
pub fn apply_tick(
    store: &PositionStore,
    position: &Position,
    price: f64,
) -> Result<(Position, Option<ExitReason>)> {
    let decision = evaluate_exit(position, price);
    let updated = store.update(&position.id, &decision.update)?;
    Ok((updated, decision.reason))
}

/// Sells positions on exit. Without one the monitor only reports signals.
pub struct Executor {
    pub engine: Engine,
    pub signer: Box<dyn Signer>,
    pub settings: TradeSettings,
}

pub struct Monitor {
    store: Arc<PositionStore>,
    prices: Arc<dyn PriceSource>,
    executor: Option<Executor>,
    interval: Duration,
    /// Sold (or possibly sold) but not yet recorded Closed. Never sold again.
    pending_close: Mutex<HashSet<String>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub checked: usize,
    pub exits: usize,
    pub closed: usize,
    pub price_errors: usize,
    pub failed: usize,
}

impl Monitor {
    pub fn new(
        store: Arc<PositionStore>,
        prices: Arc<dyn PriceSource>,
        executor: Option<Executor>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            prices,
            executor,
            interval,
            pending_close: Mutex::new(HashSet::new()),
        }
    }

    pub fn observe_only(&self) -> bool {
        self.executor.is_none()
    }

    /// Ticks forever. Storage failures are logged and retried next tick.
    pub async fn run(&self) -> Result<()> {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            observe_only = self.observe_only(),
            "monitor.start"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.tick().await {
                Ok(s) if s.checked > 0 || s.closed > 0 => info!(?s, "monitor.tick"),
                Ok(_) => debug!("monitor.idle"),
                Err(e) => error!(error = %e, "monitor.tick_failed"),
            }
        }
    }

    /// One pass over every active position. A failure on one position does
    /// not stop the others.
    pub async fn tick(&self) -> Result<TickSummary> {
        let mut summary = TickSummary::default();
        summary.closed += self.flush_pending_closes();

        for position in self.store.list_active()? {
            if self.is_pending_close(&position.id) {
                continue;
            }
            summary.checked += 1;
            if let Err(e) = self.check(&position, &mut summary).await {
                summary.failed += 1;
                error!(id = %position.id, mint = %position.mint, error = %e, "monitor.position_failed");
            }
        }
        Ok(summary)
    }

    async fn check(&self, position: &Position, summary: &mut TickSummary) -> Result<()> {
        let quote = match self.prices.price(&position.mint).await {
            Ok(q) => q,
            Err(e) => {
                summary.price_errors += 1;
                warn!(id = %position.id, mint = %position.mint, error = %e, "monitor.price_failed");
                return Ok(());
            }
        };

        let (updated, reason) = apply_tick(&self.store, position, quote.price_in_base_asset)?;
        let Some(reason) = reason else {
            return Ok(());
        };
        summary.exits += 1;
        info!(
            id = %updated.id,
            mint = %updated.mint,
            ?reason,
            price = quote.price_in_base_asset,
            pnl_pct = updated.pnl_pct(),
            "monitor.exit"
        );
        if self.close(&updated, reason).await {
            summary.closed += 1;
        }
        Ok(())
    }

    /// True when the position was recorded Closed.
    async fn close(&self, position: &Position, reason: ExitReason) -> bool {
        let Some(exec) = &self.executor else {
            info!(id = %position.id, ?reason, "monitor.exit_signal_only");
            return false;
        };

        match sell_all(exec, position).await {
            Ok(signature) => {
                info!(id = %position.id, ?reason, %signature, "monitor.sold");
                self.record_closed(&position.id)
            }
            Err(e) if e.funds_moved() == FundsMoved::Uncertain => {
                // A retry could sell twice; an operator has to reconcile.
                error!(id = %position.id, ?reason, error = %e, "monitor.close_unconfirmed");
                self.record_closed(&position.id)
            }
            Err(e) => {
                warn!(id = %position.id, ?reason, error = %e, "monitor.close_failed");
                false
            }
        }
    }

    /// Marks `id` Closed, or parks it until the write succeeds.
    fn record_closed(&self, id: &str) -> bool {
        match self.store.update(id, &PositionUpdate::close()) {
            Ok(_) => {
                info!(id, "monitor.closed");
                true
            }
            Err(e) => {
                error!(id, error = %e, "monitor.close_write_failed");
                self.pending().insert(id.to_string());
                false
            }
        }
    }

    fn flush_pending_closes(&self) -> usize {
        let ids: Vec<String> = self.pending().iter().cloned().collect();
        let mut closed = 0;
        for id in ids {
            match self.store.update(&id, &PositionUpdate::close()) {
                Ok(_) | Err(TradeError::PositionNotFound(_)) => {
                    self.pending().remove(&id);
                    info!(id = %id, "monitor.closed");
                    closed += 1;
                }
                Err(e) => warn!(id = %id, error = %e, "monitor.close_write_retry_failed"),
            }
        }
        closed
    }

    fn is_pending_close(&self, id: &str) -> bool {
        self.pending().contains(id)
    }

    fn pending(&self) -> MutexGuard<'_, HashSet<String>> {
        self.pending_close.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn sell_all(exec: &Executor, position: &Position) -> Result<String> {
    let mint = parse_mint(&position.mint)?;
    let amount = Decimal::try_from(position.token_amount)
        .map_err(|e| TradeError::InvalidIntent(format!("token amount {}: {e}", position.token_amount)))?;
    let ctx = TradeContext::new(exec.signer.as_ref(), &exec.settings);
    let outcome = exec.engine.sell(mint, amount, ctx).await?;
    Ok(outcome.receipt.signature.to_string())
}
