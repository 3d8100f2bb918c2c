use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use tracing::{error, info, warn};

use crate::amount::{from_base_units, slippage_bps, NATIVE_DECIMALS};
use crate::bundler::TransactionBundler;
use crate::config::Config;
use crate::domain::{Direction, TradeContext, TradeIntent, TradeSettings};
use crate::error::{Result, TradeError};
use crate::jupiter::{JupiterClient, SwapAggregator};
use crate::position::NewPosition;
use crate::relay::{BundleRelay, ConfirmPolicy, JitoRelay, SubmissionReceipt, SubmissionRelay};
use crate::rpc::{ChainClient, RpcChain};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub tip_account: Pubkey,
    pub allow_unbundled_tip: bool,
    pub skip_preflight: bool,
    pub max_slippage_bps: u16,
    pub confirm: ConfirmPolicy,
}

/// quote -> swap tx -> optional tip -> sign -> submit -> confirm.
pub struct Engine {
    bundler: TransactionBundler,
    relay: SubmissionRelay,
    chain: Arc<dyn ChainClient>,
    max_slippage_bps: u16,
}

#[derive(Debug, Clone)]
pub struct TradeOutcome {
    pub direction: Direction,
    pub mint: Pubkey,
    pub receipt: SubmissionReceipt,
    /// Smallest units spent
    pub in_amount: u64,
    /// Smallest units received, as quoted
    pub out_amount: u64,
    pub output_decimals: Option<u8>,
}

impl TradeOutcome {
    /// Position record for a filled buy, priced in SOL per token.
    pub fn new_position(&self, settings: &TradeSettings) -> Result<NewPosition> {
        if self.direction != Direction::Buy {
            return Err(TradeError::InvalidIntent("only buys open positions".into()));
        }
        let decimals = self.output_decimals.ok_or_else(|| {
            TradeError::AssetMetadataUnavailable(format!("decimals unknown for {}", self.mint))
        })?;
        let sol_spent = from_base_units(self.in_amount, NATIVE_DECIMALS);
        let tokens = from_base_units(self.out_amount, decimals);
        if tokens.is_zero() {
            return Err(TradeError::InvalidIntent("buy received zero tokens".into()));
        }
        let entry_price = (sol_spent / tokens).to_f64().unwrap_or_default();
        let (distance, activation) = if settings.enable_trailing_stop {
            (
                settings.trailing_stop_distance_pct,
                settings.trailing_stop_activation_pct,
            )
        } else {
            (None, None)
        };

        Ok(NewPosition {
            mint: self.mint.to_string(),
            buy_amount: sol_spent.to_f64().unwrap_or_default(),
            token_amount: tokens.to_f64().unwrap_or_default(),
            entry_price,
            trade_mode: settings.trade_mode,
            dex: settings.preferred_dex,
            parent_signature: Some(self.receipt.signature.to_string()),
            stop_loss_pct: settings.stop_loss_pct,
            take_profit_pct: settings.take_profit_pct,
            trailing_stop_distance_pct: distance,
            trailing_stop_activation_pct: activation,
        })
    }
}

impl Engine {
    pub fn new(
        aggregator: Arc<dyn SwapAggregator>,
        chain: Arc<dyn ChainClient>,
        relay: Option<Arc<dyn BundleRelay>>,
        opts: EngineOptions,
    ) -> Self {
        let bundler = TransactionBundler::new(
            aggregator,
            Arc::clone(&chain),
            opts.tip_account,
            relay.is_some(),
            opts.allow_unbundled_tip,
        );
        let relay = SubmissionRelay::new(Arc::clone(&chain), relay, opts.confirm, opts.skip_preflight);
        Self {
            bundler,
            relay,
            chain,
            max_slippage_bps: opts.max_slippage_bps,
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let tip_account = Pubkey::from_str(&cfg.jito_tip_account)
            .map_err(|e| TradeError::InvalidIntent(format!("bad tip account: {e}")))?;
        let relay = cfg
            .jito_engine_url
            .as_deref()
            .map(|url| Arc::new(JitoRelay::new(url)) as Arc<dyn BundleRelay>);
        Ok(Self::new(
            Arc::new(JupiterClient::new(cfg.jupiter_base_url.clone())),
            Arc::new(RpcChain::new(cfg.rpc_http_url.clone())),
            relay,
            EngineOptions {
                tip_account,
                allow_unbundled_tip: cfg.allow_unbundled_tip,
                skip_preflight: cfg.skip_preflight,
                max_slippage_bps: cfg.max_slippage_bps,
                confirm: cfg.confirm_policy(),
            },
        ))
    }

    pub async fn buy(&self, mint: Pubkey, sol_amount: Decimal, ctx: TradeContext<'_>) -> Result<TradeOutcome> {
        let slippage = slippage_bps(ctx.settings.slippage_pct, self.max_slippage_bps)?;
        let intent = TradeIntent::buy(mint, sol_amount, slippage)?;
        let tip = ctx.settings.tip_lamports()?;
        info!(
            %mint,
            %sol_amount,
            slippage_bps = slippage,
            tip_lamports = tip.unwrap_or(0),
            payer = %ctx.signer.pubkey(),
            dex = %ctx.settings.preferred_dex,
            relay = self.relay.has_relay(),
            "engine.buy"
        );

        let result = async {
            let bundle = self.bundler.build_buy_bundle(&intent, ctx.signer, tip).await?;
            let receipt = self.relay.submit(&bundle.transactions).await?;
            Ok::<_, TradeError>((bundle.quote, receipt))
        }
        .await;
        let (quote, receipt) = result.inspect_err(|e| log_failure("buy", &mint, e))?;

        let output_decimals = match quote.output_decimals {
            Some(d) => Some(d),
            None => match self.chain.mint_decimals(&mint).await {
                Ok(d) => Some(d),
                Err(e) => {
                    warn!(%mint, error = %e, "engine.buy_decimals_unresolved");
                    None
                }
            },
        };

        info!(%mint, signature = %receipt.signature, atomic = receipt.atomic, "engine.buy_confirmed");
        Ok(TradeOutcome {
            direction: Direction::Buy,
            mint,
            receipt,
            in_amount: quote.in_amount,
            out_amount: quote.out_amount,
            output_decimals,
        })
    }

    pub async fn sell(&self, mint: Pubkey, token_amount: Decimal, ctx: TradeContext<'_>) -> Result<TradeOutcome> {
        let slippage = slippage_bps(ctx.settings.slippage_pct, self.max_slippage_bps)?;
        let intent = TradeIntent::sell(mint, token_amount, slippage)?;
        let tip = ctx.settings.tip_lamports()?;
        info!(
            %mint,
            %token_amount,
            slippage_bps = slippage,
            tip_lamports = tip.unwrap_or(0),
            payer = %ctx.signer.pubkey(),
            relay = self.relay.has_relay(),
            "engine.sell"
        );

        let result = async {
            let bundle = self.bundler.build_sell_bundle(&intent, ctx.signer, tip).await?;
            let receipt = self.relay.submit(&bundle.transactions).await?;
            Ok::<_, TradeError>((bundle.quote, receipt))
        }
        .await;
        let (quote, receipt) = result.inspect_err(|e| log_failure("sell", &mint, e))?;

        info!(%mint, signature = %receipt.signature, atomic = receipt.atomic, "engine.sell_confirmed");
        Ok(TradeOutcome {
            direction: Direction::Sell,
            mint,
            receipt,
            in_amount: quote.in_amount,
            out_amount: quote.out_amount,
            output_decimals: Some(NATIVE_DECIMALS),
        })
    }
}

fn log_failure(side: &str, mint: &Pubkey, e: &TradeError) {
    error!(side, %mint, error = %e, funds = ?e.funds_moved(), "engine.trade_failed");
}
