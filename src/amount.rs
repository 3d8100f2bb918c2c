//! Human amount <-> smallest-unit conversions.
//!
//! All conversions go through here so rounding is decided in one place:
//! half away from zero at the smallest unit.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{Result, TradeError};

/// Lamports per SOL is 10^9.
pub const NATIVE_DECIMALS: u8 = 9;

/// Wrapped SOL mint used by the aggregator for the native side of a swap.
pub const NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<u64> {
    if amount.is_sign_negative() {
        return Err(TradeError::InvalidIntent(format!("negative amount: {amount}")));
    }
    let factor = 10u64
        .checked_pow(u32::from(decimals))
        .ok_or_else(|| TradeError::InvalidIntent(format!("unsupported decimals: {decimals}")))?;
    amount
        .checked_mul(Decimal::from(factor))
        .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|v| v.to_u64())
        .ok_or_else(|| {
            TradeError::InvalidIntent(format!("{amount} with {decimals} decimals overflows u64"))
        })
}

pub fn from_base_units(units: u64, decimals: u8) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(units), u32::from(decimals))
}

pub fn lamports(sol: Decimal) -> Result<u64> {
    to_base_units(sol, NATIVE_DECIMALS)
}

/// `slippage_pct * 100`, rounded, capped at `max_bps`.
pub fn slippage_bps(slippage_pct: Decimal, max_bps: u16) -> Result<u16> {
    let bps = slippage_pct
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|v| v.to_u16())
        .ok_or_else(|| TradeError::InvalidIntent(format!("invalid slippage: {slippage_pct}%")))?;
    if bps > max_bps {
        return Err(TradeError::InvalidIntent(format!(
            "slippage_bps ({bps}) exceeds max_slippage_bps ({max_bps})"
        )));
    }
    Ok(bps)
}
