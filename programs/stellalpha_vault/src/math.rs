use anchor_lang::prelude::*;

use crate::constants::BPS_DENOMINATOR;
use crate::errors::ErrorCode;

/// Fee on `amount_in` at `fee_bps`, rounded down.
pub fn platform_fee(amount_in: u64, fee_bps: u16) -> Result<u64> {
    let fee = (amount_in as u128)
        .checked_mul(fee_bps as u128)
        .ok_or(ErrorCode::MathOverflow)?
        / BPS_DENOMINATOR as u128;
    u64::try_from(fee).map_err(|_| error!(ErrorCode::MathOverflow))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub fee: u64,
    /// What is actually routed to the swap venue.
    pub swap_amount: u64,
}

pub fn split_fee(amount_in: u64, fee_bps: u16) -> Result<FeeSplit> {
    require!(fee_bps as u64 <= BPS_DENOMINATOR, ErrorCode::InvalidFeeBps);
    let fee = platform_fee(amount_in, fee_bps)?;
    let swap_amount = amount_in.checked_sub(fee).ok_or(ErrorCode::MathOverflow)?;
    Ok(FeeSplit { fee, swap_amount })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapOutcome {
    pub amount_spent: u64,
    pub amount_received: u64,
}

/// Balances are snapshotted after the fee transfer, so `in_before` already
/// excludes the fee and spending is bounded by the routed amount alone.
pub fn verify_swap_outcome(
    in_before: u64,
    in_after: u64,
    out_before: u64,
    out_after: u64,
    swap_amount: u64,
    min_amount_out: u64,
) -> Result<SwapOutcome> {
    let amount_spent = in_before.saturating_sub(in_after);
    let amount_received = out_after
        .checked_sub(out_before)
        .ok_or(ErrorCode::SlippageExceeded)?;

    require!(amount_spent <= swap_amount, ErrorCode::FeeEvasion);
    require!(amount_received >= min_amount_out, ErrorCode::SlippageExceeded);

    Ok(SwapOutcome {
        amount_spent,
        amount_received,
    })
}
