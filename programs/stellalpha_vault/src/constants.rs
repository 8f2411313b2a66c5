use anchor_lang::prelude::*;

// Jupiter V6 aggregator. The only program execute_trader_swap will invoke.
pub const SWAP_PROGRAM_ID: Pubkey = pubkey!("JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4");

pub const BPS_DENOMINATOR: u64 = 10_000;

pub const DEFAULT_PLATFORM_FEE_BPS: u16 = 10; // 0.1%
pub const DEFAULT_PERFORMANCE_FEE_BPS: u16 = 2_000; // 20%
