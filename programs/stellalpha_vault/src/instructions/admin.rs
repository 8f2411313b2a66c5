use anchor_lang::prelude::*;

use crate::constants::{BPS_DENOMINATOR, DEFAULT_PERFORMANCE_FEE_BPS, DEFAULT_PLATFORM_FEE_BPS};
use crate::errors::ErrorCode;
use crate::pda::GLOBAL_CONFIG_SEED;
use crate::state::*;

pub fn initialize_global_config(ctx: Context<InitializeGlobalConfig>) -> Result<()> {
    let config = &mut ctx.accounts.global_config;
    config.admin = ctx.accounts.admin.key();
    config.platform_fee_bps = DEFAULT_PLATFORM_FEE_BPS;
    config.performance_fee_bps = DEFAULT_PERFORMANCE_FEE_BPS;
    msg!(
        "Global Config initialized. Admin: {}. Platform fee: {} bps.",
        config.admin,
        config.platform_fee_bps
    );
    Ok(())
}

/// Admin only. Both rates are basis points of 10_000.
pub fn update_global_config(
    ctx: Context<AdminGlobalConfig>,
    platform_fee_bps: u16,
    performance_fee_bps: u16,
) -> Result<()> {
    require!(
        u64::from(platform_fee_bps) <= BPS_DENOMINATOR,
        ErrorCode::InvalidFeeBps
    );
    require!(
        u64::from(performance_fee_bps) <= BPS_DENOMINATOR,
        ErrorCode::InvalidFeeBps
    );

    let config = &mut ctx.accounts.global_config;
    config.platform_fee_bps = platform_fee_bps;
    config.performance_fee_bps = performance_fee_bps;
    msg!(
        "Global Config updated. Platform fee: {} bps. Performance fee: {} bps.",
        platform_fee_bps,
        performance_fee_bps
    );

    emit!(GlobalConfigUpdated {
        admin: ctx.accounts.admin.key(),
        platform_fee_bps,
        performance_fee_bps,
    });

    Ok(())
}

#[derive(Accounts)]
pub struct InitializeGlobalConfig<'info> {
    #[account(
        init,
        payer = admin,
        space = GlobalConfig::SPACE,
        seeds = [GLOBAL_CONFIG_SEED],
        bump
    )]
    pub global_config: Account<'info, GlobalConfig>,
    #[account(mut)]
    pub admin: Signer<'info>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct AdminGlobalConfig<'info> {
    #[account(
        mut,
        seeds = [GLOBAL_CONFIG_SEED],
        bump,
        has_one = admin @ ErrorCode::Unauthorized
    )]
    pub global_config: Account<'info, GlobalConfig>,
    pub admin: Signer<'info>,
}
