use anchor_lang::prelude::*;

/// Global configuration for the protocol.
/// Admin-controlled fee settings.
#[account]
pub struct GlobalConfig {
    pub admin: Pubkey,
    pub platform_fee_bps: u16,
    pub performance_fee_bps: u16,
}

impl GlobalConfig {
    // 8 discriminator + 32 admin + 2 platform_fee + 2 performance_fee
    pub const SPACE: usize = 8 + 32 + 2 + 2;
}

#[event]
pub struct GlobalConfigUpdated {
    pub admin: Pubkey,
    pub platform_fee_bps: u16,
    pub performance_fee_bps: u16,
}
