use anchor_lang::prelude::*;

pub mod constants;
pub mod errors;
pub mod instructions;
pub mod math;
pub mod pda;
pub mod state;

pub use instructions::*;

declare_id!("64XogE2RvY7g4fDp8XxWZxFTycANjDK37n88GZizm5nx");

#[program]
pub mod stellalpha_vault {
    use super::*;

    // Admin

    pub fn initialize_global_config(ctx: Context<InitializeGlobalConfig>) -> Result<()> {
        instructions::initialize_global_config(ctx)
    }

    pub fn update_global_config(
        ctx: Context<AdminGlobalConfig>,
        platform_fee_bps: u16,
        performance_fee_bps: u16,
    ) -> Result<()> {
        instructions::update_global_config(ctx, platform_fee_bps, performance_fee_bps)
    }

    // Vault

    pub fn initialize_vault(
        ctx: Context<InitializeVault>,
        authority: Pubkey,
        base_mint: Pubkey,
    ) -> Result<()> {
        instructions::initialize_vault(ctx, authority, base_mint)
    }

    pub fn init_vault_ata(ctx: Context<InitVaultAta>) -> Result<()> {
        instructions::init_vault_ata(ctx)
    }

    pub fn deposit_token(ctx: Context<DepositToken>, amount: u64) -> Result<()> {
        instructions::deposit_token(ctx, amount)
    }

    pub fn withdraw_token(ctx: Context<WithdrawToken>, amount: u64) -> Result<()> {
        instructions::withdraw_token(ctx, amount)
    }

    pub fn toggle_vault_pause(ctx: Context<TogglePause>) -> Result<()> {
        instructions::toggle_vault_pause(ctx)
    }

    pub fn close_vault_ata(ctx: Context<CloseVaultAta>) -> Result<()> {
        instructions::close_vault_ata(ctx)
    }

    // TraderState

    pub fn create_trader_state(ctx: Context<CreateTraderState>, funding_amount: u64) -> Result<()> {
        instructions::create_trader_state(ctx, funding_amount)
    }

    pub fn mark_trader_initialized(ctx: Context<MarkTraderInitialized>) -> Result<()> {
        instructions::mark_trader_initialized(ctx)
    }

    pub fn pause_trader_state(ctx: Context<UpdateTraderState>) -> Result<()> {
        instructions::pause_trader_state(ctx)
    }

    pub fn resume_trader_state(ctx: Context<UpdateTraderState>) -> Result<()> {
        instructions::resume_trader_state(ctx)
    }

    pub fn settle_trader_state(ctx: Context<SettleTraderState>) -> Result<()> {
        instructions::settle_trader_state(ctx)
    }

    pub fn withdraw_trader_state(ctx: Context<WithdrawTraderState>) -> Result<()> {
        instructions::withdraw_trader_state(ctx)
    }

    pub fn close_trader_state(ctx: Context<CloseTraderState>) -> Result<()> {
        instructions::close_trader_state(ctx)
    }

    pub fn create_trader_ata(ctx: Context<CreateTraderAta>) -> Result<()> {
        instructions::create_trader_ata(ctx)
    }

    pub fn close_trader_ata(ctx: Context<CloseTraderAta>) -> Result<()> {
        instructions::close_trader_ata(ctx)
    }

    // Swap

    pub fn execute_trader_swap(
        ctx: Context<ExecuteTraderSwap>,
        amount_in: u64,
        min_amount_out: u64,
        route_data: Vec<u8>,
    ) -> Result<()> {
        instructions::execute_trader_swap(ctx, amount_in, min_amount_out, route_data)
    }
}
