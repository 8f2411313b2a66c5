use anchor_lang::prelude::*;
use anchor_lang::solana_program::instruction::{AccountMeta, Instruction};
use anchor_lang::solana_program::program::invoke_signed;
use anchor_spl::token::{self, Token, TokenAccount, Transfer};

use crate::constants::SWAP_PROGRAM_ID;
use crate::errors::ErrorCode;
use crate::math::{split_fee, verify_swap_outcome};
use crate::pda::{GLOBAL_CONFIG_SEED, TRADER_STATE_SEED, USER_VAULT_SEED};
use crate::state::*;

/// Execute a swap on behalf of a TraderState via aggregator CPI.
/// amount_in: Total amount to spend, including platform fee.
/// min_amount_out: Minimum amount to receive (slippage protection).
/// route_data: Opaque instruction data for the swap program.
///
/// Every failure aborts the instruction, so the fee transfer is reverted
/// together with the swap.
pub fn execute_trader_swap(
    ctx: Context<ExecuteTraderSwap>,
    amount_in: u64,
    min_amount_out: u64,
    route_data: Vec<u8>,
) -> Result<()> {
    let vault = &ctx.accounts.vault;
    let global_config = &ctx.accounts.global_config;
    let trader_state_key = ctx.accounts.trader_state.key();

    // 1. Status
    require!(!vault.is_paused, ErrorCode::Paused);
    ctx.accounts.trader_state.ensure_can_swap()?;

    // 2. Topology: both legs held by this TraderState
    let input_mint = ctx.accounts.input_token_account.mint;
    let output_mint = ctx.accounts.output_token_account.mint;
    require_keys_eq!(
        ctx.accounts.input_token_account.owner,
        trader_state_key,
        ErrorCode::InvalidTokenAccountOwner
    );
    require_keys_eq!(
        ctx.accounts.output_token_account.owner,
        trader_state_key,
        ErrorCode::InvalidTokenAccountOwner
    );
    require_keys_neq!(
        ctx.accounts.input_token_account.key(),
        ctx.accounts.output_token_account.key(),
        ErrorCode::InvalidSwapTopology
    );

    // 3. Fee destination: admin's account for the input token
    require_keys_eq!(
        ctx.accounts.platform_fee_account.owner,
        global_config.admin,
        ErrorCode::InvalidFeeDestination
    );
    require_keys_eq!(
        ctx.accounts.platform_fee_account.mint,
        input_mint,
        ErrorCode::InvalidFeeDestination
    );

    require_keys_eq!(
        ctx.accounts.swap_program.key(),
        SWAP_PROGRAM_ID,
        ErrorCode::InvalidSwapProgram
    );

    // 4. Amounts
    require!(amount_in > 0, ErrorCode::InvalidAmount);
    require!(
        ctx.accounts.input_token_account.amount >= amount_in,
        ErrorCode::InsufficientFunds
    );
    let split = split_fee(amount_in, global_config.platform_fee_bps)?;

    let trader_state = &ctx.accounts.trader_state;
    let seeds = &[
        TRADER_STATE_SEED,
        trader_state.owner.as_ref(),
        trader_state.trader.as_ref(),
        &[trader_state.bump],
    ];
    let signer = &[&seeds[..]];

    if split.fee > 0 {
        let cpi_accounts = Transfer {
            from: ctx.accounts.input_token_account.to_account_info(),
            to: ctx.accounts.platform_fee_account.to_account_info(),
            authority: trader_state.to_account_info(),
        };
        let cpi_ctx = CpiContext::new_with_signer(
            ctx.accounts.token_program.to_account_info(),
            cpi_accounts,
            signer,
        );
        token::transfer(cpi_ctx, split.fee)?;
        msg!("Paid platform fee: {}", split.fee);
    }

    // Snapshot after the fee so spending is bounded by swap_amount alone
    ctx.accounts.input_token_account.reload()?;
    let balance_in_before = ctx.accounts.input_token_account.amount;
    let balance_out_before = ctx.accounts.output_token_account.amount;

    // 5. Swap CPI. invoke_signed signs for the TraderState PDA, so its meta
    // must carry is_signer = true.
    let accounts: Vec<AccountMeta> = ctx
        .remaining_accounts
        .iter()
        .map(|acc| {
            let is_signer = acc.is_signer || *acc.key == trader_state_key;
            if acc.is_writable {
                AccountMeta::new(*acc.key, is_signer)
            } else {
                AccountMeta::new_readonly(*acc.key, is_signer)
            }
        })
        .collect();

    let ix = Instruction {
        program_id: SWAP_PROGRAM_ID,
        accounts,
        data: route_data,
    };
    invoke_signed(&ix, ctx.remaining_accounts, signer)?;

    // 6. Post-swap verification
    ctx.accounts.input_token_account.reload()?;
    ctx.accounts.output_token_account.reload()?;
    let balance_out_after = ctx.accounts.output_token_account.amount;
    let outcome = verify_swap_outcome(
        balance_in_before,
        ctx.accounts.input_token_account.amount,
        balance_out_before,
        balance_out_after,
        split.swap_amount,
        min_amount_out,
    )?;

    // 7. Accounting
    let base_mint = ctx.accounts.vault.base_mint;
    let trader_state = &mut ctx.accounts.trader_state;
    trader_state.record_swap(input_mint, output_mint, base_mint, balance_out_after);

    emit!(TraderSwapExecuted {
        trader_state: trader_state_key,
        input_mint,
        output_mint,
        amount_in,
        platform_fee: split.fee,
        amount_spent: outcome.amount_spent,
        amount_received: outcome.amount_received,
        current_value: trader_state.current_value,
    });

    msg!(
        "Swap Success. In: {}, Out: {}, Value: {}",
        outcome.amount_spent,
        outcome.amount_received,
        trader_state.current_value
    );
    Ok(())
}

#[derive(Accounts)]
pub struct ExecuteTraderSwap<'info> {
    /// Backend agent.
    pub authority: Signer<'info>,

    #[account(
        seeds = [USER_VAULT_SEED, trader_state.owner.as_ref()],
        bump = vault.bump,
        has_one = authority @ ErrorCode::Unauthorized,
    )]
    pub vault: Account<'info, UserVault>,

    #[account(
        mut,
        has_one = vault @ ErrorCode::Unauthorized,
        seeds = [TRADER_STATE_SEED, trader_state.owner.as_ref(), trader_state.trader.as_ref()],
        bump = trader_state.bump
    )]
    pub trader_state: Account<'info, TraderState>,

    #[account(mut)]
    pub input_token_account: Account<'info, TokenAccount>,

    #[account(mut)]
    pub output_token_account: Account<'info, TokenAccount>,

    #[account(mut)]
    pub platform_fee_account: Account<'info, TokenAccount>,

    #[account(
        seeds = [GLOBAL_CONFIG_SEED],
        bump,
    )]
    pub global_config: Account<'info, GlobalConfig>,

    /// CHECK: Compared against SWAP_PROGRAM_ID in the handler.
    pub swap_program: UncheckedAccount<'info>,

    pub token_program: Program<'info, Token>,
}
