use anchor_lang::prelude::*;
use anchor_spl::associated_token::AssociatedToken;
use anchor_spl::token::{self, CloseAccount, Mint, Token, TokenAccount, Transfer};

use crate::errors::ErrorCode;
use crate::pda::{TRADER_STATE_SEED, USER_VAULT_SEED};
use crate::state::*;

pub fn create_trader_state(ctx: Context<CreateTraderState>, funding_amount: u64) -> Result<()> {
    require!(funding_amount > 0, ErrorCode::InvalidAmount);
    require!(
        ctx.accounts.vault_token_account.amount >= funding_amount,
        ErrorCode::InsufficientFunds
    );

    let trader_state = &mut ctx.accounts.trader_state;
    trader_state.open(
        ctx.accounts.owner.key(),
        ctx.accounts.trader.key(),
        ctx.accounts.vault.key(),
        ctx.bumps.trader_state,
        ctx.accounts.vault.base_mint,
        funding_amount,
    );

    // Initial funding moves UserVault -> TraderState
    let seeds = &[
        USER_VAULT_SEED,
        ctx.accounts.owner.key.as_ref(),
        &[ctx.accounts.vault.bump],
    ];
    let signer = &[&seeds[..]];

    let cpi_accounts = Transfer {
        from: ctx.accounts.vault_token_account.to_account_info(),
        to: ctx.accounts.trader_token_account.to_account_info(),
        authority: ctx.accounts.vault.to_account_info(),
    };
    let cpi_program = ctx.accounts.token_program.to_account_info();
    let cpi_ctx = CpiContext::new_with_signer(cpi_program, cpi_accounts, signer);
    token::transfer(cpi_ctx, funding_amount)?;

    msg!(
        "Created TraderState for trader: {}. Funded with: {}",
        trader_state.trader,
        funding_amount
    );
    Ok(())
}

/// Owner or backend authority. Repeating the call is a no-op.
pub fn mark_trader_initialized(ctx: Context<MarkTraderInitialized>) -> Result<()> {
    let signer = ctx.accounts.signer.key();
    require!(
        ctx.accounts.vault.is_owner_or_authority(&signer),
        ErrorCode::Unauthorized
    );

    if ctx.accounts.trader_state.mark_initialized()? {
        msg!("TraderState marked as initialized by {}", signer);
    } else {
        msg!("TraderState already initialized.");
    }
    Ok(())
}

pub fn pause_trader_state(ctx: Context<UpdateTraderState>) -> Result<()> {
    ctx.accounts.trader_state.pause()?;
    msg!("TraderState paused.");
    Ok(())
}

pub fn resume_trader_state(ctx: Context<UpdateTraderState>) -> Result<()> {
    ctx.accounts.trader_state.resume()?;
    msg!("TraderState resumed.");
    Ok(())
}

/// Snapshot the base-asset balance and lock the allocation for withdrawal.
pub fn settle_trader_state(ctx: Context<SettleTraderState>) -> Result<()> {
    let base_mint = ctx.accounts.vault.base_mint;
    let base_balance = ctx.accounts.trader_token_account.amount;
    let trader_state = &mut ctx.accounts.trader_state;
    trader_state.settle(base_mint, base_balance)?;
    msg!(
        "TraderState settled. Equity: {}. High water mark: {}",
        trader_state.current_value,
        trader_state.high_water_mark
    );
    Ok(())
}

/// Settled allocations only. TraderState base ATA -> owner wallet ATA, then
/// the ATA and the TraderState are closed with rent to the owner.
pub fn withdraw_trader_state(ctx: Context<WithdrawTraderState>) -> Result<()> {
    let trader_state = &ctx.accounts.trader_state;
    trader_state.ensure_can_withdraw()?;

    let seeds = &[
        TRADER_STATE_SEED,
        trader_state.owner.as_ref(),
        trader_state.trader.as_ref(),
        &[trader_state.bump],
    ];
    let signer = &[&seeds[..]];

    let amount = ctx.accounts.trader_token_account.amount;
    if amount > 0 {
        let cpi_accounts = Transfer {
            from: ctx.accounts.trader_token_account.to_account_info(),
            to: ctx.accounts.owner_token_account.to_account_info(),
            authority: trader_state.to_account_info(),
        };
        let cpi_ctx = CpiContext::new_with_signer(
            ctx.accounts.token_program.to_account_info(),
            cpi_accounts,
            signer,
        );
        token::transfer(cpi_ctx, amount)?;
    }

    let close_accounts = CloseAccount {
        account: ctx.accounts.trader_token_account.to_account_info(),
        destination: ctx.accounts.owner.to_account_info(),
        authority: trader_state.to_account_info(),
    };
    let close_ctx = CpiContext::new_with_signer(
        ctx.accounts.token_program.to_account_info(),
        close_accounts,
        signer,
    );
    token::close_account(close_ctx)?;

    emit!(TraderStateClosed {
        owner: trader_state.owner,
        trader: trader_state.trader,
        amount,
        settled: true,
    });

    // TraderState account itself is closed via `close = owner`
    msg!("Withdrawal complete. Amount: {}. TraderState closed.", amount);
    Ok(())
}

/// Paused (or settled) allocations. Whole base balance goes back to the UserVault.
pub fn close_trader_state(ctx: Context<CloseTraderState>) -> Result<()> {
    let trader_state = &ctx.accounts.trader_state;
    trader_state.ensure_can_close(ctx.accounts.vault.base_mint)?;

    let seeds = &[
        TRADER_STATE_SEED,
        trader_state.owner.as_ref(),
        trader_state.trader.as_ref(),
        &[trader_state.bump],
    ];
    let signer = &[&seeds[..]];

    let amount = ctx.accounts.trader_token_account.amount;
    if amount > 0 {
        let cpi_accounts = Transfer {
            from: ctx.accounts.trader_token_account.to_account_info(),
            to: ctx.accounts.vault_token_account.to_account_info(),
            authority: trader_state.to_account_info(),
        };
        let cpi_ctx = CpiContext::new_with_signer(
            ctx.accounts.token_program.to_account_info(),
            cpi_accounts,
            signer,
        );
        token::transfer(cpi_ctx, amount)?;
    }

    let close_accounts = CloseAccount {
        account: ctx.accounts.trader_token_account.to_account_info(),
        destination: ctx.accounts.owner.to_account_info(),
        authority: trader_state.to_account_info(),
    };
    let close_ctx = CpiContext::new_with_signer(
        ctx.accounts.token_program.to_account_info(),
        close_accounts,
        signer,
    );
    token::close_account(close_ctx)?;

    emit!(TraderStateClosed {
        owner: trader_state.owner,
        trader: trader_state.trader,
        amount,
        settled: trader_state.is_settled,
    });

    msg!("Closed TraderState and refunded {} to vault.", amount);
    Ok(())
}

/// Provision a TraderState-owned token account for a non-base mint so swap
/// output can land there. Owner or backend authority; no funds move.
pub fn create_trader_ata(ctx: Context<CreateTraderAta>) -> Result<()> {
    let signer = ctx.accounts.signer.key();
    require!(
        ctx.accounts.vault.is_owner_or_authority(&signer),
        ErrorCode::Unauthorized
    );
    msg!(
        "Created TraderState ATA for mint: {}",
        ctx.accounts.mint.key()
    );
    Ok(())
}

/// Reclaim rent from an empty TraderState token account while paused.
pub fn close_trader_ata(ctx: Context<CloseTraderAta>) -> Result<()> {
    let trader_state = &ctx.accounts.trader_state;
    require!(trader_state.is_paused, ErrorCode::TraderNotPaused);
    require!(
        ctx.accounts.trader_token_account.amount == 0,
        ErrorCode::NonZeroBalance
    );

    let seeds = &[
        TRADER_STATE_SEED,
        trader_state.owner.as_ref(),
        trader_state.trader.as_ref(),
        &[trader_state.bump],
    ];
    let signer = &[&seeds[..]];

    let close_accounts = CloseAccount {
        account: ctx.accounts.trader_token_account.to_account_info(),
        destination: ctx.accounts.owner.to_account_info(),
        authority: trader_state.to_account_info(),
    };
    let close_ctx = CpiContext::new_with_signer(
        ctx.accounts.token_program.to_account_info(),
        close_accounts,
        signer,
    );
    token::close_account(close_ctx)?;

    msg!(
        "Closed TraderState ATA for mint: {}. Rent returned to owner.",
        ctx.accounts.trader_token_account.mint
    );
    Ok(())
}

#[derive(Accounts)]
pub struct CreateTraderState<'info> {
    #[account(mut)]
    pub owner: Signer<'info>,

    /// CHECK: Used only as a seed for TraderState.
    pub trader: UncheckedAccount<'info>,

    #[account(
        has_one = owner @ ErrorCode::Unauthorized,
        seeds = [USER_VAULT_SEED, owner.key().as_ref()],
        bump = vault.bump
    )]
    pub vault: Account<'info, UserVault>,

    #[account(
        init,
        payer = owner,
        space = TraderState::INIT_SPACE,
        seeds = [TRADER_STATE_SEED, owner.key().as_ref(), trader.key().as_ref()],
        bump
    )]
    pub trader_state: Account<'info, TraderState>,

    #[account(
        mut,
        associated_token::mint = mint,
        associated_token::authority = vault
    )]
    pub vault_token_account: Account<'info, TokenAccount>,

    #[account(
        init,
        payer = owner,
        associated_token::mint = mint,
        associated_token::authority = trader_state
    )]
    pub trader_token_account: Account<'info, TokenAccount>,

    #[account(address = vault.base_mint)]
    pub mint: Account<'info, Mint>,

    pub system_program: Program<'info, System>,
    pub token_program: Program<'info, Token>,
    pub associated_token_program: Program<'info, AssociatedToken>,
}

#[derive(Accounts)]
pub struct MarkTraderInitialized<'info> {
    pub signer: Signer<'info>,

    #[account(
        seeds = [USER_VAULT_SEED, trader_state.owner.as_ref()],
        bump = vault.bump
    )]
    pub vault: Account<'info, UserVault>,

    #[account(
        mut,
        has_one = vault @ ErrorCode::Unauthorized,
        seeds = [TRADER_STATE_SEED, trader_state.owner.as_ref(), trader_state.trader.as_ref()],
        bump = trader_state.bump
    )]
    pub trader_state: Account<'info, TraderState>,
}

#[derive(Accounts)]
pub struct UpdateTraderState<'info> {
    pub owner: Signer<'info>,

    #[account(
        mut,
        has_one = owner @ ErrorCode::Unauthorized,
        seeds = [TRADER_STATE_SEED, owner.key().as_ref(), trader_state.trader.as_ref()],
        bump = trader_state.bump
    )]
    pub trader_state: Account<'info, TraderState>,
}

#[derive(Accounts)]
pub struct SettleTraderState<'info> {
    pub owner: Signer<'info>,

    #[account(
        seeds = [USER_VAULT_SEED, owner.key().as_ref()],
        bump = vault.bump
    )]
    pub vault: Account<'info, UserVault>,

    #[account(
        mut,
        has_one = owner @ ErrorCode::Unauthorized,
        has_one = vault @ ErrorCode::Unauthorized,
        seeds = [TRADER_STATE_SEED, owner.key().as_ref(), trader_state.trader.as_ref()],
        bump = trader_state.bump
    )]
    pub trader_state: Account<'info, TraderState>,

    #[account(
        associated_token::mint = vault.base_mint,
        associated_token::authority = trader_state
    )]
    pub trader_token_account: Account<'info, TokenAccount>,
}

#[derive(Accounts)]
pub struct WithdrawTraderState<'info> {
    #[account(mut)]
    pub owner: Signer<'info>,

    #[account(
        seeds = [USER_VAULT_SEED, owner.key().as_ref()],
        bump = vault.bump
    )]
    pub vault: Account<'info, UserVault>,

    #[account(
        mut,
        close = owner,
        has_one = owner @ ErrorCode::Unauthorized,
        has_one = vault @ ErrorCode::Unauthorized,
        seeds = [TRADER_STATE_SEED, owner.key().as_ref(), trader_state.trader.as_ref()],
        bump = trader_state.bump
    )]
    pub trader_state: Account<'info, TraderState>,

    // Source: TraderState base ATA
    #[account(
        mut,
        associated_token::mint = vault.base_mint,
        associated_token::authority = trader_state
    )]
    pub trader_token_account: Account<'info, TokenAccount>,

    // Destination: owner wallet ATA
    #[account(
        mut,
        associated_token::mint = vault.base_mint,
        associated_token::authority = owner
    )]
    pub owner_token_account: Account<'info, TokenAccount>,

    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
pub struct CloseTraderState<'info> {
    #[account(mut)]
    pub owner: Signer<'info>,

    #[account(
        mut,
        close = owner,
        has_one = owner @ ErrorCode::Unauthorized,
        has_one = vault @ ErrorCode::Unauthorized,
        seeds = [TRADER_STATE_SEED, owner.key().as_ref(), trader_state.trader.as_ref()],
        bump = trader_state.bump
    )]
    pub trader_state: Account<'info, TraderState>,

    #[account(
        seeds = [USER_VAULT_SEED, owner.key().as_ref()],
        bump = vault.bump
    )]
    pub vault: Account<'info, UserVault>,

    #[account(
        mut,
        associated_token::mint = vault.base_mint,
        associated_token::authority = trader_state
    )]
    pub trader_token_account: Account<'info, TokenAccount>,

    #[account(
        mut,
        associated_token::mint = vault.base_mint,
        associated_token::authority = vault
    )]
    pub vault_token_account: Account<'info, TokenAccount>,

    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
pub struct CreateTraderAta<'info> {
    /// Owner or backend authority; pays rent.
    #[account(mut)]
    pub signer: Signer<'info>,

    #[account(
        seeds = [USER_VAULT_SEED, trader_state.owner.as_ref()],
        bump = vault.bump
    )]
    pub vault: Account<'info, UserVault>,

    #[account(
        has_one = vault @ ErrorCode::Unauthorized,
        seeds = [TRADER_STATE_SEED, trader_state.owner.as_ref(), trader_state.trader.as_ref()],
        bump = trader_state.bump
    )]
    pub trader_state: Account<'info, TraderState>,

    pub mint: Account<'info, Mint>,

    #[account(
        init_if_needed,
        payer = signer,
        associated_token::mint = mint,
        associated_token::authority = trader_state
    )]
    pub trader_token_account: Account<'info, TokenAccount>,

    pub token_program: Program<'info, Token>,
    pub associated_token_program: Program<'info, AssociatedToken>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct CloseTraderAta<'info> {
    #[account(mut)]
    pub owner: Signer<'info>,

    #[account(
        has_one = owner @ ErrorCode::Unauthorized,
        seeds = [TRADER_STATE_SEED, owner.key().as_ref(), trader_state.trader.as_ref()],
        bump = trader_state.bump
    )]
    pub trader_state: Account<'info, TraderState>,

    #[account(
        mut,
        token::authority = trader_state
    )]
    pub trader_token_account: Account<'info, TokenAccount>,

    pub token_program: Program<'info, Token>,
}
