use anchor_lang::prelude::*;
use anchor_spl::associated_token::AssociatedToken;
use anchor_spl::token::{self, CloseAccount, Mint, Token, TokenAccount, Transfer};

use crate::errors::ErrorCode;
use crate::pda::USER_VAULT_SEED;
use crate::state::*;

pub fn initialize_vault(
    ctx: Context<InitializeVault>,
    authority: Pubkey,
    base_mint: Pubkey,
) -> Result<()> {
    let vault = &mut ctx.accounts.vault;
    vault.owner = ctx.accounts.owner.key();
    vault.authority = authority;
    vault.bump = ctx.bumps.vault;
    vault.is_paused = false;
    vault.base_mint = base_mint;
    msg!(
        "Vault initialized for owner: {} with Base Asset: {}",
        vault.owner,
        base_mint
    );
    Ok(())
}

/// Halts every trader swap under this vault until toggled back.
pub fn toggle_vault_pause(ctx: Context<TogglePause>) -> Result<()> {
    let vault = &mut ctx.accounts.vault;
    vault.is_paused = !vault.is_paused;
    msg!("Vault pause state toggled to: {}", vault.is_paused);
    Ok(())
}

pub fn deposit_token(ctx: Context<DepositToken>, amount: u64) -> Result<()> {
    require!(amount > 0, ErrorCode::InvalidAmount);

    let cpi_accounts = Transfer {
        from: ctx.accounts.owner_token_account.to_account_info(),
        to: ctx.accounts.vault_token_account.to_account_info(),
        authority: ctx.accounts.owner.to_account_info(),
    };
    let cpi_program = ctx.accounts.token_program.to_account_info();
    let cpi_ctx = CpiContext::new(cpi_program, cpi_accounts);
    token::transfer(cpi_ctx, amount)?;
    msg!("Deposited {} tokens to vault", amount);
    Ok(())
}

pub fn withdraw_token(ctx: Context<WithdrawToken>, amount: u64) -> Result<()> {
    require!(amount > 0, ErrorCode::InvalidAmount);
    require!(
        ctx.accounts.vault_token_account.amount >= amount,
        ErrorCode::InsufficientFunds
    );

    let vault = &ctx.accounts.vault;
    let seeds = &[USER_VAULT_SEED, vault.owner.as_ref(), &[vault.bump]];
    let signer = &[&seeds[..]];

    let cpi_accounts = Transfer {
        from: ctx.accounts.vault_token_account.to_account_info(),
        to: ctx.accounts.owner_token_account.to_account_info(),
        authority: ctx.accounts.vault.to_account_info(),
    };
    let cpi_program = ctx.accounts.token_program.to_account_info();
    let cpi_ctx = CpiContext::new_with_signer(cpi_program, cpi_accounts, signer);
    token::transfer(cpi_ctx, amount)?;
    msg!("Withdrew {} tokens from vault", amount);
    Ok(())
}

/// Close a Vault Token Account (ATA) if its balance is zero.
/// Rent is returned to owner.
pub fn close_vault_ata(ctx: Context<CloseVaultAta>) -> Result<()> {
    require!(
        ctx.accounts.vault_token_account.amount == 0,
        ErrorCode::NonZeroBalance
    );

    let vault = &ctx.accounts.vault;
    let seeds = &[USER_VAULT_SEED, vault.owner.as_ref(), &[vault.bump]];
    let signer = &[&seeds[..]];

    let close_accounts = CloseAccount {
        account: ctx.accounts.vault_token_account.to_account_info(),
        destination: ctx.accounts.owner.to_account_info(),
        authority: ctx.accounts.vault.to_account_info(),
    };
    let cpi_ctx = CpiContext::new_with_signer(
        ctx.accounts.token_program.to_account_info(),
        close_accounts,
        signer,
    );
    token::close_account(cpi_ctx)?;

    msg!("Closed Vault ATA. Rent returned to owner.");
    Ok(())
}

pub fn init_vault_ata(ctx: Context<InitVaultAta>) -> Result<()> {
    msg!("Initialized Vault ATA for mint: {}", ctx.accounts.mint.key());
    Ok(())
}

#[derive(Accounts)]
pub struct InitializeVault<'info> {
    #[account(mut)]
    pub owner: Signer<'info>,

    #[account(
        init,
        payer = owner,
        space = UserVault::INIT_SPACE,
        seeds = [USER_VAULT_SEED, owner.key().as_ref()],
        bump
    )]
    pub vault: Account<'info, UserVault>,

    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct TogglePause<'info> {
    #[account(mut)]
    pub owner: Signer<'info>,

    #[account(
        mut,
        has_one = owner @ ErrorCode::Unauthorized,
        seeds = [USER_VAULT_SEED, owner.key().as_ref()],
        bump = vault.bump
    )]
    pub vault: Account<'info, UserVault>,
}

#[derive(Accounts)]
pub struct DepositToken<'info> {
    #[account(mut)]
    pub owner: Signer<'info>,

    #[account(
        has_one = owner @ ErrorCode::Unauthorized,
        seeds = [USER_VAULT_SEED, owner.key().as_ref()],
        bump = vault.bump
    )]
    pub vault: Account<'info, UserVault>,

    #[account(
        mut,
        associated_token::mint = vault.base_mint,
        associated_token::authority = vault
    )]
    pub vault_token_account: Account<'info, TokenAccount>,

    #[account(
        mut,
        associated_token::mint = vault.base_mint,
        associated_token::authority = owner
    )]
    pub owner_token_account: Account<'info, TokenAccount>,

    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
pub struct WithdrawToken<'info> {
    #[account(mut)]
    pub owner: Signer<'info>,

    #[account(
        has_one = owner @ ErrorCode::Unauthorized,
        seeds = [USER_VAULT_SEED, owner.key().as_ref()],
        bump = vault.bump
    )]
    pub vault: Account<'info, UserVault>,

    #[account(
        mut,
        associated_token::mint = vault.base_mint,
        associated_token::authority = vault
    )]
    pub vault_token_account: Account<'info, TokenAccount>,

    #[account(
        mut,
        associated_token::mint = vault.base_mint,
        associated_token::authority = owner
    )]
    pub owner_token_account: Account<'info, TokenAccount>,

    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
pub struct CloseVaultAta<'info> {
    #[account(mut)]
    pub owner: Signer<'info>,

    #[account(
        has_one = owner @ ErrorCode::Unauthorized,
        seeds = [USER_VAULT_SEED, owner.key().as_ref()],
        bump = vault.bump
    )]
    pub vault: Account<'info, UserVault>,

    #[account(
        mut,
        token::authority = vault
    )]
    pub vault_token_account: Account<'info, TokenAccount>,

    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
pub struct InitVaultAta<'info> {
    #[account(mut)]
    pub owner: Signer<'info>,

    #[account(
        has_one = owner @ ErrorCode::Unauthorized,
        seeds = [USER_VAULT_SEED, owner.key().as_ref()],
        bump = vault.bump
    )]
    pub vault: Account<'info, UserVault>,

    pub mint: Account<'info, Mint>,

    #[account(
        init,
        payer = owner,
        associated_token::mint = mint,
        associated_token::authority = vault
    )]
    pub vault_token_account: Account<'info, TokenAccount>,

    pub token_program: Program<'info, Token>,
    pub associated_token_program: Program<'info, AssociatedToken>,
    pub system_program: Program<'info, System>,
}
