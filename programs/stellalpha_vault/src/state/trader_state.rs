use anchor_lang::prelude::*;

use crate::errors::ErrorCode;

/// Per-trader allocation managed by backend authority.
///
/// # Lifecycle
/// 1. Created by owner with initial funding (`Pending`)
/// 2. Owner or backend confirms external setup (`Active`)
/// 3. Backend mirrors the followed trader's swaps
/// 4. Owner pauses (`Paused`), optionally resumes
/// 5. Either: owner settles (`Settled`) then withdraws to their wallet,
///    or: owner closes straight back into the UserVault
///
/// # Authority Model
/// - Owner: create, pause, resume, settle, withdraw, close
/// - Backend (vault.authority): execute swaps
/// - Either: mark initialized
#[account]
pub struct TraderState {
    /// The user who owns this allocation and the funds.
    pub owner: Pubkey,

    /// The trader being followed (Strategy Identifier).
    pub trader: Pubkey,

    /// Reference to the UserVault this allocation is associated with.
    pub vault: Pubkey,

    /// PDA Bump.
    pub bump: u8,

    /// Base-asset value as of the last swap back into the base asset.
    pub current_value: u64,

    /// High Water Mark for performance fee calculation.
    pub high_water_mark: u64,

    /// Legs of the most recent swap.
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,

    pub is_paused: bool,
    pub is_settled: bool,
    pub is_initialized: bool,
}

/// The lifecycle phase encoded by the flag triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraderLifecycle {
    /// Funded, waiting for setup confirmation. Swaps refused.
    Pending,
    Active,
    Paused { initialized: bool },
    /// Trading permanently halted; only withdrawal or close remain.
    Settled,
}

impl TraderState {
    // 8 discriminator
    // + 32 (owner) + 32 (trader) + 32 (vault)
    // + 1 (bump)
    // + 8 (current_value)
    // + 8 (high_water_mark)
    // + 32 (input_mint) + 32 (output_mint)
    // + 1 (is_paused)
    // + 1 (is_settled)
    // + 1 (is_initialized)
    pub const INIT_SPACE: usize = 8 + 32 + 32 + 32 + 1 + 8 + 8 + 32 + 32 + 1 + 1 + 1;

    pub fn open(
        &mut self,
        owner: Pubkey,
        trader: Pubkey,
        vault: Pubkey,
        bump: u8,
        base_mint: Pubkey,
        funding_amount: u64,
    ) {
        self.owner = owner;
        self.trader = trader;
        self.vault = vault;
        self.bump = bump;
        self.current_value = funding_amount;
        self.high_water_mark = funding_amount;
        self.input_mint = base_mint;
        self.output_mint = base_mint;
        self.is_paused = false;
        self.is_settled = false;
        self.is_initialized = false;
    }

    pub fn lifecycle(&self) -> TraderLifecycle {
        match (self.is_settled, self.is_paused, self.is_initialized) {
            (true, _, _) => TraderLifecycle::Settled,
            (false, true, initialized) => TraderLifecycle::Paused { initialized },
            (false, false, true) => TraderLifecycle::Active,
            (false, false, false) => TraderLifecycle::Pending,
        }
    }

    /// Returns `false` when the allocation was already initialized.
    pub fn mark_initialized(&mut self) -> Result<bool> {
        match self.lifecycle() {
            TraderLifecycle::Settled => err!(ErrorCode::AlreadySettled),
            TraderLifecycle::Active | TraderLifecycle::Paused { initialized: true } => Ok(false),
            TraderLifecycle::Pending | TraderLifecycle::Paused { initialized: false } => {
                self.is_initialized = true;
                Ok(true)
            }
        }
    }

    pub fn pause(&mut self) -> Result<()> {
        require!(!self.is_settled, ErrorCode::AlreadySettled);
        self.is_paused = true;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        require!(!self.is_settled, ErrorCode::AlreadySettled);
        self.is_paused = false;
        Ok(())
    }

    pub fn ensure_can_swap(&self) -> Result<()> {
        match self.lifecycle() {
            TraderLifecycle::Active => Ok(()),
            TraderLifecycle::Pending => err!(ErrorCode::TraderNotInitialized),
            TraderLifecycle::Paused { .. } | TraderLifecycle::Settled => {
                err!(ErrorCode::TraderPaused)
            }
        }
    }

    /// `output_balance` is the post-swap balance of the output token account.
    pub fn record_swap(
        &mut self,
        input_mint: Pubkey,
        output_mint: Pubkey,
        base_mint: Pubkey,
        output_balance: u64,
    ) {
        self.input_mint = input_mint;
        self.output_mint = output_mint;
        if output_mint == base_mint {
            self.current_value = output_balance;
            self.raise_high_water_mark();
        }
    }

    /// The position must be back in `base_mint` and the base account must
    /// cover the tracked equity.
    pub fn settle(&mut self, base_mint: Pubkey, base_balance: u64) -> Result<()> {
        match self.lifecycle() {
            TraderLifecycle::Paused { .. } => {
                self.ensure_holds_base(base_mint)?;
                require!(
                    base_balance >= self.current_value,
                    ErrorCode::InsufficientFunds
                );
                self.is_settled = true;
                self.current_value = base_balance;
                self.raise_high_water_mark();
                Ok(())
            }
            TraderLifecycle::Settled => err!(ErrorCode::AlreadySettled),
            TraderLifecycle::Pending | TraderLifecycle::Active => {
                err!(ErrorCode::TraderNotPaused)
            }
        }
    }

    pub fn ensure_can_withdraw(&self) -> Result<()> {
        require!(
            self.lifecycle() == TraderLifecycle::Settled,
            ErrorCode::NotSettled
        );
        Ok(())
    }

    pub fn ensure_can_close(&self, base_mint: Pubkey) -> Result<()> {
        require!(self.is_paused, ErrorCode::TraderNotPaused);
        self.ensure_holds_base(base_mint)
    }

    fn ensure_holds_base(&self, base_mint: Pubkey) -> Result<()> {
        require_keys_eq!(self.output_mint, base_mint, ErrorCode::MintMismatch);
        Ok(())
    }

    fn raise_high_water_mark(&mut self) {
        if self.current_value > self.high_water_mark {
            self.high_water_mark = self.current_value;
        }
    }
}

#[event]
pub struct TraderSwapExecuted {
    pub trader_state: Pubkey,
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount_in: u64,
    pub platform_fee: u64,
    pub amount_spent: u64,
    pub amount_received: u64,
    pub current_value: u64,
}

/// Emitted when an allocation is torn down, by `withdraw` (settled) or `close`.
#[event]
pub struct TraderStateClosed {
    pub owner: Pubkey,
    pub trader: Pubkey,
    pub amount: u64,
    pub settled: bool,
}
