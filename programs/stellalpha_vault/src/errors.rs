use anchor_lang::prelude::*;

#[error_code]
pub enum ErrorCode {
    #[msg("You are not authorized to perform this action.")]
    Unauthorized,
    #[msg("The vault is currently paused.")]
    Paused,
    #[msg("Invalid Fee Destination. Platform fee wallet mismatch.")]
    InvalidFeeDestination,
    #[msg("Slippage Exceeded. Amount received is less than min_amount_out.")]
    SlippageExceeded,
    #[msg("Fee Evasion Detected. Actual amount spent > declared amount_in.")]
    FeeEvasion,
    #[msg("TraderState must be paused to close.")]
    TraderNotPaused,
    #[msg("TraderState must be active to swap.")]
    TraderPaused,
    #[msg("TraderState must be active to swap: not initialized yet.")]
    TraderNotInitialized,
    #[msg("Funds must be fully settled in Base Asset before withdrawal.")]
    NotSettled,
    #[msg("TraderState is settled; it can only be withdrawn.")]
    AlreadySettled,
    #[msg("TraderState must hold Base Asset: last swap left the position in another mint.")]
    MintMismatch,
    #[msg("Insufficient funds for the requested transfer.")]
    InsufficientFunds,
    #[msg("Cannot close account with non-zero balance.")]
    NonZeroBalance,
    #[msg("Token account not owned by TraderState.")]
    InvalidTokenAccountOwner,
    #[msg("Amount must be greater than zero.")]
    InvalidAmount,
    #[msg("Fee basis points must not exceed 10000.")]
    InvalidFeeBps,
    #[msg("Math overflow.")]
    MathOverflow,
    #[msg("Swap program is not the configured aggregator.")]
    InvalidSwapProgram,
    #[msg("Swap input and output must be distinct token accounts.")]
    InvalidSwapTopology,
}
