//! Deterministic account addressing.
//!
//! Seeds are part of the on-ledger contract: every client that derives these
//! addresses must use exactly these byte strings in exactly this order.

use anchor_lang::prelude::*;

pub const GLOBAL_CONFIG_SEED: &[u8] = b"global_config";
pub const USER_VAULT_SEED: &[u8] = b"user_vault_v1";
pub const TRADER_STATE_SEED: &[u8] = b"trader_state";

pub fn global_config_address() -> (Pubkey, u8) {
    Pubkey::find_program_address(&[GLOBAL_CONFIG_SEED], &crate::ID)
}

pub fn vault_address(owner: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[USER_VAULT_SEED, owner.as_ref()], &crate::ID)
}

pub fn trader_state_address(owner: &Pubkey, trader: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[TRADER_STATE_SEED, owner.as_ref(), trader.as_ref()],
        &crate::ID,
    )
}

/// Associated token account of `owner` for `mint` under the classic token program.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), anchor_spl::token::ID.as_ref(), mint.as_ref()],
        &anchor_spl::associated_token::ID,
    )
    .0
}
