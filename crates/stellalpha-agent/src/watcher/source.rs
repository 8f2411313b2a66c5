use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One SPL token movement, resolved to wallet owners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTransfer {
    pub mint: String,
    pub from_owner: String,
    pub to_owner: String,
    pub amount: u64,
    /// Balance of the source token account before the transaction.
    pub source_pre_balance: u64,
}

/// A confirmed, successful transaction reduced to what trade detection reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub signature: String,
    pub slot: u64,
    /// Fee payer.
    pub signer: String,
    pub program_ids: Vec<String>,
    pub token_transfers: Vec<TokenTransfer>,
    /// Signer lamports after minus before, fee included.
    pub native_delta_lamports: i64,
    pub native_pre_lamports: u64,
    pub fee_lamports: u64,
    pub ts_utc: DateTime<Utc>,
}

#[async_trait]
pub trait TransactionSource: Send {
    /// `Ok(None)` means the source is exhausted and will yield nothing more.
    async fn next_transaction(&mut self) -> Result<Option<RawTransaction>>;
}
