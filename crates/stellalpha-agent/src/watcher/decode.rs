use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use yellowstone_grpc_proto::prelude::{
    subscribe_update, Message as SolMessage, SubscribeUpdate, SubscribeUpdateTransaction,
    SubscribeUpdateTransactionInfo, TokenBalance, TransactionStatusMeta,
};

use super::source::{RawTransaction, TokenTransfer};

pub const SPL_TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

const TRANSFER_TAG: u8 = 3;
const TRANSFER_CHECKED_TAG: u8 = 12;

pub(super) enum ParsedUpdate {
    Transaction(RawTransaction),
    Ping,
}

pub(super) fn parse_update(update: SubscribeUpdate) -> Result<Option<ParsedUpdate>> {
    let created_at = update.created_at.clone();
    let Some(update_oneof) = update.update_oneof else {
        return Ok(None);
    };
    match update_oneof {
        subscribe_update::UpdateOneof::Transaction(tx_update) => {
            parse_transaction_update(tx_update, created_at)
                .map(|raw| raw.map(ParsedUpdate::Transaction))
        }
        subscribe_update::UpdateOneof::Ping(_) => Ok(Some(ParsedUpdate::Ping)),
        _ => Ok(None),
    }
}

pub(super) fn parse_transaction_update(
    tx_update: SubscribeUpdateTransaction,
    created_at: Option<yellowstone_grpc_proto::prost_types::Timestamp>,
) -> Result<Option<RawTransaction>> {
    let Some(tx_info) = tx_update.transaction else {
        return Err(anyhow!("missing transaction info in update"));
    };
    if tx_info.is_vote {
        return Ok(None);
    }
    let Some(meta) = tx_info.meta.as_ref() else {
        return Err(anyhow!("missing status meta in update"));
    };
    if meta.err.as_ref().is_some_and(|err| !err.err.is_empty()) {
        return Ok(None);
    }
    let Some(message) = tx_info
        .transaction
        .as_ref()
        .and_then(|tx| tx.message.as_ref())
    else {
        return Err(anyhow!("missing message in update"));
    };

    let account_keys = account_keys(message, meta);
    let Some(signer) = account_keys.first().cloned() else {
        return Err(anyhow!("missing signer in update"));
    };
    let signature = decode_signature(&tx_info)
        .ok_or_else(|| anyhow!("missing transaction signature in update"))?;

    let pre_lamports = meta.pre_balances.first().copied().unwrap_or(0);
    let post_lamports = meta.post_balances.first().copied().unwrap_or(0);
    let native_delta_lamports = (post_lamports as i128 - pre_lamports as i128)
        .clamp(i64::MIN as i128, i64::MAX as i128) as i64;

    let ts_utc = created_at
        .as_ref()
        .and_then(|timestamp| {
            if timestamp.nanos < 0 || timestamp.nanos >= 1_000_000_000 {
                return None;
            }
            DateTime::<Utc>::from_timestamp(timestamp.seconds, timestamp.nanos as u32)
        })
        .unwrap_or_else(Utc::now);

    Ok(Some(RawTransaction {
        signature,
        slot: tx_update.slot,
        signer,
        program_ids: program_ids(message, meta, &account_keys),
        token_transfers: decode_token_transfers(message, meta, &account_keys),
        native_delta_lamports,
        native_pre_lamports: pre_lamports,
        fee_lamports: meta.fee,
        ts_utc,
    }))
}

fn decode_signature(tx_info: &SubscribeUpdateTransactionInfo) -> Option<String> {
    if !tx_info.signature.is_empty() {
        return Some(bs58::encode(&tx_info.signature).into_string());
    }
    tx_info
        .transaction
        .as_ref()
        .and_then(|tx| tx.signatures.first())
        .map(|sig| bs58::encode(sig).into_string())
}

/// Static keys followed by lookup-table loaded writable then readonly keys,
/// the order instruction account indexes refer to.
fn account_keys(message: &SolMessage, meta: &TransactionStatusMeta) -> Vec<String> {
    message
        .account_keys
        .iter()
        .chain(meta.loaded_writable_addresses.iter())
        .chain(meta.loaded_readonly_addresses.iter())
        .map(|raw| bs58::encode(raw).into_string())
        .collect()
}

fn program_ids(
    message: &SolMessage,
    meta: &TransactionStatusMeta,
    account_keys: &[String],
) -> Vec<String> {
    let outer = message.instructions.iter().map(|ix| ix.program_id_index);
    let inner = meta
        .inner_instructions
        .iter()
        .flat_map(|group| group.instructions.iter().map(|ix| ix.program_id_index));
    outer
        .chain(inner)
        .filter_map(|index| account_keys.get(index as usize).cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

struct TokenAccountInfo {
    mint: String,
    owner: String,
    pre_amount: u64,
}

fn token_account_table(meta: &TransactionStatusMeta) -> HashMap<u32, TokenAccountInfo> {
    let mut table = HashMap::new();
    for balance in &meta.post_token_balances {
        table.insert(
            balance.account_index,
            TokenAccountInfo {
                mint: balance.mint.clone(),
                owner: balance.owner.clone(),
                pre_amount: 0,
            },
        );
    }
    // Pre balances win for mint/owner: a closed account has no post entry.
    for balance in &meta.pre_token_balances {
        table.insert(
            balance.account_index,
            TokenAccountInfo {
                mint: balance.mint.clone(),
                owner: balance.owner.clone(),
                pre_amount: raw_amount(balance),
            },
        );
    }
    table
}

fn raw_amount(balance: &TokenBalance) -> u64 {
    balance
        .ui_token_amount
        .as_ref()
        .and_then(|amount| amount.amount.parse::<u64>().ok())
        .unwrap_or(0)
}

/// SPL `Transfer` and `TransferChecked`, outer then inner, in execution order.
pub(super) fn decode_token_transfers(
    message: &SolMessage,
    meta: &TransactionStatusMeta,
    account_keys: &[String],
) -> Vec<TokenTransfer> {
    let table = token_account_table(meta);
    let mut inner_by_outer: HashMap<u32, Vec<(u32, &[u8], &[u8])>> = HashMap::new();
    for group in &meta.inner_instructions {
        let entry = inner_by_outer.entry(group.index).or_default();
        for ix in &group.instructions {
            entry.push((ix.program_id_index, ix.accounts.as_slice(), ix.data.as_slice()));
        }
    }

    let mut out = Vec::new();
    for (position, ix) in message.instructions.iter().enumerate() {
        let mut batch = vec![(
            ix.program_id_index,
            ix.accounts.as_slice(),
            ix.data.as_slice(),
        )];
        if let Some(inner) = inner_by_outer.get(&(position as u32)) {
            batch.extend(inner.iter().copied());
        }
        for (program_index, accounts, data) in batch {
            let is_token_program = account_keys
                .get(program_index as usize)
                .is_some_and(|id| id == SPL_TOKEN_PROGRAM_ID || id == TOKEN_2022_PROGRAM_ID);
            if !is_token_program {
                continue;
            }
            if let Some(transfer) = decode_transfer(accounts, data, &table) {
                out.push(transfer);
            }
        }
    }
    out
}

fn decode_transfer(
    accounts: &[u8],
    data: &[u8],
    table: &HashMap<u32, TokenAccountInfo>,
) -> Option<TokenTransfer> {
    let (&tag, rest) = data.split_first()?;
    let amount = u64::from_le_bytes(rest.get(..8)?.try_into().ok()?);
    let (source_index, destination_index) = match tag {
        TRANSFER_TAG => (*accounts.first()?, *accounts.get(1)?),
        TRANSFER_CHECKED_TAG => (*accounts.first()?, *accounts.get(2)?),
        _ => return None,
    };
    let source = table.get(&u32::from(source_index))?;
    let destination = table.get(&u32::from(destination_index))?;
    Some(TokenTransfer {
        mint: source.mint.clone(),
        from_owner: source.owner.clone(),
        to_owner: destination.owner.clone(),
        amount,
        source_pre_balance: source.pre_amount,
    })
}
