//! Classify a star's transaction as a swap, in raw integer units.
//!
//! Token legs are the primary evidence. Native balance change is consulted
//! only when the wallet shows transfers on one side alone, so priority tips
//! and rent refunds never override a real token-for-token swap.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use super::source::{RawTransaction, TokenTransfer};
use crate::signal::{Confidence, Signal};

pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const USDT_MINT: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";
pub const USD1_MINT: &str = "USD1ttGY1N17NEEHLmELoaybftRBUSErhqYiQzvEmuB";

/// Below this net native movement a one-sided transfer is not a trade.
pub const NATIVE_FALLBACK_MIN_LAMPORTS: i64 = 1_000_000;

const PRIORITY_MINTS: [&str; 4] = [WSOL_MINT, USDC_MINT, USDT_MINT, USD1_MINT];

fn is_priority(mint: &str) -> bool {
    PRIORITY_MINTS.contains(&mint)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedTrade {
    pub signature: String,
    pub wallet: String,
    pub input_mint: String,
    pub input_amount: u64,
    pub input_pre_balance: u64,
    pub output_mint: String,
    pub output_amount: u64,
    pub confidence: Confidence,
    pub ts_utc: DateTime<Utc>,
}

impl DetectedTrade {
    pub fn to_signal(&self) -> Signal {
        Signal {
            id: self.signature.clone(),
            star_wallet: self.wallet.clone(),
            from_token_mint: self.input_mint.clone(),
            to_token_mint: self.output_mint.clone(),
            amount_in: self.input_amount,
            min_amount_out: self.output_amount,
            timestamp: self.ts_utc,
            source_tx_id: self.signature.clone(),
            star_input_pre_balance: self.input_pre_balance,
            confidence: self.confidence,
        }
    }
}

pub fn detect_trade(tx: &RawTransaction, wallet: &str) -> Option<DetectedTrade> {
    let sent: Vec<&TokenTransfer> = tx
        .token_transfers
        .iter()
        .filter(|t| t.from_owner == wallet && t.to_owner != wallet)
        .collect();
    let received: Vec<&TokenTransfer> = tx
        .token_transfers
        .iter()
        .filter(|t| t.to_owner == wallet && t.from_owner != wallet)
        .collect();

    let native_net = tx
        .native_delta_lamports
        .saturating_add(i64::try_from(tx.fee_lamports).unwrap_or(i64::MAX));

    let (input_mint, input_amount, input_pre_balance, output_mint, output_amount, confidence) =
        if !sent.is_empty() && !received.is_empty() {
            let (input, output) = token_pair(&sent, &received)?;
            if input.mint == output.mint {
                return None;
            }
            let confidence = match (is_priority(&input.mint), is_priority(&output.mint)) {
                (true, true) => Confidence::Medium,
                (false, false) => Confidence::Low,
                _ => Confidence::High,
            };
            (
                input.mint.clone(),
                input.amount,
                input.source_pre_balance,
                output.mint.clone(),
                output.amount,
                confidence,
            )
        } else if !sent.is_empty() && native_net > NATIVE_FALLBACK_MIN_LAMPORTS {
            let largest = largest_leg(&sent)?;
            (
                largest.mint.clone(),
                largest.amount,
                largest.source_pre_balance,
                WSOL_MINT.to_string(),
                native_net.unsigned_abs(),
                Confidence::Medium,
            )
        } else if !received.is_empty() && native_net < -NATIVE_FALLBACK_MIN_LAMPORTS {
            let largest = largest_leg(&received)?;
            (
                WSOL_MINT.to_string(),
                native_net.unsigned_abs(),
                tx.native_pre_lamports,
                largest.mint.clone(),
                largest.amount,
                Confidence::Medium,
            )
        } else {
            return None;
        };

    if input_amount == 0 || output_amount == 0 || input_mint == output_mint {
        return None;
    }

    Some(DetectedTrade {
        signature: tx.signature.clone(),
        wallet: wallet.to_string(),
        input_mint,
        input_amount,
        input_pre_balance,
        output_mint,
        output_amount,
        confidence,
        ts_utc: tx.ts_utc,
    })
}

/// Mints seen on both sides are routing hops (A -> USD1 -> B shows USD1 in
/// and out); drop them unless that would leave a side empty.
fn token_pair<'a>(
    sent: &[&'a TokenTransfer],
    received: &[&'a TokenTransfer],
) -> Option<(&'a TokenTransfer, &'a TokenTransfer)> {
    let sent_mints: HashSet<&str> = sent.iter().map(|t| t.mint.as_str()).collect();
    let received_mints: HashSet<&str> = received.iter().map(|t| t.mint.as_str()).collect();
    let hops: HashSet<&str> = sent_mints.intersection(&received_mints).copied().collect();

    let without_hops = |legs: &[&'a TokenTransfer]| -> Vec<&'a TokenTransfer> {
        let kept: Vec<&'a TokenTransfer> = legs
            .iter()
            .copied()
            .filter(|t| !hops.contains(t.mint.as_str()))
            .collect();
        if kept.is_empty() {
            legs.to_vec()
        } else {
            kept
        }
    };

    let input = pick_leg(&without_hops(sent))?;
    let output = pick_leg(&without_hops(received))?;
    Some((input, output))
}

fn pick_leg<'a>(legs: &[&'a TokenTransfer]) -> Option<&'a TokenTransfer> {
    legs.iter()
        .copied()
        .find(|t| is_priority(&t.mint))
        .or_else(|| largest_leg(legs))
}

/// First of the largest on ties, matching transfer order.
fn largest_leg<'a>(legs: &[&'a TokenTransfer]) -> Option<&'a TokenTransfer> {
    legs.iter().copied().fold(None, |best, leg| match best {
        Some(current) if current.amount >= leg.amount => Some(current),
        _ => Some(leg),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAR: &str = "Star111111111111111111111111111111111111111";
    const POOL: &str = "Pool111111111111111111111111111111111111111";
    const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
    const MEME: &str = "Meme111111111111111111111111111111111111111";

    fn leg(mint: &str, from: &str, to: &str, amount: u64, pre: u64) -> TokenTransfer {
        TokenTransfer {
            mint: mint.to_string(),
            from_owner: from.to_string(),
            to_owner: to.to_string(),
            amount,
            source_pre_balance: pre,
        }
    }

    fn tx(transfers: Vec<TokenTransfer>, native_delta: i64) -> RawTransaction {
        RawTransaction {
            signature: "sig".to_string(),
            slot: 1,
            signer: STAR.to_string(),
            program_ids: vec![],
            token_transfers: transfers,
            native_delta_lamports: native_delta,
            native_pre_lamports: 10_000_000_000,
            fee_lamports: 5_000,
            ts_utc: Utc::now(),
        }
    }

    #[test]
    fn base_to_token_is_high_confidence() {
        let t = tx(
            vec![
                leg(USDC_MINT, STAR, POOL, 100_000_000, 250_000_000),
                leg(BONK, POOL, STAR, 9_000_000_000, 0),
            ],
            -5_000,
        );
        let trade = detect_trade(&t, STAR).unwrap();
        assert_eq!(trade.input_mint, USDC_MINT);
        assert_eq!(trade.input_amount, 100_000_000);
        assert_eq!(trade.input_pre_balance, 250_000_000);
        assert_eq!(trade.output_mint, BONK);
        assert_eq!(trade.output_amount, 9_000_000_000);
        assert_eq!(trade.confidence, Confidence::High);
    }

    #[test]
    fn routing_hop_is_excluded() {
        // MEME -> USD1 -> BONK: USD1 leaves and returns to the wallet.
        let t = tx(
            vec![
                leg(MEME, STAR, POOL, 5_000, 8_000),
                leg(USD1_MINT, POOL, STAR, 700, 0),
                leg(USD1_MINT, STAR, POOL, 700, 700),
                leg(BONK, POOL, STAR, 42_000, 0),
            ],
            -5_000,
        );
        let trade = detect_trade(&t, STAR).unwrap();
        assert_eq!(trade.input_mint, MEME);
        assert_eq!(trade.output_mint, BONK);
        assert_eq!(trade.confidence, Confidence::Low);
    }

    #[test]
    fn priority_mint_wins_over_larger_leg() {
        let t = tx(
            vec![
                leg(MEME, STAR, POOL, 9_999_999, 9_999_999),
                leg(WSOL_MINT, STAR, POOL, 10, 10),
                leg(BONK, POOL, STAR, 1_000, 0),
            ],
            -5_000,
        );
        let trade = detect_trade(&t, STAR).unwrap();
        assert_eq!(trade.input_mint, WSOL_MINT);
        assert_eq!(trade.input_amount, 10);
    }

    #[test]
    fn base_to_base_is_medium_confidence() {
        let t = tx(
            vec![
                leg(USDC_MINT, STAR, POOL, 150_000_000, 150_000_000),
                leg(WSOL_MINT, POOL, STAR, 1_000_000_000, 0),
            ],
            -5_000,
        );
        assert_eq!(detect_trade(&t, STAR).unwrap().confidence, Confidence::Medium);
    }

    #[test]
    fn tip_does_not_hijack_token_swap() {
        // Large native outflow (tip) alongside a bilateral token swap.
        let t = tx(
            vec![
                leg(BONK, STAR, POOL, 1_000, 1_000),
                leg(USDC_MINT, POOL, STAR, 2_000, 0),
            ],
            -50_000_000,
        );
        let trade = detect_trade(&t, STAR).unwrap();
        assert_eq!(trade.input_mint, BONK);
        assert_eq!(trade.output_mint, USDC_MINT);
    }

    #[test]
    fn token_sold_for_native_falls_back_to_wsol() {
        let t = tx(vec![leg(BONK, STAR, POOL, 77_000, 100_000)], 2_000_000 - 5_000);
        let trade = detect_trade(&t, STAR).unwrap();
        assert_eq!(trade.input_mint, BONK);
        assert_eq!(trade.input_pre_balance, 100_000);
        assert_eq!(trade.output_mint, WSOL_MINT);
        // Net of the fee: the fee is not proceeds of the sale.
        assert_eq!(trade.output_amount, 2_000_000);
        assert_eq!(trade.confidence, Confidence::Medium);
    }

    #[test]
    fn token_bought_with_native_falls_back_to_wsol() {
        let t = tx(vec![leg(BONK, POOL, STAR, 77_000, 0)], -3_005_000);
        let trade = detect_trade(&t, STAR).unwrap();
        assert_eq!(trade.input_mint, WSOL_MINT);
        assert_eq!(trade.input_amount, 3_000_000);
        assert_eq!(trade.input_pre_balance, 10_000_000_000);
        assert_eq!(trade.output_mint, BONK);
    }

    #[test]
    fn small_native_movement_is_not_a_trade() {
        let t = tx(vec![leg(BONK, POOL, STAR, 77_000, 0)], -1_000_000);
        assert!(detect_trade(&t, STAR).is_none());
    }

    #[test]
    fn same_mint_both_sides_is_not_a_trade() {
        let t = tx(
            vec![
                leg(USDC_MINT, STAR, POOL, 10, 10),
                leg(USDC_MINT, POOL, STAR, 12, 0),
            ],
            -5_000,
        );
        assert!(detect_trade(&t, STAR).is_none());
    }

    #[test]
    fn zero_amount_is_not_a_trade() {
        let t = tx(
            vec![leg(BONK, STAR, POOL, 0, 0), leg(USDC_MINT, POOL, STAR, 5, 0)],
            -5_000,
        );
        assert!(detect_trade(&t, STAR).is_none());
    }

    #[test]
    fn unrelated_wallet_sees_nothing() {
        let t = tx(
            vec![
                leg(USDC_MINT, STAR, POOL, 10, 10),
                leg(BONK, POOL, STAR, 12, 0),
            ],
            -5_000,
        );
        assert!(detect_trade(&t, "Someone1111111111111111111111111111111111111").is_none());
    }

    #[test]
    fn signal_carries_trade_fields() {
        let t = tx(
            vec![
                leg(USDC_MINT, STAR, POOL, 100, 400),
                leg(BONK, POOL, STAR, 900, 0),
            ],
            -5_000,
        );
        let signal = detect_trade(&t, STAR).unwrap().to_signal();
        assert_eq!(signal.id, "sig");
        assert_eq!(signal.source_tx_id, "sig");
        assert_eq!(signal.star_wallet, STAR);
        assert_eq!(signal.amount_in, 100);
        assert_eq!(signal.min_amount_out, 900);
        assert_eq!(signal.star_input_pre_balance, 400);
    }
}
