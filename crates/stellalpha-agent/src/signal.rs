use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// One observed swap by a star trader, addressed to one follower's queue.
///
/// Amounts are raw token units. `id` is the source transaction signature, so
/// a re-delivered stream event produces the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id: String,
    pub star_wallet: String,
    pub from_token_mint: String,
    pub to_token_mint: String,
    pub amount_in: u64,
    /// The star's observed output. Informational; the relayer submits the
    /// quote's own threshold.
    pub min_amount_out: u64,
    pub timestamp: DateTime<Utc>,
    pub source_tx_id: String,
    /// The star's balance of `from_token_mint` before the trade, 0 if unknown.
    #[serde(default)]
    pub star_input_pre_balance: u64,
    pub confidence: Confidence,
}

impl Signal {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
pub(crate) fn sample(id: &str, star: &str) -> Signal {
    Signal {
        id: id.to_string(),
        star_wallet: star.to_string(),
        from_token_mint: "So11111111111111111111111111111111111111112".to_string(),
        to_token_mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
        amount_in: 1_000_000_000,
        min_amount_out: 150_000_000,
        timestamp: DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_default(),
        source_tx_id: id.to_string(),
        star_input_pre_balance: 4_000_000_000,
        confidence: Confidence::High,
    }
}
