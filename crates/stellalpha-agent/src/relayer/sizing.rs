use crate::error::RelayError;

/// How much of a follower's allocation mirrors one star trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizingPolicy {
    /// Spend the same fraction of the follower's input balance as the star
    /// spent of theirs.
    #[default]
    Proportional,
    /// Copy the star's raw amount, capped by what the follower holds.
    Verbatim,
}

impl SizingPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "proportional" => Some(Self::Proportional),
            "verbatim" => Some(Self::Verbatim),
            _ => None,
        }
    }

    pub fn size(
        self,
        star_amount_in: u64,
        star_pre_balance: u64,
        follower_balance: u64,
    ) -> Result<u64, RelayError> {
        let amount = match self {
            Self::Proportional if star_pre_balance > 0 => {
                let scaled = u128::from(star_amount_in) * u128::from(follower_balance)
                    / u128::from(star_pre_balance);
                u64::try_from(scaled)
                    .unwrap_or(u64::MAX)
                    .min(follower_balance)
            }
            // Unknown star equity: nothing to scale against.
            Self::Proportional | Self::Verbatim => star_amount_in.min(follower_balance),
        };
        if amount == 0 {
            return Err(RelayError::NothingToSwap);
        }
        Ok(amount)
    }
}
