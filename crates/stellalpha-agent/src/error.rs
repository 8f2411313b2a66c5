use thiserror::Error;

/// Why a single Signal was dropped. The relayer logs `reason()` as a stable
/// field and moves on; none of these stop the loop.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("malformed signal: {0}")]
    MalformedSignal(String),
    #[error("no route available: {0}")]
    QuoteUnavailable(String),
    #[error("route rejected: {0}")]
    RouteRejected(String),
    #[error("{stage} timed out after {timeout_ms}ms")]
    Timeout { stage: &'static str, timeout_ms: u64 },
    #[error("ledger read failed: {0:#}")]
    Ledger(anyhow::Error),
    #[error("submission failed: {0:#}")]
    Submission(anyhow::Error),
    #[error("nothing to swap")]
    NothingToSwap,
    #[error("trader state {0} does not exist")]
    TraderStateMissing(String),
    #[error("trader state {0} is not accepting swaps")]
    TraderStatePaused(String),
}

impl RelayError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MalformedSignal(_) => "malformed_signal",
            Self::QuoteUnavailable(_) => "quote_unavailable",
            Self::RouteRejected(_) => "route_rejected",
            Self::Timeout { .. } => "timeout",
            Self::Ledger(_) => "ledger",
            Self::Submission(_) => "submission",
            Self::NothingToSwap => "nothing_to_swap",
            Self::TraderStateMissing(_) => "trader_state_missing",
            Self::TraderStatePaused(_) => "trader_state_paused",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_are_stable_snake_case() {
        assert_eq!(RelayError::NothingToSwap.reason(), "nothing_to_swap");
        assert_eq!(
            RelayError::Timeout {
                stage: "quote",
                timeout_ms: 5_000
            }
            .reason(),
            "timeout"
        );
        assert_eq!(
            RelayError::TraderStatePaused("x".into()).reason(),
            "trader_state_paused"
        );
    }

    #[test]
    fn timeout_message_names_the_stage() {
        let error = RelayError::Timeout {
            stage: "submit",
            timeout_ms: 20_000,
        };
        assert_eq!(error.to_string(), "submit timed out after 20000ms");
    }
}
