//! Swap routes from an external provider, and the checks they pass before
//! any of their accounts reach a signed transaction.

use async_trait::async_trait;
use base64::Engine;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::error::RelayError;

/// Ledger-wide cap on accounts in one transaction.
pub const MAX_ROUTE_ACCOUNTS: usize = 64;

pub const COMPUTE_BUDGET_PROGRAM_ID: &str = "ComputeBudget111111111111111111111111111111";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    /// Post-fee amount the swap venue will actually receive.
    pub amount: u64,
    pub slippage_bps: u16,
    /// Account that owns the route's token accounts and signs the swap.
    pub user: Pubkey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteAccount {
    pub pubkey: String,
    pub is_signer: bool,
    pub is_writable: bool,
}

/// One instruction exactly as the provider returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInstruction {
    pub program_id: String,
    pub accounts: Vec<RouteAccount>,
    /// Base64.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlan {
    pub in_amount: u64,
    pub out_amount: u64,
    /// Worst-case output after slippage.
    pub min_amount_out: u64,
    pub swap: RouteInstruction,
    pub compute_budget: Vec<RouteInstruction>,
    pub lookup_tables: Vec<String>,
}

#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn route(&self, request: &QuoteRequest) -> Result<RoutePlan, RelayError>;
}

/// A route whose accounts are typed and checked; `accounts` are ready to be
/// appended as remaining accounts of the vault's swap instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRoute {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
    pub min_amount_out: u64,
    pub compute_budget: Vec<Instruction>,
    pub lookup_tables: Vec<Pubkey>,
}

fn parse_key(raw: &str, what: &str) -> Result<Pubkey, RelayError> {
    Pubkey::from_str(raw.trim())
        .map_err(|_| RelayError::RouteRejected(format!("{what} is not a valid address: {raw:?}")))
}

fn decode_data(raw: &str) -> Result<Vec<u8>, RelayError> {
    base64::engine::general_purpose::STANDARD
        .decode(raw.trim())
        .map_err(|error| RelayError::RouteRejected(format!("instruction data is not base64: {error}")))
}

/// Route accounts are untrusted. The only signer a route may ask for is the
/// TraderState, which the vault program signs for during CPI, so it is
/// passed unsigned at the outer level.
pub fn validate_route(
    plan: &RoutePlan,
    aggregator: &Pubkey,
    trader_state: &Pubkey,
    authority: &Pubkey,
) -> Result<ValidatedRoute, RelayError> {
    let program_id = parse_key(&plan.swap.program_id, "swap program")?;
    if program_id != *aggregator {
        return Err(RelayError::RouteRejected(format!(
            "swap program {program_id} is not the aggregator {aggregator}"
        )));
    }
    if plan.swap.accounts.len() > MAX_ROUTE_ACCOUNTS {
        return Err(RelayError::RouteRejected(format!(
            "route needs {} accounts, limit is {MAX_ROUTE_ACCOUNTS}",
            plan.swap.accounts.len()
        )));
    }

    let mut accounts = Vec::with_capacity(plan.swap.accounts.len());
    for account in &plan.swap.accounts {
        let pubkey = parse_key(&account.pubkey, "route account")?;
        if pubkey == *authority && account.is_writable && account.is_signer {
            return Err(RelayError::RouteRejected(
                "route asks the relayer authority to sign as a writable account".to_string(),
            ));
        }
        if account.is_signer && pubkey != *trader_state {
            return Err(RelayError::RouteRejected(format!(
                "route requires unexpected signer {pubkey}"
            )));
        }
        accounts.push(if account.is_writable {
            AccountMeta::new(pubkey, false)
        } else {
            AccountMeta::new_readonly(pubkey, false)
        });
    }

    let data = decode_data(&plan.swap.data)?;
    if data.is_empty() {
        return Err(RelayError::RouteRejected("swap instruction data is empty".to_string()));
    }
    if plan.min_amount_out == 0 {
        return Err(RelayError::RouteRejected(
            "route carries no minimum output".to_string(),
        ));
    }

    let compute_budget_program = parse_key(COMPUTE_BUDGET_PROGRAM_ID, "compute budget program")?;
    let mut compute_budget = Vec::with_capacity(plan.compute_budget.len());
    for ix in &plan.compute_budget {
        let program_id = parse_key(&ix.program_id, "compute budget program")?;
        if program_id != compute_budget_program || !ix.accounts.is_empty() {
            return Err(RelayError::RouteRejected(format!(
                "unexpected setup instruction for program {program_id}"
            )));
        }
        compute_budget.push(Instruction {
            program_id,
            accounts: Vec::new(),
            data: decode_data(&ix.data)?,
        });
    }

    let lookup_tables = plan
        .lookup_tables
        .iter()
        .map(|raw| parse_key(raw, "lookup table"))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ValidatedRoute {
        program_id,
        accounts,
        data,
        min_amount_out: plan.min_amount_out,
        compute_budget,
        lookup_tables,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn account(key: &Pubkey, is_signer: bool, is_writable: bool) -> RouteAccount {
        RouteAccount {
            pubkey: key.to_string(),
            is_signer,
            is_writable,
        }
    }

    pub(crate) fn plan(aggregator: &Pubkey, trader_state: &Pubkey) -> RoutePlan {
        let pool = Pubkey::new_unique();
        RoutePlan {
            in_amount: 499_500,
            out_amount: 420_000,
            min_amount_out: 400_000,
            swap: RouteInstruction {
                program_id: aggregator.to_string(),
                accounts: vec![
                    account(trader_state, true, false),
                    account(&pool, false, true),
                ],
                data: base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3]),
            },
            compute_budget: vec![RouteInstruction {
                program_id: COMPUTE_BUDGET_PROGRAM_ID.to_string(),
                accounts: Vec::new(),
                data: base64::engine::general_purpose::STANDARD.encode([2u8, 0, 0, 0, 0]),
            }],
            lookup_tables: vec![Pubkey::new_unique().to_string()],
        }
    }

    fn rejected(result: Result<ValidatedRoute, RelayError>) -> String {
        match result {
            Err(RelayError::RouteRejected(why)) => why,
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn accepts_well_formed_route_and_unsigns_trader_state() {
        let (aggregator, trader_state, authority) =
            (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let route = validate_route(&plan(&aggregator, &trader_state), &aggregator, &trader_state, &authority)
            .unwrap();
        assert_eq!(route.data, vec![1, 2, 3]);
        assert_eq!(route.min_amount_out, 400_000);
        assert_eq!(route.accounts.len(), 2);
        assert_eq!(route.accounts[0].pubkey, trader_state);
        assert!(!route.accounts[0].is_signer);
        assert!(!route.accounts[0].is_writable);
        assert!(route.accounts[1].is_writable);
        assert_eq!(route.compute_budget.len(), 1);
        assert_eq!(route.lookup_tables.len(), 1);
    }

    #[test]
    fn rejects_foreign_program() {
        let (aggregator, trader_state, authority) =
            (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let other = Pubkey::new_unique();
        let why = rejected(validate_route(&plan(&other, &trader_state), &aggregator, &trader_state, &authority));
        assert!(why.contains("not the aggregator"));
    }

    #[test]
    fn rejects_unexpected_signer() {
        let (aggregator, trader_state, authority) =
            (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let mut plan = plan(&aggregator, &trader_state);
        plan.swap.accounts.push(account(&Pubkey::new_unique(), true, false));
        let why = rejected(validate_route(&plan, &aggregator, &trader_state, &authority));
        assert!(why.contains("unexpected signer"));
    }

    #[test]
    fn rejects_authority_as_writable_signer() {
        let (aggregator, trader_state, authority) =
            (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let mut plan = plan(&aggregator, &trader_state);
        plan.swap.accounts.push(account(&authority, true, true));
        let why = rejected(validate_route(&plan, &aggregator, &trader_state, &authority));
        assert!(why.contains("authority"));
    }

    #[test]
    fn rejects_unparsable_key_and_bad_data() {
        let (aggregator, trader_state, authority) =
            (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());

        let mut bad_key = plan(&aggregator, &trader_state);
        bad_key.swap.accounts[1].pubkey = "not-a-key".to_string();
        assert!(rejected(validate_route(&bad_key, &aggregator, &trader_state, &authority))
            .contains("not a valid address"));

        let mut bad_data = plan(&aggregator, &trader_state);
        bad_data.swap.data = "%%%".to_string();
        assert!(rejected(validate_route(&bad_data, &aggregator, &trader_state, &authority))
            .contains("base64"));

        let mut empty = plan(&aggregator, &trader_state);
        empty.swap.data = String::new();
        assert!(rejected(validate_route(&empty, &aggregator, &trader_state, &authority))
            .contains("empty"));
    }

    #[test]
    fn rejects_oversized_account_list() {
        let (aggregator, trader_state, authority) =
            (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let mut plan = plan(&aggregator, &trader_state);
        plan.swap.accounts = (0..=MAX_ROUTE_ACCOUNTS)
            .map(|_| account(&Pubkey::new_unique(), false, true))
            .collect();
        assert!(rejected(validate_route(&plan, &aggregator, &trader_state, &authority))
            .contains("limit"));
    }

    #[test]
    fn rejects_setup_instruction_outside_compute_budget() {
        let (aggregator, trader_state, authority) =
            (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let mut plan = plan(&aggregator, &trader_state);
        plan.compute_budget[0].program_id = Pubkey::new_unique().to_string();
        assert!(rejected(validate_route(&plan, &aggregator, &trader_state, &authority))
            .contains("setup instruction"));
    }
}
