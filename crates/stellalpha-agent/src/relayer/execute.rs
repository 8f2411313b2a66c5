//! One Signal, end to end: size it against the follower's allocation, route
//! it, and submit `execute_trader_swap` for the follower's TraderState.

use anchor_lang::{InstructionData, ToAccountMetas};
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::str::FromStr;
use std::time::Duration;
use stellalpha_vault::math::split_fee;
use stellalpha_vault::pda::{
    associated_token_address, global_config_address, trader_state_address, vault_address,
};
use stellalpha_vault::state::TraderLifecycle;
use tokio::time;

use super::ledger::Ledger;
use super::route::{validate_route, QuoteRequest, RouteProvider, ValidatedRoute};
use super::sizing::SizingPolicy;
use crate::error::RelayError;
use crate::signal::Signal;

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub aggregator: Pubkey,
    pub sizing: SizingPolicy,
    pub slippage_bps: u16,
    pub quote_timeout: Duration,
    pub submit_timeout: Duration,
    /// Read pause/initialized flags before quoting. Saves a doomed
    /// submission; the program enforces the same guards on its own.
    pub precheck_lifecycle: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relayed {
    pub signature: Signature,
    pub trader_state: Pubkey,
    pub amount_in: u64,
    pub min_amount_out: u64,
}

/// Addresses one swap touches, all derived from the follower, the star and
/// the two mints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapAddresses {
    pub owner: Pubkey,
    pub vault: Pubkey,
    pub trader_state: Pubkey,
    pub global_config: Pubkey,
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub input_token_account: Pubkey,
    pub output_token_account: Pubkey,
}

impl SwapAddresses {
    pub fn derive(owner: Pubkey, star: Pubkey, input_mint: Pubkey, output_mint: Pubkey) -> Self {
        let trader_state = trader_state_address(&owner, &star).0;
        Self {
            owner,
            vault: vault_address(&owner).0,
            trader_state,
            global_config: global_config_address().0,
            input_mint,
            output_mint,
            input_token_account: associated_token_address(&trader_state, &input_mint),
            output_token_account: associated_token_address(&trader_state, &output_mint),
        }
    }
}

pub fn build_execute_swap(
    authority: Pubkey,
    addresses: &SwapAddresses,
    admin: Pubkey,
    amount_in: u64,
    route: &ValidatedRoute,
) -> Instruction {
    let mut accounts = stellalpha_vault::accounts::ExecuteTraderSwap {
        authority,
        vault: addresses.vault,
        trader_state: addresses.trader_state,
        input_token_account: addresses.input_token_account,
        output_token_account: addresses.output_token_account,
        platform_fee_account: associated_token_address(&admin, &addresses.input_mint),
        global_config: addresses.global_config,
        swap_program: route.program_id,
        token_program: anchor_spl::token::ID,
    }
    .to_account_metas(None);
    accounts.extend(route.accounts.iter().cloned());

    Instruction {
        program_id: stellalpha_vault::ID,
        accounts,
        data: stellalpha_vault::instruction::ExecuteTraderSwap {
            amount_in,
            min_amount_out: route.min_amount_out,
            route_data: route.data.clone(),
        }
        .data(),
    }
}

/// Provisions the TraderState's token account for a mint it has never held.
pub fn build_create_trader_ata(
    authority: Pubkey,
    addresses: &SwapAddresses,
    mint: Pubkey,
) -> Instruction {
    Instruction {
        program_id: stellalpha_vault::ID,
        accounts: stellalpha_vault::accounts::CreateTraderAta {
            signer: authority,
            vault: addresses.vault,
            trader_state: addresses.trader_state,
            mint,
            trader_token_account: associated_token_address(&addresses.trader_state, &mint),
            token_program: anchor_spl::token::ID,
            associated_token_program: anchor_spl::associated_token::ID,
            system_program: anchor_lang::system_program::ID,
        }
        .to_account_metas(None),
        data: stellalpha_vault::instruction::CreateTraderAta.data(),
    }
}

fn signal_key(raw: &str, field: &str) -> Result<Pubkey, RelayError> {
    Pubkey::from_str(raw.trim())
        .map_err(|_| RelayError::MalformedSignal(format!("{field} is not an address: {raw:?}")))
}

fn ledger_error(error: anyhow::Error) -> RelayError {
    RelayError::Ledger(error)
}

pub async fn relay_signal(
    ledger: &dyn Ledger,
    routes: &dyn RouteProvider,
    settings: &RelaySettings,
    follower: &str,
    signal: &Signal,
) -> Result<Relayed, RelayError> {
    let owner = signal_key(follower, "follower")?;
    let star = signal_key(&signal.star_wallet, "starWallet")?;
    let input_mint = signal_key(&signal.from_token_mint, "fromTokenMint")?;
    let output_mint = signal_key(&signal.to_token_mint, "toTokenMint")?;
    if input_mint == output_mint {
        return Err(RelayError::MalformedSignal(
            "input and output mints are identical".to_string(),
        ));
    }
    let addresses = SwapAddresses::derive(owner, star, input_mint, output_mint);
    let authority = ledger.authority();

    let trader_state = ledger
        .trader_state(&addresses.trader_state)
        .await
        .map_err(ledger_error)?
        .ok_or_else(|| RelayError::TraderStateMissing(addresses.trader_state.to_string()))?;

    if settings.precheck_lifecycle {
        let vault_paused = ledger
            .vault(&addresses.vault)
            .await
            .map_err(ledger_error)?
            .is_some_and(|vault| vault.is_paused);
        if vault_paused || trader_state.lifecycle() != TraderLifecycle::Active {
            return Err(RelayError::TraderStatePaused(
                addresses.trader_state.to_string(),
            ));
        }
    }

    let follower_balance = ledger
        .token_balance(&addresses.input_token_account)
        .await
        .map_err(ledger_error)?
        .unwrap_or(0);
    let amount_in = settings.sizing.size(
        signal.amount_in,
        signal.star_input_pre_balance,
        follower_balance,
    )?;

    let global_config = ledger
        .global_config(&addresses.global_config)
        .await
        .map_err(ledger_error)?;
    let split = split_fee(amount_in, global_config.platform_fee_bps)
        .map_err(|error| RelayError::Ledger(anyhow::anyhow!("fee split failed: {error}")))?;
    if split.swap_amount == 0 {
        return Err(RelayError::NothingToSwap);
    }

    let request = QuoteRequest {
        input_mint,
        output_mint,
        amount: split.swap_amount,
        slippage_bps: settings.slippage_bps,
        user: addresses.trader_state,
    };
    let plan = time::timeout(settings.quote_timeout, routes.route(&request))
        .await
        .map_err(|_| RelayError::Timeout {
            stage: "quote",
            timeout_ms: settings.quote_timeout.as_millis() as u64,
        })??;
    let route = validate_route(&plan, &settings.aggregator, &addresses.trader_state, &authority)?;

    let mut instructions = route.compute_budget.clone();
    let output_account_exists = ledger
        .token_balance(&addresses.output_token_account)
        .await
        .map_err(ledger_error)?
        .is_some();
    if !output_account_exists {
        instructions.push(build_create_trader_ata(authority, &addresses, output_mint));
    }
    instructions.push(build_execute_swap(
        authority,
        &addresses,
        global_config.admin,
        amount_in,
        &route,
    ));

    let signature = time::timeout(
        settings.submit_timeout,
        ledger.submit(instructions, &route.lookup_tables),
    )
    .await
    .map_err(|_| RelayError::Timeout {
        stage: "submit",
        timeout_ms: settings.submit_timeout.as_millis() as u64,
    })?
    .map_err(RelayError::Submission)?;

    Ok(Relayed {
        signature,
        trader_state: addresses.trader_state,
        amount_in,
        min_amount_out: route.min_amount_out,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::relayer::route::tests::plan;
    use crate::relayer::route::RoutePlan;
    use crate::signal::sample;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use stellalpha_vault::state::{GlobalConfig, TraderState, UserVault};

    pub(crate) struct FakeLedger {
        pub authority: Pubkey,
        pub admin: Pubkey,
        pub trader_states: Mutex<HashMap<Pubkey, TraderState>>,
        pub balances: Mutex<HashMap<Pubkey, u64>>,
        pub submitted: Mutex<Vec<Vec<Instruction>>>,
        pub submit_delay: Duration,
    }

    impl FakeLedger {
        pub(crate) fn new() -> Self {
            Self {
                authority: Pubkey::new_unique(),
                admin: Pubkey::new_unique(),
                trader_states: Mutex::new(HashMap::new()),
                balances: Mutex::new(HashMap::new()),
                submitted: Mutex::new(Vec::new()),
                submit_delay: Duration::ZERO,
            }
        }

        pub(crate) fn with_trader_state(&self, addresses: &SwapAddresses, active: bool) {
            let state = TraderState {
                owner: addresses.owner,
                trader: Pubkey::default(),
                vault: addresses.vault,
                bump: 255,
                current_value: 0,
                high_water_mark: 0,
                input_mint: addresses.input_mint,
                output_mint: addresses.input_mint,
                is_paused: !active,
                is_settled: false,
                is_initialized: true,
            };
            self.trader_states
                .lock()
                .unwrap()
                .insert(addresses.trader_state, state);
        }

        pub(crate) fn with_balance(&self, account: Pubkey, amount: u64) {
            self.balances.lock().unwrap().insert(account, amount);
        }

        pub(crate) fn submissions(&self) -> Vec<Vec<Instruction>> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Ledger for FakeLedger {
        fn authority(&self) -> Pubkey {
            self.authority
        }

        async fn trader_state(&self, address: &Pubkey) -> Result<Option<TraderState>> {
            Ok(self.trader_states.lock().unwrap().get(address).cloned())
        }

        async fn vault(&self, _address: &Pubkey) -> Result<Option<UserVault>> {
            Ok(None)
        }

        async fn global_config(&self, _address: &Pubkey) -> Result<GlobalConfig> {
            Ok(GlobalConfig {
                admin: self.admin,
                platform_fee_bps: 10,
                performance_fee_bps: 2_000,
            })
        }

        async fn token_balance(&self, token_account: &Pubkey) -> Result<Option<u64>> {
            Ok(self.balances.lock().unwrap().get(token_account).copied())
        }

        async fn submit(
            &self,
            instructions: Vec<Instruction>,
            _lookup_tables: &[Pubkey],
        ) -> Result<Signature> {
            if !self.submit_delay.is_zero() {
                time::sleep(self.submit_delay).await;
            }
            self.submitted.lock().unwrap().push(instructions);
            Ok(Signature::default())
        }
    }

    pub(crate) struct FakeRoutes {
        pub aggregator: Pubkey,
        pub delay: Duration,
        pub requests: Mutex<Vec<QuoteRequest>>,
        pub unavailable: bool,
    }

    impl FakeRoutes {
        pub(crate) fn new(aggregator: Pubkey) -> Self {
            Self {
                aggregator,
                delay: Duration::ZERO,
                requests: Mutex::new(Vec::new()),
                unavailable: false,
            }
        }
    }

    #[async_trait]
    impl RouteProvider for FakeRoutes {
        async fn route(&self, request: &QuoteRequest) -> Result<RoutePlan, RelayError> {
            if !self.delay.is_zero() {
                time::sleep(self.delay).await;
            }
            self.requests.lock().unwrap().push(request.clone());
            if self.unavailable {
                return Err(RelayError::QuoteUnavailable("no routes".to_string()));
            }
            Ok(plan(&self.aggregator, &request.user))
        }
    }

    pub(crate) fn settings(aggregator: Pubkey) -> RelaySettings {
        RelaySettings {
            aggregator,
            sizing: SizingPolicy::Proportional,
            slippage_bps: 50,
            quote_timeout: Duration::from_millis(200),
            submit_timeout: Duration::from_millis(200),
            precheck_lifecycle: true,
        }
    }

    pub(crate) struct Scenario {
        pub ledger: FakeLedger,
        pub routes: FakeRoutes,
        pub settings: RelaySettings,
        pub follower: String,
        pub signal: Signal,
        pub addresses: SwapAddresses,
    }

    /// Active TraderState holding 2 SOL, star spent 1 of 4 SOL.
    pub(crate) fn scenario() -> Scenario {
        let aggregator = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let star = Pubkey::new_unique();
        let signal = sample("sig-1", &star.to_string());
        let addresses = SwapAddresses::derive(
            owner,
            star,
            Pubkey::from_str(&signal.from_token_mint).unwrap(),
            Pubkey::from_str(&signal.to_token_mint).unwrap(),
        );
        let ledger = FakeLedger::new();
        ledger.with_trader_state(&addresses, true);
        ledger.with_balance(addresses.input_token_account, 2_000_000_000);
        ledger.with_balance(addresses.output_token_account, 0);
        Scenario {
            ledger,
            routes: FakeRoutes::new(aggregator),
            settings: settings(aggregator),
            follower: owner.to_string(),
            signal,
            addresses,
        }
    }

    async fn run(s: &Scenario) -> Result<Relayed, RelayError> {
        relay_signal(&s.ledger, &s.routes, &s.settings, &s.follower, &s.signal).await
    }

    #[tokio::test]
    async fn relays_proportionally_sized_swap() {
        let s = scenario();
        let relayed = run(&s).await.unwrap();
        assert_eq!(relayed.amount_in, 500_000_000);
        assert_eq!(relayed.min_amount_out, 400_000);
        assert_eq!(relayed.trader_state, s.addresses.trader_state);

        let requests = s.routes.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        // 10 bps fee comes off before routing.
        assert_eq!(requests[0].amount, 499_500_000);
        assert_eq!(requests[0].user, s.addresses.trader_state);

        let submissions = s.ledger.submissions();
        assert_eq!(submissions.len(), 1);
        let instructions = &submissions[0];
        // compute budget, then the swap; output account already exists.
        assert_eq!(instructions.len(), 2);
        let swap = &instructions[1];
        assert_eq!(swap.program_id, stellalpha_vault::ID);
        let expected_data = stellalpha_vault::instruction::ExecuteTraderSwap {
            amount_in: 500_000_000,
            min_amount_out: 400_000,
            route_data: vec![1, 2, 3],
        }
        .data();
        assert_eq!(swap.data, expected_data);
        assert_eq!(swap.accounts[0].pubkey, s.ledger.authority);
        assert!(swap.accounts[0].is_signer);
        assert_eq!(swap.accounts[2].pubkey, s.addresses.trader_state);
        assert_eq!(swap.accounts[3].pubkey, s.addresses.input_token_account);
        assert_eq!(swap.accounts[4].pubkey, s.addresses.output_token_account);
        assert_eq!(
            swap.accounts[5].pubkey,
            associated_token_address(&s.ledger.admin, &s.addresses.input_mint)
        );
        assert_eq!(swap.accounts[7].pubkey, s.settings.aggregator);
        // Nine named accounts, then the two route accounts.
        assert_eq!(swap.accounts.len(), 11);
        assert!(swap.accounts.iter().filter(|meta| meta.is_signer).count() == 1);
    }

    #[tokio::test]
    async fn missing_output_account_is_created_first() {
        let s = scenario();
        s.ledger
            .balances
            .lock()
            .unwrap()
            .remove(&s.addresses.output_token_account);
        run(&s).await.unwrap();
        let instructions = &s.ledger.submissions()[0];
        assert_eq!(instructions.len(), 3);
        assert_eq!(
            instructions[1].data,
            stellalpha_vault::instruction::CreateTraderAta.data()
        );
        assert_eq!(
            instructions[1].accounts[4].pubkey,
            s.addresses.output_token_account
        );
    }

    #[tokio::test]
    async fn missing_trader_state_is_skipped_before_quoting() {
        let s = scenario();
        s.ledger.trader_states.lock().unwrap().clear();
        let error = run(&s).await.unwrap_err();
        assert_eq!(error.reason(), "trader_state_missing");
        assert!(s.routes.requests.lock().unwrap().is_empty());
        assert!(s.ledger.submissions().is_empty());
    }

    #[tokio::test]
    async fn paused_trader_state_fails_precheck() {
        let mut s = scenario();
        s.ledger.with_trader_state(&s.addresses, false);
        assert_eq!(run(&s).await.unwrap_err().reason(), "trader_state_paused");
        assert!(s.ledger.submissions().is_empty());

        // Without the precheck the submission goes out and the program decides.
        s.settings.precheck_lifecycle = false;
        run(&s).await.unwrap();
        assert_eq!(s.ledger.submissions().len(), 1);
    }

    #[tokio::test]
    async fn empty_allocation_is_nothing_to_swap() {
        let s = scenario();
        s.ledger.with_balance(s.addresses.input_token_account, 0);
        assert_eq!(run(&s).await.unwrap_err().reason(), "nothing_to_swap");
        assert!(s.routes.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unavailable_quote_is_reported() {
        let mut s = scenario();
        s.routes.unavailable = true;
        assert_eq!(run(&s).await.unwrap_err().reason(), "quote_unavailable");
        assert!(s.ledger.submissions().is_empty());
    }

    #[tokio::test]
    async fn slow_quote_times_out() {
        let mut s = scenario();
        s.routes.delay = Duration::from_secs(5);
        s.settings.quote_timeout = Duration::from_millis(20);
        match run(&s).await.unwrap_err() {
            RelayError::Timeout { stage, timeout_ms } => {
                assert_eq!(stage, "quote");
                assert_eq!(timeout_ms, 20);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_submission_times_out() {
        let mut s = scenario();
        s.ledger.submit_delay = Duration::from_secs(5);
        s.settings.submit_timeout = Duration::from_millis(20);
        match run(&s).await.unwrap_err() {
            RelayError::Timeout { stage, .. } => assert_eq!(stage, "submit"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_follower_is_rejected() {
        let mut s = scenario();
        s.follower = "not-a-wallet".to_string();
        assert_eq!(run(&s).await.unwrap_err().reason(), "malformed_signal");
    }
}
