use anyhow::{anyhow, Result};
use serde::Deserialize;
use solana_sdk::commitment_config::CommitmentLevel;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::relayer::SizingPolicy;

const JUPITER_V6_PROGRAM_ID: &str = "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    pub system: SystemConfig,
    pub storage: StorageConfig,
    pub watcher: WatcherConfig,
    pub relayer: RelayerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub env: String,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            env: "dev".to_string(),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub sqlite_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "state/agent.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub grpc_url: String,
    /// Empty means the endpoint takes no x-token.
    pub x_token: String,
    pub aggregator_program_id: String,
    pub commitment: String,
    pub connect_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub fanout_queue_capacity: usize,
    pub follow_refresh_seconds: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            grpc_url: "REPLACE_ME".to_string(),
            x_token: String::new(),
            aggregator_program_id: JUPITER_V6_PROGRAM_ID.to_string(),
            commitment: "confirmed".to_string(),
            connect_timeout_ms: 5_000,
            idle_timeout_ms: 30_000,
            reconnect_initial_ms: 500,
            reconnect_max_ms: 8_000,
            fanout_queue_capacity: 1_024,
            follow_refresh_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayerConfig {
    pub rpc_url: String,
    pub authority_keypair_path: String,
    pub jupiter_api_url: String,
    /// Sent as `x-api-key` when non-empty.
    pub jupiter_api_key: String,
    pub poll_interval_ms: u64,
    pub worker_count: usize,
    pub quote_timeout_ms: u64,
    pub submit_timeout_ms: u64,
    pub slippage_bps: u16,
    pub max_accounts: u8,
    pub sizing: String,
    /// Submit without reading the pause/initialized flags first. The program
    /// enforces them regardless; the precheck only saves a doomed submission.
    pub skip_paused_precheck: bool,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "REPLACE_ME".to_string(),
            authority_keypair_path: "REPLACE_ME".to_string(),
            jupiter_api_url: "https://lite-api.jup.ag/swap/v1".to_string(),
            jupiter_api_key: String::new(),
            poll_interval_ms: 1_000,
            worker_count: 4,
            quote_timeout_ms: 5_000,
            submit_timeout_ms: 20_000,
            slippage_bps: 50,
            max_accounts: 40,
            sizing: "proportional".to_string(),
            skip_paused_precheck: false,
        }
    }
}

/// Which half of the pipeline a process runs; validation only demands the
/// endpoints that half actually dials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Watcher,
    Relayer,
    All,
}

impl RunMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "watcher" => Some(Self::Watcher),
            "relayer" => Some(Self::Relayer),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    pub fn runs_watcher(self) -> bool {
        matches!(self, Self::Watcher | Self::All)
    }

    pub fn runs_relayer(self) -> bool {
        matches!(self, Self::Relayer | Self::All)
    }
}

impl WatcherConfig {
    pub fn commitment_level(&self) -> Result<CommitmentLevel> {
        match self.commitment.trim().to_ascii_lowercase().as_str() {
            "processed" => Ok(CommitmentLevel::Processed),
            "confirmed" => Ok(CommitmentLevel::Confirmed),
            "finalized" => Ok(CommitmentLevel::Finalized),
            other => Err(anyhow!(
                "watcher.commitment must be processed|confirmed|finalized, got {other:?}"
            )),
        }
    }

    pub fn aggregator_program(&self) -> Result<Pubkey> {
        Pubkey::from_str(self.aggregator_program_id.trim())
            .map_err(|error| anyhow!("watcher.aggregator_program_id is not a pubkey: {error}"))
    }
}

impl RelayerConfig {
    pub fn sizing_policy(&self) -> Result<SizingPolicy> {
        SizingPolicy::parse(&self.sizing).ok_or_else(|| {
            anyhow!(
                "relayer.sizing must be proportional|verbatim, got {:?}",
                self.sizing
            )
        })
    }
}

impl AgentConfig {
    pub fn validate(&self, mode: RunMode) -> Result<()> {
        self.watcher.commitment_level()?;
        self.watcher.aggregator_program()?;
        self.relayer.sizing_policy()?;

        if mode.runs_watcher() {
            require_http_endpoint("watcher.grpc_url", &self.watcher.grpc_url)?;
            if self.watcher.x_token.contains("REPLACE_ME") {
                return Err(anyhow!("watcher.x_token still holds a placeholder"));
            }
            if self.watcher.fanout_queue_capacity == 0 {
                return Err(anyhow!("watcher.fanout_queue_capacity must be >= 1"));
            }
        }

        if mode.runs_relayer() {
            require_http_endpoint("relayer.rpc_url", &self.relayer.rpc_url)?;
            require_http_endpoint("relayer.jupiter_api_url", &self.relayer.jupiter_api_url)?;
            require_value(
                "relayer.authority_keypair_path",
                &self.relayer.authority_keypair_path,
            )?;
        }

        if self.relayer.slippage_bps > 10_000 {
            return Err(anyhow!(
                "relayer.slippage_bps must be <= 10000, got {}",
                self.relayer.slippage_bps
            ));
        }
        if self.relayer.worker_count == 0 {
            return Err(anyhow!("relayer.worker_count must be >= 1"));
        }
        if self.storage.sqlite_path.trim().is_empty() {
            return Err(anyhow!("storage.sqlite_path must not be empty"));
        }
        Ok(())
    }
}

fn require_value(name: &str, value: &str) -> Result<()> {
    let value = value.trim();
    if value.is_empty() || value.contains("REPLACE_ME") {
        return Err(anyhow!("{name} must be configured"));
    }
    Ok(())
}

fn require_http_endpoint(name: &str, value: &str) -> Result<()> {
    require_value(name, value)?;
    let value = value.trim();
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(anyhow!("{name} requires an explicit http(s):// endpoint"));
    }
    Ok(())
}
