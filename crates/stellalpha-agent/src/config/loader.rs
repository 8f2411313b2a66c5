use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::AgentConfig;

pub const ENV_PREFIX: &str = "STELLALPHA_AGENT_";

pub fn load_from_path(path: impl AsRef<Path>) -> Result<AgentConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let cfg: AgentConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
    Ok(cfg)
}

pub fn load_from_env_or_default(default_path: &Path) -> Result<(AgentConfig, PathBuf)> {
    let configured = env::var(format!("{ENV_PREFIX}CONFIG"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_path.to_path_buf());
    let mut config = load_from_path(&configured)?;
    apply_env_overrides(&mut config, |name| env::var(name).ok());
    Ok((config, configured))
}

/// Overlay `STELLALPHA_AGENT_*` variables onto a parsed config. Values that
/// fail to parse are ignored and leave the file value in place.
pub fn apply_env_overrides(config: &mut AgentConfig, lookup: impl Fn(&str) -> Option<String>) {
    let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));

    if let Some(level) = var("LOG_LEVEL") {
        config.system.log_level = level;
    }
    if let Some(json) = var("LOG_JSON").and_then(parse_env_bool) {
        config.system.log_json = json;
    }
    if let Some(path) = var("SQLITE_PATH") {
        config.storage.sqlite_path = path;
    }
    if let Some(grpc_url) = var("GRPC_URL") {
        config.watcher.grpc_url = grpc_url;
    }
    if let Some(x_token) = var("X_TOKEN") {
        config.watcher.x_token = x_token;
    }
    if let Some(rpc_url) = var("RPC_URL") {
        config.relayer.rpc_url = rpc_url;
    }
    if let Some(keypair) = var("AUTHORITY_KEYPAIR") {
        config.relayer.authority_keypair_path = keypair;
    }
    if let Some(jupiter) = var("JUPITER_API_URL") {
        config.relayer.jupiter_api_url = jupiter;
    }
    if let Some(api_key) = var("JUPITER_API_KEY") {
        config.relayer.jupiter_api_key = api_key;
    }
    if let Some(slippage) = var("SLIPPAGE_BPS").and_then(parse_trimmed::<u16>) {
        config.relayer.slippage_bps = slippage;
    }
    if let Some(workers) = var("WORKER_COUNT").and_then(parse_trimmed::<usize>) {
        config.relayer.worker_count = workers;
    }
    if let Some(sizing) = var("SIZING") {
        config.relayer.sizing = sizing;
    }
}

fn parse_trimmed<T: FromStr>(value: String) -> Option<T> {
    value.trim().parse::<T>().ok()
}

fn parse_env_bool(value: String) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
