use anyhow::{anyhow, Context, Result};
use solana_sdk::pubkey::Pubkey;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use stellalpha_agent::bus::SignalBus;
use stellalpha_agent::config::{load_from_env_or_default, AgentConfig, RunMode};
use stellalpha_agent::registry::FollowRegistry;
use stellalpha_agent::relayer::{JupiterClient, RelaySettings, Relayer, RpcLedger};
use stellalpha_agent::store::SqliteStore;
use stellalpha_agent::telemetry::init_tracing;
use stellalpha_agent::watcher::{run_watcher, WatcherSettings, YellowstoneSource};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "configs/agent.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Run(RunMode),
    Follow { star: String, follower: String },
    Unfollow { star: String, follower: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let command = parse_command(&args)?;
    let default_path = parse_config_arg(&args).unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let (config, loaded_config_path) = load_from_env_or_default(&default_path)?;

    init_tracing(&config.system.log_level, config.system.log_json);
    info!(
        config_path = %loaded_config_path.display(),
        env = %config.system.env,
        "configuration loaded"
    );

    let store = Arc::new(
        SqliteStore::open(Path::new(&config.storage.sqlite_path))
            .context("failed to initialize sqlite store")?,
    );

    match command {
        Command::Follow { star, follower } => {
            let (star, follower) = wallet_pair(&star, &follower)?;
            let added = store.follow(&star, &follower)?;
            info!(star = %star, follower = %follower, added, "follow recorded");
            Ok(())
        }
        Command::Unfollow { star, follower } => {
            let (star, follower) = wallet_pair(&star, &follower)?;
            let removed = store.unfollow(&star, &follower)?;
            info!(star = %star, follower = %follower, removed, "follow removed");
            Ok(())
        }
        Command::Run(mode) => {
            config.validate(mode)?;
            run(config, mode, store).await
        }
    }
}

async fn run(config: AgentConfig, mode: RunMode, store: Arc<SqliteStore>) -> Result<()> {
    let registry: Arc<dyn FollowRegistry> = store.clone();
    let bus: Arc<dyn SignalBus> = store;
    let mut tasks = JoinSet::new();

    if mode.runs_watcher() {
        let source = YellowstoneSource::spawn(&config.watcher)
            .context("failed to initialize yellowstone source")?;
        let settings = WatcherSettings::from_config(&config.watcher);
        let (registry, bus) = (registry.clone(), bus.clone());
        tasks.spawn(async move { ("watcher", run_watcher(source, registry, bus, settings).await) });
    }

    if mode.runs_relayer() {
        let relayer_config = &config.relayer;
        let ledger = RpcLedger::new(&relayer_config.rpc_url, &relayer_config.authority_keypair_path)
            .context("failed to initialize ledger client")?;
        let routes = JupiterClient::new(
            &relayer_config.jupiter_api_url,
            &relayer_config.jupiter_api_key,
            relayer_config.max_accounts,
            Duration::from_millis(relayer_config.quote_timeout_ms),
        )?;
        let settings = RelaySettings {
            aggregator: config.watcher.aggregator_program()?,
            sizing: relayer_config.sizing_policy()?,
            slippage_bps: relayer_config.slippage_bps,
            quote_timeout: Duration::from_millis(relayer_config.quote_timeout_ms),
            submit_timeout: Duration::from_millis(relayer_config.submit_timeout_ms),
            precheck_lifecycle: !relayer_config.skip_paused_precheck,
        };
        let relayer = Relayer::new(
            bus.clone(),
            Arc::new(ledger),
            Arc::new(routes),
            settings,
            relayer_config.worker_count,
            Duration::from_millis(relayer_config.poll_interval_ms.max(1)),
        );
        tasks.spawn(async move { ("relayer", relayer.run().await) });
    }

    info!(mode = ?mode, "agent running");
    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c").map(|()| info!("shutdown requested"))
        }
        Some(finished) = tasks.join_next() => Err(component_exit(finished)),
    };
    tasks.shutdown().await;
    outcome
}

/// Components run until shutdown, so any exit ends the agent with an error.
fn component_exit(finished: Result<(&'static str, Result<()>), JoinError>) -> anyhow::Error {
    match finished {
        Ok((component, Ok(()))) => {
            error!(component, "component exited unexpectedly");
            anyhow!("{component} exited unexpectedly")
        }
        Ok((component, Err(error))) => {
            error!(component, error = %error, "component failed");
            error.context(format!("{component} failed"))
        }
        Err(join_error) => {
            error!(error = %join_error, "component panicked");
            anyhow!("component panicked: {join_error}")
        }
    }
}

fn wallet_pair(star: &str, follower: &str) -> Result<(String, String)> {
    let star = Pubkey::from_str(star.trim()).map_err(|_| anyhow!("star {star:?} is not a wallet address"))?;
    let follower = Pubkey::from_str(follower.trim())
        .map_err(|_| anyhow!("follower {follower:?} is not a wallet address"))?;
    Ok((star.to_string(), follower.to_string()))
}

fn parse_config_arg(args: &[String]) -> Option<PathBuf> {
    let mut args = args.iter();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(inline) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(inline));
        }
    }
    None
}

/// `[follow|unfollow <star> <follower>] [--mode watcher|relayer|all] [--config <path>]`
fn parse_command(args: &[String]) -> Result<Command> {
    let mut positional = Vec::new();
    let mut mode = RunMode::All;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            iter.next();
            continue;
        }
        if arg.starts_with("--config=") {
            continue;
        }
        if arg == "--mode" {
            let raw = iter
                .next()
                .ok_or_else(|| anyhow!("--mode requires a value"))?;
            mode = parse_mode(raw)?;
        } else if let Some(raw) = arg.strip_prefix("--mode=") {
            mode = parse_mode(raw)?;
        } else {
            positional.push(arg.as_str());
        }
    }

    match positional.as_slice() {
        [] => Ok(Command::Run(mode)),
        ["follow", star, follower] => Ok(Command::Follow {
            star: star.to_string(),
            follower: follower.to_string(),
        }),
        ["unfollow", star, follower] => Ok(Command::Unfollow {
            star: star.to_string(),
            follower: follower.to_string(),
        }),
        [single] => RunMode::parse(single)
            .map(Command::Run)
            .ok_or_else(|| anyhow!("unknown command {single:?}")),
        other => Err(anyhow!("unrecognised arguments: {other:?}")),
    }
}

fn parse_mode(raw: &str) -> Result<RunMode> {
    RunMode::parse(raw).ok_or_else(|| anyhow!("--mode must be watcher|relayer|all, got {raw:?}"))
}
