use super::*;
use std::collections::HashMap;
use std::io::Write;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write temp config");
    file
}

fn runnable() -> AgentConfig {
    let mut config = AgentConfig::default();
    config.watcher.grpc_url = "https://grpc.example.com".to_string();
    config.relayer.rpc_url = "https://rpc.example.com".to_string();
    config.relayer.authority_keypair_path = "/etc/agent/authority.json".to_string();
    config
}

#[test]
fn defaults_are_applied() {
    let config = AgentConfig::default();
    assert_eq!(config.system.log_level, "info");
    assert!(!config.system.log_json);
    assert_eq!(config.watcher.grpc_url, "REPLACE_ME");
    assert_eq!(config.watcher.commitment, "confirmed");
    assert_eq!(config.watcher.reconnect_initial_ms, 500);
    assert_eq!(config.watcher.reconnect_max_ms, 8_000);
    assert_eq!(config.relayer.worker_count, 4);
    assert_eq!(config.relayer.slippage_bps, 50);
    assert_eq!(config.relayer.sizing, "proportional");
    assert!(!config.relayer.skip_paused_precheck);
}

#[test]
fn partial_file_keeps_defaults_for_missing_keys() {
    let file = write_config(
        r#"
[system]
log_level = "debug"

[relayer]
worker_count = 8
"#,
    );
    let config = load_from_path(file.path()).expect("load config");
    assert_eq!(config.system.log_level, "debug");
    assert_eq!(config.system.env, "dev");
    assert_eq!(config.relayer.worker_count, 8);
    assert_eq!(config.relayer.poll_interval_ms, 1_000);
    assert_eq!(config.watcher.fanout_queue_capacity, 1_024);
}

#[test]
fn malformed_file_reports_path() {
    let file = write_config("[relayer\nworker_count = ");
    let error = load_from_path(file.path()).unwrap_err();
    assert!(format!("{error:#}").contains("failed to parse TOML"));
}

#[test]
fn env_overrides_replace_file_values() {
    let vars: HashMap<&str, &str> = [
        ("STELLALPHA_AGENT_LOG_JSON", "yes"),
        ("STELLALPHA_AGENT_GRPC_URL", "https://override.example.com"),
        ("STELLALPHA_AGENT_SLIPPAGE_BPS", " 125 "),
        ("STELLALPHA_AGENT_WORKER_COUNT", "16"),
        ("STELLALPHA_AGENT_SIZING", "verbatim"),
    ]
    .into_iter()
    .collect();

    let mut config = AgentConfig::default();
    apply_env_overrides(&mut config, |name| vars.get(name).map(|v| v.to_string()));

    assert!(config.system.log_json);
    assert_eq!(config.watcher.grpc_url, "https://override.example.com");
    assert_eq!(config.relayer.slippage_bps, 125);
    assert_eq!(config.relayer.worker_count, 16);
    assert_eq!(config.relayer.sizing, "verbatim");
}

#[test]
fn unparsable_env_numbers_are_ignored() {
    let mut config = AgentConfig::default();
    apply_env_overrides(&mut config, |name| match name {
        "STELLALPHA_AGENT_WORKER_COUNT" => Some("many".to_string()),
        "STELLALPHA_AGENT_LOG_JSON" => Some("maybe".to_string()),
        _ => None,
    });
    assert_eq!(config.relayer.worker_count, 4);
    assert!(!config.system.log_json);
}

#[test]
fn validate_accepts_configured_endpoints() {
    runnable().validate(RunMode::All).expect("valid config");
}

#[test]
fn validate_only_demands_endpoints_for_the_mode_run() {
    let mut config = runnable();
    config.relayer.rpc_url = "REPLACE_ME".to_string();
    config.validate(RunMode::Watcher).expect("watcher does not dial rpc");
    assert!(config.validate(RunMode::Relayer).is_err());

    let mut config = runnable();
    config.watcher.grpc_url = String::new();
    config.validate(RunMode::Relayer).expect("relayer does not dial grpc");
    assert!(config.validate(RunMode::Watcher).is_err());
}

#[test]
fn validate_rejects_non_http_endpoints() {
    let mut config = runnable();
    config.relayer.rpc_url = "ws://rpc.example.com".to_string();
    let error = config.validate(RunMode::Relayer).unwrap_err();
    assert!(error.to_string().contains("relayer.rpc_url"));
}

#[test]
fn validate_rejects_out_of_range_knobs() {
    let mut config = runnable();
    config.relayer.slippage_bps = 10_001;
    assert!(config.validate(RunMode::All).is_err());

    let mut config = runnable();
    config.relayer.worker_count = 0;
    assert!(config.validate(RunMode::All).is_err());

    let mut config = runnable();
    config.relayer.sizing = "martingale".to_string();
    assert!(config.validate(RunMode::All).is_err());

    let mut config = runnable();
    config.watcher.commitment = "recent".to_string();
    assert!(config.validate(RunMode::All).is_err());
}

#[test]
fn run_mode_parses_case_insensitively() {
    assert_eq!(RunMode::parse("Watcher"), Some(RunMode::Watcher));
    assert_eq!(RunMode::parse(" relayer "), Some(RunMode::Relayer));
    assert_eq!(RunMode::parse("all"), Some(RunMode::All));
    assert_eq!(RunMode::parse("both"), None);
}

#[test]
fn shipped_example_config_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../configs/agent.toml");
    let config = load_from_path(path).expect("load shipped config");
    assert_eq!(
        config.relayer.sizing_policy().unwrap(),
        crate::relayer::SizingPolicy::Proportional
    );
    assert_eq!(
        config.watcher.aggregator_program().unwrap().to_string(),
        "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4"
    );
    // Endpoints stay placeholders until an operator fills them in.
    assert!(config.validate(RunMode::Relayer).is_err());
}
