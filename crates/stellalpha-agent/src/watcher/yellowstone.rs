use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use solana_sdk::commitment_config::CommitmentLevel;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tonic::transport::ClientTlsConfig;
use tracing::{debug, info, warn};
use yellowstone_grpc_client::GeyserGrpcClient;
use yellowstone_grpc_proto::prelude::{
    CommitmentLevel as ProtoCommitment, SubscribeRequest, SubscribeRequestFilterTransactions,
    SubscribeRequestPing,
};

use super::decode::{parse_update, ParsedUpdate};
use super::source::{RawTransaction, TransactionSource};
use crate::config::WatcherConfig;

const OBSERVATION_CHANNEL_CAPACITY: usize = 2_048;

#[derive(Debug, Clone)]
struct StreamSettings {
    grpc_url: String,
    x_token: String,
    aggregator_program_id: String,
    commitment: ProtoCommitment,
    connect_timeout_ms: u64,
    idle_timeout_ms: u64,
    reconnect_initial_ms: u64,
    reconnect_max_ms: u64,
}

/// Confirmed transactions touching the aggregator program, delivered from a
/// Yellowstone gRPC subscription that reconnects on its own.
pub struct YellowstoneSource {
    receiver: mpsc::Receiver<RawTransaction>,
    stream_task: JoinHandle<()>,
}

impl YellowstoneSource {
    pub fn spawn(config: &WatcherConfig) -> Result<Self> {
        let commitment = match config.commitment_level()? {
            CommitmentLevel::Processed => ProtoCommitment::Processed,
            CommitmentLevel::Confirmed => ProtoCommitment::Confirmed,
            CommitmentLevel::Finalized => ProtoCommitment::Finalized,
        };
        let aggregator = config.aggregator_program()?;
        if config.reconnect_initial_ms == 0 || config.reconnect_max_ms < config.reconnect_initial_ms
        {
            return Err(anyhow!(
                "watcher reconnect backoff must satisfy 0 < initial <= max"
            ));
        }
        let settings = StreamSettings {
            grpc_url: config.grpc_url.trim().to_string(),
            x_token: config.x_token.trim().to_string(),
            aggregator_program_id: aggregator.to_string(),
            commitment,
            connect_timeout_ms: config.connect_timeout_ms,
            idle_timeout_ms: config.idle_timeout_ms,
            reconnect_initial_ms: config.reconnect_initial_ms,
            reconnect_max_ms: config.reconnect_max_ms,
        };
        let (sender, receiver) = mpsc::channel(OBSERVATION_CHANNEL_CAPACITY);
        let stream_task = tokio::spawn(stream_loop(settings, sender));
        Ok(Self {
            receiver,
            stream_task,
        })
    }
}

impl Drop for YellowstoneSource {
    fn drop(&mut self) {
        self.stream_task.abort();
    }
}

#[async_trait]
impl TransactionSource for YellowstoneSource {
    async fn next_transaction(&mut self) -> Result<Option<RawTransaction>> {
        Ok(self.receiver.recv().await)
    }
}

fn subscribe_request(settings: &StreamSettings) -> SubscribeRequest {
    let mut transactions = HashMap::new();
    transactions.insert(
        "stellalpha-aggregator".to_string(),
        SubscribeRequestFilterTransactions {
            vote: Some(false),
            failed: Some(false),
            signature: None,
            account_include: vec![settings.aggregator_program_id.clone()],
            account_exclude: Vec::new(),
            account_required: Vec::new(),
        },
    );
    SubscribeRequest {
        transactions,
        commitment: Some(settings.commitment as i32),
        ..Default::default()
    }
}

pub(super) async fn sleep_with_backoff(next_backoff_ms: &mut u64, initial_ms: u64, max_ms: u64) {
    let delay = (*next_backoff_ms).clamp(initial_ms, max_ms);
    time::sleep(Duration::from_millis(delay)).await;
    *next_backoff_ms = delay.saturating_mul(2).min(max_ms);
}

async fn stream_loop(settings: StreamSettings, sender: mpsc::Sender<RawTransaction>) {
    let mut next_backoff_ms = settings.reconnect_initial_ms;
    loop {
        match run_subscription(&settings, &sender, &mut next_backoff_ms).await {
            Ok(SessionEnd::ReceiverClosed) => {
                debug!("transaction receiver dropped; stopping yellowstone stream");
                return;
            }
            Ok(SessionEnd::Reconnect) => {}
            Err(error) => warn!(error = %error, "yellowstone session failed"),
        }
        sleep_with_backoff(
            &mut next_backoff_ms,
            settings.reconnect_initial_ms,
            settings.reconnect_max_ms,
        )
        .await;
    }
}

enum SessionEnd {
    Reconnect,
    ReceiverClosed,
}

async fn run_subscription(
    settings: &StreamSettings,
    sender: &mpsc::Sender<RawTransaction>,
    next_backoff_ms: &mut u64,
) -> Result<SessionEnd> {
    let builder = GeyserGrpcClient::build_from_shared(settings.grpc_url.clone())
        .map_err(|error| anyhow!("invalid yellowstone endpoint: {error}"))?;
    let x_token = (!settings.x_token.is_empty()).then_some(settings.x_token.as_str());
    let builder = builder
        .x_token(x_token)
        .map_err(|error| anyhow!("invalid yellowstone x-token metadata: {error}"))?;
    let use_tls = settings
        .grpc_url
        .to_ascii_lowercase()
        .starts_with("https://");
    let builder = if use_tls {
        builder
            .tls_config(ClientTlsConfig::new().with_native_roots())
            .map_err(|error| anyhow!("invalid yellowstone TLS config: {error:?}"))?
    } else {
        builder
    };
    let mut client = builder
        .connect_timeout(Duration::from_millis(settings.connect_timeout_ms))
        .timeout(Duration::from_millis(settings.connect_timeout_ms))
        .http2_adaptive_window(true)
        .tcp_nodelay(true)
        .connect()
        .await
        .map_err(|error| anyhow!("failed connecting yellowstone endpoint: {error:?}"))?;

    let (mut subscribe_tx, mut stream) = client
        .subscribe()
        .await
        .map_err(|error| anyhow!("failed opening yellowstone subscription: {error}"))?;
    subscribe_tx
        .send(subscribe_request(settings))
        .await
        .map_err(|error| anyhow!("failed sending yellowstone subscribe request: {error}"))?;
    *next_backoff_ms = settings.reconnect_initial_ms;
    info!(
        endpoint = %settings.grpc_url,
        program = %settings.aggregator_program_id,
        "yellowstone subscription open"
    );

    loop {
        let next_message =
            time::timeout(Duration::from_millis(settings.idle_timeout_ms), stream.next()).await;
        match next_message {
            Ok(Some(Ok(update))) => match parse_update(update) {
                Ok(Some(ParsedUpdate::Transaction(raw))) => {
                    if sender.send(raw).await.is_err() {
                        return Ok(SessionEnd::ReceiverClosed);
                    }
                }
                Ok(Some(ParsedUpdate::Ping)) => {
                    let ping_request = SubscribeRequest {
                        ping: Some(SubscribeRequestPing { id: 1 }),
                        ..Default::default()
                    };
                    if let Err(error) = subscribe_tx.send(ping_request).await {
                        warn!(error = %error, "failed sending yellowstone ping response");
                        return Ok(SessionEnd::Reconnect);
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    debug!(error = %error, "failed parsing yellowstone transaction update");
                }
            },
            Ok(Some(Err(error))) => {
                warn!(error = %error, "yellowstone stream update error");
                return Ok(SessionEnd::Reconnect);
            }
            Ok(None) => {
                warn!("yellowstone stream ended");
                return Ok(SessionEnd::Reconnect);
            }
            Err(_) => {
                warn!(
                    idle_timeout_ms = settings.idle_timeout_ms,
                    "yellowstone stream idle timeout; reconnecting"
                );
                return Ok(SessionEnd::Reconnect);
            }
        }
    }
}
