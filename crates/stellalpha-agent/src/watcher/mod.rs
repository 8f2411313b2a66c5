//! Star-trader transaction watcher.
//!
//! One task pulls transactions from a [`TransactionSource`] and detects swaps
//! by followed wallets; a second task fans each trade out to the followers'
//! queues. A bounded channel sits between them so a large follower list never
//! stalls stream consumption for long.

mod decode;
pub mod detect;
pub mod source;
mod yellowstone;

pub use detect::{detect_trade, DetectedTrade};
pub use source::{RawTransaction, TokenTransfer, TransactionSource};
pub use yellowstone::YellowstoneSource;

use anyhow::{Context, Result};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bus::SignalBus;
use crate::config::WatcherConfig;
use crate::registry::FollowRegistry;
use crate::store::run_blocking;
use yellowstone::sleep_with_backoff;

const SEEN_SIGNATURES_LIMIT: usize = 50_000;

#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub fanout_queue_capacity: usize,
    pub follow_refresh: Duration,
    /// Delay bounds between consecutive source errors.
    pub error_backoff_initial_ms: u64,
    pub error_backoff_max_ms: u64,
}

impl WatcherSettings {
    pub fn from_config(config: &WatcherConfig) -> Self {
        Self {
            fanout_queue_capacity: config.fanout_queue_capacity.max(1),
            follow_refresh: Duration::from_secs(config.follow_refresh_seconds),
            error_backoff_initial_ms: config.reconnect_initial_ms.max(1),
            error_backoff_max_ms: config.reconnect_max_ms.max(config.reconnect_initial_ms.max(1)),
        }
    }
}

/// Bounded FIFO memory of processed signatures; reconnects replay recent
/// slots and the same transaction must not fan out twice.
struct SeenSignatures {
    order: VecDeque<String>,
    members: HashSet<String>,
    limit: usize,
}

impl SeenSignatures {
    fn new(limit: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            limit: limit.max(1),
        }
    }

    /// Returns `false` if the signature was already recorded.
    fn insert(&mut self, signature: &str) -> bool {
        if self.members.contains(signature) {
            return false;
        }
        while self.order.len() >= self.limit {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.order.push_back(signature.to_string());
        self.members.insert(signature.to_string());
        true
    }
}

struct FollowedStars {
    stars: HashSet<String>,
    refreshed_at: Option<Instant>,
    every: Duration,
}

impl FollowedStars {
    fn new(every: Duration) -> Self {
        Self {
            stars: HashSet::new(),
            refreshed_at: None,
            every,
        }
    }

    async fn refresh_if_due(&mut self, registry: &Arc<dyn FollowRegistry>) {
        let due = self
            .refreshed_at
            .map_or(true, |at| at.elapsed() >= self.every);
        if !due {
            return;
        }
        let registry = Arc::clone(registry);
        match run_blocking(move || registry.star_traders()).await {
            Ok(stars) => {
                if stars.len() != self.stars.len() {
                    info!(stars = stars.len(), "followed star set refreshed");
                }
                self.stars = stars;
            }
            // Keep the previous set; the next event retries.
            Err(error) => warn!(error = %error, "failed refreshing followed stars"),
        }
        self.refreshed_at = Some(Instant::now());
    }
}

/// Enqueue one Signal per follower of the trade's wallet; returns how many
/// queues received a new Signal.
pub fn fan_out(
    trade: &DetectedTrade,
    registry: &dyn FollowRegistry,
    bus: &dyn SignalBus,
) -> Result<usize> {
    let followers = registry
        .followers_of(&trade.wallet)
        .with_context(|| format!("failed listing followers of {}", trade.wallet))?;
    let signal = trade.to_signal();
    let mut delivered = 0;
    for follower in followers {
        match bus.enqueue(&follower, &signal) {
            Ok(true) => delivered += 1,
            Ok(false) => debug!(follower = %follower, signal = %signal.id, "signal already queued"),
            Err(error) => warn!(
                follower = %follower,
                signal = %signal.id,
                error = %error,
                "failed enqueueing signal"
            ),
        }
    }
    Ok(delivered)
}

/// Run until the source is exhausted. Every queued trade is fanned out
/// before this returns.
pub async fn run_watcher<S: TransactionSource>(
    mut source: S,
    registry: Arc<dyn FollowRegistry>,
    bus: Arc<dyn SignalBus>,
    settings: WatcherSettings,
) -> Result<()> {
    let (trade_tx, mut trade_rx) = mpsc::channel::<DetectedTrade>(settings.fanout_queue_capacity);

    let fanout_registry = Arc::clone(&registry);
    let fanout = tokio::spawn(async move {
        while let Some(trade) = trade_rx.recv().await {
            let signature = trade.signature.clone();
            let registry = Arc::clone(&fanout_registry);
            let bus = Arc::clone(&bus);
            let outcome = run_blocking(move || {
                fan_out(&trade, registry.as_ref(), bus.as_ref()).map(|delivered| (trade, delivered))
            })
            .await;
            match outcome {
                Ok((trade, delivered)) => info!(
                    signature = %trade.signature,
                    star = %trade.wallet,
                    input_mint = %trade.input_mint,
                    output_mint = %trade.output_mint,
                    amount_in = trade.input_amount,
                    confidence = ?trade.confidence,
                    delivered,
                    "trade fanned out"
                ),
                Err(error) => warn!(
                    signature = %signature,
                    error = %error,
                    "fan-out failed"
                ),
            }
        }
    });

    let mut stars = FollowedStars::new(settings.follow_refresh);
    let mut seen = SeenSignatures::new(SEEN_SIGNATURES_LIMIT);
    let mut next_backoff_ms = settings.error_backoff_initial_ms;

    loop {
        let raw = match source.next_transaction().await {
            Ok(Some(raw)) => {
                next_backoff_ms = settings.error_backoff_initial_ms;
                raw
            }
            Ok(None) => break,
            Err(error) => {
                warn!(
                    error = %error,
                    retry_in_ms = next_backoff_ms,
                    "transaction source error"
                );
                sleep_with_backoff(
                    &mut next_backoff_ms,
                    settings.error_backoff_initial_ms,
                    settings.error_backoff_max_ms,
                )
                .await;
                continue;
            }
        };
        stars.refresh_if_due(&registry).await;
        if !stars.stars.contains(&raw.signer) {
            continue;
        }
        if !seen.insert(&raw.signature) {
            continue;
        }
        let Some(trade) = detect_trade(&raw, &raw.signer) else {
            debug!(signature = %raw.signature, "no swap detected");
            continue;
        };
        if trade_tx.send(trade).await.is_err() {
            warn!("fan-out task stopped; ending watcher");
            break;
        }
    }

    drop(trade_tx);
    fanout.await.context("fan-out task panicked")?;
    Ok(())
}
