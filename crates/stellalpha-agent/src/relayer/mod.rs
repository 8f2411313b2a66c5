//! Drains follower queues into ledger swaps.
//!
//! Each tick lists the followers with queued work and hands each one to a
//! worker. A follower is claimed for the whole drain, so at most one swap per
//! follower (and so per TraderState) is ever in flight.

pub mod execute;
pub mod jupiter;
pub mod ledger;
pub mod route;
mod sizing;

pub use execute::{relay_signal, RelaySettings, Relayed, SwapAddresses};
pub use jupiter::JupiterClient;
pub use ledger::{Ledger, RpcLedger};
pub use route::{validate_route, QuoteRequest, RoutePlan, RouteProvider, ValidatedRoute};
pub use sizing::SizingPolicy;

use anyhow::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::bus::SignalBus;
use crate::store::run_blocking;

/// Followers currently owned by a worker.
#[derive(Clone, Default)]
struct InFlight(Arc<Mutex<HashSet<String>>>);

struct InFlightGuard {
    set: InFlight,
    follower: String,
}

impl InFlight {
    fn try_claim(&self, follower: &str) -> Option<InFlightGuard> {
        let mut set = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !set.insert(follower.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            set: self.clone(),
            follower: follower.to_string(),
        })
    }

    #[cfg(test)]
    fn contains(&self, follower: &str) -> bool {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(follower)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.follower);
    }
}

pub struct Relayer {
    bus: Arc<dyn SignalBus>,
    ledger: Arc<dyn Ledger>,
    routes: Arc<dyn RouteProvider>,
    settings: Arc<RelaySettings>,
    workers: Arc<Semaphore>,
    in_flight: InFlight,
    poll_interval: Duration,
}

impl Relayer {
    pub fn new(
        bus: Arc<dyn SignalBus>,
        ledger: Arc<dyn Ledger>,
        routes: Arc<dyn RouteProvider>,
        settings: RelaySettings,
        worker_count: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            bus,
            ledger,
            routes,
            settings: Arc::new(settings),
            workers: Arc::new(Semaphore::new(worker_count.max(1))),
            in_flight: InFlight::default(),
            poll_interval,
        }
    }

    pub async fn run(self) -> Result<()> {
        info!(
            authority = %self.ledger.authority(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            workers = self.workers.available_permits(),
            "relayer started"
        );
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// Start a worker for every active follower not already being drained.
    pub async fn tick(&self) -> Vec<JoinHandle<()>> {
        let bus = Arc::clone(&self.bus);
        let followers = match run_blocking(move || bus.active_followers()).await {
            Ok(followers) => followers,
            Err(error) => {
                warn!(error = %error, "failed listing active followers");
                return Vec::new();
            }
        };

        let mut handles = Vec::new();
        for follower in followers {
            let Some(claim) = self.in_flight.try_claim(&follower) else {
                debug!(follower = %follower, "follower still in flight; skipping tick");
                continue;
            };
            let bus = Arc::clone(&self.bus);
            let ledger = Arc::clone(&self.ledger);
            let routes = Arc::clone(&self.routes);
            let settings = Arc::clone(&self.settings);
            let workers = Arc::clone(&self.workers);
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = workers.acquire_owned().await else {
                    return;
                };
                drain_follower(bus, ledger, routes, settings, &claim.follower).await;
                drop(claim);
            }));
        }
        handles
    }

    #[cfg(test)]
    fn is_in_flight(&self, follower: &str) -> bool {
        self.in_flight.contains(follower)
    }
}

async fn drain_follower(
    bus: Arc<dyn SignalBus>,
    ledger: Arc<dyn Ledger>,
    routes: Arc<dyn RouteProvider>,
    settings: Arc<RelaySettings>,
    follower: &str,
) {
    loop {
        let queue = Arc::clone(&bus);
        let owner = follower.to_string();
        let signal = match run_blocking(move || queue.dequeue(&owner)).await {
            Ok(Some(signal)) => signal,
            Ok(None) => return,
            Err(error) => {
                warn!(follower = %follower, error = %error, "failed dequeueing signal");
                return;
            }
        };
        match relay_signal(
            ledger.as_ref(),
            routes.as_ref(),
            settings.as_ref(),
            follower,
            &signal,
        )
        .await
        {
            Ok(relayed) => info!(
                follower = %follower,
                signal = %signal.id,
                signature = %relayed.signature,
                trader_state = %relayed.trader_state,
                amount_in = relayed.amount_in,
                min_amount_out = relayed.min_amount_out,
                "signal relayed"
            ),
            Err(error) => warn!(
                follower = %follower,
                signal = %signal.id,
                reason = error.reason(),
                error = %error,
                "signal dropped"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::execute::tests::{scenario, FakeLedger, Scenario};
    use super::*;
    use crate::bus::slow::{longest_stall, SlowBus};
    use crate::bus::MemorySignalBus;
    use crate::signal::sample;

    fn relayer(
        s: Scenario,
        bus: Arc<MemorySignalBus>,
        workers: usize,
    ) -> (Relayer, Arc<FakeLedger>) {
        let ledger = Arc::new(s.ledger);
        let relayer = Relayer::new(
            bus,
            ledger.clone(),
            Arc::new(s.routes),
            s.settings,
            workers,
            Duration::from_millis(10),
        );
        (relayer, ledger)
    }

    #[test]
    fn claims_are_exclusive_until_dropped() {
        let in_flight = InFlight::default();
        let claim = in_flight.try_claim("alice").unwrap();
        assert!(in_flight.try_claim("alice").is_none());
        assert!(in_flight.try_claim("bob").is_some());
        drop(claim);
        assert!(in_flight.try_claim("alice").is_some());
    }

    #[tokio::test]
    async fn tick_drains_every_queued_signal() {
        let s = scenario();
        let follower = s.follower.clone();
        let star = s.signal.star_wallet.clone();
        let bus = Arc::new(MemorySignalBus::default());
        bus.enqueue(&follower, &sample("sig-1", &star)).unwrap();
        bus.enqueue(&follower, &sample("sig-2", &star)).unwrap();

        let (relayer, ledger) = relayer(s, bus.clone(), 2);
        for handle in relayer.tick().await {
            handle.await.unwrap();
        }
        assert_eq!(bus.pending(&follower).unwrap(), 0);
        assert_eq!(ledger.submissions().len(), 2);
        assert!(!relayer.is_in_flight(&follower));
        assert!(relayer.tick().await.is_empty());
    }

    #[tokio::test]
    async fn follower_in_flight_is_skipped() {
        let mut s = scenario();
        s.ledger.submit_delay = Duration::from_millis(100);
        let follower = s.follower.clone();
        let star = s.signal.star_wallet.clone();
        let bus = Arc::new(MemorySignalBus::default());
        bus.enqueue(&follower, &sample("sig-1", &star)).unwrap();

        let (relayer, _ledger) = relayer(s, bus.clone(), 2);
        let first = relayer.tick().await;
        assert_eq!(first.len(), 1);
        assert!(relayer.is_in_flight(&follower));
        // Queue refilled while the first swap is still being submitted.
        bus.enqueue(&follower, &sample("sig-2", &star)).unwrap();
        assert!(relayer.tick().await.is_empty());

        for handle in first {
            handle.await.unwrap();
        }
        assert!(!relayer.is_in_flight(&follower));
    }

    #[tokio::test]
    async fn slow_queue_does_not_stall_the_runtime() {
        let s = scenario();
        let follower = s.follower.clone();
        let star = s.signal.star_wallet.clone();
        let bus = Arc::new(SlowBus::new(Duration::from_millis(100)));
        bus.inner.enqueue(&follower, &sample("sig-1", &star)).unwrap();

        let ledger = Arc::new(s.ledger);
        let relayer = Relayer::new(
            bus.clone(),
            ledger.clone(),
            Arc::new(s.routes),
            s.settings,
            1,
            Duration::from_millis(10),
        );
        let heartbeat = tokio::spawn(longest_stall(30));
        // Listing, then two dequeues (the Signal, then the empty queue).
        for handle in relayer.tick().await {
            handle.await.unwrap();
        }
        let worst = heartbeat.await.unwrap();

        assert_eq!(ledger.submissions().len(), 1);
        assert!(worst < Duration::from_millis(80), "runtime stalled for {worst:?}");
    }

    #[tokio::test]
    async fn failing_signal_does_not_block_the_queue() {
        let s = scenario();
        let follower = s.follower.clone();
        let star = s.signal.star_wallet.clone();
        let bus = Arc::new(MemorySignalBus::default());
        let mut broken = sample("bad", &star);
        broken.from_token_mint = "garbage".to_string();
        bus.enqueue(&follower, &broken).unwrap();
        bus.enqueue(&follower, &sample("sig-1", &star)).unwrap();

        let (relayer, ledger) = relayer(s, bus.clone(), 1);
        for handle in relayer.tick().await {
            handle.await.unwrap();
        }
        assert_eq!(bus.pending(&follower).unwrap(), 0);
        assert_eq!(ledger.submissions().len(), 1);
    }
}
