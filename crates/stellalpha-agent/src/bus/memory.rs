use anyhow::{anyhow, Result};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use super::SignalBus;
use crate::signal::Signal;

#[derive(Default)]
struct Queues {
    queues: HashMap<String, VecDeque<Signal>>,
    pending_ids: HashMap<String, HashSet<String>>,
    active: BTreeSet<String>,
}

/// Process-local bus with the same semantics as the SQLite one.
#[derive(Default)]
pub struct MemorySignalBus {
    inner: Mutex<Queues>,
}

impl MemorySignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Queues>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("signal bus mutex poisoned"))
    }
}

impl SignalBus for MemorySignalBus {
    fn enqueue(&self, follower: &str, signal: &Signal) -> Result<bool> {
        let mut inner = self.lock()?;
        let fresh = inner
            .pending_ids
            .entry(follower.to_string())
            .or_default()
            .insert(signal.id.clone());
        if !fresh {
            return Ok(false);
        }
        inner
            .queues
            .entry(follower.to_string())
            .or_default()
            .push_back(signal.clone());
        inner.active.insert(follower.to_string());
        Ok(true)
    }

    fn dequeue(&self, follower: &str) -> Result<Option<Signal>> {
        let mut inner = self.lock()?;
        let head = inner
            .queues
            .get_mut(follower)
            .and_then(|queue| queue.pop_front());
        match head {
            Some(signal) => {
                if let Some(ids) = inner.pending_ids.get_mut(follower) {
                    ids.remove(&signal.id);
                }
                Ok(Some(signal))
            }
            None => {
                inner.queues.remove(follower);
                inner.pending_ids.remove(follower);
                inner.active.remove(follower);
                Ok(None)
            }
        }
    }

    fn active_followers(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.active.iter().cloned().collect())
    }

    fn pending(&self, follower: &str) -> Result<usize> {
        Ok(self
            .lock()?
            .queues
            .get(follower)
            .map(VecDeque::len)
            .unwrap_or(0))
    }
}
