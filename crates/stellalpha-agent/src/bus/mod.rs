//! Per-follower FIFO queues of Signals.
//!
//! The watcher appends, the relayer drains. Delivery is at-least-once up to
//! the dequeue: a Signal leaves the queue exactly when a consumer takes it, and
//! re-enqueueing the same `(follower, signal id)` is absorbed.

mod memory;
mod sqlite;

pub use memory::MemorySignalBus;

use anyhow::Result;

use crate::signal::Signal;

pub trait SignalBus: Send + Sync {
    /// Returns `false` when the follower already holds this Signal.
    fn enqueue(&self, follower: &str, signal: &Signal) -> Result<bool>;

    /// Oldest Signal for `follower`. An empty queue drops the follower from
    /// the active set.
    fn dequeue(&self, follower: &str) -> Result<Option<Signal>>;

    /// Followers with queued work, without scanning queue contents.
    fn active_followers(&self) -> Result<Vec<String>>;

    fn pending(&self, follower: &str) -> Result<usize>;
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every `SignalBus` implementation must share.

    use super::SignalBus;
    use crate::signal::sample;

    pub fn fifo_per_follower(bus: &dyn SignalBus) {
        bus.enqueue("alice", &sample("a", "star")).unwrap();
        bus.enqueue("alice", &sample("b", "star")).unwrap();
        bus.enqueue("bob", &sample("c", "star")).unwrap();

        assert_eq!(bus.dequeue("alice").unwrap().unwrap().id, "a");
        assert_eq!(bus.dequeue("alice").unwrap().unwrap().id, "b");
        assert!(bus.dequeue("alice").unwrap().is_none());
        assert_eq!(bus.dequeue("bob").unwrap().unwrap().id, "c");
    }

    pub fn duplicate_signal_is_absorbed(bus: &dyn SignalBus) {
        assert!(bus.enqueue("alice", &sample("a", "star")).unwrap());
        assert!(!bus.enqueue("alice", &sample("a", "star")).unwrap());
        assert!(bus.enqueue("bob", &sample("a", "star")).unwrap());
        assert_eq!(bus.pending("alice").unwrap(), 1);
        assert_eq!(bus.pending("bob").unwrap(), 1);
    }

    pub fn active_set_follows_queue_state(bus: &dyn SignalBus) {
        assert!(bus.active_followers().unwrap().is_empty());
        bus.enqueue("alice", &sample("a", "star")).unwrap();
        bus.enqueue("bob", &sample("b", "star")).unwrap();

        let mut active = bus.active_followers().unwrap();
        active.sort();
        assert_eq!(active, vec!["alice".to_string(), "bob".to_string()]);

        bus.dequeue("alice").unwrap();
        // Still registered until a dequeue observes the empty queue.
        assert!(bus.active_followers().unwrap().contains(&"alice".to_string()));
        assert!(bus.dequeue("alice").unwrap().is_none());
        assert_eq!(bus.active_followers().unwrap(), vec!["bob".to_string()]);
    }
}
