use std::collections::BTreeMap;

use tracing::trace;

use crate::clock::Millis;
use crate::timers::{TimerId, TimerQueue};

/// Keyed trailing-edge debouncer.
///
/// Each key has at most one pending timer. Calling [`Debouncer::call`] again
/// for a key before it fires pushes the deadline out by the full delay, so a
/// burst of calls collapses into one firing. Keys never affect each other,
/// and separate debouncers share no state.
#[derive(Debug)]
pub struct Debouncer<K: Ord + Clone> {
    delay_ms: u64,
    timers: TimerQueue<K>,
    pending: BTreeMap<K, TimerId>,
}

impl<K: Ord + Clone> Debouncer<K> {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            timers: TimerQueue::new(),
            pending: BTreeMap::new(),
        }
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    /// Schedules `key` to fire at `now + delay`, replacing any pending timer.
    pub fn call(&mut self, key: K, now: Millis) {
        if let Some(previous) = self.pending.remove(&key) {
            self.timers.cancel(previous);
            trace!(delay_ms = self.delay_ms, "debounce deadline pushed out");
        }
        let id = self.timers.schedule(now.after(self.delay_ms), key.clone());
        self.pending.insert(key, id);
    }

    pub fn cancel(&mut self, key: &K) -> bool {
        match self.pending.remove(key) {
            Some(id) => self.timers.cancel(id).is_some(),
            None => false,
        }
    }

    pub fn cancel_all(&mut self) -> usize {
        self.pending.clear();
        self.timers.clear()
    }

    /// Pops the next key whose quiet period has elapsed by `now`.
    pub fn pop_ready(&mut self, now: Millis) -> Option<K> {
        let (_, key) = self.timers.pop_due(now)?;
        self.pending.remove(&key);
        Some(key)
    }

    /// Drains every key ready at `now`, in firing order.
    pub fn drain_ready(&mut self, now: Millis) -> Vec<K> {
        std::iter::from_fn(|| self.pop_ready(now)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::Debouncer;
    use crate::clock::Millis;

    #[test]
    fn burst_collapses_into_one_firing() {
        let mut d = Debouncer::new(300);
        d.call("zones", Millis(0));
        d.call("zones", Millis(100));
        d.call("zones", Millis(200));

        assert!(d.drain_ready(Millis(499)).is_empty());
        assert_eq!(d.drain_ready(Millis(500)), vec!["zones"]);
        assert!(d.drain_ready(Millis(10_000)).is_empty());
    }

    #[test]
    fn keys_are_independent() {
        let mut d = Debouncer::new(100);
        d.call("a", Millis(0));
        d.call("b", Millis(50));
        assert_eq!(d.drain_ready(Millis(100)), vec!["a"]);
        assert!(d.is_pending(&"b"));
        assert_eq!(d.drain_ready(Millis(150)), vec!["b"]);
    }

    #[test]
    fn separate_debouncers_do_not_cancel_each_other() {
        let mut fetch = Debouncer::new(300);
        let mut viewport = Debouncer::new(500);
        fetch.call("vis", Millis(0));
        viewport.call("vis", Millis(0));
        fetch.cancel_all();

        assert!(fetch.drain_ready(Millis(1_000)).is_empty());
        assert_eq!(viewport.drain_ready(Millis(500)), vec!["vis"]);
    }

    #[test]
    fn cancel_drops_pending_key() {
        let mut d = Debouncer::new(10);
        d.call(1, Millis(0));
        assert!(d.cancel(&1));
        assert!(!d.cancel(&1));
        assert_eq!(d.pending_len(), 0);
        assert!(d.pop_ready(Millis(100)).is_none());
    }
}
