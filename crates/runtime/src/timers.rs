use crate::clock::Millis;

/// Handle returned by [`TimerQueue::schedule`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Key {
    due: Millis,
    id: TimerId,
}

#[derive(Debug)]
struct Entry<T> {
    key: Key,
    payload: T,
}

/// Cooperative timer queue.
///
/// Nothing here sleeps. Callers schedule payloads against a due time and later
/// pop whatever is due at the time they pass in.
///
/// Ordering contract:
/// - Due timers pop in `(due, id)` order, so timers due at the same instant
///   fire in scheduling order.
/// - Cancellation does not perturb the order of remaining timers.
#[derive(Debug)]
pub struct TimerQueue<T> {
    next_id: u64,
    entries: Vec<Entry<T>>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn schedule(&mut self, due: Millis, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.push(Entry {
            key: Key { due, id },
            payload,
        });
        id
    }

    /// Returns the cancelled payload, or `None` if the timer already fired or
    /// was never scheduled.
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        let idx = self.entries.iter().position(|e| e.key.id == id)?;
        Some(self.entries.remove(idx).payload)
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.entries.iter().any(|e| e.key.id == id)
    }

    /// Earliest due time among pending timers.
    pub fn next_due(&self) -> Option<Millis> {
        self.entries.iter().map(|e| e.key.due).min()
    }

    /// Pops the earliest timer whose due time is `<= now`.
    pub fn pop_due(&mut self, now: Millis) -> Option<(TimerId, T)> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.key.due <= now)
            .min_by_key(|(_, e)| e.key)
            .map(|(idx, _)| idx)?;
        let entry = self.entries.remove(idx);
        Some((entry.key.id, entry.payload))
    }

    /// Drops every pending timer and returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }
}
