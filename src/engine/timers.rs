//! Cancellable one-shot deadlines.
//!
//! The engine never sleeps per timer. It keeps every pending deadline here,
//! the run loop sleeps until [`TimerQueue::next_deadline`], and due entries
//! are popped in deadline order on the same task that handles input edges.
//! That keeps a timer and a real edge for the same button strictly ordered.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug)]
pub struct TimerQueue<T> {
    next_id: u64,
    // (deadline, id) keeps same-deadline entries in scheduling order
    entries: BTreeMap<(Instant, TimerId), T>,
    deadlines: HashMap<TimerId, Instant>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, deadline: Instant, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.entries.insert((deadline, id), payload);
        self.deadlines.insert(id, deadline);
        id
    }

    /// Removes a pending timer. Cancelling a fired or unknown id is a no-op.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id) {
            Some(deadline) => self.entries.remove(&(deadline, id)).is_some(),
            None => false,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Earliest entry with `deadline <= now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerId, Instant, T)> {
        self.pop_if(|deadline| deadline <= now)
    }

    /// Earliest entry with `deadline < at`. Used before handling an edge
    /// stamped `at`, so a timer due at the same instant runs after it.
    pub fn pop_before(&mut self, at: Instant) -> Option<(TimerId, Instant, T)> {
        self.pop_if(|deadline| deadline < at)
    }

    fn pop_if(&mut self, due: impl Fn(Instant) -> bool) -> Option<(TimerId, Instant, T)> {
        let key = *self.entries.keys().next()?;
        if !due(key.0) {
            return None;
        }
        let payload = self.entries.remove(&key)?;
        self.deadlines.remove(&key.1);
        Some((key.1, key.0, payload))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.deadlines.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn pops_in_deadline_order() {
        let t0 = Instant::now();
        let mut queue = TimerQueue::new();
        queue.schedule(t0 + ms(30), "late");
        queue.schedule(t0 + ms(10), "early");
        queue.schedule(t0 + ms(10), "early-second");

        assert_eq!(queue.next_deadline(), Some(t0 + ms(10)));
        let fired: Vec<_> = std::iter::from_fn(|| queue.pop_due(t0 + ms(20)))
            .map(|(_, _, p)| p)
            .collect();
        assert_eq!(fired, vec!["early", "early-second"]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn cancel_is_idempotent() {
        let t0 = Instant::now();
        let mut queue = TimerQueue::new();
        let id = queue.schedule(t0 + ms(5), ());
        assert!(queue.cancel(id));
        assert!(!queue.cancel(id));
        assert!(queue.pop_due(t0 + ms(100)).is_none());

        let fired = queue.schedule(t0 + ms(5), ());
        assert!(queue.pop_due(t0 + ms(5)).is_some());
        assert!(!queue.cancel(fired));
    }

    #[test]
    fn pop_before_is_strict() {
        let t0 = Instant::now();
        let mut queue = TimerQueue::new();
        queue.schedule(t0 + ms(10), ());
        assert!(queue.pop_before(t0 + ms(10)).is_none());
        assert!(queue.pop_due(t0 + ms(10)).is_some());
        assert!(queue.is_empty());
    }
}
