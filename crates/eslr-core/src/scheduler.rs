//! The timer model of spec §5: "Model each scheduled action as
//! `(deadline, action, cancelled flag)`... Rescheduling a route's event
//! is 'cancel old, enqueue new'; the scheduler skips cancelled events at
//! dispatch time."
//!
//! `Timestamp` is a logical clock (duration since the router started)
//! rather than a wall-clock instant, so the engine stays deterministic
//! under test and agnostic to whatever executor a host embeds it in
//! (spec §9: "Two instances in the same test process must be
//! independently schedulable").

use rand::Rng;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

pub type Timestamp = Duration;

/// Handle to a scheduled action. Spec §5: "Every neighbor and every
/// non-local route owns at most one scheduled event (`EventId`)."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(u64);

/// Adds a uniform random jitter in `0..=max` to `deadline`, per spec §5
/// ("Every timer is armed with an additional uniform jitter").
pub fn jittered(base: Timestamp, max: Duration) -> Timestamp {
    if max.is_zero() {
        return base;
    }
    let extra_nanos = rand::thread_rng().gen_range(0..=max.as_nanos());
    base + Duration::from_nanos(extra_nanos as u64)
}

#[derive(Debug)]
struct QueueKey {
    deadline: Timestamp,
    seq: u64,
    id: EventId,
}

impl PartialEq for QueueKey {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl Eq for QueueKey {}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueKey {
    /// Events fire in non-decreasing timestamp order, and events with
    /// identical timestamps fire in insertion order (spec §5).
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// A deadline-ordered queue of cancellable actions of type `A`.
///
/// Generic over the action payload so the neighbor table, the route
/// table, and the protocol engine's cooldown timer can each keep their
/// own scheduler instance with their own action enum, rather than the
/// scheduler knowing about every domain type (spec §9's cyclic-reference
/// note: own collections, never back-pointers).
#[derive(Debug)]
pub struct Scheduler<A> {
    next_seq: u64,
    next_id: u64,
    // Min-heap by (deadline, seq); `Reverse` turns BinaryHeap's default
    // max-heap into the min-heap we want.
    queue: BinaryHeap<std::cmp::Reverse<QueueKey>>,
    actions: HashMap<EventId, A>,
}

impl<A> Default for Scheduler<A> {
    fn default() -> Self {
        Scheduler {
            next_seq: 0,
            next_id: 0,
            queue: BinaryHeap::new(),
            actions: HashMap::new(),
        }
    }
}

impl<A> Scheduler<A> {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&mut self) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Schedules `action` to fire at `deadline`. Returns the handle the
    /// caller must hold onto in order to cancel or reschedule it later.
    pub fn schedule(&mut self, deadline: Timestamp, action: A) -> EventId {
        let id = self.fresh_id();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(std::cmp::Reverse(QueueKey { deadline, seq, id }));
        self.actions.insert(id, action);
        id
    }

    /// Cancels a previously scheduled event. A cancelled event's queue
    /// entry is left in place (lazily skipped at dispatch) but its
    /// action is removed immediately, so "cancelled" is visible right
    /// away even though the heap entry lingers.
    pub fn cancel(&mut self, id: EventId) -> Option<A> {
        self.actions.remove(&id)
    }

    /// Cancels `old` (if any) and schedules `action` at `deadline`,
    /// implementing spec §5's "cancel old, enqueue new" rule in one call.
    pub fn reschedule(&mut self, old: Option<EventId>, deadline: Timestamp, action: A) -> EventId {
        if let Some(old_id) = old {
            self.cancel(old_id);
        }
        self.schedule(deadline, action)
    }

    /// True if an event is still live (not fired, not cancelled).
    pub fn is_pending(&self, id: EventId) -> bool {
        self.actions.contains_key(&id)
    }

    /// Pops and returns the next action whose deadline is `<= now`, in
    /// timestamp/insertion order, skipping any cancelled entries. Call
    /// repeatedly until it returns `None` to drain everything due at `now`.
    pub fn pop_due(&mut self, now: Timestamp) -> Option<(EventId, A)> {
        loop {
            let std::cmp::Reverse(top) = self.queue.peek()?;
            if top.deadline > now {
                return None;
            }
            let std::cmp::Reverse(key) = self.queue.pop().expect("peeked above");
            if let Some(action) = self.actions.remove(&key.id) {
                return Some((key.id, action));
            }
            // Cancelled: drop the stale queue entry and keep looking.
        }
    }

    /// Deadline of the next still-pending event, if any. A host uses
    /// this to size its own sleep between calls to `Router::advance`.
    /// Cancelled queue entries may still be present, so this scans for
    /// the earliest entry whose action has not been removed.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.queue
            .iter()
            .filter(|std::cmp::Reverse(k)| self.actions.contains_key(&k.id))
            .map(|std::cmp::Reverse(k)| (k.deadline, k.seq))
            .min()
            .map(|(deadline, _)| deadline)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_deadline_then_insertion_order() {
        let mut s: Scheduler<&'static str> = Scheduler::new();
        s.schedule(Duration::from_secs(5), "second-at-5");
        s.schedule(Duration::from_secs(1), "first-at-1");
        s.schedule(Duration::from_secs(5), "third-at-5-later-insert");

        let (_, a) = s.pop_due(Duration::from_secs(10)).unwrap();
        assert_eq!(a, "first-at-1");
        let (_, a) = s.pop_due(Duration::from_secs(10)).unwrap();
        assert_eq!(a, "second-at-5");
        let (_, a) = s.pop_due(Duration::from_secs(10)).unwrap();
        assert_eq!(a, "third-at-5-later-insert");
        assert!(s.pop_due(Duration::from_secs(10)).is_none());
    }

    #[test]
    fn cancelled_event_never_fires() {
        let mut s: Scheduler<&'static str> = Scheduler::new();
        let id = s.schedule(Duration::from_secs(1), "x");
        assert!(s.is_pending(id));
        s.cancel(id);
        assert!(!s.is_pending(id));
        assert!(s.pop_due(Duration::from_secs(100)).is_none());
    }

    #[test]
    fn reschedule_cancels_the_old_handle() {
        let mut s: Scheduler<&'static str> = Scheduler::new();
        let id1 = s.schedule(Duration::from_secs(1), "stale");
        let id2 = s.reschedule(Some(id1), Duration::from_secs(2), "fresh");
        assert!(!s.is_pending(id1));
        let (fired_id, action) = s.pop_due(Duration::from_secs(10)).unwrap();
        assert_eq!(fired_id, id2);
        assert_eq!(action, "fresh");
    }

    #[test]
    fn nothing_due_before_deadline() {
        let mut s: Scheduler<&'static str> = Scheduler::new();
        s.schedule(Duration::from_secs(10), "later");
        assert!(s.pop_due(Duration::from_secs(1)).is_none());
        assert!(s.pop_due(Duration::from_secs(10)).is_some());
    }
}
