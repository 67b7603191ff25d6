//! Event ordering and the pending-event queue.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::fmt;

use super::Scheduler;
use crate::time::SimTime;

/// Deferred action executed when its event comes due.
///
/// Receives the simulated world and the scheduler so it can schedule or
/// cancel follow-up events.
pub type Action<W> = Box<dyn FnOnce(&mut W, &mut Scheduler<W>)>;

/// Handle identifying a scheduled event, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventHandle(u64);

impl EventHandle {
    /// Returns the insertion sequence number of the event.
    pub fn sequence(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event#{}", self.0)
    }
}

/// Ordering key for scheduled events.
///
/// Events are ordered by:
/// 1. Time (earlier first)
/// 2. Sequence number (insertion order for equal timestamps)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventKey {
    /// When this event should execute.
    pub time: SimTime,
    /// Monotonic tiebreaker assigned at insertion.
    pub sequence: u64,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.cmp(&other.time) {
            Ordering::Equal => self.sequence.cmp(&other.sequence),
            ord => ord,
        }
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Scheduled event: ordering key plus the action to run.
pub struct Event<W> {
    /// Ordering key
    pub key: EventKey,
    /// Deferred action
    pub action: Action<W>,
}

impl<W> Event<W> {
    /// Returns the handle of this event.
    pub fn handle(&self) -> EventHandle {
        EventHandle(self.key.sequence)
    }
}

impl<W> fmt::Debug for Event<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event").field("key", &self.key).finish()
    }
}

impl<W> PartialEq for Event<W> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<W> Eq for Event<W> {}

impl<W> Ord for Event<W> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behavior
        other.key.cmp(&self.key)
    }
}

impl<W> PartialOrd for Event<W> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending events ordered by (time, sequence).
///
/// Cancellation is lazy: a cancelled event stays in the heap until it reaches
/// the top, where it is discarded without running.
pub struct EventQueue<W> {
    heap: BinaryHeap<Event<W>>,
    pending: HashSet<EventHandle>,
    next_sequence: u64,
    cancelled_skipped: u64,
}

impl<W> Default for EventQueue<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> EventQueue<W> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            pending: HashSet::new(),
            next_sequence: 0,
            cancelled_skipped: 0,
        }
    }

    /// Inserts an action to run at `time`.
    pub fn push(&mut self, time: SimTime, action: Action<W>) -> EventHandle {
        let key = EventKey {
            time,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;

        let event = Event { key, action };
        let handle = event.handle();
        self.pending.insert(handle);
        self.heap.push(event);
        handle
    }

    /// Marks an event inert. Returns false if it already ran or was cancelled.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        self.pending.remove(&handle)
    }

    /// Returns true if the event is still waiting to run.
    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.pending.contains(&handle)
    }

    /// Removes and returns the earliest live event due at or before `limit`.
    ///
    /// Cancelled events encountered on the way are dropped.
    pub fn pop_due(&mut self, limit: Option<SimTime>) -> Option<Event<W>> {
        while let Some(top) = self.heap.peek() {
            if !self.pending.contains(&top.handle()) {
                self.heap.pop();
                self.cancelled_skipped += 1;
                continue;
            }
            if limit.is_some_and(|limit| top.key.time > limit) {
                return None;
            }

            let event = self.heap.pop()?;
            self.pending.remove(&event.handle());
            return Some(event);
        }
        None
    }

    /// Time of the earliest live event.
    pub fn next_time(&mut self) -> Option<SimTime> {
        while let Some(top) = self.heap.peek() {
            if self.pending.contains(&top.handle()) {
                return Some(top.key.time);
            }
            self.heap.pop();
            self.cancelled_skipped += 1;
        }
        None
    }

    /// Number of live (non-cancelled) events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if no live events remain.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of cancelled events discarded so far.
    pub fn cancelled_skipped(&self) -> u64 {
        self.cancelled_skipped
    }
}

impl<W> fmt::Debug for EventQueue<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("pending", &self.pending.len())
            .field("next_sequence", &self.next_sequence)
            .finish()
    }
}
