//! Bounded in-memory buffer of pending events.
//!
//! The queue keeps insertion order and, when a capacity is configured,
//! evicts the oldest record before appending a new one. Draining happens
//! only through [`EventQueue::take_all`], which hands the whole buffer to a
//! single flush.

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::types::Event;

pub struct EventQueue {
    events: Mutex<VecDeque<Event>>,
    capacity: Option<usize>,
}

impl EventQueue {
    /// Create a queue. `None` means unbounded.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Append an event, evicting the oldest one first when full.
    ///
    /// Returns the queue length after the insert. A capacity of zero still
    /// holds the single most recent event.
    pub fn push(&self, event: Event) -> usize {
        let mut events = self.events.lock();

        if let Some(capacity) = self.capacity {
            if events.len() >= capacity {
                if let Some(dropped) = events.pop_front() {
                    tracing::warn!(
                        kind = dropped.kind(),
                        capacity,
                        "Event queue full, dropping oldest event"
                    );
                }
            }
        }

        events.push_back(event);
        events.len()
    }

    /// Atomically empty the queue and return its contents in order.
    pub fn take_all(&self) -> Vec<Event> {
        let mut events = self.events.lock();
        std::mem::take(&mut *events).into()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Copy of the queued events (for debugging).
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().iter().cloned().collect()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::unbounded()
    }
}
