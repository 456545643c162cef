//! Bounded input event queue
//!
//! When full, the NEW event is dropped and counted; events already queued
//! keep their order.

use heapless::Deque;
use uson_protocol::InputEvent;

/// Default queue depth
pub const INPUT_QUEUE_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct InputQueue<const N: usize = INPUT_QUEUE_LEN> {
    events: Deque<InputEvent, N>,
    dropped: u32,
}

impl<const N: usize> Default for InputQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> InputQueue<N> {
    pub const fn new() -> Self {
        Self {
            events: Deque::new(),
            dropped: 0,
        }
    }

    /// Queue an event; returns false if it was dropped
    pub fn push(&mut self, event: InputEvent) -> bool {
        if self.events.push_back(event).is_err() {
            self.dropped = self.dropped.wrapping_add(1);
            return false;
        }
        true
    }

    pub fn pop(&mut self) -> Option<InputEvent> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.events.is_full()
    }

    /// Events dropped because the queue was full
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.dropped = 0;
    }
}
