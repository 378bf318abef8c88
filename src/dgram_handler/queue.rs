//! Bounded FIFO of payloads awaiting transmission.

use std::collections::VecDeque;

use crate::encoder::PendingPayload;

/// In-memory delivery queue owned by the worker thread.
///
/// The queue never holds more than `capacity` entries. Admitting a new entry
/// into a full queue evicts the oldest one; the newest is never refused.
#[derive(Debug)]
pub struct DeliveryQueue {
    entries: VecDeque<PendingPayload>,
    capacity: usize,
}

impl DeliveryQueue {
    /// Create an empty queue. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append `payload` at the tail, returning the evicted head if the queue
    /// was full.
    pub fn push(&mut self, payload: PendingPayload) -> Option<PendingPayload> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(payload);
        evicted
    }

    /// Return a payload to the head after a failed flush attempt.
    ///
    /// The head is the oldest position, so a full queue rejects the payload
    /// and hands it back as the eviction.
    pub fn push_front(&mut self, payload: PendingPayload) -> Option<PendingPayload> {
        if self.entries.len() >= self.capacity {
            return Some(payload);
        }
        self.entries.push_front(payload);
        None
    }

    /// Remove and return the oldest payload.
    pub fn pop(&mut self) -> Option<PendingPayload> {
        self.entries.pop_front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingPayload> {
        self.entries.iter()
    }

    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }
}
