//! Bounded delivery queue for a peer.
//!
//! Provides deterministic FIFO ordering with explicit capacity limits.
//! Notifications generated by the bus itself bypass the limit, since the
//! state change they report has already happened.

use kernel_api::Delivery;
use std::collections::VecDeque;

/// Queue error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    Full,
}

/// Bounded FIFO queue of deliveries.
#[derive(Debug)]
pub struct MessageQueue {
    capacity: usize,
    deliveries: VecDeque<Delivery>,
}

impl MessageQueue {
    /// Creates a queue with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            deliveries: VecDeque::new(),
        }
    }

    /// Returns the configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    /// Returns remaining capacity.
    pub fn remaining_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.deliveries.len())
    }

    /// Pushes a message, respecting the capacity.
    pub fn push(&mut self, delivery: Delivery) -> Result<(), QueueError> {
        if self.deliveries.len() >= self.capacity {
            return Err(QueueError::Full);
        }
        self.deliveries.push_back(delivery);
        Ok(())
    }

    /// Pushes a bus-generated notification regardless of capacity.
    pub fn push_notification(&mut self, delivery: Delivery) {
        self.deliveries.push_back(delivery);
    }

    /// Pops the next delivery.
    pub fn pop(&mut self) -> Option<Delivery> {
        self.deliveries.pop_front()
    }
}
