//! Local bus configuration

use core_types::Credentials;

/// Default per-peer queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default limit on handles attached to one message
pub const DEFAULT_MAX_HANDLES: usize = 256;

/// Default limit on descriptors attached to one message
pub const DEFAULT_MAX_FDS: usize = 64;

/// Default limit on header plus body bytes of one message
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1 << 20;

/// Limits and identity used by a [`LocalBus`](crate::LocalBus)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Messages a peer may have queued before senders get `QueueFull`
    pub queue_capacity: usize,
    pub max_handles: usize,
    pub max_fds: usize,
    pub max_payload_bytes: usize,
    /// Credentials stamped on every delivery from connections of this bus
    pub credentials: Credentials,
}

impl BusConfig {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_max_handles(mut self, max: usize) -> Self {
        self.max_handles = max;
        self
    }

    pub fn with_max_fds(mut self, max: usize) -> Self {
        self.max_fds = max;
        self
    }

    pub fn with_max_payload_bytes(mut self, max: usize) -> Self {
        self.max_payload_bytes = max;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_handles: DEFAULT_MAX_HANDLES,
            max_fds: DEFAULT_MAX_FDS,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            credentials: Credentials::current_process(),
        }
    }
}
