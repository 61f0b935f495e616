//! Capability Audit Trail
//!
//! This module records every handle and node lifecycle change made by the
//! local bus so tests can check how capabilities moved.
//!
//! ## Philosophy
//!
//! - Test-only: This is NOT production logging, it's for test verification
//! - Deterministic: Events are numbered in the order the bus applied them
//! - Queryable: Tests can assert on the trail to verify security properties
//!
//! ## Example
//!
//! ```
//! use sim_kernel::capability_audit::CapabilityAuditLog;
//! use core_types::{CapabilityEvent, PeerId};
//!
//! let mut audit_log = CapabilityAuditLog::new();
//! audit_log.record_event(CapabilityEvent::PeerConnected { peer: PeerId::new() });
//!
//! assert_eq!(audit_log.get_events().len(), 1);
//! assert_eq!(audit_log.get_events()[0].sequence, 0);
//! ```

use core_types::{CapabilityEvent, NodeId};

/// A single audit event with its position in the trail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityAuditEvent {
    /// Order in which the bus applied the change
    pub sequence: u64,
    pub event: CapabilityEvent,
}

/// Chronological record of capability events
#[derive(Debug, Clone, Default)]
pub struct CapabilityAuditLog {
    events: Vec<CapabilityAuditEvent>,
    next_sequence: u64,
}

impl CapabilityAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an event after every previously recorded one
    pub fn record_event(&mut self, event: CapabilityEvent) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.events.push(CapabilityAuditEvent { sequence, event });
    }

    pub fn get_events(&self) -> &[CapabilityAuditEvent] {
        &self.events
    }

    /// Returns events that concern a specific node
    pub fn get_events_for_node(&self, node: NodeId) -> Vec<&CapabilityAuditEvent> {
        self.events
            .iter()
            .filter(|e| e.event.node() == Some(node))
            .collect()
    }

    /// Counts events matching the predicate
    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&CapabilityEvent) -> bool,
    {
        self.events.iter().filter(|e| predicate(&e.event)).count()
    }

    /// Checks if any event matches the predicate
    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&CapabilityEvent) -> bool,
    {
        self.events.iter().any(|e| predicate(&e.event))
    }

    /// Clears all events (useful for test reset)
    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
