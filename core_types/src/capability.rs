//! Capability lifecycle events
//!
//! The transport records one event per capability state change. The events
//! exist so tests can assert that handles are granted, translated and
//! released in the expected order, and that node destruction reaches every
//! holder.

use crate::ids::{HandleId, NodeId, PeerId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapabilityEvent {
    /// A peer connected to the transport
    PeerConnected { peer: PeerId },

    /// A node was created; `handle` is the owner's handle to it
    NodeCreated {
        node: NodeId,
        owner: PeerId,
        handle: HandleId,
    },

    /// A handle reference was granted to `holder` by a delivered message
    HandleGranted {
        node: NodeId,
        holder: PeerId,
        handle: HandleId,
        from: PeerId,
    },

    /// A handle reference was dropped; `remaining` counts what the holder still has
    HandleReleased {
        node: NodeId,
        holder: PeerId,
        handle: HandleId,
        remaining: u32,
    },

    /// The owner released a node and no foreign handle refers to it anymore
    NodeReleased { node: NodeId, owner: PeerId },

    /// A node was destroyed; `notified` lists the holders that were told
    NodeDestroyed {
        node: NodeId,
        owner: PeerId,
        notified: Vec<PeerId>,
    },

    /// A peer was disconnected and its resources reclaimed
    PeerDisconnected { peer: PeerId },
}

impl CapabilityEvent {
    /// Returns the node an event refers to, if any
    pub fn node(&self) -> Option<NodeId> {
        match self {
            CapabilityEvent::NodeCreated { node, .. }
            | CapabilityEvent::HandleGranted { node, .. }
            | CapabilityEvent::HandleReleased { node, .. }
            | CapabilityEvent::NodeReleased { node, .. }
            | CapabilityEvent::NodeDestroyed { node, .. } => Some(*node),
            CapabilityEvent::PeerConnected { .. } | CapabilityEvent::PeerDisconnected { .. } => {
                None
            }
        }
    }
}
