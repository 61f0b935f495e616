//! Kernel error types

use core_types::{HandleId, NodeId, PeerDescriptor, PeerId};
use thiserror::Error;

/// Errors that can occur when interacting with the transport
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KernelError {
    /// Peer is not connected
    #[error("Peer not connected: {0}")]
    UnknownPeer(PeerId),

    /// Descriptor does not name a live connection
    #[error("Invalid peer descriptor: {0}")]
    UnknownDescriptor(PeerDescriptor),

    /// Handle is not held by the calling peer
    #[error("Invalid handle: {0}")]
    UnknownHandle(HandleId),

    /// Node is not known to the calling peer
    #[error("Invalid node: {0}")]
    UnknownNode(NodeId),

    /// Operation requires ownership of the node
    #[error("Peer does not own {0}")]
    NotOwner(NodeId),

    /// Target node has been destroyed
    #[error("Node has been destroyed")]
    NodeGone,

    /// Destination queue is full
    #[error("Message queue full for {0}")]
    QueueFull(PeerId),

    /// Per-message limit exceeded
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Peer has been disconnected
    #[error("Peer disconnected")]
    Disconnected,

    /// Attached descriptor could not be duplicated
    #[error("Failed to duplicate descriptor: {0}")]
    DescriptorDup(String),

    /// Malformed request
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
