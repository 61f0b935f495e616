//! The transport trait

use crate::error::KernelError;
use crate::frame::{ClonedPeer, Connection, Delivery, Envelope, Frame};
use core_types::{HandleId, NodeId, PeerDescriptor, PeerId};

/// Kernel-side operations the capability bus relies on
///
/// Implementations must be safe to share across threads: every peer may be
/// driven from its own thread against the same transport.
///
/// # Delivery guarantees
///
/// - A send either reaches every live destination with all of its handles and
///   descriptors, or reaches none of them.
/// - Each peer's queue is FIFO.
/// - Credentials on a delivery are those of the sending connection.
///
/// # Handle accounting
///
/// Every [`ReceivedHandle`](crate::ReceivedHandle) in a delivery carries one
/// reference that the receiver must eventually give back with
/// [`release_handle`](Transport::release_handle). Handles to nodes the
/// receiver owns carry no reference.
pub trait Transport: Send + Sync {
    /// Opens a new connection.
    fn connect(&self) -> Result<Connection, KernelError>;

    /// Resolves an inherited descriptor to its connection.
    fn attach(&self, descriptor: PeerDescriptor) -> Result<PeerId, KernelError>;

    /// Creates a node owned by `peer`; returns the node and the owner's handle to it.
    fn create_node(&self, peer: PeerId) -> Result<(NodeId, HandleId), KernelError>;

    /// Marks `node` as released by its owner. Once no other peer holds a
    /// handle to it, the owner receives [`Delivery::NodeRelease`].
    fn release_node(&self, peer: PeerId, node: NodeId) -> Result<(), KernelError>;

    /// Destroys `node`. Every holder, the owner included, receives
    /// [`Delivery::NodeDestroy`] for its handle.
    fn destroy_node(&self, peer: PeerId, node: NodeId) -> Result<(), KernelError>;

    /// Drops one reference on a handle held by `peer`.
    fn release_handle(&self, peer: PeerId, handle: HandleId) -> Result<(), KernelError>;

    /// Sends `frame` to the nodes behind `destinations`. Destinations whose
    /// node is already gone are skipped; returns how many were reached.
    fn send(
        &self,
        peer: PeerId,
        destinations: &[HandleId],
        frame: Frame<'_>,
    ) -> Result<usize, KernelError>;

    /// Stores `frame` as the seed of `peer`, replacing any previous seed.
    fn set_seed(&self, peer: PeerId, frame: Frame<'_>) -> Result<(), KernelError>;

    /// Takes the seed of `peer`, if one was stored.
    fn take_seed(&self, peer: PeerId) -> Result<Option<Envelope>, KernelError>;

    /// Dequeues the next delivery. With `wait` set this blocks until one
    /// arrives or the peer is disconnected.
    fn recv(&self, peer: PeerId, wait: bool) -> Result<Option<Delivery>, KernelError>;

    /// Creates a child connection whose only capability is a handle to the
    /// node behind `handle`.
    fn clone_peer(&self, peer: PeerId, handle: HandleId) -> Result<ClonedPeer, KernelError>;

    /// Tears down a connection: queued deliveries are dropped, owned nodes
    /// destroyed and held handles released.
    fn disconnect(&self, peer: PeerId) -> Result<(), KernelError>;
}
