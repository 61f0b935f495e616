//! Units moved by the transport

use core_types::{Credentials, HandleId, NodeId, PeerDescriptor, PeerId};
use ipc::{MessageType, Payload};
use std::os::fd::OwnedFd;

/// An outgoing message as handed to the transport
///
/// Handles are named by the sender's handle ids; the transport translates
/// them for each receiver. Descriptors are duplicated per destination, so the
/// sender keeps its own copies.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub kind: MessageType,
    pub header: &'a Payload,
    pub body: &'a Payload,
    pub handles: &'a [HandleId],
    pub fds: &'a [OwnedFd],
}

impl<'a> Frame<'a> {
    pub fn new(kind: MessageType, header: &'a Payload, body: &'a Payload) -> Self {
        Self {
            kind,
            header,
            body,
            handles: &[],
            fds: &[],
        }
    }

    pub fn with_handles(mut self, handles: &'a [HandleId]) -> Self {
        self.handles = handles;
        self
    }

    pub fn with_fds(mut self, fds: &'a [OwnedFd]) -> Self {
        self.fds = fds;
        self
    }

    /// Encoded bytes carried by header and body together
    pub fn payload_len(&self) -> usize {
        self.header.len() + self.body.len()
    }
}

/// A handle as seen by the receiving peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedHandle {
    /// The receiver's handle id
    pub id: HandleId,
    /// Set when the receiver owns the node the handle points at
    pub owned_node: Option<NodeId>,
}

/// A delivered message: payload, translated handles, descriptors and the
/// sender's credentials, always together
#[derive(Debug)]
pub struct Envelope {
    pub kind: MessageType,
    /// Node the message was addressed to; `None` for seeds
    pub destination: Option<NodeId>,
    pub header: Payload,
    pub body: Payload,
    pub handles: Vec<ReceivedHandle>,
    pub fds: Vec<OwnedFd>,
    pub credentials: Credentials,
}

/// Something waiting in a peer's receive queue
#[derive(Debug)]
pub enum Delivery {
    Message(Envelope),
    /// The node behind one of the receiver's handles was destroyed
    NodeDestroy { handle: HandleId },
    /// A node owned by the receiver was released and no handle refers to it anymore
    NodeRelease { node: NodeId },
}

/// A freshly established connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub peer: PeerId,
    pub descriptor: PeerDescriptor,
}

/// Result of cloning a peer: the child connection and its single handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClonedPeer {
    pub connection: Connection,
    pub handle: HandleId,
}
