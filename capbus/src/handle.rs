//! Capabilities
//!
//! A [`Handle`] is a peer's reference to a node, which may be owned by the
//! same peer or by any other. Handles are what messages carry. Each peer
//! holds at most one live `Handle` object per kernel handle id; clones share
//! it, and the kernel reference is given back when the last clone drops.

use crate::lock;
use crate::node::Node;
use crate::peer::{PeerInner, SubscriptionEntry};
use crate::subscription::Subscription;
use crate::{Error, Result};
use core_types::{HandleId, NodeId, PeerId};
use kernel_api::Transport;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

pub(crate) struct HandleInner {
    id: HandleId,
    peer: Weak<PeerInner>,
    peer_id: PeerId,
    transport: Arc<dyn Transport>,
    /// Set when the handle's peer owns the node
    local: Option<NodeId>,
    gone: AtomicBool,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        // the owner's own handle carries no kernel reference
        if self.local.is_some() {
            return;
        }
        if let Err(err) = self.transport.release_handle(self.peer_id, self.id) {
            trace!(handle = %self.id, %err, "handle release skipped");
        }
    }
}

/// Reference-counted capability pointing at one node
#[derive(Clone)]
pub struct Handle {
    pub(crate) inner: Arc<HandleInner>,
}

impl Handle {
    pub(crate) fn local(
        peer: Weak<PeerInner>,
        peer_id: PeerId,
        transport: Arc<dyn Transport>,
        id: HandleId,
        node: NodeId,
    ) -> Handle {
        Handle::from_parts(peer, peer_id, transport, id, Some(node))
    }

    pub(crate) fn remote(
        peer: Weak<PeerInner>,
        peer_id: PeerId,
        transport: Arc<dyn Transport>,
        id: HandleId,
    ) -> Handle {
        Handle::from_parts(peer, peer_id, transport, id, None)
    }

    fn from_parts(
        peer: Weak<PeerInner>,
        peer_id: PeerId,
        transport: Arc<dyn Transport>,
        id: HandleId,
        local: Option<NodeId>,
    ) -> Handle {
        Handle {
            inner: Arc::new(HandleInner {
                id,
                peer,
                peer_id,
                transport,
                local,
                gone: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<HandleInner>) -> Handle {
        Handle { inner }
    }

    /// Kernel handle id, as seen by the holding peer
    pub fn id(&self) -> HandleId {
        self.inner.id
    }

    /// The peer holding this handle
    pub fn peer_id(&self) -> PeerId {
        self.inner.peer_id
    }

    /// Whether the holding peer owns the node
    pub fn is_local(&self) -> bool {
        self.inner.local.is_some()
    }

    /// The node id, known only to its owner.
    pub fn node_id(&self) -> Option<NodeId> {
        self.inner.local
    }

    /// The node itself, if the holding peer owns it and it still exists.
    pub fn node(&self) -> Option<Node> {
        let node = self.inner.local?;
        let peer = self.inner.peer.upgrade()?;
        let inner = lock(&peer.state).nodes.get(&node).cloned()?;
        Some(Node::from_inner(inner))
    }

    /// Whether a destruction notification for this handle has been dispatched.
    pub fn is_gone(&self) -> bool {
        self.inner.gone.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_gone(&self) {
        self.inner.gone.store(true, Ordering::SeqCst);
    }

    /// Registers `callback` to run once when the node behind this handle
    /// becomes unreachable.
    ///
    /// The callback runs from [`Message::dispatch`](crate::Message::dispatch)
    /// of the matching NODE_DESTROY notification.
    pub fn subscribe<F>(&self, callback: F) -> Result<Subscription>
    where
        F: FnOnce(&Handle) + Send + 'static,
    {
        if self.is_gone() {
            return Err(Error::Gone);
        }
        let peer = self.inner.peer.upgrade().ok_or(Error::Disconnected)?;
        let mut state = lock(&peer.state);
        state.next_subscription += 1;
        let id = state.next_subscription;
        state
            .subscriptions
            .entry(self.id())
            .or_default()
            .push(SubscriptionEntry {
                id,
                handle: self.clone(),
                callback: Box::new(callback),
            });
        trace!(handle = %self.id(), subscription = id, "subscribed");
        Ok(Subscription::new(id, self.id(), Arc::downgrade(&peer)))
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Handle {}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.inner.id)
            .field("peer", &self.inner.peer_id)
            .field("local", &self.inner.local)
            .field("gone", &self.is_gone())
            .finish()
    }
}
