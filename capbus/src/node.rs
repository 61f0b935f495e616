//! Locally owned endpoints
//!
//! A [`Node`] is owned by the peer that created it; the peer's registry keeps
//! it alive, so dropping a `Node` value does not release it. A node goes
//! away in one of two ways:
//!
//! - [`Node::destroy`] tears it down at once and notifies every holder
//! - [`Node::release`] gives up local ownership; the node is destroyed when
//!   the last remote handle to it is gone
//!
//! Either way the destroy callback runs exactly once.

use crate::handle::Handle;
use crate::interface::Interface;
use crate::lock;
use crate::peer::{Peer, PeerInner};
use crate::{Error, Result};
use core_types::{HandleId, NodeId, PeerId};
use kernel_api::{KernelError, Transport};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use tracing::debug;

type DestroyFn = Box<dyn FnOnce(&Node) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Regular,
    /// Receives the answer to one call
    ReplySlot,
}

pub(crate) struct NodeInner {
    pub(crate) id: NodeId,
    pub(crate) owner_handle: HandleId,
    pub(crate) kind: NodeKind,
    peer: Weak<PeerInner>,
    peer_id: PeerId,
    transport: Arc<dyn Transport>,
    handle: OnceLock<Handle>,
    userdata: OnceLock<Arc<dyn Any + Send + Sync>>,
    interface: OnceLock<Interface>,
    destroy_fn: Mutex<Option<DestroyFn>>,
    released: AtomicBool,
    destroyed: AtomicBool,
}

impl NodeInner {
    pub(crate) fn new(
        peer: &Arc<PeerInner>,
        id: NodeId,
        owner_handle: HandleId,
        kind: NodeKind,
    ) -> Self {
        Self {
            id,
            owner_handle,
            kind,
            peer: Arc::downgrade(peer),
            peer_id: peer.id,
            transport: Arc::clone(&peer.transport),
            handle: OnceLock::new(),
            userdata: OnceLock::new(),
            interface: OnceLock::new(),
            destroy_fn: Mutex::new(None),
            released: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        }
    }
}

/// Addressable endpoint owned by a peer
#[derive(Clone)]
pub struct Node {
    pub(crate) inner: Arc<NodeInner>,
}

impl Node {
    pub(crate) fn from_inner(inner: Arc<NodeInner>) -> Node {
        Node { inner }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// The owning peer, while it is alive.
    pub fn peer(&self) -> Option<Peer> {
        self.inner.peer.upgrade().map(Peer::from_inner)
    }

    /// The canonical handle to this node. Created on first use; every call
    /// returns the same handle.
    pub fn handle(&self) -> Handle {
        let handle = self
            .inner
            .handle
            .get_or_init(|| {
                Handle::local(
                    self.inner.peer.clone(),
                    self.inner.peer_id,
                    Arc::clone(&self.inner.transport),
                    self.inner.owner_handle,
                    self.inner.id,
                )
            })
            .clone();
        if self.is_destroyed() {
            handle.mark_gone();
        }
        handle
    }

    /// User data attached at creation, if it has type `T`.
    pub fn userdata<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(self.inner.userdata.get()?).downcast::<T>().ok()
    }

    pub(crate) fn set_userdata(&self, userdata: Arc<dyn Any + Send + Sync>) -> Result<()> {
        self.inner
            .userdata
            .set(userdata)
            .map_err(|_| Error::Busy("node already has user data"))
    }

    pub fn interface(&self) -> Option<Interface> {
        self.inner.interface.get().cloned()
    }

    pub(crate) fn is_reply_slot(&self) -> bool {
        self.inner.kind == NodeKind::ReplySlot
    }

    /// Makes this node answer calls on `interface`. A node implements at
    /// most one interface, and the interface's member table is frozen from
    /// here on.
    pub fn implement(&self, interface: &Interface) -> Result<()> {
        if self.is_reply_slot() {
            return Err(Error::Busy("reply slots do not implement interfaces"));
        }
        if self.is_destroyed() {
            return Err(Error::Gone);
        }
        self.inner
            .interface
            .set(interface.clone())
            .map_err(|_| Error::Busy("node already implements an interface"))?;
        interface.freeze();
        debug!(node = %self.id(), interface = interface.name(), "interface implemented");
        Ok(())
    }

    /// Sets the callback run once when the node is destroyed, replacing any
    /// earlier one.
    pub fn set_destroy_fn<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(&Node) + Send + 'static,
    {
        if self.is_destroyed() {
            return Err(Error::Gone);
        }
        *lock(&self.inner.destroy_fn) = Some(Box::new(callback));
        Ok(())
    }

    /// Gives up local ownership. The node stays reachable through existing
    /// handles and is destroyed once the last of them is released.
    pub fn release(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::Gone);
        }
        if self.inner.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner
            .transport
            .release_node(self.inner.peer_id, self.inner.id)
            .map_err(Error::from_kernel)
    }

    /// Destroys the node now: every holder is notified and their handles
    /// become dangling. Calling this again does nothing.
    pub fn destroy(&self) -> Result<()> {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self
            .inner
            .transport
            .destroy_node(self.inner.peer_id, self.inner.id);
        if let Some(peer) = self.peer() {
            peer.forget_node(self.inner.id);
        }
        debug!(node = %self.id(), "node destroyed");
        self.fire_destroy_fn();

        match result {
            Ok(()) | Err(KernelError::UnknownNode(_)) | Err(KernelError::UnknownPeer(_)) => Ok(()),
            Err(err) => Err(Error::from_kernel(err)),
        }
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Marks the node destroyed without touching the kernel, for nodes the
    /// kernel has already torn down.
    pub(crate) fn mark_destroyed(&self) {
        if !self.inner.destroyed.swap(true, Ordering::SeqCst) {
            self.fire_destroy_fn();
        }
    }

    fn fire_destroy_fn(&self) {
        if let Some(handle) = self.inner.handle.get() {
            handle.mark_gone();
        }
        let callback = lock(&self.inner.destroy_fn).take();
        if let Some(callback) = callback {
            callback(self);
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("interface", &self.inner.interface.get().map(Interface::name))
            .field("released", &self.is_released())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
