//! Peers
//!
//! A [`Peer`] is one connection to the transport. It owns the registry of its
//! nodes, the pending reply slots, the subscriptions on its handles and the
//! root set delivered by its seed.
//!
//! Receiving and dispatching are separate steps: [`Peer::recv`] blocks until
//! something arrives, [`Message::dispatch`] runs the matching callback on the
//! caller's thread. [`Peer::dispatch_pending`] combines both without
//! blocking.

use crate::config::PeerConfig;
use crate::error::ERROR_DISCONNECTED;
use crate::handle::{Handle, HandleInner};
use crate::interface::Interface;
use crate::lock;
use crate::message::{Message, Route};
use crate::node::{Node, NodeInner, NodeKind};
use crate::slot::PendingReply;
use crate::{Error, Result};
use core_types::{HandleId, NodeId, PeerDescriptor, PeerId};
use kernel_api::{Connection, Delivery, KernelError, ReceivedHandle, Transport};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, trace, warn};

pub(crate) struct SubscriptionEntry {
    pub(crate) id: u64,
    pub(crate) handle: Handle,
    pub(crate) callback: Box<dyn FnOnce(&Handle) + Send>,
}

#[derive(Default)]
pub(crate) struct PeerState {
    /// Live nodes owned by this peer
    pub(crate) nodes: HashMap<NodeId, Arc<NodeInner>>,
    /// Owner handle id to node, for destroy notifications about own nodes
    pub(crate) owner_handles: HashMap<HandleId, NodeId>,
    /// At most one live handle object per remote kernel handle
    pub(crate) handles: HashMap<HandleId, Weak<HandleInner>>,
    pub(crate) reply_slots: HashMap<NodeId, PendingReply>,
    pub(crate) subscriptions: HashMap<HandleId, Vec<SubscriptionEntry>>,
    /// Seeded nodes of this peer not yet claimed by `implement`
    pub(crate) root_nodes: BTreeMap<String, NodeId>,
    /// Seeded capabilities pointing at other peers' nodes
    pub(crate) root_handles: BTreeMap<String, Handle>,
    pub(crate) next_subscription: u64,
}

pub(crate) struct PeerInner {
    pub(crate) id: PeerId,
    pub(crate) descriptor: PeerDescriptor,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) config: PeerConfig,
    pub(crate) state: Mutex<PeerState>,
    closed: AtomicBool,
}

impl PeerInner {
    /// Tears the peer down once. With `destroy` the kernel connection is
    /// closed and every node dies with it; without, the connection is left
    /// for someone else to attach to.
    fn shutdown(&self, this: &Weak<PeerInner>, destroy: bool) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let state = mem::take(&mut *lock(&self.state));

        if destroy {
            match self.transport.disconnect(self.id) {
                Ok(()) | Err(KernelError::UnknownPeer(_)) => {}
                Err(err) => warn!(peer = %self.id, %err, "disconnect failed"),
            }
        }

        let outstanding = state.reply_slots.len();
        for (slot, pending) in state.reply_slots {
            let error = Message::synthetic_error(this.clone(), self.id, ERROR_DISCONNECTED);
            if let Err(err) = (pending.callback)(&error) {
                debug!(peer = %self.id, %slot, %err, "reply callback failed during teardown");
            }
        }
        if destroy {
            for node in state.nodes.into_values() {
                Node::from_inner(node).mark_destroyed();
            }
        }
        debug!(peer = %self.id, destroy, outstanding, "peer shut down");
    }
}

impl Drop for PeerInner {
    fn drop(&mut self) {
        self.shutdown(&Weak::new(), true);
    }
}

/// Connection endpoint
///
/// Clones share the same connection. The connection is closed by
/// [`disconnect`](Self::disconnect) or when the last clone is dropped.
#[derive(Clone)]
pub struct Peer {
    pub(crate) inner: Arc<PeerInner>,
}

impl Peer {
    /// Opens a fresh connection.
    pub fn new(transport: Arc<dyn Transport>) -> Result<Peer> {
        Peer::with_config(transport, PeerConfig::default())
    }

    pub fn with_config(transport: Arc<dyn Transport>, config: PeerConfig) -> Result<Peer> {
        let connection = transport.connect().map_err(Error::from_kernel)?;
        Ok(Peer::from_connection(transport, connection, config))
    }

    /// Attaches to an inherited connection.
    pub fn new_from_fd(transport: Arc<dyn Transport>, descriptor: PeerDescriptor) -> Result<Peer> {
        Peer::from_fd_with_config(transport, descriptor, PeerConfig::default())
    }

    pub fn from_fd_with_config(
        transport: Arc<dyn Transport>,
        descriptor: PeerDescriptor,
        config: PeerConfig,
    ) -> Result<Peer> {
        let peer = transport.attach(descriptor).map_err(Error::from_kernel)?;
        Ok(Peer::from_connection(
            transport,
            Connection { peer, descriptor },
            config,
        ))
    }

    pub(crate) fn from_connection(
        transport: Arc<dyn Transport>,
        connection: Connection,
        config: PeerConfig,
    ) -> Peer {
        debug!(peer = %connection.peer, descriptor = %connection.descriptor, "peer opened");
        Peer {
            inner: Arc::new(PeerInner {
                id: connection.peer,
                descriptor: connection.descriptor,
                transport,
                config,
                state: Mutex::new(PeerState::default()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<PeerInner>) -> Peer {
        Peer { inner }
    }

    pub fn id(&self) -> PeerId {
        self.inner.id
    }

    /// Token another `Peer` can attach with
    pub fn descriptor(&self) -> PeerDescriptor {
        self.inner.descriptor
    }

    pub fn config(&self) -> &PeerConfig {
        &self.inner.config
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub fn is_connected(&self) -> bool {
        !self.inner.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::Disconnected)
        }
    }

    /// Creates a node carrying `userdata`.
    pub fn create_node<T: Any + Send + Sync>(&self, userdata: T) -> Result<Node> {
        let node = self.register_node(NodeKind::Regular)?;
        node.set_userdata(Arc::new(userdata))?;
        debug!(peer = %self.id(), node = %node.id(), "node created");
        Ok(node)
    }

    pub(crate) fn create_slot_node(&self) -> Result<Node> {
        self.register_node(NodeKind::ReplySlot)
    }

    fn register_node(&self, kind: NodeKind) -> Result<Node> {
        self.ensure_open()?;
        let (id, owner_handle) = self
            .inner
            .transport
            .create_node(self.id())
            .map_err(Error::from_kernel)?;
        let inner = Arc::new(NodeInner::new(&self.inner, id, owner_handle, kind));

        let mut state = lock(&self.inner.state);
        state.nodes.insert(id, Arc::clone(&inner));
        state.owner_handles.insert(owner_handle, id);
        Ok(Node::from_inner(inner))
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<Node> {
        lock(&self.inner.state)
            .nodes
            .get(&id)
            .cloned()
            .map(Node::from_inner)
    }

    /// Drops a destroyed node from the registry.
    pub(crate) fn forget_node(&self, id: NodeId) {
        let mut state = lock(&self.inner.state);
        if let Some(node) = state.nodes.remove(&id) {
            state.owner_handles.remove(&node.owner_handle);
        }
        state.root_nodes.retain(|_, root| *root != id);
    }

    pub(crate) fn has_root(&self, name: &str) -> bool {
        lock(&self.inner.state).root_nodes.contains_key(name)
    }

    /// Claims the seeded root node named after `interface` and makes it
    /// implement the interface.
    pub fn implement<T: Any + Send + Sync>(&self, interface: &Interface, userdata: T) -> Result<Node> {
        let name = interface.name();
        let node = {
            let state = lock(&self.inner.state);
            state
                .root_nodes
                .get(name)
                .and_then(|id| state.nodes.get(id))
                .cloned()
                .map(Node::from_inner)
        }
        .ok_or_else(|| Error::NotFound(format!("root node {name}")))?;

        node.implement(interface)?;
        node.set_userdata(Arc::new(userdata))?;
        lock(&self.inner.state).root_nodes.remove(name);
        Ok(node)
    }

    /// Seeded capability named `name` that points into another peer.
    pub fn root_handle(&self, name: &str) -> Option<Handle> {
        lock(&self.inner.state).root_handles.get(name).cloned()
    }

    /// Names of seeded root nodes nobody has implemented yet
    pub fn unclaimed_roots(&self) -> Vec<String> {
        lock(&self.inner.state).root_nodes.keys().cloned().collect()
    }

    /// Blocks until something arrives.
    pub fn recv(&self) -> Result<Message> {
        loop {
            self.ensure_open()?;
            let delivery = self
                .inner
                .transport
                .recv(self.id(), true)
                .map_err(Error::from_kernel)?;
            if let Some(delivery) = delivery {
                return self.import(delivery);
            }
        }
    }

    /// Returns the next queued message, if any.
    pub fn try_recv(&self) -> Result<Option<Message>> {
        self.ensure_open()?;
        let delivery = self
            .inner
            .transport
            .recv(self.id(), false)
            .map_err(Error::from_kernel)?;
        delivery.map(|delivery| self.import(delivery)).transpose()
    }

    /// Fetches the seed left on this connection, once.
    pub fn recv_seed(&self) -> Result<Option<Message>> {
        self.ensure_open()?;
        let seed = self
            .inner
            .transport
            .take_seed(self.id())
            .map_err(Error::from_kernel)?;
        seed.map(|envelope| self.import(Delivery::Message(envelope)))
            .transpose()
    }

    pub(crate) fn import(&self, delivery: Delivery) -> Result<Message> {
        match delivery {
            Delivery::Message(mut envelope) => {
                let handles = mem::take(&mut envelope.handles)
                    .into_iter()
                    .map(|received| self.import_handle(received))
                    .collect();
                let message = Message::received(self, envelope, handles)?;
                debug!(peer = %self.id(), kind = %message.kind(), "message received");
                Ok(message)
            }
            Delivery::NodeDestroy { handle } => {
                Ok(Message::notification(self, Route::Destroyed(handle)))
            }
            Delivery::NodeRelease { node } => {
                Ok(Message::notification(self, Route::Released(node)))
            }
        }
    }

    /// Turns a kernel handle reference into a [`Handle`], reusing the live
    /// object for that id if there is one.
    pub(crate) fn import_handle(&self, received: ReceivedHandle) -> Handle {
        if let Some(node) = received.owned_node {
            return self.owned_handle(node, received.id);
        }

        let mut state = lock(&self.inner.state);
        if let Some(existing) = state.handles.get(&received.id).and_then(Weak::upgrade) {
            drop(state);
            // the live object already holds a kernel reference
            if let Err(err) = self.inner.transport.release_handle(self.id(), received.id) {
                trace!(handle = %received.id, %err, "duplicate reference release failed");
            }
            return Handle::from_inner(existing);
        }

        let handle = Handle::remote(
            Arc::downgrade(&self.inner),
            self.id(),
            Arc::clone(&self.inner.transport),
            received.id,
        );
        state.handles.retain(|_, weak| weak.strong_count() > 0);
        state
            .handles
            .insert(received.id, Arc::downgrade(&handle.inner));
        trace!(peer = %self.id(), handle = %received.id, "handle imported");
        handle
    }

    /// Handle to a node this peer owns. Nodes handed over with the
    /// connection are adopted into the registry.
    fn owned_handle(&self, node: NodeId, owner_handle: HandleId) -> Handle {
        let inner = {
            let mut state = lock(&self.inner.state);
            match state.nodes.get(&node) {
                Some(inner) => Arc::clone(inner),
                None => {
                    let inner = Arc::new(NodeInner::new(
                        &self.inner,
                        node,
                        owner_handle,
                        NodeKind::Regular,
                    ));
                    state.nodes.insert(node, Arc::clone(&inner));
                    state.owner_handles.insert(owner_handle, node);
                    trace!(peer = %self.id(), %node, "node adopted");
                    inner
                }
            }
        };
        Node::from_inner(inner).handle()
    }

    /// Receives and dispatches queued messages without blocking, up to the
    /// configured maximum. Returns how many were handled.
    ///
    /// A message whose dispatch fails has still been handled; the failure
    /// is logged and draining continues.
    pub fn dispatch_pending(&self) -> Result<usize> {
        let mut handled = 0;
        while handled < self.inner.config.max_dispatch {
            let message = match self.try_recv() {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(Error::Codec(err)) => {
                    warn!(peer = %self.id(), %err, "dropping malformed delivery");
                    handled += 1;
                    continue;
                }
                Err(err) => return Err(err),
            };
            if let Err(err) = message.dispatch() {
                warn!(peer = %self.id(), kind = %message.kind(), %err, "dispatch failed");
            }
            handled += 1;
        }
        Ok(handled)
    }

    /// Creates a child peer whose only capability is a handle to the node
    /// behind `handle`. Returns the child and that handle.
    pub fn clone_peer(&self, handle: &Handle) -> Result<(Peer, Handle)> {
        self.ensure_open()?;
        if handle.peer_id() != self.id() {
            return Err(Error::InvalidState("handle belongs to another peer"));
        }
        let cloned = self
            .inner
            .transport
            .clone_peer(self.id(), handle.id())
            .map_err(Error::from_kernel)?;
        let child = Peer::from_connection(
            Arc::clone(&self.inner.transport),
            cloned.connection,
            self.inner.config.clone(),
        );
        let child_handle = child.import_handle(ReceivedHandle {
            id: cloned.handle,
            owned_node: None,
        });
        debug!(parent = %self.id(), child = %child.id(), "peer cloned");
        Ok((child, child_handle))
    }

    /// Closes the connection. Nodes are destroyed, outstanding reply slots
    /// receive a `capbus.Error.Disconnected` error, subscriptions are
    /// dropped unfired. Calling this again does nothing.
    pub fn disconnect(&self) {
        self.inner.shutdown(&Arc::downgrade(&self.inner), true);
    }

    /// Stops using the connection without closing it, so that another
    /// `Peer` can attach to the returned descriptor. Nodes stay alive in the
    /// kernel; outstanding reply slots fail as on disconnect.
    pub fn detach(&self) -> Result<PeerDescriptor> {
        self.ensure_open()?;
        self.inner.shutdown(&Arc::downgrade(&self.inner), false);
        Ok(self.inner.descriptor)
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("Peer")
            .field("id", &self.inner.id)
            .field("connected", &self.is_connected())
            .field("nodes", &state.nodes.len())
            .field("reply_slots", &state.reply_slots.len())
            .field("subscriptions", &state.subscriptions.len())
            .finish()
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Peer {}
