//! # Simulated Kernel
//!
//! This crate provides an in-process implementation of the transport API.
//!
//! ## Purpose
//!
//! The local bus lets peers talk without a kernel module:
//! - Runs under `cargo test`
//! - Thread-safe (one lock, one condition variable for blocking receives)
//! - Inspectable (queue depths, handle references and an audit trail)
//!
//! ## Philosophy
//!
//! **Testability is a first-class design constraint.**
//!
//! This is not a mock. It implements the same capability rules a kernel
//! transport would: per-peer handle translation, reference-counted node
//! liveness, destruction notifications to every holder, and all-or-nothing
//! delivery of payload, handles and descriptors.

pub mod capability_audit;
pub mod config;
pub mod message_queue;

pub use config::BusConfig;

use capability_audit::CapabilityAuditLog;
use core_types::{CapabilityEvent, Credentials, HandleId, NodeId, PeerDescriptor, PeerId};
use kernel_api::{
    ClonedPeer, Connection, Delivery, Envelope, Frame, KernelError, ReceivedHandle, Transport,
};
use message_queue::MessageQueue;
use std::collections::{HashMap, HashSet};
use std::os::fd::OwnedFd;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// In-process transport shared by any number of peers
pub struct LocalBus {
    config: BusConfig,
    state: Mutex<BusState>,
    ready: Condvar,
}

#[derive(Default)]
struct BusState {
    peers: HashMap<PeerId, PeerSlot>,
    descriptors: HashMap<PeerDescriptor, PeerId>,
    nodes: HashMap<NodeId, NodeSlot>,
    last_id: u64,
    audit: CapabilityAuditLog,
}

struct PeerSlot {
    descriptor: PeerDescriptor,
    credentials: Credentials,
    queue: MessageQueue,
    handles: HashMap<HandleId, HandleEntry>,
    by_node: HashMap<NodeId, HandleId>,
    seed: Option<Envelope>,
}

#[derive(Debug, Clone, Copy)]
struct HandleEntry {
    node: NodeId,
    refs: u32,
    /// The owner's handle carries no references
    owner: bool,
}

struct NodeSlot {
    owner: PeerId,
    owner_handle: HandleId,
    /// Peers other than the owner that hold a handle
    holders: HashSet<PeerId>,
    released: bool,
    release_sent: bool,
    destroyed: bool,
}

impl BusState {
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    fn peer(&self, peer: PeerId) -> Result<&PeerSlot, KernelError> {
        self.peers.get(&peer).ok_or(KernelError::UnknownPeer(peer))
    }

    fn peer_mut(&mut self, peer: PeerId) -> Result<&mut PeerSlot, KernelError> {
        self.peers
            .get_mut(&peer)
            .ok_or(KernelError::UnknownPeer(peer))
    }

    fn add_peer(&mut self, config: &BusConfig) -> Connection {
        let peer = PeerId::new();
        let descriptor = PeerDescriptor::new(self.next_id());
        self.peers.insert(
            peer,
            PeerSlot {
                descriptor,
                credentials: config.credentials,
                queue: MessageQueue::with_capacity(config.queue_capacity),
                handles: HashMap::new(),
                by_node: HashMap::new(),
                seed: None,
            },
        );
        self.descriptors.insert(descriptor, peer);
        self.audit
            .record_event(CapabilityEvent::PeerConnected { peer });
        Connection { peer, descriptor }
    }

    fn resolve(&self, peer: PeerId, handle: HandleId) -> Result<NodeId, KernelError> {
        self.peer(peer)?
            .handles
            .get(&handle)
            .map(|entry| entry.node)
            .ok_or(KernelError::UnknownHandle(handle))
    }

    fn is_live(&self, node: NodeId) -> bool {
        self.nodes.get(&node).map_or(false, |slot| !slot.destroyed)
    }

    /// Resolves attached handles; every one must point at a live node.
    fn resolve_attachments(
        &self,
        peer: PeerId,
        handles: &[HandleId],
    ) -> Result<Vec<NodeId>, KernelError> {
        handles
            .iter()
            .map(|&handle| {
                let node = self.resolve(peer, handle)?;
                if self.is_live(node) {
                    Ok(node)
                } else {
                    Err(KernelError::NodeGone)
                }
            })
            .collect()
    }

    /// Gives `holder` one reference to `node`, reusing its existing handle id.
    fn grant(
        &mut self,
        holder: PeerId,
        node: NodeId,
        from: PeerId,
    ) -> Result<ReceivedHandle, KernelError> {
        let owner = self
            .nodes
            .get(&node)
            .map(|slot| slot.owner)
            .ok_or(KernelError::UnknownNode(node))?;
        let existing = self.peer(holder)?.by_node.get(&node).copied();
        let id = match existing {
            Some(id) => id,
            None => HandleId::new(self.next_id()),
        };

        let slot = self.peer_mut(holder)?;
        let entry = slot.handles.entry(id).or_insert(HandleEntry {
            node,
            refs: 0,
            owner: false,
        });
        let is_owner = entry.owner;
        if !is_owner {
            entry.refs += 1;
        }
        slot.by_node.insert(node, id);

        if !is_owner {
            if let Some(node_slot) = self.nodes.get_mut(&node) {
                node_slot.holders.insert(holder);
            }
            self.audit.record_event(CapabilityEvent::HandleGranted {
                node,
                holder,
                handle: id,
                from,
            });
            trace!(%node, %holder, handle = %id, "handle granted");
        }

        Ok(ReceivedHandle {
            id,
            owned_node: (owner == holder).then_some(node),
        })
    }

    /// Drops one reference `peer` holds on `handle`.
    fn release(&mut self, peer: PeerId, handle: HandleId) -> Result<(), KernelError> {
        let slot = self.peer_mut(peer)?;
        let entry = slot
            .handles
            .get_mut(&handle)
            .ok_or(KernelError::UnknownHandle(handle))?;
        if entry.owner {
            return Ok(());
        }

        entry.refs = entry.refs.saturating_sub(1);
        let node = entry.node;
        let remaining = entry.refs;
        if remaining == 0 {
            slot.handles.remove(&handle);
            slot.by_node.remove(&node);
        }

        self.audit.record_event(CapabilityEvent::HandleReleased {
            node,
            holder: peer,
            handle,
            remaining,
        });
        if remaining == 0 {
            self.drop_holder(node, peer);
        }
        Ok(())
    }

    fn drop_holder(&mut self, node: NodeId, holder: PeerId) {
        let Some(slot) = self.nodes.get_mut(&node) else {
            return;
        };
        slot.holders.remove(&holder);
        if !slot.holders.is_empty() {
            return;
        }
        if slot.destroyed {
            self.nodes.remove(&node);
        } else {
            self.notify_release(node);
        }
    }

    /// Tells the owner its released node has no holders left, once.
    fn notify_release(&mut self, node: NodeId) {
        let Some(slot) = self.nodes.get_mut(&node) else {
            return;
        };
        if slot.destroyed || !slot.released || slot.release_sent || !slot.holders.is_empty() {
            return;
        }
        slot.release_sent = true;
        let owner = slot.owner;

        if let Some(peer) = self.peers.get_mut(&owner) {
            peer.queue
                .push_notification(Delivery::NodeRelease { node });
        }
        self.audit
            .record_event(CapabilityEvent::NodeReleased { node, owner });
        debug!(%node, %owner, "node released");
    }

    /// Marks `node` destroyed and notifies every holder and the owner.
    fn destroy(&mut self, node: NodeId) {
        let Some(slot) = self.nodes.get_mut(&node) else {
            return;
        };
        if slot.destroyed {
            return;
        }
        slot.destroyed = true;
        let owner = slot.owner;
        let owner_handle = slot.owner_handle;
        let holders: Vec<PeerId> = slot.holders.iter().copied().collect();

        let mut notified = Vec::with_capacity(holders.len() + 1);
        for holder in &holders {
            if let Some(peer) = self.peers.get_mut(holder) {
                if let Some(&handle) = peer.by_node.get(&node) {
                    peer.queue
                        .push_notification(Delivery::NodeDestroy { handle });
                    notified.push(*holder);
                }
            }
        }
        if let Some(peer) = self.peers.get_mut(&owner) {
            peer.handles.remove(&owner_handle);
            peer.by_node.remove(&node);
            peer.queue.push_notification(Delivery::NodeDestroy {
                handle: owner_handle,
            });
            notified.push(owner);
        }
        if holders.is_empty() {
            self.nodes.remove(&node);
        }

        debug!(%node, %owner, notified = notified.len(), "node destroyed");
        self.audit.record_event(CapabilityEvent::NodeDestroyed {
            node,
            owner,
            notified,
        });
    }
}

fn duplicate(fds: &[OwnedFd]) -> Result<Vec<OwnedFd>, KernelError> {
    fds.iter()
        .map(|fd| {
            fd.try_clone()
                .map_err(|e| KernelError::DescriptorDup(e.to_string()))
        })
        .collect()
}

impl LocalBus {
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BusState::default()),
            ready: Condvar::new(),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_limits(&self, frame: &Frame<'_>) -> Result<(), KernelError> {
        if frame.handles.len() > self.config.max_handles {
            return Err(KernelError::QuotaExceeded(format!(
                "{} handles attached, limit is {}",
                frame.handles.len(),
                self.config.max_handles
            )));
        }
        if frame.fds.len() > self.config.max_fds {
            return Err(KernelError::QuotaExceeded(format!(
                "{} descriptors attached, limit is {}",
                frame.fds.len(),
                self.config.max_fds
            )));
        }
        if frame.payload_len() > self.config.max_payload_bytes {
            return Err(KernelError::QuotaExceeded(format!(
                "{} payload bytes, limit is {}",
                frame.payload_len(),
                self.config.max_payload_bytes
            )));
        }
        Ok(())
    }

    /// Snapshot of the capability audit trail
    pub fn audit_log(&self) -> CapabilityAuditLog {
        self.lock().audit.clone()
    }

    pub fn is_connected(&self, peer: PeerId) -> bool {
        self.lock().peers.contains_key(&peer)
    }

    /// Number of deliveries waiting for `peer`
    pub fn pending(&self, peer: PeerId) -> usize {
        self.lock().peers.get(&peer).map_or(0, |slot| slot.queue.len())
    }

    /// Whether `node` exists and has not been destroyed
    pub fn node_is_live(&self, node: NodeId) -> bool {
        self.lock().is_live(node)
    }

    /// References `peer` holds on `handle`; `None` if it holds none
    pub fn handle_refs(&self, peer: PeerId, handle: HandleId) -> Option<u32> {
        let state = self.lock();
        let entry = state.peers.get(&peer)?.handles.get(&handle)?;
        (!entry.owner).then_some(entry.refs)
    }

    /// Number of foreign handles `peer` currently holds
    pub fn handle_count(&self, peer: PeerId) -> usize {
        self.lock().peers.get(&peer).map_or(0, |slot| {
            slot.handles.values().filter(|entry| !entry.owner).count()
        })
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for LocalBus {
    fn connect(&self) -> Result<Connection, KernelError> {
        let connection = self.lock().add_peer(&self.config);
        debug!(peer = %connection.peer, "peer connected");
        Ok(connection)
    }

    fn attach(&self, descriptor: PeerDescriptor) -> Result<PeerId, KernelError> {
        self.lock()
            .descriptors
            .get(&descriptor)
            .copied()
            .ok_or(KernelError::UnknownDescriptor(descriptor))
    }

    fn create_node(&self, peer: PeerId) -> Result<(NodeId, HandleId), KernelError> {
        let mut state = self.lock();
        state.peer(peer)?;
        let node = NodeId::new(state.next_id());
        let handle = HandleId::new(state.next_id());

        let slot = state.peer_mut(peer)?;
        slot.handles.insert(
            handle,
            HandleEntry {
                node,
                refs: 0,
                owner: true,
            },
        );
        slot.by_node.insert(node, handle);
        state.nodes.insert(
            node,
            NodeSlot {
                owner: peer,
                owner_handle: handle,
                holders: HashSet::new(),
                released: false,
                release_sent: false,
                destroyed: false,
            },
        );
        state.audit.record_event(CapabilityEvent::NodeCreated {
            node,
            owner: peer,
            handle,
        });
        Ok((node, handle))
    }

    fn release_node(&self, peer: PeerId, node: NodeId) -> Result<(), KernelError> {
        let mut state = self.lock();
        let slot = state
            .nodes
            .get_mut(&node)
            .ok_or(KernelError::UnknownNode(node))?;
        if slot.owner != peer {
            return Err(KernelError::NotOwner(node));
        }
        slot.released = true;
        state.notify_release(node);
        drop(state);
        self.ready.notify_all();
        Ok(())
    }

    fn destroy_node(&self, peer: PeerId, node: NodeId) -> Result<(), KernelError> {
        let mut state = self.lock();
        let slot = state
            .nodes
            .get(&node)
            .ok_or(KernelError::UnknownNode(node))?;
        if slot.owner != peer {
            return Err(KernelError::NotOwner(node));
        }
        state.destroy(node);
        drop(state);
        self.ready.notify_all();
        Ok(())
    }

    fn release_handle(&self, peer: PeerId, handle: HandleId) -> Result<(), KernelError> {
        let mut state = self.lock();
        state.release(peer, handle)?;
        drop(state);
        self.ready.notify_all();
        Ok(())
    }

    fn send(
        &self,
        peer: PeerId,
        destinations: &[HandleId],
        frame: Frame<'_>,
    ) -> Result<usize, KernelError> {
        self.check_limits(&frame)?;
        let mut state = self.lock();
        let credentials = state.peer(peer)?.credentials;
        let attached = state.resolve_attachments(peer, frame.handles)?;

        let mut targets = Vec::with_capacity(destinations.len());
        for &destination in destinations {
            let node = state.resolve(peer, destination)?;
            match state.nodes.get(&node) {
                Some(slot) if !slot.destroyed => targets.push((node, slot.owner)),
                _ => trace!(%node, "skipping destroyed destination"),
            }
        }
        if targets.is_empty() {
            return if destinations.is_empty() {
                Ok(0)
            } else {
                Err(KernelError::NodeGone)
            };
        }

        // nothing is committed until every destination is known to fit
        let mut per_owner: HashMap<PeerId, usize> = HashMap::new();
        for (_, owner) in &targets {
            *per_owner.entry(*owner).or_default() += 1;
        }
        for (owner, count) in &per_owner {
            if state.peer(*owner)?.queue.remaining_capacity() < *count {
                return Err(KernelError::QueueFull(*owner));
            }
        }
        let mut fds = Vec::with_capacity(targets.len());
        for _ in &targets {
            fds.push(duplicate(frame.fds)?);
        }

        for ((node, owner), fds) in targets.iter().zip(fds) {
            let handles = attached
                .iter()
                .map(|&attached_node| state.grant(*owner, attached_node, peer))
                .collect::<Result<Vec<_>, _>>()?;
            let envelope = Envelope {
                kind: frame.kind,
                destination: Some(*node),
                header: frame.header.clone(),
                body: frame.body.clone(),
                handles,
                fds,
                credentials,
            };
            state
                .peer_mut(*owner)?
                .queue
                .push(Delivery::Message(envelope))
                .map_err(|_| KernelError::QueueFull(*owner))?;
            debug!(from = %peer, to = %owner, %node, kind = %frame.kind, "message queued");
        }

        drop(state);
        self.ready.notify_all();
        Ok(targets.len())
    }

    fn set_seed(&self, peer: PeerId, frame: Frame<'_>) -> Result<(), KernelError> {
        self.check_limits(&frame)?;
        let mut state = self.lock();
        let credentials = state.peer(peer)?.credentials;
        let attached = state.resolve_attachments(peer, frame.handles)?;
        let fds = duplicate(frame.fds)?;

        let handles = attached
            .iter()
            .map(|&node| state.grant(peer, node, peer))
            .collect::<Result<Vec<_>, _>>()?;
        let seed = Envelope {
            kind: frame.kind,
            destination: None,
            header: frame.header.clone(),
            body: frame.body.clone(),
            handles,
            fds,
            credentials,
        };

        if let Some(previous) = state.peer_mut(peer)?.seed.replace(seed) {
            for handle in previous.handles.iter().filter(|h| h.owned_node.is_none()) {
                state.release(peer, handle.id)?;
            }
        }
        debug!(%peer, "seed stored");
        Ok(())
    }

    fn take_seed(&self, peer: PeerId) -> Result<Option<Envelope>, KernelError> {
        Ok(self.lock().peer_mut(peer)?.seed.take())
    }

    fn recv(&self, peer: PeerId, wait: bool) -> Result<Option<Delivery>, KernelError> {
        let mut state = self.lock();
        loop {
            let slot = state
                .peers
                .get_mut(&peer)
                .ok_or(KernelError::Disconnected)?;
            if let Some(delivery) = slot.queue.pop() {
                return Ok(Some(delivery));
            }
            if !wait {
                return Ok(None);
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn clone_peer(&self, peer: PeerId, handle: HandleId) -> Result<ClonedPeer, KernelError> {
        let mut state = self.lock();
        let node = state.resolve(peer, handle)?;
        if !state.is_live(node) {
            return Err(KernelError::NodeGone);
        }
        let connection = state.add_peer(&self.config);
        let received = state.grant(connection.peer, node, peer)?;
        debug!(parent = %peer, child = %connection.peer, %node, "peer cloned");
        Ok(ClonedPeer {
            connection,
            handle: received.id,
        })
    }

    fn disconnect(&self, peer: PeerId) -> Result<(), KernelError> {
        let mut state = self.lock();
        let slot = state
            .peers
            .remove(&peer)
            .ok_or(KernelError::UnknownPeer(peer))?;
        state.descriptors.remove(&slot.descriptor);

        // queued deliveries and the seed are dropped with the slot; their
        // references are covered by removing every handle entry below
        let owned: Vec<NodeId> = state
            .nodes
            .iter()
            .filter(|(_, node)| node.owner == peer)
            .map(|(id, _)| *id)
            .collect();
        for node in owned {
            state.destroy(node);
        }
        for entry in slot.handles.values().filter(|entry| !entry.owner) {
            state.drop_holder(entry.node, peer);
        }

        state
            .audit
            .record_event(CapabilityEvent::PeerDisconnected { peer });
        drop(state);
        self.ready.notify_all();
        debug!(%peer, "peer disconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipc::{MessageType, Payload};
    use std::sync::Arc;
    use std::thread;

    fn call_header() -> Payload {
        Payload::encode("s", &["ping".into()]).unwrap()
    }

    fn send_simple(
        bus: &LocalBus,
        from: PeerId,
        to: &[HandleId],
        attach: &[HandleId],
    ) -> Result<usize, KernelError> {
        let header = call_header();
        let body = Payload::empty();
        let frame = Frame::new(MessageType::Call, &header, &body).with_handles(attach);
        bus.send(from, to, frame)
    }

    fn expect_message(bus: &LocalBus, peer: PeerId) -> Envelope {
        match bus.recv(peer, false).unwrap() {
            Some(Delivery::Message(envelope)) => envelope,
            other => panic!("expected message, got {:?}", other),
        }
    }

    /// Connects `a` and `b` and gives `b` a handle to a node owned by `a`.
    fn linked(bus: &LocalBus) -> (PeerId, PeerId, NodeId, HandleId) {
        let a = bus.connect().unwrap().peer;
        let (node, owner_handle) = bus.create_node(a).unwrap();
        let b_root = bus.clone_peer(a, owner_handle).unwrap();
        (a, b_root.connection.peer, node, b_root.handle)
    }

    #[test]
    fn test_connect_and_attach() {
        let bus = LocalBus::new();
        let conn = bus.connect().unwrap();
        assert_eq!(bus.attach(conn.descriptor).unwrap(), conn.peer);
        assert!(bus.attach(PeerDescriptor::new(999)).is_err());
    }

    #[test]
    fn test_send_reaches_owner() {
        let bus = LocalBus::new();
        let (a, b, node, handle) = linked(&bus);

        assert_eq!(send_simple(&bus, b, &[handle], &[]).unwrap(), 1);
        let envelope = expect_message(&bus, a);
        assert_eq!(envelope.destination, Some(node));
        assert_eq!(envelope.kind, MessageType::Call);
        assert_eq!(envelope.credentials, bus.config().credentials);
    }

    #[test]
    fn test_handle_translation_marks_owned_nodes() {
        let bus = LocalBus::new();
        let (a, b, node, handle) = linked(&bus);

        // b sends a's own node back to a: a recognizes it as owned
        send_simple(&bus, b, &[handle], &[handle]).unwrap();
        let envelope = expect_message(&bus, a);
        assert_eq!(envelope.handles[0].owned_node, Some(node));

        // b's node travels to a as a foreign handle with one reference
        let (b_node, b_handle) = bus.create_node(b).unwrap();
        send_simple(&bus, b, &[handle], &[b_handle]).unwrap();
        let envelope = expect_message(&bus, a);
        let received = envelope.handles[0];
        assert_eq!(received.owned_node, None);
        assert_eq!(bus.handle_refs(a, received.id), Some(1));
        assert!(bus.node_is_live(b_node));
    }

    #[test]
    fn test_same_node_reuses_handle_id() {
        let bus = LocalBus::new();
        let (a, b, _node, handle) = linked(&bus);
        let (_, b_handle) = bus.create_node(b).unwrap();

        send_simple(&bus, b, &[handle], &[b_handle]).unwrap();
        send_simple(&bus, b, &[handle], &[b_handle]).unwrap();
        let first = expect_message(&bus, a).handles[0].id;
        let second = expect_message(&bus, a).handles[0].id;
        assert_eq!(first, second);
        assert_eq!(bus.handle_refs(a, first), Some(2));
    }

    #[test]
    fn test_release_notifies_owner_after_last_handle() {
        let bus = LocalBus::new();
        let (a, b, node, handle) = linked(&bus);

        bus.release_node(a, node).unwrap();
        assert_eq!(bus.pending(a), 0);

        bus.release_handle(b, handle).unwrap();
        match bus.recv(a, false).unwrap() {
            Some(Delivery::NodeRelease { node: released }) => assert_eq!(released, node),
            other => panic!("expected release, got {:?}", other),
        }
        assert!(bus.audit_log().has_event(|e| matches!(
            e,
            CapabilityEvent::NodeReleased { node: n, .. } if *n == node
        )));
    }

    #[test]
    fn test_release_without_holders_notifies_immediately() {
        let bus = LocalBus::new();
        let a = bus.connect().unwrap().peer;
        let (node, _) = bus.create_node(a).unwrap();
        bus.release_node(a, node).unwrap();
        assert!(matches!(
            bus.recv(a, false).unwrap(),
            Some(Delivery::NodeRelease { .. })
        ));
    }

    #[test]
    fn test_destroy_notifies_holders_and_leaves_dangling_handle() {
        let bus = LocalBus::new();
        let (a, b, node, handle) = linked(&bus);

        bus.destroy_node(a, node).unwrap();
        assert!(!bus.node_is_live(node));
        match bus.recv(b, false).unwrap() {
            Some(Delivery::NodeDestroy { handle: h }) => assert_eq!(h, handle),
            other => panic!("expected destroy, got {:?}", other),
        }
        assert!(matches!(
            bus.recv(a, false).unwrap(),
            Some(Delivery::NodeDestroy { .. })
        ));

        assert_eq!(
            send_simple(&bus, b, &[handle], &[]),
            Err(KernelError::NodeGone)
        );
        bus.release_handle(b, handle).unwrap();
        assert_eq!(bus.handle_count(b), 0);
    }

    #[test]
    fn test_destroy_requires_ownership() {
        let bus = LocalBus::new();
        let (_a, b, node, _handle) = linked(&bus);
        assert_eq!(bus.destroy_node(b, node), Err(KernelError::NotOwner(node)));
    }

    #[test]
    fn test_send_is_all_or_nothing() {
        let bus = LocalBus::with_config(BusConfig::default().with_queue_capacity(1));
        let (a, b, _node, handle) = linked(&bus);
        let (b_node, b_handle) = bus.create_node(b).unwrap();

        // two destinations on a, but a can queue only one message
        let result = send_simple(&bus, b, &[handle, handle], &[b_handle]);
        assert_eq!(result, Err(KernelError::QueueFull(a)));
        assert_eq!(bus.pending(a), 0);
        assert!(!bus.audit_log().has_event(|e| matches!(
            e,
            CapabilityEvent::HandleGranted { node, .. } if *node == b_node
        )));

        assert_eq!(send_simple(&bus, b, &[handle], &[b_handle]).unwrap(), 1);
        assert_eq!(bus.pending(a), 1);
    }

    #[test]
    fn test_gone_destinations_are_skipped() {
        let bus = LocalBus::new();
        let (a, b, first, first_for_b) = linked(&bus);
        let (_, second) = bus.create_node(a).unwrap();

        // route a handle to `second` over to b through a node b owns
        let (_, b_inbox) = bus.create_node(b).unwrap();
        send_simple(&bus, b, &[first_for_b], &[b_inbox]).unwrap();
        let inbox_for_a = expect_message(&bus, a).handles[0].id;
        send_simple(&bus, a, &[inbox_for_a], &[second]).unwrap();
        let second_for_b = expect_message(&bus, b).handles[0].id;

        bus.destroy_node(a, first).unwrap();
        while bus.recv(a, false).unwrap().is_some() {}

        let reached = send_simple(&bus, b, &[first_for_b, second_for_b], &[]).unwrap();
        assert_eq!(reached, 1);
        assert_eq!(
            send_simple(&bus, b, &[first_for_b], &[]),
            Err(KernelError::NodeGone)
        );
        assert_eq!(send_simple(&bus, b, &[], &[]), Ok(0));
    }

    #[test]
    fn test_quota_limits() {
        let bus = LocalBus::with_config(BusConfig::default().with_max_handles(1));
        let (_a, b, _node, handle) = linked(&bus);
        let result = send_simple(&bus, b, &[handle], &[handle, handle]);
        assert!(matches!(result, Err(KernelError::QuotaExceeded(_))));
    }

    #[test]
    fn test_descriptors_are_duplicated_per_destination() {
        let bus = LocalBus::new();
        let (a, b, _node, handle) = linked(&bus);
        let file = tempfile::tempfile().unwrap();
        let fds = [OwnedFd::from(file)];

        let header = call_header();
        let body = Payload::empty();
        let frame = Frame::new(MessageType::Call, &header, &body).with_fds(&fds);
        bus.send(b, &[handle, handle], frame).unwrap();

        let first = expect_message(&bus, a);
        let second = expect_message(&bus, a);
        assert_eq!(first.fds.len(), 1);
        assert_eq!(second.fds.len(), 1);
        use std::os::fd::AsRawFd;
        assert_ne!(first.fds[0].as_raw_fd(), second.fds[0].as_raw_fd());
        assert_ne!(first.fds[0].as_raw_fd(), fds[0].as_raw_fd());
    }

    #[test]
    fn test_seed_roundtrip() {
        let bus = LocalBus::new();
        let a = bus.connect().unwrap();
        let (node, handle) = bus.create_node(a.peer).unwrap();

        let header = Payload::encode("a(su)", &[ipc::Value::array(
            ipc::Type::parse("(su)").unwrap(),
            vec![ipc::Value::Struct(vec!["root".into(), 0u32.into()])],
        )])
        .unwrap();
        let body = Payload::empty();
        let handles = [handle];
        let frame = Frame::new(MessageType::Seed, &header, &body).with_handles(&handles);
        bus.set_seed(a.peer, frame).unwrap();

        let attached = bus.attach(a.descriptor).unwrap();
        let seed = bus.take_seed(attached).unwrap().unwrap();
        assert_eq!(seed.kind, MessageType::Seed);
        assert_eq!(seed.handles[0].owned_node, Some(node));
        assert!(bus.take_seed(attached).unwrap().is_none());
    }

    #[test]
    fn test_disconnect_destroys_owned_nodes_and_releases_handles() {
        let bus = LocalBus::new();
        let (a, b, node, handle) = linked(&bus);
        let (b_node, b_handle) = bus.create_node(b).unwrap();
        send_simple(&bus, b, &[handle], &[b_handle]).unwrap();

        bus.disconnect(a).unwrap();
        assert!(!bus.is_connected(a));
        assert!(!bus.node_is_live(node));
        assert!(bus.node_is_live(b_node));
        assert!(matches!(
            bus.recv(b, false).unwrap(),
            Some(Delivery::NodeDestroy { handle: h }) if h == handle
        ));
        assert_eq!(bus.recv(a, false).unwrap_err(), KernelError::Disconnected);

        // a's reference to b_node went away with it
        bus.release_node(b, b_node).unwrap();
        assert!(matches!(
            bus.recv(b, false).unwrap(),
            Some(Delivery::NodeRelease { node: n }) if n == b_node
        ));
        assert!(bus.audit_log().has_event(|e| matches!(
            e,
            CapabilityEvent::PeerDisconnected { peer } if *peer == a
        )));
    }

    #[test]
    fn test_blocking_recv_wakes_on_send() {
        let bus = Arc::new(LocalBus::new());
        let (a, b, _node, handle) = linked(&bus);

        let receiver = {
            let bus = Arc::clone(&bus);
            thread::spawn(move || matches!(bus.recv(a, true), Ok(Some(Delivery::Message(_)))))
        };
        send_simple(&bus, b, &[handle], &[]).unwrap();
        assert!(receiver.join().unwrap());
    }

    #[test]
    fn test_blocking_recv_wakes_on_disconnect() {
        let bus = Arc::new(LocalBus::new());
        let a = bus.connect().unwrap().peer;

        let receiver = {
            let bus = Arc::clone(&bus);
            thread::spawn(move || bus.recv(a, true))
        };
        thread::sleep(std::time::Duration::from_millis(20));
        bus.disconnect(a).unwrap();
        assert_eq!(receiver.join().unwrap().unwrap_err(), KernelError::Disconnected);
    }
}
