//! Routing of received messages
//!
//! CALLs go to the interface member of their destination node, REPLY and
//! ERROR to the reply slot of their destination node, NODE_DESTROY to the
//! subscriptions on the named handle, SEED to the peer's root set.
//!
//! A CALL that cannot be routed is answered with a named error when the
//! caller asked for a reply; a REPLY or ERROR without a pending slot has
//! nobody to tell and is dropped with a warning. Either way the failure is
//! also returned to whoever called `dispatch`.

use crate::error::{
    ERROR_ERRNO, ERROR_INVALID_INTERFACE, ERROR_INVALID_MEMBER, ERROR_INVALID_MESSAGE_TYPE,
    ERROR_INVALID_SIGNATURE, ERROR_MISSING_ROOT_INTERFACE,
};
use crate::handle::Handle;
use crate::lock;
use crate::message::{Message, Route};
use crate::node::Node;
use crate::peer::Peer;
use crate::{Error, Result};
use core_types::{HandleId, NodeId};
use ipc::MessageType;
use std::collections::BTreeMap;
use std::mem;
use tracing::{debug, warn};

pub(crate) fn dispatch(peer: &Peer, message: &Message) -> Result<()> {
    match message.route() {
        Route::Outgoing => Err(Error::InvalidState("message was not received")),
        Route::Node(node) => match message.kind() {
            MessageType::Call => call(peer, node, message),
            MessageType::Reply | MessageType::Error => reply(peer, node, message),
            MessageType::NodeDestroy | MessageType::Seed => {
                Err(Error::Rejected(ERROR_INVALID_MESSAGE_TYPE))
            }
        },
        Route::Destroyed(handle) => {
            destroyed(peer, handle);
            Ok(())
        }
        Route::Released(node) => {
            if let Some(node) = peer.node(node) {
                node.destroy()?;
            }
            Ok(())
        }
        Route::Seed => seed(peer, message),
    }
}

fn call(peer: &Peer, node: NodeId, message: &Message) -> Result<()> {
    let result = invoke(peer, node, message);
    if let Err(err) = &result {
        debug!(peer = %peer.id(), %node, %err, "call failed");
        if let Err(reply_err) = send_error(peer, message, err) {
            warn!(peer = %peer.id(), %node, err = %reply_err, "error reply not sent");
        }
    }
    result
}

fn invoke(peer: &Peer, id: NodeId, message: &Message) -> Result<()> {
    let node = peer.node(id).ok_or(Error::Gone)?;
    if node.is_reply_slot() {
        return Err(Error::Rejected(ERROR_INVALID_MESSAGE_TYPE));
    }

    let name = message.interface().unwrap_or_default();
    let interface = match node.interface() {
        Some(interface) if interface.name() == name => interface,
        _ if peer.has_root(&name) => return Err(Error::Rejected(ERROR_MISSING_ROOT_INTERFACE)),
        _ => return Err(Error::Rejected(ERROR_INVALID_INTERFACE)),
    };

    let member = message.member().unwrap_or_default();
    let member = interface
        .member(&member)
        .ok_or(Error::Rejected(ERROR_INVALID_MEMBER))?;
    if message.signature() != member.input {
        return Err(Error::Rejected(ERROR_INVALID_SIGNATURE));
    }

    debug!(
        peer = %peer.id(),
        node = %id,
        interface = interface.name(),
        member = message.member().unwrap_or_default(),
        "dispatching call"
    );
    (member.handler)(&node, message)
}

/// Answers a failed call. Routing failures carry their own error name,
/// everything else is reported as `capbus.Error.Errno` with the code.
fn send_error(peer: &Peer, message: &Message, err: &Error) -> Result<()> {
    if message.reply_handle().is_none() {
        return Ok(());
    }
    let error = match err {
        Error::Rejected(name) => Message::new_error(peer, name, "")?,
        other => {
            let error = Message::new_error(peer, ERROR_ERRNO, "u")?;
            error.write("u", &[other.errno().unsigned_abs().into()])?;
            error
        }
    };
    message.reply(&error)
}

fn reply(peer: &Peer, id: NodeId, message: &Message) -> Result<()> {
    let pending = lock(&peer.inner.state).reply_slots.remove(&id);
    let Some(pending) = pending else {
        warn!(peer = %peer.id(), slot = %id, kind = %message.kind(), "no pending call, dropping answer");
        return Err(Error::NotFound(format!("reply slot {id}")));
    };
    if let Some(node) = peer.node(id) {
        node.destroy()?;
    }

    if message.kind() == MessageType::Reply && message.signature() != pending.signature {
        warn!(
            peer = %peer.id(),
            slot = %id,
            expected = %pending.signature,
            found = %message.signature(),
            "reply signature mismatch"
        );
        let error = Message::synthetic_error(
            std::sync::Arc::downgrade(&peer.inner),
            message.peer_id(),
            ERROR_INVALID_SIGNATURE,
        );
        (pending.callback)(&error)?;
        return Err(Error::Rejected(ERROR_INVALID_SIGNATURE));
    }

    debug!(peer = %peer.id(), slot = %id, kind = %message.kind(), "reply delivered");
    (pending.callback)(message)
}

fn destroyed(peer: &Peer, handle: HandleId) {
    let (node, remote, subscriptions) = {
        let mut state = lock(&peer.inner.state);
        let owned = state.owner_handles.remove(&handle);
        let node = owned.and_then(|id| state.nodes.remove(&id));
        if let Some(node) = &node {
            state.root_nodes.retain(|_, root| *root != node.id);
        }
        let remote = state.handles.remove(&handle).and_then(|weak| weak.upgrade());
        let subscriptions = state.subscriptions.remove(&handle).unwrap_or_default();
        (node, remote, subscriptions)
    };

    if let Some(node) = node {
        Node::from_inner(node).mark_destroyed();
    }
    if let Some(remote) = remote {
        Handle::from_inner(remote).mark_gone();
    }
    debug!(peer = %peer.id(), %handle, subscriptions = subscriptions.len(), "node destroyed");
    for entry in subscriptions {
        entry.handle.mark_gone();
        (entry.callback)(&entry.handle);
    }
}

fn seed(peer: &Peer, message: &Message) -> Result<()> {
    let mut nodes = BTreeMap::new();
    let mut handles = BTreeMap::new();
    for (name, handle) in message.seed_roots()? {
        if nodes.contains_key(&name) || handles.contains_key(&name) {
            return Err(Error::Duplicate { kind: "root", name });
        }
        match handle.node_id() {
            Some(node) => {
                nodes.insert(name, node);
            }
            None => {
                handles.insert(name, handle);
            }
        }
    }

    debug!(
        peer = %peer.id(),
        nodes = nodes.len(),
        handles = handles.len(),
        "seed installed"
    );
    let previous = {
        let mut state = lock(&peer.inner.state);
        state.root_nodes = nodes;
        mem::replace(&mut state.root_handles, handles)
    };
    drop(previous);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ENOENT;
    use crate::Interface;
    use sim_kernel::LocalBus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn answers() -> (Arc<Mutex<Vec<String>>>, impl Fn(&Message) -> Result<()> + Clone) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let callback = move |reply: &Message| {
            let entry = reply
                .error_name()
                .unwrap_or_else(|| format!("{}", reply.kind()));
            log.lock().unwrap().push(entry);
            Ok(())
        };
        (seen, callback)
    }

    fn echo_node(peer: &Peer) -> Node {
        let interface = Interface::new("test.Echo");
        interface
            .add_member("echo", "u", "u", |node, call| {
                let peer = node.peer().ok_or(Error::Disconnected)?;
                let value = call.read_one("u")?;
                let reply = Message::new_reply(&peer, "u")?;
                reply.write("u", &[value])?;
                call.reply(&reply)
            })
            .unwrap();
        interface
            .add_member("fail", "", "", |_, _| Err(Error::NotFound("thing".into())))
            .unwrap();
        let node = peer.create_node(()).unwrap();
        node.implement(&interface).unwrap();
        node
    }

    #[test]
    fn test_call_and_reply() {
        let peer = Peer::new(Arc::new(LocalBus::new())).unwrap();
        let node = echo_node(&peer);
        let (seen, callback) = answers();

        let (call, slot) =
            Message::new_call_with_reply(&peer, "test.Echo", "echo", "u", "u", callback).unwrap();
        call.write("u", &[7u32.into()]).unwrap();
        call.send(&[&node.handle()]).unwrap();

        peer.dispatch_pending().unwrap();
        assert_eq!(*seen.lock().unwrap(), ["REPLY"]);
        assert!(!slot.is_pending());
    }

    #[test]
    fn test_unknown_interface_answers_with_error() {
        let peer = Peer::new(Arc::new(LocalBus::new())).unwrap();
        let node = echo_node(&peer);
        let (seen, callback) = answers();

        let (call, _slot) =
            Message::new_call_with_reply(&peer, "test.Other", "echo", "u", "u", callback).unwrap();
        call.write("u", &[1u32.into()]).unwrap();
        call.send(&[&node.handle()]).unwrap();

        let received = peer.try_recv().unwrap().unwrap();
        assert!(matches!(
            received.dispatch(),
            Err(Error::Rejected(ERROR_INVALID_INTERFACE))
        ));
        peer.dispatch_pending().unwrap();
        assert_eq!(*seen.lock().unwrap(), [ERROR_INVALID_INTERFACE]);
    }

    #[test]
    fn test_unknown_member_and_bad_signature() {
        let peer = Peer::new(Arc::new(LocalBus::new())).unwrap();
        let node = echo_node(&peer);
        let (seen, callback) = answers();

        let (missing, _a) =
            Message::new_call_with_reply(&peer, "test.Echo", "nope", "", "", callback.clone())
                .unwrap();
        missing.send(&[&node.handle()]).unwrap();
        let (mistyped, _b) =
            Message::new_call_with_reply(&peer, "test.Echo", "echo", "s", "u", callback).unwrap();
        mistyped.write("s", &["seven".into()]).unwrap();
        mistyped.send(&[&node.handle()]).unwrap();

        peer.dispatch_pending().unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            [ERROR_INVALID_MEMBER, ERROR_INVALID_SIGNATURE]
        );
    }

    #[test]
    fn test_handler_error_carries_code() {
        let peer = Peer::new(Arc::new(LocalBus::new())).unwrap();
        let node = echo_node(&peer);
        let code = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&code);

        let (call, _slot) =
            Message::new_call_with_reply(&peer, "test.Echo", "fail", "", "", move |reply| {
                assert_eq!(reply.error_name().as_deref(), Some(ERROR_ERRNO));
                observed.store(reply.errno().unwrap_or(0) as usize, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        call.send(&[&node.handle()]).unwrap();

        peer.dispatch_pending().unwrap();
        assert_eq!(code.load(Ordering::SeqCst), ENOENT.unsigned_abs() as usize);
    }

    #[test]
    fn test_reply_signature_mismatch_consumes_slot() {
        let bus = Arc::new(LocalBus::new());
        let peer = Peer::new(bus).unwrap();
        let node = echo_node(&peer);
        let (seen, callback) = answers();

        // echo answers with `u` but the caller expects `s`
        let (call, slot) =
            Message::new_call_with_reply(&peer, "test.Echo", "echo", "u", "s", callback).unwrap();
        call.write("u", &[3u32.into()]).unwrap();
        call.send(&[&node.handle()]).unwrap();

        let call = peer.try_recv().unwrap().unwrap();
        call.dispatch().unwrap();
        let reply = peer.try_recv().unwrap().unwrap();
        assert!(matches!(
            reply.dispatch(),
            Err(Error::Rejected(ERROR_INVALID_SIGNATURE))
        ));
        assert_eq!(*seen.lock().unwrap(), [ERROR_INVALID_SIGNATURE]);
        assert!(!slot.is_pending());
    }

    #[test]
    fn test_outgoing_message_cannot_be_dispatched() {
        let peer = Peer::new(Arc::new(LocalBus::new())).unwrap();
        let message = Message::new_reply(&peer, "").unwrap();
        assert!(matches!(message.dispatch(), Err(Error::InvalidState(_))));
    }
}
