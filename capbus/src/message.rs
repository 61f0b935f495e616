//! Messages
//!
//! A [`Message`] is built with the cursor API (`write`, `begin`, `end`),
//! sealed, and sent to one or more handles. A received message is sealed
//! from the start and is read with `read`, `enter`, `exit` and `peek_count`.
//!
//! Handles and descriptors are attached out of band: `append_handle` and
//! `append_fd` return the index to embed in the payload as an `h` or `f`
//! value, and the receiver resolves it with `get_handle` / `get_fd`.

use crate::dispatch;
use crate::error::ERROR_ERRNO;
use crate::handle::Handle;
use crate::lock;
use crate::peer::{Peer, PeerInner};
use crate::slot::ReplySlot;
use crate::{Error, Result};
use core_types::{Credentials, HandleId, NodeId, PeerId};
use ipc::{CodecError, CodecLimits, MessageType, Payload, Reader, Signature, Type, Value, Writer};
use kernel_api::{Envelope, Frame};
use std::fmt;
use std::os::fd::{BorrowedFd, OwnedFd};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// Where a message came from, for dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    /// Built locally
    Outgoing,
    /// Delivered to a node of the receiving peer
    Node(NodeId),
    /// The node behind one of the receiver's handles is gone
    Destroyed(HandleId),
    /// A released node of the receiver lost its last remote handle
    Released(NodeId),
    /// The receiver's bootstrap seed
    Seed,
}

#[derive(Debug, Clone)]
enum Header {
    Call {
        interface: String,
        member: String,
        reply: Option<u32>,
    },
    Reply,
    Error {
        name: String,
    },
    Seed {
        roots: Vec<(String, u32)>,
    },
    Notification,
}

fn root_entry_type() -> Type {
    Type::Struct(vec![Type::String, Type::Uint32])
}

fn malformed_header(kind: MessageType) -> Error {
    Error::Codec(CodecError::MissingValue(format!("{} header", kind)))
}

impl Header {
    fn encode(&self, kind: MessageType) -> Result<Payload> {
        let values = match self {
            Header::Call {
                interface,
                member,
                reply,
            } => {
                let reply = match reply {
                    Some(index) => Value::some(Type::Uint32, (*index).into()),
                    None => Value::none(Type::Uint32),
                };
                vec![Value::Struct(vec![
                    interface.as_str().into(),
                    member.as_str().into(),
                    reply,
                ])]
            }
            Header::Error { name } => vec![name.as_str().into()],
            Header::Seed { roots } => vec![Value::array(
                root_entry_type(),
                roots
                    .iter()
                    .map(|(name, index)| Value::Struct(vec![name.as_str().into(), (*index).into()]))
                    .collect(),
            )],
            Header::Reply | Header::Notification => Vec::new(),
        };
        Ok(Payload::encode(kind.header_signature(), &values)?)
    }

    fn decode(kind: MessageType, payload: &Payload, limits: &CodecLimits) -> Result<Header> {
        let expected = kind.header_signature();
        if payload.signature().as_str() != expected {
            return Err(Error::Codec(CodecError::TypeMismatch {
                expected: expected.to_string(),
                found: payload.signature().to_string(),
            }));
        }

        let values = payload.decode_with(limits)?;
        let header = match (kind, values.as_slice()) {
            (MessageType::Call, [Value::Struct(fields)]) => match fields.as_slice() {
                [Value::String(interface), Value::String(member), Value::Maybe(_, reply)] => {
                    Header::Call {
                        interface: interface.clone(),
                        member: member.clone(),
                        reply: reply.as_deref().and_then(Value::as_u32),
                    }
                }
                _ => return Err(malformed_header(kind)),
            },
            (MessageType::Error, [Value::String(name)]) => Header::Error { name: name.clone() },
            (MessageType::Seed, [Value::Array(_, entries)]) => {
                let roots = entries
                    .iter()
                    .map(|entry| match entry.as_struct() {
                        Some([Value::String(name), Value::Uint32(index)]) => {
                            Ok((name.clone(), *index))
                        }
                        _ => Err(malformed_header(kind)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Header::Seed { roots }
            }
            (MessageType::Reply, []) => Header::Reply,
            (MessageType::NodeDestroy, []) => Header::Notification,
            _ => return Err(malformed_header(kind)),
        };
        Ok(header)
    }
}

enum Body {
    Building(Writer),
    Sealed { payload: Payload, cursor: Reader },
}

struct MessageState {
    header: Header,
    body: Body,
    handles: Vec<Handle>,
    fds: Vec<OwnedFd>,
}

struct MessageInner {
    peer: Weak<PeerInner>,
    peer_id: PeerId,
    kind: MessageType,
    route: Route,
    limits: CodecLimits,
    credentials: Option<Credentials>,
    state: Mutex<MessageState>,
}

/// Typed message with attached handles and descriptors
///
/// Clones share the same message, including its read cursor.
#[derive(Clone)]
pub struct Message {
    inner: Arc<MessageInner>,
}

impl Message {
    fn outgoing(peer: &Peer, kind: MessageType, header: Header, signature: &str) -> Result<Message> {
        peer.ensure_open()?;
        let limits = peer.config().limits;
        let writer = Writer::with_limits(signature, limits)?;
        Ok(Message {
            inner: Arc::new(MessageInner {
                peer: Arc::downgrade(&peer.inner),
                peer_id: peer.id(),
                kind,
                route: Route::Outgoing,
                limits,
                credentials: None,
                state: Mutex::new(MessageState {
                    header,
                    body: Body::Building(writer),
                    handles: Vec::new(),
                    fds: Vec::new(),
                }),
            }),
        })
    }

    fn sealed(
        peer: Weak<PeerInner>,
        peer_id: PeerId,
        kind: MessageType,
        route: Route,
        header: Header,
        payload: Payload,
        limits: CodecLimits,
    ) -> Message {
        Message {
            inner: Arc::new(MessageInner {
                peer,
                peer_id,
                kind,
                route,
                limits,
                credentials: None,
                state: Mutex::new(MessageState {
                    header,
                    body: Body::Sealed {
                        cursor: Reader::with_limits(payload.clone(), limits),
                        payload,
                    },
                    handles: Vec::new(),
                    fds: Vec::new(),
                }),
            }),
        }
    }

    /// A call that expects no answer.
    pub fn new_call(peer: &Peer, interface: &str, member: &str, signature: &str) -> Result<Message> {
        Message::outgoing(
            peer,
            MessageType::Call,
            Header::Call {
                interface: interface.to_string(),
                member: member.to_string(),
                reply: None,
            },
            signature,
        )
    }

    /// A call whose REPLY (body signature `reply_signature`) or ERROR is
    /// handed to `callback`. The reply handle is attached at index 0.
    pub fn new_call_with_reply<F>(
        peer: &Peer,
        interface: &str,
        member: &str,
        signature: &str,
        reply_signature: &str,
        callback: F,
    ) -> Result<(Message, ReplySlot)>
    where
        F: FnOnce(&Message) -> Result<()> + Send + 'static,
    {
        let reply_signature = Signature::parse_with(reply_signature, &peer.config().limits)?;
        let message = Message::new_call(peer, interface, member, signature)?;
        let slot = ReplySlot::register(peer, reply_signature, Box::new(callback))?;

        let node = slot.node_id();
        let handle = match peer.node(node) {
            Some(node) => node.handle(),
            None => {
                slot.discard();
                return Err(Error::Gone);
            }
        };
        let index = match message.append_handle(&handle) {
            Ok(index) => index,
            Err(err) => {
                slot.discard();
                return Err(err);
            }
        };
        if let Header::Call { reply, .. } = &mut lock(&message.inner.state).header {
            *reply = Some(index);
        }
        Ok((message, slot))
    }

    pub fn new_reply(peer: &Peer, signature: &str) -> Result<Message> {
        Message::outgoing(peer, MessageType::Reply, Header::Reply, signature)
    }

    pub fn new_error(peer: &Peer, name: &str, signature: &str) -> Result<Message> {
        Message::outgoing(
            peer,
            MessageType::Error,
            Header::Error {
                name: name.to_string(),
            },
            signature,
        )
    }

    /// The bootstrap message for whoever attaches to this peer's
    /// connection next. `roots` names the capabilities it receives.
    pub fn new_seed(peer: &Peer, roots: &[(&str, &Handle)], signature: &str) -> Result<Message> {
        let message = Message::outgoing(
            peer,
            MessageType::Seed,
            Header::Seed { roots: Vec::new() },
            signature,
        )?;

        let mut entries: Vec<(String, u32)> = Vec::with_capacity(roots.len());
        for (name, handle) in roots {
            if entries.iter().any(|(taken, _)| taken == name) {
                return Err(Error::Duplicate {
                    kind: "root",
                    name: name.to_string(),
                });
            }
            let index = message.append_handle(handle)?;
            entries.push((name.to_string(), index));
        }
        if let Header::Seed { roots } = &mut lock(&message.inner.state).header {
            *roots = entries;
        }
        Ok(message)
    }

    /// Error message built locally and delivered straight to a reply callback.
    pub(crate) fn synthetic_error(peer: Weak<PeerInner>, peer_id: PeerId, name: &str) -> Message {
        Message::sealed(
            peer,
            peer_id,
            MessageType::Error,
            Route::Outgoing,
            Header::Error {
                name: name.to_string(),
            },
            Payload::empty(),
            CodecLimits::default(),
        )
    }

    pub(crate) fn notification(peer: &Peer, route: Route) -> Message {
        Message::sealed(
            Arc::downgrade(&peer.inner),
            peer.id(),
            MessageType::NodeDestroy,
            route,
            Header::Notification,
            Payload::empty(),
            peer.config().limits,
        )
    }

    pub(crate) fn received(peer: &Peer, envelope: Envelope, handles: Vec<Handle>) -> Result<Message> {
        let limits = peer.config().limits;
        let header = Header::decode(envelope.kind, &envelope.header, &limits)?;
        let route = match (envelope.kind, envelope.destination) {
            (MessageType::Seed, _) => Route::Seed,
            (_, Some(node)) => Route::Node(node),
            (_, None) => return Err(Error::InvalidState("delivery without destination")),
        };
        Ok(Message {
            inner: Arc::new(MessageInner {
                peer: Arc::downgrade(&peer.inner),
                peer_id: peer.id(),
                kind: envelope.kind,
                route,
                limits,
                credentials: Some(envelope.credentials),
                state: Mutex::new(MessageState {
                    header,
                    body: Body::Sealed {
                        cursor: Reader::with_limits(envelope.body.clone(), limits),
                        payload: envelope.body,
                    },
                    handles,
                    fds: envelope.fds,
                }),
            }),
        })
    }

    pub(crate) fn route(&self) -> Route {
        self.inner.route
    }

    pub(crate) fn peer_id(&self) -> PeerId {
        self.inner.peer_id
    }

    /// The peer the message belongs to, while it is alive.
    pub fn peer(&self) -> Result<Peer> {
        self.inner
            .peer
            .upgrade()
            .map(Peer::from_inner)
            .ok_or(Error::Disconnected)
    }

    pub fn kind(&self) -> MessageType {
        self.inner.kind
    }

    /// Sender credentials; `None` for messages built locally.
    pub fn credentials(&self) -> Option<Credentials> {
        self.inner.credentials
    }

    pub fn is_sealed(&self) -> bool {
        matches!(lock(&self.inner.state).body, Body::Sealed { .. })
    }

    /// Body signature
    pub fn signature(&self) -> Signature {
        match &lock(&self.inner.state).body {
            Body::Building(writer) => writer.signature().clone(),
            Body::Sealed { payload, .. } => payload.signature().clone(),
        }
    }

    /// Interface named by a call
    pub fn interface(&self) -> Option<String> {
        match &lock(&self.inner.state).header {
            Header::Call { interface, .. } => Some(interface.clone()),
            _ => None,
        }
    }

    /// Member named by a call
    pub fn member(&self) -> Option<String> {
        match &lock(&self.inner.state).header {
            Header::Call { member, .. } => Some(member.clone()),
            _ => None,
        }
    }

    /// Name of an error message
    pub fn error_name(&self) -> Option<String> {
        match &lock(&self.inner.state).header {
            Header::Error { name } => Some(name.clone()),
            _ => None,
        }
    }

    /// Error code carried by a `capbus.Error.Errno` error.
    pub fn errno(&self) -> Option<u32> {
        if self.error_name().as_deref() != Some(ERROR_ERRNO) {
            return None;
        }
        let payload = self.payload().ok()?;
        payload.decode_with(&self.inner.limits).ok()?.first()?.as_u32()
    }

    /// Named capabilities of a seed
    pub fn seed_roots(&self) -> Result<Vec<(String, Handle)>> {
        let state = lock(&self.inner.state);
        let Header::Seed { roots } = &state.header else {
            return Err(Error::InvalidState("not a seed"));
        };
        roots
            .iter()
            .map(|(name, index)| Ok((name.clone(), attached(&state.handles, *index)?.clone())))
            .collect()
    }

    /// Where the answer to this call should go, if the caller wants one.
    pub fn reply_handle(&self) -> Option<Handle> {
        let state = lock(&self.inner.state);
        match &state.header {
            Header::Call {
                reply: Some(index), ..
            } => state.handles.get(*index as usize).cloned(),
            _ => None,
        }
    }

    fn with_writer<T>(&self, op: impl FnOnce(&mut Writer) -> ipc::Result<T>) -> Result<T> {
        match &mut lock(&self.inner.state).body {
            Body::Building(writer) => Ok(op(writer)?),
            Body::Sealed { .. } => Err(Error::Busy("message is sealed")),
        }
    }

    fn with_reader<T>(&self, op: impl FnOnce(&mut Reader) -> ipc::Result<T>) -> Result<T> {
        match &mut lock(&self.inner.state).body {
            Body::Sealed { cursor, .. } => Ok(op(cursor)?),
            Body::Building(_) => Err(Error::InvalidState("message is not sealed")),
        }
    }

    pub fn write(&self, signature: &str, values: &[Value]) -> Result<()> {
        self.with_writer(|w| w.write(signature, values))
    }

    pub fn begin(&self, containers: &str) -> Result<()> {
        self.with_writer(|w| w.begin(containers))
    }

    pub fn end(&self, containers: &str) -> Result<()> {
        self.with_writer(|w| w.end(containers))
    }

    /// Appends pre-encoded bytes of one value of type `ty`.
    pub fn insert(&self, ty: &str, data: &[u8]) -> Result<()> {
        self.with_writer(|w| w.insert(ty, data))
    }

    /// Freezes the body. Sealing a sealed message does nothing.
    pub fn seal(&self) -> Result<()> {
        let mut state = lock(&self.inner.state);
        if let Body::Building(writer) = &state.body {
            let payload = writer.seal()?;
            state.body = Body::Sealed {
                cursor: Reader::with_limits(payload.clone(), self.inner.limits),
                payload,
            };
        }
        Ok(())
    }

    /// The sealed body
    pub fn payload(&self) -> Result<Payload> {
        match &lock(&self.inner.state).body {
            Body::Sealed { payload, .. } => Ok(payload.clone()),
            Body::Building(_) => Err(Error::InvalidState("message is not sealed")),
        }
    }

    pub fn read(&self, signature: &str) -> Result<Vec<Value>> {
        self.with_reader(|r| r.read(signature))
    }

    pub fn read_one(&self, ty: &str) -> Result<Value> {
        self.with_reader(|r| r.read_one(ty))
    }

    pub fn enter(&self, containers: &str) -> Result<()> {
        self.with_reader(|r| r.enter(containers))
    }

    pub fn exit(&self, containers: &str) -> Result<()> {
        self.with_reader(|r| r.exit(containers))
    }

    pub fn peek_count(&self) -> Result<usize> {
        self.with_reader(|r| Ok(r.peek_count()))
    }

    pub fn peek_type(&self) -> Result<Option<Type>> {
        self.with_reader(|r| Ok(r.peek_type()))
    }

    /// Moves the shared cursor back to the first value.
    pub fn rewind(&self) -> Result<()> {
        self.with_reader(|r| {
            r.rewind();
            Ok(())
        })
    }

    /// An independent cursor over the sealed body.
    pub fn reader(&self) -> Result<Reader> {
        Ok(Reader::with_limits(self.payload()?, self.inner.limits))
    }

    /// Attaches a handle and returns its index. Indices start at 0 and grow
    /// by one per call; the same handle may be attached more than once.
    pub fn append_handle(&self, handle: &Handle) -> Result<u32> {
        if handle.peer_id() != self.inner.peer_id {
            return Err(Error::InvalidState("handle belongs to another peer"));
        }
        let mut state = lock(&self.inner.state);
        if matches!(state.body, Body::Sealed { .. }) {
            return Err(Error::Busy("message is sealed"));
        }
        let index = u32::try_from(state.handles.len()).map_err(|_| CodecError::TooLarge)?;
        state.handles.push(handle.clone());
        Ok(index)
    }

    /// Attaches a duplicate of `fd` and returns its index.
    pub fn append_fd(&self, fd: BorrowedFd<'_>) -> Result<u32> {
        let owned = fd.try_clone_to_owned()?;
        let mut state = lock(&self.inner.state);
        if matches!(state.body, Body::Sealed { .. }) {
            return Err(Error::Busy("message is sealed"));
        }
        let index = u32::try_from(state.fds.len()).map_err(|_| CodecError::TooLarge)?;
        state.fds.push(owned);
        Ok(index)
    }

    pub fn get_handle(&self, index: u32) -> Result<Handle> {
        let state = lock(&self.inner.state);
        attached(&state.handles, index).cloned()
    }

    /// A duplicate of the descriptor attached at `index`.
    pub fn get_fd(&self, index: u32) -> Result<OwnedFd> {
        let state = lock(&self.inner.state);
        let fd = attached(&state.fds, index)?;
        Ok(fd.try_clone()?)
    }

    pub fn n_handles(&self) -> usize {
        lock(&self.inner.state).handles.len()
    }

    pub fn n_fds(&self) -> usize {
        lock(&self.inner.state).fds.len()
    }

    /// Seals the message and sends it to every node behind `destinations`,
    /// returning how many were reached. Destinations whose node is already
    /// gone are skipped; if all of them are gone the send fails with
    /// [`Error::Gone`]. A seed is stored on the connection instead.
    pub fn send(&self, destinations: &[&Handle]) -> Result<usize> {
        let peer = self.peer()?;
        peer.ensure_open()?;
        if destinations
            .iter()
            .any(|handle| handle.peer_id() != self.inner.peer_id)
        {
            return Err(Error::InvalidState("destination belongs to another peer"));
        }
        let live: Vec<&Handle> = destinations
            .iter()
            .copied()
            .filter(|handle| !handle.is_gone())
            .collect();
        if !destinations.is_empty() && live.is_empty() {
            return Err(Error::Gone);
        }
        self.seal()?;

        let state = lock(&self.inner.state);
        if state.handles.iter().any(Handle::is_gone) {
            return Err(Error::Gone);
        }
        let header = state.header.encode(self.inner.kind)?;
        let Body::Sealed { payload, .. } = &state.body else {
            return Err(Error::InvalidState("message is not sealed"));
        };
        let handles: Vec<HandleId> = state.handles.iter().map(Handle::id).collect();
        let frame = Frame::new(self.inner.kind, &header, payload)
            .with_handles(&handles)
            .with_fds(&state.fds);

        let transport = peer.transport();
        let reached = if self.inner.kind == MessageType::Seed {
            transport
                .set_seed(peer.id(), frame)
                .map(|()| 1)
                .map_err(Error::from_kernel)?
        } else {
            let targets: Vec<HandleId> = live.iter().map(|handle| handle.id()).collect();
            transport
                .send(peer.id(), &targets, frame)
                .map_err(Error::from_kernel)?
        };
        debug!(
            peer = %peer.id(),
            kind = %self.inner.kind,
            destinations = destinations.len(),
            reached,
            "message sent"
        );
        Ok(reached)
    }

    /// Sends `reply` to the caller of this call. Does nothing if the caller
    /// did not ask for an answer.
    pub fn reply(&self, reply: &Message) -> Result<()> {
        if self.inner.kind != MessageType::Call {
            return Err(Error::InvalidState("only calls can be replied to"));
        }
        match self.reply_handle() {
            Some(handle) => reply.send(&[&handle]).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Routes a received message to its node, reply slot, subscriptions or
    /// root set, and runs the matching callback on this thread.
    pub fn dispatch(&self) -> Result<()> {
        let peer = self.peer()?;
        dispatch::dispatch(&peer, self)
    }
}

fn attached<T>(items: &[T], index: u32) -> Result<&T> {
    items.get(index as usize).ok_or(Error::IndexOutOfRange {
        index,
        len: items.len(),
    })
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("Message")
            .field("kind", &self.inner.kind)
            .field("route", &self.inner.route)
            .field("header", &state.header)
            .field("handles", &state.handles.len())
            .field("fds", &state.fds.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_kernel::LocalBus;
    use std::os::fd::AsFd;

    fn peer() -> Peer {
        Peer::new(Arc::new(LocalBus::new())).unwrap()
    }

    #[test]
    fn test_write_seal_read() {
        let peer = peer();
        let message = Message::new_reply(&peer, "a(su)").unwrap();
        message.begin("a").unwrap();
        message
            .write("(su)", &[Value::Struct(vec!["B".into(), 0u32.into()])])
            .unwrap();
        message.end("a").unwrap();

        assert!(matches!(message.read("a(su)"), Err(Error::InvalidState(_))));
        message.seal().unwrap();
        assert!(matches!(message.write("a(su)", &[]), Err(Error::Busy(_))));

        message.enter("a").unwrap();
        assert_eq!(message.peek_count().unwrap(), 1);
        let entry = message.read("(su)").unwrap();
        assert_eq!(entry[0].as_struct().unwrap()[0].as_str(), Some("B"));
        message.exit("a").unwrap();

        message.rewind().unwrap();
        assert_eq!(message.peek_type().unwrap().unwrap().to_string(), "a(su)");
    }

    #[test]
    fn test_seal_with_open_container_fails() {
        let peer = peer();
        let message = Message::new_reply(&peer, "as").unwrap();
        message.begin("a").unwrap();
        assert!(matches!(
            message.seal(),
            Err(Error::Codec(CodecError::UnclosedContainer('a')))
        ));
        message.end("a").unwrap();
        message.seal().unwrap();
    }

    #[test]
    fn test_append_handle_indices() {
        let peer = peer();
        let node = peer.create_node(()).unwrap();
        let message = Message::new_reply(&peer, "").unwrap();

        let handle = node.handle();
        assert_eq!(message.append_handle(&handle).unwrap(), 0);
        assert_eq!(message.append_handle(&handle).unwrap(), 1);
        assert_eq!(message.append_handle(&handle).unwrap(), 2);
        assert_eq!(message.get_handle(1).unwrap(), handle);
        assert!(matches!(
            message.get_handle(3),
            Err(Error::IndexOutOfRange { index: 3, len: 3 })
        ));
        assert_eq!(message.get_handle(3).unwrap_err().errno(), crate::error::ERANGE);
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let bus = Arc::new(LocalBus::new());
        let a = Peer::new(bus.clone()).unwrap();
        let b = Peer::new(bus).unwrap();
        let node = b.create_node(()).unwrap();

        let message = Message::new_reply(&a, "").unwrap();
        assert!(matches!(
            message.append_handle(&node.handle()),
            Err(Error::InvalidState(_))
        ));
        assert_eq!(message.n_handles(), 0);
    }

    #[test]
    fn test_append_fd_duplicates() {
        let peer = peer();
        let file = tempfile::tempfile().unwrap();
        let message = Message::new_reply(&peer, "f").unwrap();

        let index = message.append_fd(file.as_fd()).unwrap();
        message.write("f", &[Value::Fd(index)]).unwrap();
        message.seal().unwrap();

        assert_eq!(message.n_fds(), 1);
        assert!(message.get_fd(0).is_ok());
        assert!(matches!(
            message.get_fd(1),
            Err(Error::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            message.append_fd(file.as_fd()),
            Err(Error::Busy(_))
        ));
    }

    #[test]
    fn test_call_header_roundtrip() {
        let header = Header::Call {
            interface: "test.Component".into(),
            member: "getDependencies".into(),
            reply: Some(0),
        };
        let payload = header.encode(MessageType::Call).unwrap();
        match Header::decode(MessageType::Call, &payload, &CodecLimits::default()).unwrap() {
            Header::Call {
                interface,
                member,
                reply,
            } => {
                assert_eq!(interface, "test.Component");
                assert_eq!(member, "getDependencies");
                assert_eq!(reply, Some(0));
            }
            other => panic!("unexpected header {:?}", other),
        }
    }

    #[test]
    fn test_header_for_wrong_kind_rejected() {
        let payload = Header::Error {
            name: "x".into(),
        }
        .encode(MessageType::Error)
        .unwrap();
        assert!(Header::decode(MessageType::Call, &payload, &CodecLimits::default()).is_err());
    }

    #[test]
    fn test_seed_rejects_duplicate_names() {
        let peer = peer();
        let node = peer.create_node(()).unwrap();
        let handle = node.handle();
        let err = Message::new_seed(&peer, &[("root", &handle), ("root", &handle)], "").unwrap_err();
        assert!(matches!(err, Error::Duplicate { kind: "root", .. }));
    }

    #[test]
    fn test_independent_reader() {
        let peer = peer();
        let message = Message::new_reply(&peer, "uu").unwrap();
        message.write("uu", &[1u32.into(), 2u32.into()]).unwrap();
        message.seal().unwrap();

        message.read("u").unwrap();
        let mut reader = message.reader().unwrap();
        assert_eq!(reader.read("uu").unwrap().len(), 2);
        assert_eq!(message.read("u").unwrap(), vec![Value::Uint32(2)]);
    }
}
