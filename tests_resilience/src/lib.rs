//! Resilience Test Utilities
//!
//! Shared helpers for the cross-crate tests under `tests/`.
//!
//! ## Test Philosophy
//!
//! - **Exactly once**: reply slots, destroy callbacks and subscriptions fire
//!   once, whatever the order of replies, discards and teardown
//! - **Dangling but safe**: a handle to a destroyed node fails with `Gone`,
//!   it never reaches stale state
//! - **Hostile input**: malformed payloads produce errors, never panics
//! - **Auditable**: capability movement is checked against the bus audit log

use capbus::{Error, Handle, Interface, Message, Node, Peer, Result, Value};
use sim_kernel::{BusConfig, LocalBus};
use std::sync::{Arc, Mutex};

/// A bus with default limits
pub fn test_bus() -> Arc<LocalBus> {
    Arc::new(LocalBus::new())
}

pub fn test_bus_with(config: BusConfig) -> Arc<LocalBus> {
    Arc::new(LocalBus::with_config(config))
}

pub fn connect(bus: &Arc<LocalBus>) -> Peer {
    Peer::new(bus.clone()).expect("connect")
}

/// A parent peer owning `node`, and a child peer whose only capability is
/// `handle` to that node.
pub struct Linked {
    pub parent: Peer,
    pub node: Node,
    pub child: Peer,
    pub handle: Handle,
}

pub fn linked(bus: &Arc<LocalBus>) -> Linked {
    let parent = connect(bus);
    let node = parent.create_node(()).expect("create node");
    let (child, handle) = parent.clone_peer(&node.handle()).expect("clone peer");
    Linked {
        parent,
        node,
        child,
        handle,
    }
}

/// What a reply callback saw
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Reply(Vec<Value>),
    Error(String),
}

/// Collects answers from any number of reply callbacks
#[derive(Debug, Clone, Default)]
pub struct Answers {
    seen: Arc<Mutex<Vec<Answer>>>,
}

impl Answers {
    pub fn new() -> Self {
        Self::default()
    }

    /// A reply callback that records what it receives.
    pub fn callback(&self) -> impl FnOnce(&Message) -> Result<()> + Send + 'static {
        let seen = Arc::clone(&self.seen);
        move |message: &Message| {
            let answer = match message.error_name() {
                Some(name) => Answer::Error(name),
                None => Answer::Reply(message.payload()?.decode()?),
            };
            seen.lock().expect("answers lock").push(answer);
            Ok(())
        }
    }

    pub fn all(&self) -> Vec<Answer> {
        self.seen.lock().expect("answers lock").clone()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().expect("answers lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `test.Echo` with `echo(s) -> s` and `fail() -> ()`, the latter failing
/// with `Errno(code)`.
pub fn echo_interface(code: i32) -> Interface {
    let interface = Interface::new("test.Echo");
    interface
        .add_member("echo", "s", "s", |node, call| {
            let peer = node.peer().ok_or(Error::Disconnected)?;
            let text = call.read_one("s")?;
            let reply = Message::new_reply(&peer, "s")?;
            reply.write("s", &[text])?;
            call.reply(&reply)
        })
        .expect("echo member");
    interface
        .add_member("fail", "", "", move |_, _| Err(Error::Errno(code)))
        .expect("fail member");
    interface
}

/// Sends `echo(text)` from `peer` to `target`.
pub fn call_echo(peer: &Peer, target: &Handle, text: &str, answers: &Answers) -> capbus::ReplySlot {
    let (call, slot) =
        Message::new_call_with_reply(peer, "test.Echo", "echo", "s", "s", answers.callback())
            .expect("new call");
    call.write("s", &[text.into()]).expect("write");
    call.send(&[target]).expect("send");
    slot
}

/// Dispatches on every peer until none of them has anything queued.
pub fn drain(peers: &[&Peer]) {
    loop {
        let mut handled = 0;
        for peer in peers {
            handled += peer.dispatch_pending().expect("dispatch");
        }
        if handled == 0 {
            return;
        }
    }
}
