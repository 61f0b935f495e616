//! # Capability Bus
//!
//! This crate implements the peer, node and handle model on top of a
//! [`Transport`](kernel_api::Transport).
//!
//! ## Philosophy
//!
//! - **No ambient authority**: a peer can only address nodes it was handed a
//!   [`Handle`] for, either at bootstrap or inside a received [`Message`]
//! - **Explicit ownership**: the peer's registry owns its nodes; handles and
//!   messages refer back to the peer weakly
//! - **Caller-driven dispatch**: [`Peer::recv`] is the only call that blocks;
//!   [`Message::dispatch`] runs callbacks on the calling thread
//! - **Exactly once**: every reply slot fires once, every destroy callback
//!   fires once
//!
//! ## Example
//!
//! ```
//! use capbus::{Interface, Message, Peer};
//! use sim_kernel::LocalBus;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! let bus = Arc::new(LocalBus::new());
//! let peer = Peer::new(bus).unwrap();
//!
//! let echo = Interface::new("demo.Echo");
//! echo.add_member("echo", "s", "s", |node, call| {
//!     let peer = node.peer().ok_or(capbus::Error::Disconnected)?;
//!     let text = call.read_one("s")?;
//!     let reply = Message::new_reply(&peer, "s")?;
//!     reply.write("s", &[text])?;
//!     call.reply(&reply)
//! })
//! .unwrap();
//!
//! let node = peer.create_node(()).unwrap();
//! node.implement(&echo).unwrap();
//!
//! let answered = Arc::new(AtomicBool::new(false));
//! let seen = Arc::clone(&answered);
//! let (call, _slot) =
//!     Message::new_call_with_reply(&peer, "demo.Echo", "echo", "s", "s", move |reply| {
//!         assert_eq!(reply.read_one("s")?.as_str(), Some("hi"));
//!         seen.store(true, Ordering::SeqCst);
//!         Ok(())
//!     })
//!     .unwrap();
//! call.write("s", &["hi".into()]).unwrap();
//! call.send(&[&node.handle()]).unwrap();
//!
//! peer.dispatch_pending().unwrap();
//! assert!(answered.load(Ordering::SeqCst));
//! ```

pub mod config;
mod dispatch;
pub mod environment;
pub mod error;
pub mod handle;
pub mod interface;
pub mod message;
pub mod multicast;
pub mod node;
pub mod peer;
pub mod slot;
pub mod subscription;

pub use config::PeerConfig;
pub use error::{Error, Result};
pub use handle::Handle;
pub use interface::Interface;
pub use message::Message;
pub use multicast::MulticastGroup;
pub use node::Node;
pub use peer::Peer;
pub use slot::ReplySlot;
pub use subscription::Subscription;

pub use core_types::{Credentials, HandleId, NodeId, PeerDescriptor, PeerId};
pub use ipc::{MessageType, Type, Value};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the guard if a callback panicked while it was held.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
