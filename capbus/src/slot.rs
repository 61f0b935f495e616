//! Call/reply correlation
//!
//! Every call that wants an answer gets a private reply node. Its handle
//! travels with the call; the callee answers by sending to it. The pending
//! record is consumed by whichever comes first:
//!
//! - the matching REPLY or ERROR (callback runs)
//! - [`ReplySlot::discard`] (callback dropped unfired)
//! - teardown of the owning peer (callback runs with a synthetic
//!   `capbus.Error.Disconnected` error)

use crate::lock;
use crate::message::Message;
use crate::node::Node;
use crate::peer::Peer;
use crate::Result;
use core_types::NodeId;
use ipc::Signature;
use tracing::trace;

pub(crate) type ReplyCallback = Box<dyn FnOnce(&Message) -> Result<()> + Send>;

pub(crate) struct PendingReply {
    /// Body signature a REPLY must carry
    pub(crate) signature: Signature,
    pub(crate) callback: ReplyCallback,
}

/// Token for an outstanding call
///
/// Dropping the token does not discard the slot; the callback still runs
/// when the answer arrives.
#[derive(Debug)]
pub struct ReplySlot {
    node: Node,
}

impl ReplySlot {
    pub(crate) fn register(
        peer: &Peer,
        signature: Signature,
        callback: ReplyCallback,
    ) -> Result<ReplySlot> {
        let node = peer.create_slot_node()?;
        lock(&peer.inner.state)
            .reply_slots
            .insert(node.id(), PendingReply { signature, callback });
        trace!(slot = %node.id(), "reply slot registered");
        Ok(ReplySlot { node })
    }

    /// The reply node answers are addressed to
    pub fn node_id(&self) -> NodeId {
        self.node.id()
    }

    /// Whether the slot is still waiting for an answer.
    pub fn is_pending(&self) -> bool {
        self.node.peer().map_or(false, |peer| {
            lock(&peer.inner.state)
                .reply_slots
                .contains_key(&self.node.id())
        })
    }

    /// Consumes the slot without running its callback. A late answer is
    /// dropped. Returns `false` if the slot had already been consumed.
    pub fn discard(self) -> bool {
        let pending = self.node.peer().and_then(|peer| {
            lock(&peer.inner.state)
                .reply_slots
                .remove(&self.node.id())
        });
        if let Err(err) = self.node.destroy() {
            trace!(slot = %self.node.id(), %err, "reply node already gone");
        }
        pending.is_some()
    }
}
