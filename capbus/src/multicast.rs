//! Multicast groups
//!
//! A [`MulticastGroup`] remembers the callers of some member (for example a
//! "watch" call) and sends one message to all of them. Each member is the
//! reply handle of the call that joined; the member leaves by itself when
//! the node behind that handle is destroyed.

use crate::handle::Handle;
use crate::lock;
use crate::message::Message;
use crate::peer::Peer;
use crate::subscription::Subscription;
use crate::{Error, Result};
use core_types::PeerId;
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

struct GroupMember {
    handle: Handle,
    subscription: Option<Subscription>,
}

struct GroupInner {
    peer_id: PeerId,
    members: Mutex<Vec<GroupMember>>,
}

impl GroupInner {
    fn leave(&self, handle: &Handle) -> Option<GroupMember> {
        let mut members = lock(&self.members);
        let index = members.iter().position(|member| member.handle == *handle)?;
        Some(members.remove(index))
    }
}

/// Set of reply handles sharing one broadcast
#[derive(Clone)]
pub struct MulticastGroup {
    inner: Arc<GroupInner>,
}

impl MulticastGroup {
    pub fn new(peer: &Peer) -> MulticastGroup {
        MulticastGroup {
            inner: Arc::new(GroupInner {
                peer_id: peer.id(),
                members: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Adds the caller of `call` to the group.
    pub fn join(&self, call: &Message) -> Result<()> {
        if call.peer()?.id() != self.inner.peer_id {
            return Err(Error::InvalidState("call was received by another peer"));
        }
        let handle = call
            .reply_handle()
            .ok_or_else(|| Error::NotFound("reply handle".to_string()))?;
        if lock(&self.inner.members)
            .iter()
            .any(|member| member.handle == handle)
        {
            return Err(Error::Busy("caller already joined"));
        }

        let group: Weak<GroupInner> = Arc::downgrade(&self.inner);
        let subscription = handle.subscribe(move |gone| {
            if let Some(group) = group.upgrade() {
                let left = group.leave(gone);
                debug!(handle = %gone.id(), left = left.is_some(), "multicast member gone");
            }
        })?;

        lock(&self.inner.members).push(GroupMember {
            handle: handle.clone(),
            subscription: Some(subscription),
        });
        debug!(peer = %self.inner.peer_id, handle = %handle.id(), "multicast member joined");
        Ok(())
    }

    /// Removes the member whose reply handle is `handle`. Returns `false`
    /// if it was not a member.
    pub fn leave(&self, handle: &Handle) -> bool {
        match self.inner.leave(handle) {
            Some(mut member) => {
                if let Some(subscription) = member.subscription.take() {
                    subscription.cancel();
                }
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.members).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current member handles, in join order
    pub fn members(&self) -> Vec<Handle> {
        lock(&self.inner.members)
            .iter()
            .map(|member| member.handle.clone())
            .collect()
    }

    /// Sends `message` once to every member of every group. A handle in
    /// several groups receives it once. Returns how many were reached.
    pub fn send_all(groups: &[&MulticastGroup], message: &Message) -> Result<usize> {
        let mut targets: Vec<Handle> = Vec::new();
        for group in groups {
            for handle in group.members() {
                if !targets.contains(&handle) {
                    targets.push(handle);
                }
            }
        }
        if targets.is_empty() {
            return Ok(0);
        }
        let refs: Vec<&Handle> = targets.iter().collect();
        message.send(&refs)
    }
}

impl Drop for GroupInner {
    fn drop(&mut self) {
        let members = std::mem::take(
            self.members
                .get_mut()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        for mut member in members {
            if let Some(subscription) = member.subscription.take() {
                subscription.cancel();
            }
        }
    }
}

impl std::fmt::Debug for MulticastGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MulticastGroup")
            .field("peer", &self.inner.peer_id)
            .field("members", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Interface;
    use sim_kernel::LocalBus;

    #[test]
    fn test_join_requires_reply_handle() {
        let peer = Peer::new(Arc::new(LocalBus::new())).unwrap();
        let group = MulticastGroup::new(&peer);
        let joined = Arc::new(Mutex::new(None));
        let result = Arc::clone(&joined);

        let interface = Interface::new("test.Watch");
        let handle_group = group.clone();
        interface
            .add_member("watch", "", "", move |_, call| {
                *result.lock().unwrap() = Some(handle_group.join(call).is_ok());
                Ok(())
            })
            .unwrap();
        let node = peer.create_node(()).unwrap();
        node.implement(&interface).unwrap();

        Message::new_call(&peer, "test.Watch", "watch", "")
            .unwrap()
            .send(&[&node.handle()])
            .unwrap();
        peer.dispatch_pending().unwrap();

        assert_eq!(*joined.lock().unwrap(), Some(false));
        assert!(group.is_empty());
    }

    #[test]
    fn test_send_all_empty() {
        let peer = Peer::new(Arc::new(LocalBus::new())).unwrap();
        let group = MulticastGroup::new(&peer);
        let message = Message::new_reply(&peer, "").unwrap();
        assert_eq!(MulticastGroup::send_all(&[&group], &message).unwrap(), 0);
    }
}
