//! Destruction notifications

use crate::lock;
use crate::peer::PeerInner;
use core_types::HandleId;
use std::sync::Weak;

/// Registration created by [`Handle::subscribe`](crate::Handle::subscribe)
///
/// The callback fires at most once. Dropping the token leaves the
/// registration in place; [`cancel`](Self::cancel) removes it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    handle: HandleId,
    peer: Weak<PeerInner>,
}

impl Subscription {
    pub(crate) fn new(id: u64, handle: HandleId, peer: Weak<PeerInner>) -> Self {
        Self { id, handle, peer }
    }

    /// Handle being watched
    pub fn handle_id(&self) -> HandleId {
        self.handle
    }

    /// Whether the callback has neither fired nor been canceled.
    pub fn is_pending(&self) -> bool {
        let Some(peer) = self.peer.upgrade() else {
            return false;
        };
        let state = lock(&peer.state);
        state
            .subscriptions
            .get(&self.handle)
            .map_or(false, |entries| entries.iter().any(|entry| entry.id == self.id))
    }

    /// Removes the registration. Returns `false` if the callback already
    /// fired (or the peer is gone), in which case nothing happens.
    pub fn cancel(self) -> bool {
        let Some(peer) = self.peer.upgrade() else {
            return false;
        };
        let removed = {
            let mut state = lock(&peer.state);
            let Some(entries) = state.subscriptions.get_mut(&self.handle) else {
                return false;
            };
            let removed = entries
                .iter()
                .position(|entry| entry.id == self.id)
                .map(|index| entries.remove(index));
            if entries.is_empty() {
                state.subscriptions.remove(&self.handle);
            }
            removed
        };
        removed.is_some()
    }
}
