//! Sender credentials
//!
//! Every delivered message carries the credentials of the peer that sent it.
//! The transport stamps them; the bus only exposes them and never enforces
//! policy based on them.

use serde::{Deserialize, Serialize};

/// uid/gid/pid/tid of a message sender, as asserted by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
    pub pid: u32,
    pub tid: u32,
}

impl Credentials {
    pub fn new(uid: u32, gid: u32, pid: u32, tid: u32) -> Self {
        Self { uid, gid, pid, tid }
    }

    /// Credentials of the calling process.
    ///
    /// The standard library exposes no user database, so uid and gid are
    /// reported as 0 and the main thread id equals the pid.
    pub fn current_process() -> Self {
        let pid = std::process::id();
        Self::new(0, 0, pid, pid)
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::current_process()
    }
}
