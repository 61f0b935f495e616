//! Member tables
//!
//! An [`Interface`] is a name plus a table of members. Members are added up
//! front; once a node implements the interface the table is frozen, so
//! dispatch never observes a half-built table.

use crate::lock;
use crate::message::Message;
use crate::node::Node;
use crate::{Error, Result};
use ipc::Signature;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Member handler
///
/// The handler receives the node and the inbound call. It is responsible for
/// sending a reply; returning an error sends an error reply carrying the
/// error's code instead.
pub type Handler = dyn Fn(&Node, &Message) -> Result<()> + Send + Sync;

pub(crate) struct Member {
    pub(crate) input: Signature,
    /// Descriptive only. Dispatch checks `input`; replies are checked
    /// against the signature the caller expects.
    pub(crate) output: Signature,
    pub(crate) handler: Arc<Handler>,
}

struct InterfaceInner {
    name: String,
    members: Mutex<BTreeMap<String, Arc<Member>>>,
    frozen: AtomicBool,
}

/// Named table of callable members
#[derive(Clone)]
pub struct Interface {
    inner: Arc<InterfaceInner>,
}

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(InterfaceInner {
                name: name.into(),
                members: Mutex::new(BTreeMap::new()),
                frozen: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Registers a member. Fails without touching the table if the name is
    /// taken, a signature is malformed, or the interface is already in use.
    pub fn add_member<F>(&self, name: &str, input: &str, output: &str, handler: F) -> Result<()>
    where
        F: Fn(&Node, &Message) -> Result<()> + Send + Sync + 'static,
    {
        let input = Signature::parse(input)?;
        let output = Signature::parse(output)?;

        let mut members = lock(&self.inner.members);
        if self.inner.frozen.load(Ordering::SeqCst) {
            return Err(Error::Busy("interface is implemented by a node"));
        }
        if members.contains_key(name) {
            return Err(Error::Duplicate {
                kind: "member",
                name: name.to_string(),
            });
        }
        members.insert(
            name.to_string(),
            Arc::new(Member {
                input,
                output,
                handler: Arc::new(handler),
            }),
        );
        Ok(())
    }

    /// Member names in lexical order
    pub fn member_names(&self) -> Vec<String> {
        lock(&self.inner.members).keys().cloned().collect()
    }

    pub fn input_signature(&self, member: &str) -> Option<Signature> {
        self.member(member).map(|m| m.input.clone())
    }

    /// Declared reply signature. Not enforced when the handler replies.
    pub fn output_signature(&self, member: &str) -> Option<Signature> {
        self.member(member).map(|m| m.output.clone())
    }

    /// Whether a node implements this interface
    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::SeqCst)
    }

    pub(crate) fn member(&self, name: &str) -> Option<Arc<Member>> {
        lock(&self.inner.members).get(name).cloned()
    }

    pub(crate) fn freeze(&self) {
        let _members = lock(&self.inner.members);
        self.inner.frozen.store(true, Ordering::SeqCst);
    }
}

impl PartialEq for Interface {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interface")
            .field("name", &self.inner.name)
            .field("members", &self.member_names())
            .finish()
    }
}
