//! # Kernel API
//!
//! This crate defines the boundary between the capability bus and the
//! transport that actually moves messages between peers.
//!
//! ## Philosophy
//!
//! The transport provides **mechanisms**, not policies:
//! - Connections (fresh, or re-attached from an inherited descriptor)
//! - Nodes and per-peer handle tables (capability translation)
//! - Atomic delivery of payload, handles and descriptors as one unit
//! - Kernel-asserted sender credentials on every delivery
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - A wire format (payload bytes pass through untouched)
//! - A dispatcher (routing to interfaces and reply slots happens above)
//! - A specific transport (the trait can be implemented many ways)

pub mod error;
pub mod frame;
pub mod transport;

pub use error::KernelError;
pub use frame::{ClonedPeer, Connection, Delivery, Envelope, Frame, ReceivedHandle};
pub use transport::Transport;
