//! # Core Types
//!
//! This crate defines the identifiers shared by every layer of the
//! capability bus.
//!
//! ## Philosophy
//!
//! - **Explicit over implicit**: peers, nodes and handles have distinct id types.
//! - **Kernel-asserted facts**: credentials are stamped by the transport, never
//!   chosen by the sender.
//! - **Auditable**: capability movement is described by plain events that tests
//!   can query.
//!
//! ## Key Types
//!
//! - [`PeerId`]: identity of a connection endpoint
//! - [`NodeId`]: transport-wide name of an addressable object
//! - [`HandleId`]: per-peer name of a capability pointing at a node
//! - [`PeerDescriptor`]: inheritable token that re-attaches to a peer
//! - [`Credentials`]: sender uid/gid/pid/tid attached to deliveries
//! - [`CapabilityEvent`]: audit record of handle and node lifecycle

pub mod capability;
pub mod credentials;
pub mod ids;

pub use capability::CapabilityEvent;
pub use credentials::Credentials;
pub use ids::{HandleId, NodeId, PeerDescriptor, PeerId};
