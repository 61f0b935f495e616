//! Bus error types

use ipc::CodecError;
use kernel_api::KernelError;
use thiserror::Error;

pub const ENOENT: i32 = -2;
pub const EIO: i32 = -5;
pub const EBADF: i32 = -9;
pub const ENOMEM: i32 = -12;
pub const EBUSY: i32 = -16;
pub const EINVAL: i32 = -22;
pub const ERANGE: i32 = -34;
pub const EXFULL: i32 = -54;
pub const EPROTO: i32 = -71;
pub const ENOTUNIQ: i32 = -76;
pub const ESHUTDOWN: i32 = -108;
pub const EHOSTUNREACH: i32 = -113;
pub const EDQUOT: i32 = -122;

/// Name of the error sent when a call names an interface the node does not implement
pub const ERROR_INVALID_INTERFACE: &str = "capbus.Error.InvalidInterface";
/// Name of the error sent when a call reaches a root node nobody implemented yet
pub const ERROR_MISSING_ROOT_INTERFACE: &str = "capbus.Error.MissingRootInterface";
pub const ERROR_INVALID_MEMBER: &str = "capbus.Error.InvalidMember";
pub const ERROR_INVALID_SIGNATURE: &str = "capbus.Error.InvalidSignature";
pub const ERROR_INVALID_MESSAGE_TYPE: &str = "capbus.Error.InvalidMessageType";
/// Handler failure; the error body is `u`, the positive error code
pub const ERROR_ERRNO: &str = "capbus.Error.Errno";
/// Synthesized locally for reply slots outstanding when their peer goes away
pub const ERROR_DISCONNECTED: &str = "capbus.Error.Disconnected";

/// Errors that can occur on the bus
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed signature or payload
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Transport failure
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// A name is already registered
    #[error("Duplicate {kind}: {name}")]
    Duplicate { kind: &'static str, name: String },

    /// The object can no longer be changed
    #[error("Busy: {0}")]
    Busy(&'static str),

    /// Operation does not apply to the object in its current state
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    /// Attachment index past the end of the attachment list
    #[error("Attachment index {index} out of range ({len} attached)")]
    IndexOutOfRange { index: u32, len: usize },

    /// The node behind a handle is gone
    #[error("Node is gone")]
    Gone,

    /// The peer has been disconnected or detached
    #[error("Peer disconnected")]
    Disconnected,

    /// Nothing is registered under that name
    #[error("Not found: {0}")]
    NotFound(String),

    /// An inbound call or reply was refused; carries the error name sent back
    #[error("Rejected: {0}")]
    Rejected(&'static str),

    /// A handler reported an error code
    #[error("Handler failed with code {0}")]
    Errno(i32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The exported connection record could not be parsed
    #[error("Malformed environment record: {0}")]
    Environment(#[from] serde_json::Error),
}

impl Error {
    /// Negative error code for this error, as reported to remote callers.
    pub fn errno(&self) -> i32 {
        match self {
            Error::Codec(CodecError::TooLarge) => ENOMEM,
            Error::Codec(_) => EPROTO,
            Error::Kernel(err) => match err {
                KernelError::UnknownPeer(_) | KernelError::Disconnected => ESHUTDOWN,
                KernelError::UnknownDescriptor(_) | KernelError::DescriptorDup(_) => EBADF,
                KernelError::UnknownHandle(_)
                | KernelError::UnknownNode(_)
                | KernelError::NotOwner(_)
                | KernelError::InvalidArgument(_) => EINVAL,
                KernelError::NodeGone => EHOSTUNREACH,
                KernelError::QueueFull(_) => EXFULL,
                KernelError::QuotaExceeded(_) => EDQUOT,
            },
            Error::Duplicate { .. } => ENOTUNIQ,
            Error::Busy(_) => EBUSY,
            Error::InvalidState(_) | Error::Rejected(_) => EINVAL,
            Error::IndexOutOfRange { .. } => ERANGE,
            Error::Gone => EHOSTUNREACH,
            Error::Disconnected => ESHUTDOWN,
            Error::NotFound(_) => ENOENT,
            Error::Errno(code) => -code.abs(),
            Error::Io(err) => err.raw_os_error().map_or(EIO, |code| -code.abs()),
            Error::Environment(_) => EINVAL,
        }
    }

    /// Converts a transport error, folding connection loss and dead nodes
    /// into their bus-level variants.
    pub(crate) fn from_kernel(err: KernelError) -> Error {
        match err {
            KernelError::Disconnected | KernelError::UnknownPeer(_) => Error::Disconnected,
            KernelError::NodeGone => Error::Gone,
            other => Error::Kernel(other),
        }
    }
}

/// Result alias for bus operations
pub type Result<T> = std::result::Result<T, Error>;
