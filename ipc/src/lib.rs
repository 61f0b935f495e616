//! # Inter-Process Communication (IPC) codec
//!
//! This crate defines the typed payload encoding shared by every peer on the
//! bus.
//!
//! ## Philosophy
//!
//! - **Self-describing**: every payload carries the signature it was written with
//! - **Cursor-driven**: containers are opened and closed explicitly on both sides
//! - **Hostile-input safe**: malformed or truncated bytes produce a
//!   [`CodecError`], never a panic or an out-of-bounds access
//!
//! ## Signature grammar
//!
//! | tag | type |
//! |-----|------|
//! | `b` | bool |
//! | `y` | u8 |
//! | `n` / `q` | i16 / u16 |
//! | `i` / `u` | i32 / u32 |
//! | `x` / `t` | i64 / u64 |
//! | `d` | f64 |
//! | `s` | UTF-8 string |
//! | `h` | index into the message's handle attachments |
//! | `f` | index into the message's descriptor attachments |
//! | `a<T>` | homogeneous array of `T` |
//! | `m<T>` | optional `T` |
//! | `(...)` | struct of the enclosed types |
//!
//! `"a(su)"` is an array of (string, u32) pairs.

pub mod error;
pub mod message;
pub mod reader;
pub mod signature;
pub mod value;
mod wire;
pub mod writer;

pub use error::CodecError;
pub use message::{MessageType, Payload};
pub use reader::Reader;
pub use signature::{CodecLimits, Signature, Type};
pub use value::Value;
pub use writer::Writer;

/// Result alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;
