//! Codec error types

use thiserror::Error;

/// Errors produced while parsing signatures or encoding/decoding payloads
///
/// Every variant is a protocol violation: the input (signature, value list or
/// encoded bytes) does not agree with what the cursor expects.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid signature {signature:?}: {reason}")]
    InvalidSignature {
        signature: String,
        reason: &'static str,
    },

    #[error("Container nesting exceeds depth limit of {0}")]
    TooDeep(usize),

    #[error("Arity mismatch: signature describes {types} values but {values} were given")]
    ArityMismatch { types: usize, values: usize },

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("No further value is expected at this position")]
    NoMoreValues,

    #[error("Cannot {op} '{tag}' here (current position holds {found})")]
    ContainerMismatch {
        op: &'static str,
        tag: char,
        found: String,
    },

    #[error("Container '{0}' was never closed")]
    UnclosedContainer(char),

    #[error("Missing value of type {0}")]
    MissingValue(String),

    #[error("Read past end of container: need {needed} bytes, {available} available")]
    OutOfBounds { needed: usize, available: usize },

    #[error("Array header claims {count} elements in {bytes} bytes")]
    InvalidArrayHeader { count: u32, bytes: usize },

    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),

    #[error("Invalid UTF-8 in string")]
    InvalidUtf8,

    #[error("Invalid boolean byte {0}")]
    InvalidBool(u8),

    #[error("Invalid optional-value tag {0}")]
    InvalidMaybeTag(u8),

    #[error("Invalid message type {0}")]
    InvalidMessageType(u64),

    #[error("Value too large to encode")]
    TooLarge,
}
