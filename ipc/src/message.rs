//! Message type tags and sealed payloads

use crate::error::CodecError;
use crate::reader::Reader;
use crate::signature::{CodecLimits, Signature};
use crate::value::Value;
use crate::wire;
use crate::writer::Writer;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Stable message type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// A node became unreachable (destroyed, or released with no holders left)
    NodeDestroy = 0,
    /// A method call on a node's interface
    Call = 1,
    /// Successful answer to a call
    Reply = 2,
    /// Failed answer to a call
    Error = 3,
    /// Bootstrap set of named capabilities
    Seed = 4,
}

impl MessageType {
    pub const fn as_u64(self) -> u64 {
        self as u64
    }

    /// Signature of the routing header carried by messages of this type.
    ///
    /// - call: `(ssmu)` interface, member, optional reply-handle index
    /// - error: `s` error name
    /// - seed: `a(su)` root name and handle index
    pub const fn header_signature(self) -> &'static str {
        match self {
            MessageType::Call => "(ssmu)",
            MessageType::Error => "s",
            MessageType::Seed => "a(su)",
            MessageType::Reply | MessageType::NodeDestroy => "",
        }
    }
}

impl TryFrom<u64> for MessageType {
    type Error = CodecError;

    fn try_from(raw: u64) -> std::result::Result<Self, CodecError> {
        match raw {
            0 => Ok(MessageType::NodeDestroy),
            1 => Ok(MessageType::Call),
            2 => Ok(MessageType::Reply),
            3 => Ok(MessageType::Error),
            4 => Ok(MessageType::Seed),
            other => Err(CodecError::InvalidMessageType(other)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::NodeDestroy => "NODE_DESTROY",
            MessageType::Call => "CALL",
            MessageType::Reply => "REPLY",
            MessageType::Error => "ERROR",
            MessageType::Seed => "SEED",
        };
        f.write_str(name)
    }
}

/// Immutable encoded values together with the signature describing them
///
/// Cloning a payload shares the underlying bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    signature: Signature,
    data: Arc<[u8]>,
}

impl Payload {
    pub(crate) fn new(signature: Signature, data: Vec<u8>) -> Self {
        Self {
            signature,
            data: data.into(),
        }
    }

    /// Wraps bytes received from elsewhere. The signature is parsed; the
    /// bytes are not checked until they are read or [`validate`](Self::validate)d.
    pub fn from_parts(signature: &str, data: Vec<u8>) -> Result<Self> {
        Ok(Self::new(Signature::parse(signature)?, data))
    }

    /// Encodes `values` in one step.
    pub fn encode(signature: &str, values: &[Value]) -> Result<Self> {
        let mut writer = Writer::new(signature)?;
        writer.write(signature, values)?;
        writer.seal()
    }

    /// A payload with no values
    pub fn empty() -> Self {
        Self::new(Signature::empty(), Vec::new())
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_arc(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// A fresh cursor positioned at the first value.
    pub fn reader(&self) -> Reader {
        Reader::new(self.clone())
    }

    /// Decodes every value, failing on malformed or trailing bytes.
    pub fn decode_with(&self, limits: &CodecLimits) -> Result<Vec<Value>> {
        let mut pos = 0;
        let mut values = Vec::with_capacity(self.signature.len());
        for ty in self.signature.types() {
            values.push(wire::decode(ty, &self.data, &mut pos, self.data.len(), limits)?);
        }
        if pos != self.data.len() {
            return Err(CodecError::TrailingBytes(self.data.len() - pos));
        }
        Ok(values)
    }

    pub fn decode(&self) -> Result<Vec<Value>> {
        self.decode_with(&CodecLimits::default())
    }

    /// Checks that the bytes are a well-formed encoding of the signature.
    pub fn validate(&self, limits: &CodecLimits) -> Result<()> {
        self.decode_with(limits).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::Type;

    #[test]
    fn test_message_type_tags_are_stable() {
        assert_eq!(MessageType::NodeDestroy.as_u64(), 0);
        assert_eq!(MessageType::Call.as_u64(), 1);
        assert_eq!(MessageType::Reply.as_u64(), 2);
        assert_eq!(MessageType::Error.as_u64(), 3);
        assert_eq!(MessageType::Seed.as_u64(), 4);
        assert_eq!(MessageType::try_from(3).unwrap(), MessageType::Error);
        assert_eq!(
            MessageType::try_from(9),
            Err(CodecError::InvalidMessageType(9))
        );
    }

    #[test]
    fn test_header_signatures_parse() {
        for ty in [
            MessageType::NodeDestroy,
            MessageType::Call,
            MessageType::Reply,
            MessageType::Error,
            MessageType::Seed,
        ] {
            assert!(Signature::parse(ty.header_signature()).is_ok());
        }
    }

    #[test]
    fn test_validate_rejects_trailing_bytes() {
        let payload = Payload::from_parts("u", vec![1, 0, 0, 0, 0]).unwrap();
        assert_eq!(
            payload.validate(&CodecLimits::default()),
            Err(CodecError::TrailingBytes(1))
        );
    }

    #[test]
    fn test_encode_and_decode() {
        let values = vec![
            Value::from("org.example.Component"),
            Value::some(Type::Uint32, 0u32.into()),
        ];
        let payload = Payload::encode("smu", &values).unwrap();
        assert_eq!(payload.decode().unwrap(), values);
    }

    #[test]
    fn test_clone_shares_bytes() {
        let payload = Payload::encode("s", &["shared".into()]).unwrap();
        let clone = payload.clone();
        assert!(Arc::ptr_eq(&payload.data, &clone.data));
    }
}
