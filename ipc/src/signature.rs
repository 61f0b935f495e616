//! Signature parsing
//!
//! A signature is a string of type tags describing a sequence of values. It is
//! parsed once into a [`Type`] tree and every cursor operation is driven by
//! that tree.

use crate::error::CodecError;
use crate::Result;
use std::fmt;

/// Default maximum signature length in bytes
pub const MAX_SIGNATURE_LENGTH: usize = 255;

/// Default maximum container nesting depth
pub const MAX_DEPTH: usize = 32;

/// Default cap on element counts for arrays of zero-sized values
pub const MAX_UNIT_ELEMENTS: u32 = 1 << 16;

/// Limits applied while parsing signatures and decoding payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecLimits {
    /// Longest accepted signature string
    pub max_signature_len: usize,
    /// Deepest accepted container nesting
    pub max_depth: usize,
    /// Largest element count accepted for arrays whose elements encode to nothing
    pub max_unit_elements: u32,
}

impl CodecLimits {
    pub fn with_max_signature_len(mut self, len: usize) -> Self {
        self.max_signature_len = len;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_unit_elements(mut self, count: u32) -> Self {
        self.max_unit_elements = count;
        self
    }
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_signature_len: MAX_SIGNATURE_LENGTH,
            max_depth: MAX_DEPTH,
            max_unit_elements: MAX_UNIT_ELEMENTS,
        }
    }
}

/// A single complete type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    Byte,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Double,
    String,
    /// Index into the handle attachments of the enclosing message
    Handle,
    /// Index into the descriptor attachments of the enclosing message
    Fd,
    Array(Box<Type>),
    Maybe(Box<Type>),
    Struct(Vec<Type>),
}

impl Type {
    /// Parses exactly one complete type.
    pub fn parse(input: &str) -> Result<Type> {
        Self::parse_with(input, &CodecLimits::default())
    }

    pub fn parse_with(input: &str, limits: &CodecLimits) -> Result<Type> {
        let signature = Signature::parse_with(input, limits)?;
        let mut types = signature.types;
        if types.len() != 1 {
            return Err(CodecError::InvalidSignature {
                signature: input.to_string(),
                reason: "expected exactly one complete type",
            });
        }
        Ok(types.remove(0))
    }

    /// Smallest number of bytes any encoding of this type occupies.
    pub fn min_size(&self) -> usize {
        match self {
            Type::Bool | Type::Byte => 1,
            Type::Int16 | Type::Uint16 => 2,
            Type::Int32 | Type::Uint32 | Type::Handle | Type::Fd => 4,
            Type::Int64 | Type::Uint64 | Type::Double => 8,
            Type::String => 4,
            Type::Array(_) => 8,
            Type::Maybe(_) => 1,
            Type::Struct(fields) => fields.iter().map(Type::min_size).sum(),
        }
    }

    /// Whether the type encodes to zero bytes (`()` and structs of `()`).
    pub fn is_unit(&self) -> bool {
        matches!(self, Type::Struct(fields) if fields.iter().all(Type::is_unit))
    }

    /// The tag used to open this type as a container, if it is one.
    pub fn container_tag(&self) -> Option<char> {
        match self {
            Type::Array(_) => Some('a'),
            Type::Maybe(_) => Some('m'),
            Type::Struct(_) => Some('('),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => f.write_str("b"),
            Type::Byte => f.write_str("y"),
            Type::Int16 => f.write_str("n"),
            Type::Uint16 => f.write_str("q"),
            Type::Int32 => f.write_str("i"),
            Type::Uint32 => f.write_str("u"),
            Type::Int64 => f.write_str("x"),
            Type::Uint64 => f.write_str("t"),
            Type::Double => f.write_str("d"),
            Type::String => f.write_str("s"),
            Type::Handle => f.write_str("h"),
            Type::Fd => f.write_str("f"),
            Type::Array(element) => write!(f, "a{}", element),
            Type::Maybe(element) => write!(f, "m{}", element),
            Type::Struct(fields) => {
                f.write_str("(")?;
                for field in fields {
                    write!(f, "{}", field)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// A parsed signature: the source text plus its sequence of types
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    text: String,
    types: Vec<Type>,
}

impl Signature {
    /// Parses a signature with the default limits.
    pub fn parse(input: &str) -> Result<Signature> {
        Self::parse_with(input, &CodecLimits::default())
    }

    pub fn parse_with(input: &str, limits: &CodecLimits) -> Result<Signature> {
        if input.len() > limits.max_signature_len {
            return Err(CodecError::InvalidSignature {
                signature: input.to_string(),
                reason: "signature too long",
            });
        }

        let mut parser = Parser {
            source: input,
            bytes: input.as_bytes(),
            pos: 0,
            limits,
        };
        let mut types = Vec::new();
        while parser.pos < parser.bytes.len() {
            types.push(parser.parse_type(0)?);
        }

        Ok(Signature {
            text: input.to_string(),
            types,
        })
    }

    /// The empty signature: no values at all.
    pub fn empty() -> Signature {
        Signature {
            text: String::new(),
            types: Vec::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn types(&self) -> &[Type] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

struct Parser<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    limits: &'a CodecLimits,
}

impl Parser<'_> {
    fn fail(&self, reason: &'static str) -> CodecError {
        CodecError::InvalidSignature {
            signature: self.source.to_string(),
            reason,
        }
    }

    fn parse_type(&mut self, depth: usize) -> Result<Type> {
        if depth > self.limits.max_depth {
            return Err(CodecError::TooDeep(self.limits.max_depth));
        }

        let tag = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| self.fail("unexpected end of signature"))?;
        self.pos += 1;

        let ty = match tag {
            b'b' => Type::Bool,
            b'y' => Type::Byte,
            b'n' => Type::Int16,
            b'q' => Type::Uint16,
            b'i' => Type::Int32,
            b'u' => Type::Uint32,
            b'x' => Type::Int64,
            b't' => Type::Uint64,
            b'd' => Type::Double,
            b's' => Type::String,
            b'h' => Type::Handle,
            b'f' => Type::Fd,
            b'a' => Type::Array(Box::new(self.parse_type(depth + 1)?)),
            b'm' => Type::Maybe(Box::new(self.parse_type(depth + 1)?)),
            b'(' => {
                let mut fields = Vec::new();
                loop {
                    match self.bytes.get(self.pos) {
                        Some(b')') => {
                            self.pos += 1;
                            break;
                        }
                        Some(_) => fields.push(self.parse_type(depth + 1)?),
                        None => return Err(self.fail("unterminated struct")),
                    }
                }
                Type::Struct(fields)
            }
            b')' => return Err(self.fail("unbalanced ')'")),
            _ => return Err(self.fail("unknown type tag")),
        };

        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalars() {
        let sig = Signature::parse("bynqiuxtdshf").unwrap();
        assert_eq!(sig.len(), 12);
        assert_eq!(sig.types()[9], Type::String);
        assert_eq!(sig.to_string(), "bynqiuxtdshf");
    }

    #[test]
    fn test_parse_containers() {
        let sig = Signature::parse("a(su)").unwrap();
        assert_eq!(
            sig.types(),
            &[Type::Array(Box::new(Type::Struct(vec![
                Type::String,
                Type::Uint32
            ])))]
        );

        let sig = Signature::parse("(ssmu)").unwrap();
        assert_eq!(
            sig.types()[0],
            Type::Struct(vec![
                Type::String,
                Type::String,
                Type::Maybe(Box::new(Type::Uint32))
            ])
        );
    }

    #[test]
    fn test_display_roundtrip() {
        for text in ["", "()", "a(su)", "maas", "((u)(s))"] {
            let sig = Signature::parse(text).unwrap();
            let rendered: String = sig.types().iter().map(|t| t.to_string()).collect();
            assert_eq!(rendered, text);
        }
    }

    #[test]
    fn test_reject_malformed() {
        assert!(Signature::parse("(su").is_err());
        assert!(Signature::parse("su)").is_err());
        assert!(Signature::parse("a").is_err());
        assert!(Signature::parse("m").is_err());
        assert!(Signature::parse("z").is_err());
    }

    #[test]
    fn test_depth_limit() {
        let deep = "a".repeat(40) + "u";
        assert_eq!(Signature::parse(&deep), Err(CodecError::TooDeep(MAX_DEPTH)));

        let limits = CodecLimits::default().with_max_depth(64);
        assert!(Signature::parse_with(&deep, &limits).is_ok());
    }

    #[test]
    fn test_length_limit() {
        let long = "u".repeat(MAX_SIGNATURE_LENGTH + 1);
        assert!(matches!(
            Signature::parse(&long),
            Err(CodecError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_unit_detection() {
        assert!(Type::parse("()").unwrap().is_unit());
        assert!(Type::parse("(())").unwrap().is_unit());
        assert!(!Type::parse("(u)").unwrap().is_unit());
        assert_eq!(Type::parse("(su)").unwrap().min_size(), 8);
    }

    #[test]
    fn test_single_type_parse() {
        assert!(Type::parse("su").is_err());
        assert!(Type::parse("").is_err());
        assert_eq!(Type::parse("as").unwrap().container_tag(), Some('a'));
    }
}
