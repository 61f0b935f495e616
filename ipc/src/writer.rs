//! Encoding cursor
//!
//! A [`Writer`] is created for a declared signature and appends values in
//! signature order. Containers are opened with [`Writer::begin`] and closed
//! with [`Writer::end`]. Array element counts are not declared up front; the
//! header is back-patched when the array is closed.
//!
//! Every operation either succeeds completely or leaves the writer exactly as
//! it was.

use crate::error::CodecError;
use crate::message::Payload;
use crate::signature::{CodecLimits, Signature, Type};
use crate::value::Value;
use crate::wire::{self, ARRAY_HEADER};
use crate::Result;

#[derive(Debug, Clone)]
enum Frame {
    Array {
        element: Type,
        header_at: usize,
        count: u32,
    },
    Maybe {
        element: Type,
        tag_at: usize,
        filled: bool,
    },
    Struct {
        fields: Vec<Type>,
        next: usize,
    },
}

impl Frame {
    fn tag(&self) -> char {
        match self {
            Frame::Array { .. } => 'a',
            Frame::Maybe { .. } => 'm',
            Frame::Struct { .. } => '(',
        }
    }
}

#[derive(Debug, Clone)]
pub struct Writer {
    signature: Signature,
    limits: CodecLimits,
    buf: Vec<u8>,
    stack: Vec<Frame>,
    top: usize,
}

impl Writer {
    pub fn new(signature: &str) -> Result<Self> {
        Self::with_limits(signature, CodecLimits::default())
    }

    pub fn with_limits(signature: &str, limits: CodecLimits) -> Result<Self> {
        Ok(Self {
            signature: Signature::parse_with(signature, &limits)?,
            limits,
            buf: Vec::new(),
            stack: Vec::new(),
            top: 0,
        })
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The type the next written value must have, or `None` if the current
    /// container (or the whole signature) is complete.
    pub fn peek_type(&self) -> Option<Type> {
        match self.stack.last() {
            None => self.signature.types().get(self.top).cloned(),
            Some(Frame::Array { element, .. }) => Some(element.clone()),
            Some(Frame::Maybe {
                element, filled, ..
            }) => (!filled).then(|| element.clone()),
            Some(Frame::Struct { fields, next }) => fields.get(*next).cloned(),
        }
    }

    fn advance(&mut self) {
        match self.stack.last_mut() {
            None => self.top += 1,
            Some(Frame::Array { count, .. }) => *count += 1,
            Some(Frame::Maybe { tag_at, filled, .. }) => {
                *filled = true;
                self.buf[*tag_at] = 1;
            }
            Some(Frame::Struct { next, .. }) => *next += 1,
        }
    }

    fn atomically<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let len = self.buf.len();
        let stack = self.stack.clone();
        let top = self.top;
        let result = op(self);
        if result.is_err() {
            self.buf.truncate(len);
            self.stack = stack;
            self.top = top;
        }
        result
    }

    /// Opens one container per tag: `a` array, `m` optional, `(` struct.
    ///
    /// `begin("a(")` opens an array and then its first struct element.
    pub fn begin(&mut self, containers: &str) -> Result<()> {
        self.atomically(|w| {
            for tag in containers.chars() {
                let expected = w.peek_type().ok_or(CodecError::NoMoreValues)?;
                let frame = match (tag, expected) {
                    ('a', Type::Array(element)) => {
                        let header_at = w.buf.len();
                        w.buf.extend_from_slice(&[0; ARRAY_HEADER]);
                        Frame::Array {
                            element: *element,
                            header_at,
                            count: 0,
                        }
                    }
                    ('m', Type::Maybe(element)) => {
                        let tag_at = w.buf.len();
                        w.buf.push(0);
                        Frame::Maybe {
                            element: *element,
                            tag_at,
                            filled: false,
                        }
                    }
                    ('(', Type::Struct(fields)) => Frame::Struct { fields, next: 0 },
                    (tag, found) => {
                        return Err(CodecError::ContainerMismatch {
                            op: "begin",
                            tag,
                            found: found.to_string(),
                        })
                    }
                };
                w.stack.push(frame);
            }
            Ok(())
        })
    }

    /// Closes one container per tag, innermost first: `)` struct, `a` array,
    /// `m` optional. An optional closed without a value encodes as absent.
    pub fn end(&mut self, containers: &str) -> Result<()> {
        self.atomically(|w| {
            for tag in containers.chars() {
                let frame = w.stack.pop().ok_or_else(|| CodecError::ContainerMismatch {
                    op: "end",
                    tag,
                    found: "no open container".to_string(),
                })?;
                match (tag, frame) {
                    ('a', Frame::Array {
                        header_at, count, ..
                    }) => wire::patch_array_header(&mut w.buf, header_at, count)?,
                    ('m', Frame::Maybe { .. }) => {}
                    (')', Frame::Struct { fields, next }) => {
                        if let Some(missing) = fields[next..].iter().find(|f| !f.is_unit()) {
                            return Err(CodecError::MissingValue(missing.to_string()));
                        }
                    }
                    (tag, frame) => {
                        return Err(CodecError::ContainerMismatch {
                            op: "end",
                            tag,
                            found: format!("open '{}'", frame.tag()),
                        })
                    }
                }
                w.advance();
            }
            Ok(())
        })
    }

    /// Writes `values` whose types are described 1:1 by `signature`.
    pub fn write(&mut self, signature: &str, values: &[Value]) -> Result<()> {
        let types = Signature::parse_with(signature, &self.limits)?;
        if types.len() != values.len() {
            return Err(CodecError::ArityMismatch {
                types: types.len(),
                values: values.len(),
            });
        }

        self.atomically(|w| {
            for (ty, value) in types.types().iter().zip(values) {
                if !value.matches(ty) {
                    return Err(CodecError::TypeMismatch {
                        expected: ty.to_string(),
                        found: value.value_type().to_string(),
                    });
                }
                let expected = w.peek_type().ok_or(CodecError::NoMoreValues)?;
                if expected != *ty {
                    return Err(CodecError::TypeMismatch {
                        expected: expected.to_string(),
                        found: ty.to_string(),
                    });
                }
                wire::encode(value, &mut w.buf)?;
                w.advance();
            }
            Ok(())
        })
    }

    /// Appends one pre-encoded value of type `ty`. The bytes must decode as
    /// exactly one complete value of that type.
    pub fn insert(&mut self, ty: &str, data: &[u8]) -> Result<()> {
        let ty = Type::parse_with(ty, &self.limits)?;
        let expected = self.peek_type().ok_or(CodecError::NoMoreValues)?;
        if expected != ty {
            return Err(CodecError::TypeMismatch {
                expected: expected.to_string(),
                found: ty.to_string(),
            });
        }

        let mut pos = 0;
        wire::decode(&ty, data, &mut pos, data.len(), &self.limits)?;
        if pos != data.len() {
            return Err(CodecError::TrailingBytes(data.len() - pos));
        }

        self.buf.extend_from_slice(data);
        self.advance();
        Ok(())
    }

    /// Produces the immutable payload. Fails if a container is still open or
    /// a non-unit value of the signature was never written; trailing `()`
    /// values are implied.
    pub fn seal(&self) -> Result<Payload> {
        if let Some(frame) = self.stack.last() {
            return Err(CodecError::UnclosedContainer(frame.tag()));
        }
        if let Some(missing) = self.signature.types()[self.top..]
            .iter()
            .find(|ty| !ty.is_unit())
        {
            return Err(CodecError::MissingValue(missing.to_string()));
        }
        Ok(Payload::new(self.signature.clone(), self.buf.clone()))
    }
}
