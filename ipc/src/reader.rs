//! Decoding cursor
//!
//! A [`Reader`] walks a sealed [`Payload`] in signature order. Containers are
//! opened with [`Reader::enter`] and closed with [`Reader::exit`]; the number
//! of elements left in an array is discovered with [`Reader::peek_count`].
//!
//! The payload may come from an untrusted peer. Every read is bounded by the
//! innermost enclosing array body, and a failed operation restores the cursor
//! so later reads see the same state as before the failure.

use crate::error::CodecError;
use crate::message::Payload;
use crate::signature::{CodecLimits, Signature, Type};
use crate::value::Value;
use crate::wire;
use crate::Result;

#[derive(Debug, Clone)]
enum Frame {
    Array {
        element: Type,
        end: usize,
        remaining: u32,
    },
    Maybe {
        element: Type,
        pending: bool,
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
pub struct Reader {
    payload: Payload,
    limits: CodecLimits,
    pos: usize,
    stack: Vec<Frame>,
    top: usize,
}

impl Reader {
    pub fn new(payload: Payload) -> Self {
        Self::with_limits(payload, CodecLimits::default())
    }

    pub fn with_limits(payload: Payload, limits: CodecLimits) -> Self {
        Self {
            payload,
            limits,
            pos: 0,
            stack: Vec::new(),
            top: 0,
        }
    }

    pub fn signature(&self) -> &Signature {
        self.payload.signature()
    }

    /// Resets the cursor to the first value.
    pub fn rewind(&mut self) {
        self.pos = 0;
        self.stack.clear();
        self.top = 0;
    }

    /// Whether every top-level value has been consumed.
    pub fn is_done(&self) -> bool {
        self.stack.is_empty() && self.top >= self.payload.signature().len()
    }

    /// Type of the next value at the current position, or `None` when the
    /// current container has nothing left.
    pub fn peek_type(&self) -> Option<Type> {
        match self.stack.last() {
            None => self.payload.signature().types().get(self.top).cloned(),
            Some(Frame::Array {
                element, remaining, ..
            }) => (*remaining > 0).then(|| element.clone()),
            Some(Frame::Maybe { element, pending }) => pending.then(|| element.clone()),
            Some(Frame::Struct { fields, next }) => fields.get(*next).cloned(),
        }
    }

    /// Number of values left in the current container: elements for an
    /// array, 0 or 1 for an optional, fields for a struct, and top-level
    /// values outside any container.
    pub fn peek_count(&self) -> usize {
        match self.stack.last() {
            None => self.payload.signature().len().saturating_sub(self.top),
            Some(Frame::Array { remaining, .. }) => *remaining as usize,
            Some(Frame::Maybe { pending, .. }) => usize::from(*pending),
            Some(Frame::Struct { fields, next }) => fields.len().saturating_sub(*next),
        }
    }

    fn bound(&self) -> usize {
        self.stack
            .iter()
            .rev()
            .find_map(|frame| match frame {
                Frame::Array { end, .. } => Some(*end),
                _ => None,
            })
            .unwrap_or(self.payload.data().len())
    }

    fn advance(&mut self) {
        match self.stack.last_mut() {
            None => self.top += 1,
            Some(Frame::Array { remaining, .. }) => *remaining = remaining.saturating_sub(1),
            Some(Frame::Maybe { pending, .. }) => *pending = false,
            Some(Frame::Struct { next, .. }) => *next += 1,
        }
    }

    fn atomically<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let pos = self.pos;
        let stack = self.stack.clone();
        let top = self.top;
        let result = op(self);
        if result.is_err() {
            self.pos = pos;
            self.stack = stack;
            self.top = top;
        }
        result
    }

    /// Opens one container per tag: `a` array, `m` optional, `(` struct.
    pub fn enter(&mut self, containers: &str) -> Result<()> {
        let data = self.payload.data_arc();
        self.atomically(|r| {
            for tag in containers.chars() {
                let expected = r.peek_type().ok_or(CodecError::NoMoreValues)?;
                let bound = r.bound();
                let frame = match (tag, expected) {
                    ('a', Type::Array(element)) => {
                        let (end, count) =
                            wire::array_header(&data, &mut r.pos, bound, &element, &r.limits)?;
                        Frame::Array {
                            element: *element,
                            end,
                            remaining: count,
                        }
                    }
                    ('m', Type::Maybe(element)) => Frame::Maybe {
                        pending: wire::maybe_tag(&data, &mut r.pos, bound)?,
                        element: *element,
                    },
                    ('(', Type::Struct(fields)) => Frame::Struct { fields, next: 0 },
                    (tag, found) => {
                        return Err(CodecError::ContainerMismatch {
                            op: "enter",
                            tag,
                            found: found.to_string(),
                        })
                    }
                };
                r.stack.push(frame);
            }
            Ok(())
        })
    }

    /// Closes one container per tag, innermost first: `)` struct, `a` array,
    /// `m` optional. Unread values inside the container are skipped.
    pub fn exit(&mut self, containers: &str) -> Result<()> {
        let data = self.payload.data_arc();
        self.atomically(|r| {
            for tag in containers.chars() {
                let frame = r.stack.pop().ok_or_else(|| CodecError::ContainerMismatch {
                    op: "exit",
                    tag,
                    found: "no entered container".to_string(),
                })?;
                match (tag, frame) {
                    ('a', Frame::Array { end, remaining, .. }) => {
                        if remaining == 0 && r.pos != end {
                            return Err(CodecError::TrailingBytes(end.saturating_sub(r.pos)));
                        }
                        r.pos = end;
                    }
                    ('m', Frame::Maybe { element, pending }) => {
                        if pending {
                            let bound = r.bound();
                            wire::decode(&element, &data, &mut r.pos, bound, &r.limits)?;
                        }
                    }
                    (')', Frame::Struct { fields, next }) => {
                        let bound = r.bound();
                        for field in &fields[next..] {
                            wire::decode(field, &data, &mut r.pos, bound, &r.limits)?;
                        }
                    }
                    (tag, frame) => {
                        return Err(CodecError::ContainerMismatch {
                            op: "exit",
                            tag,
                            found: format!("entered '{}'", frame.tag()),
                        })
                    }
                }
                r.advance();
            }
            Ok(())
        })
    }

    /// Reads the values described by `signature` from the current position.
    pub fn read(&mut self, signature: &str) -> Result<Vec<Value>> {
        let types = Signature::parse_with(signature, &self.limits)?;
        let data = self.payload.data_arc();
        self.atomically(|r| {
            let mut values = Vec::with_capacity(types.len());
            for ty in types.types() {
                let expected = r.peek_type().ok_or(CodecError::NoMoreValues)?;
                if expected != *ty {
                    return Err(CodecError::TypeMismatch {
                        expected: expected.to_string(),
                        found: ty.to_string(),
                    });
                }
                let bound = r.bound();
                values.push(wire::decode(ty, &data, &mut r.pos, bound, &r.limits)?);
                r.advance();
            }
            Ok(values)
        })
    }

    /// Reads exactly one value of type `ty`.
    pub fn read_one(&mut self, ty: &str) -> Result<Value> {
        let ty = Type::parse_with(ty, &self.limits)?;
        let mut values = self.read(&ty.to_string())?;
        values.pop().ok_or(CodecError::NoMoreValues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Writer;

    fn dependencies() -> Payload {
        let mut writer = Writer::new("a(su)").unwrap();
        writer.begin("a").unwrap();
        for (name, index) in [("B", 0u32), ("C", 1)] {
            writer.begin("(").unwrap();
            writer.write("su", &[name.into(), index.into()]).unwrap();
            writer.end(")").unwrap();
        }
        writer.end("a").unwrap();
        writer.seal().unwrap()
    }

    #[test]
    fn test_enter_and_peek_count() {
        let mut reader = Reader::new(dependencies());
        assert_eq!(reader.peek_count(), 1);
        reader.enter("a").unwrap();
        assert_eq!(reader.peek_count(), 2);

        let mut names = Vec::new();
        while reader.peek_count() > 0 {
            reader.enter("(").unwrap();
            let values = reader.read("su").unwrap();
            names.push(values[0].as_str().unwrap().to_string());
            reader.exit(")").unwrap();
        }
        reader.exit("a").unwrap();
        assert_eq!(names, ["B", "C"]);
        assert!(reader.is_done());
    }

    #[test]
    fn test_read_past_end_is_error() {
        let mut reader = Reader::new(dependencies());
        reader.enter("a").unwrap();
        reader.read("(su)").unwrap();
        reader.read("(su)").unwrap();
        assert_eq!(reader.read("(su)"), Err(CodecError::NoMoreValues));
    }

    #[test]
    fn test_unmatched_exit_does_not_corrupt() {
        let mut reader = Reader::new(dependencies());
        assert!(reader.exit(")").is_err());
        reader.enter("a(").unwrap();
        assert!(reader.exit("a").is_err());
        assert_eq!(reader.read("s").unwrap(), vec![Value::from("B")]);
        reader.exit(")").unwrap();
        assert_eq!(reader.peek_count(), 1);
    }

    #[test]
    fn test_failed_read_restores_cursor() {
        let mut reader = Reader::new(dependencies());
        reader.enter("a(").unwrap();
        assert!(reader.read("sus").is_err());
        assert!(reader.read("uu").is_err());
        assert_eq!(reader.read("su").unwrap()[1], Value::Uint32(0));
    }

    #[test]
    fn test_exit_skips_unread_elements() {
        let payload = Payload::encode(
            "asu",
            &[
                Value::array(Type::String, vec!["x".into(), "y".into()]),
                7u32.into(),
            ],
        )
        .unwrap();
        let mut reader = Reader::new(payload);
        reader.enter("a").unwrap();
        reader.read("s").unwrap();
        reader.exit("a").unwrap();
        assert_eq!(reader.read("u").unwrap(), vec![Value::Uint32(7)]);
    }

    #[test]
    fn test_rewind() {
        let mut reader = Reader::new(dependencies());
        let first = reader.read("a(su)").unwrap();
        assert!(reader.read("a(su)").is_err());
        reader.rewind();
        assert_eq!(reader.read("a(su)").unwrap(), first);
    }

    #[test]
    fn test_truncated_payload_errors() {
        let full = dependencies();
        let truncated =
            Payload::from_parts("a(su)", full.data()[..full.data().len() - 2].to_vec()).unwrap();
        let mut reader = Reader::new(truncated);
        assert!(reader.read("a(su)").is_err());
        assert!(reader.enter("a").is_err());
        assert_eq!(reader.peek_count(), 1);
    }

    #[test]
    fn test_maybe_enter() {
        let payload = Payload::encode(
            "mumu",
            &[Value::some(Type::Uint32, 3u32.into()), Value::none(Type::Uint32)],
        )
        .unwrap();
        let mut reader = Reader::new(payload);
        reader.enter("m").unwrap();
        assert_eq!(reader.peek_count(), 1);
        assert_eq!(reader.read("u").unwrap(), vec![Value::Uint32(3)]);
        reader.exit("m").unwrap();
        reader.enter("m").unwrap();
        assert_eq!(reader.peek_count(), 0);
        reader.exit("m").unwrap();
        assert!(reader.is_done());
    }
}
