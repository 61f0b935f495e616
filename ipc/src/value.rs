//! Typed value tree
//!
//! [`Value`] is the recursive sum type the codec reads and writes. Container
//! values carry their element type so that empty arrays and absent optionals
//! still describe themselves.

use crate::signature::Type;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Byte(u8),
    Int16(i16),
    Uint16(u16),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Double(f64),
    String(String),
    Handle(u32),
    Fd(u32),
    Array(Type, Vec<Value>),
    Maybe(Type, Option<Box<Value>>),
    Struct(Vec<Value>),
}

impl Value {
    pub fn array(element: Type, items: Vec<Value>) -> Value {
        Value::Array(element, items)
    }

    pub fn some(element: Type, value: Value) -> Value {
        Value::Maybe(element, Some(Box::new(value)))
    }

    pub fn none(element: Type) -> Value {
        Value::Maybe(element, None)
    }

    /// The empty struct, `()`.
    pub fn unit() -> Value {
        Value::Struct(Vec::new())
    }

    /// The type this value encodes as.
    pub fn value_type(&self) -> Type {
        match self {
            Value::Bool(_) => Type::Bool,
            Value::Byte(_) => Type::Byte,
            Value::Int16(_) => Type::Int16,
            Value::Uint16(_) => Type::Uint16,
            Value::Int32(_) => Type::Int32,
            Value::Uint32(_) => Type::Uint32,
            Value::Int64(_) => Type::Int64,
            Value::Uint64(_) => Type::Uint64,
            Value::Double(_) => Type::Double,
            Value::String(_) => Type::String,
            Value::Handle(_) => Type::Handle,
            Value::Fd(_) => Type::Fd,
            Value::Array(element, _) => Type::Array(Box::new(element.clone())),
            Value::Maybe(element, _) => Type::Maybe(Box::new(element.clone())),
            Value::Struct(fields) => Type::Struct(fields.iter().map(Value::value_type).collect()),
        }
    }

    /// Whether this value, including every nested element, conforms to `ty`.
    pub fn matches(&self, ty: &Type) -> bool {
        match (self, ty) {
            (Value::Array(element, items), Type::Array(expected)) => {
                element == expected.as_ref() && items.iter().all(|item| item.matches(expected))
            }
            (Value::Maybe(element, inner), Type::Maybe(expected)) => {
                element == expected.as_ref()
                    && inner.as_ref().map_or(true, |value| value.matches(expected))
            }
            (Value::Struct(fields), Type::Struct(expected)) => {
                fields.len() == expected.len()
                    && fields.iter().zip(expected).all(|(field, ty)| field.matches(ty))
            }
            (Value::Bool(_), Type::Bool)
            | (Value::Byte(_), Type::Byte)
            | (Value::Int16(_), Type::Int16)
            | (Value::Uint16(_), Type::Uint16)
            | (Value::Int32(_), Type::Int32)
            | (Value::Uint32(_), Type::Uint32)
            | (Value::Int64(_), Type::Int64)
            | (Value::Uint64(_), Type::Uint64)
            | (Value::Double(_), Type::Double)
            | (Value::String(_), Type::String)
            | (Value::Handle(_), Type::Handle)
            | (Value::Fd(_), Type::Fd) => true,
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Uint32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Attachment index of a handle value
    pub fn as_handle(&self) -> Option<u32> {
        match self {
            Value::Handle(v) => Some(*v),
            _ => None,
        }
    }

    /// Attachment index of a descriptor value
    pub fn as_fd(&self) -> Option<u32> {
        match self {
            Value::Fd(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(_, items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&[Value]> {
        match self {
            Value::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// `Some(Some(v))` for a present optional, `Some(None)` for an absent one.
    pub fn as_maybe(&self) -> Option<Option<&Value>> {
        match self {
            Value::Maybe(_, inner) => Some(inner.as_deref()),
            _ => None,
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    u8 => Byte,
    i16 => Int16,
    u16 => Uint16,
    i32 => Int32,
    u32 => Uint32,
    i64 => Int64,
    u64 => Uint64,
    f64 => Double,
    String => String,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
