use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hasher;
use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::command::Executable;

/// A dynamically typed value flowing through the interpreter and the
/// resource store.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Decimal(Decimal),
    String(Arc<str>),
    Object(Object),
}

/// Host-side objects that can live in a resource slot.
#[derive(Clone)]
pub enum Object {
    /// Something `InvokeResource` can execute.
    Command(Arc<dyn Executable>),
    /// Integer-indexed collection.
    List(Arc<RwLock<Vec<Value>>>),
    /// String-keyed collection.
    Map(Arc<RwLock<HashMap<Arc<str>, Value>>>),
    /// Opaque host identity, e.g. the owner of a scope.
    Host(Arc<dyn Any + Send + Sync>),
}

/// The numeric promotion tower, lowest rank first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NumericKind {
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Decimal,
}

impl NumericKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float32 => "float",
            Self::Float64 => "double",
            Self::Decimal => "decimal",
        }
    }

    pub fn is_unsigned(self) -> bool {
        matches!(self, Self::UInt32 | Self::UInt64)
    }

    pub fn is_real(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }
}

impl Value {
    pub fn string(text: impl Into<Arc<str>>) -> Self {
        Self::String(text.into())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Object(Object::List(Arc::new(RwLock::new(
            items.into_iter().collect(),
        ))))
    }

    pub fn map<K: Into<Arc<str>>>(
        entries: impl IntoIterator<Item = (K, Value)>,
    ) -> Self {
        let map = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::Object(Object::Map(Arc::new(RwLock::new(map))))
    }

    pub fn command(command: impl Executable + 'static) -> Self {
        Self::Object(Object::Command(Arc::new(command)))
    }

    pub fn host<T: Any + Send + Sync>(object: T) -> Self {
        Self::Object(Object::Host(Arc::new(object)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Rank in the promotion tower, `None` for non-numeric values.
    pub fn numeric_kind(&self) -> Option<NumericKind> {
        Some(match self {
            Self::Int32(_) => NumericKind::Int32,
            Self::UInt32(_) => NumericKind::UInt32,
            Self::Int64(_) => NumericKind::Int64,
            Self::UInt64(_) => NumericKind::UInt64,
            Self::Float32(_) => NumericKind::Float32,
            Self::Float64(_) => NumericKind::Float64,
            Self::Decimal(_) => NumericKind::Decimal,
            _ => return None,
        })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
            Self::Object(object) => object.kind_name(),
            numeric => numeric
                .numeric_kind()
                .map_or("number", NumericKind::name),
        }
    }

    /// Equality that also requires the same kind, so `1` and `1.0` differ.
    pub fn is_identical(&self, other: &Value) -> bool {
        self.kind_name() == other.kind_name() && self == other
    }

    /// Text used when a value takes part in string concatenation.
    pub fn concat_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Feeds a stable fingerprint of the value into `hasher`.
    ///
    /// Unlike equality this distinguishes numeric kinds.
    pub fn hash_into<H: Hasher>(&self, hasher: &mut H) {
        match self {
            Self::Null => hasher.write_u8(0),
            Self::Bool(b) => {
                hasher.write_u8(1);
                hasher.write_u8(*b as u8);
            }
            Self::Int32(v) => {
                hasher.write_u8(2);
                hasher.write_i32(*v);
            }
            Self::Int64(v) => {
                hasher.write_u8(3);
                hasher.write_i64(*v);
            }
            Self::UInt32(v) => {
                hasher.write_u8(4);
                hasher.write_u32(*v);
            }
            Self::UInt64(v) => {
                hasher.write_u8(5);
                hasher.write_u64(*v);
            }
            Self::Float32(v) => {
                hasher.write_u8(6);
                hasher.write_u32(v.to_bits());
            }
            Self::Float64(v) => {
                hasher.write_u8(7);
                hasher.write_u64(v.to_bits());
            }
            Self::Decimal(d) => {
                hasher.write_u8(8);
                hasher.write(&d.serialize());
            }
            Self::String(s) => {
                hasher.write_u8(9);
                hasher.write(s.as_bytes());
            }
            Self::Object(object) => {
                hasher.write_u8(10);
                hasher.write_usize(object.address());
            }
        }
    }
}

impl Object {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Host(_) => "object",
        }
    }

    fn address(&self) -> usize {
        match self {
            Self::Command(c) => Arc::as_ptr(c) as *const () as usize,
            Self::List(l) => Arc::as_ptr(l) as *const () as usize,
            Self::Map(m) => Arc::as_ptr(m) as *const () as usize,
            Self::Host(h) => Arc::as_ptr(h) as *const () as usize,
        }
    }

    /// Identity comparison.
    pub fn same(&self, other: &Object) -> bool {
        self.address() == other.address()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(_) => f.write_str("Command(..)"),
            Self::List(items) => f.debug_list().entries(items.read().iter()).finish(),
            Self::Map(entries) => f.debug_map().entries(entries.read().iter()).finish(),
            Self::Host(_) => write!(f, "Host({:#x})", self.address()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Null, _) | (_, Self::Null) => false,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.same(b),
            (a, b) => match (a.numeric_kind(), b.numeric_kind()) {
                (Some(ka), Some(kb)) => crate::ops::numeric_eq(a, b, ka.max(kb)),
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::String(s) => f.write_str(s),
            Self::Object(Object::List(items)) => {
                write!(f, "[list of {}]", items.read().len())
            }
            Self::Object(Object::Map(entries)) => {
                write!(f, "[map of {}]", entries.read().len())
            }
            Self::Object(object) => write!(f, "[{}]", object.kind_name()),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i32 => Int32,
    i64 => Int64,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    Decimal => Decimal,
    Object => Object,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v.into())
    }
}

impl From<Arc<str>> for Value {
    fn from(v: Arc<str>) -> Self {
        Self::String(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
