//! Boxed host value.

use std::fmt;

use crate::handle::HostObject;

/// A dynamically typed value as seen by the host.
///
/// Every argument and return value crosses the boundary in this form.
/// Integers of every native width travel as `Int`, both float widths as
/// `Float`.
#[derive(Clone, Default)]
pub enum Dynamic {
    /// The host's "no value" token; void results map here.
    #[default]
    Undefined,
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value (owned)
    String(String),
    /// Array value. `None` marks a hole in a sparse array.
    Array(Vec<Option<Dynamic>>),
    /// Proxy for a native object
    Object(HostObject),
}

impl Dynamic {
    /// Build a dense array.
    pub fn array<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Dynamic>,
    {
        Dynamic::Array(items.into_iter().map(|item| Some(item.into())).collect())
    }

    /// Get a human-readable name for this value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Dynamic::Undefined => "undefined",
            Dynamic::Null => "null",
            Dynamic::Bool(_) => "bool",
            Dynamic::Int(_) => "int",
            Dynamic::Float(_) => "float",
            Dynamic::String(_) => "string",
            Dynamic::Array(_) => "array",
            Dynamic::Object(_) => "object",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Dynamic::Undefined)
    }

    /// True for both `Null` and `Undefined`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Dynamic::Null | Dynamic::Undefined)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Dynamic::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Dynamic::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers widen to float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Dynamic::Float(v) => Some(*v),
            Dynamic::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Dynamic::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Option<Dynamic>]> {
        match self {
            Dynamic::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            Dynamic::Object(object) => Some(object),
            _ => None,
        }
    }
}

impl fmt::Debug for Dynamic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dynamic::Undefined => write!(f, "Undefined"),
            Dynamic::Null => write!(f, "Null"),
            Dynamic::Bool(v) => write!(f, "Bool({})", v),
            Dynamic::Int(v) => write!(f, "Int({})", v),
            Dynamic::Float(v) => write!(f, "Float({})", v),
            Dynamic::String(s) => write!(f, "String({:?})", s),
            Dynamic::Array(items) => f.debug_list().entries(items).finish(),
            Dynamic::Object(object) => write!(f, "Object({:?})", object),
        }
    }
}

impl PartialEq for Dynamic {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Dynamic::Undefined, Dynamic::Undefined) => true,
            (Dynamic::Null, Dynamic::Null) => true,
            (Dynamic::Bool(a), Dynamic::Bool(b)) => a == b,
            (Dynamic::Int(a), Dynamic::Int(b)) => a == b,
            (Dynamic::Float(a), Dynamic::Float(b)) => a == b,
            (Dynamic::String(a), Dynamic::String(b)) => a == b,
            (Dynamic::Array(a), Dynamic::Array(b)) => a == b,
            // objects compare by proxy identity
            (Dynamic::Object(a), Dynamic::Object(b)) => HostObject::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Dynamic {
    fn from(value: bool) -> Self {
        Dynamic::Bool(value)
    }
}

impl From<i32> for Dynamic {
    fn from(value: i32) -> Self {
        Dynamic::Int(value.into())
    }
}

impl From<i64> for Dynamic {
    fn from(value: i64) -> Self {
        Dynamic::Int(value)
    }
}

impl From<f64> for Dynamic {
    fn from(value: f64) -> Self {
        Dynamic::Float(value)
    }
}

impl From<&str> for Dynamic {
    fn from(value: &str) -> Self {
        Dynamic::String(value.to_owned())
    }
}

impl From<String> for Dynamic {
    fn from(value: String) -> Self {
        Dynamic::String(value)
    }
}

impl From<HostObject> for Dynamic {
    fn from(value: HostObject) -> Self {
        Dynamic::Object(value)
    }
}
