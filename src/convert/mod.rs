//! Marshaling between native values and host [`Dynamic`] values.
//!
//! This module provides the per-type converter catalogue:
//! - [`FromDynamic`]: check and decode a host value into a native value
//! - [`IntoDynamic`]: encode a native value for the host
//!
//! ## Supported Types
//!
//! - Integers: `i8`..`i64`, `u8`..`u64`, `isize`, `usize` (range-checked)
//! - Floats: `f32`, `f64` (integers are accepted and widened)
//! - Boolean: `bool`
//! - Strings: `String`, `CString`; `&'static str`, `&'static CStr` on return
//! - Sequences: `Vec<T>`, `[T; N]`
//! - `()` (void), `Option<T>`, `Result<T, E>` (return only), [`Dynamic`]
//! - Registered classes: see [`object`]
//!
//! ## Example
//!
//! ```
//! use bindery::{ClassTable, Dynamic, FromDynamic, IntoDynamic, MarshalContext};
//!
//! let classes = ClassTable::new();
//! let cx = MarshalContext::new(&classes);
//! let value = vec![1_i32, 2, 3].into_dynamic(&cx).unwrap();
//! assert!(Vec::<i32>::check_type(&value, &cx));
//! assert_eq!(Vec::<i32>::from_dynamic(&value, &cx).unwrap(), vec![1, 2, 3]);
//! ```

use std::borrow::Cow;

use bindery_core::{ConversionError, Dynamic, NativeError};

use crate::class::ClassTable;

pub mod object;
mod primitive;
mod sequence;

pub use object::{Instance, NativeClass};

/// Registry state a converter may consult.
#[derive(Clone, Copy)]
pub struct MarshalContext<'a> {
    classes: &'a ClassTable,
}

impl<'a> MarshalContext<'a> {
    pub fn new(classes: &'a ClassTable) -> Self {
        Self { classes }
    }

    pub fn classes(&self) -> &'a ClassTable {
        self.classes
    }
}

/// Decode a host value into a native value.
///
/// `check_type` is the cheap predicate used for overload resolution. A value
/// that passes it may still fail `from_dynamic` (an integer out of range, a
/// hole in an array); that failure is reported as a conversion error rather
/// than a type mismatch.
pub trait FromDynamic: Sized {
    /// Host-facing name of the declared type, used in diagnostics.
    fn type_name() -> Cow<'static, str>;

    fn check_type(value: &Dynamic, cx: &MarshalContext<'_>) -> bool;

    fn from_dynamic(value: &Dynamic, cx: &MarshalContext<'_>) -> Result<Self, ConversionError>;
}

/// Encode a native value for the host.
pub trait IntoDynamic {
    fn into_dynamic(self, cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError>;
}

/// Check then decode, reporting a failed check as a type mismatch.
pub(crate) fn decode_checked<T: FromDynamic>(
    value: &Dynamic,
    cx: &MarshalContext<'_>,
) -> Result<T, ConversionError> {
    if !T::check_type(value, cx) {
        return Err(ConversionError::mismatch(T::type_name(), value.type_name()));
    }
    T::from_dynamic(value, cx)
}
