//! Scalar, string and wrapper converters.

use std::borrow::Cow;
use std::ffi::{CStr, CString};
use std::fmt::Display;

use bindery_core::{ConversionError, Dynamic, HostObject, NativeError};

use super::{FromDynamic, IntoDynamic, MarshalContext};

// ============================================================================
// Integer implementations
// ============================================================================

macro_rules! impl_dynamic_int {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromDynamic for $ty {
                fn type_name() -> Cow<'static, str> {
                    Cow::Borrowed($name)
                }

                fn check_type(value: &Dynamic, _cx: &MarshalContext<'_>) -> bool {
                    matches!(value, Dynamic::Int(_))
                }

                fn from_dynamic(value: &Dynamic, _cx: &MarshalContext<'_>) -> Result<Self, ConversionError> {
                    match value {
                        Dynamic::Int(v) => <$ty>::try_from(*v).map_err(|_| ConversionError::IntegerOverflow {
                            value: *v,
                            target_type: $name,
                        }),
                        other => Err(ConversionError::mismatch($name, other.type_name())),
                    }
                }
            }
        )*
    };
}

impl_dynamic_int!(
    i8 => "int8",
    i16 => "int16",
    i32 => "int32",
    i64 => "int64",
    u8 => "uint8",
    u16 => "uint16",
    u32 => "uint32",
);

/// The exact integer behind a float that a host int cannot hold.
fn beyond_host_int(value: f64) -> Option<i128> {
    let whole = value as i128;
    (whole as f64 == value && i64::try_from(whole).is_err()).then_some(whole)
}

// Wider than the host integer: also read back the floats they widen to.
macro_rules! impl_dynamic_wide_int {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromDynamic for $ty {
                fn type_name() -> Cow<'static, str> {
                    Cow::Borrowed($name)
                }

                fn check_type(value: &Dynamic, _cx: &MarshalContext<'_>) -> bool {
                    match value {
                        Dynamic::Int(_) => true,
                        Dynamic::Float(v) => beyond_host_int(*v).is_some(),
                        _ => false,
                    }
                }

                fn from_dynamic(value: &Dynamic, _cx: &MarshalContext<'_>) -> Result<Self, ConversionError> {
                    match value {
                        Dynamic::Int(v) => <$ty>::try_from(*v).map_err(|_| ConversionError::IntegerOverflow {
                            value: *v,
                            target_type: $name,
                        }),
                        Dynamic::Float(v) => match beyond_host_int(*v) {
                            Some(whole) => <$ty>::try_from(whole).map_err(|_| ConversionError::FloatConversion {
                                value: *v,
                                target_type: $name,
                            }),
                            None => Err(ConversionError::mismatch($name, value.type_name())),
                        },
                        other => Err(ConversionError::mismatch($name, other.type_name())),
                    }
                }
            }
        )*
    };
}

impl_dynamic_wide_int!(
    isize => "int64",
    u64 => "uint64",
    usize => "uint64",
);

macro_rules! impl_into_dynamic_lossless {
    ($($ty:ty),*) => {
        $(
            impl IntoDynamic for $ty {
                fn into_dynamic(self, _cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError> {
                    Ok(Dynamic::Int(i64::from(self)))
                }
            }
        )*
    };
}

impl_into_dynamic_lossless!(i8, i16, i32, i64, u8, u16, u32);

// Wider than the host integer: values past i64::MAX widen to float.
macro_rules! impl_into_dynamic_wide {
    ($($ty:ty),*) => {
        $(
            impl IntoDynamic for $ty {
                fn into_dynamic(self, _cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError> {
                    Ok(match i64::try_from(self) {
                        Ok(v) => Dynamic::Int(v),
                        Err(_) => Dynamic::Float(self as f64),
                    })
                }
            }
        )*
    };
}

impl_into_dynamic_wide!(isize, u64, usize);

// ============================================================================
// Float implementations
// ============================================================================

impl FromDynamic for f64 {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("double")
    }

    fn check_type(value: &Dynamic, _cx: &MarshalContext<'_>) -> bool {
        matches!(value, Dynamic::Int(_) | Dynamic::Float(_))
    }

    fn from_dynamic(value: &Dynamic, _cx: &MarshalContext<'_>) -> Result<Self, ConversionError> {
        value
            .as_float()
            .ok_or_else(|| ConversionError::mismatch("double", value.type_name()))
    }
}

impl IntoDynamic for f64 {
    fn into_dynamic(self, _cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError> {
        Ok(Dynamic::Float(self))
    }
}

impl FromDynamic for f32 {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("float")
    }

    fn check_type(value: &Dynamic, cx: &MarshalContext<'_>) -> bool {
        f64::check_type(value, cx)
    }

    fn from_dynamic(value: &Dynamic, _cx: &MarshalContext<'_>) -> Result<Self, ConversionError> {
        let wide = value
            .as_float()
            .ok_or_else(|| ConversionError::mismatch("float", value.type_name()))?;
        // NaN and infinities carry over; finite values must fit
        if wide.is_finite() && wide.abs() > f64::from(f32::MAX) {
            return Err(ConversionError::FloatConversion {
                value: wide,
                target_type: "float",
            });
        }
        Ok(wide as f32)
    }
}

impl IntoDynamic for f32 {
    fn into_dynamic(self, _cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError> {
        Ok(Dynamic::Float(f64::from(self)))
    }
}

// ============================================================================
// Bool / unit / strings
// ============================================================================

impl FromDynamic for bool {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("bool")
    }

    fn check_type(value: &Dynamic, _cx: &MarshalContext<'_>) -> bool {
        matches!(value, Dynamic::Bool(_))
    }

    fn from_dynamic(value: &Dynamic, _cx: &MarshalContext<'_>) -> Result<Self, ConversionError> {
        value
            .as_bool()
            .ok_or_else(|| ConversionError::mismatch("bool", value.type_name()))
    }
}

impl IntoDynamic for bool {
    fn into_dynamic(self, _cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError> {
        Ok(Dynamic::Bool(self))
    }
}

impl IntoDynamic for () {
    fn into_dynamic(self, _cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError> {
        Ok(Dynamic::Undefined)
    }
}

impl FromDynamic for String {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("string")
    }

    fn check_type(value: &Dynamic, _cx: &MarshalContext<'_>) -> bool {
        matches!(value, Dynamic::String(_))
    }

    fn from_dynamic(value: &Dynamic, _cx: &MarshalContext<'_>) -> Result<Self, ConversionError> {
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| ConversionError::mismatch("string", value.type_name()))
    }
}

impl IntoDynamic for String {
    fn into_dynamic(self, _cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError> {
        Ok(Dynamic::String(self))
    }
}

impl IntoDynamic for &'static str {
    fn into_dynamic(self, _cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError> {
        Ok(Dynamic::String(self.to_owned()))
    }
}

impl FromDynamic for CString {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("string")
    }

    fn check_type(value: &Dynamic, cx: &MarshalContext<'_>) -> bool {
        String::check_type(value, cx)
    }

    fn from_dynamic(value: &Dynamic, cx: &MarshalContext<'_>) -> Result<Self, ConversionError> {
        let text = String::from_dynamic(value, cx)?;
        CString::new(text).map_err(|err| ConversionError::InteriorNul {
            position: err.nul_position(),
        })
    }
}

impl IntoDynamic for CString {
    fn into_dynamic(self, _cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError> {
        let text = self
            .into_string()
            .map_err(|_| ConversionError::InvalidUtf8)?;
        Ok(Dynamic::String(text))
    }
}

impl IntoDynamic for &'static CStr {
    fn into_dynamic(self, _cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError> {
        let text = self.to_str().map_err(|_| ConversionError::InvalidUtf8)?;
        Ok(Dynamic::String(text.to_owned()))
    }
}

// ============================================================================
// Wrappers
// ============================================================================

/// `Null` and `Undefined` decode to `None`; `None` encodes as `Null`.
impl<T: FromDynamic> FromDynamic for Option<T> {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("{}?", T::type_name()))
    }

    fn check_type(value: &Dynamic, cx: &MarshalContext<'_>) -> bool {
        value.is_nullish() || T::check_type(value, cx)
    }

    fn from_dynamic(value: &Dynamic, cx: &MarshalContext<'_>) -> Result<Self, ConversionError> {
        if value.is_nullish() {
            Ok(None)
        } else {
            T::from_dynamic(value, cx).map(Some)
        }
    }
}

impl<T: IntoDynamic> IntoDynamic for Option<T> {
    fn into_dynamic(self, cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError> {
        match self {
            Some(value) => value.into_dynamic(cx),
            None => Ok(Dynamic::Null),
        }
    }
}

/// Errors returned by native code surface as native failures.
impl<T: IntoDynamic, E: Display> IntoDynamic for Result<T, E> {
    fn into_dynamic(self, cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError> {
        match self {
            Ok(value) => value.into_dynamic(cx),
            Err(err) => Err(NativeError::other(err.to_string())),
        }
    }
}

impl FromDynamic for Dynamic {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("any")
    }

    fn check_type(_value: &Dynamic, _cx: &MarshalContext<'_>) -> bool {
        true
    }

    fn from_dynamic(value: &Dynamic, _cx: &MarshalContext<'_>) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

impl IntoDynamic for Dynamic {
    fn into_dynamic(self, _cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError> {
        Ok(self)
    }
}

/// Any object proxy, regardless of class.
impl FromDynamic for HostObject {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("object")
    }

    fn check_type(value: &Dynamic, _cx: &MarshalContext<'_>) -> bool {
        matches!(value, Dynamic::Object(_))
    }

    fn from_dynamic(value: &Dynamic, _cx: &MarshalContext<'_>) -> Result<Self, ConversionError> {
        value
            .as_object()
            .cloned()
            .ok_or_else(|| ConversionError::mismatch("object", value.type_name()))
    }
}

impl IntoDynamic for HostObject {
    fn into_dynamic(self, _cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError> {
        Ok(Dynamic::Object(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassTable;

    fn round_trip<T>(value: T) -> T
    where
        T: FromDynamic + IntoDynamic,
    {
        let classes = ClassTable::new();
        let cx = MarshalContext::new(&classes);
        let encoded = value.into_dynamic(&cx).unwrap();
        assert!(T::check_type(&encoded, &cx));
        T::from_dynamic(&encoded, &cx).unwrap()
    }

    #[test]
    fn primitives_round_trip() {
        assert_eq!(round_trip(i8::MIN), i8::MIN);
        assert_eq!(round_trip(i32::MAX), i32::MAX);
        assert_eq!(round_trip(u16::MAX), u16::MAX);
        assert_eq!(round_trip(u64::from(u32::MAX) + 1), u64::from(u32::MAX) + 1);
        assert_eq!(round_trip(1.5_f32), 1.5);
        assert_eq!(round_trip(-0.25_f64), -0.25);
        assert!(round_trip(true));
        assert_eq!(round_trip(String::from("héllo")), "héllo");
        assert_eq!(
            round_trip(CString::new("plain").unwrap()),
            CString::new("plain").unwrap()
        );
        assert_eq!(round_trip(Some(7_i16)), Some(7));
        assert_eq!(round_trip(None::<i16>), None);
    }

    #[test]
    fn narrowing_overflow_fails_decode_not_check() {
        let classes = ClassTable::new();
        let cx = MarshalContext::new(&classes);
        let value = Dynamic::Int(300);
        assert!(u8::check_type(&value, &cx));
        let err = u8::from_dynamic(&value, &cx).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::IntegerOverflow {
                value: 300,
                target_type: "uint8"
            }
        ));
        assert!(u32::from_dynamic(&Dynamic::Int(-1), &cx).is_err());
    }

    #[test]
    fn ints_are_strict_floats_are_lenient() {
        let classes = ClassTable::new();
        let cx = MarshalContext::new(&classes);
        assert!(!i32::check_type(&Dynamic::Float(1.0), &cx));
        assert!(!i32::check_type(&Dynamic::from("5"), &cx));
        assert!(f64::check_type(&Dynamic::Int(3), &cx));
        assert_eq!(f64::from_dynamic(&Dynamic::Int(3), &cx).unwrap(), 3.0);
        assert!(!f64::check_type(&Dynamic::Bool(true), &cx));
    }

    #[test]
    fn float_out_of_f32_range() {
        let classes = ClassTable::new();
        let cx = MarshalContext::new(&classes);
        let err = f32::from_dynamic(&Dynamic::Float(1e300), &cx).unwrap_err();
        assert!(matches!(err, ConversionError::FloatConversion { .. }));
    }

    #[test]
    fn huge_unsigned_widens_to_float() {
        let classes = ClassTable::new();
        let cx = MarshalContext::new(&classes);
        assert_eq!(u64::MAX.into_dynamic(&cx).unwrap(), Dynamic::Float(u64::MAX as f64));
        assert_eq!(42_usize.into_dynamic(&cx).unwrap(), Dynamic::Int(42));
    }

    #[test]
    fn widened_unsigned_reads_back() {
        assert_eq!(round_trip(1_u64 << 63), 1_u64 << 63);
        assert_eq!(round_trip(u64::MAX - 2047), u64::MAX - 2047);

        let classes = ClassTable::new();
        let cx = MarshalContext::new(&classes);
        // fits a host int, so it must arrive as one
        assert!(!u64::check_type(&Dynamic::Float(5.0), &cx));
        assert!(!u64::check_type(&Dynamic::Float(f64::NAN), &cx));
        assert!(!u64::check_type(&Dynamic::Float(f64::INFINITY), &cx));

        let too_big = Dynamic::Float(u64::MAX as f64);
        assert!(u64::check_type(&too_big, &cx));
        let err = u64::from_dynamic(&too_big, &cx).unwrap_err();
        assert!(matches!(err, ConversionError::FloatConversion { target_type: "uint64", .. }));
        assert!(u64::from_dynamic(&Dynamic::Float(-1e19), &cx).is_err());
    }

    #[test]
    fn void_and_str_returns() {
        let classes = ClassTable::new();
        let cx = MarshalContext::new(&classes);
        assert_eq!(().into_dynamic(&cx).unwrap(), Dynamic::Undefined);
        assert_eq!("test".into_dynamic(&cx).unwrap(), Dynamic::from("test"));
        assert_eq!(c"ptr".into_dynamic(&cx).unwrap(), Dynamic::from("ptr"));
    }

    #[test]
    fn c_string_rejects_interior_nul() {
        let classes = ClassTable::new();
        let cx = MarshalContext::new(&classes);
        let err = CString::from_dynamic(&Dynamic::from("a\0b"), &cx).unwrap_err();
        assert!(matches!(err, ConversionError::InteriorNul { position: 1 }));
    }

    #[test]
    fn option_accepts_null_and_undefined() {
        let classes = ClassTable::new();
        let cx = MarshalContext::new(&classes);
        assert!(Option::<String>::check_type(&Dynamic::Null, &cx));
        assert!(Option::<String>::check_type(&Dynamic::Undefined, &cx));
        assert!(!Option::<String>::check_type(&Dynamic::Int(1), &cx));
        assert_eq!(Option::<String>::type_name(), "string?");
        assert_eq!(None::<String>.into_dynamic(&cx).unwrap(), Dynamic::Null);
    }

    #[test]
    fn result_error_becomes_native_failure() {
        let classes = ClassTable::new();
        let cx = MarshalContext::new(&classes);
        let ok: Result<i32, String> = Ok(3);
        assert_eq!(ok.into_dynamic(&cx).unwrap(), Dynamic::Int(3));
        let err: Result<i32, String> = Err("no such file".into());
        let err = err.into_dynamic(&cx).unwrap_err();
        assert!(matches!(err, NativeError::Other { ref message } if message == "no such file"));
    }

    #[test]
    fn dynamic_passthrough() {
        let classes = ClassTable::new();
        let cx = MarshalContext::new(&classes);
        let value = Dynamic::array([1, 2]);
        assert!(Dynamic::check_type(&Dynamic::Null, &cx));
        assert_eq!(Dynamic::from_dynamic(&value, &cx).unwrap(), value);
    }
}
