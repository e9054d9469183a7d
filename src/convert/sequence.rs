//! Growable and fixed-size sequence converters.
//!
//! Both forms require a dense host array: a hole anywhere in the consumed
//! range fails with a conversion error naming the element.

use std::borrow::Cow;

use bindery_core::{ConversionError, Dynamic, NativeError};

use super::{FromDynamic, IntoDynamic, MarshalContext, decode_checked};

fn decode_element<T: FromDynamic>(
    index: usize,
    item: &Option<Dynamic>,
    cx: &MarshalContext<'_>,
) -> Result<T, ConversionError> {
    let value = item
        .as_ref()
        .ok_or(ConversionError::SparseArray { index })?;
    decode_checked(value, cx).map_err(|err| ConversionError::element(index, err))
}

fn array_items<'v>(
    value: &'v Dynamic,
    expected: &Cow<'static, str>,
) -> Result<&'v [Option<Dynamic>], ConversionError> {
    value
        .as_array()
        .ok_or_else(|| ConversionError::mismatch(expected.clone(), value.type_name()))
}

fn encode_items<I>(items: I, cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError>
where
    I: IntoIterator,
    I::Item: IntoDynamic,
{
    let items = items
        .into_iter()
        .map(|item| item.into_dynamic(cx).map(Some))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Dynamic::Array(items))
}

impl<T: FromDynamic> FromDynamic for Vec<T> {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("array<{}>", T::type_name()))
    }

    fn check_type(value: &Dynamic, _cx: &MarshalContext<'_>) -> bool {
        matches!(value, Dynamic::Array(_))
    }

    fn from_dynamic(value: &Dynamic, cx: &MarshalContext<'_>) -> Result<Self, ConversionError> {
        array_items(value, &Self::type_name())?
            .iter()
            .enumerate()
            .map(|(index, item)| decode_element(index, item, cx))
            .collect()
    }
}

impl<T: IntoDynamic> IntoDynamic for Vec<T> {
    fn into_dynamic(self, cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError> {
        encode_items(self, cx)
    }
}

/// Accepts host arrays at least `N` long; extra elements are ignored.
impl<T: FromDynamic, const N: usize> FromDynamic for [T; N] {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("{}[{}]", T::type_name(), N))
    }

    fn check_type(value: &Dynamic, _cx: &MarshalContext<'_>) -> bool {
        value.as_array().is_some_and(|items| items.len() >= N)
    }

    fn from_dynamic(value: &Dynamic, cx: &MarshalContext<'_>) -> Result<Self, ConversionError> {
        let items = array_items(value, &Self::type_name())?;
        if items.len() < N {
            return Err(ConversionError::ArrayLength {
                expected: N,
                actual: items.len(),
            });
        }
        let decoded = items[..N]
            .iter()
            .enumerate()
            .map(|(index, item)| decode_element(index, item, cx))
            .collect::<Result<Vec<T>, _>>()?;
        decoded
            .try_into()
            .map_err(|rest: Vec<T>| ConversionError::ArrayLength {
                expected: N,
                actual: rest.len(),
            })
    }
}

impl<T: IntoDynamic, const N: usize> IntoDynamic for [T; N] {
    fn into_dynamic(self, cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError> {
        encode_items(self, cx)
    }
}
