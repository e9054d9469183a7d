//! Converters for registered native classes.
//!
//! The declared parameter or return form picks the strategy:
//!
//! | Form               | Parameter                     | Return                          |
//! |--------------------|-------------------------------|---------------------------------|
//! | `T`                | upcast, then clone (`T: Clone`) | new Owned handle              |
//! | `Borrowed<T>`      | -                             | copy if copyable, else Borrowed |
//! | `Rc<RefCell<T>>`   | the proxy's shared cell       | Shared handle, count + 1        |
//! | `Instance<T>`      | the proxy itself, upcast lazily | the same proxy                |
//!
//! Parameters accept objects whose class is `T` or derives from it.

use std::any::Any;
use std::borrow::Cow;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use bindery_core::{
    Borrowed, ClassId, ClassMut, ClassRef, ConversionError, Dynamic, HostObject, NativeError,
    ObjectHandle, Ownership,
};

use super::{FromDynamic, IntoDynamic, MarshalContext};
use crate::class::{UpcastStep, apply_path, apply_path_mut, borrow_error};

/// A native type that can be registered as a class.
///
/// `NAME` is the default export name; `Registry::class_named` overrides it.
///
/// # Example
///
/// ```
/// use bindery::NativeClass;
///
/// #[derive(Clone)]
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// impl NativeClass for Point {
///     const NAME: &'static str = "Point";
/// }
/// ```
pub trait NativeClass: Any {
    const NAME: &'static str;
}

fn class_of<T: NativeClass>(cx: &MarshalContext<'_>) -> Result<ClassId, ConversionError> {
    cx.classes()
        .id_of::<T>()
        .ok_or(ConversionError::UnregisteredClass {
            type_name: T::NAME,
        })
}

fn accepts_object<T: NativeClass>(value: &Dynamic, cx: &MarshalContext<'_>) -> bool {
    match (value, cx.classes().id_of::<T>()) {
        (Dynamic::Object(object), Some(target)) => cx.classes().is_subclass(object.class(), target),
        _ => false,
    }
}

fn object_arg<T: NativeClass>(value: &Dynamic) -> Result<&HostObject, ConversionError> {
    match value {
        Dynamic::Object(object) => Ok(object),
        Dynamic::Null | Dynamic::Undefined => Err(ConversionError::NullHandle {
            target_type: T::NAME.to_owned(),
        }),
        other => Err(ConversionError::mismatch(T::NAME, other.type_name())),
    }
}

fn wrap(class: ClassId, handle: ObjectHandle) -> Dynamic {
    Dynamic::Object(HostObject::new(class, handle))
}

// =============================================================================
// By value
// =============================================================================

impl<T: NativeClass + Clone> FromDynamic for T {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed(T::NAME)
    }

    fn check_type(value: &Dynamic, cx: &MarshalContext<'_>) -> bool {
        accepts_object::<T>(value, cx)
    }

    fn from_dynamic(value: &Dynamic, cx: &MarshalContext<'_>) -> Result<Self, ConversionError> {
        let object = object_arg::<T>(value)?;
        let target = class_of::<T>(cx)?;
        let view = cx.classes().borrow_as(object, target)?;
        view.downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ConversionError::UpcastUnreachable {
                from: cx.classes().name_of(object.class()).to_owned(),
                to: T::NAME.to_owned(),
            })
    }
}

impl<T: NativeClass> IntoDynamic for T {
    fn into_dynamic(self, cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError> {
        let class = class_of::<T>(cx)?;
        Ok(wrap(class, ObjectHandle::owned(self)))
    }
}

// =============================================================================
// By pointer
// =============================================================================

impl<T: NativeClass> IntoDynamic for Borrowed<T> {
    fn into_dynamic(self, cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError> {
        let class = class_of::<T>(cx)?;
        let copied = cx
            .classes()
            .get(class)
            .and_then(|binding| binding.copy_value(self.get()));
        Ok(match copied {
            Some(value) => wrap(class, ObjectHandle::from_box(value)),
            None => wrap(class, self.into_handle()),
        })
    }
}

// =============================================================================
// Shared ownership
// =============================================================================

impl<T: NativeClass> FromDynamic for Rc<RefCell<T>> {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("shared<{}>", T::NAME))
    }

    fn check_type(value: &Dynamic, _cx: &MarshalContext<'_>) -> bool {
        value.as_object().is_some_and(|object| {
            object.ownership() == Ownership::Shared
                && object.handle().value_type_id() == std::any::TypeId::of::<T>()
        })
    }

    fn from_dynamic(value: &Dynamic, _cx: &MarshalContext<'_>) -> Result<Self, ConversionError> {
        object_arg::<T>(value)?
            .handle()
            .shared_cell::<T>()
            .ok_or_else(|| ConversionError::NotShared {
                type_name: T::NAME.to_owned(),
            })
    }
}

impl<T: NativeClass> IntoDynamic for Rc<RefCell<T>> {
    fn into_dynamic(self, cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError> {
        let class = class_of::<T>(cx)?;
        Ok(wrap(class, ObjectHandle::shared(self)))
    }
}

// =============================================================================
// Instance
// =============================================================================

/// A reference parameter: the caller's proxy, viewed as `T`.
///
/// Keeps the proxy alive and borrows the native value on demand, so a
/// function can read or mutate an object the host still holds.
pub struct Instance<T> {
    object: HostObject,
    path: Vec<UpcastStep>,
    marker: PhantomData<fn() -> T>,
}

impl<T: NativeClass> Instance<T> {
    pub fn object(&self) -> &HostObject {
        &self.object
    }

    pub fn into_object(self) -> HostObject {
        self.object
    }

    pub fn borrow(&self) -> Result<ClassRef<'_, T>, NativeError> {
        let guard = self
            .object
            .handle()
            .try_borrow()
            .map_err(|failure| borrow_error(failure, T::NAME))?;
        ClassRef::try_map(guard, |value| apply_path(&self.path, value)?.downcast_ref::<T>())
            .ok_or_else(|| NativeError::invalid_this(format!("object is not a {}", T::NAME)))
    }

    pub fn borrow_mut(&self) -> Result<ClassMut<'_, T>, NativeError> {
        let guard = self
            .object
            .handle()
            .try_borrow_mut()
            .map_err(|failure| borrow_error(failure, T::NAME))?;
        ClassMut::try_map(guard, |value| {
            apply_path_mut(&self.path, value)?.downcast_mut::<T>()
        })
        .ok_or_else(|| NativeError::invalid_this(format!("object is not a {}", T::NAME)))
    }
}

impl<T: NativeClass> FromDynamic for Instance<T> {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed(T::NAME)
    }

    fn check_type(value: &Dynamic, cx: &MarshalContext<'_>) -> bool {
        accepts_object::<T>(value, cx)
    }

    fn from_dynamic(value: &Dynamic, cx: &MarshalContext<'_>) -> Result<Self, ConversionError> {
        let object = object_arg::<T>(value)?;
        let target = class_of::<T>(cx)?;
        let path = cx
            .classes()
            .upcast_path(object.class(), target)
            .ok_or_else(|| ConversionError::UpcastUnreachable {
                from: cx.classes().name_of(object.class()).to_owned(),
                to: cx.classes().name_of(target).to_owned(),
            })?;
        Ok(Instance {
            object: object.clone(),
            path,
            marker: PhantomData,
        })
    }
}

impl<T: NativeClass> IntoDynamic for Instance<T> {
    fn into_dynamic(self, _cx: &MarshalContext<'_>) -> Result<Dynamic, NativeError> {
        Ok(Dynamic::Object(self.object))
    }
}
