//! Adapters from plain Rust closures and fn items to boxed callables.
//!
//! Implemented for every `Fn` of up to eight parameters. The tuple of
//! parameter types becomes the signature's argument list, so the compiler
//! picks the shape from the closure's own type:
//!
//! ```ignore
//! registry.function("add", |a: i32, b: i32| a + b)?;          // (int32, int32)
//! builder.method("len", |s: &Buffer| s.bytes.len())?;          // &self, ()
//! builder.method_mut("push", |s: &mut Buffer, b: u8| s.bytes.push(b))?;
//! ```

use std::any::Any;

use bindery_core::{NativeAny, NativeError};

use crate::signature::{FunctionCallable, MethodCallable, MethodMutCallable};

/// A free function, static method or constructor body.
pub trait IntoNativeFunction<Args, Ret>: 'static {
    fn into_callable(self) -> FunctionCallable<Args, Ret>;
}

/// An instance method taking `&T`.
pub trait IntoNativeMethod<T, Args, Ret>: 'static {
    fn into_callable(self) -> MethodCallable<Args, Ret>;
}

/// An instance method taking `&mut T`.
pub trait IntoNativeMethodMut<T, Args, Ret>: 'static {
    fn into_callable(self) -> MethodMutCallable<Args, Ret>;
}

fn receiver_mismatch<T>() -> NativeError {
    NativeError::invalid_this(format!(
        "receiver is not a {}",
        std::any::type_name::<T>()
    ))
}

macro_rules! impl_native_fn {
    ($($ty:ident $var:ident),*) => {
        impl<F, Ret, $($ty),*> IntoNativeFunction<($($ty,)*), Ret> for F
        where
            F: Fn($($ty),*) -> Ret + 'static,
            Ret: 'static,
            $($ty: 'static,)*
        {
            fn into_callable(self) -> FunctionCallable<($($ty,)*), Ret> {
                Box::new(move |($($var,)*): ($($ty,)*)| self($($var),*))
            }
        }

        impl<F, T, Ret, $($ty),*> IntoNativeMethod<T, ($($ty,)*), Ret> for F
        where
            F: Fn(&T, $($ty),*) -> Ret + 'static,
            T: Any,
            Ret: 'static,
            $($ty: 'static,)*
        {
            fn into_callable(self) -> MethodCallable<($($ty,)*), Ret> {
                Box::new(move |this: &NativeAny, ($($var,)*): ($($ty,)*)| {
                    let this = this.downcast_ref::<T>().ok_or_else(receiver_mismatch::<T>)?;
                    Ok(self(this, $($var),*))
                })
            }
        }

        impl<F, T, Ret, $($ty),*> IntoNativeMethodMut<T, ($($ty,)*), Ret> for F
        where
            F: Fn(&mut T, $($ty),*) -> Ret + 'static,
            T: Any,
            Ret: 'static,
            $($ty: 'static,)*
        {
            fn into_callable(self) -> MethodMutCallable<($($ty,)*), Ret> {
                Box::new(move |this: &mut NativeAny, ($($var,)*): ($($ty,)*)| {
                    let this = this.downcast_mut::<T>().ok_or_else(receiver_mismatch::<T>)?;
                    Ok(self(this, $($var),*))
                })
            }
        }
    };
}

impl_native_fn!();
impl_native_fn!(A a);
impl_native_fn!(A a, B b);
impl_native_fn!(A a, B b, C c);
impl_native_fn!(A a, B b, C c, D d);
impl_native_fn!(A a, B b, C c, D d, E e);
impl_native_fn!(A a, B b, C c, D d, E e, G g);
impl_native_fn!(A a, B b, C c, D d, E e, G g, H h);
impl_native_fn!(A a, B b, C c, D d, E e, G g, H h, I i);
