//! Call shapes shared across overloads.
//!
//! A signature is one concrete (parameter types, return type) combination.
//! It owns the checker and the argument decoding for that shape, plus an
//! append-only table of callables registered with it. Every overload with
//! the same shape, even on unrelated classes, lands in the same table and
//! is told apart by its dispatch index.
//!
//! Shapes are identified by the `TypeId` of their generic signature type,
//! so the table holds at most one entry per shape.

use std::any::{Any, TypeId};
use std::borrow::Cow;

use bindery_core::{ClassId, ConversionError, Dynamic, HostObject, NativeAny, NativeError, SignatureId};
use rustc_hash::FxHashMap;

use crate::convert::{FromDynamic, IntoDynamic, MarshalContext};

// =============================================================================
// Argument lists
// =============================================================================

/// An ordered parameter list, implemented for tuples of up to eight
/// [`FromDynamic`] types.
pub trait ArgList: Sized + 'static {
    const ARITY: usize;

    fn param_types() -> Vec<Cow<'static, str>>;

    /// Per-position type check. A length mismatch fails every position.
    fn check(args: &[Dynamic], cx: &MarshalContext<'_>) -> Vec<bool>;

    fn from_args(args: &[Dynamic], cx: &MarshalContext<'_>) -> Result<Self, ConversionError>;
}

fn decode_arg<T: FromDynamic>(
    args: &[Dynamic],
    index: usize,
    cx: &MarshalContext<'_>,
) -> Result<T, ConversionError> {
    let value = args.get(index).ok_or_else(|| ConversionError::Failed {
        message: format!("missing argument {index}"),
    })?;
    T::from_dynamic(value, cx).map_err(|err| ConversionError::argument(index, err))
}

macro_rules! impl_arg_list {
    ($count:literal; $($ty:ident $idx:tt),*) => {
        impl<$($ty: FromDynamic + 'static),*> ArgList for ($($ty,)*) {
            const ARITY: usize = $count;

            fn param_types() -> Vec<Cow<'static, str>> {
                vec![$($ty::type_name()),*]
            }

            #[allow(unused_variables)]
            fn check(args: &[Dynamic], cx: &MarshalContext<'_>) -> Vec<bool> {
                if args.len() != Self::ARITY {
                    return vec![false; args.len().max(Self::ARITY)];
                }
                vec![$($ty::check_type(&args[$idx], cx)),*]
            }

            #[allow(unused_variables)]
            fn from_args(args: &[Dynamic], cx: &MarshalContext<'_>) -> Result<Self, ConversionError> {
                Ok(($(decode_arg::<$ty>(args, $idx, cx)?,)*))
            }
        }
    };
}

impl_arg_list!(0;);
impl_arg_list!(1; A 0);
impl_arg_list!(2; A 0, B 1);
impl_arg_list!(3; A 0, B 1, C 2);
impl_arg_list!(4; A 0, B 1, C 2, D 3);
impl_arg_list!(5; A 0, B 1, C 2, D 3, E 4);
impl_arg_list!(6; A 0, B 1, C 2, D 3, E 4, F 5);
impl_arg_list!(7; A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_arg_list!(8; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

// =============================================================================
// Type-erased signatures
// =============================================================================

/// What a signature expects in receiver position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverKind {
    /// Free functions, static methods and constructors.
    None,
    /// `&self` methods.
    Shared,
    /// `&mut self` methods.
    Exclusive,
}

/// The object a method is invoked on, and the class that declared the method.
#[derive(Debug, Clone, Copy)]
pub struct Receiver<'a> {
    pub object: &'a HostObject,
    pub owner: ClassId,
}

/// Object-safe view of one signature.
pub trait ErasedSignature {
    fn arity(&self) -> usize;

    fn param_types(&self) -> Vec<Cow<'static, str>>;

    fn receiver_kind(&self) -> ReceiverKind;

    fn callable_count(&self) -> usize;

    fn check(&self, args: &[Dynamic], cx: &MarshalContext<'_>) -> Vec<bool>;

    /// Decode `args`, run the callable at `index`, and encode its result.
    fn invoke(
        &self,
        index: usize,
        receiver: Option<Receiver<'_>>,
        args: &[Dynamic],
        cx: &MarshalContext<'_>,
    ) -> Result<Dynamic, NativeError>;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A signature type that can be created empty and grown by one callable.
pub(crate) trait Shape: ErasedSignature + Default + 'static {
    type Callable;

    fn push(&mut self, callable: Self::Callable) -> usize;
}

fn no_callable(index: usize) -> NativeError {
    NativeError::other(format!("no callable registered at dispatch index {index}"))
}

fn missing_receiver() -> NativeError {
    NativeError::invalid_this("method called without a receiver")
}

/// Boxed free function or static method body.
pub type FunctionCallable<Args, Ret> = Box<dyn Fn(Args) -> Ret>;

/// Boxed `&self` method body. The receiver arrives already upcast to the
/// declaring class.
pub type MethodCallable<Args, Ret> = Box<dyn Fn(&NativeAny, Args) -> Result<Ret, NativeError>>;

/// Boxed `&mut self` method body.
pub type MethodMutCallable<Args, Ret> =
    Box<dyn Fn(&mut NativeAny, Args) -> Result<Ret, NativeError>>;

// =============================================================================
// Function signatures
// =============================================================================

/// Shape of free functions, static methods and constructors.
pub struct FunctionSignature<Args, Ret> {
    callables: Vec<FunctionCallable<Args, Ret>>,
}

impl<Args, Ret> Default for FunctionSignature<Args, Ret> {
    fn default() -> Self {
        Self {
            callables: Vec::new(),
        }
    }
}

impl<Args: ArgList, Ret: IntoDynamic + 'static> ErasedSignature for FunctionSignature<Args, Ret> {
    fn arity(&self) -> usize {
        Args::ARITY
    }

    fn param_types(&self) -> Vec<Cow<'static, str>> {
        Args::param_types()
    }

    fn receiver_kind(&self) -> ReceiverKind {
        ReceiverKind::None
    }

    fn callable_count(&self) -> usize {
        self.callables.len()
    }

    fn check(&self, args: &[Dynamic], cx: &MarshalContext<'_>) -> Vec<bool> {
        Args::check(args, cx)
    }

    fn invoke(
        &self,
        index: usize,
        _receiver: Option<Receiver<'_>>,
        args: &[Dynamic],
        cx: &MarshalContext<'_>,
    ) -> Result<Dynamic, NativeError> {
        let callable = self.callables.get(index).ok_or_else(|| no_callable(index))?;
        let args = Args::from_args(args, cx)?;
        callable(args).into_dynamic(cx)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<Args: ArgList, Ret: IntoDynamic + 'static> Shape for FunctionSignature<Args, Ret> {
    type Callable = FunctionCallable<Args, Ret>;

    fn push(&mut self, callable: Self::Callable) -> usize {
        self.callables.push(callable);
        self.callables.len() - 1
    }
}

// =============================================================================
// Method signatures
// =============================================================================

/// Shape of `&self` methods. Keyed by parameters and return type only, so
/// methods of different classes share it.
pub struct MethodSignature<Args, Ret> {
    callables: Vec<MethodCallable<Args, Ret>>,
}

impl<Args, Ret> Default for MethodSignature<Args, Ret> {
    fn default() -> Self {
        Self {
            callables: Vec::new(),
        }
    }
}

impl<Args: ArgList, Ret: IntoDynamic + 'static> ErasedSignature for MethodSignature<Args, Ret> {
    fn arity(&self) -> usize {
        Args::ARITY
    }

    fn param_types(&self) -> Vec<Cow<'static, str>> {
        Args::param_types()
    }

    fn receiver_kind(&self) -> ReceiverKind {
        ReceiverKind::Shared
    }

    fn callable_count(&self) -> usize {
        self.callables.len()
    }

    fn check(&self, args: &[Dynamic], cx: &MarshalContext<'_>) -> Vec<bool> {
        Args::check(args, cx)
    }

    fn invoke(
        &self,
        index: usize,
        receiver: Option<Receiver<'_>>,
        args: &[Dynamic],
        cx: &MarshalContext<'_>,
    ) -> Result<Dynamic, NativeError> {
        let callable = self.callables.get(index).ok_or_else(|| no_callable(index))?;
        let receiver = receiver.ok_or_else(missing_receiver)?;
        // decode before borrowing: an argument may be the receiver itself
        let args = Args::from_args(args, cx)?;
        let this = cx.classes().borrow_as(receiver.object, receiver.owner)?;
        let result = callable(&*this, args);
        drop(this);
        result?.into_dynamic(cx)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<Args: ArgList, Ret: IntoDynamic + 'static> Shape for MethodSignature<Args, Ret> {
    type Callable = MethodCallable<Args, Ret>;

    fn push(&mut self, callable: Self::Callable) -> usize {
        self.callables.push(callable);
        self.callables.len() - 1
    }
}

/// Shape of `&mut self` methods.
pub struct MethodMutSignature<Args, Ret> {
    callables: Vec<MethodMutCallable<Args, Ret>>,
}

impl<Args, Ret> Default for MethodMutSignature<Args, Ret> {
    fn default() -> Self {
        Self {
            callables: Vec::new(),
        }
    }
}

impl<Args: ArgList, Ret: IntoDynamic + 'static> ErasedSignature
    for MethodMutSignature<Args, Ret>
{
    fn arity(&self) -> usize {
        Args::ARITY
    }

    fn param_types(&self) -> Vec<Cow<'static, str>> {
        Args::param_types()
    }

    fn receiver_kind(&self) -> ReceiverKind {
        ReceiverKind::Exclusive
    }

    fn callable_count(&self) -> usize {
        self.callables.len()
    }

    fn check(&self, args: &[Dynamic], cx: &MarshalContext<'_>) -> Vec<bool> {
        Args::check(args, cx)
    }

    fn invoke(
        &self,
        index: usize,
        receiver: Option<Receiver<'_>>,
        args: &[Dynamic],
        cx: &MarshalContext<'_>,
    ) -> Result<Dynamic, NativeError> {
        let callable = self.callables.get(index).ok_or_else(|| no_callable(index))?;
        let receiver = receiver.ok_or_else(missing_receiver)?;
        let args = Args::from_args(args, cx)?;
        let mut this = cx.classes().borrow_mut_as(receiver.object, receiver.owner)?;
        let result = callable(&mut *this, args);
        drop(this);
        result?.into_dynamic(cx)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<Args: ArgList, Ret: IntoDynamic + 'static> Shape for MethodMutSignature<Args, Ret> {
    type Callable = MethodMutCallable<Args, Ret>;

    fn push(&mut self, callable: Self::Callable) -> usize {
        self.callables.push(callable);
        self.callables.len() - 1
    }
}

// =============================================================================
// SignatureTable
// =============================================================================

/// All signatures, one per distinct shape.
#[derive(Default)]
pub struct SignatureTable {
    entries: Vec<Box<dyn ErasedSignature>>,
    ids: FxHashMap<TypeId, SignatureId>,
}

impl SignatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: SignatureId) -> Option<&dyn ErasedSignature> {
        self.entries.get(id.index()).map(|entry| entry.as_ref())
    }

    /// Id of shape `S`, if any callable has been registered with it.
    pub fn id_of<S: 'static>(&self) -> Option<SignatureId> {
        self.ids.get(&TypeId::of::<S>()).copied()
    }

    /// Append a callable to shape `S`, creating the shape on first use.
    ///
    /// Returns the shape's id and the callable's dispatch index.
    pub(crate) fn add<S: Shape>(&mut self, callable: S::Callable) -> (SignatureId, usize) {
        let id = match self.ids.get(&TypeId::of::<S>()) {
            Some(id) => *id,
            None => {
                let id = SignatureId::new(self.entries.len() as u32);
                self.entries.push(Box::new(S::default()));
                self.ids.insert(TypeId::of::<S>(), id);
                id
            }
        };
        match self.entries[id.index()].as_any_mut().downcast_mut::<S>() {
            Some(signature) => (id, signature.push(callable)),
            None => unreachable!("signature table entry does not match its key"),
        }
    }

    /// Render a shape as `(int, string)` for diagnostics.
    pub fn describe(&self, id: SignatureId) -> String {
        match self.get(id) {
            Some(signature) => format!("({})", signature.param_types().join(", ")),
            None => String::from("(?)"),
        }
    }
}
