//! Fluent declaration of a native class.
//!
//! # Example
//!
//! ```
//! use bindery::{NativeClass, Registry};
//!
//! #[derive(Clone)]
//! struct Point {
//!     x: i32,
//!     y: i32,
//! }
//!
//! impl NativeClass for Point {
//!     const NAME: &'static str = "Point";
//! }
//!
//! # fn main() -> Result<(), bindery::RegistrationError> {
//! let mut registry = Registry::new();
//! registry
//!     .class::<Point>()
//!     .constructor(|| Point { x: 0, y: 0 })?
//!     .constructor(|x: i32, y: i32| Point { x, y })?
//!     .method("x", |p: &Point| p.x)?
//!     .method_mut("translate", |p: &mut Point, dx: i32, dy: i32| {
//!         p.x += dx;
//!         p.y += dy;
//!     })?
//!     .copyable()
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::any::TypeId;
use std::marker::PhantomData;

use bindery_core::{ClassId, SignatureId};

use crate::class::{ClassBinding, ClassTable, MemberKind, MethodDescriptor, SuperClass, UpcastStep};
use crate::convert::{IntoDynamic, NativeClass};
use crate::dispatch::Overload;
use crate::error::RegistrationError;
use crate::native_fn::{IntoNativeFunction, IntoNativeMethod, IntoNativeMethodMut};
use crate::registry::Registry;
use crate::signature::{
    ArgList, FunctionSignature, MethodMutSignature, MethodSignature, SignatureTable,
};

type Install = Box<dyn FnOnce(&mut SignatureTable) -> (SignatureId, usize)>;
type EnsureFn = fn(&mut ClassTable) -> ClassId;

/// A member waiting for `build()`.
struct PendingMember {
    kind: MemberKind,
    name: String,
    arity: usize,
    params: TypeId,
    params_desc: String,
    install: Install,
}

struct PendingBase {
    type_id: TypeId,
    name: &'static str,
    ensure: EnsureFn,
    upcast: UpcastStep,
}

/// Builder for one class declaration.
///
/// Created by [`Registry::class`] or [`Registry::class_named`]. Members are
/// collected here and only installed by [`build`](Self::build), so a
/// declaration that fails part way never leaves a half-registered class
/// behind.
pub struct ClassBuilder<'r, T: NativeClass> {
    registry: &'r mut Registry,
    name: String,
    members: Vec<PendingMember>,
    bases: Vec<PendingBase>,
    copy: Option<fn(&mut ClassBinding)>,
    _marker: PhantomData<fn() -> T>,
}

fn describe_params<Args: ArgList>() -> String {
    format!("({})", Args::param_types().join(", "))
}

fn set_copy<T: NativeClass + Clone>(binding: &mut ClassBinding) {
    binding.set_copy::<T>();
}

impl<'r, T: NativeClass> ClassBuilder<'r, T> {
    pub(crate) fn new(registry: &'r mut Registry, name: String) -> Self {
        Self {
            registry,
            name,
            members: Vec::new(),
            bases: Vec::new(),
            copy: None,
            _marker: PhantomData,
        }
    }

    /// Add a constructor overload.
    ///
    /// Constructors are overloaded by arity like any other member; the
    /// result is handed to the host as an Owned object.
    pub fn constructor<F, Args>(self, f: F) -> Result<Self, RegistrationError>
    where
        F: IntoNativeFunction<Args, T>,
        Args: ArgList,
    {
        self.push::<Args>(
            MemberKind::Constructor,
            String::new(),
            Box::new(move |signatures: &mut SignatureTable| {
                signatures.add::<FunctionSignature<Args, T>>(f.into_callable())
            }),
        )
    }

    /// Add a `&self` method overload.
    pub fn method<F, Args, Ret>(self, name: &str, f: F) -> Result<Self, RegistrationError>
    where
        F: IntoNativeMethod<T, Args, Ret>,
        Args: ArgList,
        Ret: IntoDynamic + 'static,
    {
        let name = member_name(name, "method")?;
        self.push::<Args>(
            MemberKind::Method,
            name,
            Box::new(move |signatures: &mut SignatureTable| {
                signatures.add::<MethodSignature<Args, Ret>>(f.into_callable())
            }),
        )
    }

    /// Add a `&mut self` method overload.
    ///
    /// Shares its name space with [`method`](Self::method): a `method` and a
    /// `method_mut` with the same name and parameters are duplicates.
    pub fn method_mut<F, Args, Ret>(self, name: &str, f: F) -> Result<Self, RegistrationError>
    where
        F: IntoNativeMethodMut<T, Args, Ret>,
        Args: ArgList,
        Ret: IntoDynamic + 'static,
    {
        let name = member_name(name, "method")?;
        self.push::<Args>(
            MemberKind::Method,
            name,
            Box::new(move |signatures: &mut SignatureTable| {
                signatures.add::<MethodMutSignature<Args, Ret>>(f.into_callable())
            }),
        )
    }

    /// Add a static method overload. Static methods are not inherited.
    pub fn static_method<F, Args, Ret>(self, name: &str, f: F) -> Result<Self, RegistrationError>
    where
        F: IntoNativeFunction<Args, Ret>,
        Args: ArgList,
        Ret: IntoDynamic + 'static,
    {
        let name = member_name(name, "static method")?;
        self.push::<Args>(
            MemberKind::Static,
            name,
            Box::new(move |signatures: &mut SignatureTable| {
                signatures.add::<FunctionSignature<Args, Ret>>(f.into_callable())
            }),
        )
    }

    /// Declare `B` as a direct superclass.
    ///
    /// Superclasses are searched in the order they are declared here, both
    /// for upcasting and for inherited method lookup. `B` does not need to
    /// be declared itself; an undeclared base is tracked but not exported.
    pub fn inherits<B>(mut self) -> Result<Self, RegistrationError>
    where
        B: NativeClass,
        T: AsRef<B> + AsMut<B>,
    {
        let classes = self.registry.classes();
        let cyclic = TypeId::of::<T>() == TypeId::of::<B>()
            || match (classes.id_of::<T>(), classes.id_of::<B>()) {
                (Some(class), Some(base)) => classes.would_cycle(class, base),
                _ => false,
            };
        if cyclic {
            return Err(RegistrationError::CyclicInheritance {
                class: self.name.clone(),
                base: classes
                    .id_of::<B>()
                    .map_or(B::NAME, |id| classes.name_of(id))
                    .to_owned(),
            });
        }
        if self.bases.iter().all(|base| base.type_id != TypeId::of::<B>()) {
            self.bases.push(PendingBase {
                type_id: TypeId::of::<B>(),
                name: B::NAME,
                ensure: ClassTable::ensure::<B>,
                upcast: UpcastStep::of::<T, B>(),
            });
        }
        Ok(self)
    }

    /// Return pointer-form results (`Borrowed<T>`) by copy instead of by
    /// reference.
    pub fn copyable(mut self) -> Self
    where
        T: Clone,
    {
        self.copy = Some(set_copy::<T> as fn(&mut ClassBinding));
        self
    }

    /// Validate the declaration and install it.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn build(self) -> Result<ClassId, RegistrationError> {
        if self.name.is_empty() {
            return Err(RegistrationError::InvalidName {
                name: self.name,
                what: "class",
            });
        }
        if let Some(binding) = self
            .registry
            .classes()
            .id_of::<T>()
            .and_then(|id| self.registry.classes().get(id))
        {
            if binding.is_declared() && binding.name() != self.name {
                return Err(RegistrationError::ConflictingName {
                    existing: binding.name().to_owned(),
                    requested: self.name,
                });
            }
        }

        let Self {
            registry,
            name,
            members,
            bases,
            copy,
            ..
        } = self;
        let (classes, signatures) = registry.tables_mut();

        let class = classes.ensure::<T>();
        if let Some(binding) = classes.binding_mut(class) {
            binding.declare(&name);
            if let Some(set_copy) = copy {
                set_copy(binding);
            }
        }

        for member in members {
            let (signature, dispatch_index) = (member.install)(&mut *signatures);
            let Some(binding) = classes.binding_mut(class) else {
                continue;
            };
            match member.kind {
                MemberKind::Constructor => binding.add_constructor(
                    member.arity,
                    member.params,
                    Overload {
                        signature,
                        dispatch_index,
                        owner: None,
                    },
                ),
                MemberKind::Method => binding.add_method(
                    MethodDescriptor {
                        name: member.name,
                        arity: member.arity,
                        overload: Overload {
                            signature,
                            dispatch_index,
                            owner: Some(class),
                        },
                    },
                    member.params,
                ),
                MemberKind::Static => binding.add_static_method(
                    MethodDescriptor {
                        name: member.name,
                        arity: member.arity,
                        overload: Overload {
                            signature,
                            dispatch_index,
                            owner: None,
                        },
                    },
                    member.params,
                ),
            }
        }

        for base in bases {
            let base_id = (base.ensure)(&mut *classes);
            classes.add_super_class(
                class,
                SuperClass {
                    class: base_id,
                    upcast: base.upcast,
                },
            );
        }

        Ok(class)
    }

    fn push<Args: ArgList>(
        mut self,
        kind: MemberKind,
        name: String,
        install: Install,
    ) -> Result<Self, RegistrationError> {
        let params = TypeId::of::<Args>();
        let registered = self
            .registry
            .classes()
            .id_of::<T>()
            .and_then(|id| self.registry.classes().get(id))
            .is_some_and(|binding| binding.has_overload(kind, &name, params));
        let pending = self
            .members
            .iter()
            .any(|member| member.kind == kind && member.name == name && member.params == params);
        if registered || pending {
            let display = match kind {
                MemberKind::Constructor => self.name.clone(),
                _ => format!("{}.{}", self.name, name),
            };
            return Err(RegistrationError::DuplicateOverload {
                name: display,
                params: describe_params::<Args>(),
            });
        }
        self.members.push(PendingMember {
            kind,
            name,
            arity: Args::ARITY,
            params,
            params_desc: describe_params::<Args>(),
            install,
        });
        Ok(self)
    }
}

impl<T: NativeClass> std::fmt::Debug for ClassBuilder<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let members: Vec<String> = self
            .members
            .iter()
            .map(|member| format!("{}{}", member.name, member.params_desc))
            .collect();
        let bases: Vec<&str> = self.bases.iter().map(|base| base.name).collect();
        f.debug_struct("ClassBuilder")
            .field("name", &self.name)
            .field("members", &members)
            .field("bases", &bases)
            .field("copyable", &self.copy.is_some())
            .finish()
    }
}

fn member_name(name: &str, what: &'static str) -> Result<String, RegistrationError> {
    if name.is_empty() {
        return Err(RegistrationError::InvalidName {
            name: name.to_owned(),
            what,
        });
    }
    Ok(name.to_owned())
}
