//! Bindery: expose native Rust functions and types to a dynamically typed host.
//!
//! Native code is declared once on a [`Registry`]: free functions, classes
//! with constructors, methods and static methods, and superclass edges. The
//! registry is then exported into a [`Module`], whose calls take and return
//! host values ([`Dynamic`]) and resolve overloads at call time.
//!
//! # Example
//!
//! ```
//! use bindery::{Dynamic, NativeClass, Registry};
//!
//! #[derive(Clone)]
//! struct Counter {
//!     count: i64,
//! }
//!
//! impl NativeClass for Counter {
//!     const NAME: &'static str = "Counter";
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = Registry::new();
//! registry
//!     .class::<Counter>()
//!     .constructor(|| Counter { count: 0 })?
//!     .constructor(|start: i64| Counter { count: start })?
//!     .method("get", |c: &Counter| c.count)?
//!     .method_mut("add", |c: &mut Counter, by: i64| c.count += by)?
//!     .build()?;
//!
//! let module = registry.export("counters")?;
//! let counter = module.construct("Counter", &[Dynamic::Int(40)])?;
//! let object = counter.as_object().ok_or("not an object")?;
//! module.call_method(object, "add", &[Dynamic::Int(2)])?;
//! assert_eq!(module.call_method(object, "get", &[])?, Dynamic::Int(42));
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `profiling`: instrument registration, export and dispatch with the
//!   `profiling` crate.
//! - `profile-with-puffin`: route that instrumentation to puffin.

pub mod class;
pub mod class_builder;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod module;
pub mod native_fn;
pub mod registry;
pub mod signature;

pub use bindery_core::{
    Borrowed, ClassId, ClassMut, ClassRef, ConversionError, Dynamic, HostObject, NativeAny,
    NativeError, ObjectHandle, Ownership, SignatureId,
};

pub use class::{ClassBinding, ClassFlags, ClassTable, UpcastStep};
pub use class_builder::ClassBuilder;
pub use convert::{FromDynamic, Instance, IntoDynamic, MarshalContext, NativeClass};
pub use dispatch::{DispatchError, Dispatcher, Overload, OverloadSet};
pub use error::{ExportError, HostError, HostErrorKind, RegistrationError};
pub use module::{ClassObject, Export, ExportConfig, Function, Module, Namespace};
pub use native_fn::{IntoNativeFunction, IntoNativeMethod, IntoNativeMethodMut};
pub use registry::{FunctionBinding, Registry};
pub use signature::{ArgList, ErasedSignature, SignatureTable};
