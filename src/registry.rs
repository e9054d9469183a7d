//! The registration-time collection of classes and free functions.
//!
//! A [`Registry`] is filled by class declarations and [`Registry::function`]
//! calls, then consumed by [`Registry::export`], which freezes it into a
//! read-only [`Module`]. Nothing can be registered after export.

use std::any::TypeId;
use std::cell::Cell;
use std::rc::Rc;

use crate::class::ClassTable;
use crate::class_builder::ClassBuilder;
use crate::convert::{IntoDynamic, NativeClass};
use crate::dispatch::{Dispatcher, Overload, OverloadSet};
use crate::error::{ExportError, RegistrationError};
use crate::module::{ExportConfig, Module, Namespace};
use crate::native_fn::IntoNativeFunction;
use crate::signature::{ArgList, FunctionSignature, SignatureTable};

/// One free-function overload.
#[derive(Debug)]
pub struct FunctionBinding {
    name: String,
    arity: usize,
    params: TypeId,
    overload: Overload,
    initialized: Cell<bool>,
}

impl FunctionBinding {
    /// Export name, possibly containing namespace separators.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn overload(&self) -> Overload {
        self.overload
    }

    /// Mark the function exported. Returns `true` only on the first call.
    pub fn initialize(&self) -> bool {
        !self.initialized.replace(true)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.get()
    }
}

/// Classes, signatures and free functions awaiting export.
#[derive(Default)]
pub struct Registry {
    classes: ClassTable,
    signatures: SignatureTable,
    functions: Vec<FunctionBinding>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    pub fn signatures(&self) -> &SignatureTable {
        &self.signatures
    }

    /// Free-function overloads in registration order.
    pub fn functions(&self) -> &[FunctionBinding] {
        &self.functions
    }

    pub(crate) fn tables_mut(&mut self) -> (&mut ClassTable, &mut SignatureTable) {
        (&mut self.classes, &mut self.signatures)
    }

    /// Declare `T` under its default name, [`NativeClass::NAME`].
    pub fn class<T: NativeClass>(&mut self) -> ClassBuilder<'_, T> {
        ClassBuilder::new(self, T::NAME.to_owned())
    }

    /// Declare `T` under an explicit export name.
    ///
    /// The name may contain the export separator to place the class in a
    /// nested namespace, e.g. `"geometry__Point"`.
    pub fn class_named<T: NativeClass>(&mut self, name: &str) -> ClassBuilder<'_, T> {
        ClassBuilder::new(self, name.to_owned())
    }

    /// Register a free-function overload.
    ///
    /// Functions sharing `name` form one overload set; registering the same
    /// name with identical parameter types is rejected.
    ///
    /// ```
    /// use bindery::Registry;
    ///
    /// # fn main() -> Result<(), bindery::RegistrationError> {
    /// let mut registry = Registry::new();
    /// registry
    ///     .function("add", |a: i64, b: i64| a + b)?
    ///     .function("add", |a: f64, b: f64| a + b)?;
    /// assert_eq!(registry.functions().len(), 2);
    /// # Ok(())
    /// # }
    /// ```
    pub fn function<F, Args, Ret>(&mut self, name: &str, f: F) -> Result<&mut Self, RegistrationError>
    where
        F: IntoNativeFunction<Args, Ret>,
        Args: ArgList,
        Ret: IntoDynamic + 'static,
    {
        if name.is_empty() {
            return Err(RegistrationError::InvalidName {
                name: name.to_owned(),
                what: "function",
            });
        }
        let params = TypeId::of::<Args>();
        if self
            .functions
            .iter()
            .any(|function| function.name == name && function.params == params)
        {
            return Err(RegistrationError::DuplicateOverload {
                name: name.to_owned(),
                params: format!("({})", Args::param_types().join(", ")),
            });
        }

        let (signature, dispatch_index) = self
            .signatures
            .add::<FunctionSignature<Args, Ret>>(f.into_callable());
        self.functions.push(FunctionBinding {
            name: name.to_owned(),
            arity: Args::ARITY,
            params,
            overload: Overload {
                signature,
                dispatch_index,
                owner: None,
            },
            initialized: Cell::new(false),
        });
        Ok(self)
    }

    /// Freeze the registry and publish it as module `name` using the
    /// default `__` namespace separator.
    pub fn export(self, name: &str) -> Result<Module, ExportError> {
        self.export_with(name, &ExportConfig::default())
    }

    /// Freeze the registry and publish it as module `name`.
    ///
    /// Free functions are initialized first, then every declared class, each
    /// once. Classes only referenced as a superclass are not published.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn export_with(self, name: &str, config: &ExportConfig) -> Result<Module, ExportError> {
        if config.separator.is_empty() {
            return Err(ExportError::invalid_path(name, "namespace separator is empty"));
        }

        let mut exports = Namespace::default();
        for function in &self.functions {
            if !function.initialize() {
                continue;
            }
            let mut overloads = OverloadSet::new();
            overloads.push(function.arity, function.overload);
            exports.insert_function(&function.name, &config.separator, overloads)?;
        }
        for binding in self.classes.iter().filter(|binding| binding.is_declared()) {
            if !binding.initialize() {
                continue;
            }
            exports.insert_class(binding.name(), &config.separator, binding.id())?;
        }

        let dispatcher = Dispatcher::new(self.classes, self.signatures);
        Ok(Module::new(name, exports, Rc::new(dispatcher)))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("classes", &self.classes.len())
            .field("signatures", &self.signatures.len())
            .field("functions", &self.functions.len())
            .finish()
    }
}
