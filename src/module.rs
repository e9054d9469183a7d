//! Exported modules and their namespaces.
//!
//! Export names containing the configured separator nest into
//! sub-namespaces: with the default `"__"`, a function registered as
//! `"math__vec__dot"` is reachable as `math.vec.dot`.
//!
//! # Example
//!
//! ```
//! use bindery::{Dynamic, Registry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = Registry::new();
//! registry.function("math__double", |v: i64| v * 2)?;
//! let module = registry.export("demo")?;
//!
//! assert_eq!(module.call("math.double", &[Dynamic::Int(21)])?, Dynamic::Int(42));
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::rc::Rc;

use bindery_core::{ClassId, Dynamic, HostObject};
use rustc_hash::FxHashMap;

use crate::class::ClassBinding;
use crate::dispatch::{DispatchError, Dispatcher, OverloadSet};
use crate::error::{ExportError, HostError};

/// Export settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    /// Separator that splits an export name into namespace segments.
    pub separator: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            separator: String::from("__"),
        }
    }
}

// =============================================================================
// Namespace
// =============================================================================

/// A value published in a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Export {
    Namespace(Namespace),
    Function(OverloadSet),
    Class(ClassId),
}

impl Export {
    fn kind(&self) -> &'static str {
        match self {
            Export::Namespace(_) => "namespace",
            Export::Function(_) => "function",
            Export::Class(_) => "class",
        }
    }
}

/// A tree of exported names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespace {
    entries: FxHashMap<String, Export>,
}

impl Namespace {
    pub fn get(&self, name: &str) -> Option<&Export> {
        self.entries.get(name)
    }

    /// Look up a value by path segments.
    pub fn lookup<'a>(&self, mut segments: impl Iterator<Item = &'a str>) -> Option<&Export> {
        let first = segments.next()?;
        let mut current = self.entries.get(first)?;
        for segment in segments {
            match current {
                Export::Namespace(namespace) => current = namespace.entries.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Entry names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Publish a function. Functions sharing a path merge into one set.
    pub(crate) fn insert_function(
        &mut self,
        path: &str,
        separator: &str,
        overloads: OverloadSet,
    ) -> Result<(), ExportError> {
        let (parent, leaf) = self.parent_of(path, separator)?;
        match parent.entries.get_mut(leaf) {
            Some(Export::Function(existing)) => {
                existing.extend(&overloads);
                Ok(())
            }
            Some(other) => Err(ExportError::invalid_path(
                path,
                format!("'{leaf}' is already a {}", other.kind()),
            )),
            None => {
                parent
                    .entries
                    .insert(leaf.to_owned(), Export::Function(overloads));
                Ok(())
            }
        }
    }

    pub(crate) fn insert_class(
        &mut self,
        path: &str,
        separator: &str,
        class: ClassId,
    ) -> Result<(), ExportError> {
        let (parent, leaf) = self.parent_of(path, separator)?;
        if let Some(other) = parent.entries.get(leaf) {
            return Err(ExportError::invalid_path(
                path,
                format!("'{leaf}' is already a {}", other.kind()),
            ));
        }
        parent.entries.insert(leaf.to_owned(), Export::Class(class));
        Ok(())
    }

    /// Walk to the namespace that will hold the last segment of `path`,
    /// creating intermediate namespaces on the way.
    fn parent_of<'p>(
        &mut self,
        path: &'p str,
        separator: &str,
    ) -> Result<(&mut Namespace, &'p str), ExportError> {
        let segments: Vec<&str> = path.split(separator).collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(ExportError::invalid_path(path, "empty path segment"));
        }
        // Lookups split on '.', so a dot left inside a segment is unreachable.
        if let Some(segment) = segments.iter().find(|segment| segment.contains('.')) {
            return Err(ExportError::invalid_path(
                path,
                format!("segment '{segment}' contains '.'"),
            ));
        }
        let Some((leaf, parents)) = segments.split_last() else {
            return Err(ExportError::invalid_path(path, "empty path"));
        };

        let mut current = self;
        for segment in parents {
            let entry = current
                .entries
                .entry((*segment).to_owned())
                .or_insert_with(|| Export::Namespace(Namespace::default()));
            current = match entry {
                Export::Namespace(namespace) => namespace,
                other => {
                    return Err(ExportError::invalid_path(
                        path,
                        format!("'{segment}' is a {}, not a namespace", other.kind()),
                    ));
                }
            };
        }
        Ok((current, *leaf))
    }
}

// =============================================================================
// Module
// =============================================================================

/// A frozen registry published under a name.
///
/// Paths passed to lookups and calls are dotted (`"geometry.Point"`),
/// independent of the separator used at registration.
pub struct Module {
    name: String,
    exports: Namespace,
    dispatcher: Rc<Dispatcher>,
}

impl Module {
    pub(crate) fn new(name: &str, exports: Namespace, dispatcher: Rc<Dispatcher>) -> Self {
        Self {
            name: name.to_owned(),
            exports,
            dispatcher,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Top-level namespace.
    pub fn exports(&self) -> &Namespace {
        &self.exports
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn get(&self, path: &str) -> Option<&Export> {
        self.exports.lookup(path.split('.'))
    }

    /// Handle to an exported function.
    pub fn function(&self, path: &str) -> Option<Function> {
        match self.get(path)? {
            Export::Function(overloads) => Some(Function {
                name: path.to_owned(),
                overloads: overloads.clone(),
                dispatcher: Rc::clone(&self.dispatcher),
            }),
            _ => None,
        }
    }

    /// Handle to an exported class.
    pub fn class(&self, path: &str) -> Option<ClassObject> {
        match self.get(path)? {
            Export::Class(id) => Some(ClassObject {
                id: *id,
                dispatcher: Rc::clone(&self.dispatcher),
            }),
            _ => None,
        }
    }

    /// Call an exported function.
    pub fn call(&self, path: &str, args: &[Dynamic]) -> Result<Dynamic, HostError> {
        self.function(path)
            .ok_or_else(|| self.missing(path))?
            .call(args)
    }

    /// Construct an instance of an exported class.
    pub fn construct(&self, path: &str, args: &[Dynamic]) -> Result<Dynamic, HostError> {
        self.class(path)
            .ok_or_else(|| self.missing(path))?
            .construct(args)
    }

    /// Call a static method of an exported class.
    pub fn call_static(
        &self,
        path: &str,
        method: &str,
        args: &[Dynamic],
    ) -> Result<Dynamic, HostError> {
        self.class(path)
            .ok_or_else(|| self.missing(path))?
            .call_static(method, args)
    }

    /// Call an instance method on an object produced by this module.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call_method(
        &self,
        object: &HostObject,
        method: &str,
        args: &[Dynamic],
    ) -> Result<Dynamic, HostError> {
        Ok(self.dispatcher.call_method(object, method, args)?)
    }

    fn missing(&self, path: &str) -> HostError {
        DispatchError::UnknownMember {
            class: format!("module '{}'", self.name),
            name: path.to_owned(),
        }
        .into()
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("exports", &self.exports.names())
            .finish()
    }
}

/// An exported function and its overloads.
#[derive(Clone)]
pub struct Function {
    name: String,
    overloads: OverloadSet,
    dispatcher: Rc<Dispatcher>,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn overloads(&self) -> &OverloadSet {
        &self.overloads
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call(&self, args: &[Dynamic]) -> Result<Dynamic, HostError> {
        Ok(self
            .dispatcher
            .dispatch(&self.name, &self.overloads, None, args)?)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("arities", &self.overloads.arities())
            .finish()
    }
}

/// An exported class: its constructor, static methods and metadata.
#[derive(Clone)]
pub struct ClassObject {
    id: ClassId,
    dispatcher: Rc<Dispatcher>,
}

impl ClassObject {
    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.dispatcher.classes().name_of(self.id)
    }

    pub fn binding(&self) -> Option<&ClassBinding> {
        self.dispatcher.classes().get(self.id)
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn construct(&self, args: &[Dynamic]) -> Result<Dynamic, HostError> {
        Ok(self.dispatcher.construct(self.id, args)?)
    }

    pub fn call_static(&self, method: &str, args: &[Dynamic]) -> Result<Dynamic, HostError> {
        Ok(self.dispatcher.call_static(self.id, method, args)?)
    }

    /// Instance method names, own and inherited, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        self.dispatcher.method_names(self.id)
    }

    pub fn static_method_names(&self) -> Vec<&str> {
        self.dispatcher.static_method_names(self.id)
    }

    /// Whether `value` is an object of this class or of a subclass.
    pub fn is_instance(&self, value: &Dynamic) -> bool {
        value
            .as_object()
            .is_some_and(|object| self.dispatcher.classes().is_subclass(object.class(), self.id))
    }
}

impl fmt::Debug for ClassObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassObject")
            .field("id", &self.id)
            .field("name", &self.name())
            .finish()
    }
}
