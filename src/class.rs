//! Class bindings and the inheritance table.
//!
//! Every native type known to the registry has exactly one [`ClassBinding`],
//! created the first time the type is declared or named as a superclass.
//! Superclass edges carry an [`UpcastStep`] built at registration time from
//! the subclass's `AsRef`/`AsMut` impls; call-time upcasting walks those
//! steps instead of inspecting the object.

use std::any::{Any, TypeId};
use std::cell::Cell;

use bindery_core::{
    BorrowFailure, ClassId, ClassMut, ClassRef, ConversionError, HostObject, NativeAny, NativeError,
};
use bitflags::bitflags;
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::convert::NativeClass;
use crate::dispatch::{Overload, OverloadSet};

bitflags! {
    /// Per-class flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClassFlags: u8 {
        /// Declared through a class builder rather than only referenced.
        const DECLARED = 1 << 0;
        /// Pointer-form returns copy the value instead of borrowing it.
        const COPYABLE = 1 << 1;
    }
}

// =============================================================================
// Upcasting
// =============================================================================

type UpcastRefFn = for<'a> fn(&'a NativeAny) -> Option<&'a NativeAny>;
type UpcastMutFn = for<'a> fn(&'a mut NativeAny) -> Option<&'a mut NativeAny>;
type CopyFn = fn(&NativeAny) -> Option<Box<NativeAny>>;

fn upcast_ref<D, B>(value: &NativeAny) -> Option<&NativeAny>
where
    D: AsRef<B> + Any,
    B: Any,
{
    let derived = value.downcast_ref::<D>()?;
    let base: &NativeAny = AsRef::<B>::as_ref(derived);
    Some(base)
}

fn upcast_mut<D, B>(value: &mut NativeAny) -> Option<&mut NativeAny>
where
    D: AsMut<B> + Any,
    B: Any,
{
    let derived = value.downcast_mut::<D>()?;
    let base: &mut NativeAny = AsMut::<B>::as_mut(derived);
    Some(base)
}

fn copy_value<T: Clone + Any>(value: &NativeAny) -> Option<Box<NativeAny>> {
    value
        .downcast_ref::<T>()
        .map(|value| Box::new(value.clone()) as Box<NativeAny>)
}

/// Adjusts a reference to a subclass value into a reference to one of its
/// direct superclasses.
#[derive(Clone, Copy)]
pub struct UpcastStep {
    as_ref: UpcastRefFn,
    as_mut: UpcastMutFn,
}

impl UpcastStep {
    /// Step from `D` to its embedded `B`.
    pub fn of<D, B>() -> Self
    where
        D: AsRef<B> + AsMut<B> + Any,
        B: Any,
    {
        Self {
            as_ref: upcast_ref::<D, B>,
            as_mut: upcast_mut::<D, B>,
        }
    }

    /// Returns `None` when `value` is not of the step's subclass.
    pub fn apply<'a>(&self, value: &'a NativeAny) -> Option<&'a NativeAny> {
        (self.as_ref)(value)
    }

    pub fn apply_mut<'a>(&self, value: &'a mut NativeAny) -> Option<&'a mut NativeAny> {
        (self.as_mut)(value)
    }
}

impl std::fmt::Debug for UpcastStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UpcastStep")
    }
}

/// Apply a chain of steps, most derived first.
pub fn apply_path<'a>(path: &[UpcastStep], value: &'a NativeAny) -> Option<&'a NativeAny> {
    path.iter().try_fold(value, |value, step| step.apply(value))
}

pub fn apply_path_mut<'a>(
    path: &[UpcastStep],
    mut value: &'a mut NativeAny,
) -> Option<&'a mut NativeAny> {
    for step in path {
        value = step.apply_mut(value)?;
    }
    Some(value)
}

/// A direct superclass edge.
#[derive(Debug, Clone, Copy)]
pub struct SuperClass {
    pub class: ClassId,
    pub upcast: UpcastStep,
}

// =============================================================================
// ClassBinding
// =============================================================================

/// One registered method overload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: String,
    pub arity: usize,
    pub overload: Overload,
}

/// Kind of member an overload key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum MemberKind {
    Constructor,
    Method,
    Static,
}

/// Metadata for one native type.
pub struct ClassBinding {
    id: ClassId,
    name: String,
    type_id: TypeId,
    flags: ClassFlags,
    constructors: OverloadSet,
    methods: Vec<MethodDescriptor>,
    static_methods: Vec<MethodDescriptor>,
    superclasses: Vec<SuperClass>,
    copy: Option<CopyFn>,
    overload_keys: FxHashSet<(MemberKind, String, TypeId)>,
    initialized: Cell<bool>,
}

impl ClassBinding {
    fn new(id: ClassId, name: &str, type_id: TypeId) -> Self {
        Self {
            id,
            name: name.to_owned(),
            type_id,
            flags: ClassFlags::empty(),
            constructors: OverloadSet::default(),
            methods: Vec::new(),
            static_methods: Vec::new(),
            superclasses: Vec::new(),
            copy: None,
            overload_keys: FxHashSet::default(),
            initialized: Cell::new(false),
        }
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Export name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn flags(&self) -> ClassFlags {
        self.flags
    }

    pub fn is_declared(&self) -> bool {
        self.flags.contains(ClassFlags::DECLARED)
    }

    pub fn is_copyable(&self) -> bool {
        self.flags.contains(ClassFlags::COPYABLE)
    }

    /// Constructors grouped by arity, each group in registration order.
    pub fn constructors(&self) -> &OverloadSet {
        &self.constructors
    }

    /// Instance methods declared directly on this class.
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn static_methods(&self) -> &[MethodDescriptor] {
        &self.static_methods
    }

    /// Direct superclasses in declaration order.
    pub fn superclasses(&self) -> &[SuperClass] {
        &self.superclasses
    }

    /// Copy a value of this class into a fresh box, if the class is copyable.
    pub fn copy_value(&self, value: &NativeAny) -> Option<Box<NativeAny>> {
        self.copy.and_then(|copy| copy(value))
    }

    /// Mark the binding exported. Returns `true` only on the first call.
    pub fn initialize(&self) -> bool {
        !self.initialized.replace(true)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.get()
    }

    pub(crate) fn has_overload(&self, kind: MemberKind, name: &str, params: TypeId) -> bool {
        self.overload_keys
            .contains(&(kind, name.to_owned(), params))
    }

    pub(crate) fn declare(&mut self, name: &str) {
        self.name = name.to_owned();
        self.flags |= ClassFlags::DECLARED;
    }

    pub(crate) fn set_copy<T: Clone + Any>(&mut self) {
        self.copy = Some(copy_value::<T>);
        self.flags |= ClassFlags::COPYABLE;
    }

    pub(crate) fn add_constructor(&mut self, arity: usize, params: TypeId, overload: Overload) {
        self.overload_keys
            .insert((MemberKind::Constructor, String::new(), params));
        self.constructors.push(arity, overload);
    }

    pub(crate) fn add_method(&mut self, method: MethodDescriptor, params: TypeId) {
        self.overload_keys
            .insert((MemberKind::Method, method.name.clone(), params));
        self.methods.push(method);
    }

    pub(crate) fn add_static_method(&mut self, method: MethodDescriptor, params: TypeId) {
        self.overload_keys
            .insert((MemberKind::Static, method.name.clone(), params));
        self.static_methods.push(method);
    }
}

impl std::fmt::Debug for ClassBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassBinding")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("methods", &self.methods.len())
            .field("static_methods", &self.static_methods.len())
            .field("superclasses", &self.superclasses.len())
            .finish()
    }
}

// =============================================================================
// ClassTable
// =============================================================================

/// All class bindings, keyed by native type, plus the superclass graph.
///
/// Graph nodes are created in lockstep with bindings, so a node index equals
/// the class index.
#[derive(Default)]
pub struct ClassTable {
    bindings: Vec<ClassBinding>,
    ids: FxHashMap<TypeId, ClassId>,
    graph: DiGraph<ClassId, ()>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &ClassBinding> {
        self.bindings.iter()
    }

    pub fn get(&self, id: ClassId) -> Option<&ClassBinding> {
        self.bindings.get(id.index())
    }

    pub fn id_of<T: Any>(&self) -> Option<ClassId> {
        self.id_of_type(TypeId::of::<T>())
    }

    pub fn id_of_type(&self, type_id: TypeId) -> Option<ClassId> {
        self.ids.get(&type_id).copied()
    }

    /// Export name of a class, for diagnostics.
    pub fn name_of(&self, id: ClassId) -> &str {
        self.get(id).map_or("<unknown>", ClassBinding::name)
    }

    /// Get or lazily create the binding for `T`.
    pub(crate) fn ensure<T: NativeClass>(&mut self) -> ClassId {
        if let Some(id) = self.id_of::<T>() {
            return id;
        }
        let id = ClassId::new(self.bindings.len() as u32);
        self.bindings
            .push(ClassBinding::new(id, T::NAME, TypeId::of::<T>()));
        self.ids.insert(TypeId::of::<T>(), id);
        let node = self.graph.add_node(id);
        debug_assert_eq!(node.index(), id.index());
        id
    }

    pub(crate) fn binding_mut(&mut self, id: ClassId) -> Option<&mut ClassBinding> {
        self.bindings.get_mut(id.index())
    }

    /// Whether an edge `class -> base` would close a cycle.
    pub(crate) fn would_cycle(&self, class: ClassId, base: ClassId) -> bool {
        class == base || self.is_subclass(base, class)
    }

    pub(crate) fn add_super_class(&mut self, class: ClassId, superclass: SuperClass) {
        let Some(binding) = self.bindings.get_mut(class.index()) else {
            return;
        };
        if binding
            .superclasses
            .iter()
            .any(|existing| existing.class == superclass.class)
        {
            return;
        }
        binding.superclasses.push(superclass);
        self.graph.add_edge(
            NodeIndex::new(class.index()),
            NodeIndex::new(superclass.class.index()),
            (),
        );
    }

    /// True when `to` is `from` or one of its ancestors.
    pub fn is_subclass(&self, from: ClassId, to: ClassId) -> bool {
        if from == to {
            return true;
        }
        if from.index() >= self.bindings.len() || to.index() >= self.bindings.len() {
            return false;
        }
        has_path_connecting(
            &self.graph,
            NodeIndex::new(from.index()),
            NodeIndex::new(to.index()),
            None,
        )
    }

    /// View a value of class `from` as class `to`.
    ///
    /// Tries direct superclasses in declaration order and returns the first
    /// path that reaches `to`, or `None` when the classes are unrelated.
    pub fn upcast_step<'a>(
        &self,
        from: ClassId,
        to: ClassId,
        value: &'a NativeAny,
    ) -> Option<&'a NativeAny> {
        if from == to {
            return Some(value);
        }
        self.get(from)?.superclasses.iter().find_map(|superclass| {
            let base = superclass.upcast.apply(value)?;
            self.upcast_step(superclass.class, to, base)
        })
    }

    /// The chain of steps [`upcast_step`](Self::upcast_step) would follow.
    pub fn upcast_path(&self, from: ClassId, to: ClassId) -> Option<Vec<UpcastStep>> {
        let mut path = Vec::new();
        self.collect_path(from, to, &mut path).then_some(path)
    }

    fn collect_path(&self, from: ClassId, to: ClassId, path: &mut Vec<UpcastStep>) -> bool {
        if from == to {
            return true;
        }
        let Some(binding) = self.get(from) else {
            return false;
        };
        for superclass in &binding.superclasses {
            path.push(superclass.upcast);
            if self.collect_path(superclass.class, to, path) {
                return true;
            }
            path.pop();
        }
        false
    }

    pub fn upcast_mut<'a>(
        &self,
        from: ClassId,
        to: ClassId,
        value: &'a mut NativeAny,
    ) -> Option<&'a mut NativeAny> {
        let path = self.upcast_path(from, to)?;
        apply_path_mut(&path, value)
    }

    /// Borrow an object's value viewed as class `target`.
    pub fn borrow_as<'o>(
        &self,
        object: &'o HostObject,
        target: ClassId,
    ) -> Result<ClassRef<'o, NativeAny>, ConversionError> {
        let from = object.class();
        let guard = object
            .handle()
            .try_borrow()
            .map_err(|_| ConversionError::AlreadyBorrowed {
                type_name: self.name_of(from).to_owned(),
            })?;
        ClassRef::try_map(guard, |value| self.upcast_step(from, target, value))
            .ok_or_else(|| self.unreachable(from, target))
    }

    /// Mutably borrow an object's value viewed as class `target`.
    pub fn borrow_mut_as<'o>(
        &self,
        object: &'o HostObject,
        target: ClassId,
    ) -> Result<ClassMut<'o, NativeAny>, NativeError> {
        let from = object.class();
        let path = self
            .upcast_path(from, target)
            .ok_or_else(|| self.unreachable(from, target))?;
        let guard = object
            .handle()
            .try_borrow_mut()
            .map_err(|failure| borrow_error(failure, self.name_of(from)))?;
        ClassMut::try_map(guard, |value| apply_path_mut(&path, value))
            .ok_or_else(|| self.unreachable(from, target).into())
    }

    /// Collect the instance methods visible on `id`.
    ///
    /// Own methods come first, then each superclass depth-first in
    /// declaration order. A name defined closer to `id` hides every
    /// same-named method further up; a class reached twice through a
    /// diamond contributes once.
    pub fn resolve_methods(&self, id: ClassId) -> FxHashMap<String, OverloadSet> {
        let mut table = FxHashMap::default();
        let mut owners = FxHashMap::default();
        let mut visited = FxHashSet::default();
        self.collect_methods(id, &mut visited, &mut owners, &mut table);
        table
    }

    fn collect_methods<'t>(
        &'t self,
        id: ClassId,
        visited: &mut FxHashSet<ClassId>,
        owners: &mut FxHashMap<&'t str, ClassId>,
        table: &mut FxHashMap<String, OverloadSet>,
    ) {
        if !visited.insert(id) {
            return;
        }
        let Some(binding) = self.get(id) else {
            return;
        };
        for method in &binding.methods {
            let owner = *owners.entry(method.name.as_str()).or_insert(id);
            if owner == id {
                table
                    .entry(method.name.clone())
                    .or_insert_with(OverloadSet::default)
                    .push(method.arity, method.overload);
            }
        }
        for superclass in &binding.superclasses {
            self.collect_methods(superclass.class, visited, owners, table);
        }
    }

    /// Static methods declared directly on `id`, grouped by name.
    pub fn resolve_static_methods(&self, id: ClassId) -> FxHashMap<String, OverloadSet> {
        let mut table: FxHashMap<String, OverloadSet> = FxHashMap::default();
        if let Some(binding) = self.get(id) {
            for method in &binding.static_methods {
                table
                    .entry(method.name.clone())
                    .or_default()
                    .push(method.arity, method.overload);
            }
        }
        table
    }

    fn unreachable(&self, from: ClassId, to: ClassId) -> ConversionError {
        ConversionError::UpcastUnreachable {
            from: self.name_of(from).to_owned(),
            to: self.name_of(to).to_owned(),
        }
    }
}

pub(crate) fn borrow_error(failure: BorrowFailure, type_name: &str) -> NativeError {
    match failure {
        BorrowFailure::InUse => NativeError::AlreadyBorrowed {
            type_name: type_name.to_owned(),
        },
        BorrowFailure::ReadOnly => NativeError::ReadOnly {
            type_name: type_name.to_owned(),
        },
    }
}
