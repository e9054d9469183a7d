//! Overload resolution and invocation.
//!
//! Resolution is two-level: the argument count selects an arity group, then
//! the group's overloads are checked in registration order and the first
//! one whose checker accepts every argument is invoked. There is no "most
//! specific match" ranking, so registration order is part of a binding's
//! contract.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use bindery_core::{ClassId, ConversionError, Dynamic, HostObject, NativeError, SignatureId};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::class::ClassTable;
use crate::convert::MarshalContext;
use crate::signature::{Receiver, SignatureTable};

// =============================================================================
// Overloads
// =============================================================================

/// One callable: its shared signature and its slot in that signature's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overload {
    pub signature: SignatureId,
    pub dispatch_index: usize,
    /// Declaring class for instance methods; `None` for everything else.
    pub owner: Option<ClassId>,
}

/// Overloads grouped by arity, each group in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverloadSet {
    by_arity: BTreeMap<usize, Vec<Overload>>,
}

impl OverloadSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, arity: usize, overload: Overload) {
        self.by_arity.entry(arity).or_default().push(overload);
    }

    /// Overloads accepting exactly `arity` arguments.
    pub fn group(&self, arity: usize) -> Option<&[Overload]> {
        self.by_arity.get(&arity).map(Vec::as_slice)
    }

    /// Registered arities, ascending.
    pub fn arities(&self) -> Vec<usize> {
        self.by_arity.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.by_arity.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_arity.is_empty()
    }

    /// Append every overload of `other` after this set's own.
    pub fn extend(&mut self, other: &OverloadSet) {
        for (arity, overloads) in &other.by_arity {
            self.by_arity
                .entry(*arity)
                .or_default()
                .extend(overloads.iter().copied());
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// An overload that was tried and rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Parameter list, e.g. `(int32, string)`.
    pub signature: String,
    /// Per-position check results.
    pub verdict: Vec<bool>,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} type mismatch:", self.signature)?;
        for ok in &self.verdict {
            write!(f, " {}", u8::from(*ok))?;
        }
        Ok(())
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failures raised while resolving or running a call.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No overload group for the supplied argument count.
    #[error("{name}: wrong number of arguments: got {got}, expected {}", join(.expected))]
    ArgumentCountMismatch {
        name: String,
        got: usize,
        expected: Vec<usize>,
    },

    /// A group exists but no overload accepted the arguments.
    #[error("{name}: wrong argument types ({}); tried {}", join(.actual), join(.candidates))]
    NoMatchingOverload {
        name: String,
        actual: Vec<&'static str>,
        candidates: Vec<Candidate>,
    },

    /// An argument passed its check but failed to decode.
    #[error("{name}: {source}")]
    Conversion {
        name: String,
        #[source]
        source: ConversionError,
    },

    /// The native body failed, panicked, or its result failed to encode.
    #[error("{name}: {source}")]
    Native {
        name: String,
        #[source]
        source: NativeError,
    },

    /// No method, static method or constructor by that name.
    #[error("{class} has no member named '{name}'")]
    UnknownMember { class: String, name: String },
}

impl DispatchError {
    fn from_native(name: &str, err: NativeError) -> Self {
        match err {
            NativeError::Conversion(source) => DispatchError::Conversion {
                name: name.to_owned(),
                source,
            },
            source => DispatchError::Native {
                name: name.to_owned(),
                source,
            },
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("unknown panic payload")
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

struct MethodTable {
    instance: FxHashMap<String, OverloadSet>,
    statics: FxHashMap<String, OverloadSet>,
}

/// The frozen registry: every class, every signature, and the resolved
/// member tables. Built once by export and read-only afterwards.
pub struct Dispatcher {
    classes: ClassTable,
    signatures: SignatureTable,
    members: Vec<MethodTable>,
}

impl Dispatcher {
    pub(crate) fn new(classes: ClassTable, signatures: SignatureTable) -> Self {
        let members = classes
            .iter()
            .map(|binding| MethodTable {
                instance: classes.resolve_methods(binding.id()),
                statics: classes.resolve_static_methods(binding.id()),
            })
            .collect();
        Self {
            classes,
            signatures,
            members,
        }
    }

    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    pub fn signatures(&self) -> &SignatureTable {
        &self.signatures
    }

    pub fn context(&self) -> MarshalContext<'_> {
        MarshalContext::new(&self.classes)
    }

    /// Resolve and run one call against an overload set.
    ///
    /// `receiver` is required for overloads that carry an owner class and
    /// ignored otherwise.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn dispatch(
        &self,
        name: &str,
        overloads: &OverloadSet,
        receiver: Option<&HostObject>,
        args: &[Dynamic],
    ) -> Result<Dynamic, DispatchError> {
        let group =
            overloads
                .group(args.len())
                .ok_or_else(|| DispatchError::ArgumentCountMismatch {
                    name: name.to_owned(),
                    got: args.len(),
                    expected: overloads.arities(),
                })?;

        let cx = self.context();
        let mut candidates = Vec::with_capacity(group.len());
        for overload in group {
            let Some(signature) = self.signatures.get(overload.signature) else {
                continue;
            };
            let verdict = {
                #[cfg(feature = "profiling")]
                profiling::scope!("check");
                signature.check(args, &cx)
            };
            if verdict.iter().all(|ok| *ok) {
                let receiver = match (receiver, overload.owner) {
                    (Some(object), Some(owner)) => Some(Receiver { object, owner }),
                    _ => None,
                };
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    signature.invoke(overload.dispatch_index, receiver, args, &cx)
                }));
                return match outcome {
                    Ok(result) => result.map_err(|err| DispatchError::from_native(name, err)),
                    Err(payload) => Err(DispatchError::Native {
                        name: name.to_owned(),
                        source: NativeError::Panic {
                            message: panic_message(&*payload),
                        },
                    }),
                };
            }
            candidates.push(Candidate {
                signature: self.signatures.describe(overload.signature),
                verdict,
            });
        }

        Err(DispatchError::NoMatchingOverload {
            name: name.to_owned(),
            actual: args.iter().map(Dynamic::type_name).collect(),
            candidates,
        })
    }

    /// Build a new instance of `class` from `args`.
    pub fn construct(&self, class: ClassId, args: &[Dynamic]) -> Result<Dynamic, DispatchError> {
        let binding = self.classes.get(class).ok_or_else(|| self.unknown(class, "constructor"))?;
        self.dispatch(binding.name(), binding.constructors(), None, args)
    }

    /// Call an instance method, including inherited ones, on `object`.
    pub fn call_method(
        &self,
        object: &HostObject,
        method: &str,
        args: &[Dynamic],
    ) -> Result<Dynamic, DispatchError> {
        let class = object.class();
        let overloads = self
            .members
            .get(class.index())
            .and_then(|table| table.instance.get(method))
            .ok_or_else(|| self.unknown(class, method))?;
        let name = format!("{}.{}", self.classes.name_of(class), method);
        self.dispatch(&name, overloads, Some(object), args)
    }

    /// Call a static method declared on `class`.
    pub fn call_static(
        &self,
        class: ClassId,
        method: &str,
        args: &[Dynamic],
    ) -> Result<Dynamic, DispatchError> {
        let overloads = self
            .members
            .get(class.index())
            .and_then(|table| table.statics.get(method))
            .ok_or_else(|| self.unknown(class, method))?;
        let name = format!("{}.{}", self.classes.name_of(class), method);
        self.dispatch(&name, overloads, None, args)
    }

    /// Instance method names visible on `class`, sorted.
    pub fn method_names(&self, class: ClassId) -> Vec<&str> {
        self.sorted_names(class, |table| &table.instance)
    }

    /// Static method names declared on `class`, sorted.
    pub fn static_method_names(&self, class: ClassId) -> Vec<&str> {
        self.sorted_names(class, |table| &table.statics)
    }

    fn sorted_names(
        &self,
        class: ClassId,
        select: impl Fn(&MethodTable) -> &FxHashMap<String, OverloadSet>,
    ) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .members
            .get(class.index())
            .map(|table| select(table).keys().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    fn unknown(&self, class: ClassId, name: &str) -> DispatchError {
        DispatchError::UnknownMember {
            class: self.classes.name_of(class).to_owned(),
            name: name.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::FunctionSignature;

    fn overload(signature: SignatureId, dispatch_index: usize) -> Overload {
        Overload {
            signature,
            dispatch_index,
            owner: None,
        }
    }

    fn adders() -> (Dispatcher, OverloadSet) {
        let mut signatures = SignatureTable::new();
        let (by_int, first) = signatures
            .add::<FunctionSignature<(i64,), String>>(Box::new(|(v,): (i64,)| format!("int {v}")));
        let (_, second) = signatures.add::<FunctionSignature<(i64,), String>>(Box::new(
            |(v,): (i64,)| format!("second {v}"),
        ));
        let (by_float, float) = signatures
            .add::<FunctionSignature<(f64,), String>>(Box::new(|(v,): (f64,)| format!("float {v}")));
        let (pair, pair_index) = signatures.add::<FunctionSignature<(i64, i64), i64>>(Box::new(
            |(a, b): (i64, i64)| a + b,
        ));

        let mut set = OverloadSet::new();
        set.push(1, overload(by_int, first));
        set.push(1, overload(by_int, second));
        set.push(1, overload(by_float, float));
        set.push(2, overload(pair, pair_index));
        (Dispatcher::new(ClassTable::new(), signatures), set)
    }

    #[test]
    fn overload_set_groups_by_arity() {
        let (_, set) = adders();
        assert_eq!(set.arities(), vec![1, 2]);
        assert_eq!(set.group(1).unwrap().len(), 3);
        assert!(set.group(0).is_none());
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn overload_set_extend_keeps_order() {
        let mut left = OverloadSet::new();
        left.push(1, overload(SignatureId::new(0), 0));
        let mut right = OverloadSet::new();
        right.push(1, overload(SignatureId::new(1), 0));
        right.push(0, overload(SignatureId::new(2), 0));
        left.extend(&right);
        let group = left.group(1).unwrap();
        assert_eq!(group[0].signature, SignatureId::new(0));
        assert_eq!(group[1].signature, SignatureId::new(1));
        assert_eq!(left.arities(), vec![0, 1]);
    }

    #[test]
    fn arity_mismatch_lists_expected() {
        let (dispatcher, set) = adders();
        let err = dispatcher
            .dispatch("f", &set, None, &[Dynamic::Int(1), Dynamic::Int(2), Dynamic::Int(3)])
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::ArgumentCountMismatch { got: 3, ref expected, .. } if expected == &[1, 2]
        ));
        assert!(err.to_string().contains("wrong number of arguments"));
    }

    #[test]
    fn first_registered_match_wins() {
        let (dispatcher, set) = adders();
        for _ in 0..3 {
            let result = dispatcher.dispatch("f", &set, None, &[Dynamic::Int(5)]).unwrap();
            assert_eq!(result, Dynamic::from("int 5"));
        }
    }

    #[test]
    fn later_overload_used_when_earlier_rejects() {
        let (dispatcher, set) = adders();
        let result = dispatcher.dispatch("f", &set, None, &[Dynamic::Float(0.5)]).unwrap();
        assert_eq!(result, Dynamic::from("float 0.5"));
    }

    #[test]
    fn no_match_reports_each_candidate() {
        let (dispatcher, set) = adders();
        let err = dispatcher
            .dispatch("f", &set, None, &[Dynamic::from("x")])
            .unwrap_err();
        let DispatchError::NoMatchingOverload {
            actual, candidates, ..
        } = &err
        else {
            panic!("expected NoMatchingOverload, got {err:?}");
        };
        assert_eq!(actual, &["string"]);
        assert_eq!(candidates.len(), 3);
        assert!(candidates.iter().all(|c| c.verdict == [false]));
        assert_eq!(candidates[0].to_string(), "(int64) type mismatch: 0");
    }

    #[test]
    fn decode_failure_is_conversion_error() {
        let mut signatures = SignatureTable::new();
        let (id, index) =
            signatures.add::<FunctionSignature<(u8,), u8>>(Box::new(|(v,): (u8,)| v));
        let mut set = OverloadSet::new();
        set.push(1, overload(id, index));
        let dispatcher = Dispatcher::new(ClassTable::new(), signatures);
        let err = dispatcher.dispatch("g", &set, None, &[Dynamic::Int(1000)]).unwrap_err();
        assert!(matches!(err, DispatchError::Conversion { .. }));
    }

    #[test]
    fn panics_are_contained() {
        let mut signatures = SignatureTable::new();
        fn explode((): ()) {
            panic!("native exploded");
        }
        let (id, index) = signatures.add::<FunctionSignature<(), ()>>(Box::new(explode));
        let mut set = OverloadSet::new();
        set.push(0, overload(id, index));
        let dispatcher = Dispatcher::new(ClassTable::new(), signatures);
        let err = dispatcher.dispatch("boom", &set, None, &[]).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Native { source: NativeError::Panic { ref message }, .. }
                if message == "native exploded"
        ));
    }

    #[test]
    fn unknown_member() {
        let dispatcher = Dispatcher::new(ClassTable::new(), SignatureTable::new());
        let err = dispatcher.construct(ClassId::new(4), &[]).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownMember { .. }));
    }
}
