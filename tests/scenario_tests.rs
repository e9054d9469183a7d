//! End-to-end binding scenarios: declare, export, call through the module.

use bindery::{
    Dynamic, HostErrorKind, Instance, Module, NativeClass, NativeError, Ownership, Registry,
};

// =============================================================================
// Fixtures
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Point {
    x: i32,
    y: i32,
}

impl NativeClass for Point {
    const NAME: &'static str = "Point";
}

#[derive(Debug, Clone, PartialEq)]
struct FirstParent {
    label: String,
}

impl FirstParent {
    fn from_first_parent(&self) -> String {
        format!("first parent: {}", self.label)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SecondParent {
    hits: i64,
}

#[derive(Debug, Clone, PartialEq)]
struct Child {
    first: FirstParent,
    second: SecondParent,
    name: String,
}

impl AsRef<FirstParent> for Child {
    fn as_ref(&self) -> &FirstParent {
        &self.first
    }
}

impl AsMut<FirstParent> for Child {
    fn as_mut(&mut self) -> &mut FirstParent {
        &mut self.first
    }
}

impl AsRef<SecondParent> for Child {
    fn as_ref(&self) -> &SecondParent {
        &self.second
    }
}

impl AsMut<SecondParent> for Child {
    fn as_mut(&mut self) -> &mut SecondParent {
        &mut self.second
    }
}

impl NativeClass for FirstParent {
    const NAME: &'static str = "FirstParent";
}

impl NativeClass for SecondParent {
    const NAME: &'static str = "SecondParent";
}

impl NativeClass for Child {
    const NAME: &'static str = "Child";
}

fn point_module() -> Module {
    let mut registry = Registry::new();
    registry
        .class::<Point>()
        .constructor(|| Point { x: 0, y: 0 })
        .unwrap()
        .constructor(|x: i32, y: i32| Point { x, y })
        .unwrap()
        .method("x", |p: &Point| p.x)
        .unwrap()
        .method("y", |p: &Point| p.y)
        .unwrap()
        .copyable()
        .build()
        .unwrap();
    registry.export("points").unwrap()
}

fn family_module() -> Module {
    let mut registry = Registry::new();
    registry
        .class::<FirstParent>()
        .constructor(|label: String| FirstParent { label })
        .unwrap()
        .method("from_first_parent", FirstParent::from_first_parent)
        .unwrap()
        .method("describe", |_: &FirstParent| "first")
        .unwrap()
        .build()
        .unwrap();
    registry
        .class::<SecondParent>()
        .method("from_second_parent", |p: &SecondParent| p.hits)
        .unwrap()
        .method_mut("hit", |p: &mut SecondParent, by: i64| {
            p.hits += by;
            p.hits
        })
        .unwrap()
        .method("describe", |_: &SecondParent| "second")
        .unwrap()
        .build()
        .unwrap();
    registry
        .class::<Child>()
        .constructor(|name: String| Child {
            first: FirstParent {
                label: format!("{name}'s first"),
            },
            second: SecondParent { hits: 0 },
            name,
        })
        .unwrap()
        .method("name", |c: &Child| c.name.clone())
        .unwrap()
        .inherits::<FirstParent>()
        .unwrap()
        .inherits::<SecondParent>()
        .unwrap()
        .build()
        .unwrap();
    registry
        .function("label_of", |parent: FirstParent| parent.label)
        .unwrap()
        .function("hit_twice", |target: Instance<SecondParent>| -> Result<i64, NativeError> {
            let mut second = target.borrow_mut()?;
            second.hits += 2;
            Ok(second.hits)
        })
        .unwrap();
    registry.export("family").unwrap()
}

fn object(value: &Dynamic) -> &bindery::HostObject {
    value.as_object().expect("expected an object")
}

// =============================================================================
// Scenario A: constructor overloads by arity
// =============================================================================

#[test]
fn test_construct_selects_two_argument_constructor() {
    let module = point_module();
    let point = module
        .construct("Point", &[Dynamic::Int(5), Dynamic::Int(7)])
        .unwrap();
    let point = object(&point);
    assert_eq!(point.ownership(), Ownership::Owned);
    assert_eq!(module.call_method(point, "x", &[]).unwrap(), Dynamic::Int(5));
    assert_eq!(module.call_method(point, "y", &[]).unwrap(), Dynamic::Int(7));
}

#[test]
fn test_construct_selects_default_constructor() {
    let module = point_module();
    let point = module.construct("Point", &[]).unwrap();
    assert_eq!(
        module.call_method(object(&point), "x", &[]).unwrap(),
        Dynamic::Int(0)
    );
}

#[test]
fn test_construct_with_unregistered_arity_fails() {
    let module = point_module();
    let err = module.construct("Point", &[Dynamic::Bool(true)]).unwrap_err();
    assert_eq!(err.kind(), HostErrorKind::ArgumentCountMismatch);
    assert!(err.message().contains("Point"), "{err}");
}

#[test]
fn test_construct_with_wrong_types_fails() {
    let module = point_module();
    let err = module
        .construct("Point", &[Dynamic::from("5"), Dynamic::Int(7)])
        .unwrap_err();
    assert_eq!(err.kind(), HostErrorKind::ArgumentTypeMismatch);
    assert!(err.message().contains("(int32, int32) type mismatch: 0 1"), "{err}");
}

// =============================================================================
// Scenario B: free-function overloads under distinct names
// =============================================================================

fn test_module() -> Module {
    let mut registry = Registry::new();
    registry
        .function("test", |s: String| s)
        .unwrap()
        .function("test2", |v: i32| v)
        .unwrap()
        .function("test3", || 0.5_f64)
        .unwrap();
    registry.export("overloads").unwrap()
}

#[test]
fn test_distinct_exported_names() {
    let module = test_module();
    assert_eq!(
        module.call("test", &[Dynamic::from("echo")]).unwrap(),
        Dynamic::from("echo")
    );
    assert_eq!(module.call("test2", &[Dynamic::Int(5)]).unwrap(), Dynamic::Int(5));
    assert_eq!(module.call("test3", &[]).unwrap(), Dynamic::Float(0.5));
}

#[test]
fn test_wrong_argument_type_is_reported() {
    let module = test_module();
    let err = module.call("test2", &[Dynamic::from("hello")]).unwrap_err();
    assert_eq!(err.kind(), HostErrorKind::ArgumentTypeMismatch);
    assert!(err.message().contains("string"), "{err}");
}

#[test]
fn test_unknown_function() {
    let module = test_module();
    let err = module.call("test4", &[]).unwrap_err();
    assert_eq!(err.kind(), HostErrorKind::UnknownMember);
}

#[test]
fn test_shared_name_overloads_resolve_by_type() {
    let mut registry = Registry::new();
    registry
        .function("describe", |v: i64| format!("int {v}"))
        .unwrap()
        .function("describe", |v: String| format!("string {v}"))
        .unwrap()
        .function("describe", |a: i64, b: i64| format!("pair {a} {b}"))
        .unwrap();
    let module = registry.export("m").unwrap();
    assert_eq!(
        module.call("describe", &[Dynamic::Int(1)]).unwrap(),
        Dynamic::from("int 1")
    );
    assert_eq!(
        module.call("describe", &[Dynamic::from("x")]).unwrap(),
        Dynamic::from("string x")
    );
    assert_eq!(
        module
            .call("describe", &[Dynamic::Int(1), Dynamic::Int(2)])
            .unwrap(),
        Dynamic::from("pair 1 2")
    );
}

// =============================================================================
// Scenario C: multiple inheritance
// =============================================================================

#[test]
fn test_inherited_method_from_first_parent() {
    let module = family_module();
    let child = module.construct("Child", &[Dynamic::from("ada")]).unwrap();
    let result = module
        .call_method(object(&child), "from_first_parent", &[])
        .unwrap();
    assert_eq!(result, Dynamic::from("first parent: ada's first"));
}

#[test]
fn test_inherited_mutation_through_second_parent() {
    let module = family_module();
    let child = module.construct("Child", &[Dynamic::from("bo")]).unwrap();
    let child = object(&child);
    module.call_method(child, "hit", &[Dynamic::Int(3)]).unwrap();
    assert_eq!(
        module.call_method(child, "from_second_parent", &[]).unwrap(),
        Dynamic::Int(3)
    );
    assert_eq!(
        module.call_method(child, "name", &[]).unwrap(),
        Dynamic::from("bo")
    );
}

#[test]
fn test_first_declared_parent_wins_name_conflicts() {
    let module = family_module();
    let child = module.construct("Child", &[Dynamic::from("cy")]).unwrap();
    assert_eq!(
        module.call_method(object(&child), "describe", &[]).unwrap(),
        Dynamic::from("first")
    );
}

#[test]
fn test_child_passed_where_parent_expected() {
    let module = family_module();
    let child = module.construct("Child", &[Dynamic::from("di")]).unwrap();
    assert_eq!(
        module.call("label_of", &[child.clone()]).unwrap(),
        Dynamic::from("di's first")
    );
    assert_eq!(module.call("hit_twice", &[child.clone()]).unwrap(), Dynamic::Int(2));
    assert_eq!(
        module
            .call_method(object(&child), "from_second_parent", &[])
            .unwrap(),
        Dynamic::Int(2)
    );
}

#[test]
fn test_unrelated_object_rejected() {
    let module = family_module();
    let parent = module
        .construct("FirstParent", &[Dynamic::from("solo")])
        .unwrap();
    let err = module.call("hit_twice", &[parent.clone()]).unwrap_err();
    assert_eq!(err.kind(), HostErrorKind::ArgumentTypeMismatch);
    let err = module
        .call_method(object(&parent), "from_second_parent", &[])
        .unwrap_err();
    assert_eq!(err.kind(), HostErrorKind::UnknownMember);
}

#[test]
fn test_class_metadata() {
    let module = family_module();
    let child = module.class("Child").unwrap();
    assert_eq!(child.name(), "Child");
    assert_eq!(
        child.method_names(),
        vec!["describe", "from_first_parent", "from_second_parent", "hit", "name"]
    );
    let instance = child.construct(&[Dynamic::from("ed")]).unwrap();
    assert!(child.is_instance(&instance));
    assert!(module.class("FirstParent").unwrap().is_instance(&instance));
    assert!(!child.is_instance(&Dynamic::Int(1)));
}

// =============================================================================
// Scenario D: sequences
// =============================================================================

#[test]
fn test_sequence_round_trip() {
    let mut registry = Registry::new();
    registry
        .function("echo", |values: Vec<i64>| values)
        .unwrap()
        .function("sum", |values: Vec<i64>| values.iter().sum::<i64>())
        .unwrap()
        .function("first_two", |values: [i32; 2]| values[0] * 10 + values[1])
        .unwrap();
    let module = registry.export("seq").unwrap();

    let input = Dynamic::array([1_i64, 2, 3]);
    let output = module.call("echo", &[input.clone()]).unwrap();
    assert_eq!(output, Dynamic::array([1_i64, 2, 3]));
    assert_eq!(module.call("sum", &[input.clone()]).unwrap(), Dynamic::Int(6));
    assert_eq!(module.call("first_two", &[input]).unwrap(), Dynamic::Int(12));
}

#[test]
fn test_sparse_array_is_conversion_failure() {
    let mut registry = Registry::new();
    registry
        .function("sum", |values: Vec<i64>| values.iter().sum::<i64>())
        .unwrap();
    let module = registry.export("seq").unwrap();
    let sparse = Dynamic::Array(vec![Some(Dynamic::Int(1)), None, Some(Dynamic::Int(3))]);
    let err = module.call("sum", &[sparse]).unwrap_err();
    assert_eq!(err.kind(), HostErrorKind::ConversionFailure);
    assert!(err.message().contains("hole"), "{err}");
}

#[test]
fn test_nested_namespaces() {
    let mut registry = Registry::new();
    registry
        .function("math__vec__dot", |a: Vec<f64>, b: Vec<f64>| {
            a.iter().zip(&b).map(|(x, y)| x * y).sum::<f64>()
        })
        .unwrap();
    registry
        .class_named::<Point>("geometry__Point")
        .constructor(|x: i32, y: i32| Point { x, y })
        .unwrap()
        .build()
        .unwrap();
    let module = registry.export("nested").unwrap();

    let a = Dynamic::array([1.0, 2.0]);
    let b = Dynamic::array([3.0, 4.0]);
    assert_eq!(module.call("math.vec.dot", &[a, b]).unwrap(), Dynamic::Float(11.0));
    let point = module
        .construct("geometry.Point", &[Dynamic::Int(1), Dynamic::Int(2)])
        .unwrap();
    assert!(module.class("geometry.Point").unwrap().is_instance(&point));
    assert!(module.get("geometry").is_some());
    assert!(module.get("geometry__Point").is_none());
}
