//! Ownership of native objects handed to the host: Owned, Shared, Borrowed.

use std::cell::{Cell, RefCell};
use std::ptr::NonNull;
use std::rc::Rc;

use bindery::{Borrowed, Dynamic, HostErrorKind, Module, NativeClass, Ownership, Registry};

// =============================================================================
// Fixtures
// =============================================================================

struct Tracked {
    value: i64,
    drops: Rc<Cell<usize>>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

impl NativeClass for Tracked {
    const NAME: &'static str = "Tracked";
}

struct Gauge {
    level: i64,
}

impl NativeClass for Gauge {
    const NAME: &'static str = "Gauge";
}

#[derive(Debug, Clone, PartialEq)]
struct Setting {
    level: i64,
}

impl NativeClass for Setting {
    const NAME: &'static str = "Setting";
}

type Keep = Rc<RefCell<Vec<Rc<RefCell<Tracked>>>>>;

fn tracked_module(drops: &Rc<Cell<usize>>, keep: &Keep) -> Module {
    let mut registry = Registry::new();
    let owned_drops = Rc::clone(drops);
    registry
        .class::<Tracked>()
        .constructor(move |value: i64| Tracked {
            value,
            drops: Rc::clone(&owned_drops),
        })
        .unwrap()
        .method("value", |t: &Tracked| t.value)
        .unwrap()
        .build()
        .unwrap();

    let shared_drops = Rc::clone(drops);
    let kept = Rc::clone(keep);
    registry
        .function("make_shared", move |value: i64| {
            let object = Rc::new(RefCell::new(Tracked {
                value,
                drops: Rc::clone(&shared_drops),
            }));
            kept.borrow_mut().push(Rc::clone(&object));
            object
        })
        .unwrap()
        .function("strong_count", |object: Rc<RefCell<Tracked>>| {
            Rc::strong_count(&object) as i64
        })
        .unwrap();
    registry.export("lifetimes").unwrap()
}

// =============================================================================
// Owned
// =============================================================================

#[test]
fn test_owned_object_dropped_with_last_proxy() {
    let drops = Rc::new(Cell::new(0));
    let module = tracked_module(&drops, &Keep::default());
    let object = module.construct("Tracked", &[Dynamic::Int(3)]).unwrap();
    let copy = object.clone();
    assert_eq!(object.as_object().unwrap().ownership(), Ownership::Owned);
    assert_eq!(object.as_object().unwrap().proxy_count(), 2);

    drop(object);
    assert_eq!(drops.get(), 0);
    assert_eq!(
        module.call_method(copy.as_object().unwrap(), "value", &[]).unwrap(),
        Dynamic::Int(3)
    );
    drop(copy);
    assert_eq!(drops.get(), 1);
}

// =============================================================================
// Shared
// =============================================================================

#[test]
fn test_shared_object_outlives_host_proxy() {
    let drops = Rc::new(Cell::new(0));
    let keep = Keep::default();
    let module = tracked_module(&drops, &keep);

    let object = module.call("make_shared", &[Dynamic::Int(9)]).unwrap();
    let proxy = object.as_object().unwrap();
    assert_eq!(proxy.ownership(), Ownership::Shared);
    assert_eq!(proxy.handle().shared_count(), Some(2));

    drop(object);
    assert_eq!(drops.get(), 0);
    assert_eq!(keep.borrow()[0].borrow().value, 9);

    keep.borrow_mut().clear();
    assert_eq!(drops.get(), 1);
}

#[test]
fn test_shared_object_outlives_native_reference() {
    let drops = Rc::new(Cell::new(0));
    let keep = Keep::default();
    let module = tracked_module(&drops, &keep);

    let object = module.call("make_shared", &[Dynamic::Int(4)]).unwrap();
    keep.borrow_mut().clear();
    assert_eq!(drops.get(), 0);
    assert_eq!(
        module.call_method(object.as_object().unwrap(), "value", &[]).unwrap(),
        Dynamic::Int(4)
    );

    drop(object);
    assert_eq!(drops.get(), 1);
    drop(module);
    assert_eq!(drops.get(), 1);
}

#[test]
fn test_shared_parameter_adds_reference() {
    let drops = Rc::new(Cell::new(0));
    let keep = Keep::default();
    let module = tracked_module(&drops, &keep);

    let object = module.call("make_shared", &[Dynamic::Int(1)]).unwrap();
    // proxy + keep + the parameter itself
    assert_eq!(
        module.call("strong_count", &[object.clone()]).unwrap(),
        Dynamic::Int(3)
    );
    assert_eq!(object.as_object().unwrap().handle().shared_count(), Some(2));

    let owned = module.construct("Tracked", &[Dynamic::Int(2)]).unwrap();
    let err = module.call("strong_count", &[owned]).unwrap_err();
    assert_eq!(err.kind(), HostErrorKind::ArgumentTypeMismatch);
}

// =============================================================================
// Borrowed
// =============================================================================

#[test]
fn test_borrowed_object_is_never_dropped() {
    let drops = Rc::new(Cell::new(0));
    let mut registry = Registry::new();
    registry
        .class::<Tracked>()
        .method("value", |t: &Tracked| t.value)
        .unwrap()
        .build()
        .unwrap();
    let target: &'static Tracked = Box::leak(Box::new(Tracked {
        value: 11,
        drops: Rc::clone(&drops),
    }));
    registry
        .function("global", move || Borrowed::new(target))
        .unwrap();
    let module = registry.export("borrowed").unwrap();

    let object = module.call("global", &[]).unwrap();
    assert_eq!(object.as_object().unwrap().ownership(), Ownership::Borrowed);
    assert_eq!(
        module.call_method(object.as_object().unwrap(), "value", &[]).unwrap(),
        Dynamic::Int(11)
    );
    drop(object);
    drop(module);
    assert_eq!(drops.get(), 0);
    assert_eq!(target.value, 11);
}

#[test]
fn test_writable_borrow_mutates_native_value() {
    let mut gauge = Gauge { level: 1 };
    let address = NonNull::from(&mut gauge);
    let mut registry = Registry::new();
    registry
        .class::<Gauge>()
        .method_mut("raise", |g: &mut Gauge, by: i64| g.level += by)
        .unwrap()
        .build()
        .unwrap();
    registry
        .function("gauge", move || {
            // SAFETY: `gauge` outlives the module and every proxy below.
            unsafe { Borrowed::from_raw(address, true) }
        })
        .unwrap();
    let module = registry.export("gauges").unwrap();

    let object = module.call("gauge", &[]).unwrap();
    module
        .call_method(object.as_object().unwrap(), "raise", &[Dynamic::Int(5)])
        .unwrap();
    drop(object);
    drop(module);
    assert_eq!(gauge.level, 6);
}

#[test]
fn test_read_only_borrow_rejects_mutation() {
    let mut registry = Registry::new();
    registry
        .class::<Gauge>()
        .method_mut("raise", |g: &mut Gauge, by: i64| g.level += by)
        .unwrap()
        .build()
        .unwrap();
    let target: &'static Gauge = Box::leak(Box::new(Gauge { level: 0 }));
    registry
        .function("gauge", move || Borrowed::new(target))
        .unwrap();
    let module = registry.export("gauges").unwrap();

    let object = module.call("gauge", &[]).unwrap();
    let err = module
        .call_method(object.as_object().unwrap(), "raise", &[Dynamic::Int(1)])
        .unwrap_err();
    assert_eq!(err.kind(), HostErrorKind::NativeFailure);
    assert!(err.message().contains("read-only"), "{err}");
    assert_eq!(target.level, 0);
}

#[test]
fn test_copyable_class_returns_copy() {
    let mut registry = Registry::new();
    registry
        .class::<Setting>()
        .method_mut("set", |s: &mut Setting, level: i64| s.level = level)
        .unwrap()
        .method("level", |s: &Setting| s.level)
        .unwrap()
        .copyable()
        .build()
        .unwrap();
    let original: &'static Setting = Box::leak(Box::new(Setting { level: 2 }));
    registry
        .function("default_setting", move || Borrowed::new(original))
        .unwrap();
    let module = registry.export("settings").unwrap();

    let copy = module.call("default_setting", &[]).unwrap();
    let copy = copy.as_object().unwrap();
    assert_eq!(copy.ownership(), Ownership::Owned);
    module.call_method(copy, "set", &[Dynamic::Int(8)]).unwrap();
    assert_eq!(module.call_method(copy, "level", &[]).unwrap(), Dynamic::Int(8));
    assert_eq!(original.level, 2);
}
