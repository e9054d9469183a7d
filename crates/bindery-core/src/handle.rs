//! Ownership wrappers bridging host-side proxies to native instances.
//!
//! An [`ObjectHandle`] records how the native value behind a proxy is owned:
//!
//! - **Owned**: allocated by a constructor call or a by-value return. The
//!   value is dropped together with the last proxy.
//! - **Shared**: an `Rc<RefCell<T>>` also held by native code. Dropping the
//!   proxy releases one strong count.
//! - **Borrowed**: an address owned elsewhere. Nothing is dropped through
//!   this handle; the producer of the [`Borrowed`] value guarantees the
//!   address outlives every host-side use.
//!
//! The ownership tag is fixed at construction.

use std::any::{Any, TypeId};
use std::cell::{BorrowError, BorrowMutError, Ref, RefCell, RefMut};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::rc::Rc;

use crate::ids::ClassId;

/// A type-erased native value.
pub type NativeAny = dyn Any + 'static;

/// How the value behind a handle is owned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    Owned,
    Shared,
    Borrowed,
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ownership::Owned => write!(f, "owned"),
            Ownership::Shared => write!(f, "shared"),
            Ownership::Borrowed => write!(f, "borrowed"),
        }
    }
}

/// Why a handle could not be borrowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowFailure {
    /// An outer call already holds a conflicting borrow.
    InUse,
    /// Mutable access requested through a read-only borrowed address.
    ReadOnly,
}

// =============================================================================
// Shared cells
// =============================================================================

/// Object-safe view of an `Rc<RefCell<T>>`.
pub trait SharedCell {
    fn try_borrow_any(&self) -> Result<Ref<'_, NativeAny>, BorrowError>;

    fn try_borrow_any_mut(&self) -> Result<RefMut<'_, NativeAny>, BorrowMutError>;

    /// Recover the concrete `Rc` by way of `Rc<dyn Any>`.
    fn into_any(self: Rc<Self>) -> Rc<NativeAny>;

    /// `TypeId` of the value inside the cell.
    fn value_type_id(&self) -> TypeId;
}

fn erase<T: Any>(value: &T) -> &NativeAny {
    value
}

fn erase_mut<T: Any>(value: &mut T) -> &mut NativeAny {
    value
}

impl<T: Any> SharedCell for RefCell<T> {
    fn try_borrow_any(&self) -> Result<Ref<'_, NativeAny>, BorrowError> {
        self.try_borrow().map(|value| Ref::map(value, erase::<T>))
    }

    fn try_borrow_any_mut(&self) -> Result<RefMut<'_, NativeAny>, BorrowMutError> {
        self.try_borrow_mut()
            .map(|value| RefMut::map(value, erase_mut::<T>))
    }

    fn into_any(self: Rc<Self>) -> Rc<NativeAny> {
        self
    }

    fn value_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }
}

// =============================================================================
// Borrow guards
// =============================================================================

enum RefInner<'a, T: ?Sized + 'a> {
    Cell(Ref<'a, T>),
    Raw(Ref<'a, ()>, &'a T),
}

/// Shared access to the value behind a handle.
///
/// Holds the handle's borrow flag for as long as it lives.
pub struct ClassRef<'a, T: ?Sized + 'a> {
    inner: RefInner<'a, T>,
}

impl<'a, T: ?Sized + 'a> ClassRef<'a, T> {
    /// Narrow the guard to a component of the borrowed value.
    ///
    /// Returns `None` and releases the borrow when `f` does.
    pub fn try_map<U: ?Sized + 'a, F>(orig: Self, f: F) -> Option<ClassRef<'a, U>>
    where
        F: FnOnce(&T) -> Option<&U>,
    {
        let inner = match orig.inner {
            RefInner::Cell(cell) => RefInner::Cell(Ref::filter_map(cell, f).ok()?),
            RefInner::Raw(flag, value) => RefInner::Raw(flag, f(value)?),
        };
        Some(ClassRef { inner })
    }
}

impl<T: ?Sized> Deref for ClassRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.inner {
            RefInner::Cell(cell) => cell,
            RefInner::Raw(_, value) => value,
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for ClassRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

enum MutInner<'a, T: ?Sized + 'a> {
    Cell(RefMut<'a, T>),
    Raw(RefMut<'a, ()>, &'a mut T),
}

/// Exclusive access to the value behind a handle.
pub struct ClassMut<'a, T: ?Sized + 'a> {
    inner: MutInner<'a, T>,
}

impl<'a, T: ?Sized + 'a> ClassMut<'a, T> {
    /// Narrow the guard to a component of the borrowed value.
    pub fn try_map<U: ?Sized + 'a, F>(orig: Self, f: F) -> Option<ClassMut<'a, U>>
    where
        F: FnOnce(&mut T) -> Option<&mut U>,
    {
        let inner = match orig.inner {
            MutInner::Cell(cell) => MutInner::Cell(RefMut::filter_map(cell, f).ok()?),
            MutInner::Raw(flag, value) => MutInner::Raw(flag, f(value)?),
        };
        Some(ClassMut { inner })
    }
}

impl<T: ?Sized> Deref for ClassMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.inner {
            MutInner::Cell(cell) => cell,
            MutInner::Raw(_, value) => value,
        }
    }
}

impl<T: ?Sized> DerefMut for ClassMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.inner {
            MutInner::Cell(cell) => cell,
            MutInner::Raw(_, value) => value,
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for ClassMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

// =============================================================================
// ObjectHandle
// =============================================================================

struct BorrowedSlot {
    ptr: NonNull<NativeAny>,
    writable: bool,
    flag: RefCell<()>,
}

enum Repr {
    Owned(RefCell<Box<NativeAny>>),
    Shared(Rc<dyn SharedCell>),
    Borrowed(BorrowedSlot),
}

/// Ownership tag plus the native value it governs.
pub struct ObjectHandle {
    repr: Repr,
    type_id: TypeId,
}

#[allow(clippy::borrowed_box)]
fn unbox(value: &Box<NativeAny>) -> &NativeAny {
    value.as_ref()
}

#[allow(clippy::borrowed_box)]
fn unbox_mut(value: &mut Box<NativeAny>) -> &mut NativeAny {
    value.as_mut()
}

impl ObjectHandle {
    /// Take exclusive ownership of a value.
    pub fn owned<T: Any>(value: T) -> Self {
        Self::from_box(Box::new(value))
    }

    /// Take exclusive ownership of an already boxed value.
    pub fn from_box(value: Box<NativeAny>) -> Self {
        let type_id = (*value).type_id();
        Self {
            repr: Repr::Owned(RefCell::new(value)),
            type_id,
        }
    }

    /// Share ownership with native code, adding one strong count.
    pub fn shared<T: Any>(value: Rc<RefCell<T>>) -> Self {
        Self {
            repr: Repr::Shared(value),
            type_id: TypeId::of::<T>(),
        }
    }

    pub fn ownership(&self) -> Ownership {
        match self.repr {
            Repr::Owned(_) => Ownership::Owned,
            Repr::Shared(_) => Ownership::Shared,
            Repr::Borrowed(_) => Ownership::Borrowed,
        }
    }

    /// `TypeId` of the concrete native value.
    pub fn value_type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn try_borrow(&self) -> Result<ClassRef<'_, NativeAny>, BorrowFailure> {
        let inner = match &self.repr {
            Repr::Owned(cell) => RefInner::Cell(Ref::map(
                cell.try_borrow().map_err(|_| BorrowFailure::InUse)?,
                unbox,
            )),
            Repr::Shared(cell) => {
                RefInner::Cell(cell.try_borrow_any().map_err(|_| BorrowFailure::InUse)?)
            }
            Repr::Borrowed(slot) => {
                let flag = slot.flag.try_borrow().map_err(|_| BorrowFailure::InUse)?;
                // SAFETY: the producer of the address promised it outlives
                // every host-side use (see `Borrowed::from_raw`).
                let value = unsafe { slot.ptr.as_ref() };
                RefInner::Raw(flag, value)
            }
        };
        Ok(ClassRef { inner })
    }

    pub fn try_borrow_mut(&self) -> Result<ClassMut<'_, NativeAny>, BorrowFailure> {
        let inner = match &self.repr {
            Repr::Owned(cell) => MutInner::Cell(RefMut::map(
                cell.try_borrow_mut().map_err(|_| BorrowFailure::InUse)?,
                unbox_mut,
            )),
            Repr::Shared(cell) => MutInner::Cell(
                cell.try_borrow_any_mut()
                    .map_err(|_| BorrowFailure::InUse)?,
            ),
            Repr::Borrowed(slot) => {
                if !slot.writable {
                    return Err(BorrowFailure::ReadOnly);
                }
                let flag = slot
                    .flag
                    .try_borrow_mut()
                    .map_err(|_| BorrowFailure::InUse)?;
                let mut ptr = slot.ptr;
                // SAFETY: writable slots only come from `&mut` sources, and
                // the flag above serializes access through this handle.
                let value = unsafe { ptr.as_mut() };
                MutInner::Raw(flag, value)
            }
        };
        Ok(ClassMut { inner })
    }

    /// Clone out the shared cell if this handle shares a `RefCell<T>`.
    pub fn shared_cell<T: Any>(&self) -> Option<Rc<RefCell<T>>> {
        match &self.repr {
            Repr::Shared(cell) => Rc::clone(cell).into_any().downcast::<RefCell<T>>().ok(),
            _ => None,
        }
    }

    /// Strong count of a shared handle, `None` for other ownership kinds.
    pub fn shared_count(&self) -> Option<usize> {
        match &self.repr {
            Repr::Shared(cell) => Some(Rc::strong_count(cell)),
            _ => None,
        }
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHandle({})", self.ownership())
    }
}

// =============================================================================
// Borrowed return values
// =============================================================================

/// A native address handed to the host without transferring ownership.
///
/// Returned from native functions to expose an object that lives elsewhere.
/// When the target class is copyable the value is copied into an owned
/// handle instead.
pub struct Borrowed<T: Any> {
    ptr: NonNull<T>,
    writable: bool,
}

impl<T: Any> Borrowed<T> {
    /// Lend a value that lives for the rest of the process.
    pub fn new(value: &'static T) -> Self {
        Self {
            ptr: NonNull::from(value),
            writable: false,
        }
    }

    /// Lend a value that lives for the rest of the process, allowing
    /// mutating methods through the handle.
    pub fn new_mut(value: &'static mut T) -> Self {
        Self {
            ptr: NonNull::from(value),
            writable: true,
        }
    }

    /// Lend an arbitrary address.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live `T` for as long as any host proxy created
    /// from this value exists. If `writable` is true, no other reference to
    /// the value may be used while a host call mutates it.
    pub unsafe fn from_raw(ptr: NonNull<T>, writable: bool) -> Self {
        Self { ptr, writable }
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn get(&self) -> &T {
        // SAFETY: every constructor guarantees the address is live.
        unsafe { self.ptr.as_ref() }
    }

    /// Wrap the address in a borrowed handle.
    pub fn into_handle(self) -> ObjectHandle {
        let ptr: NonNull<NativeAny> = self.ptr;
        ObjectHandle {
            repr: Repr::Borrowed(BorrowedSlot {
                ptr,
                writable: self.writable,
                flag: RefCell::new(()),
            }),
            type_id: TypeId::of::<T>(),
        }
    }
}

// =============================================================================
// HostObject
// =============================================================================

struct Proxy {
    class: ClassId,
    handle: ObjectHandle,
}

/// The host-side proxy for a native object.
///
/// Cloning a `HostObject` clones the proxy reference, not the native value.
/// The handle is finalized when the last clone is dropped.
#[derive(Clone)]
pub struct HostObject {
    proxy: Rc<Proxy>,
}

impl HostObject {
    /// Bind a handle to the class it was created as.
    pub fn new(class: ClassId, handle: ObjectHandle) -> Self {
        Self {
            proxy: Rc::new(Proxy { class, handle }),
        }
    }

    /// Class recorded when the proxy was created.
    pub fn class(&self) -> ClassId {
        self.proxy.class
    }

    pub fn handle(&self) -> &ObjectHandle {
        &self.proxy.handle
    }

    pub fn ownership(&self) -> Ownership {
        self.proxy.handle.ownership()
    }

    /// Number of live clones of this proxy.
    pub fn proxy_count(&self) -> usize {
        Rc::strong_count(&self.proxy)
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.proxy, &b.proxy)
    }
}

impl PartialEq for HostObject {
    fn eq(&self, other: &Self) -> bool {
        HostObject::ptr_eq(self, other)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostObject")
            .field("class", &self.proxy.class)
            .field("ownership", &self.ownership())
            .finish()
    }
}
