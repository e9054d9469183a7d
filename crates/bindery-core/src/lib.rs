//! Core value and ownership types shared by the bindery crates.
//!
//! This crate knows nothing about registration or dispatch. It defines the
//! boundary value ([`Dynamic`]), the host-side object proxy ([`HostObject`])
//! with its ownership wrapper ([`ObjectHandle`]), the stable ids used by the
//! registry, and the error types raised while converting values or running
//! native code.

pub mod dynamic;
pub mod error;
pub mod handle;
pub mod ids;

pub use dynamic::Dynamic;
pub use error::{ConversionError, NativeError};
pub use handle::{
    BorrowFailure, Borrowed, ClassMut, ClassRef, HostObject, NativeAny, ObjectHandle, Ownership,
    SharedCell,
};
pub use ids::{ClassId, SignatureId};
