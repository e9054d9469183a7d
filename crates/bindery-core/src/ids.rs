//! Stable identifiers handed out during registration.
//!
//! Both ids are plain indices into append-only tables, so a value obtained
//! during registration stays valid for as long as the owning table lives.

use std::fmt;

/// Identifies one class binding.
///
/// Exactly one id exists per native type; it is assigned the first time the
/// type is declared or referenced as a superclass.
///
/// # Example
///
/// ```
/// use bindery_core::ClassId;
///
/// let id = ClassId::new(3);
/// assert_eq!(id.index(), 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    /// Create a class id from a table index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Position of the binding in its class table.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class_{}", self.0)
    }
}

impl From<u32> for ClassId {
    fn from(index: u32) -> Self {
        Self::new(index)
    }
}

/// Identifies one shared call shape in the signature table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignatureId(u32);

impl SignatureId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SignatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sig_{}", self.0)
    }
}

impl From<u32> for SignatureId {
    fn from(index: u32) -> Self {
        Self::new(index)
    }
}
