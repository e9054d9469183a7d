//! Registration, export and call-boundary errors.

use thiserror::Error;

use crate::dispatch::DispatchError;

/// Errors raised while declaring classes and functions.
///
/// A failed declaration leaves the registry as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("invalid name '{name}' for {what}")]
    InvalidName { name: String, what: &'static str },

    #[error("class '{class}' cannot inherit '{base}': inheritance would form a cycle")]
    CyclicInheritance { class: String, base: String },

    #[error("duplicate overload {name}{params}: an overload with these parameter types is already registered")]
    DuplicateOverload { name: String, params: String },

    #[error("type already declared as '{existing}', cannot redeclare it as '{requested}'")]
    ConflictingName { existing: String, requested: String },
}

/// Errors raised while publishing the registry into a module namespace.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    #[error("invalid export path '{path}': {reason}")]
    InvalidExportPath { path: String, reason: String },
}

impl ExportError {
    pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        ExportError::InvalidExportPath {
            path: path.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Category of a host-visible error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostErrorKind {
    /// No overload accepts the supplied number of arguments.
    ArgumentCountMismatch,
    /// Overloads exist for the count, but none accepts the argument types.
    ArgumentTypeMismatch,
    /// An argument or result passed its type check but could not be converted.
    ConversionFailure,
    /// A nested export name collides with an existing value.
    InvalidExportPath,
    /// An object could not be viewed as the requested class.
    UpcastUnreachable,
    /// No member by that name.
    UnknownMember,
    /// The native body reported an error or panicked.
    NativeFailure,
}

/// The error value handed back to the host.
///
/// Every failure inside a call is converted to this type before it crosses
/// the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HostError {
    kind: HostErrorKind,
    message: String,
}

impl HostError {
    pub fn new(kind: HostErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> HostErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<DispatchError> for HostError {
    fn from(err: DispatchError) -> Self {
        let kind = match &err {
            DispatchError::ArgumentCountMismatch { .. } => HostErrorKind::ArgumentCountMismatch,
            DispatchError::NoMatchingOverload { .. } => HostErrorKind::ArgumentTypeMismatch,
            DispatchError::Conversion { source, .. } if source.is_upcast_failure() => {
                HostErrorKind::UpcastUnreachable
            }
            DispatchError::Conversion { .. } => HostErrorKind::ConversionFailure,
            DispatchError::Native { source, .. } if source.is_upcast_failure() => {
                HostErrorKind::UpcastUnreachable
            }
            DispatchError::Native {
                source: bindery_core::NativeError::Conversion(_),
                ..
            } => HostErrorKind::ConversionFailure,
            DispatchError::Native { .. } => HostErrorKind::NativeFailure,
            DispatchError::UnknownMember { .. } => HostErrorKind::UnknownMember,
        };
        HostError::new(kind, err.to_string())
    }
}

impl From<ExportError> for HostError {
    fn from(err: ExportError) -> Self {
        HostError::new(HostErrorKind::InvalidExportPath, err.to_string())
    }
}
