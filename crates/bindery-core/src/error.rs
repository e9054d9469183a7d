//! Error types for value conversion and native execution.

use thiserror::Error;

/// Errors that can occur when decoding a host value into a native value.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The host value has the wrong kind for the declared parameter.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: String,
        actual: &'static str,
    },

    /// Null or undefined passed where an object is required.
    #[error("null value cannot be converted to {target_type}")]
    NullHandle { target_type: String },

    /// Integer outside the range of the declared native width.
    #[error("integer overflow: value {value} does not fit in {target_type}")]
    IntegerOverflow { value: i64, target_type: &'static str },

    /// Float outside the range of the declared native width.
    #[error("float conversion error: value {value} cannot be represented as {target_type}")]
    FloatConversion {
        value: f64,
        target_type: &'static str,
    },

    /// String contains a NUL byte and cannot become a C string.
    #[error("string contains an interior NUL byte at offset {position}")]
    InteriorNul { position: usize },

    /// Native string data is not valid UTF-8.
    #[error("invalid UTF-8 string data")]
    InvalidUtf8,

    /// A sparse host array has a hole where an element is required.
    #[error("error converting array element {index}: array has a hole")]
    SparseArray { index: usize },

    /// One element of a host array failed to convert.
    #[error("error converting array element {index}: {source}")]
    Element {
        index: usize,
        #[source]
        source: Box<ConversionError>,
    },

    /// Host array shorter than a fixed-size parameter.
    #[error("array too short: expected at least {expected} elements, got {actual}")]
    ArrayLength { expected: usize, actual: usize },

    /// One positional argument failed to convert.
    #[error("argument {index}: {source}")]
    Argument {
        index: usize,
        #[source]
        source: Box<ConversionError>,
    },

    /// Native type was never declared to the registry.
    #[error("class {type_name} is not registered")]
    UnregisteredClass { type_name: &'static str },

    /// Object is not of, or derived from, the requested class.
    #[error("cannot upcast {from} to {to}: not reachable through the inheritance graph")]
    UpcastUnreachable { from: String, to: String },

    /// Object is already mutably borrowed by an outer call.
    #[error("object of class {type_name} is already borrowed")]
    AlreadyBorrowed { type_name: String },

    /// Parameter requires shared ownership but the object is not shared.
    #[error("object of class {type_name} is not held by shared ownership")]
    NotShared { type_name: String },

    /// Generic conversion failure.
    #[error("conversion failed: {message}")]
    Failed { message: String },
}

impl ConversionError {
    /// Create a type mismatch error.
    pub fn mismatch(expected: impl Into<String>, actual: &'static str) -> Self {
        ConversionError::TypeMismatch {
            expected: expected.into(),
            actual,
        }
    }

    /// Wrap an element failure with its position.
    pub fn element(index: usize, source: ConversionError) -> Self {
        ConversionError::Element {
            index,
            source: Box::new(source),
        }
    }

    /// Wrap an argument failure with its position.
    pub fn argument(index: usize, source: ConversionError) -> Self {
        ConversionError::Argument {
            index,
            source: Box::new(source),
        }
    }

    /// True when the root cause is an unreachable upcast.
    pub fn is_upcast_failure(&self) -> bool {
        match self {
            ConversionError::UpcastUnreachable { .. } => true,
            ConversionError::Element { source, .. } | ConversionError::Argument { source, .. } => {
                source.is_upcast_failure()
            }
            _ => false,
        }
    }
}

/// Errors that can occur during native function execution.
#[derive(Debug, Error)]
pub enum NativeError {
    /// Error converting arguments or return values
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// Receiver missing or of the wrong type
    #[error("invalid 'this' reference: {message}")]
    InvalidThis { message: String },

    /// Receiver is borrowed by an outer call on the same object
    #[error("object of class {type_name} is already borrowed")]
    AlreadyBorrowed { type_name: String },

    /// Mutating method called through a read-only borrowed handle
    #[error("object of class {type_name} is borrowed read-only")]
    ReadOnly { type_name: String },

    /// Native function panicked
    #[error("native function panicked: {message}")]
    Panic { message: String },

    /// Native code reported a failure
    #[error("native error: {message}")]
    Other { message: String },
}

impl NativeError {
    /// Create an "invalid this" error with a message.
    pub fn invalid_this(message: impl Into<String>) -> Self {
        NativeError::InvalidThis {
            message: message.into(),
        }
    }

    /// Create a generic native error.
    pub fn other(message: impl Into<String>) -> Self {
        NativeError::Other {
            message: message.into(),
        }
    }

    /// True when the root cause is an unreachable upcast.
    pub fn is_upcast_failure(&self) -> bool {
        matches!(self, NativeError::Conversion(err) if err.is_upcast_failure())
    }
}
