//! Error types for the acqdata library.

use std::path::PathBuf;
use thiserror::Error;

use super::Shape;

/// Main error type for acqdata operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Units ===
    /// Unit string does not resolve through the registry
    #[error("Unknown unit: '{0}'")]
    UnknownUnit(String),

    /// Units belong to different physical dimensions
    #[error("Incompatible units: cannot convert '{from}' to '{to}'")]
    IncompatibleUnit { from: String, to: String },

    /// A unit exponent left the representable range
    #[error("Unit exponent out of range in '{0}'")]
    UnitExponent(String),

    // === Shapes and axes ===
    /// Axis size does not match the data supplied for it
    #[error("Axis '{label}' size mismatch: declared {expected}, got {actual} values")]
    AxisSize { label: String, expected: usize, actual: usize },

    /// Axis size does not match the array extent it is bound to
    #[error("Axis bound to dimension {index} has size {axis_size}, but the array has {dim_size} samples along it")]
    DimensionMismatch { index: usize, axis_size: usize, dim_size: usize },

    /// Axis index beyond the array rank
    #[error("Axis index {index} out of range for rank {rank}")]
    AxisIndex { index: usize, rank: usize },

    /// Two arrays or containers have different shapes
    #[error("Shape mismatch: {left} vs {right}")]
    ShapeMismatch { left: Shape, right: Shape },

    /// Axes of two containers disagree
    #[error("Axis mismatch on dimension {index}: {reason}")]
    AxisMismatch { index: usize, reason: String },

    /// Requested dimensionality does not match the array rank
    #[error("Dimensionality {dimensionality} requires a different rank than {rank}")]
    RankMismatch { dimensionality: String, rank: usize },

    /// Explicit axis data is not monotonic
    #[error("Axis '{0}' is not monotonic (flag it irregular to allow this)")]
    NonMonotonicAxis(String),

    /// Two sequences that must line up have different lengths
    #[error("Length mismatch for {what}: expected {expected}, got {actual}")]
    LengthMismatch { what: String, expected: usize, actual: usize },

    /// Index out of bounds
    #[error("Index {index} out of bounds (len: {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Container built without any array
    #[error("Container '{0}' has no arrays")]
    EmptyContainer(String),

    // === Collections ===
    /// An entity of this name already exists
    #[error("Duplicate name: '{0}'")]
    DuplicateName(String),

    /// No entity of this name
    #[error("Not found: '{0}'")]
    NotFound(String),

    /// Name cannot be used as a node key
    #[error("Invalid name: '{0}'")]
    InvalidName(String),

    // === Store structure ===
    /// Stored schema is newer than this build understands
    #[error("Node '{path}' uses schema version {version}, newest supported is {supported}")]
    UnsupportedSchema { path: String, version: u32, supported: u32 },

    /// Required attribute absent from a node
    #[error("Node '{path}' is missing required attribute '{key}'")]
    MissingAttribute { path: String, key: String },

    /// Malformed node structure, attribute or payload
    #[error("Corrupt store node '{path}' (schema v{version}): {reason}")]
    CorruptStore { path: String, version: u32, reason: String },

    /// Invalid magic bytes at start of file
    #[error("Invalid store file: expected node-store magic bytes")]
    InvalidMagic,

    /// File is truncated or corrupted
    #[error("Unexpected end of file at position {0}")]
    UnexpectedEof(u64),

    // === Environment ===
    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Store was opened read-only
    #[error("Store is read-only")]
    ReadOnly,

    /// Configuration could not be read or written
    #[error("Configuration error: {0}")]
    Config(String),

    /// Memory mapping failed
    #[error("Memory mapping failed: {0}")]
    MmapFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 conversion error
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

/// Coarse error families, used by callers that only care about the category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Incompatible or unknown units
    Unit,
    /// Dimension, axis and shape mismatches
    Shape,
    /// Name lookups and uniqueness in bundles and stores
    Collection,
    /// Missing/extra nodes or schema version mismatch
    StoreStructure,
    /// Malformed payload or node encoding
    CorruptStore,
    /// File system and environment
    Io,
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create a corrupt-store error for the node at `path`.
    pub fn corrupt(path: impl Into<String>, version: u32, reason: impl Into<String>) -> Self {
        Self::CorruptStore {
            path: path.into(),
            version,
            reason: reason.into(),
        }
    }

    /// Create a length mismatch error.
    pub fn length(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::LengthMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownUnit(_) | Self::IncompatibleUnit { .. } | Self::UnitExponent(_) => {
                ErrorKind::Unit
            }
            Self::AxisSize { .. }
            | Self::DimensionMismatch { .. }
            | Self::AxisIndex { .. }
            | Self::ShapeMismatch { .. }
            | Self::AxisMismatch { .. }
            | Self::RankMismatch { .. }
            | Self::NonMonotonicAxis(_)
            | Self::LengthMismatch { .. }
            | Self::IndexOutOfBounds { .. }
            | Self::EmptyContainer(_) => ErrorKind::Shape,
            Self::DuplicateName(_) | Self::NotFound(_) | Self::InvalidName(_) => {
                ErrorKind::Collection
            }
            Self::UnsupportedSchema { .. } => ErrorKind::StoreStructure,
            Self::CorruptStore { .. }
            | Self::MissingAttribute { .. }
            | Self::InvalidMagic
            | Self::UnexpectedEof(_) => ErrorKind::CorruptStore,
            Self::FileNotFound(_)
            | Self::ReadOnly
            | Self::Config(_)
            | Self::MmapFailed(_)
            | Self::Io(_)
            | Self::Utf8(_)
            | Self::Other(_) => ErrorKind::Io,
        }
    }
}

/// Result type alias for acqdata operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::IncompatibleUnit { from: "m".into(), to: "s".into() };
        let msg = e.to_string();
        assert!(msg.contains("'m'"));
        assert!(msg.contains("'s'"));

        let e = Error::ShapeMismatch { left: Shape::d1(4), right: Shape::d1(5) };
        assert!(e.to_string().contains("(4)"));
        assert!(e.to_string().contains("(5)"));

        let e = Error::corrupt("/run/det", 2, "truncated payload");
        assert!(e.to_string().contains("/run/det"));
        assert!(e.to_string().contains("v2"));
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::UnknownUnit("foo".into()).kind(), ErrorKind::Unit);
        assert_eq!(Error::NonMonotonicAxis("x".into()).kind(), ErrorKind::Shape);
        assert_eq!(Error::DuplicateName("a".into()).kind(), ErrorKind::Collection);
        assert_eq!(
            Error::UnsupportedSchema { path: "/".into(), version: 9, supported: 3 }.kind(),
            ErrorKind::StoreStructure
        );
        assert_eq!(Error::InvalidMagic.kind(), ErrorKind::CorruptStore);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
