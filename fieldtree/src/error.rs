//! Error types for field-tree normalization

use std::path::PathBuf;
use thiserror::Error;

/// Result type for field-tree operations
pub type Result<T> = std::result::Result<T, FieldTreeError>;

/// How badly an error affects the population run.
///
/// - **Error**: the operation failed; the host may fix its input and rebuild.
/// - **Critical**: an external collaborator broke its contract; tree
///   construction must not proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Error,
    Critical,
}

/// Errors that can occur while populating a field tree
#[derive(Debug, Error)]
pub enum FieldTreeError {
    /// A field transform returned no field group
    #[error("fieldTransform #{position} must return an array of fields")]
    FieldTransformReturnedNothing { position: usize },

    /// The registry has no definition for a field type
    #[error("there is no type by the name of \"{name}\"")]
    UnknownType { name: String },

    /// A type's `extends` chain loops back on itself
    #[error("type \"{name}\" has a cyclic extends chain: {chain}")]
    CyclicExtends { name: String, chain: String },

    /// No node exists at the requested tree position
    #[error("no field node at path {path}")]
    NodeNotFound { path: String },

    /// A key path writes so far past the end of an array that padding it
    /// would be unreasonable
    #[error("array index {index} is too far past the end of an array of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Definitions file has an extension we cannot parse
    #[error("unsupported definitions format: {}", .path.display())]
    UnsupportedFormat { path: PathBuf },

    /// Loading or extracting registry definitions failed
    #[error("failed to load registry definitions: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl From<figment::Error> for FieldTreeError {
    fn from(error: figment::Error) -> Self {
        FieldTreeError::Config(Box::new(error))
    }
}

impl FieldTreeError {
    /// Classify this error for the host.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            FieldTreeError::FieldTransformReturnedNothing { .. } => ErrorSeverity::Critical,
            FieldTreeError::CyclicExtends { .. } => ErrorSeverity::Critical,
            FieldTreeError::UnknownType { .. }
            | FieldTreeError::NodeNotFound { .. }
            | FieldTreeError::IndexOutOfRange { .. }
            | FieldTreeError::UnsupportedFormat { .. }
            | FieldTreeError::Config(_) => ErrorSeverity::Error,
        }
    }
}
