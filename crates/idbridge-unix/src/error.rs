//! Account store error types

use idbridge_crypt::EncodingError;
use idbridge_flatfile::TableError;
use thiserror::Error;

/// Account store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("principal not found: {0}")]
    NotFound(String),

    #[error("principal already exists: {0}")]
    AlreadyExists(String),

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("malformed table data: {0}")]
    Format(String),

    #[error("encoding failure: {0}")]
    Encoding(#[from] EncodingError),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Create a not found error
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<TableError> for StoreError {
    fn from(err: TableError) -> Self {
        match err {
            TableError::Missing(path) => Self::Unavailable(format!("{} does not exist", path.display())),
            TableError::Io { .. } => Self::Io(err.to_string()),
            TableError::MissingColumns { .. } | TableError::Format(_) | TableError::Charset(_) => {
                Self::Format(err.to_string())
            }
        }
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
