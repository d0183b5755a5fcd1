//! Flat table error types

use idbridge_common::CharsetError;
use std::path::PathBuf;
use thiserror::Error;

/// Flat table error
#[derive(Error, Debug)]
pub enum TableError {
    /// I/O failure on the backing file
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Backing file does not exist
    #[error("File not found: {}", .0.display())]
    Missing(PathBuf),

    /// A line has fewer columns than the fixed-width layout requires
    #[error("Line {line}: expected {expected} columns, found {found}")]
    MissingColumns {
        line: usize,
        expected: usize,
        found: usize,
    },

    /// A row cannot be represented in the line format
    #[error("Format error: {0}")]
    Format(String),

    /// Charset conversion failed
    #[error("Charset error: {0}")]
    Charset(#[from] CharsetError),
}

impl TableError {
    /// Create an I/O error for a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if this is a missing file error
    #[must_use]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing(_))
    }
}

/// Result type for flat table operations
pub type Result<T> = std::result::Result<T, TableError>;
