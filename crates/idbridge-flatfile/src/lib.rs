//! idbridge Flatfile - Indexed line-oriented tables
//!
//! This crate provides:
//! - [`LineFormat`] with delimited and fixed-width implementations
//! - [`FlatTable`], an in-memory table of rows with per-column indexes
//! - [`FileTable`], a flat table bound to a file with staleness detection,
//!   append/rewrite write-back and rollback on failed writes

pub mod error;
pub mod file;
pub mod format;
pub mod table;

pub use error::{Result, TableError};
pub use file::FileTable;
pub use format::{Delimited, FixedWidth, LineFormat};
pub use table::{FlatTable, Row, RowFilter, RowId};
