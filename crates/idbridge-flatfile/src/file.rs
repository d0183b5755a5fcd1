//! File-backed flat table
//!
//! A [`FileTable`] owns a [`FlatTable`] loaded from a file and remembers the
//! file's modification time and length at the last load or write. The table
//! is refreshed from disk only through [`FileTable::reload_if_stale`].
//!
//! Mutations are written through synchronously. Adding a row appends one
//! line; removing or replacing rewrites the file via a temporary file and a
//! rename. When the write fails the in-memory change is undone.

use crate::error::{Result, TableError};
use crate::table::{FlatTable, Row, RowId};
use idbridge_common::Charset;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Modification time and length observed at the last load or write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    modified: SystemTime,
    len: u64,
}

impl Stamp {
    fn read(path: &Path) -> Result<Self> {
        let meta = fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TableError::Missing(path.to_path_buf())
            } else {
                TableError::io(path, e)
            }
        })?;
        let modified = meta.modified().map_err(|e| TableError::io(path, e))?;
        Ok(Self {
            modified,
            len: meta.len(),
        })
    }
}

/// Write `data` to `temp_path` and rename it over `path`, keeping permissions
fn write_replacing(path: &Path, temp_path: &Path, data: &[u8]) -> std::io::Result<()> {
    let permissions = fs::metadata(path)?.permissions();
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(temp_path)?;
    file.set_permissions(permissions)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(data)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    fs::rename(temp_path, path)
}

/// Flat table bound to a file
#[derive(Debug)]
pub struct FileTable {
    path: PathBuf,
    charset: Charset,
    table: FlatTable,
    stamp: Option<Stamp>,
}

impl FileTable {
    /// Open and load a table file
    ///
    /// Fails with [`TableError::Missing`] if the file does not exist.
    pub fn open(path: impl AsRef<Path>, table: FlatTable, charset: Charset) -> Result<Self> {
        let mut file_table = Self {
            path: path.as_ref().to_path_buf(),
            charset,
            table,
            stamp: None,
        };
        file_table.load()?;
        Ok(file_table)
    }

    /// Backing file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Charset of the backing file
    #[must_use]
    pub const fn charset(&self) -> Charset {
        self.charset
    }

    /// The in-memory table
    #[must_use]
    pub const fn table(&self) -> &FlatTable {
        &self.table
    }

    /// Reload unconditionally from disk
    pub fn load(&mut self) -> Result<()> {
        let stamp = Stamp::read(&self.path)?;
        let data = fs::read(&self.path).map_err(|e| TableError::io(&self.path, e))?;
        self.table.load_bytes(&data, self.charset)?;
        self.stamp = Some(stamp);
        tracing::debug!("Loaded {} rows from {}", self.table.len(), self.path.display());
        Ok(())
    }

    /// Whether the file changed since the last load or write
    pub fn is_stale(&self) -> Result<bool> {
        let current = Stamp::read(&self.path)?;
        Ok(self.stamp != Some(current))
    }

    /// Reload if the file changed; returns whether a reload happened
    pub fn reload_if_stale(&mut self) -> Result<bool> {
        if !self.is_stale()? {
            return Ok(false);
        }
        tracing::info!("{} changed on disk, reloading", self.path.display());
        self.load()?;
        Ok(true)
    }

    /// Add a row and append it to the file
    ///
    /// Returns `Ok(None)` if the table filter rejects the row.
    pub fn add(&mut self, row: Row) -> Result<Option<RowId>> {
        let Some(id) = self.table.add(row) else {
            return Ok(None);
        };
        if let Err(e) = self.append(id) {
            tracing::warn!("Append to {} failed, rolling back: {}", self.path.display(), e);
            self.table.remove(id);
            return Err(e);
        }
        Ok(Some(id))
    }

    /// Remove a row by id and rewrite the file
    pub fn remove(&mut self, id: RowId) -> Result<Option<Row>> {
        let Some(row) = self.table.remove(id) else {
            return Ok(None);
        };
        if let Err(e) = self.rewrite() {
            tracing::warn!("Rewrite of {} failed, rolling back: {}", self.path.display(), e);
            self.table.insert_with_id(id, row);
            return Err(e);
        }
        Ok(Some(row))
    }

    /// Remove the row found by `key` in the index on `column`
    pub fn remove_by_key(&mut self, column: usize, key: &str) -> Result<Option<Row>> {
        match self.table.id_of(column, key) {
            Some(id) => self.remove(id),
            None => Ok(None),
        }
    }

    /// Replace the row found by `key` and rewrite the file
    ///
    /// Returns the previous row, or `None` when no row holds the key.
    pub fn replace(&mut self, column: usize, key: &str, row: Row) -> Result<Option<Row>> {
        let Some((id, old)) = self.table.replace(column, key, row) else {
            return Ok(None);
        };
        if let Err(e) = self.rewrite() {
            tracing::warn!("Rewrite of {} failed, rolling back: {}", self.path.display(), e);
            self.table.replace_row(id, old);
            return Err(e);
        }
        Ok(Some(old))
    }

    /// Write the whole table back to the file
    pub fn rewrite(&mut self) -> Result<()> {
        let data = self.table.to_bytes(self.charset)?;
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = self.path.with_file_name(format!(".{file_name}.tmp"));

        if let Err(e) = write_replacing(&self.path, &temp_path, &data) {
            let _ = fs::remove_file(&temp_path);
            return Err(TableError::io(&self.path, e));
        }
        self.stamp = Some(Stamp::read(&self.path)?);
        Ok(())
    }

    fn append(&mut self, id: RowId) -> Result<()> {
        let Some(row) = self.table.row(id) else {
            return Ok(());
        };
        let line = self.table.encode_row(row, self.charset)?;

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| TableError::io(&self.path, e))?;
        let len = file.metadata().map_err(|e| TableError::io(&self.path, e))?.len();
        if len == 0 && self.table.format().header_line().is_some() {
            drop(file);
            return self.rewrite();
        }

        let mut data = Vec::with_capacity(line.len() + 1);
        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))
                .and_then(|_| file.read_exact(&mut last))
                .map_err(|e| TableError::io(&self.path, e))?;
            if last[0] != b'\n' {
                data.push(b'\n');
            }
        }
        data.extend_from_slice(&line);
        file.write_all(&data)
            .and_then(|()| file.sync_all())
            .map_err(|e| TableError::io(&self.path, e))?;
        drop(file);

        self.stamp = Some(Stamp::read(&self.path)?);
        Ok(())
    }
}
