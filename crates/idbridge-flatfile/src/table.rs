//! In-memory indexed table
//!
//! Rows keep the order they were loaded or added in and are addressed by a
//! stable [`RowId`]. Each index maps the value of one column to the row
//! holding it. When several rows share a key the most recently added row
//! wins the lookup; removing it makes the previous holder visible again.

use crate::error::{Result, TableError};
use crate::format::LineFormat;
use idbridge_common::Charset;
use std::collections::{BTreeMap, HashMap};

/// A row of string fields
pub type Row = Vec<String>;

/// Predicate deciding whether a row is admitted to the table
pub type RowFilter = Box<dyn Fn(&[String]) -> bool + Send + Sync>;

/// Stable row handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId(u64);

/// Key index over one column
#[derive(Debug, Default, Clone)]
struct Index {
    /// Rows holding each key, ordered by id
    keys: HashMap<String, Vec<RowId>>,
}

impl Index {
    fn insert(&mut self, key: &str, id: RowId) {
        let ids = self.keys.entry(key.to_string()).or_default();
        let pos = ids.partition_point(|&i| i < id);
        if ids.get(pos) != Some(&id) {
            ids.insert(pos, id);
        }
    }

    fn remove(&mut self, key: &str, id: RowId) {
        if let Some(ids) = self.keys.get_mut(key) {
            ids.retain(|&i| i != id);
            if ids.is_empty() {
                self.keys.remove(key);
            }
        }
    }

    fn get(&self, key: &str) -> Option<RowId> {
        self.keys.get(key).and_then(|ids| ids.last().copied())
    }
}

/// Indexed table of rows with a pluggable line format
pub struct FlatTable {
    format: Box<dyn LineFormat>,
    rows: BTreeMap<RowId, Row>,
    next_id: u64,
    indexes: BTreeMap<usize, Index>,
    filter: Option<RowFilter>,
}

impl std::fmt::Debug for FlatTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatTable")
            .field("format", &self.format)
            .field("rows", &self.rows.len())
            .field("indexes", &self.indexes.keys().collect::<Vec<_>>())
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

impl FlatTable {
    /// Create an empty table
    #[must_use]
    pub fn new(format: impl LineFormat + 'static) -> Self {
        Self {
            format: Box::new(format),
            rows: BTreeMap::new(),
            next_id: 0,
            indexes: BTreeMap::new(),
            filter: None,
        }
    }

    /// Index a column
    #[must_use]
    pub fn with_index(mut self, column: usize) -> Self {
        self.add_index(column);
        self
    }

    /// Admit only rows accepted by `filter`
    #[must_use]
    pub fn with_filter(mut self, filter: impl Fn(&[String]) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Index a column, covering rows already present
    pub fn add_index(&mut self, column: usize) {
        let mut index = Index::default();
        for (&id, row) in &self.rows {
            if let Some(key) = row.get(column) {
                index.insert(key, id);
            }
        }
        self.indexes.insert(column, index);
    }

    /// Line format in use
    #[must_use]
    pub fn format(&self) -> &dyn LineFormat {
        self.format.as_ref()
    }

    /// Replace the contents with rows parsed from `text`
    ///
    /// Blank lines are skipped. On error the table is left unchanged.
    pub fn load_str(&mut self, text: &str) -> Result<()> {
        let mut format = self.format.fresh();
        let mut parsed = Vec::new();
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(row) = format.parse_line(line, i + 1)? {
                parsed.push(row);
            }
        }

        self.format = format;
        self.clear();
        for row in parsed {
            self.add(row);
        }
        Ok(())
    }

    /// Replace the contents with rows parsed from bytes in `charset`
    pub fn load_bytes(&mut self, data: &[u8], charset: Charset) -> Result<()> {
        let text = charset.decode(data)?;
        self.load_str(&text)
    }

    /// Remove every row, keeping the indexed columns
    pub fn clear(&mut self) {
        self.rows.clear();
        for index in self.indexes.values_mut() {
            index.keys.clear();
        }
    }

    /// Add a row; returns `None` if the filter rejects it
    pub fn add(&mut self, row: Row) -> Option<RowId> {
        if let Some(filter) = &self.filter {
            if !filter(&row) {
                return None;
            }
        }
        let id = RowId(self.next_id);
        self.next_id += 1;
        self.insert_with_id(id, row);
        Some(id)
    }

    /// Put a row back under an id it held before
    pub(crate) fn insert_with_id(&mut self, id: RowId, row: Row) {
        for (&column, index) in &mut self.indexes {
            if let Some(key) = row.get(column) {
                index.insert(key, id);
            }
        }
        self.rows.insert(id, row);
    }

    /// Remove a row by id
    pub fn remove(&mut self, id: RowId) -> Option<Row> {
        let row = self.rows.remove(&id)?;
        for (&column, index) in &mut self.indexes {
            if let Some(key) = row.get(column) {
                index.remove(key, id);
            }
        }
        Some(row)
    }

    /// Remove the row found by `key` in the index on `column`
    pub fn remove_by_key(&mut self, column: usize, key: &str) -> Option<(RowId, Row)> {
        let id = self.id_of(column, key)?;
        self.remove(id).map(|row| (id, row))
    }

    /// Replace a row in place; returns the previous contents
    pub fn replace_row(&mut self, id: RowId, row: Row) -> Option<Row> {
        let old = self.remove(id)?;
        self.insert_with_id(id, row);
        Some(old)
    }

    /// Replace the row found by `key` in the index on `column`
    pub fn replace(&mut self, column: usize, key: &str, row: Row) -> Option<(RowId, Row)> {
        let id = self.id_of(column, key)?;
        self.replace_row(id, row).map(|old| (id, old))
    }

    /// Row id holding `key` in the index on `column`
    #[must_use]
    pub fn id_of(&self, column: usize, key: &str) -> Option<RowId> {
        self.indexes.get(&column)?.get(key)
    }

    /// Row holding `key` in the index on `column`
    #[must_use]
    pub fn get(&self, column: usize, key: &str) -> Option<&Row> {
        self.id_of(column, key).and_then(|id| self.rows.get(&id))
    }

    /// Row by id
    #[must_use]
    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.rows.get(&id)
    }

    /// Whether a column is indexed and holds `key`
    #[must_use]
    pub fn contains_key(&self, column: usize, key: &str) -> bool {
        self.id_of(column, key).is_some()
    }

    /// Rows in table order
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    /// Rows with their ids in table order
    pub fn entries(&self) -> impl Iterator<Item = (RowId, &Row)> {
        self.rows.iter().map(|(&id, row)| (id, row))
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Serialise one row with its line terminator
    pub fn encode_row(&self, row: &[String], charset: Charset) -> Result<Vec<u8>> {
        let mut line = self.format.format_row(row)?;
        line.push('\n');
        Ok(charset.encode(&line)?)
    }

    /// Serialise the whole table, header first
    pub fn to_bytes(&self, charset: Charset) -> Result<Vec<u8>> {
        let mut text = String::new();
        if let Some(header) = self.format.header_line() {
            text.push_str(&header);
            text.push('\n');
        }
        for row in self.rows.values() {
            text.push_str(&self.format.format_row(row)?);
            text.push('\n');
        }
        charset.encode(&text).map_err(TableError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{Delimited, FixedWidth};

    const GROUP: &str = "root:x:0:\nwheel:x:10:alice,bob\nusers:x:100:\n";

    fn strings(fields: &[&str]) -> Row {
        fields.iter().map(|s| (*s).to_string()).collect()
    }

    fn group_table() -> FlatTable {
        let mut table = FlatTable::new(Delimited::colon()).with_index(0).with_index(2);
        table.load_str(GROUP).unwrap();
        table
    }

    #[test]
    fn test_load_and_lookup() {
        let table = group_table();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(0, "wheel").unwrap()[3], "alice,bob");
        assert_eq!(table.get(2, "100").unwrap()[0], "users");
        assert!(table.get(0, "nobody").is_none());
        // Column 1 is not indexed.
        assert!(table.get(1, "x").is_none());
    }

    #[test]
    fn test_remove_updates_every_index() {
        let mut table = group_table();
        let (_, row) = table.remove_by_key(0, "wheel").unwrap();
        assert_eq!(row[2], "10");
        assert!(!table.contains_key(0, "wheel"));
        assert!(!table.contains_key(2, "10"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_add_then_remove_restores_indexes() {
        let mut table = group_table();
        let id = table.add(strings(&["staff", "x", "10", ""])).unwrap();
        // Last row wins a duplicate key.
        assert_eq!(table.get(2, "10").unwrap()[0], "staff");

        table.remove(id);
        assert_eq!(table.get(2, "10").unwrap()[0], "wheel");
        assert!(!table.contains_key(0, "staff"));
        assert_eq!(table.to_bytes(Charset::Utf8).unwrap(), GROUP.as_bytes());
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut table = group_table();
        let (id, old) = table
            .replace(0, "wheel", strings(&["wheel", "x", "11", "alice"]))
            .unwrap();
        assert_eq!(old[2], "10");
        assert_eq!(table.id_of(0, "wheel"), Some(id));
        assert!(!table.contains_key(2, "10"));
        assert_eq!(table.get(2, "11").unwrap()[3], "alice");
        let names: Vec<&str> = table.rows().map(|r| r[0].as_str()).collect();
        assert_eq!(names, vec!["root", "wheel", "users"]);
    }

    #[test]
    fn test_filter_rejects_rows() {
        let mut table = FlatTable::new(Delimited::colon())
            .with_index(0)
            .with_filter(|row| !row[0].starts_with('#'));
        table.load_str("#comment\nroot:x:0:\n").unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.add(strings(&["#other"])).is_none());
    }

    #[test]
    fn test_failed_load_leaves_table_unchanged() {
        let mut table = FlatTable::new(FixedWidth::with_widths(vec![4, 4, 4])).with_index(0);
        table.load_str("ab  cd  ef\n").unwrap();
        assert!(matches!(
            table.load_str("ab  cd  ef\nx\n"),
            Err(TableError::MissingColumns { line: 2, .. })
        ));
        assert_eq!(table.len(), 1);
        assert!(table.contains_key(0, "ab"));
    }

    #[test]
    fn test_failed_load_keeps_detected_layout() {
        let text = "Name    Port\nalice   7\n";
        let mut table = FlatTable::new(FixedWidth::auto().with_header(true)).with_index(0);
        table.load_str(text).unwrap();
        assert!(table.load_str("Other   Column   Wide\nx\n").is_err());
        assert_eq!(table.to_bytes(Charset::Utf8).unwrap(), text.as_bytes());

        table.add(strings(&["bob", "8"]));
        let bytes = table.to_bytes(Charset::Utf8).unwrap();
        assert_eq!(bytes, b"Name    Port\nalice   7\nbob     8\n");
    }

    #[test]
    fn test_reinserted_row_takes_back_its_place() {
        let mut table = group_table();
        let staff = table.add(strings(&["staff", "x", "10", ""])).unwrap();
        let wheel = table.id_of(0, "wheel").unwrap();

        // Put the older holder back after removing it: the newer row still wins.
        let row = table.remove(wheel).unwrap();
        assert_eq!(table.id_of(2, "10"), Some(staff));
        table.insert_with_id(wheel, row);
        assert_eq!(table.id_of(2, "10"), Some(staff));

        table.replace_row(wheel, strings(&["wheel", "x", "10", "carol"]));
        assert_eq!(table.id_of(2, "10"), Some(staff));
        table.remove(staff);
        assert_eq!(table.get(2, "10").unwrap()[3], "carol");
    }

    #[test]
    fn test_encode_row_charset() {
        let table = FlatTable::new(Delimited::colon());
        let row = strings(&["jürgen", "x"]);
        assert_eq!(table.encode_row(&row, Charset::Latin1).unwrap(), b"j\xfcrgen:x\n");
        assert!(table.encode_row(&row, Charset::Ascii).is_err());
    }
}
