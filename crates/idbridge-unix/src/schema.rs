//! Column layout of the passwd, shadow and group tables

use crate::config::UnixStoreConfig;
use idbridge_flatfile::{Delimited, FlatTable, Row};

/// passwd columns
pub mod passwd {
    pub const NAME: usize = 0;
    pub const PASSWORD: usize = 1;
    pub const UID: usize = 2;
    pub const GID: usize = 3;
    pub const GECOS: usize = 4;
    pub const HOME: usize = 5;
    pub const SHELL: usize = 6;
    pub const COLUMNS: usize = 7;
}

/// shadow columns
pub mod shadow {
    pub const NAME: usize = 0;
    pub const PASSWORD: usize = 1;
    pub const LAST_CHANGE: usize = 2;
    pub const MIN_AGE: usize = 3;
    pub const MAX_AGE: usize = 4;
    pub const WARN: usize = 5;
    pub const INACTIVE: usize = 6;
    pub const DISABLED_SINCE: usize = 7;
    pub const COLUMNS: usize = 9;
}

/// group columns
pub mod group {
    pub const NAME: usize = 0;
    pub const PASSWORD: usize = 1;
    pub const GID: usize = 2;
    pub const MEMBERS: usize = 3;
    pub const COLUMNS: usize = 4;
}

/// Placeholder in passwd when the hash lives in shadow
pub const SHADOWED: &str = "x";

fn format(config: &UnixStoreConfig) -> Delimited {
    Delimited::new(config.separator).with_escape(config.escape)
}

/// Empty passwd table indexed by name and uid
#[must_use]
pub fn passwd_table(config: &UnixStoreConfig) -> FlatTable {
    FlatTable::new(format(config))
        .with_index(passwd::NAME)
        .with_index(passwd::UID)
}

/// Empty shadow table indexed by name
#[must_use]
pub fn shadow_table(config: &UnixStoreConfig) -> FlatTable {
    FlatTable::new(format(config)).with_index(shadow::NAME)
}

/// Empty group table indexed by name and gid
#[must_use]
pub fn group_table(config: &UnixStoreConfig) -> FlatTable {
    FlatTable::new(format(config))
        .with_index(group::NAME)
        .with_index(group::GID)
}

/// Field of a row, empty when the row is short
#[must_use]
pub fn field(row: &[String], column: usize) -> &str {
    row.get(column).map_or("", String::as_str)
}

/// Copy of a row padded to `columns` fields
#[must_use]
pub fn padded(row: &[String], columns: usize) -> Row {
    let mut row = row.to_vec();
    if row.len() < columns {
        row.resize(columns, String::new());
    }
    row
}

/// Split a group member list
#[must_use]
pub fn members(row: &[String]) -> Vec<String> {
    field(row, group::MEMBERS)
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a numeric id column
#[must_use]
pub fn id_field(row: &[String], column: usize) -> Option<u32> {
    field(row, column).trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> Row {
        fields.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_members() {
        assert_eq!(members(&row(&["wheel", "x", "10", "alice, bob,,"])), vec!["alice", "bob"]);
        assert!(members(&row(&["root", "x", "0"])).is_empty());
    }

    #[test]
    fn test_padded_and_fields() {
        let short = row(&["alice", "!"]);
        assert_eq!(padded(&short, shadow::COLUMNS).len(), 9);
        assert_eq!(field(&short, shadow::LAST_CHANGE), "");
        assert_eq!(id_field(&row(&["a", "x", " 42"]), 2), Some(42));
        assert_eq!(id_field(&row(&["a", "x", "n/a"]), 2), None);
    }

    #[test]
    fn test_tables_use_configured_separator() {
        let config = UnixStoreConfig {
            separator: ';',
            ..UnixStoreConfig::default()
        };
        let mut table = passwd_table(&config);
        table.load_str("alice;x;1000;100;;/home/alice;/bin/sh\n").unwrap();
        assert_eq!(table.get(passwd::UID, "1000").unwrap()[passwd::NAME], "alice");
    }
}
