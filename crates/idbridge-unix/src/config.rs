//! Account store configuration

use idbridge_common::Charset;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration of a [`crate::UnixAccountStore`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnixStoreConfig {
    /// passwd-shaped table
    #[serde(default = "default_passwd_file")]
    pub passwd_file: PathBuf,

    /// shadow-shaped table; `None` keeps hashes in the passwd table
    #[serde(default = "default_shadow_file")]
    pub shadow_file: Option<PathBuf>,

    /// group-shaped table; `None` disables role operations
    #[serde(default = "default_group_file")]
    pub group_file: Option<PathBuf>,

    /// Registry identifier of the algorithm used for new passwords
    #[serde(default = "default_password_algorithm")]
    pub password_algorithm: String,

    /// Field separator of all three tables
    #[serde(default = "default_separator")]
    pub separator: char,

    /// Escape character; `None` disables escaping
    #[serde(default)]
    pub escape: Option<char>,

    /// Charset of the table files and of passwords
    #[serde(default)]
    pub charset: Charset,

    /// Command printing `lastlog`-style output; `None` skips last-login data
    #[serde(default)]
    pub lastlog_command: Option<String>,

    /// Lowest id handed out to new identities and roles
    #[serde(default = "default_first_id")]
    pub first_id: u32,

    /// Primary group of new identities without an explicit one
    #[serde(default = "default_gid")]
    pub default_gid: u32,

    /// Login shell of new identities
    #[serde(default = "default_shell")]
    pub default_shell: String,

    /// Parent directory of new home directories
    #[serde(default = "default_home_base")]
    pub home_base: String,

    /// Minimum password age of new identities, in days
    #[serde(default)]
    pub min_days: u32,

    /// Maximum password age of new identities, in days
    #[serde(default = "default_max_days")]
    pub max_days: u32,

    /// Expiry warning lead of new identities, in days
    #[serde(default = "default_warn_days")]
    pub warn_days: u32,
}

fn default_passwd_file() -> PathBuf {
    PathBuf::from("/etc/passwd")
}

#[allow(clippy::unnecessary_wraps)]
fn default_shadow_file() -> Option<PathBuf> {
    Some(PathBuf::from("/etc/shadow"))
}

#[allow(clippy::unnecessary_wraps)]
fn default_group_file() -> Option<PathBuf> {
    Some(PathBuf::from("/etc/group"))
}

fn default_password_algorithm() -> String {
    "SHA512CRYPT".to_string()
}

const fn default_separator() -> char {
    ':'
}

const fn default_first_id() -> u32 {
    1000
}

const fn default_gid() -> u32 {
    100
}

fn default_shell() -> String {
    "/bin/sh".to_string()
}

fn default_home_base() -> String {
    "/home".to_string()
}

const fn default_max_days() -> u32 {
    99_999
}

const fn default_warn_days() -> u32 {
    7
}

impl Default for UnixStoreConfig {
    fn default() -> Self {
        Self {
            passwd_file: default_passwd_file(),
            shadow_file: default_shadow_file(),
            group_file: default_group_file(),
            password_algorithm: default_password_algorithm(),
            separator: default_separator(),
            escape: None,
            charset: Charset::default(),
            lastlog_command: None,
            first_id: default_first_id(),
            default_gid: default_gid(),
            default_shell: default_shell(),
            home_base: default_home_base(),
            min_days: 0,
            max_days: default_max_days(),
            warn_days: default_warn_days(),
        }
    }
}

impl UnixStoreConfig {
    /// Configuration for tables living in one directory
    #[must_use]
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            passwd_file: dir.join("passwd"),
            shadow_file: Some(dir.join("shadow")),
            group_file: Some(dir.join("group")),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = UnixStoreConfig::default();
        assert_eq!(config.passwd_file, PathBuf::from("/etc/passwd"));
        assert_eq!(config.shadow_file, Some(PathBuf::from("/etc/shadow")));
        assert_eq!(config.password_algorithm, "SHA512CRYPT");
        assert_eq!(config.separator, ':');
        assert!(config.escape.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let config: UnixStoreConfig = toml::from_str(
            r#"
            passwd_file = "/srv/etc/passwd"
            password_algorithm = "MD5CRYPT"
            charset = "latin1"
            first_id = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.passwd_file, PathBuf::from("/srv/etc/passwd"));
        assert_eq!(config.password_algorithm, "MD5CRYPT");
        assert_eq!(config.charset, Charset::Latin1);
        assert_eq!(config.first_id, 5000);
        assert_eq!(config.group_file, Some(PathBuf::from("/etc/group")));
        assert_eq!(config.max_days, 99_999);
    }
}
