//! Last-login enrichment
//!
//! Login times come from the output of a `lastlog`-style utility: a header
//! line followed by one fixed-width row per account, the last column holding
//! the login time or a "never logged in" sentinel.

use chrono::{DateTime, FixedOffset};
use idbridge_flatfile::{FixedWidth, FlatTable};
use std::collections::HashMap;
use std::fmt::Debug;
use std::process::Command;
use thiserror::Error;

/// Default utility
pub const DEFAULT_COMMAND: &str = "lastlog";

const NEVER_LOGGED_IN: &str = "never logged in";
const DATE_FORMAT: &str = "%a %b %e %H:%M:%S %z %Y";

/// Last login per account name; `None` for accounts that never logged in
pub type LastLogins = HashMap<String, Option<DateTime<FixedOffset>>>;

/// Failure to obtain last-login data
#[derive(Debug, Error)]
pub enum LastLoginError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}")]
    Exit { command: String, status: String },

    #[error("unparsable output: {0}")]
    Parse(String),
}

/// Source of last-login times
pub trait LastLoginSource: Send + Sync + Debug {
    /// Fetch last-login times for all known accounts
    fn last_logins(&self) -> Result<LastLogins, LastLoginError>;
}

/// Runs a command and parses its output
#[derive(Debug, Clone)]
pub struct CommandLastLogin {
    program: String,
    args: Vec<String>,
}

impl CommandLastLogin {
    /// Parse a command line; arguments are split on whitespace
    ///
    /// An empty command line falls back to [`DEFAULT_COMMAND`].
    #[must_use]
    pub fn new(command_line: &str) -> Self {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_else(|| DEFAULT_COMMAND.to_string());
        Self {
            program,
            args: parts.collect(),
        }
    }

    /// Program name
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for CommandLastLogin {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND)
    }
}

impl LastLoginSource for CommandLastLogin {
    fn last_logins(&self) -> Result<LastLogins, LastLoginError> {
        tracing::debug!("Running {} {:?}", self.program, self.args);
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|source| LastLoginError::Spawn {
                command: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(LastLoginError::Exit {
                command: self.program.clone(),
                status: output.status.to_string(),
            });
        }
        parse_lastlog(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `lastlog`-style output
///
/// Columns are detected from the header. Rows whose date cannot be parsed
/// are logged and left out.
pub fn parse_lastlog(text: &str) -> Result<LastLogins, LastLoginError> {
    let mut table = FlatTable::new(FixedWidth::auto().with_header(true));
    table
        .load_str(text)
        .map_err(|e| LastLoginError::Parse(e.to_string()))?;

    let mut logins = HashMap::new();
    for row in table.rows() {
        let (Some(name), Some(latest)) = (row.first(), row.last()) else {
            continue;
        };
        if name.is_empty() || row.len() < 2 {
            continue;
        }
        if latest.to_ascii_lowercase().contains(NEVER_LOGGED_IN) {
            logins.insert(name.clone(), None);
            continue;
        }
        match DateTime::parse_from_str(latest, DATE_FORMAT) {
            Ok(time) => {
                logins.insert(name.clone(), Some(time));
            }
            Err(e) => tracing::warn!("Skipping last login of {}: {:?}: {}", name, latest, e),
        }
    }
    Ok(logins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    const OUTPUT: &str = "\
Username         Port     From             Latest
root             pts/0    10.0.0.1         Mon Mar  4 10:12:33 +0000 2024
bin                                        **Never logged in**
alice            pts/1    workstation      Fri Mar 15 08:00:01 +0100 2024
broken           tty1                      yesterday
";

    #[test]
    fn test_parse_lastlog() {
        let logins = parse_lastlog(OUTPUT).unwrap();
        assert_eq!(logins.len(), 3);

        let root = logins["root"].unwrap();
        assert_eq!((root.month(), root.day(), root.hour()), (3, 4, 10));

        assert_eq!(logins["bin"], None);

        let alice = logins["alice"].unwrap();
        assert_eq!(alice.offset().local_minus_utc(), 3600);
        assert!(!logins.contains_key("broken"));
    }

    #[test]
    fn test_header_only() {
        let logins = parse_lastlog("Username         Port     From             Latest\n").unwrap();
        assert!(logins.is_empty());
    }

    #[test]
    fn test_command_line_split() {
        let command = CommandLastLogin::new("lastlog -t 30");
        assert_eq!(command.program(), "lastlog");
        assert_eq!(command.args, vec!["-t", "30"]);
        assert_eq!(CommandLastLogin::new("  ").program(), DEFAULT_COMMAND);
    }

    #[test]
    fn test_failing_command() {
        let err = CommandLastLogin::new("false").last_logins().unwrap_err();
        assert!(matches!(err, LastLoginError::Exit { .. }));
        let err = CommandLastLogin::new("/nonexistent/lastlog").last_logins().unwrap_err();
        assert!(matches!(err, LastLoginError::Spawn { .. }));
    }
}
