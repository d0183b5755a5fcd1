//! Line formats
//!
//! A [`LineFormat`] turns one line of text into a row of fields and back.
//! Parsing and formatting must be inverse: a row written by a format reads
//! back as the same fields.

use crate::error::{Result, TableError};
use crate::table::Row;
use std::fmt::Debug;

/// Parser and serialiser for one line of a table
pub trait LineFormat: Send + Sync + Debug {
    /// Parse a line (without its terminator)
    ///
    /// Returns `Ok(None)` when the line was consumed as a header.
    /// `line_no` is 1-based and only used for error reporting.
    fn parse_line(&mut self, line: &str, line_no: usize) -> Result<Option<Row>>;

    /// Serialise a row (without a terminator)
    fn format_row(&self, row: &[String]) -> Result<String>;

    /// Header line to emit before the rows, if one was read
    fn header_line(&self) -> Option<String> {
        None
    }

    /// Copy of this format without per-file state, for a fresh load
    fn fresh(&self) -> Box<dyn LineFormat>;
}

/// Separator-delimited fields with an optional escape character
///
/// The escape character makes the following separator or escape character
/// literal. Before any other character it is kept as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimited {
    separator: char,
    escape: Option<char>,
}

impl Delimited {
    /// Create a format without escaping
    #[must_use]
    pub const fn new(separator: char) -> Self {
        Self {
            separator,
            escape: None,
        }
    }

    /// Colon separated, as in `/etc/passwd`
    #[must_use]
    pub const fn colon() -> Self {
        Self::new(':')
    }

    /// Enable an escape character
    #[must_use]
    pub const fn with_escape(mut self, escape: Option<char>) -> Self {
        self.escape = escape;
        self
    }

    /// Field separator
    #[must_use]
    pub const fn separator(&self) -> char {
        self.separator
    }
}

impl LineFormat for Delimited {
    fn parse_line(&mut self, line: &str, _line_no: usize) -> Result<Option<Row>> {
        let mut fields = Vec::new();
        let mut current = String::new();
        let mut chars = line.chars().peekable();

        while let Some(c) = chars.next() {
            if Some(c) == self.escape {
                match chars.peek() {
                    Some(&next) if next == self.separator || Some(next) == self.escape => {
                        current.push(next);
                        chars.next();
                    }
                    _ => current.push(c),
                }
            } else if c == self.separator {
                fields.push(std::mem::take(&mut current));
            } else {
                current.push(c);
            }
        }
        fields.push(current);
        Ok(Some(fields))
    }

    fn format_row(&self, row: &[String]) -> Result<String> {
        let mut line = String::new();
        for (i, field) in row.iter().enumerate() {
            if i > 0 {
                line.push(self.separator);
            }
            for c in field.chars() {
                if c == '\n' || c == '\r' {
                    return Err(TableError::Format(format!("field {i} contains a line break")));
                }
                if c == self.separator || Some(c) == self.escape {
                    match self.escape {
                        Some(escape) => line.push(escape),
                        None => {
                            return Err(TableError::Format(format!(
                                "field {i} contains the separator {:?} and no escape is configured",
                                self.separator
                            )));
                        }
                    }
                }
                line.push(c);
            }
        }
        Ok(line)
    }

    fn fresh(&self) -> Box<dyn LineFormat> {
        Box::new(self.clone())
    }
}

/// Fixed-width columns, explicit or detected from the first line
///
/// Detection splits the first line on runs of two or more spaces. Each
/// column then spans from its start to the start of the next; the last
/// column absorbs the rest of the line. Trailing blanks of a field are
/// padding and are dropped when read, so a value ending in spaces does not
/// survive a round trip; leading blanks are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedWidth {
    configured: Option<Vec<usize>>,
    widths: Option<Vec<usize>>,
    has_header: bool,
    header: Option<Vec<String>>,
}

impl FixedWidth {
    /// Detect widths from the first line
    #[must_use]
    pub const fn auto() -> Self {
        Self {
            configured: None,
            widths: None,
            has_header: false,
            header: None,
        }
    }

    /// Use explicit widths; the last width is a minimum only
    #[must_use]
    pub fn with_widths(widths: Vec<usize>) -> Self {
        Self {
            configured: Some(widths.clone()),
            widths: Some(widths),
            has_header: false,
            header: None,
        }
    }

    /// Treat the first line as a header naming the columns
    #[must_use]
    pub const fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Column widths, once known
    #[must_use]
    pub fn widths(&self) -> Option<&[usize]> {
        self.widths.as_deref()
    }

    /// Column names read from the header
    #[must_use]
    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    /// Position of a named column in the header
    #[must_use]
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header
            .as_ref()
            .and_then(|h| h.iter().position(|c| c.eq_ignore_ascii_case(name)))
    }

    /// Column widths of a line split on runs of two or more spaces
    #[must_use]
    pub fn detect_widths(line: &str) -> Vec<usize> {
        let chars: Vec<char> = line.chars().collect();
        let mut starts = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            if chars[i] == ' ' {
                let run = chars[i..].iter().take_while(|&&c| c == ' ').count();
                if run >= 2 && i + run < chars.len() && !starts.is_empty() {
                    starts.push(i + run);
                }
                i += run;
            } else {
                if starts.is_empty() {
                    starts.push(i);
                }
                i += 1;
            }
        }
        if starts.is_empty() {
            return Vec::new();
        }

        // Leading blanks belong to the first column.
        starts[0] = 0;
        let mut widths: Vec<usize> = starts.windows(2).map(|w| w[1] - w[0]).collect();
        widths.push(chars.len() - starts[starts.len() - 1]);
        widths
    }

    /// Forget detected widths and the header read from the last file
    pub fn reset(&mut self) {
        self.widths.clone_from(&self.configured);
        self.header = None;
    }

    fn split(widths: &[usize], line: &str, line_no: usize) -> Result<Row> {
        let chars: Vec<char> = line.chars().collect();
        let last_start: usize = widths[..widths.len().saturating_sub(1)].iter().sum();
        if chars.len() < last_start {
            let mut found = 0;
            let mut pos = 0;
            for &w in widths {
                if pos >= chars.len() {
                    break;
                }
                found += 1;
                pos += w;
            }
            return Err(TableError::MissingColumns {
                line: line_no,
                expected: widths.len(),
                found,
            });
        }

        let mut row = Vec::with_capacity(widths.len());
        let mut pos = 0;
        for (i, &w) in widths.iter().enumerate() {
            let end = if i + 1 == widths.len() {
                chars.len()
            } else {
                (pos + w).min(chars.len())
            };
            let field: String = chars[pos..end].iter().collect();
            row.push(field.trim_end().to_string());
            pos = end;
        }
        Ok(row)
    }

    fn pad(widths: &[usize], row: &[String]) -> Result<String> {
        if row.len() > widths.len() {
            return Err(TableError::Format(format!(
                "row has {} fields but the layout has {} columns",
                row.len(),
                widths.len()
            )));
        }
        let mut line = String::new();
        for (i, &w) in widths.iter().enumerate() {
            let field = row.get(i).map_or("", String::as_str);
            if field.contains('\n') {
                return Err(TableError::Format(format!("field {i} contains a line break")));
            }
            let len = field.chars().count();
            if i + 1 == widths.len() {
                line.push_str(field);
            } else if len > w {
                return Err(TableError::Format(format!(
                    "field {i} is {len} characters wide, column holds {w}"
                )));
            } else {
                line.push_str(field);
                line.extend(std::iter::repeat_n(' ', w - len));
            }
        }
        Ok(line)
    }
}

impl LineFormat for FixedWidth {
    fn parse_line(&mut self, line: &str, line_no: usize) -> Result<Option<Row>> {
        let widths = match &self.widths {
            Some(w) => w.clone(),
            None => {
                let detected = Self::detect_widths(line);
                if detected.is_empty() {
                    return Err(TableError::MissingColumns {
                        line: line_no,
                        expected: 1,
                        found: 0,
                    });
                }
                self.widths = Some(detected.clone());
                detected
            }
        };

        let row = Self::split(&widths, line, line_no)?;
        if self.has_header && self.header.is_none() {
            self.header = Some(row);
            return Ok(None);
        }
        Ok(Some(row))
    }

    fn format_row(&self, row: &[String]) -> Result<String> {
        let widths = self
            .widths
            .as_deref()
            .ok_or_else(|| TableError::Format("column widths are not known yet".to_string()))?;
        Self::pad(widths, row)
    }

    fn header_line(&self) -> Option<String> {
        let widths = self.widths.as_deref()?;
        self.header.as_ref().and_then(|h| Self::pad(widths, h).ok())
    }

    fn fresh(&self) -> Box<dyn LineFormat> {
        let mut format = self.clone();
        format.reset();
        Box::new(format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(fields: &[&str]) -> Row {
        fields.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_delimited_parse() {
        let mut format = Delimited::colon();
        let row = format.parse_line("alice:x:1000:1000::/home/alice:/bin/sh", 1).unwrap().unwrap();
        assert_eq!(row, strings(&["alice", "x", "1000", "1000", "", "/home/alice", "/bin/sh"]));

        let row = format.parse_line("alice:$6$abc:18000:0:90:7:::", 1).unwrap().unwrap();
        assert_eq!(row.len(), 9);
    }

    #[test]
    fn test_delimited_escape() {
        let mut format = Delimited::colon().with_escape(Some('\\'));
        let row = format.parse_line(r"a\:b:c\\:d\x", 1).unwrap().unwrap();
        assert_eq!(row, strings(&["a:b", "c\\", "d\\x"]));

        let line = format.format_row(&strings(&["a:b", "c\\", "plain"])).unwrap();
        assert_eq!(line, r"a\:b:c\\:plain");
        assert_eq!(format.parse_line(&line, 1).unwrap().unwrap(), strings(&["a:b", "c\\", "plain"]));
    }

    #[test]
    fn test_delimited_unescapable_separator() {
        let format = Delimited::colon();
        assert!(matches!(
            format.format_row(&strings(&["a:b"])),
            Err(TableError::Format(_))
        ));
        assert!(format.format_row(&strings(&["a\nb"])).is_err());
    }

    #[test]
    fn test_detect_widths() {
        assert_eq!(FixedWidth::detect_widths("Name  Port  "), vec![6, 6]);
        assert_eq!(
            FixedWidth::detect_widths("Username         Port     From             Latest"),
            vec![17, 9, 17, 6]
        );
        // Single spaces do not split columns.
        assert_eq!(FixedWidth::detect_widths("Last Login  Host"), vec![12, 4]);
    }

    #[test]
    fn test_fixed_width_with_header() {
        let mut format = FixedWidth::auto().with_header(true);
        assert!(format.parse_line("Username  Port   Latest", 1).unwrap().is_none());
        assert_eq!(format.column("latest"), Some(2));

        let row = format.parse_line("root      pts/0  Mon Apr 15 10:00:00 +0000 2019", 2).unwrap().unwrap();
        assert_eq!(row, strings(&["root", "pts/0", "Mon Apr 15 10:00:00 +0000 2019"]));

        let row = format.parse_line("bob              **Never logged in**", 3).unwrap().unwrap();
        assert_eq!(row, strings(&["bob", "", "**Never logged in**"]));

        assert!(matches!(
            format.parse_line("short", 4),
            Err(TableError::MissingColumns { line: 4, expected: 3, found: 1 })
        ));

        assert_eq!(format.header_line().unwrap(), "Username  Port   Latest");
        format.reset();
        assert!(format.widths().is_none());
        assert!(format.header().is_none());
    }

    #[test]
    fn test_fixed_width_roundtrip() {
        let mut format = FixedWidth::with_widths(vec![6, 4, 1]);
        let row = strings(&["alice", "7", "rest of it"]);
        let line = format.format_row(&row).unwrap();
        assert_eq!(line, "alice 7   rest of it");
        assert_eq!(format.parse_line(&line, 1).unwrap().unwrap(), row);

        assert!(format.format_row(&strings(&["toolongname", "", ""])).is_err());
    }

    #[test]
    fn test_fixed_width_keeps_leading_blanks() {
        let mut format = FixedWidth::with_widths(vec![8, 4, 1]);
        let row = strings(&["  lead", " x", "  tail"]);
        let line = format.format_row(&row).unwrap();
        assert_eq!(line, "  lead   x    tail");
        assert_eq!(format.parse_line(&line, 1).unwrap().unwrap(), row);

        // Trailing blanks cannot be told apart from padding.
        let line = format.format_row(&strings(&["end  ", "y", "z"])).unwrap();
        assert_eq!(format.parse_line(&line, 1).unwrap().unwrap(), strings(&["end", "y", "z"]));
    }

    #[test]
    fn test_fresh_copy_leaves_original_state() {
        let mut format = FixedWidth::auto().with_header(true);
        format.parse_line("Name  Port", 1).unwrap();
        let fresh = format.fresh();
        assert!(fresh.header_line().is_none());
        assert_eq!(format.header_line().unwrap(), "Name  Port");
    }
}
