//! Error types shared by idbridge crates

use thiserror::Error;

/// Failure to convert between text and bytes in a given charset
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CharsetError {
    #[error("character {character:?} at position {position} is not representable in {charset}")]
    Unmappable {
        charset: &'static str,
        character: char,
        position: usize,
    },

    #[error("invalid {charset} byte sequence at offset {offset}")]
    InvalidBytes { charset: &'static str, offset: usize },
}

impl CharsetError {
    /// Name of the charset that failed
    #[must_use]
    pub const fn charset(&self) -> &'static str {
        match self {
            Self::Unmappable { charset, .. } | Self::InvalidBytes { charset, .. } => charset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charset_name() {
        let err = CharsetError::InvalidBytes {
            charset: "US-ASCII",
            offset: 3,
        };
        assert_eq!(err.charset(), "US-ASCII");
        assert!(err.to_string().contains("offset 3"));
    }
}
