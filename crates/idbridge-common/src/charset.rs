//! Charset conversion for credentials and table files
//!
//! Only the charsets actually found on account databases are supported.
//! Conversion is explicit in both directions so that a failure is reported
//! for the offending call instead of silently replacing characters.

use crate::error::CharsetError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Text encoding used to turn strings into bytes and back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Charset {
    #[default]
    Utf8,
    /// ISO-8859-1, every code point below U+0100 maps to one byte
    Latin1,
    /// 7-bit US-ASCII
    Ascii,
}

impl Charset {
    /// Canonical name of the charset
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Latin1 => "ISO-8859-1",
            Self::Ascii => "US-ASCII",
        }
    }

    /// Encode text into bytes
    pub fn encode(self, text: &str) -> Result<Vec<u8>, CharsetError> {
        match self {
            Self::Utf8 => Ok(text.as_bytes().to_vec()),
            Self::Latin1 | Self::Ascii => {
                let limit = if self == Self::Latin1 { 0xFF } else { 0x7F };
                text.chars()
                    .enumerate()
                    .map(|(position, character)| {
                        u8::try_from(u32::from(character))
                            .ok()
                            .filter(|b| u32::from(*b) <= limit)
                            .ok_or(CharsetError::Unmappable {
                                charset: self.name(),
                                character,
                                position,
                            })
                    })
                    .collect()
            }
        }
    }

    /// Decode bytes into text
    pub fn decode(self, bytes: &[u8]) -> Result<String, CharsetError> {
        match self {
            Self::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|e| {
                CharsetError::InvalidBytes {
                    charset: self.name(),
                    offset: e.utf8_error().valid_up_to(),
                }
            }),
            Self::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            Self::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(offset) => Err(CharsetError::InvalidBytes {
                    charset: self.name(),
                    offset,
                }),
                None => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            },
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Charset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "iso-8859-1" | "latin1" | "latin-1" => Ok(Self::Latin1),
            "us-ascii" | "ascii" => Ok(Self::Ascii),
            other => Err(format!("unsupported charset: {other}")),
        }
    }
}
