//! Encoding error types

use idbridge_common::CharsetError;
use thiserror::Error;

/// Result type for encoder operations
pub type Result<T> = std::result::Result<T, EncodingError>;

/// Errors raised while encoding, decoding or verifying credentials
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("invalid salt for {algorithm}: {reason}")]
    InvalidSalt { algorithm: String, reason: String },

    #[error("{algorithm} does not support {operation}")]
    Unsupported {
        algorithm: String,
        operation: &'static str,
    },

    #[error("{0} requires a secret")]
    MissingSecret(String),

    #[error("malformed {algorithm} value: {reason}")]
    Malformed { algorithm: String, reason: String },

    #[error("cipher error: {0}")]
    Cipher(String),

    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("charset error: {0}")]
    Charset(#[from] CharsetError),
}

impl EncodingError {
    /// Create an invalid salt error
    pub fn invalid_salt(algorithm: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSalt {
            algorithm: algorithm.into(),
            reason: reason.into(),
        }
    }

    /// Create a malformed value error
    pub fn malformed(algorithm: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            algorithm: algorithm.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(algorithm: impl Into<String>, operation: &'static str) -> Self {
        Self::Unsupported {
            algorithm: algorithm.into(),
            operation,
        }
    }

    /// Check if the error reports a missing capability rather than bad input
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EncodingError::invalid_salt("MD5CRYPT", "salt too short");
        assert_eq!(err.to_string(), "invalid salt for MD5CRYPT: salt too short");

        let err = EncodingError::unsupported("SHA512CRYPT", "decode");
        assert!(err.is_unsupported());
        assert_eq!(err.to_string(), "SHA512CRYPT does not support decode");
    }
}
