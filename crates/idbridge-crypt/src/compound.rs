//! Encoder pipelines
//!
//! A [`CompoundEncoder`] runs its children in order on encode and in reverse
//! on decode, e.g. AES followed by Base64. Only the first child sees the
//! salt; every child sees the secret.

use crate::encoder::Encoder;
use crate::error::{EncodingError, Result};
use std::sync::Arc;

/// Ordered chain of encoders
#[derive(Clone)]
pub struct CompoundEncoder {
    id: String,
    children: Vec<Arc<dyn Encoder>>,
}

impl std::fmt::Debug for CompoundEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<&str> = self.children.iter().map(|c| c.id()).collect();
        f.debug_struct("CompoundEncoder")
            .field("id", &self.id)
            .field("children", &ids)
            .finish()
    }
}

impl CompoundEncoder {
    /// Build a pipeline; at least one child is required
    pub fn new(id: impl Into<String>, children: Vec<Arc<dyn Encoder>>) -> Result<Self> {
        let id = id.into();
        if children.is_empty() {
            return Err(EncodingError::malformed(id, "compound encoder needs at least one child"));
        }
        Ok(Self { id, children })
    }

    /// Child encoders, innermost first
    #[must_use]
    pub fn children(&self) -> &[Arc<dyn Encoder>] {
        &self.children
    }
}

impl Encoder for CompoundEncoder {
    fn id(&self) -> &str {
        &self.id
    }

    fn encode(&self, plain: &[u8], salt: Option<&[u8]>, secret: Option<&[u8]>) -> Result<Vec<u8>> {
        let mut data = plain.to_vec();
        for (i, child) in self.children.iter().enumerate() {
            let salt = if i == 0 { salt } else { None };
            data = child.encode(&data, salt, secret)?;
        }
        Ok(data)
    }

    fn decode(&self, encoded: &[u8], secret: Option<&[u8]>) -> Result<Vec<u8>> {
        let mut data = encoded.to_vec();
        for child in self.children.iter().rev() {
            data = child.decode(&data, secret)?;
        }
        Ok(data)
    }

    fn matches(&self, encoded: &[u8], plain: &[u8], secret: Option<&[u8]>) -> Result<bool> {
        let mut data = encoded.to_vec();
        for child in self.children[1..].iter().rev() {
            data = child.decode(&data, secret)?;
        }
        self.children[0].matches(&data, plain, secret)
    }

    fn is_of_type(&self, encoded: &[u8]) -> bool {
        let mut data = encoded.to_vec();
        for (i, child) in self.children.iter().enumerate().rev() {
            if !child.is_of_type(&data) {
                return false;
            }
            if i > 0 {
                match child.decode(&data, None) {
                    Ok(inner) => data = inner,
                    Err(_) => return false,
                }
            }
        }
        true
    }

    fn is_reversible(&self) -> bool {
        self.children.iter().all(|c| c.is_reversible())
    }

    fn is_text(&self) -> bool {
        self.children.last().is_some_and(|c| c.is_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aes_cipher::{AesEncoder, KeySize};
    use crate::codec::{Base64Codec, HexCodec};
    use crate::sha_crypt::ShaCrypt;

    fn aes_base64() -> CompoundEncoder {
        CompoundEncoder::new(
            "AES128BASE64",
            vec![Arc::new(AesEncoder::new(KeySize::Aes128)), Arc::new(Base64Codec)],
        )
        .unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let encoder = aes_base64();
        let encoded = encoder.encode(b"secret", None, Some(b"pw")).unwrap();
        assert!(encoded.iter().all(u8::is_ascii));
        assert!(encoder.is_text());
        assert!(encoder.is_reversible());
        assert_eq!(encoder.decode(&encoded, Some(b"pw")).unwrap(), b"secret");
        assert!(encoder.matches(&encoded, b"secret", Some(b"pw")).unwrap());
        assert!(!encoder.matches(&encoded, b"Secret", Some(b"pw")).unwrap());
    }

    #[test]
    fn test_is_of_type_peels_layers() {
        let encoder = aes_base64();
        let encoded = encoder.encode(b"secret", None, Some(b"pw")).unwrap();
        assert!(encoder.is_of_type(&encoded));
        // Valid Base64 whose payload is not an AES header.
        assert!(!encoder.is_of_type(b"aGVsbG8="));
        assert!(!encoder.is_of_type(b"not base64!"));
    }

    #[test]
    fn test_matches_delegates_to_irreversible_child() {
        let encoder = CompoundEncoder::new(
            "SHA512CRYPTHEX",
            vec![Arc::new(ShaCrypt::sha512()), Arc::new(HexCodec)],
        )
        .unwrap();
        let encoded = encoder.encode(b"pw", Some(b"salty"), None).unwrap();
        assert!(encoder.matches(&encoded, b"pw", None).unwrap());
        assert!(!encoder.matches(&encoded, b"pW", None).unwrap());
        assert!(!encoder.is_reversible());
        assert!(encoder.decode(&encoded, None).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        assert!(CompoundEncoder::new("EMPTY", Vec::new()).is_err());
    }
}
