//! Plain text codecs, usually the outer layer of a compound encoder

use crate::encoder::Encoder;
use crate::error::{EncodingError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Standard padded Base64
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Codec;

impl Base64Codec {
    /// Registry identifier
    pub const ID: &'static str = "BASE64";
}

impl Encoder for Base64Codec {
    fn id(&self) -> &str {
        Self::ID
    }

    fn encode(&self, plain: &[u8], _salt: Option<&[u8]>, _secret: Option<&[u8]>) -> Result<Vec<u8>> {
        Ok(STANDARD.encode(plain).into_bytes())
    }

    fn decode(&self, encoded: &[u8], _secret: Option<&[u8]>) -> Result<Vec<u8>> {
        STANDARD
            .decode(encoded)
            .map_err(|e| EncodingError::malformed(Self::ID, e.to_string()))
    }

    fn is_of_type(&self, encoded: &[u8]) -> bool {
        !encoded.is_empty() && encoded.len() % 4 == 0 && STANDARD.decode(encoded).is_ok()
    }

    fn is_reversible(&self) -> bool {
        true
    }
}

/// Lowercase hexadecimal
#[derive(Debug, Clone, Copy, Default)]
pub struct HexCodec;

impl HexCodec {
    /// Registry identifier
    pub const ID: &'static str = "HEX";
}

impl Encoder for HexCodec {
    fn id(&self) -> &str {
        Self::ID
    }

    fn encode(&self, plain: &[u8], _salt: Option<&[u8]>, _secret: Option<&[u8]>) -> Result<Vec<u8>> {
        Ok(hex::encode(plain).into_bytes())
    }

    fn decode(&self, encoded: &[u8], _secret: Option<&[u8]>) -> Result<Vec<u8>> {
        hex::decode(encoded).map_err(|e| EncodingError::malformed(Self::ID, e.to_string()))
    }

    fn is_of_type(&self, encoded: &[u8]) -> bool {
        !encoded.is_empty() && encoded.len() % 2 == 0 && encoded.iter().all(u8::is_ascii_hexdigit)
    }

    fn is_reversible(&self) -> bool {
        true
    }
}
