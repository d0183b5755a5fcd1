//! PBE with MD5 and DES (PKCS #5 v1.5)
//!
//! The key and IV come from PBKDF1-MD5 over the passphrase and an 8-byte
//! salt. Encoded values are the salt followed by the DES-CBC ciphertext.

use crate::des::Des;
use crate::encoder::{Encoder, constant_time_eq};
use crate::error::{EncodingError, Result};
use crate::kdf::pbkdf1_md5;

const BLOCK: usize = 8;
const SALT_LEN: usize = 8;

/// Salt used when the caller does not supply one
pub const DEFAULT_SALT: [u8; SALT_LEN] = [0xA9, 0x9B, 0xC8, 0x32, 0x56, 0x35, 0xE3, 0x03];
/// PBKDF1 iteration count
pub const ITERATIONS: u32 = 1000;

/// PBE-MD5-DES encoder
#[derive(Debug, Clone, Default)]
pub struct PbeWithMd5AndDes {
    passphrase: Option<Vec<u8>>,
}

impl PbeWithMd5AndDes {
    /// Registry identifier
    pub const ID: &'static str = "PBEWITHMD5ANDDES";

    /// Create an encoder without a default passphrase
    #[must_use]
    pub const fn new() -> Self {
        Self { passphrase: None }
    }

    /// Passphrase used when a call supplies no secret
    #[must_use]
    pub fn with_passphrase(mut self, passphrase: impl Into<Vec<u8>>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    fn keyed(&self, secret: Option<&[u8]>, salt: &[u8]) -> Result<(Des, u64)> {
        let passphrase = secret
            .or(self.passphrase.as_deref())
            .ok_or_else(|| EncodingError::MissingSecret(Self::ID.to_string()))?;
        let (key, iv) = pbkdf1_md5(passphrase, salt, ITERATIONS);
        Ok((Des::new(key), u64::from_be_bytes(iv)))
    }
}

fn block_of(chunk: &[u8]) -> u64 {
    let mut b = [0u8; BLOCK];
    b.copy_from_slice(chunk);
    u64::from_be_bytes(b)
}

impl Encoder for PbeWithMd5AndDes {
    fn id(&self) -> &str {
        Self::ID
    }

    fn encode(&self, plain: &[u8], salt: Option<&[u8]>, secret: Option<&[u8]>) -> Result<Vec<u8>> {
        let salt = salt.unwrap_or(&DEFAULT_SALT);
        if salt.len() != SALT_LEN {
            return Err(EncodingError::invalid_salt(
                Self::ID,
                format!("salt must be {SALT_LEN} bytes, got {}", salt.len()),
            ));
        }
        let (des, iv) = self.keyed(secret, salt)?;

        let pad = BLOCK - plain.len() % BLOCK;
        let mut body = plain.to_vec();
        body.resize(plain.len() + pad, u8::try_from(pad).unwrap_or(8));

        let mut out = Vec::with_capacity(SALT_LEN + body.len());
        out.extend_from_slice(salt);
        let mut previous = iv;
        for chunk in body.chunks_exact(BLOCK) {
            previous = des.encrypt_block(block_of(chunk) ^ previous);
            out.extend_from_slice(&previous.to_be_bytes());
        }
        Ok(out)
    }

    fn decode(&self, encoded: &[u8], secret: Option<&[u8]>) -> Result<Vec<u8>> {
        if !self.is_of_type(encoded) {
            return Err(EncodingError::malformed(Self::ID, "expected salt plus whole DES blocks"));
        }
        let (salt, ciphertext) = encoded.split_at(SALT_LEN);
        let (des, iv) = self.keyed(secret, salt)?;

        let mut plain = Vec::with_capacity(ciphertext.len());
        let mut previous = iv;
        for chunk in ciphertext.chunks_exact(BLOCK) {
            let block = block_of(chunk);
            plain.extend_from_slice(&(des.decrypt_block(block) ^ previous).to_be_bytes());
            previous = block;
        }

        let pad = plain.last().map_or(0, |&b| usize::from(b));
        if pad == 0 || pad > BLOCK || !plain[plain.len() - pad..].iter().all(|&b| usize::from(b) == pad) {
            return Err(EncodingError::Cipher("bad padding (wrong passphrase?)".to_string()));
        }
        plain.truncate(plain.len() - pad);
        Ok(plain)
    }

    fn matches(&self, encoded: &[u8], plain: &[u8], secret: Option<&[u8]>) -> Result<bool> {
        match self.decode(encoded, secret) {
            Ok(decoded) => Ok(constant_time_eq(&decoded, plain)),
            Err(EncodingError::Cipher(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn is_of_type(&self, encoded: &[u8]) -> bool {
        encoded.len() >= SALT_LEN + BLOCK && (encoded.len() - SALT_LEN) % BLOCK == 0
    }

    fn is_reversible(&self) -> bool {
        true
    }

    fn is_text(&self) -> bool {
        false
    }
}
