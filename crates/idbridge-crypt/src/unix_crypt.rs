//! Traditional Unix DES-based `crypt(3)`
//!
//! The stored form is the two salt characters followed by eleven hash
//! characters, with no separator. Only the first eight password bytes and
//! seven bits of each are significant.

use crate::des::{Des, EXPANSION};
use crate::encoder::{Encoder, constant_time_eq, random_salt};
use crate::error::{EncodingError, Result};
use crate::radix64::{self, ALPHABET};

/// Length of the stored form
const ENCODED_LEN: usize = 13;

/// DES-crypt encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixCrypt;

impl UnixCrypt {
    /// Registry identifier
    pub const ID: &'static str = "CRYPT";

    /// Create the encoder
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Hash `plain` with a validated two-character salt
    fn crypt(plain: &[u8], salt: [u8; 2]) -> Result<Vec<u8>> {
        let mut salt_bits = 0u32;
        for (i, &c) in salt.iter().enumerate() {
            let value = radix64::index_of(c).ok_or_else(|| {
                EncodingError::invalid_salt(Self::ID, format!("character {:?} outside [./0-9A-Za-z]", c as char))
            })?;
            salt_bits |= u32::from(value) << (6 * i);
        }

        // Each salt bit swaps a pair of expansion entries 24 positions apart.
        let mut expansion = EXPANSION;
        for bit in 0..12 {
            if salt_bits & (1 << bit) != 0 {
                expansion.swap(bit, bit + 24);
            }
        }

        let mut key = [0u8; 8];
        for (slot, &b) in key.iter_mut().zip(plain.iter()) {
            *slot = b << 1;
        }

        let des = Des::new(key);
        let mut block = 0u64;
        for _ in 0..25 {
            block = des.encrypt_block_with(block, &expansion);
        }

        // 64 hash bits padded with two zero bits form eleven characters.
        let bits = u128::from(block) << 2;
        let mut out = Vec::with_capacity(ENCODED_LEN);
        out.extend_from_slice(&salt);
        for i in 0..11 {
            out.push(ALPHABET[((bits >> (60 - 6 * i)) & 0x3f) as usize]);
        }
        Ok(out)
    }
}

impl Encoder for UnixCrypt {
    fn id(&self) -> &str {
        Self::ID
    }

    fn encode(&self, plain: &[u8], salt: Option<&[u8]>, _secret: Option<&[u8]>) -> Result<Vec<u8>> {
        let salt = match salt {
            Some(s) if s.len() >= 2 => [s[0], s[1]],
            Some(s) => {
                return Err(EncodingError::invalid_salt(
                    Self::ID,
                    format!("salt too short: {} of 2 characters", s.len()),
                ));
            }
            None => {
                let s = random_salt(ALPHABET, 2);
                [s[0], s[1]]
            }
        };
        Self::crypt(plain, salt)
    }

    fn matches(&self, encoded: &[u8], plain: &[u8], _secret: Option<&[u8]>) -> Result<bool> {
        if !self.is_of_type(encoded) {
            return Ok(false);
        }
        let computed = Self::crypt(plain, [encoded[0], encoded[1]])?;
        Ok(constant_time_eq(&computed, encoded))
    }

    fn is_of_type(&self, encoded: &[u8]) -> bool {
        encoded.len() == ENCODED_LEN && radix64::is_radix64(encoded)
    }
}
