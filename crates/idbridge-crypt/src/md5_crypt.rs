//! MD5-based `crypt(3)` (`$1$`)
//!
//! Stored form: `$1$<salt>$<22 hash characters>`, salt of at most eight
//! characters. The final digest is emitted in a fixed byte-interleaved
//! order that every compatible implementation reproduces exactly.

use crate::encoder::{Encoder, constant_time_eq, random_salt};
use crate::error::{EncodingError, Result};
use crate::radix64::{self, ALPHABET, ZERO};

const MAGIC: &[u8] = b"$1$";
const MAX_SALT_LEN: usize = 8;
const HASH_LEN: usize = 22;

/// Output byte order of the final digest
const ORDER: [(usize, usize, usize, usize); 6] = [
    (0, 6, 12, 4),
    (1, 7, 13, 4),
    (2, 8, 14, 4),
    (3, 9, 15, 4),
    (4, 10, 5, 4),
    (ZERO, ZERO, 11, 2),
];

/// MD5-crypt encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5Crypt;

impl Md5Crypt {
    /// Registry identifier
    pub const ID: &'static str = "MD5CRYPT";

    /// Create the encoder
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Extract the salt from a bare salt or a full `$1$salt$...` string
    fn parse_salt(salt: &[u8]) -> Result<&[u8]> {
        let salt = salt.strip_prefix(MAGIC).unwrap_or(salt);
        let end = salt
            .iter()
            .position(|&c| c == b'$')
            .unwrap_or(salt.len())
            .min(MAX_SALT_LEN);
        let salt = &salt[..end];
        if salt.is_empty() {
            return Err(EncodingError::invalid_salt(Self::ID, "salt too short"));
        }
        Ok(salt)
    }

    fn crypt(plain: &[u8], salt: &[u8]) -> Vec<u8> {
        let mut alternate = md5::Context::new();
        alternate.consume(plain);
        alternate.consume(salt);
        alternate.consume(plain);
        let alternate = alternate.compute();

        let mut ctx = md5::Context::new();
        ctx.consume(plain);
        ctx.consume(MAGIC);
        ctx.consume(salt);
        for chunk in plain.chunks(16) {
            ctx.consume(&alternate[..chunk.len()]);
        }
        let mut i = plain.len();
        while i > 0 {
            if i & 1 == 0 {
                ctx.consume(&plain[..1]);
            } else {
                ctx.consume([0u8]);
            }
            i >>= 1;
        }
        let mut digest = ctx.compute();

        for round in 0..1000 {
            let mut ctx = md5::Context::new();
            if round & 1 == 0 {
                ctx.consume(&digest[..]);
            } else {
                ctx.consume(plain);
            }
            if round % 3 != 0 {
                ctx.consume(salt);
            }
            if round % 7 != 0 {
                ctx.consume(plain);
            }
            if round & 1 == 0 {
                ctx.consume(plain);
            } else {
                ctx.consume(&digest[..]);
            }
            digest = ctx.compute();
        }

        let mut out = Vec::with_capacity(MAGIC.len() + salt.len() + 1 + HASH_LEN);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(salt);
        out.push(b'$');
        radix64::encode_permuted(&mut out, &digest[..], &ORDER);
        out
    }
}

impl Encoder for Md5Crypt {
    fn id(&self) -> &str {
        Self::ID
    }

    fn encode(&self, plain: &[u8], salt: Option<&[u8]>, _secret: Option<&[u8]>) -> Result<Vec<u8>> {
        let generated;
        let salt = match salt {
            Some(s) => Self::parse_salt(s)?,
            None => {
                generated = random_salt(ALPHABET, MAX_SALT_LEN);
                &generated
            }
        };
        Ok(Self::crypt(plain, salt))
    }

    fn matches(&self, encoded: &[u8], plain: &[u8], _secret: Option<&[u8]>) -> Result<bool> {
        let rest = encoded
            .strip_prefix(MAGIC)
            .ok_or_else(|| EncodingError::malformed(Self::ID, "missing $1$ prefix"))?;
        if !rest.contains(&b'$') {
            return Err(EncodingError::malformed(Self::ID, "missing $ after salt"));
        }
        let computed = Self::crypt(plain, Self::parse_salt(rest)?);
        Ok(constant_time_eq(&computed, encoded))
    }

    fn is_of_type(&self, encoded: &[u8]) -> bool {
        let Some(rest) = encoded.strip_prefix(MAGIC) else {
            return false;
        };
        let Some(sep) = rest.iter().position(|&c| c == b'$') else {
            return false;
        };
        let hash = &rest[sep + 1..];
        sep <= MAX_SALT_LEN && hash.len() == HASH_LEN && radix64::is_radix64(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE: &[u8] = b"$1$rasmusle$rISCgZzpwk3UhDidwXvin0";

    #[test]
    fn test_reference_vector() {
        let hash = Md5Crypt.encode(b"rasmuslerdorf", Some(b"rasmuslerdorf"), None).unwrap();
        assert_eq!(hash, REFERENCE);
        assert!(Md5Crypt.matches(REFERENCE, b"rasmuslerdorf", None).unwrap());
        assert!(!Md5Crypt.matches(REFERENCE, b"rasmuslerdorF", None).unwrap());
    }

    #[test]
    fn test_stored_hash_as_salt_is_deterministic() {
        let first = Md5Crypt.encode(b"hunter2", Some(b"$1$saltsalt$whatever"), None).unwrap();
        let second = Md5Crypt.encode(b"hunter2", Some(&first), None).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with(b"$1$saltsalt$"));
    }

    #[test]
    fn test_random_salt() {
        let hash = Md5Crypt.encode(b"", None, None).unwrap();
        assert!(Md5Crypt.is_of_type(&hash));
        assert!(Md5Crypt.matches(&hash, b"", None).unwrap());
        assert!(!Md5Crypt.matches(&hash, b"x", None).unwrap());
    }

    #[test]
    fn test_malformed() {
        assert!(Md5Crypt.encode(b"x", Some(b"$1$"), None).is_err());
        assert!(matches!(
            Md5Crypt.matches(b"$1$saltonly", b"x", None),
            Err(EncodingError::Malformed { .. })
        ));
        assert!(!Md5Crypt.is_of_type(b"$5$abc$def"));
    }
}
