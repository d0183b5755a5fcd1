//! The encoder abstraction
//!
//! An [`Encoder`] turns plaintext credentials into a stored form and tests a
//! plaintext against such a stored form. Encoders are stateless apart from
//! tunables fixed at construction, so one instance is shared by every caller.

use crate::error::{EncodingError, Result};
use rand::{Rng, RngCore};

/// Single-algorithm credential codec
pub trait Encoder: Send + Sync {
    /// Stable algorithm identifier
    fn id(&self) -> &str;

    /// Encode `plain`, using `salt` or a fresh random salt when `None`
    fn encode(&self, plain: &[u8], salt: Option<&[u8]>, secret: Option<&[u8]>) -> Result<Vec<u8>>;

    /// Recover the plaintext from an encoded value
    ///
    /// Only reversible algorithms implement this.
    fn decode(&self, encoded: &[u8], secret: Option<&[u8]>) -> Result<Vec<u8>> {
        let _ = (encoded, secret);
        Err(EncodingError::unsupported(self.id(), "decode"))
    }

    /// Check whether `plain` is the plaintext behind `encoded`
    ///
    /// The default decodes and compares, which suits reversible encoders.
    fn matches(&self, encoded: &[u8], plain: &[u8], secret: Option<&[u8]>) -> Result<bool> {
        let decoded = self.decode(encoded, secret)?;
        Ok(constant_time_eq(&decoded, plain))
    }

    /// Cheap format sniff: could `encoded` have been produced by this encoder?
    fn is_of_type(&self, encoded: &[u8]) -> bool;

    /// Whether [`Encoder::decode`] is supported
    fn is_reversible(&self) -> bool {
        false
    }

    /// Whether the encoded form is printable ASCII
    fn is_text(&self) -> bool {
        true
    }
}

/// Compare two byte strings without early exit on the first difference
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Generate `len` cryptographically random bytes
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Generate a random salt drawn from `alphabet`
#[must_use]
pub fn random_salt(alphabet: &[u8], len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_random_salt_alphabet() {
        let salt = random_salt(b"ab", 32);
        assert_eq!(salt.len(), 32);
        assert!(salt.iter().all(|c| *c == b'a' || *c == b'b'));
        assert_ne!(random_bytes(16), random_bytes(16));
    }
}
