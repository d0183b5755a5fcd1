//! Blowfish-based bcrypt (`$2$`, `$2a$`, `$2b$`, `$2y$`)
//!
//! Stored form: `$2a$NN$` followed by 22 salt characters and 31 hash
//! characters in bcrypt's own base-64 alphabet. New hashes use the `2a`
//! minor version unless the salt names another one.

use crate::encoder::{Encoder, constant_time_eq, random_bytes};
use crate::error::{EncodingError, Result};
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

/// bcrypt's unpadded base-64; the last salt character may carry stray bits
const BCRYPT_B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::BCRYPT,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::RequireNone)
        .with_decode_allow_trailing_bits(true),
);

/// Default work factor
pub const DEFAULT_COST: u32 = 10;
/// Smallest accepted work factor
pub const MIN_COST: u32 = 4;
/// Largest accepted work factor
pub const MAX_COST: u32 = 31;

const SALT_CHARS: usize = 22;
const HASH_CHARS: usize = 31;
const MAX_KEY_LEN: usize = 72;

/// Minor version letters that append a terminating NUL to the key
const NUL_TERMINATED: [u8; 3] = [b'a', b'b', b'y'];

/// Parsed `$2x$NN$salt` prefix
#[derive(Debug, Clone, Copy)]
struct Setting {
    minor: Option<u8>,
    cost: u32,
    salt: [u8; 16],
}

/// bcrypt encoder
#[derive(Debug, Clone, Copy)]
pub struct Bcrypt {
    cost: u32,
}

impl Default for Bcrypt {
    fn default() -> Self {
        Self::new()
    }
}

impl Bcrypt {
    /// Registry identifier
    pub const ID: &'static str = "BCRYPT";

    /// Create an encoder with the default cost
    #[must_use]
    pub const fn new() -> Self {
        Self { cost: DEFAULT_COST }
    }

    /// Create an encoder with the given cost
    pub fn with_cost(cost: u32) -> Result<Self> {
        check_cost(cost)?;
        Ok(Self { cost })
    }

    /// Configured cost
    #[must_use]
    pub const fn cost(&self) -> u32 {
        self.cost
    }

    /// Parse a full `$2a$NN$salt...` prefix or a bare 22-character salt
    fn parse_setting(&self, value: &[u8]) -> Result<Setting> {
        let (minor, cost, salt) = if let Some(rest) = value.strip_prefix(b"$2") {
            let (minor, rest) = match rest {
                [b'$', rest @ ..] => (None, rest),
                [m, b'$', rest @ ..] if NUL_TERMINATED.contains(m) => (Some(*m), rest),
                _ => return Err(EncodingError::invalid_salt(Self::ID, "unknown minor version")),
            };
            let (cost, rest) = match rest {
                [d1, d2, b'$', rest @ ..] if d1.is_ascii_digit() && d2.is_ascii_digit() => {
                    (u32::from(d1 - b'0') * 10 + u32::from(d2 - b'0'), rest)
                }
                _ => return Err(EncodingError::invalid_salt(Self::ID, "cost must be two digits")),
            };
            (minor, cost, rest)
        } else {
            (Some(b'a'), self.cost, value)
        };

        check_cost(cost)?;
        if salt.len() < SALT_CHARS {
            return Err(EncodingError::invalid_salt(
                Self::ID,
                format!("salt needs {SALT_CHARS} characters"),
            ));
        }
        let decoded = BCRYPT_B64
            .decode(&salt[..SALT_CHARS])
            .map_err(|e| EncodingError::invalid_salt(Self::ID, e.to_string()))?;
        let salt: [u8; 16] = decoded
            .try_into()
            .map_err(|_| EncodingError::invalid_salt(Self::ID, "salt must decode to 16 bytes"))?;

        Ok(Setting { minor, cost, salt })
    }

    fn crypt(plain: &[u8], setting: &Setting) -> Result<Vec<u8>> {
        let mut key = plain.to_vec();
        if setting.minor.is_some() {
            key.push(0);
        } else if key.is_empty() {
            return Err(EncodingError::invalid_salt(Self::ID, "$2$ cannot hash an empty key"));
        }
        key.truncate(MAX_KEY_LEN);

        let raw = ::bcrypt::bcrypt(setting.cost, setting.salt, &key);

        let mut out = String::with_capacity(60);
        out.push_str("$2");
        if let Some(minor) = setting.minor {
            out.push(char::from(minor));
        }
        out.push_str(&format!("${:02}$", setting.cost));
        out.push_str(&BCRYPT_B64.encode(setting.salt));
        out.push_str(&BCRYPT_B64.encode(&raw[..23]));
        Ok(out.into_bytes())
    }
}

fn check_cost(cost: u32) -> Result<()> {
    if (MIN_COST..=MAX_COST).contains(&cost) {
        Ok(())
    } else {
        Err(EncodingError::invalid_salt(
            Bcrypt::ID,
            format!("cost {cost} outside {MIN_COST}..={MAX_COST}"),
        ))
    }
}

impl Encoder for Bcrypt {
    fn id(&self) -> &str {
        Self::ID
    }

    fn encode(&self, plain: &[u8], salt: Option<&[u8]>, _secret: Option<&[u8]>) -> Result<Vec<u8>> {
        let setting = match salt {
            Some(s) => self.parse_setting(s)?,
            None => {
                let mut salt = [0u8; 16];
                salt.copy_from_slice(&random_bytes(16));
                Setting {
                    minor: Some(b'a'),
                    cost: self.cost,
                    salt,
                }
            }
        };
        Self::crypt(plain, &setting)
    }

    fn matches(&self, encoded: &[u8], plain: &[u8], _secret: Option<&[u8]>) -> Result<bool> {
        if encoded.is_empty() || encoded.starts_with(b"*") || encoded.starts_with(b"!") {
            return Ok(false);
        }
        if !encoded.starts_with(b"$2") {
            return Err(EncodingError::malformed(Self::ID, "missing $2 prefix"));
        }
        let setting = self.parse_setting(encoded)?;
        let computed = Self::crypt(plain, &setting)?;
        Ok(constant_time_eq(&computed, encoded))
    }

    fn is_of_type(&self, encoded: &[u8]) -> bool {
        if !encoded.starts_with(b"$2") {
            return false;
        }
        let Ok(setting) = self.parse_setting(encoded) else {
            return false;
        };
        let prefix_len = if setting.minor.is_some() { 7 } else { 6 };
        let tail = &encoded[prefix_len..];
        tail.len() == SALT_CHARS + HASH_CHARS && BCRYPT_B64.decode(&tail[SALT_CHARS..]).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_vector() {
        let stored = b"$2a$05$CCCCCCCCCCCCCCCCCCCCC.E5YPO9kmyuRGyh0XouQYb4YMJKvyOeW";
        assert!(Bcrypt::new().is_of_type(stored));
        assert!(Bcrypt::new().matches(stored, b"U*U", None).unwrap());
        assert!(!Bcrypt::new().matches(stored, b"U*V", None).unwrap());
    }

    #[test]
    fn test_salt_prefix_controls_cost() {
        let salt = b"$2a$05$CCCCCCCCCCCCCCCCCCCCC.";
        let hash = Bcrypt::new().encode(b"U*U", Some(salt), None).unwrap();
        assert_eq!(
            hash,
            b"$2a$05$CCCCCCCCCCCCCCCCCCCCC.E5YPO9kmyuRGyh0XouQYb4YMJKvyOeW".to_vec()
        );
    }

    #[test]
    fn test_random_salt_roundtrip() {
        let encoder = Bcrypt::with_cost(4).unwrap();
        let hash = encoder.encode(b"hunter2", None, None).unwrap();
        assert_eq!(hash.len(), 60);
        assert!(hash.starts_with(b"$2a$04$"));
        assert!(encoder.is_of_type(&hash));
        assert!(encoder.matches(&hash, b"hunter2", None).unwrap());
        assert!(!encoder.matches(&hash, b"hunter3", None).unwrap());
    }

    #[test]
    fn test_key_truncated_at_72_bytes() {
        let encoder = Bcrypt::with_cost(4).unwrap();
        let long_a = [b'a'; 80];
        let mut long_b = [b'a'; 80];
        long_b[79] = b'b';
        let hash = encoder.encode(&long_a, None, None).unwrap();
        assert!(encoder.matches(&hash, &long_b, None).unwrap());
    }

    #[test]
    fn test_disabled_markers_never_match() {
        assert!(!Bcrypt::new().matches(b"", b"", None).unwrap());
        assert!(!Bcrypt::new().matches(b"*", b"*", None).unwrap());
        assert!(!Bcrypt::new().matches(b"!$2a$04$x", b"x", None).unwrap());
    }

    #[test]
    fn test_invalid_cost() {
        assert!(Bcrypt::with_cost(3).is_err());
        assert!(Bcrypt::with_cost(32).is_err());
        assert!(Bcrypt::new()
            .encode(b"x", Some(b"$2a$99$CCCCCCCCCCCCCCCCCCCCC."), None)
            .is_err());
        assert!(!Bcrypt::new().is_of_type(b"$2x$05$CCCCCCCCCCCCCCCCCCCCC."));
    }

    #[test]
    fn test_minor_version_without_nul() {
        let salt = b"$2$04$CCCCCCCCCCCCCCCCCCCCC.";
        let hash = Bcrypt::new().encode(b"abc", Some(salt), None).unwrap();
        assert!(hash.starts_with(b"$2$04$"));
        assert!(Bcrypt::new().matches(&hash, b"abc", None).unwrap());
        assert!(Bcrypt::new().encode(b"", Some(salt), None).is_err());
    }
}
