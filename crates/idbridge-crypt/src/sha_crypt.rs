//! SHA-256 and SHA-512 based `crypt(3)` (`$5$` and `$6$`)
//!
//! Stored form: `$5$[rounds=N$]<salt>$<hash>`. The salt holds at most 16
//! characters, `rounds` is clamped to `1000..=999_999_999` and defaults to
//! 5000. The `rounds=` clause is emitted only when rounds were requested
//! explicitly.

use crate::encoder::{Encoder, constant_time_eq, random_salt};
use crate::error::{EncodingError, Result};
use crate::radix64::{self, ALPHABET, ZERO};
use sha2::{Digest, Sha256, Sha512};

const ROUNDS_PREFIX: &[u8] = b"rounds=";
const MAX_SALT_LEN: usize = 16;

/// Default number of rounds
pub const DEFAULT_ROUNDS: u32 = 5000;
/// Smallest accepted number of rounds
pub const MIN_ROUNDS: u32 = 1000;
/// Largest accepted number of rounds
pub const MAX_ROUNDS: u32 = 999_999_999;

const SHA256_ORDER: [(usize, usize, usize, usize); 11] = [
    (0, 10, 20, 4),
    (21, 1, 11, 4),
    (12, 22, 2, 4),
    (3, 13, 23, 4),
    (24, 4, 14, 4),
    (15, 25, 5, 4),
    (6, 16, 26, 4),
    (27, 7, 17, 4),
    (18, 28, 8, 4),
    (9, 19, 29, 4),
    (ZERO, 31, 30, 3),
];

const SHA512_ORDER: [(usize, usize, usize, usize); 22] = [
    (0, 21, 42, 4),
    (22, 43, 1, 4),
    (44, 2, 23, 4),
    (3, 24, 45, 4),
    (25, 46, 4, 4),
    (47, 5, 26, 4),
    (6, 27, 48, 4),
    (28, 49, 7, 4),
    (50, 8, 29, 4),
    (9, 30, 51, 4),
    (31, 52, 10, 4),
    (53, 11, 32, 4),
    (12, 33, 54, 4),
    (34, 55, 13, 4),
    (56, 14, 35, 4),
    (15, 36, 57, 4),
    (37, 58, 16, 4),
    (59, 17, 38, 4),
    (18, 39, 60, 4),
    (40, 61, 19, 4),
    (62, 20, 41, 4),
    (ZERO, ZERO, 63, 2),
];

/// Which digest drives the algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaVariant {
    Sha256,
    Sha512,
}

impl ShaVariant {
    const fn magic(self) -> &'static [u8] {
        match self {
            Self::Sha256 => b"$5$",
            Self::Sha512 => b"$6$",
        }
    }

    const fn id(self) -> &'static str {
        match self {
            Self::Sha256 => "SHA256CRYPT",
            Self::Sha512 => "SHA512CRYPT",
        }
    }

    const fn hash_len(self) -> usize {
        match self {
            Self::Sha256 => 43,
            Self::Sha512 => 86,
        }
    }
}

/// Salt and rounds parsed from a salt argument or stored hash
struct Setting<'a> {
    salt: &'a [u8],
    rounds: u32,
    explicit_rounds: bool,
}

/// SHA-crypt encoder
#[derive(Debug, Clone, Copy)]
pub struct ShaCrypt {
    variant: ShaVariant,
    rounds: u32,
}

impl ShaCrypt {
    /// Create an encoder with the default rounds
    #[must_use]
    pub const fn new(variant: ShaVariant) -> Self {
        Self {
            variant,
            rounds: DEFAULT_ROUNDS,
        }
    }

    /// Create a SHA-256 encoder
    #[must_use]
    pub const fn sha256() -> Self {
        Self::new(ShaVariant::Sha256)
    }

    /// Create a SHA-512 encoder
    #[must_use]
    pub const fn sha512() -> Self {
        Self::new(ShaVariant::Sha512)
    }

    /// Set the rounds used when a salt does not carry its own
    #[must_use]
    pub const fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = clamp_rounds(rounds as u64);
        self
    }

    fn parse_setting<'a>(&self, salt: &'a [u8]) -> Result<Setting<'a>> {
        let mut rest = salt.strip_prefix(self.variant.magic()).unwrap_or(salt);
        let mut rounds = self.rounds;
        let mut explicit_rounds = self.rounds != DEFAULT_ROUNDS;

        if let Some(spec) = rest.strip_prefix(ROUNDS_PREFIX) {
            let end = spec.iter().position(|&c| c == b'$').ok_or_else(|| {
                EncodingError::invalid_salt(self.variant.id(), "rounds clause not terminated by $")
            })?;
            let digits = std::str::from_utf8(&spec[..end])
                .ok()
                .filter(|d| !d.is_empty() && d.bytes().all(|c| c.is_ascii_digit()))
                .ok_or_else(|| EncodingError::invalid_salt(self.variant.id(), "rounds is not a number"))?;
            let requested = digits.parse::<u64>().unwrap_or(u64::MAX);
            rounds = clamp_rounds(requested);
            explicit_rounds = true;
            rest = &spec[end + 1..];
        }

        let end = rest
            .iter()
            .position(|&c| c == b'$')
            .unwrap_or(rest.len())
            .min(MAX_SALT_LEN);
        Ok(Setting {
            salt: &rest[..end],
            rounds,
            explicit_rounds,
        })
    }

    fn crypt(&self, plain: &[u8], setting: &Setting<'_>) -> Vec<u8> {
        let (digest, order): (Vec<u8>, &[(usize, usize, usize, usize)]) = match self.variant {
            ShaVariant::Sha256 => (
                sha_crypt_digest::<Sha256>(plain, setting.salt, setting.rounds),
                &SHA256_ORDER,
            ),
            ShaVariant::Sha512 => (
                sha_crypt_digest::<Sha512>(plain, setting.salt, setting.rounds),
                &SHA512_ORDER,
            ),
        };

        let mut out = Vec::with_capacity(32 + self.variant.hash_len());
        out.extend_from_slice(self.variant.magic());
        if setting.explicit_rounds {
            out.extend_from_slice(format!("rounds={}$", setting.rounds).as_bytes());
        }
        out.extend_from_slice(setting.salt);
        out.push(b'$');
        radix64::encode_permuted(&mut out, &digest, order);
        out
    }
}

const fn clamp_rounds(rounds: u64) -> u32 {
    if rounds < MIN_ROUNDS as u64 {
        MIN_ROUNDS
    } else if rounds > MAX_ROUNDS as u64 {
        MAX_ROUNDS
    } else {
        rounds as u32
    }
}

/// The digest mixing shared by both variants
fn sha_crypt_digest<D: Digest>(plain: &[u8], salt: &[u8], rounds: u32) -> Vec<u8> {
    let block = <D as Digest>::output_size();

    let alternate = D::new()
        .chain_update(plain)
        .chain_update(salt)
        .chain_update(plain)
        .finalize();

    let mut ctx = D::new().chain_update(plain).chain_update(salt);
    let mut remaining = plain.len();
    while remaining > block {
        ctx.update(&alternate);
        remaining -= block;
    }
    ctx.update(&alternate[..remaining]);
    let mut bits = plain.len();
    while bits > 0 {
        if bits & 1 == 0 {
            ctx.update(plain);
        } else {
            ctx.update(&alternate);
        }
        bits >>= 1;
    }
    let mut digest = ctx.finalize();

    let mut ctx = D::new();
    for _ in 0..plain.len() {
        ctx.update(plain);
    }
    let plain_digest = ctx.finalize();
    let p_bytes: Vec<u8> = (0..plain.len()).map(|i| plain_digest[i % block]).collect();

    let mut ctx = D::new();
    for _ in 0..16 + usize::from(digest[0]) {
        ctx.update(salt);
    }
    let salt_digest = ctx.finalize();
    let s_bytes: Vec<u8> = (0..salt.len()).map(|i| salt_digest[i % block]).collect();

    for round in 0..rounds {
        let mut ctx = D::new();
        if round & 1 == 0 {
            ctx.update(&digest);
        } else {
            ctx.update(&p_bytes);
        }
        if round % 3 != 0 {
            ctx.update(&s_bytes);
        }
        if round % 7 != 0 {
            ctx.update(&p_bytes);
        }
        if round & 1 == 0 {
            ctx.update(&p_bytes);
        } else {
            ctx.update(&digest);
        }
        digest = ctx.finalize();
    }

    digest.to_vec()
}

impl Encoder for ShaCrypt {
    fn id(&self) -> &str {
        self.variant.id()
    }

    fn encode(&self, plain: &[u8], salt: Option<&[u8]>, _secret: Option<&[u8]>) -> Result<Vec<u8>> {
        let generated;
        let salt = match salt {
            Some(s) => s,
            None => {
                generated = random_salt(ALPHABET, MAX_SALT_LEN);
                &generated
            }
        };
        let setting = self.parse_setting(salt)?;
        Ok(self.crypt(plain, &setting))
    }

    fn matches(&self, encoded: &[u8], plain: &[u8], _secret: Option<&[u8]>) -> Result<bool> {
        if !encoded.starts_with(self.variant.magic()) {
            return Err(EncodingError::malformed(self.id(), "wrong prefix"));
        }
        // Stored hashes always state their rounds; absence means the default.
        let setting = self.parse_setting(encoded)?;
        let setting = if encoded[3..].starts_with(ROUNDS_PREFIX) {
            setting
        } else {
            Setting {
                rounds: DEFAULT_ROUNDS,
                explicit_rounds: false,
                ..setting
            }
        };
        let computed = self.crypt(plain, &setting);
        Ok(constant_time_eq(&computed, encoded))
    }

    fn is_of_type(&self, encoded: &[u8]) -> bool {
        let Some(mut rest) = encoded.strip_prefix(self.variant.magic()) else {
            return false;
        };
        if let Some(spec) = rest.strip_prefix(ROUNDS_PREFIX) {
            match spec.iter().position(|&c| c == b'$') {
                Some(end) if end > 0 && spec[..end].iter().all(u8::is_ascii_digit) => {
                    rest = &spec[end + 1..];
                }
                _ => return false,
            }
        }
        let Some(sep) = rest.iter().position(|&c| c == b'$') else {
            return false;
        };
        let hash = &rest[sep + 1..];
        sep <= MAX_SALT_LEN && hash.len() == self.variant.hash_len() && radix64::is_radix64(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha512_reference_vector() {
        let stored = b"$6$rounds=5000$usesomesillystri$D4IrlXatmP7rx3P3InaxBeoomnAihCKRVQP22JZ6EY47Wc6BkroIuUUBOov1i.S5KPgErtP/EN5mcO.ChWQW21";
        assert!(ShaCrypt::sha512().is_of_type(stored));
        assert!(ShaCrypt::sha512().matches(stored, b"rasmuslerdorf", None).unwrap());
        assert!(!ShaCrypt::sha512().matches(stored, b"rasmuslerdorg", None).unwrap());
    }

    #[test]
    fn test_sha256_reference_vector() {
        let stored = b"$5$rounds=5000$usesomesillystri$KqJWpanXZHKq2BOB43TSaYhEWsQ1Lr5QNyPCDH/Tp.6";
        let hash = ShaCrypt::sha256()
            .encode(b"rasmuslerdorf", Some(b"$5$rounds=5000$usesomesillystringforsalt$"), None)
            .unwrap();
        assert_eq!(hash, stored);
        assert!(ShaCrypt::sha256().matches(stored, b"rasmuslerdorf", None).unwrap());
    }

    #[test]
    fn test_deterministic_with_fixed_salt() {
        let encoder = ShaCrypt::sha512();
        let a = encoder.encode(b"pw", Some(b"abc"), None).unwrap();
        let b = encoder.encode(b"pw", Some(b"abc"), None).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with(b"$6$abc$"));
    }

    #[test]
    fn test_rounds_clamped_and_emitted() {
        let hash = ShaCrypt::sha256()
            .encode(b"pw", Some(b"rounds=10$salt"), None)
            .unwrap();
        assert!(hash.starts_with(b"$5$rounds=1000$salt$"));
        assert!(ShaCrypt::sha256().matches(&hash, b"pw", None).unwrap());

        let tuned = ShaCrypt::sha256().with_rounds(2000);
        let hash = tuned.encode(b"pw", None, None).unwrap();
        assert!(hash.starts_with(b"$5$rounds=2000$"));
        assert!(ShaCrypt::sha256().matches(&hash, b"pw", None).unwrap());
    }

    #[test]
    fn test_random_salt_roundtrip() {
        let encoder = ShaCrypt::sha512();
        let hash = encoder.encode(b"correct horse", None, None).unwrap();
        assert!(encoder.is_of_type(&hash));
        assert!(encoder.matches(&hash, b"correct horse", None).unwrap());
        assert!(!encoder.matches(&hash, b"battery staple", None).unwrap());
    }

    #[test]
    fn test_malformed_rounds() {
        assert!(ShaCrypt::sha256().encode(b"pw", Some(b"rounds=abc$salt"), None).is_err());
        assert!(ShaCrypt::sha256().encode(b"pw", Some(b"rounds=5000"), None).is_err());
        assert!(!ShaCrypt::sha512().is_of_type(b"$5$salt$abc"));
    }
}
