//! Passphrase-based AES with a self-describing header
//!
//! The key is derived with PBKDF2-HMAC-SHA1 from the passphrase, a salt and
//! an iteration count. Encryption is CBC with a zero IV and PKCS#5 padding.
//! Every encoded value starts with a big-endian header:
//!
//! ```text
//! u16 key bits | u16 0 | u32 iterations | u16 salt length | salt | ciphertext
//! ```
//!
//! Older values carry a non-zero u16 iteration count in place of the
//! `0 + u32` pair; those still decode.

use crate::encoder::{Encoder, random_bytes};
use crate::error::{EncodingError, Result};
use crate::kdf::pbkdf2_hmac_sha1;
use ::aes::cipher::generic_array::GenericArray;
use ::aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use ::aes::{Aes128, Aes192, Aes256};

const BLOCK: usize = 16;

/// Default PBKDF2 iteration count
pub const DEFAULT_ITERATIONS: u32 = 1000;
/// Default salt length in bytes
pub const DEFAULT_SALT_LEN: usize = 16;

/// AES key size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySize {
    Aes128,
    Aes192,
    Aes256,
}

impl KeySize {
    /// Key length in bits
    #[must_use]
    pub const fn bits(self) -> u16 {
        match self {
            Self::Aes128 => 128,
            Self::Aes192 => 192,
            Self::Aes256 => 256,
        }
    }

    const fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    const fn id(self) -> &'static str {
        match self {
            Self::Aes128 => "AES128",
            Self::Aes192 => "AES192",
            Self::Aes256 => "AES256",
        }
    }

    /// All sizes, smallest first
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::Aes128, Self::Aes192, Self::Aes256]
    }
}

enum BlockCipher {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl BlockCipher {
    fn new(size: KeySize, key: &[u8]) -> Result<Self> {
        let cipher = match size {
            KeySize::Aes128 => Aes128::new_from_slice(key).map(Self::Aes128),
            KeySize::Aes192 => Aes192::new_from_slice(key).map(Self::Aes192),
            KeySize::Aes256 => Aes256::new_from_slice(key).map(Self::Aes256),
        };
        cipher.map_err(|e| EncodingError::Cipher(e.to_string()))
    }

    fn encrypt(&self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            Self::Aes128(c) => c.encrypt_block(block),
            Self::Aes192(c) => c.encrypt_block(block),
            Self::Aes256(c) => c.encrypt_block(block),
        }
    }

    fn decrypt(&self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            Self::Aes128(c) => c.decrypt_block(block),
            Self::Aes192(c) => c.decrypt_block(block),
            Self::Aes256(c) => c.decrypt_block(block),
        }
    }
}

/// Decoded header of an encoded value
#[derive(Debug, PartialEq, Eq)]
struct Header<'a> {
    bits: u16,
    iterations: u32,
    salt: &'a [u8],
    ciphertext: &'a [u8],
}

fn read_u16(data: &[u8], at: usize) -> Option<u16> {
    data.get(at..at + 2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

fn parse_header(data: &[u8]) -> Option<Header<'_>> {
    let bits = read_u16(data, 0)?;
    let marker = read_u16(data, 2)?;
    let (iterations, mut pos) = if marker == 0 {
        let b = data.get(4..8)?;
        (u32::from_be_bytes([b[0], b[1], b[2], b[3]]), 8)
    } else {
        (u32::from(marker), 4)
    };
    let salt_len = usize::from(read_u16(data, pos)?);
    pos += 2;
    let salt = data.get(pos..pos + salt_len)?;
    Some(Header {
        bits,
        iterations,
        salt,
        ciphertext: &data[pos + salt_len..],
    })
}

/// AES encoder for one key size
#[derive(Debug, Clone)]
pub struct AesEncoder {
    size: KeySize,
    iterations: u32,
    passphrase: Option<Vec<u8>>,
}

impl AesEncoder {
    /// Create an encoder with default iterations and no default passphrase
    #[must_use]
    pub const fn new(size: KeySize) -> Self {
        Self {
            size,
            iterations: DEFAULT_ITERATIONS,
            passphrase: None,
        }
    }

    /// Set the PBKDF2 iteration count for new values
    #[must_use]
    pub const fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Passphrase used when a call supplies no secret
    #[must_use]
    pub fn with_passphrase(mut self, passphrase: impl Into<Vec<u8>>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    fn passphrase<'a>(&'a self, secret: Option<&'a [u8]>) -> Result<&'a [u8]> {
        secret
            .or(self.passphrase.as_deref())
            .ok_or_else(|| EncodingError::MissingSecret(self.size.id().to_string()))
    }

    fn cipher(&self, passphrase: &[u8], salt: &[u8], iterations: u32) -> Result<BlockCipher> {
        let key = pbkdf2_hmac_sha1(passphrase, salt, iterations, self.size.bytes());
        BlockCipher::new(self.size, &key)
    }
}

impl Encoder for AesEncoder {
    fn id(&self) -> &str {
        self.size.id()
    }

    fn encode(&self, plain: &[u8], salt: Option<&[u8]>, secret: Option<&[u8]>) -> Result<Vec<u8>> {
        let passphrase = self.passphrase(secret)?;
        let salt = salt.map_or_else(|| random_bytes(DEFAULT_SALT_LEN), <[u8]>::to_vec);
        let salt_len = u16::try_from(salt.len())
            .map_err(|_| EncodingError::invalid_salt(self.id(), "salt longer than 65535 bytes"))?;
        let cipher = self.cipher(passphrase, &salt, self.iterations)?;

        let pad = BLOCK - plain.len() % BLOCK;
        let mut body = Vec::with_capacity(plain.len() + pad);
        body.extend_from_slice(plain);
        body.resize(plain.len() + pad, u8::try_from(pad).unwrap_or(16));

        let mut previous = [0u8; BLOCK];
        for block in body.chunks_exact_mut(BLOCK) {
            for (b, p) in block.iter_mut().zip(previous.iter()) {
                *b ^= p;
            }
            cipher.encrypt(block);
            previous.copy_from_slice(block);
        }

        let mut out = Vec::with_capacity(10 + salt.len() + body.len());
        out.extend_from_slice(&self.size.bits().to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&self.iterations.to_be_bytes());
        out.extend_from_slice(&salt_len.to_be_bytes());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&body);
        Ok(out)
    }

    fn decode(&self, encoded: &[u8], secret: Option<&[u8]>) -> Result<Vec<u8>> {
        let header =
            parse_header(encoded).ok_or_else(|| EncodingError::malformed(self.id(), "truncated header"))?;
        if header.bits != self.size.bits() {
            return Err(EncodingError::malformed(
                self.id(),
                format!("key length {} bits", header.bits),
            ));
        }
        if header.ciphertext.is_empty() || header.ciphertext.len() % BLOCK != 0 {
            return Err(EncodingError::malformed(self.id(), "ciphertext is not whole blocks"));
        }

        let passphrase = self.passphrase(secret)?;
        let cipher = self.cipher(passphrase, header.salt, header.iterations)?;

        let mut plain = header.ciphertext.to_vec();
        let mut previous = [0u8; BLOCK];
        for block in plain.chunks_exact_mut(BLOCK) {
            let mut current = [0u8; BLOCK];
            current.copy_from_slice(block);
            cipher.decrypt(block);
            for (b, p) in block.iter_mut().zip(previous.iter()) {
                *b ^= p;
            }
            previous = current;
        }

        let pad = usize::from(plain[plain.len() - 1]);
        if pad == 0 || pad > BLOCK || !plain[plain.len() - pad..].iter().all(|&b| usize::from(b) == pad) {
            return Err(EncodingError::Cipher("bad padding (wrong passphrase?)".to_string()));
        }
        plain.truncate(plain.len() - pad);
        Ok(plain)
    }

    fn matches(&self, encoded: &[u8], plain: &[u8], secret: Option<&[u8]>) -> Result<bool> {
        match self.decode(encoded, secret) {
            Ok(decoded) => Ok(crate::encoder::constant_time_eq(&decoded, plain)),
            Err(EncodingError::Cipher(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn is_of_type(&self, encoded: &[u8]) -> bool {
        parse_header(encoded).is_some_and(|h| {
            h.bits == self.size.bits() && !h.ciphertext.is_empty() && h.ciphertext.len() % BLOCK == 0
        })
    }

    fn is_reversible(&self) -> bool {
        true
    }

    fn is_text(&self) -> bool {
        false
    }
}
