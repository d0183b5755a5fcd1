//! Encoder registry
//!
//! Maps algorithm identifiers to shared encoder instances and sniffs which
//! encoder produced a stored value. The registry is an ordinary value: the
//! caller builds one and hands it to whatever needs it.

use crate::aes_cipher::{self, AesEncoder, KeySize};
use crate::blowfish::{self, Bcrypt};
use crate::codec::{Base64Codec, HexCodec};
use crate::compound::CompoundEncoder;
use crate::encoder::Encoder;
use crate::error::{EncodingError, Result};
use crate::md5_crypt::Md5Crypt;
use crate::pbe::PbeWithMd5AndDes;
use crate::sha_crypt::{self, ShaCrypt};
use crate::unix_crypt::UnixCrypt;
use idbridge_common::Charset;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Tunables applied to the built-in encoders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderDefaults {
    /// Passphrase for AES and PBE when a call supplies no secret
    #[serde(default)]
    pub passphrase: Option<String>,

    /// PBKDF2 iterations for new AES values
    #[serde(default = "default_aes_iterations")]
    pub aes_iterations: u32,

    /// bcrypt work factor
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,

    /// SHA-crypt rounds
    #[serde(default = "default_sha_rounds")]
    pub sha_rounds: u32,
}

const fn default_aes_iterations() -> u32 {
    aes_cipher::DEFAULT_ITERATIONS
}

const fn default_bcrypt_cost() -> u32 {
    blowfish::DEFAULT_COST
}

const fn default_sha_rounds() -> u32 {
    sha_crypt::DEFAULT_ROUNDS
}

impl Default for EncoderDefaults {
    fn default() -> Self {
        Self {
            passphrase: None,
            aes_iterations: default_aes_iterations(),
            bcrypt_cost: default_bcrypt_cost(),
            sha_rounds: default_sha_rounds(),
        }
    }
}

/// Registry of encoders keyed by upper-case identifier
#[derive(Clone, Default)]
pub struct EncoderRegistry {
    encoders: Vec<Arc<dyn Encoder>>,
    by_id: HashMap<String, usize>,
}

impl std::fmt::Debug for EncoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderRegistry").field("ids", &self.ids()).finish()
    }
}

impl EncoderRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in encoder with default tunables
    #[must_use]
    pub fn new() -> Self {
        Self::with_defaults(&EncoderDefaults::default()).unwrap_or_default()
    }

    /// Create a registry holding every built-in encoder
    ///
    /// Registration order is sniff order: self-describing crypt formats
    /// first, permissive binary formats last.
    pub fn with_defaults(defaults: &EncoderDefaults) -> Result<Self> {
        let passphrase = defaults.passphrase.as_deref().map(str::as_bytes);
        let mut registry = Self::empty();

        registry.register(Arc::new(Md5Crypt));
        registry.register(Arc::new(ShaCrypt::sha256().with_rounds(defaults.sha_rounds)));
        registry.register(Arc::new(ShaCrypt::sha512().with_rounds(defaults.sha_rounds)));
        registry.register(Arc::new(Bcrypt::with_cost(defaults.bcrypt_cost)?));
        registry.register(Arc::new(UnixCrypt));

        let mut raw_aes: Vec<Arc<dyn Encoder>> = Vec::new();
        for size in KeySize::all() {
            let mut aes = AesEncoder::new(size).with_iterations(defaults.aes_iterations);
            if let Some(p) = passphrase {
                aes = aes.with_passphrase(p);
            }
            let aes: Arc<dyn Encoder> = Arc::new(aes);
            registry.register(Arc::clone(&aes));
            raw_aes.push(aes);
        }
        for aes in &raw_aes {
            let hex: Arc<dyn Encoder> = Arc::new(HexCodec);
            registry.register(Arc::new(CompoundEncoder::new(
                format!("{}HEX", aes.id()),
                vec![Arc::clone(aes), hex],
            )?));
        }
        for aes in &raw_aes {
            let base64: Arc<dyn Encoder> = Arc::new(Base64Codec);
            registry.register(Arc::new(CompoundEncoder::new(
                format!("{}BASE64", aes.id()),
                vec![Arc::clone(aes), base64],
            )?));
        }

        let mut pbe = PbeWithMd5AndDes::new();
        if let Some(p) = passphrase {
            pbe = pbe.with_passphrase(p);
        }
        let pbe: Arc<dyn Encoder> = Arc::new(pbe);
        let base64: Arc<dyn Encoder> = Arc::new(Base64Codec);
        registry.register(Arc::new(CompoundEncoder::new(
            "PBEWITHMD5ANDDESBASE64",
            vec![Arc::clone(&pbe), base64],
        )?));

        registry.register(Arc::new(Base64Codec));
        registry.register(Arc::new(HexCodec));
        registry.register(pbe);

        Ok(registry)
    }

    /// Add an encoder, replacing any encoder with the same identifier in place
    pub fn register(&mut self, encoder: Arc<dyn Encoder>) {
        let id = encoder.id().to_ascii_uppercase();
        if let Some(&index) = self.by_id.get(&id) {
            self.encoders[index] = encoder;
        } else {
            self.by_id.insert(id, self.encoders.len());
            self.encoders.push(encoder);
        }
    }

    /// Look up an encoder; identifiers are case-insensitive
    pub fn get(&self, id: &str) -> Result<Arc<dyn Encoder>> {
        self.by_id
            .get(&id.to_ascii_uppercase())
            .map(|&i| Arc::clone(&self.encoders[i]))
            .ok_or_else(|| EncodingError::UnknownAlgorithm(id.to_string()))
    }

    /// Whether an identifier is registered
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(&id.to_ascii_uppercase())
    }

    /// Registered identifiers in sniff order
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.encoders.iter().map(|e| e.id()).collect()
    }

    /// First registered encoder whose format matches `encoded`
    #[must_use]
    pub fn find_by_type(&self, encoded: &[u8]) -> Option<Arc<dyn Encoder>> {
        self.encoders
            .iter()
            .find(|e| e.is_of_type(encoded))
            .map(Arc::clone)
    }

    /// Verify `plain` against a stored value of unknown algorithm
    ///
    /// Returns false when no registered encoder recognises the value.
    pub fn verify(&self, encoded: &[u8], plain: &[u8], secret: Option<&[u8]>) -> Result<bool> {
        let Some(encoder) = self.find_by_type(encoded) else {
            tracing::debug!("No encoder recognises stored value");
            return Ok(false);
        };
        tracing::debug!("Verifying with sniffed encoder {}", encoder.id());
        encoder.matches(encoded, plain, secret)
    }

    /// Encode text, returning text
    ///
    /// Fails with `Unsupported` for encoders with binary output.
    pub fn encode_str(
        &self,
        id: &str,
        plain: &str,
        salt: Option<&str>,
        secret: Option<&str>,
        charset: Charset,
    ) -> Result<String> {
        let encoder = self.get(id)?;
        if !encoder.is_text() {
            return Err(EncodingError::unsupported(encoder.id(), "text output"));
        }
        let plain = charset.encode(plain)?;
        let salt = salt.map(|s| charset.encode(s)).transpose()?;
        let secret = secret.map(|s| charset.encode(s)).transpose()?;
        let encoded = encoder.encode(&plain, salt.as_deref(), secret.as_deref())?;
        Ok(Charset::Ascii.decode(&encoded)?)
    }

    /// Decode a text value back to text
    pub fn decode_str(&self, id: &str, encoded: &str, secret: Option<&str>, charset: Charset) -> Result<String> {
        let encoder = self.get(id)?;
        let secret = secret.map(|s| charset.encode(s)).transpose()?;
        let plain = encoder.decode(encoded.as_bytes(), secret.as_deref())?;
        Ok(charset.decode(&plain)?)
    }

    /// Check text against a text value
    pub fn matches_str(
        &self,
        id: &str,
        encoded: &str,
        plain: &str,
        secret: Option<&str>,
        charset: Charset,
    ) -> Result<bool> {
        let encoder = self.get(id)?;
        let plain = charset.encode(plain)?;
        let secret = secret.map(|s| charset.encode(s)).transpose()?;
        encoder.matches(encoded.as_bytes(), &plain, secret.as_deref())
    }
}
