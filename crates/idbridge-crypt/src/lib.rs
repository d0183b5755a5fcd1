//! idbridge Crypt - Credential encoders
//!
//! This crate provides:
//! - The [`Encoder`] abstraction shared by every algorithm
//! - Unix `crypt(3)` ports: DES, MD5 (`$1$`), SHA-256/512 (`$5$`, `$6$`)
//! - bcrypt (`$2$`, `$2a$`, `$2b$`, `$2y$`)
//! - Passphrase-based AES (PBKDF2-HMAC-SHA1) and PBE with MD5 and DES
//! - Base64 and hex codecs, and compound pipelines built from them
//! - An [`EncoderRegistry`] that resolves identifiers and sniffs stored values
//!
//! # Example
//!
//! ```rust,ignore
//! use idbridge_crypt::EncoderRegistry;
//!
//! let registry = EncoderRegistry::new();
//! let hash = registry.get("SHA512CRYPT")?.encode(b"secret", None, None)?;
//! assert!(registry.verify(&hash, b"secret", None)?);
//! ```

pub mod aes_cipher;
pub mod blowfish;
pub mod codec;
pub mod compound;
pub mod des;
pub mod encoder;
pub mod error;
pub mod kdf;
pub mod md5_crypt;
pub mod pbe;
pub mod radix64;
pub mod registry;
pub mod sha_crypt;
pub mod unix_crypt;

pub use aes_cipher::{AesEncoder, KeySize};
pub use blowfish::Bcrypt;
pub use codec::{Base64Codec, HexCodec};
pub use compound::CompoundEncoder;
pub use encoder::{Encoder, constant_time_eq};
pub use error::{EncodingError, Result};
pub use md5_crypt::Md5Crypt;
pub use pbe::PbeWithMd5AndDes;
pub use registry::{EncoderDefaults, EncoderRegistry};
pub use sha_crypt::{ShaCrypt, ShaVariant};
pub use unix_crypt::UnixCrypt;
