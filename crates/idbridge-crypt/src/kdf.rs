//! Password-based key derivation (PBKDF1-MD5 and PBKDF2-HMAC-SHA1)

use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Derive `len` bytes with PBKDF2 using HMAC-SHA1
#[must_use]
pub fn pbkdf2_hmac_sha1(password: &[u8], salt: &[u8], iterations: u32, len: usize) -> Vec<u8> {
    // HMAC accepts keys of any length.
    let Ok(prf) = HmacSha1::new_from_slice(password) else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(len);
    let mut block_index = 1u32;
    while out.len() < len {
        let mut mac = prf.clone();
        mac.update(salt);
        mac.update(&block_index.to_be_bytes());
        let mut u = mac.finalize().into_bytes();
        let mut t = u;

        for _ in 1..iterations {
            let mut mac = prf.clone();
            mac.update(&u);
            u = mac.finalize().into_bytes();
            for (acc, b) in t.iter_mut().zip(u.iter()) {
                *acc ^= b;
            }
        }

        let take = (len - out.len()).min(t.len());
        out.extend_from_slice(&t[..take]);
        block_index += 1;
    }
    out
}

/// Derive a DES key and IV with PBKDF1 using MD5
///
/// Returns `(key, iv)`, the two halves of the final 16-byte digest.
#[must_use]
pub fn pbkdf1_md5(password: &[u8], salt: &[u8], iterations: u32) -> ([u8; 8], [u8; 8]) {
    let mut ctx = md5::Context::new();
    ctx.consume(password);
    ctx.consume(salt);
    let mut digest = ctx.compute();
    for _ in 1..iterations {
        digest = md5::compute(digest.0);
    }

    let mut key = [0u8; 8];
    let mut iv = [0u8; 8];
    key.copy_from_slice(&digest.0[..8]);
    iv.copy_from_slice(&digest.0[8..]);
    (key, iv)
}
