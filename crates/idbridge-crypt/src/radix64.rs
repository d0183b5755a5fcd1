//! The `./0-9A-Za-z` radix-64 alphabet shared by the Unix crypt family

/// Crypt radix-64 alphabet
pub const ALPHABET: &[u8; 64] = b"./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Value of a radix-64 character
#[must_use]
pub const fn index_of(c: u8) -> Option<u8> {
    match c {
        b'.' => Some(0),
        b'/' => Some(1),
        b'0'..=b'9' => Some(c - b'0' + 2),
        b'A'..=b'Z' => Some(c - b'A' + 12),
        b'a'..=b'z' => Some(c - b'a' + 38),
        _ => None,
    }
}

/// Check that every byte belongs to the alphabet
#[must_use]
pub fn is_radix64(bytes: &[u8]) -> bool {
    bytes.iter().all(|&c| index_of(c).is_some())
}

/// Append `n` characters encoding a 24-bit group, least significant first
pub fn push_24bit(out: &mut Vec<u8>, b2: u8, b1: u8, b0: u8, n: usize) {
    let mut w = (u32::from(b2) << 16) | (u32::from(b1) << 8) | u32::from(b0);
    for _ in 0..n {
        out.push(ALPHABET[(w & 0x3f) as usize]);
        w >>= 6;
    }
}

/// Placeholder index standing for a zero byte in a permutation table
pub const ZERO: usize = usize::MAX;

/// Encode a digest by visiting byte triples in the given order
///
/// Each entry names the digest bytes that fill the high, middle and low
/// position of a 24-bit group, followed by the number of output characters.
pub fn encode_permuted(out: &mut Vec<u8>, digest: &[u8], order: &[(usize, usize, usize, usize)]) {
    let byte = |i: usize| if i == ZERO { 0 } else { digest[i] };
    for &(b2, b1, b0, n) in order {
        push_24bit(out, byte(b2), byte(b1), byte(b0), n);
    }
}
