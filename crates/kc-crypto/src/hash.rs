//! Hash functions.

use crate::algorithm::HashAlgorithm;
use aws_lc_rs::digest;

/// Computes a hash of the input data.
#[must_use]
pub fn hash(algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8> {
    let alg = match algorithm {
        HashAlgorithm::Sha256 => &digest::SHA256,
        HashAlgorithm::Sha384 => &digest::SHA384,
        HashAlgorithm::Sha512 => &digest::SHA512,
    };

    digest::digest(alg, data).as_ref().to_vec()
}

/// Computes a SHA-256 hash of the input data.
#[must_use]
pub fn sha256(data: &[u8]) -> Vec<u8> {
    hash(HashAlgorithm::Sha256, data)
}

/// Computes a SHA-384 hash of the input data.
#[must_use]
pub fn sha384(data: &[u8]) -> Vec<u8> {
    hash(HashAlgorithm::Sha384, data)
}

/// Computes a SHA-512 hash of the input data.
#[must_use]
pub fn sha512(data: &[u8]) -> Vec<u8> {
    hash(HashAlgorithm::Sha512, data)
}

/// Compares two byte strings without short-circuiting on the first
/// differing byte.
///
/// Lengths are not secret: slices of different length compare unequal
/// immediately.
#[must_use]
pub fn fixed_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        let result = sha256(b"abc");
        assert_eq!(result.len(), 32);
        assert_eq!(
            result[..4],
            [0xba, 0x78, 0x16, 0xbf],
            "SHA-256(\"abc\") starts with ba7816bf"
        );
    }

    #[test]
    fn sha384_produces_correct_length() {
        let result = sha384(b"test");
        assert_eq!(result.len(), 48);
    }

    #[test]
    fn sha512_produces_correct_length() {
        let result = sha512(b"test");
        assert_eq!(result.len(), 64);
    }

    #[test]
    fn different_inputs_produce_different_hashes() {
        let a = sha256(b"hello");
        let b = sha256(b"world");
        assert_ne!(a, b);
    }

    #[test]
    fn fixed_time_eq_compares_content() {
        assert!(fixed_time_eq(b"digest", b"digest"));
        assert!(!fixed_time_eq(b"digest", b"digesT"));
        assert!(!fixed_time_eq(b"digest", b"diges"));
        assert!(fixed_time_eq(b"", b""));
    }
}
