//! RSA key material.
//!
//! [`RsaPublicKey`] holds the public parameters used both for signature
//! verification and for structural key comparison. [`RsaPrivateKey`] wraps a
//! live aws-lc-rs key pair; its public half is exported on demand.

use std::fmt;

use aws_lc_rs::{
    rand::SystemRandom,
    signature::{self, KeyPair, RsaKeyPair},
};

use crate::legacy::LegacyRsaAlgorithm;
use crate::signature::SignatureError;

/// RSA public parameters as unsigned big-endian integers.
#[derive(Clone, PartialEq, Eq)]
pub struct RsaPublicKey {
    modulus: Vec<u8>,
    exponent: Vec<u8>,
}

impl RsaPublicKey {
    /// Creates a public key from raw modulus and exponent bytes.
    ///
    /// Leading zero bytes (ASN.1 INTEGER sign padding) are stripped so that
    /// equal keys always have equal byte representations.
    #[must_use]
    pub fn new(modulus: &[u8], exponent: &[u8]) -> Self {
        Self {
            modulus: strip_leading_zeros(modulus).to_vec(),
            exponent: strip_leading_zeros(exponent).to_vec(),
        }
    }

    /// Parses a DER-encoded RSA public key.
    ///
    /// Accepts both `SubjectPublicKeyInfo` and PKCS#1 `RSAPublicKey`.
    ///
    /// # Errors
    ///
    /// Returns an error if the DER is not an RSA public key.
    pub fn from_der(der: &[u8]) -> Result<Self, SignatureError> {
        let (n, e) = extract_rsa_components(der)?;
        Ok(Self::new(&n, &e))
    }

    /// Returns the modulus bytes.
    #[must_use]
    pub fn modulus(&self) -> &[u8] {
        &self.modulus
    }

    /// Returns the public exponent bytes.
    #[must_use]
    pub fn exponent(&self) -> &[u8] {
        &self.exponent
    }

    /// Returns the modulus size in bits.
    #[must_use]
    pub fn modulus_bits(&self) -> usize {
        let Some(first) = self.modulus.first() else {
            return 0;
        };
        (self.modulus.len() - 1) * 8 + (8 - first.leading_zeros() as usize)
    }
}

impl fmt::Debug for RsaPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaPublicKey")
            .field("bits", &self.modulus_bits())
            .finish_non_exhaustive()
    }
}

/// RSA private key for signing.
pub struct RsaPrivateKey {
    key_pair: RsaKeyPair,
}

impl RsaPrivateKey {
    /// Creates a key from PKCS#8 DER.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid.
    pub fn from_pkcs8(pkcs8_der: &[u8]) -> Result<Self, SignatureError> {
        let key_pair = RsaKeyPair::from_pkcs8(pkcs8_der)
            .map_err(|e| SignatureError::InvalidKey(format!("Invalid RSA PKCS#8 key: {e}")))?;
        Ok(Self { key_pair })
    }

    /// Creates a key from DER in either PKCS#1 (`RSAPrivateKey`) or PKCS#8
    /// form.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid in both encodings.
    pub fn from_der(der: &[u8]) -> Result<Self, SignatureError> {
        let key_pair = RsaKeyPair::from_der(der)
            .or_else(|_| RsaKeyPair::from_pkcs8(der))
            .map_err(|e| SignatureError::InvalidKey(format!("Invalid RSA key: {e}")))?;
        Ok(Self { key_pair })
    }

    /// Exports the public parameters of this key pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the public key encoding cannot be parsed.
    pub fn public_key(&self) -> Result<RsaPublicKey, SignatureError> {
        RsaPublicKey::from_der(self.key_pair.public_key().as_ref())
    }

    /// Returns the signature length in bytes.
    #[must_use]
    pub fn signature_len(&self) -> usize {
        self.key_pair.public_modulus_len()
    }

    /// Signs data with RSA PKCS#1 v1.5.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign(&self, data: &[u8], algorithm: LegacyRsaAlgorithm) -> Result<Vec<u8>, SignatureError> {
        let rng = SystemRandom::new();
        let mut sig = vec![0u8; self.key_pair.public_modulus_len()];

        let padding = match algorithm {
            LegacyRsaAlgorithm::Rs256 => &signature::RSA_PKCS1_SHA256,
            LegacyRsaAlgorithm::Rs384 => &signature::RSA_PKCS1_SHA384,
            LegacyRsaAlgorithm::Rs512 => &signature::RSA_PKCS1_SHA512,
        };

        self.key_pair
            .sign(padding, &rng, data, &mut sig)
            .map_err(|e| SignatureError::Signing(format!("RSA signing failed: {e}")))?;

        Ok(sig)
    }
}

impl fmt::Debug for RsaPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaPrivateKey")
            .field("signature_len", &self.signature_len())
            .finish_non_exhaustive()
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// Extracts RSA modulus and exponent from `SubjectPublicKeyInfo` or a bare
/// PKCS#1 `RSAPublicKey`.
fn extract_rsa_components(der: &[u8]) -> Result<(Vec<u8>, Vec<u8>), SignatureError> {
    let mut pos = 0;

    if der.get(pos) != Some(&0x30) {
        return Err(SignatureError::InvalidKey("Invalid public key: expected SEQUENCE".to_string()));
    }
    pos += 1;
    pos = skip_length(der, pos)?;

    // SPKI starts with the AlgorithmIdentifier SEQUENCE, PKCS#1 with INTEGER n
    if der.get(pos) == Some(&0x30) {
        pos += 1;
        let alg_len = read_length(der, pos)?;
        pos = skip_length(der, pos)?;
        pos += alg_len;

        if der.get(pos) != Some(&0x03) {
            return Err(SignatureError::InvalidKey("Invalid SPKI: expected BIT STRING".to_string()));
        }
        pos += 1;
        pos = skip_length(der, pos)?;

        // Unused bits byte
        pos += 1;

        if der.get(pos) != Some(&0x30) {
            return Err(SignatureError::InvalidKey("Invalid RSAPublicKey: expected SEQUENCE".to_string()));
        }
        pos += 1;
        pos = skip_length(der, pos)?;
    }

    let (n, pos) = read_integer(der, pos, "n")?;
    let (e, _) = read_integer(der, pos, "e")?;

    Ok((n, e))
}

fn read_integer(der: &[u8], mut pos: usize, name: &str) -> Result<(Vec<u8>, usize), SignatureError> {
    if der.get(pos) != Some(&0x02) {
        return Err(SignatureError::InvalidKey(format!(
            "Invalid RSAPublicKey: expected INTEGER for {name}"
        )));
    }
    pos += 1;
    let len = read_length(der, pos)?;
    pos = skip_length(der, pos)?;
    let value = der
        .get(pos..pos + len)
        .ok_or_else(|| SignatureError::InvalidKey(format!("Truncated INTEGER for {name}")))?;
    Ok((value.to_vec(), pos + len))
}

/// Reads an ASN.1 length field and returns the length value.
fn read_length(data: &[u8], pos: usize) -> Result<usize, SignatureError> {
    let first = *data.get(pos).ok_or_else(|| SignatureError::InvalidKey("Unexpected end of data".to_string()))?;

    if first < 0x80 {
        Ok(first as usize)
    } else {
        let num_bytes = (first & 0x7F) as usize;
        if num_bytes > 4 {
            return Err(SignatureError::InvalidKey("Length too large".to_string()));
        }
        let mut len = 0usize;
        for i in 0..num_bytes {
            let byte = *data.get(pos + 1 + i).ok_or_else(|| SignatureError::InvalidKey("Unexpected end of length".to_string()))?;
            len = (len << 8) | (byte as usize);
        }
        Ok(len)
    }
}

/// Skips an ASN.1 length field and returns the new position.
fn skip_length(data: &[u8], pos: usize) -> Result<usize, SignatureError> {
    let first = *data.get(pos).ok_or_else(|| SignatureError::InvalidKey("Unexpected end of data".to_string()))?;

    if first < 0x80 {
        Ok(pos + 1)
    } else {
        let num_bytes = (first & 0x7F) as usize;
        Ok(pos + 1 + num_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RSAPublicKey { n = 0x00c501, e = 0x010001 }
    const PKCS1: [u8; 12] = [
        0x30, 0x0a, 0x02, 0x03, 0x00, 0xc5, 0x01, 0x02, 0x03, 0x01, 0x00, 0x01,
    ];

    fn spki() -> Vec<u8> {
        let mut der = vec![0x30, 0x1e, 0x30, 0x0d, 0x06, 0x09];
        der.extend_from_slice(&[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01]);
        der.extend_from_slice(&[0x05, 0x00, 0x03, 0x0d, 0x00]);
        der.extend_from_slice(&PKCS1);
        der
    }

    #[test]
    fn parses_pkcs1_public_key() {
        let key = RsaPublicKey::from_der(&PKCS1).unwrap();
        assert_eq!(key.modulus(), &[0xc5, 0x01]);
        assert_eq!(key.exponent(), &[0x01, 0x00, 0x01]);
    }

    #[test]
    fn parses_spki_public_key() {
        let key = RsaPublicKey::from_der(&spki()).unwrap();
        assert_eq!(key, RsaPublicKey::new(&[0xc5, 0x01], &[0x01, 0x00, 0x01]));
    }

    #[test]
    fn leading_zeros_are_stripped() {
        let a = RsaPublicKey::new(&[0x00, 0x00, 0x80], &[0x03]);
        let b = RsaPublicKey::new(&[0x80], &[0x00, 0x03]);
        assert_eq!(a, b);
        assert_eq!(a.modulus_bits(), 8);
    }

    #[test]
    fn truncated_der_is_rejected() {
        assert!(RsaPublicKey::from_der(&PKCS1[..8]).is_err());
        assert!(RsaPublicKey::from_der(&[]).is_err());
        assert!(RsaPublicKey::from_der(&[0x04, 0x00]).is_err());
    }

    #[test]
    fn invalid_private_key_is_rejected() {
        assert!(RsaPrivateKey::from_pkcs8(&[0x30, 0x00]).is_err());
        assert!(RsaPrivateKey::from_der(b"not a key").is_err());
    }

    #[test]
    fn debug_output_hides_key_material() {
        let key = RsaPublicKey::new(&[0xc5, 0x01], &[0x01, 0x00, 0x01]);
        let debug = format!("{key:?}");
        assert!(debug.contains("bits"));
        assert!(!debug.contains("197"));
    }
}
