//! RSA PKCS#1 v1.5 operations for XML-DSig interoperability.
//!
//! SAML deployments sign with `rsa-sha256` far more often than anything
//! stronger, so SHA-256 is supported here alongside SHA-384 and SHA-512.

use aws_lc_rs::signature::{self, RsaParameters, RsaPublicKeyComponents};

use crate::algorithm::HashAlgorithm;
use crate::keys::{RsaPrivateKey, RsaPublicKey};
use crate::signature::SignatureError;

/// RSA PKCS#1 v1.5 signature algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyRsaAlgorithm {
    /// RSA PKCS#1 v1.5 with SHA-256.
    Rs256,
    /// RSA PKCS#1 v1.5 with SHA-384.
    Rs384,
    /// RSA PKCS#1 v1.5 with SHA-512.
    Rs512,
}

impl LegacyRsaAlgorithm {
    /// Returns the JWA algorithm name.
    #[must_use]
    pub const fn jwa_name(self) -> &'static str {
        match self {
            Self::Rs256 => "RS256",
            Self::Rs384 => "RS384",
            Self::Rs512 => "RS512",
        }
    }

    /// Returns the XML-DSig algorithm URI.
    #[must_use]
    pub const fn xml_dsig_uri(self) -> &'static str {
        match self {
            Self::Rs256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            Self::Rs384 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384",
            Self::Rs512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
        }
    }

    /// Returns the digest algorithm applied before padding.
    #[must_use]
    pub const fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            Self::Rs256 => HashAlgorithm::Sha256,
            Self::Rs384 => HashAlgorithm::Sha384,
            Self::Rs512 => HashAlgorithm::Sha512,
        }
    }

    fn verification_parameters(self) -> &'static RsaParameters {
        match self {
            Self::Rs256 => &signature::RSA_PKCS1_2048_8192_SHA256,
            Self::Rs384 => &signature::RSA_PKCS1_2048_8192_SHA384,
            Self::Rs512 => &signature::RSA_PKCS1_2048_8192_SHA512,
        }
    }
}

/// Signs data using an RSA private key in DER format (PKCS#1 or PKCS#8).
///
/// # Errors
///
/// Returns an error if the key is invalid or signing fails.
pub fn rsa_sign_legacy(
    key_der: &[u8],
    data: &[u8],
    algorithm: LegacyRsaAlgorithm,
) -> Result<Vec<u8>, SignatureError> {
    RsaPrivateKey::from_der(key_der)?.sign(data, algorithm)
}

/// Verifies an RSA signature against public key components.
///
/// Returns `Ok(false)` when the signature does not verify; the reason is
/// deliberately not reported.
///
/// # Errors
///
/// Returns an error if the public key has no modulus or exponent.
pub fn rsa_verify_legacy(
    public_key: &RsaPublicKey,
    data: &[u8],
    sig: &[u8],
    algorithm: LegacyRsaAlgorithm,
) -> Result<bool, SignatureError> {
    if public_key.modulus().is_empty() || public_key.exponent().is_empty() {
        return Err(SignatureError::InvalidKey("RSA key has empty parameters".to_string()));
    }

    let components = RsaPublicKeyComponents {
        n: public_key.modulus(),
        e: public_key.exponent(),
    };

    match components.verify(algorithm.verification_parameters(), data, sig) {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}
