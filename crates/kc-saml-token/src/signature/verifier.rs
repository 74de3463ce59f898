//! XML Signature verification.
//!
//! Verifies an enveloped signature against one candidate trust key. Key
//! selection and the aggregation of failures across keys live in
//! [`crate::resolver`].

use base64::Engine;
use thiserror::Error;

use crate::keys::TrustKey;
use crate::types::transforms;

use super::{
    digest_algorithm, normalize_xml_whitespace, CanonicalizationAlgorithm, Signature,
    SignatureAlgorithm,
};

/// Why a signature did not verify under a key.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// Algorithm URI that is unknown or not permitted.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Transform other than enveloped-signature or canonicalization.
    #[error("unsupported transform: {0}")]
    UnsupportedTransform(String),

    /// The reference does not point at the signed assertion.
    #[error("reference URI '{uri}' does not identify element '{expected}'")]
    ReferenceMismatch {
        /// URI in the reference.
        uri: String,
        /// ID of the element carrying the signature.
        expected: String,
    },

    /// The signed content does not hash to the referenced digest.
    #[error("digest mismatch")]
    DigestMismatch,

    /// Base64 content in the signature could not be decoded.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// The key could not be used.
    #[error("key error: {0}")]
    Key(#[from] kc_crypto::SignatureError),

    /// The signature value does not verify under the key.
    #[error("signature value does not verify")]
    SignatureMismatch,
}

/// Verifies a signature with a single key.
pub trait SignatureVerifier: Send + Sync {
    /// Returns `Ok(())` when `signature` verifies under `key`.
    fn verify(&self, signature: &Signature, key: &TrustKey) -> Result<(), VerificationError>;
}

/// XML-DSig verifier for RSA signatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlDsigVerifier {
    allow_sha1: bool,
}

impl XmlDsigVerifier {
    /// Creates a verifier that rejects SHA-1.
    #[must_use]
    pub const fn new() -> Self {
        Self { allow_sha1: false }
    }

    /// Sets whether SHA-1 signature methods are allowed past the policy
    /// check.
    #[must_use]
    pub const fn allow_sha1(mut self, allow: bool) -> Self {
        self.allow_sha1 = allow;
        self
    }

    fn check_algorithms(&self, signature: &Signature) -> Result<SignatureAlgorithm, VerificationError> {
        let signed_info = &signature.signed_info;

        if CanonicalizationAlgorithm::from_uri(&signed_info.canonicalization_method).is_none() {
            return Err(VerificationError::UnsupportedAlgorithm(
                signed_info.canonicalization_method.clone(),
            ));
        }

        let algorithm = SignatureAlgorithm::from_uri(&signed_info.signature_method).ok_or_else(
            || VerificationError::UnsupportedAlgorithm(signed_info.signature_method.clone()),
        )?;

        if algorithm.is_ecdsa() {
            return Err(VerificationError::UnsupportedAlgorithm(format!(
                "{} (only RSA signatures are verified)",
                signed_info.signature_method
            )));
        }
        if algorithm.is_deprecated() && !self.allow_sha1 {
            return Err(VerificationError::UnsupportedAlgorithm(format!(
                "{} (SHA-1 is not allowed)",
                signed_info.signature_method
            )));
        }

        for transform in &signed_info.reference.transforms {
            if transform != transforms::ENVELOPED_SIGNATURE
                && CanonicalizationAlgorithm::from_uri(transform).is_none()
            {
                return Err(VerificationError::UnsupportedTransform(transform.clone()));
            }
        }

        Ok(algorithm)
    }

    fn check_reference(signature: &Signature) -> Result<(), VerificationError> {
        let uri = &signature.signed_info.reference.uri;
        let expected = signature.signed_element_id();

        let refers_to_element = uri.is_empty() || uri.strip_prefix('#') == Some(expected);
        if refers_to_element {
            Ok(())
        } else {
            Err(VerificationError::ReferenceMismatch {
                uri: uri.clone(),
                expected: expected.to_string(),
            })
        }
    }

    fn check_digest(signature: &Signature) -> Result<(), VerificationError> {
        let reference = &signature.signed_info.reference;
        let hash = digest_algorithm(&reference.digest_method)
            .ok_or_else(|| VerificationError::UnsupportedAlgorithm(reference.digest_method.clone()))?;

        let expected = decode_base64(&reference.digest_value)?;
        let canonical = normalize_xml_whitespace(signature.signed_content());
        let actual = kc_crypto::hash(hash, canonical.as_bytes());

        if kc_crypto::fixed_time_eq(&expected, &actual) {
            Ok(())
        } else {
            Err(VerificationError::DigestMismatch)
        }
    }
}

impl SignatureVerifier for XmlDsigVerifier {
    fn verify(&self, signature: &Signature, key: &TrustKey) -> Result<(), VerificationError> {
        let algorithm = self.check_algorithms(signature)?;
        let rsa_algorithm = algorithm.rsa_algorithm().ok_or_else(|| {
            VerificationError::UnsupportedAlgorithm(format!(
                "{} has no available implementation",
                algorithm.uri()
            ))
        })?;

        Self::check_reference(signature)?;
        Self::check_digest(signature)?;

        let public_key = key.public_key()?;
        let signature_bytes = decode_base64(&signature.signature_value)?;
        let signed_info = normalize_xml_whitespace(signature.signed_info_xml());

        if kc_crypto::rsa_verify_legacy(
            &public_key,
            signed_info.as_bytes(),
            &signature_bytes,
            rsa_algorithm,
        )? {
            Ok(())
        } else {
            Err(VerificationError::SignatureMismatch)
        }
    }
}

fn decode_base64(value: &str) -> Result<Vec<u8>, VerificationError> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| VerificationError::InvalidEncoding(e.to_string()))
}
