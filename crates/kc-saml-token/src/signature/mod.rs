//! XML Signature support for SAML assertions.
//!
//! This module provides the enveloped XML Digital Signature (XML-DSig)
//! handling the token handler needs: the parsed [`Signature`] block, a
//! pluggable [`SignatureVerifier`] with the default [`XmlDsigVerifier`], and
//! the [`XmlSigner`] used when writing tokens.
//!
//! # Signing Algorithms
//!
//! Verification and signing support RSA PKCS#1 v1.5 with SHA-256, SHA-384
//! and SHA-512. ECDSA and SHA-1 URIs are recognised so they can be rejected
//! with a precise reason.
//!
//! # Canonicalization
//!
//! Signed content is canonicalized by whitespace normalization on both the
//! signing and verifying side. Full C14N is left to the XML layer.

mod signer;
mod verifier;

pub use signer::*;
pub use verifier::*;

use kc_crypto::{HashAlgorithm, LegacyRsaAlgorithm};

use crate::types::{canonicalization_algorithms, digest_algorithms, signature_algorithms, KeyInfo};

/// Signature algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureAlgorithm {
    /// RSA with SHA-256 (recommended).
    #[default]
    RsaSha256,
    /// RSA with SHA-384.
    RsaSha384,
    /// RSA with SHA-512.
    RsaSha512,
    /// ECDSA with SHA-256.
    EcdsaSha256,
    /// ECDSA with SHA-384.
    EcdsaSha384,
    /// ECDSA with SHA-512.
    EcdsaSha512,
    /// Legacy RSA with SHA-1 (not recommended).
    RsaSha1,
}

impl SignatureAlgorithm {
    /// Returns the URI for this signature algorithm.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::RsaSha256 => signature_algorithms::RSA_SHA256,
            Self::RsaSha384 => signature_algorithms::RSA_SHA384,
            Self::RsaSha512 => signature_algorithms::RSA_SHA512,
            Self::EcdsaSha256 => signature_algorithms::ECDSA_SHA256,
            Self::EcdsaSha384 => signature_algorithms::ECDSA_SHA384,
            Self::EcdsaSha512 => signature_algorithms::ECDSA_SHA512,
            Self::RsaSha1 => signature_algorithms::RSA_SHA1,
        }
    }

    /// Returns the corresponding digest algorithm URI.
    #[must_use]
    pub const fn digest_uri(&self) -> &'static str {
        match self {
            Self::RsaSha256 | Self::EcdsaSha256 => digest_algorithms::SHA256,
            Self::RsaSha384 | Self::EcdsaSha384 => digest_algorithms::SHA384,
            Self::RsaSha512 | Self::EcdsaSha512 => digest_algorithms::SHA512,
            Self::RsaSha1 => digest_algorithms::SHA1,
        }
    }

    /// Parses a signature algorithm from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            signature_algorithms::RSA_SHA256 => Some(Self::RsaSha256),
            signature_algorithms::RSA_SHA384 => Some(Self::RsaSha384),
            signature_algorithms::RSA_SHA512 => Some(Self::RsaSha512),
            signature_algorithms::ECDSA_SHA256 => Some(Self::EcdsaSha256),
            signature_algorithms::ECDSA_SHA384 => Some(Self::EcdsaSha384),
            signature_algorithms::ECDSA_SHA512 => Some(Self::EcdsaSha512),
            signature_algorithms::RSA_SHA1 => Some(Self::RsaSha1),
            _ => None,
        }
    }

    /// Returns the RSA primitive implementing this algorithm, if there is one.
    #[must_use]
    pub const fn rsa_algorithm(&self) -> Option<LegacyRsaAlgorithm> {
        match self {
            Self::RsaSha256 => Some(LegacyRsaAlgorithm::Rs256),
            Self::RsaSha384 => Some(LegacyRsaAlgorithm::Rs384),
            Self::RsaSha512 => Some(LegacyRsaAlgorithm::Rs512),
            _ => None,
        }
    }

    /// Returns true if this algorithm uses ECDSA.
    #[must_use]
    pub const fn is_ecdsa(&self) -> bool {
        matches!(
            self,
            Self::EcdsaSha256 | Self::EcdsaSha384 | Self::EcdsaSha512
        )
    }

    /// Returns true if this algorithm uses a deprecated hash (SHA-1).
    #[must_use]
    pub const fn is_deprecated(&self) -> bool {
        matches!(self, Self::RsaSha1)
    }
}

/// Maps a `DigestMethod` URI to a hash algorithm. SHA-1 is not available.
#[must_use]
pub fn digest_algorithm(uri: &str) -> Option<HashAlgorithm> {
    match uri {
        digest_algorithms::SHA256 => Some(HashAlgorithm::Sha256),
        digest_algorithms::SHA384 => Some(HashAlgorithm::Sha384),
        digest_algorithms::SHA512 => Some(HashAlgorithm::Sha512),
        _ => None,
    }
}

/// Canonicalization algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CanonicalizationAlgorithm {
    /// Exclusive C14N without comments (recommended).
    #[default]
    ExclusiveC14N,
    /// Exclusive C14N with comments.
    ExclusiveC14NWithComments,
    /// C14N without comments.
    C14N,
    /// C14N with comments.
    C14NWithComments,
}

impl CanonicalizationAlgorithm {
    /// Returns the URI for this canonicalization algorithm.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::ExclusiveC14N => canonicalization_algorithms::EXCLUSIVE_C14N,
            Self::ExclusiveC14NWithComments => {
                canonicalization_algorithms::EXCLUSIVE_C14N_WITH_COMMENTS
            }
            Self::C14N => canonicalization_algorithms::C14N,
            Self::C14NWithComments => canonicalization_algorithms::C14N_WITH_COMMENTS,
        }
    }

    /// Parses a canonicalization algorithm from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            canonicalization_algorithms::EXCLUSIVE_C14N => Some(Self::ExclusiveC14N),
            canonicalization_algorithms::EXCLUSIVE_C14N_WITH_COMMENTS => {
                Some(Self::ExclusiveC14NWithComments)
            }
            canonicalization_algorithms::C14N => Some(Self::C14N),
            canonicalization_algorithms::C14N_WITH_COMMENTS => Some(Self::C14NWithComments),
            _ => None,
        }
    }
}

/// `ds:Reference` inside `SignedInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Reference URI, `#<assertion ID>` or empty for the whole document.
    pub uri: String,
    /// Transform algorithm URIs in order.
    pub transforms: Vec<String>,
    /// `DigestMethod` algorithm URI.
    pub digest_method: String,
    /// Base64 digest value.
    pub digest_value: String,
}

/// `ds:SignedInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInfo {
    /// `CanonicalizationMethod` algorithm URI.
    pub canonicalization_method: String,
    /// `SignatureMethod` algorithm URI.
    pub signature_method: String,
    /// The single reference to the signed assertion.
    pub reference: Reference,
}

/// An enveloped `ds:Signature` as found in an assertion.
///
/// Algorithm URIs are kept verbatim; an unknown algorithm is a verification
/// failure, not a parse failure.
#[derive(Debug, Clone)]
pub struct Signature {
    /// Parsed `SignedInfo`.
    pub signed_info: SignedInfo,
    /// Base64 `SignatureValue`.
    pub signature_value: String,
    /// `KeyInfo`, when the signer included one.
    pub key_info: Option<KeyInfo>,
    signed_info_xml: String,
    signed_content: String,
    signed_element_id: String,
}

impl Signature {
    /// Creates a signature block.
    ///
    /// `signed_info_xml` is the `SignedInfo` element text exactly as it
    /// appears in the document, `signed_content` the signed element with
    /// the `Signature` element removed.
    #[must_use]
    pub fn new(
        signed_info: SignedInfo,
        signature_value: impl Into<String>,
        key_info: Option<KeyInfo>,
        signed_info_xml: impl Into<String>,
        signed_content: impl Into<String>,
        signed_element_id: impl Into<String>,
    ) -> Self {
        Self {
            signed_info,
            signature_value: signature_value.into(),
            key_info,
            signed_info_xml: signed_info_xml.into(),
            signed_content: signed_content.into(),
            signed_element_id: signed_element_id.into(),
        }
    }

    /// Returns the raw `SignedInfo` element text.
    #[must_use]
    pub fn signed_info_xml(&self) -> &str {
        &self.signed_info_xml
    }

    /// Returns the signed element text without the signature.
    #[must_use]
    pub fn signed_content(&self) -> &str {
        &self.signed_content
    }

    /// Returns the `ID` of the element carrying the signature.
    #[must_use]
    pub fn signed_element_id(&self) -> &str {
        &self.signed_element_id
    }
}

/// Configuration for signature creation.
#[derive(Debug, Clone)]
pub struct SignatureConfig {
    /// The signature algorithm to use.
    pub algorithm: SignatureAlgorithm,
    /// The canonicalization algorithm to use.
    pub canonicalization: CanonicalizationAlgorithm,
    /// Whether to describe the signing key in a `KeyInfo` element.
    pub include_key_info: bool,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self::with_algorithm(SignatureAlgorithm::RsaSha256)
    }
}

impl SignatureConfig {
    /// Creates a new signature configuration with the given algorithm.
    #[must_use]
    pub const fn with_algorithm(algorithm: SignatureAlgorithm) -> Self {
        Self {
            algorithm,
            canonicalization: CanonicalizationAlgorithm::ExclusiveC14N,
            include_key_info: true,
        }
    }
}

/// Normalizes XML whitespace (simplified canonicalization).
pub(crate) fn normalize_xml_whitespace(xml: &str) -> String {
    xml.split_whitespace().collect::<Vec<_>>().join(" ")
}
