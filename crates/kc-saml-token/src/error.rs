//! SAML token error types.
//!
//! Every failure of the validation pipeline is a [`SamlError`]. Callers that
//! need to react to the failure class rather than the exact variant use
//! [`SamlError::kind`]; [`SamlError::is_retryable`] marks the single class
//! worth retrying after refreshing signing keys.
//!
//! Errors carry key descriptors (type and key id) for diagnostics, never
//! key bytes.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type for SAML token operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// Classification of a [`SamlError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Oversized or unparsable document; no trust decision was made.
    MalformedInput,
    /// A signature is required but the assertion carries none.
    NoSignaturePresent,
    /// No configured key structurally matches the document's KeyInfo.
    KeyNotFound,
    /// Every attempted key failed verification, or no keys were available.
    InvalidSignature,
    /// Lifetime or unsupported-condition failure.
    ConditionViolation,
    /// Audience restriction not satisfied.
    AudienceRejected,
    /// The assertion has no subject.
    SubjectMissing,
    /// The issuer validator rejected the issuer.
    IssuerRejected,
    /// The token was seen before.
    ReplayDetected,
    /// Duplicate, malformed or too deeply nested actor.
    UnsupportedDelegation,
    /// Well-formed content this handler does not process (encryption,
    /// authentication context declarations).
    UnsupportedContent,
    /// Building or signing an outgoing token failed.
    TokenCreation,
    /// The validation parameters are unusable.
    Configuration,
}

/// SAML token errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// Token exceeds the configured size ceiling.
    #[error("token size {size} bytes exceeds maximum of {max} bytes")]
    TokenTooLarge {
        /// Size of the rejected token.
        size: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// Missing required element or attribute.
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// Invalid assertion.
    #[error("invalid assertion: {0}")]
    InvalidAssertion(String),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    /// Signature required but absent.
    #[error("assertion is not signed and signed tokens are required (assertion {assertion_id})")]
    NoSignature {
        /// ID of the unsigned assertion.
        assertion_id: String,
    },

    /// No attempted key matches the KeyInfo in the signature.
    #[error("signature key not found: KeyInfo {key_info} matched none of the attempted keys [{}]", .attempted_keys.join(", "))]
    SignatureKeyNotFound {
        /// Summary of the KeyInfo carried by the signature.
        key_info: String,
        /// Descriptors of the keys that were tried.
        attempted_keys: Vec<String>,
        /// Verification failure per attempted key.
        failures: Vec<String>,
    },

    /// XML signature validation failed.
    #[error("signature validation failed: {reason}")]
    SignatureInvalid {
        /// Why validation failed.
        reason: String,
        /// Descriptors of the keys that were tried.
        attempted_keys: Vec<String>,
        /// Verification failure per attempted key.
        failures: Vec<String>,
    },

    /// A custom signature validator returned no token.
    #[error("signature validator returned no token")]
    SignatureValidatorReturnedNothing,

    /// A custom signature validator returned a token of the wrong type.
    #[error("signature validator returned a {actual} token, expected {expected}")]
    SignatureValidatorTypeMismatch {
        /// Expected token type.
        expected: String,
        /// Type that was returned.
        actual: String,
    },

    /// Assertion not yet valid.
    #[error("assertion not yet valid: NotBefore {not_before}, current time {now}")]
    AssertionNotYetValid {
        /// NotBefore of the rejected range.
        not_before: DateTime<Utc>,
        /// Validation time.
        now: DateTime<Utc>,
    },

    /// Assertion expired.
    #[error("assertion expired: NotOnOrAfter {not_on_or_after}, current time {now}")]
    AssertionExpired {
        /// NotOnOrAfter of the rejected range.
        not_on_or_after: DateTime<Utc>,
        /// Validation time.
        now: DateTime<Utc>,
    },

    /// NotBefore is after NotOnOrAfter.
    #[error("invalid lifetime: NotBefore {not_before} is after NotOnOrAfter {not_on_or_after}")]
    InvalidLifetime {
        /// NotBefore of the rejected range.
        not_before: DateTime<Utc>,
        /// NotOnOrAfter of the rejected range.
        not_on_or_after: DateTime<Utc>,
    },

    /// An expiration time is required but absent.
    #[error("assertion has no NotOnOrAfter and an expiration time is required")]
    MissingExpiration,

    /// A condition the handler cannot enforce.
    #[error("unsupported condition: {0}")]
    UnsupportedCondition(String),

    /// Invalid audience.
    #[error("invalid audience: {reason} (audiences: [{}])", .audiences.join(", "))]
    InvalidAudience {
        /// Audiences carried by the restriction.
        audiences: Vec<String>,
        /// Why they were rejected.
        reason: String,
    },

    /// The assertion has no subject.
    #[error("assertion {assertion_id} has no subject")]
    SubjectMissing {
        /// ID of the assertion.
        assertion_id: String,
    },

    /// Invalid issuer.
    #[error("invalid issuer '{issuer}': {reason}")]
    InvalidIssuer {
        /// The rejected issuer.
        issuer: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The token was already presented.
    #[error("token replay detected: {0}")]
    TokenReplayed(String),

    /// Duplicate, malformed or too deeply nested actor.
    #[error("unsupported delegation: {0}")]
    UnsupportedDelegation(String),

    /// Encrypted content is not supported.
    #[error("encrypted element '{0}' is not supported")]
    EncryptedElement(String),

    /// Authentication context declarations are not supported.
    #[error("authentication context declaration reference '{0}' is not supported")]
    AuthnContextDeclaration(String),

    /// Building an outgoing token failed.
    #[error("token creation failed: {0}")]
    TokenCreation(String),

    /// XML signature creation failed.
    #[error("signature creation failed: {0}")]
    SignatureCreation(String),

    /// Invalid validation parameters.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl SamlError {
    /// Returns the failure class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TokenTooLarge { .. }
            | Self::XmlParse(_)
            | Self::MissingElement(_)
            | Self::InvalidAssertion(_)
            | Self::Base64Decode(_) => ErrorKind::MalformedInput,
            Self::NoSignature { .. } => ErrorKind::NoSignaturePresent,
            Self::SignatureKeyNotFound { .. } => ErrorKind::KeyNotFound,
            Self::SignatureInvalid { .. }
            | Self::SignatureValidatorReturnedNothing
            | Self::SignatureValidatorTypeMismatch { .. } => ErrorKind::InvalidSignature,
            Self::AssertionNotYetValid { .. }
            | Self::AssertionExpired { .. }
            | Self::InvalidLifetime { .. }
            | Self::MissingExpiration
            | Self::UnsupportedCondition(_) => ErrorKind::ConditionViolation,
            Self::InvalidAudience { .. } => ErrorKind::AudienceRejected,
            Self::SubjectMissing { .. } => ErrorKind::SubjectMissing,
            Self::InvalidIssuer { .. } => ErrorKind::IssuerRejected,
            Self::TokenReplayed(_) => ErrorKind::ReplayDetected,
            Self::UnsupportedDelegation(_) => ErrorKind::UnsupportedDelegation,
            Self::EncryptedElement(_) | Self::AuthnContextDeclaration(_) => {
                ErrorKind::UnsupportedContent
            }
            Self::TokenCreation(_) | Self::SignatureCreation(_) => ErrorKind::TokenCreation,
            Self::InvalidConfiguration(_) => ErrorKind::Configuration,
        }
    }

    /// Returns true if refreshing signing keys and validating again may
    /// succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::KeyNotFound)
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for SamlError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64Decode(err.to_string())
    }
}
