//! Signature resolution.
//!
//! Decides which trust keys to try against an assertion's signature, tries
//! them in order and classifies the failure when none verifies:
//!
//! - **KeyNotFound**: the document carries a `KeyInfo` and no attempted key
//!   structurally matches it. The caller's key set is likely stale;
//!   refreshing it and retrying may succeed.
//! - **InvalidSignature**: a matching key was attempted and still failed,
//!   the document has no `KeyInfo`, or there were no keys at all.

use chrono::{DateTime, Utc};

use crate::config::ValidationParameters;
use crate::error::{SamlError, SamlResult};
use crate::key_matcher;
use crate::keys::TrustKey;
use crate::signature::{Signature, SigningCredentials};
use crate::types::{Assertion, KeyInfo};
use crate::xml::reader::read_assertion;

/// Outcome of a [`IssuerSigningKeyResolver`].
#[derive(Debug, Clone)]
pub enum KeyResolution {
    /// Try exactly these keys. An empty set means no key is acceptable.
    Keys(Vec<TrustKey>),
    /// The resolver has no opinion; use the configured keys.
    Declined,
}

/// Chooses candidate keys for a token.
pub trait IssuerSigningKeyResolver: Send + Sync {
    /// Resolves candidate keys from the raw token and its `KeyInfo`.
    fn resolve(
        &self,
        token: &str,
        key_info: Option<&KeyInfo>,
        params: &ValidationParameters,
    ) -> KeyResolution;
}

impl<F> IssuerSigningKeyResolver for F
where
    F: Fn(&str, Option<&KeyInfo>, &ValidationParameters) -> KeyResolution + Send + Sync,
{
    fn resolve(
        &self,
        token: &str,
        key_info: Option<&KeyInfo>,
        params: &ValidationParameters,
    ) -> KeyResolution {
        self(token, key_info, params)
    }
}

/// Replaces signature resolution entirely.
///
/// The validator parses and verifies the raw token itself. Returning
/// `Ok(None)` or a token that is not a SAML 2.0 token fails validation.
pub trait SignatureValidator: Send + Sync {
    /// Validates the token's signature and returns the parsed token.
    fn validate(
        &self,
        token: &str,
        params: &ValidationParameters,
    ) -> SamlResult<Option<SecurityToken>>;
}

impl<F> SignatureValidator for F
where
    F: Fn(&str, &ValidationParameters) -> SamlResult<Option<SecurityToken>> + Send + Sync,
{
    fn validate(
        &self,
        token: &str,
        params: &ValidationParameters,
    ) -> SamlResult<Option<SecurityToken>> {
        self(token, params)
    }
}

/// A token produced by a [`SignatureValidator`].
#[derive(Debug, Clone)]
pub enum SecurityToken {
    /// A SAML 2.0 assertion token.
    Saml2(Saml2SecurityToken),
    /// Any other token type.
    Other {
        /// Name of the token type.
        token_type: String,
    },
}

impl SecurityToken {
    /// Returns the token type name.
    #[must_use]
    pub fn token_type(&self) -> &str {
        match self {
            Self::Saml2(_) => Saml2SecurityToken::TOKEN_TYPE,
            Self::Other { token_type } => token_type,
        }
    }
}

/// A SAML 2.0 assertion together with the key that verified it.
#[derive(Debug, Clone)]
pub struct Saml2SecurityToken {
    assertion: Assertion,
    signing_key: Option<TrustKey>,
    signing_credentials: Option<SigningCredentials>,
}

impl Saml2SecurityToken {
    /// Token type name.
    pub const TOKEN_TYPE: &'static str = "urn:oasis:names:tc:SAML:2.0:assertion";

    /// Wraps an assertion with no signing key.
    #[must_use]
    pub const fn new(assertion: Assertion) -> Self {
        Self {
            assertion,
            signing_key: None,
            signing_credentials: None,
        }
    }

    /// Attaches credentials used when the token is written.
    #[must_use]
    pub fn with_signing_credentials(mut self, credentials: SigningCredentials) -> Self {
        self.signing_credentials = Some(credentials);
        self
    }

    /// Returns the assertion.
    #[must_use]
    pub const fn assertion(&self) -> &Assertion {
        &self.assertion
    }

    /// Consumes the token, returning the assertion.
    #[must_use]
    pub fn into_assertion(self) -> Assertion {
        self.assertion
    }

    /// Returns the key that verified the signature, if any.
    #[must_use]
    pub const fn signing_key(&self) -> Option<&TrustKey> {
        self.signing_key.as_ref()
    }

    /// Returns the credentials used to sign this token on write.
    #[must_use]
    pub const fn signing_credentials(&self) -> Option<&SigningCredentials> {
        self.signing_credentials.as_ref()
    }

    /// Returns the assertion ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.assertion.id
    }

    /// Start of the validity window, if any.
    #[must_use]
    pub fn valid_from(&self) -> Option<DateTime<Utc>> {
        self.assertion.conditions.as_ref().and_then(|c| c.not_before)
    }

    /// End of the validity window, if any.
    #[must_use]
    pub fn valid_to(&self) -> Option<DateTime<Utc>> {
        self.assertion.not_on_or_after()
    }

    /// Records the verifying key. Only the first key is kept.
    pub(crate) fn set_signing_key(&mut self, key: TrustKey) {
        if self.signing_key.is_none() {
            self.signing_key = Some(key);
        }
    }
}

/// Key candidates and where they came from.
enum Candidates<'p> {
    Resolved(Vec<TrustKey>),
    Matched(&'p TrustKey),
    Configured(Vec<&'p TrustKey>),
}

impl<'p> Candidates<'p> {
    fn keys(&self) -> Vec<&TrustKey> {
        match self {
            Self::Resolved(keys) => keys.iter().collect(),
            Self::Matched(key) => vec![*key],
            Self::Configured(keys) => keys.clone(),
        }
    }

    const fn source(&self) -> &'static str {
        match self {
            Self::Resolved(_) => "key resolver",
            Self::Matched(_) => "KeyInfo match",
            Self::Configured(_) => "all configured keys",
        }
    }
}

/// Finds the trust key that verifies an assertion's signature.
pub struct SignatureResolver<'p> {
    params: &'p ValidationParameters,
}

impl<'p> SignatureResolver<'p> {
    /// Creates a resolver over the given parameters.
    #[must_use]
    pub const fn new(params: &'p ValidationParameters) -> Self {
        Self { params }
    }

    /// Parses the token and resolves its signature.
    pub fn resolve(&self, token: &str) -> SamlResult<Saml2SecurityToken> {
        if let Some(validator) = &self.params.signature_validator {
            tracing::debug!("delegating signature validation to custom validator");
            return match validator.validate(token, self.params)? {
                Some(SecurityToken::Saml2(token)) => Ok(token),
                Some(other) => Err(SamlError::SignatureValidatorTypeMismatch {
                    expected: Saml2SecurityToken::TOKEN_TYPE.to_string(),
                    actual: other.token_type().to_string(),
                }),
                None => Err(SamlError::SignatureValidatorReturnedNothing),
            };
        }

        let mut security_token = Saml2SecurityToken::new(read_assertion(token)?);
        if let Some(key) = self.resolve_assertion(token, security_token.assertion())? {
            security_token.set_signing_key(key);
        }
        Ok(security_token)
    }

    /// Resolves the signature of an already parsed assertion.
    ///
    /// Returns the verifying key, or `None` for an unsigned assertion when
    /// signatures are not required.
    pub fn resolve_assertion(
        &self,
        token: &str,
        assertion: &Assertion,
    ) -> SamlResult<Option<TrustKey>> {
        let Some(signature) = assertion.signature.as_ref() else {
            if self.params.config.require_signed_tokens {
                tracing::warn!("assertion '{}' is not signed", assertion.id);
                return Err(SamlError::NoSignature {
                    assertion_id: assertion.id.clone(),
                });
            }
            tracing::debug!("assertion '{}' is not signed; signature not required", assertion.id);
            return Ok(None);
        };

        let candidates = self.candidates(token, signature);
        tracing::debug!(
            source = candidates.source(),
            "resolving signature of assertion '{}'",
            assertion.id
        );
        self.verify(signature, &candidates.keys()).map(Some)
    }

    fn candidates(&self, token: &str, signature: &Signature) -> Candidates<'p> {
        if let Some(resolver) = &self.params.issuer_signing_key_resolver {
            match resolver.resolve(token, signature.key_info.as_ref(), self.params) {
                KeyResolution::Keys(keys) => return Candidates::Resolved(keys),
                KeyResolution::Declined => {
                    tracing::debug!("key resolver declined; falling back to configured keys");
                    return Candidates::Configured(self.params.signing_keys().collect());
                }
            }
        }

        if let Some(key_info) = &signature.key_info {
            if let Some(key) = self
                .params
                .signing_keys()
                .find(|key| key_matcher::matches(key, key_info))
            {
                return Candidates::Matched(key);
            }
        }

        Candidates::Configured(self.params.signing_keys().collect())
    }

    fn verify(&self, signature: &Signature, keys: &[&TrustKey]) -> SamlResult<TrustKey> {
        let verifier = self.params.verifier();
        let mut attempted_keys = Vec::with_capacity(keys.len());
        let mut failures = Vec::new();

        for key in keys {
            attempted_keys.push(key.descriptor());
            match verifier.verify(signature, key) {
                Ok(()) => {
                    tracing::debug!("signature verified with {}", key.descriptor());
                    return Ok((*key).clone());
                }
                Err(e) => {
                    tracing::debug!("signature did not verify with {}: {}", key.descriptor(), e);
                    failures.push(format!("{}: {e}", key.descriptor()));
                }
            }
        }

        if attempted_keys.is_empty() {
            tracing::warn!("no keys available to verify signature");
            return Err(SamlError::SignatureInvalid {
                reason: "no keys configured".to_string(),
                attempted_keys,
                failures,
            });
        }

        if let Some(key_info) = &signature.key_info {
            let any_matched = keys
                .iter()
                .any(|key| key_matcher::matches_signature(key, signature));
            if !any_matched {
                tracing::warn!(
                    "signature key not found: {} matched none of {} attempted key(s)",
                    key_info,
                    attempted_keys.len()
                );
                return Err(SamlError::SignatureKeyNotFound {
                    key_info: key_info.to_string(),
                    attempted_keys,
                    failures,
                });
            }
        }

        tracing::warn!(
            "signature validation failed for all {} attempted key(s)",
            attempted_keys.len()
        );
        Err(SamlError::SignatureInvalid {
            reason: "no attempted key verified the signature".to_string(),
            attempted_keys,
            failures,
        })
    }
}
