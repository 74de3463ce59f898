//! SAML 2.0 token handler.
//!
//! [`Saml2TokenHandler`] runs the validation pipeline. Every stage is a hard
//! gate; the first failure ends validation:
//!
//! ```text
//! Parse -> ResolveSignature -> ValidateConditions -> ValidateSubjectConfirmations
//!       -> ValidateIssuer -> ValidateReplay -> ProjectClaims
//! ```
//!
//! Nothing is retried. A [`ErrorKind::KeyNotFound`](crate::error::ErrorKind)
//! failure is the caller's cue to refresh its keys and validate again.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::conditions::ConditionValidator;
use crate::config::ValidationParameters;
use crate::error::{SamlError, SamlResult};
use crate::issuance::{self, TokenDescriptor};
use crate::keys::TrustKey;
use crate::projector::ClaimsProjector;
use crate::resolver::{Saml2SecurityToken, SignatureResolver};
use crate::types::{ClaimsIdentity, SAML_NS};
use crate::xml::{parse_document, reader::read_assertion};

/// Validates the issuer of a token and returns the issuer to stamp on
/// claims.
pub trait IssuerValidator: Send + Sync {
    /// Returns the issuer to use, or an error if the issuer is rejected.
    fn validate(
        &self,
        issuer: &str,
        token: &Saml2SecurityToken,
        params: &ValidationParameters,
    ) -> SamlResult<String>;
}

impl<F> IssuerValidator for F
where
    F: Fn(&str, &Saml2SecurityToken, &ValidationParameters) -> SamlResult<String> + Send + Sync,
{
    fn validate(
        &self,
        issuer: &str,
        token: &Saml2SecurityToken,
        params: &ValidationParameters,
    ) -> SamlResult<String> {
        self(issuer, token, params)
    }
}

/// Default issuer policy: the issuer must be non-empty and listed in the
/// configured valid issuers.
pub fn validate_issuer_default(issuer: &str, params: &ValidationParameters) -> SamlResult<String> {
    if !params.config.validate_issuer {
        return Ok(issuer.to_string());
    }

    let reject = |reason: &str| SamlError::InvalidIssuer {
        issuer: issuer.to_string(),
        reason: reason.to_string(),
    };

    if issuer.trim().is_empty() {
        return Err(reject("issuer is empty"));
    }
    if params.config.valid_issuers.is_empty() {
        return Err(reject("no valid issuers are configured"));
    }
    if params.config.valid_issuers.iter().any(|valid| valid == issuer) {
        Ok(issuer.to_string())
    } else {
        Err(reject("issuer is not a valid issuer"))
    }
}

/// A stage of the validation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStage {
    /// Size check and XML parsing.
    Parse,
    /// Signature resolution.
    ResolveSignature,
    /// Top-level conditions.
    ValidateConditions,
    /// Subject confirmation data.
    ValidateSubjectConfirmations,
    /// Issuer policy.
    ValidateIssuer,
    /// Replay detection.
    ValidateReplay,
    /// Claims projection.
    ProjectClaims,
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parse => "parse",
            Self::ResolveSignature => "resolve_signature",
            Self::ValidateConditions => "validate_conditions",
            Self::ValidateSubjectConfirmations => "validate_subject_confirmations",
            Self::ValidateIssuer => "validate_issuer",
            Self::ValidateReplay => "validate_replay",
            Self::ProjectClaims => "project_claims",
        };
        f.write_str(name)
    }
}

/// The result of a successful validation.
#[derive(Debug, Clone)]
pub struct ValidatedToken {
    /// The identity projected from the assertion.
    pub identity: ClaimsIdentity,
    /// The validated token.
    pub token: Saml2SecurityToken,
}

impl ValidatedToken {
    /// Returns the key that verified the signature, if the token was signed.
    #[must_use]
    pub const fn signing_key(&self) -> Option<&TrustKey> {
        self.token.signing_key()
    }
}

/// Reads, validates, creates and writes SAML 2.0 assertion tokens.
#[derive(Debug, Clone)]
pub struct Saml2TokenHandler {
    params: Arc<ValidationParameters>,
}

impl Saml2TokenHandler {
    /// Creates a handler, checking the configuration.
    pub fn new(params: ValidationParameters) -> SamlResult<Self> {
        Self::from_shared(Arc::new(params))
    }

    /// Creates a handler over shared parameters.
    pub fn from_shared(params: Arc<ValidationParameters>) -> SamlResult<Self> {
        params.config.validate()?;
        Ok(Self { params })
    }

    /// Returns the validation parameters.
    #[must_use]
    pub fn params(&self) -> &ValidationParameters {
        &self.params
    }

    /// Returns true if the token looks like a SAML 2.0 assertion this
    /// handler can read. Never fails.
    #[must_use]
    pub fn can_read_token(&self, token: &str) -> bool {
        if token.trim().is_empty() || self.check_size(token).is_err() {
            return false;
        }
        parse_document(token).is_ok_and(|root| root.is(SAML_NS, "Assertion"))
    }

    /// Parses a token without making any trust decision.
    pub fn read_token(&self, token: &str) -> SamlResult<Saml2SecurityToken> {
        self.check_size(token)?;
        Ok(Saml2SecurityToken::new(read_assertion(token)?))
    }

    /// Validates a token at the current time.
    pub fn validate_token(&self, token: &str) -> SamlResult<ValidatedToken> {
        self.validate_token_at(token, Utc::now())
    }

    /// Validates a token at `now`.
    pub fn validate_token_at(&self, token: &str, now: DateTime<Utc>) -> SamlResult<ValidatedToken> {
        let params = &*self.params;

        gate(ValidationStage::Parse, self.check_size(token))?;

        let resolver = SignatureResolver::new(params);
        let security_token = if params.signature_validator.is_some() {
            gate(ValidationStage::ResolveSignature, resolver.resolve(token))?
        } else {
            let mut security_token =
                Saml2SecurityToken::new(gate(ValidationStage::Parse, read_assertion(token))?);
            let signing_key = gate(
                ValidationStage::ResolveSignature,
                resolver.resolve_assertion(token, security_token.assertion()),
            )?;
            if let Some(key) = signing_key {
                security_token.set_signing_key(key);
            }
            security_token
        };
        let assertion = security_token.assertion();

        let conditions = ConditionValidator::new(params);
        gate(
            ValidationStage::ValidateConditions,
            conditions.validate(assertion.conditions.as_ref(), now),
        )?;
        gate(
            ValidationStage::ValidateSubjectConfirmations,
            conditions.validate_subject_confirmations(assertion, now),
        )?;

        let issuer = gate(
            ValidationStage::ValidateIssuer,
            match &params.issuer_validator {
                Some(validator) => validator.validate(&assertion.issuer, &security_token, params),
                None => validate_issuer_default(&assertion.issuer, params),
            },
        )?;

        gate(ValidationStage::ValidateReplay, self.check_replay(token, &security_token, now))?;

        let mut identity = gate(
            ValidationStage::ProjectClaims,
            ClaimsProjector::new(params).project(assertion, &issuer),
        )?;
        if params.config.save_signin_token {
            identity.bootstrap_context = Some(token.to_string());
        }

        tracing::info!(
            "validated assertion '{}' from issuer '{}' ({} claim(s))",
            assertion.id,
            issuer,
            identity.claims.len()
        );

        Ok(ValidatedToken {
            identity,
            token: security_token,
        })
    }

    /// Creates an unsigned token from a descriptor.
    pub fn create_token(&self, descriptor: &TokenDescriptor) -> SamlResult<Saml2SecurityToken> {
        issuance::create_token(descriptor)
    }

    /// Serializes a token, signing it when it carries credentials.
    pub fn write_token(&self, token: &Saml2SecurityToken) -> SamlResult<String> {
        issuance::write_token(token)
    }

    fn check_size(&self, token: &str) -> SamlResult<()> {
        let max = self.params.config.max_token_size_bytes;
        if token.len() > max {
            return Err(SamlError::TokenTooLarge {
                size: token.len(),
                max,
            });
        }
        Ok(())
    }

    fn check_replay(
        &self,
        token: &str,
        security_token: &Saml2SecurityToken,
        now: DateTime<Utc>,
    ) -> SamlResult<()> {
        let Some(cache) = &self.params.token_replay_cache else {
            return Ok(());
        };

        let expires = security_token.valid_to().ok_or(SamlError::MissingExpiration)?;
        let retain_until = expires
            .checked_add_signed(self.params.config.clock_skew())
            .unwrap_or(expires);

        if cache.try_find(token, now) || !cache.try_add(token, retain_until, now) {
            return Err(SamlError::TokenReplayed(security_token.id().to_string()));
        }
        Ok(())
    }
}

fn gate<T>(stage: ValidationStage, result: SamlResult<T>) -> SamlResult<T> {
    if let Err(e) = &result {
        tracing::warn!(stage = %stage, kind = ?e.kind(), "token validation failed: {}", e);
    }
    result
}
