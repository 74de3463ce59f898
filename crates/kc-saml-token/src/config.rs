//! Validation configuration.
//!
//! [`ValidationConfig`] is plain serde data that can be loaded from any
//! configuration source. [`ValidationParameters`] adds the trust material
//! and the pluggable hooks; it is shared read-only between concurrent
//! validations.

use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::conditions::AudienceValidator;
use crate::error::{SamlError, SamlResult};
use crate::handler::IssuerValidator;
use crate::keys::TrustKey;
use crate::replay::TokenReplayCache;
use crate::resolver::{IssuerSigningKeyResolver, SignatureValidator};
use crate::signature::{SignatureVerifier, XmlDsigVerifier};
use crate::types::DEFAULT_ISSUER;

/// Token validation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Tokens longer than this many bytes are rejected before parsing.
    #[serde(default = "default_max_token_size")]
    pub max_token_size_bytes: usize,
    /// Reject assertions without a signature.
    #[serde(default = "default_true")]
    pub require_signed_tokens: bool,
    /// Clock skew tolerated on every lifetime check, in seconds.
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: u64,
    /// Audiences accepted by the default audience check.
    #[serde(default)]
    pub valid_audiences: Vec<String>,
    /// Issuers accepted by the default issuer check.
    #[serde(default)]
    pub valid_issuers: Vec<String>,
    /// Enforce audience restrictions.
    #[serde(default = "default_true")]
    pub validate_audience: bool,
    /// Enforce the issuer policy.
    #[serde(default = "default_true")]
    pub validate_issuer: bool,
    /// Enforce NotBefore/NotOnOrAfter windows.
    #[serde(default = "default_true")]
    pub validate_lifetime: bool,
    /// Treat a missing NotOnOrAfter as a violation.
    #[serde(default)]
    pub require_expiration_time: bool,
    /// Keep the raw token as the identity's bootstrap context.
    #[serde(default)]
    pub save_signin_token: bool,
    /// Maximum depth of nested actor identities.
    #[serde(default = "default_max_actor_depth")]
    pub max_actor_depth: usize,
    /// Authentication type stamped on produced identities.
    #[serde(default = "default_authentication_type")]
    pub authentication_type: String,
    /// Issuer used for claims when validation yields a blank issuer.
    #[serde(default = "default_issuer")]
    pub default_issuer: String,
    /// Let SHA-1 signature methods past the policy check.
    #[serde(default)]
    pub allow_sha1_signatures: bool,
}

fn default_max_token_size() -> usize {
    256_000
}

const fn default_true() -> bool {
    true
}

const fn default_clock_skew() -> u64 {
    300
}

const fn default_max_actor_depth() -> usize {
    2
}

fn default_authentication_type() -> String {
    "AuthenticationTypes.Federation".to_string()
}

fn default_issuer() -> String {
    DEFAULT_ISSUER.to_string()
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_token_size_bytes: default_max_token_size(),
            require_signed_tokens: true,
            clock_skew_secs: default_clock_skew(),
            valid_audiences: Vec::new(),
            valid_issuers: Vec::new(),
            validate_audience: true,
            validate_issuer: true,
            validate_lifetime: true,
            require_expiration_time: false,
            save_signin_token: false,
            max_actor_depth: default_max_actor_depth(),
            authentication_type: default_authentication_type(),
            default_issuer: default_issuer(),
            allow_sha1_signatures: false,
        }
    }
}

impl ValidationConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an accepted audience.
    #[must_use]
    pub fn valid_audience(mut self, audience: impl Into<String>) -> Self {
        self.valid_audiences.push(audience.into());
        self
    }

    /// Adds an accepted issuer.
    #[must_use]
    pub fn valid_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.valid_issuers.push(issuer.into());
        self
    }

    /// Sets the token size ceiling.
    #[must_use]
    pub const fn max_token_size_bytes(mut self, max: usize) -> Self {
        self.max_token_size_bytes = max;
        self
    }

    /// Sets whether signatures are required.
    #[must_use]
    pub const fn require_signed_tokens(mut self, require: bool) -> Self {
        self.require_signed_tokens = require;
        self
    }

    /// Sets the clock skew tolerance in seconds.
    #[must_use]
    pub const fn clock_skew_secs(mut self, secs: u64) -> Self {
        self.clock_skew_secs = secs;
        self
    }

    /// Returns the clock skew as a duration.
    #[must_use]
    pub fn clock_skew(&self) -> Duration {
        let secs = i64::try_from(self.clock_skew_secs)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1_000);
        Duration::seconds(secs)
    }

    /// Checks the configuration for unusable values.
    pub fn validate(&self) -> SamlResult<()> {
        if self.max_token_size_bytes == 0 {
            return Err(SamlError::InvalidConfiguration(
                "max_token_size_bytes must be greater than zero".to_string(),
            ));
        }
        if self.authentication_type.trim().is_empty() {
            return Err(SamlError::InvalidConfiguration(
                "authentication_type must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration plus trust material and hooks for one relying party.
#[derive(Clone, Default)]
pub struct ValidationParameters {
    /// Validation policy.
    pub config: ValidationConfig,
    /// The preferred issuer signing key.
    pub issuer_signing_key: Option<TrustKey>,
    /// Additional issuer signing keys.
    pub issuer_signing_keys: Vec<TrustKey>,
    /// Callback choosing candidate keys for a token.
    pub issuer_signing_key_resolver: Option<Arc<dyn IssuerSigningKeyResolver>>,
    /// Replaces signature resolution entirely.
    pub signature_validator: Option<Arc<dyn SignatureValidator>>,
    /// Replaces the default audience check.
    pub audience_validator: Option<Arc<dyn AudienceValidator>>,
    /// Replaces the default issuer check.
    pub issuer_validator: Option<Arc<dyn IssuerValidator>>,
    /// Replay detection; none means no replay detection.
    pub token_replay_cache: Option<Arc<dyn TokenReplayCache>>,
    /// Verifies a signature under one key; defaults to [`XmlDsigVerifier`].
    pub signature_verifier: Option<Arc<dyn SignatureVerifier>>,
}

impl ValidationParameters {
    /// Creates parameters with the given policy and no keys.
    #[must_use]
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Sets the preferred issuer signing key.
    #[must_use]
    pub fn with_issuer_signing_key(mut self, key: impl Into<TrustKey>) -> Self {
        self.issuer_signing_key = Some(key.into());
        self
    }

    /// Adds issuer signing keys.
    #[must_use]
    pub fn with_issuer_signing_keys<K: Into<TrustKey>>(
        mut self,
        keys: impl IntoIterator<Item = K>,
    ) -> Self {
        self.issuer_signing_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Sets the signing key resolver callback.
    #[must_use]
    pub fn with_key_resolver(mut self, resolver: impl IssuerSigningKeyResolver + 'static) -> Self {
        self.issuer_signing_key_resolver = Some(Arc::new(resolver));
        self
    }

    /// Sets a validator that replaces signature resolution.
    #[must_use]
    pub fn with_signature_validator(mut self, validator: impl SignatureValidator + 'static) -> Self {
        self.signature_validator = Some(Arc::new(validator));
        self
    }

    /// Sets a custom audience validator.
    #[must_use]
    pub fn with_audience_validator(mut self, validator: impl AudienceValidator + 'static) -> Self {
        self.audience_validator = Some(Arc::new(validator));
        self
    }

    /// Sets a custom issuer validator.
    #[must_use]
    pub fn with_issuer_validator(mut self, validator: impl IssuerValidator + 'static) -> Self {
        self.issuer_validator = Some(Arc::new(validator));
        self
    }

    /// Sets the replay cache. The cache is shared, not copied.
    #[must_use]
    pub fn with_replay_cache(mut self, cache: Arc<dyn TokenReplayCache>) -> Self {
        self.token_replay_cache = Some(cache);
        self
    }

    /// Sets the per-key signature verifier.
    #[must_use]
    pub fn with_signature_verifier(mut self, verifier: impl SignatureVerifier + 'static) -> Self {
        self.signature_verifier = Some(Arc::new(verifier));
        self
    }

    /// Returns the configured signing keys: the preferred key first.
    pub fn signing_keys(&self) -> impl Iterator<Item = &TrustKey> {
        self.issuer_signing_key
            .iter()
            .chain(self.issuer_signing_keys.iter())
    }

    /// Returns the verifier to use for signatures.
    #[must_use]
    pub fn verifier(&self) -> Arc<dyn SignatureVerifier> {
        self.signature_verifier.clone().unwrap_or_else(|| {
            Arc::new(XmlDsigVerifier::new().allow_sha1(self.config.allow_sha1_signatures))
        })
    }
}

impl fmt::Debug for ValidationParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationParameters")
            .field("config", &self.config)
            .field("issuer_signing_key", &self.issuer_signing_key)
            .field("issuer_signing_keys", &self.issuer_signing_keys)
            .field("key_resolver", &self.issuer_signing_key_resolver.is_some())
            .field("signature_validator", &self.signature_validator.is_some())
            .field("audience_validator", &self.audience_validator.is_some())
            .field("issuer_validator", &self.issuer_validator.is_some())
            .field("token_replay_cache", &self.token_replay_cache.is_some())
            .field("signature_verifier", &self.signature_verifier.is_some())
            .finish()
    }
}
