//! Validation pipeline tests.
//!
//! Every stage after signature resolution is exercised against a token
//! signed with K1.

use std::sync::Arc;

use chrono::{Duration, Utc};
use kc_saml_token::{
    claim_types, ErrorKind, InMemoryReplayCache, SamlError, TokenDescriptor, ValidationParameters,
};

use crate::common::{alice, config, handler, issue, k1, k1_credentials, IDP, SP};

fn trusted_params() -> ValidationParameters {
    ValidationParameters::new(config()).with_issuer_signing_key(k1())
}

/// Claims come out with the validated issuer and in document order.
#[test]
fn test_claims_projection() -> anyhow::Result<()> {
    let now = Utc::now();
    let handler = handler(trusted_params())?;
    let token = issue(&handler, now, alice(), Some(k1_credentials()?))?;

    let identity = handler.validate_token_at(&token, now)?.identity;

    assert_eq!(identity.claims[0].claim_type, claim_types::NAME_IDENTIFIER);
    assert_eq!(identity.claims_of_type(claim_types::ROLE).count(), 1);
    assert!(identity.claims.iter().all(|c| c.issuer == IDP));
    assert!(identity.actor.is_none());
    Ok(())
}

/// Expired tokens fail, but not within the clock skew.
#[test]
fn test_expired_token() -> anyhow::Result<()> {
    let now = Utc::now();
    let handler = handler(trusted_params())?;
    let token = issue(&handler, now, alice(), Some(k1_credentials()?))?;

    let within_skew = now + Duration::minutes(12);
    assert!(handler.validate_token_at(&token, within_skew).is_ok());

    let err = handler
        .validate_token_at(&token, now + Duration::hours(1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConditionViolation);
    assert!(matches!(err, SamlError::AssertionExpired { .. }));
    Ok(())
}

/// A token not yet valid fails.
#[test]
fn test_not_yet_valid_token() -> anyhow::Result<()> {
    let now = Utc::now();
    let handler = handler(trusted_params())?;
    let token = issue(&handler, now, alice(), Some(k1_credentials()?))?;

    let err = handler
        .validate_token_at(&token, now - Duration::hours(1))
        .unwrap_err();
    assert!(matches!(err, SamlError::AssertionNotYetValid { .. }));
    Ok(())
}

/// A token ten times the size ceiling is refused before it is parsed.
#[test]
fn test_oversized_token() -> anyhow::Result<()> {
    let now = Utc::now();
    let issuer = handler(trusted_params())?;
    let token = issue(&issuer, now, alice(), Some(k1_credentials()?))?;

    let limit = token.len() / 10;
    let handler = handler(
        ValidationParameters::new(config().max_token_size_bytes(limit)).with_issuer_signing_key(k1()),
    )?;

    let err = handler.validate_token_at(&token, now).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
    assert!(matches!(err, SamlError::TokenTooLarge { .. }));
    assert!(!handler.can_read_token(&token));
    Ok(())
}

/// Malformed XML is a parse failure.
#[test]
fn test_malformed_token() -> anyhow::Result<()> {
    let handler = handler(trusted_params())?;

    for token in ["", "not xml", "<saml:Assertion", "<!DOCTYPE x><x/>"] {
        let err = handler.validate_token(token).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput, "token {token:?}");
        assert!(!handler.can_read_token(token));
    }
    Ok(())
}

/// A second presentation of the same token is a replay.
#[test]
fn test_replay_detection() -> anyhow::Result<()> {
    let now = Utc::now();
    let cache = Arc::new(InMemoryReplayCache::new());
    let handler = handler(trusted_params().with_replay_cache(cache.clone()))?;
    let token = issue(&handler, now, alice(), Some(k1_credentials()?))?;

    handler.validate_token_at(&token, now)?;
    assert_eq!(cache.len(), 1);

    let err = handler.validate_token_at(&token, now).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReplayDetected);

    let other = issue(&handler, now, alice(), Some(k1_credentials()?))?;
    assert!(handler.validate_token_at(&other, now).is_ok());
    Ok(())
}

/// Replay detection needs an expiry to bound the cache entry.
#[test]
fn test_replay_detection_requires_expiry() -> anyhow::Result<()> {
    let now = Utc::now();
    let handler = handler(trusted_params().with_replay_cache(Arc::new(InMemoryReplayCache::new())))?;
    let mut descriptor = TokenDescriptor::new(IDP, alice()).with_audience(SP);
    descriptor.signing_credentials = Some(k1_credentials()?);
    let token = handler.write_token(&handler.create_token(&descriptor)?)?;

    let err = handler.validate_token_at(&token, now).unwrap_err();
    assert!(matches!(err, SamlError::MissingExpiration));
    Ok(())
}

/// Tokens from an issuer that is not configured are rejected.
#[test]
fn test_untrusted_issuer() -> anyhow::Result<()> {
    let now = Utc::now();
    let mut params = trusted_params();
    params.config.valid_issuers = vec!["https://other.example.com".to_string()];
    let handler = handler(params)?;
    let token = issue(&handler, now, alice(), Some(k1_credentials()?))?;

    let err = handler.validate_token_at(&token, now).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IssuerRejected);
    Ok(())
}

/// Tokens for another audience are rejected unless audience checks are off.
#[test]
fn test_audience_restriction() -> anyhow::Result<()> {
    let now = Utc::now();
    let mut params = trusted_params();
    params.config.valid_audiences = vec!["https://elsewhere.example.com".to_string()];
    let strict = handler(params.clone())?;
    let token = issue(&strict, now, alice(), Some(k1_credentials()?))?;

    let err = strict.validate_token_at(&token, now).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AudienceRejected);

    params.config.validate_audience = false;
    let lenient = handler(params)?;
    assert!(lenient.validate_token_at(&token, now).is_ok());
    Ok(())
}

/// Reading a token makes no trust decision.
#[test]
fn test_read_token_without_validation() -> anyhow::Result<()> {
    let now = Utc::now();
    let handler = handler(ValidationParameters::new(config()))?;
    let token = issue(&handler, now, alice(), Some(k1_credentials()?))?;

    assert!(handler.can_read_token(&token));
    let read = handler.read_token(&token)?;
    assert_eq!(read.assertion().issuer, IDP);
    assert!(read.assertion().is_signed());
    assert!(read.signing_key().is_none());
    assert_eq!(read.valid_to(), Some(now + Duration::minutes(10)).map(truncate_millis));
    Ok(())
}

/// The raw token is kept on the identity when requested.
#[test]
fn test_bootstrap_context() -> anyhow::Result<()> {
    let now = Utc::now();
    let mut params = trusted_params();
    params.config.save_signin_token = true;
    let handler = handler(params)?;
    let token = issue(&handler, now, alice(), Some(k1_credentials()?))?;

    let identity = handler.validate_token_at(&token, now)?.identity;
    assert_eq!(identity.bootstrap_context.as_deref(), Some(token.as_str()));
    Ok(())
}

fn truncate_millis(instant: chrono::DateTime<Utc>) -> chrono::DateTime<Utc> {
    use chrono::DurationRound;
    instant
        .duration_trunc(Duration::milliseconds(1))
        .unwrap_or(instant)
}
