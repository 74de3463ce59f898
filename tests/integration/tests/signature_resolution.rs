//! Signature resolution tests.
//!
//! Tokens are signed with the fixture keys K1 and K3; K2 is a decoy that
//! never signs anything.

use std::sync::Arc;

use chrono::Utc;
use kc_saml_token::{
    ErrorKind, JsonWebKey, KeyResolution, RsaKey, SamlError, SigningCredentials, TrustKey,
    ValidationParameters,
};

use crate::common::{alice, config, handler, issue, k1, k1_credentials, k1_private_key, k2, k3, k3_credentials};

/// A token signed with a trusted key validates and reports that key.
#[test]
fn test_signed_token_round_trip() -> anyhow::Result<()> {
    let now = Utc::now();
    let handler = handler(ValidationParameters::new(config()).with_issuer_signing_key(k1()))?;
    let token = issue(&handler, now, alice(), Some(k1_credentials()?))?;

    let validated = handler.validate_token_at(&token, now)?;

    assert_eq!(validated.identity.name(), Some("alice"));
    assert_eq!(
        validated.signing_key().and_then(TrustKey::key_id),
        Some("k1")
    );
    Ok(())
}

/// The verifying key is found among several configured keys.
#[test]
fn test_verifying_key_found_among_many() -> anyhow::Result<()> {
    let now = Utc::now();
    let handler = handler(
        ValidationParameters::new(config()).with_issuer_signing_keys(vec![k2(), k3(), k1()]),
    )?;
    let token = issue(&handler, now, alice(), Some(k1_credentials()?))?;

    let validated = handler.validate_token_at(&token, now)?;
    assert_eq!(validated.signing_key().and_then(TrustKey::key_id), Some("k1"));
    Ok(())
}

/// A signature by an unknown key is reported as a missing key, which the
/// caller may retry after refreshing its keys.
#[test]
fn test_unknown_key_is_key_not_found() -> anyhow::Result<()> {
    let now = Utc::now();
    let handler = handler(ValidationParameters::new(config()).with_issuer_signing_keys(vec![k1(), k2()]))?;
    let token = issue(&handler, now, alice(), Some(k3_credentials()?))?;

    let err = handler.validate_token_at(&token, now).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::KeyNotFound);
    assert!(err.is_retryable());
    match err {
        SamlError::SignatureKeyNotFound { attempted_keys, .. } => {
            assert_eq!(attempted_keys.len(), 2);
        }
        other => panic!("expected SignatureKeyNotFound, got {other:?}"),
    }
    Ok(())
}

/// When KeyInfo names a configured key that does not verify, no other key
/// is tried and the signature is invalid.
#[test]
fn test_decoy_key_info_is_invalid_signature() -> anyhow::Result<()> {
    let now = Utc::now();
    let handler = handler(ValidationParameters::new(config()).with_issuer_signing_keys(vec![k2(), k1()]))?;
    let decoy = SigningCredentials::new(Arc::new(k1_private_key()?)).with_key(k2());
    let token = issue(&handler, now, alice(), Some(decoy))?;

    let err = handler.validate_token_at(&token, now).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidSignature);
    assert!(!err.is_retryable());
    match err {
        SamlError::SignatureInvalid { attempted_keys, .. } => {
            assert_eq!(attempted_keys, vec!["X509 (kid: k2)".to_string()]);
        }
        other => panic!("expected SignatureInvalid, got {other:?}"),
    }
    Ok(())
}

/// Changing signed content breaks the signature.
#[test]
fn test_tampered_token_is_rejected() -> anyhow::Result<()> {
    let now = Utc::now();
    let handler = handler(ValidationParameters::new(config()).with_issuer_signing_key(k1()))?;
    let token = issue(&handler, now, alice(), Some(k1_credentials()?))?;
    assert!(token.contains(">admin<"));

    let tampered = token.replace(">admin<", ">root<");
    let err = handler.validate_token_at(&tampered, now).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidSignature);
    Ok(())
}

/// Bare RSA parameters and JSON Web Keys verify like certificates.
#[test]
fn test_rsa_and_jwk_trust_keys() -> anyhow::Result<()> {
    let now = Utc::now();
    let public_key = k1_private_key()?.public_key()?;

    let rsa = RsaKey::from_parameters(public_key.clone()).with_key_id("rsa-k1");
    let jwk = JsonWebKey::rsa_public("jwk-k1", &public_key);

    for (key, kid) in [(TrustKey::from(rsa), "rsa-k1"), (TrustKey::from(jwk), "jwk-k1")] {
        let handler = handler(ValidationParameters::new(config()).with_issuer_signing_key(key))?;
        let token = issue(&handler, now, alice(), Some(k1_credentials()?))?;

        let validated = handler.validate_token_at(&token, now)?;
        assert_eq!(validated.signing_key().and_then(TrustKey::key_id), Some(kid));
    }
    Ok(())
}

/// A key resolver's keys replace the configured keys.
#[test]
fn test_key_resolver_supplies_keys() -> anyhow::Result<()> {
    let now = Utc::now();
    let params = ValidationParameters::new(config())
        .with_issuer_signing_key(k2())
        .with_key_resolver(
            |_: &str, _: Option<&kc_saml_token::KeyInfo>, _: &ValidationParameters| -> KeyResolution {
                KeyResolution::Keys(vec![k1().into()])
            },
        );
    let handler = handler(params)?;
    let token = issue(&handler, now, alice(), Some(k1_credentials()?))?;

    let validated = handler.validate_token_at(&token, now)?;
    assert_eq!(validated.signing_key().and_then(TrustKey::key_id), Some("k1"));
    Ok(())
}

/// No configured keys at all is an invalid signature, not a missing key.
#[test]
fn test_no_keys_is_invalid_signature() -> anyhow::Result<()> {
    let now = Utc::now();
    let handler = handler(ValidationParameters::new(config()))?;
    let token = issue(&handler, now, alice(), Some(k1_credentials()?))?;

    let err = handler.validate_token_at(&token, now).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSignature);
    Ok(())
}

/// An unsigned token is rejected unless signatures are optional.
#[test]
fn test_unsigned_token() -> anyhow::Result<()> {
    let now = Utc::now();
    let strict = handler(ValidationParameters::new(config()).with_issuer_signing_key(k1()))?;
    let token = issue(&strict, now, alice(), None)?;

    let err = strict.validate_token_at(&token, now).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSignaturePresent);

    let lenient = handler(ValidationParameters::new(config().require_signed_tokens(false)))?;
    let validated = lenient.validate_token_at(&token, now)?;
    assert!(validated.signing_key().is_none());
    Ok(())
}
