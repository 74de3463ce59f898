//! Delegation and issuance round-trip tests.

use chrono::{Duration, SecondsFormat, Utc};
use kc_saml_token::{claim_types, claim_value_types, Claim, ClaimsIdentity, ErrorKind, ValidationParameters};

use crate::common::{alice, config, handler, issue, k1, k1_credentials, IDP};

const NAME: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/name";

fn service(name: &str) -> ClaimsIdentity {
    ClaimsIdentity::new("test").with_claim(Claim::new(NAME, name, IDP))
}

fn trusted() -> anyhow::Result<kc_saml_token::Saml2TokenHandler> {
    handler(ValidationParameters::new(config()).with_issuer_signing_key(k1()))
}

/// An actor chain survives issuance, signing and validation.
#[test]
fn test_actor_chain_round_trip() -> anyhow::Result<()> {
    let now = Utc::now();
    let handler = trusted()?;
    let subject = alice().with_actor(service("gateway").with_actor(service("batch")));
    let token = issue(&handler, now, subject, Some(k1_credentials()?))?;

    let identity = handler.validate_token_at(&token, now)?.identity;

    assert_eq!(identity.actor_depth(), 2);
    let gateway = identity.actor.as_deref().expect("first actor");
    assert_eq!(gateway.find_first(NAME).map(|c| c.value.as_str()), Some("gateway"));
    let batch = gateway.actor.as_deref().expect("second actor");
    assert_eq!(batch.find_first(NAME).map(|c| c.value.as_str()), Some("batch"));
    assert!(batch.actor.is_none());
    assert!(identity.find_first(claim_types::ACTOR).is_none());
    Ok(())
}

/// Chains deeper than the configured limit are refused.
#[test]
fn test_actor_chain_too_deep() -> anyhow::Result<()> {
    let now = Utc::now();
    let handler = trusted()?;
    let subject = alice().with_actor(
        service("one").with_actor(service("two").with_actor(service("three"))),
    );
    let token = issue(&handler, now, subject, Some(k1_credentials()?))?;

    let err = handler.validate_token_at(&token, now).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedDelegation);
    Ok(())
}

/// Authentication claims become an authentication statement and come back
/// as the last claims.
#[test]
fn test_authentication_statement_round_trip() -> anyhow::Result<()> {
    let now = Utc::now();
    let authenticated_at = (now - Duration::minutes(2)).to_rfc3339_opts(SecondsFormat::Millis, true);
    let handler = trusted()?;
    let subject = alice()
        .with_claim(Claim::new(
            claim_types::AUTHENTICATION_METHOD,
            "urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport",
            IDP,
        ))
        .with_claim(Claim::new(claim_types::AUTHENTICATION_INSTANT, &authenticated_at, IDP));
    let token = issue(&handler, now, subject, Some(k1_credentials()?))?;
    assert!(token.contains("AuthnStatement"));

    let identity = handler.validate_token_at(&token, now)?.identity;

    let last = identity.claims.last().expect("claims");
    assert_eq!(last.claim_type, claim_types::AUTHENTICATION_INSTANT);
    assert_eq!(last.value_type, claim_value_types::DATE_TIME);
    assert_eq!(
        identity
            .find_first(claim_types::AUTHENTICATION_METHOD)
            .map(|c| c.value.as_str()),
        Some("urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport")
    );
    Ok(())
}

/// Claims of the same type are written as one multi-valued attribute.
#[test]
fn test_multi_valued_claims() -> anyhow::Result<()> {
    let now = Utc::now();
    let handler = trusted()?;
    let subject = alice().with_claim(Claim::new(claim_types::ROLE, "auditor", IDP));
    let token = issue(&handler, now, subject, Some(k1_credentials()?))?;
    assert_eq!(token.matches(claim_types::ROLE).count(), 1);

    let identity = handler.validate_token_at(&token, now)?.identity;
    let roles: Vec<_> = identity
        .claims_of_type(claim_types::ROLE)
        .map(|c| c.value.as_str())
        .collect();
    assert_eq!(roles, vec!["admin", "auditor"]);
    Ok(())
}
