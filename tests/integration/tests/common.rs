//! Common test utilities and fixtures.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use kc_crypto::RsaPrivateKey;
use kc_saml_token::{
    claim_types, Claim, ClaimsIdentity, Saml2TokenHandler, SigningCredentials, TokenDescriptor,
    ValidationConfig, ValidationParameters, X509Key,
};

pub const IDP: &str = "https://idp.example.com";
pub const SP: &str = "https://sp.example.com";

const K1_PKCS8: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/../fixtures/k1.pk8.der"));
const K1_CERT: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/../fixtures/k1.crt.der"));
const K2_CERT: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/../fixtures/k2.crt.der"));
const K3_PKCS8: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/../fixtures/k3.pk8.der"));
const K3_CERT: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/../fixtures/k3.crt.der"));

/// Initializes test logging once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("kc_saml_token=debug")
        .with_test_writer()
        .try_init();
}

pub fn k1_private_key() -> anyhow::Result<RsaPrivateKey> {
    Ok(RsaPrivateKey::from_pkcs8(K1_PKCS8)?)
}

pub fn k1() -> X509Key {
    X509Key::from_der(K1_CERT).with_key_id("k1")
}

pub fn k2() -> X509Key {
    X509Key::from_der(K2_CERT).with_key_id("k2")
}

pub fn k3() -> X509Key {
    X509Key::from_der(K3_CERT).with_key_id("k3")
}

/// Credentials that sign with K1 and describe K1's certificate in KeyInfo.
pub fn k1_credentials() -> anyhow::Result<SigningCredentials> {
    Ok(SigningCredentials::new(Arc::new(k1_private_key()?)).with_key(k1()))
}

/// Credentials that sign with K3 and describe K3's certificate in KeyInfo.
pub fn k3_credentials() -> anyhow::Result<SigningCredentials> {
    let key = RsaPrivateKey::from_pkcs8(K3_PKCS8)?;
    Ok(SigningCredentials::new(Arc::new(key)).with_key(k3()))
}

/// Validation configuration trusting [`IDP`] for [`SP`].
pub fn config() -> ValidationConfig {
    ValidationConfig::new().valid_issuer(IDP).valid_audience(SP)
}

pub fn handler(params: ValidationParameters) -> anyhow::Result<Saml2TokenHandler> {
    init_tracing();
    Ok(Saml2TokenHandler::new(params)?)
}

/// A subject named alice with a role and an email.
pub fn alice() -> ClaimsIdentity {
    ClaimsIdentity::new("test")
        .with_claim(Claim::new(claim_types::NAME_IDENTIFIER, "alice", IDP))
        .with_claim(Claim::new(claim_types::ROLE, "admin", IDP))
        .with_claim(Claim::new(
            "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress",
            "alice@example.com",
            IDP,
        ))
}

/// A descriptor valid from one minute before `now` to ten minutes after.
pub fn descriptor(now: DateTime<Utc>, subject: ClaimsIdentity) -> TokenDescriptor {
    TokenDescriptor::new(IDP, subject)
        .with_audience(SP)
        .with_lifetime(now - Duration::minutes(1), now + Duration::minutes(10))
}

/// Issues a token for `subject`, signed with `credentials`.
pub fn issue(
    handler: &Saml2TokenHandler,
    now: DateTime<Utc>,
    subject: ClaimsIdentity,
    credentials: Option<SigningCredentials>,
) -> anyhow::Result<String> {
    let mut descriptor = descriptor(now, subject);
    descriptor.signing_credentials = credentials;
    let token = handler.create_token(&descriptor)?;
    Ok(handler.write_token(&token)?)
}
