//! XML Signature creation.
//!
//! Produces enveloped signatures over assertions written by this crate.

use std::sync::Arc;

use base64::Engine;
use kc_crypto::RsaPrivateKey;

use crate::error::{SamlError, SamlResult};
use crate::keys::TrustKey;
use crate::types::{KeyInfo, SAML_NS, XMLDSIG_NS};
use crate::xml::parse_document;
use crate::xml::writer::write_key_info;

use super::{digest_algorithm, normalize_xml_whitespace, SignatureAlgorithm, SignatureConfig};

/// Key material and algorithm used to sign outgoing tokens.
#[derive(Debug, Clone)]
pub struct SigningCredentials {
    /// The signing key.
    pub private_key: Arc<RsaPrivateKey>,
    /// Public identity of the key, described in `KeyInfo` so relying
    /// parties can select it.
    pub key: Option<TrustKey>,
    /// Signature algorithm.
    pub algorithm: SignatureAlgorithm,
}

impl SigningCredentials {
    /// Creates RSA-SHA256 credentials for a key.
    #[must_use]
    pub fn new(private_key: Arc<RsaPrivateKey>) -> Self {
        Self {
            private_key,
            key: None,
            algorithm: SignatureAlgorithm::RsaSha256,
        }
    }

    /// Creates credentials from PEM-encoded key and certificate.
    pub fn from_pem(private_key_pem: &str, certificate_pem: Option<&str>) -> SamlResult<Self> {
        let private_key_der = pem_to_der(private_key_pem, "PRIVATE KEY")
            .or_else(|| pem_to_der(private_key_pem, "RSA PRIVATE KEY"))
            .ok_or_else(|| SamlError::InvalidConfiguration("invalid private key PEM".to_string()))?;
        let private_key = RsaPrivateKey::from_der(&private_key_der)
            .map_err(|e| SamlError::InvalidConfiguration(format!("invalid private key: {e}")))?;

        let mut credentials = Self::new(Arc::new(private_key));
        if let Some(pem) = certificate_pem {
            let der = pem_to_der(pem, "CERTIFICATE").ok_or_else(|| {
                SamlError::InvalidConfiguration("invalid certificate PEM".to_string())
            })?;
            credentials.key = Some(crate::keys::X509Key::from_der(der).into());
        }
        Ok(credentials)
    }

    /// Sets the public key identity described in `KeyInfo`.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<TrustKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets the signature algorithm.
    #[must_use]
    pub const fn with_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }
}

/// XML document signer.
///
/// Signs a standalone assertion document; the `ds:Signature` element is
/// inserted directly after `saml:Issuer`.
pub struct XmlSigner {
    private_key: Arc<RsaPrivateKey>,
    key_info: Option<KeyInfo>,
    config: SignatureConfig,
}

impl XmlSigner {
    /// Creates a signer for the given credentials.
    pub fn new(credentials: &SigningCredentials) -> SamlResult<Self> {
        let key_info = credentials
            .key
            .as_ref()
            .map(TrustKey::key_info)
            .transpose()
            .map_err(|e| SamlError::SignatureCreation(format!("cannot describe signing key: {e}")))?;

        Ok(Self {
            private_key: Arc::clone(&credentials.private_key),
            key_info,
            config: SignatureConfig::with_algorithm(credentials.algorithm),
        })
    }

    /// Sets the signature configuration.
    #[must_use]
    pub fn with_config(mut self, config: SignatureConfig) -> Self {
        self.config = config;
        self
    }

    /// Signs an assertion document.
    ///
    /// # Returns
    ///
    /// The document with the `<ds:Signature>` element inserted.
    pub fn sign(&self, xml: &str) -> SamlResult<String> {
        let algorithm = self.config.algorithm;
        let rsa_algorithm = algorithm.rsa_algorithm().ok_or_else(|| {
            SamlError::SignatureCreation(format!("unsupported signature algorithm: {algorithm:?}"))
        })?;
        let hash = digest_algorithm(algorithm.digest_uri()).ok_or_else(|| {
            SamlError::SignatureCreation(format!("unsupported digest for {algorithm:?}"))
        })?;

        let root = parse_document(xml)?;
        let reference_id = root
            .attr("ID")
            .ok_or_else(|| SamlError::SignatureCreation("element to sign has no ID".to_string()))?;
        if root.child(XMLDSIG_NS, "Signature").is_some() {
            return Err(SamlError::SignatureCreation("document is already signed".to_string()));
        }
        let insert_position = root
            .child(SAML_NS, "Issuer")
            .map(|issuer| issuer.span.end)
            .ok_or_else(|| {
                SamlError::SignatureCreation("assertion has no Issuer element".to_string())
            })?;

        let canonical_element = normalize_xml_whitespace(&xml[root.span.clone()]);
        let digest = kc_crypto::hash(hash, canonical_element.as_bytes());
        let digest_b64 = base64::engine::general_purpose::STANDARD.encode(digest);

        let signed_info = build_signed_info(reference_id, &digest_b64, &self.config);
        let canonical_signed_info = normalize_xml_whitespace(&signed_info);

        let signature_value = self
            .private_key
            .sign(canonical_signed_info.as_bytes(), rsa_algorithm)
            .map_err(|e| SamlError::SignatureCreation(format!("RSA signing failed: {e}")))?;
        let signature_b64 = base64::engine::general_purpose::STANDARD.encode(signature_value);

        let key_info = self
            .key_info
            .as_ref()
            .filter(|_| self.config.include_key_info);
        let signature_element = build_signature_element(&signed_info, &signature_b64, key_info);

        Ok(format!(
            "{}{}{}",
            &xml[..insert_position],
            signature_element,
            &xml[insert_position..]
        ))
    }
}

/// Extracts DER data from a PEM string.
fn pem_to_der(pem: &str, label: &str) -> Option<Vec<u8>> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");

    let start = pem.find(&begin)? + begin.len();
    let end_pos = pem.find(&end)?;

    let b64_data: String = pem
        .get(start..end_pos)?
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    base64::engine::general_purpose::STANDARD.decode(b64_data).ok()
}

fn build_signed_info(reference_id: &str, digest_b64: &str, config: &SignatureConfig) -> String {
    format!(
        r##"<ds:SignedInfo xmlns:ds="{XMLDSIG_NS}">
<ds:CanonicalizationMethod Algorithm="{canonicalization}"/>
<ds:SignatureMethod Algorithm="{signature}"/>
<ds:Reference URI="#{reference_id}">
<ds:Transforms>
<ds:Transform Algorithm="{enveloped}"/>
<ds:Transform Algorithm="{canonicalization}"/>
</ds:Transforms>
<ds:DigestMethod Algorithm="{digest}"/>
<ds:DigestValue>{digest_b64}</ds:DigestValue>
</ds:Reference>
</ds:SignedInfo>"##,
        canonicalization = config.canonicalization.uri(),
        signature = config.algorithm.uri(),
        enveloped = crate::types::transforms::ENVELOPED_SIGNATURE,
        digest = config.algorithm.digest_uri(),
    )
}

fn build_signature_element(
    signed_info: &str,
    signature_value: &str,
    key_info: Option<&KeyInfo>,
) -> String {
    let mut signature = format!(
        r#"<ds:Signature xmlns:ds="{XMLDSIG_NS}">
{signed_info}
<ds:SignatureValue>{signature_value}</ds:SignatureValue>"#
    );

    if let Some(key_info) = key_info {
        signature.push('\n');
        signature.push_str(&write_key_info(key_info));
    }

    signature.push_str("\n</ds:Signature>");
    signature
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::X509Key;
    use crate::signature::{SignatureVerifier, VerificationError, XmlDsigVerifier};
    use crate::types::Assertion;
    use crate::xml::reader::read_assertion;
    use crate::xml::writer::write_assertion;

    const K1_PKCS8: &[u8] = include_bytes!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../tests/fixtures/k1.pk8.der"
    ));
    const K1_CERT: &[u8] = include_bytes!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../tests/fixtures/k1.crt.der"
    ));
    const K2_CERT: &[u8] = include_bytes!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../tests/fixtures/k2.crt.der"
    ));

    fn k1_credentials() -> SigningCredentials {
        let key = RsaPrivateKey::from_pkcs8(K1_PKCS8).unwrap();
        SigningCredentials::new(Arc::new(key)).with_key(X509Key::from_der(K1_CERT))
    }

    #[test]
    fn signed_assertion_verifies_with_signing_key() {
        let xml = write_assertion(&Assertion::new("https://idp.example.com"));
        let signed = XmlSigner::new(&k1_credentials()).unwrap().sign(&xml).unwrap();

        assert!(signed.contains("<ds:Signature"));
        assert!(signed.contains("<ds:X509Certificate>"));

        let assertion = read_assertion(&signed).unwrap();
        let signature = assertion.signature.as_ref().unwrap();
        let k1: TrustKey = X509Key::from_der(K1_CERT).into();
        XmlDsigVerifier::new().verify(signature, &k1).unwrap();
    }

    #[test]
    fn other_key_does_not_verify() {
        let xml = write_assertion(&Assertion::new("https://idp.example.com"));
        let signed = XmlSigner::new(&k1_credentials()).unwrap().sign(&xml).unwrap();

        let assertion = read_assertion(&signed).unwrap();
        let k2: TrustKey = X509Key::from_der(K2_CERT).into();
        let err = XmlDsigVerifier::new()
            .verify(assertion.signature.as_ref().unwrap(), &k2)
            .unwrap_err();
        assert!(matches!(err, VerificationError::SignatureMismatch));
    }

    #[test]
    fn tampering_breaks_the_digest() {
        let xml = write_assertion(&Assertion::new("https://idp.example.com"));
        let signed = XmlSigner::new(&k1_credentials()).unwrap().sign(&xml).unwrap();
        let tampered = signed.replace("https://idp.example.com", "https://evil.example.com");

        let assertion = read_assertion(&tampered).unwrap();
        let k1: TrustKey = X509Key::from_der(K1_CERT).into();
        let err = XmlDsigVerifier::new()
            .verify(assertion.signature.as_ref().unwrap(), &k1)
            .unwrap_err();
        assert!(matches!(err, VerificationError::DigestMismatch));
    }

    #[test]
    fn signing_twice_is_refused() {
        let signer = XmlSigner::new(&k1_credentials()).unwrap();
        let signed = signer
            .sign(&write_assertion(&Assertion::new("https://idp.example.com")))
            .unwrap();
        assert!(signer.sign(&signed).is_err());
    }

    #[test]
    fn test_pem_to_der_extraction() {
        let pem = "-----BEGIN CERTIFICATE-----\nTUIJ\n-----END CERTIFICATE-----";
        let der = pem_to_der(pem, "CERTIFICATE");
        assert!(der.is_some());
    }
}
