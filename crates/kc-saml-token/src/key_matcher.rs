//! Structural key matching.
//!
//! Decides whether a configured [`TrustKey`] is the key a document's
//! `KeyInfo` describes. No cryptography happens here: certificates are
//! compared by decoded DER bytes, RSA parameters by their base64url text.
//! A match is a diagnostic signal only; it never makes a key trusted.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};

use crate::keys::{JsonWebKey, TrustKey, X509Key};
use crate::signature::Signature;
use crate::types::{KeyInfo, RsaKeyValue};

/// Returns true if `key` structurally matches `key_info`.
///
/// Total: missing or undecodable data yields `false`.
#[must_use]
pub fn matches(key: &TrustKey, key_info: &KeyInfo) -> bool {
    match key {
        TrustKey::X509(key) => matches_x509(key, key_info),
        TrustKey::Rsa(key) => key
            .parameters()
            .ok()
            .zip(key_info.rsa_key_value.as_ref())
            .is_some_and(|(public, value)| {
                rsa_value_matches(
                    &URL_SAFE_NO_PAD.encode(public.modulus()),
                    &URL_SAFE_NO_PAD.encode(public.exponent()),
                    value,
                )
            }),
        TrustKey::Jwk(key) => matches_jwk(key, key_info),
    }
}

/// Returns true if `key` matches the `KeyInfo` of `signature`.
#[must_use]
pub fn matches_signature(key: &TrustKey, signature: &Signature) -> bool {
    signature
        .key_info
        .as_ref()
        .is_some_and(|key_info| matches(key, key_info))
}

fn matches_x509(key: &X509Key, key_info: &KeyInfo) -> bool {
    contains_certificate(key_info, key.certificate_der())
}

fn matches_jwk(key: &JsonWebKey, key_info: &KeyInfo) -> bool {
    let by_parameters = match (&key.n, &key.e, &key_info.rsa_key_value) {
        (Some(n), Some(e), Some(value)) => to_base64url(n)
            .zip(to_base64url(e))
            .is_some_and(|(n, e)| rsa_value_matches(&n, &e, value)),
        _ => false,
    };

    by_parameters
        || key
            .x5c
            .iter()
            .filter_map(|certificate| decode_standard(certificate))
            .any(|der| contains_certificate(key_info, &der))
}

fn contains_certificate(key_info: &KeyInfo, der: &[u8]) -> bool {
    key_info
        .certificates()
        .filter_map(decode_standard)
        .any(|candidate| candidate == der)
}

/// Compares normalized base64url `n`/`e` against an `RSAKeyValue`, whose
/// text may use either alphabet and may be wrapped.
fn rsa_value_matches(modulus: &str, exponent: &str, value: &RsaKeyValue) -> bool {
    to_base64url(&value.modulus).is_some_and(|m| m == modulus)
        && to_base64url(&value.exponent).is_some_and(|e| e == exponent)
}

/// Re-encodes base64 or base64url text as unpadded base64url of the
/// minimal big-endian integer.
fn to_base64url(text: &str) -> Option<String> {
    let compact: String = text.split_whitespace().collect();
    let bytes = STANDARD
        .decode(&compact)
        .ok()
        .or_else(|| URL_SAFE_NO_PAD.decode(compact.trim_end_matches('=')).ok())?;
    // Sign padding is not part of the key's identity
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    Some(URL_SAFE_NO_PAD.encode(&bytes[start..]))
}

fn decode_standard(text: &str) -> Option<Vec<u8>> {
    let compact: String = text.split_whitespace().collect();
    STANDARD.decode(compact).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyType, RsaKey};
    use crate::types::X509Data;
    use kc_crypto::RsaPublicKey;

    const CERT_A: &[u8] = b"certificate-a-der-bytes";
    const CERT_B: &[u8] = b"certificate-b-der-bytes";

    fn x509_key_info(certs: &[&[u8]]) -> KeyInfo {
        KeyInfo {
            x509_data: vec![X509Data {
                certificates: certs.iter().map(|c| STANDARD.encode(c)).collect(),
                ..X509Data::default()
            }],
            ..KeyInfo::default()
        }
    }

    fn rsa_key_info(modulus: &[u8], exponent: &[u8]) -> KeyInfo {
        KeyInfo {
            rsa_key_value: Some(RsaKeyValue {
                modulus: STANDARD.encode(modulus),
                exponent: STANDARD.encode(exponent),
            }),
            ..KeyInfo::default()
        }
    }

    fn bare_jwk() -> JsonWebKey {
        JsonWebKey {
            kty: KeyType::Rsa,
            key_use: None,
            alg: None,
            kid: None,
            x5c: Vec::new(),
            n: None,
            e: None,
        }
    }

    #[test]
    fn x509_matches_by_decoded_bytes() {
        let key = TrustKey::from(X509Key::from_der(CERT_B));
        assert!(matches(&key, &x509_key_info(&[CERT_A, CERT_B])));
        assert!(!matches(&key, &x509_key_info(&[CERT_A])));
    }

    #[test]
    fn x509_match_ignores_base64_line_breaks() {
        let encoded = STANDARD.encode(CERT_A);
        let wrapped = format!("{}\n  {}", &encoded[..8], &encoded[8..]);
        let key_info = KeyInfo {
            x509_data: vec![X509Data::with_certificate(wrapped)],
            ..KeyInfo::default()
        };
        assert!(matches(&TrustKey::from(X509Key::from_der(CERT_A)), &key_info));
    }

    #[test]
    fn x509_never_matches_rsa_key_value() {
        let key = TrustKey::from(X509Key::from_der(CERT_A));
        assert!(!matches(&key, &rsa_key_info(&[0xc5, 0x01], &[1, 0, 1])));
        assert!(!matches(&key, &KeyInfo::default()));
    }

    #[test]
    fn rsa_matches_modulus_and_exponent() {
        let key = TrustKey::from(RsaKey::from_parameters(RsaPublicKey::new(&[0xc5, 0x01], &[1, 0, 1])));
        assert!(matches(&key, &rsa_key_info(&[0xc5, 0x01], &[1, 0, 1])));
        // Sign byte in the document does not change identity
        assert!(matches(&key, &rsa_key_info(&[0x00, 0xc5, 0x01], &[1, 0, 1])));
        assert!(!matches(&key, &rsa_key_info(&[0xc5, 0x02], &[1, 0, 1])));
        assert!(!matches(&key, &rsa_key_info(&[0xc5, 0x01], &[3])));
        assert!(!matches(&key, &x509_key_info(&[CERT_A])));
    }

    #[test]
    fn jwk_matches_by_parameters() {
        let jwk = JsonWebKey::rsa_public("k", &RsaPublicKey::new(&[0xfb, 0xff], &[1, 0, 1]));
        let key = TrustKey::from(jwk);
        assert!(matches(&key, &rsa_key_info(&[0xfb, 0xff], &[1, 0, 1])));
        assert!(!matches(&key, &rsa_key_info(&[0xfb, 0xfe], &[1, 0, 1])));
    }

    #[test]
    fn jwk_matches_by_any_x5c_certificate() {
        let jwk = bare_jwk()
            .with_certificate(STANDARD.encode(CERT_A))
            .with_certificate(STANDARD.encode(CERT_B));
        let key = TrustKey::from(jwk);
        assert!(matches(&key, &x509_key_info(&[CERT_B])));
        assert!(!matches(&key, &x509_key_info(&[b"other"])));
    }

    #[test]
    fn jwk_without_material_never_matches() {
        let key = TrustKey::from(bare_jwk());
        assert!(!matches(&key, &x509_key_info(&[CERT_A])));
        assert!(!matches(&key, &rsa_key_info(&[0xc5], &[1, 0, 1])));
    }

    #[test]
    fn undecodable_key_info_is_no_match() {
        let key_info = KeyInfo {
            rsa_key_value: Some(RsaKeyValue {
                modulus: "!!!".to_string(),
                exponent: "AQAB".to_string(),
            }),
            x509_data: vec![X509Data::with_certificate("not base64 ***")],
            ..KeyInfo::default()
        };
        let key = TrustKey::from(RsaKey::from_parameters(RsaPublicKey::new(&[0xc5], &[1, 0, 1])));
        assert!(!matches(&key, &key_info));
        assert!(!matches(&TrustKey::from(X509Key::from_der(CERT_A)), &key_info));
    }
}
