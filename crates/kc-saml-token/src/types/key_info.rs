//! XML-DSig `KeyInfo` structures.
//!
//! These describe which key signed a document. They are only ever used to
//! *match* configured keys; the verification key always comes from the
//! caller's trust configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

/// `ds:KeyInfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    /// `ds:KeyName`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,

    /// `URI` of `ds:RetrievalMethod`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval_method_uri: Option<String>,

    /// `ds:KeyValue/ds:RSAKeyValue`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsa_key_value: Option<RsaKeyValue>,

    /// `ds:X509Data` blocks in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub x509_data: Vec<X509Data>,
}

impl KeyInfo {
    /// Iterates over every base64 certificate in every `X509Data`.
    pub fn certificates(&self) -> impl Iterator<Item = &str> {
        self.x509_data
            .iter()
            .flat_map(|data| data.certificates.iter().map(String::as_str))
    }
}

impl fmt::Display for KeyInfo {
    /// Summarises the block without reproducing key material.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(name) = &self.key_name {
            parts.push(format!("KeyName={name}"));
        }
        if let Some(uri) = &self.retrieval_method_uri {
            parts.push(format!("RetrievalMethod={uri}"));
        }
        if self.rsa_key_value.is_some() {
            parts.push("RSAKeyValue".to_string());
        }
        for data in &self.x509_data {
            let mut detail = format!("X509Data({} certificate(s)", data.certificates.len());
            if let Some(subject) = &data.subject_name {
                detail.push_str(&format!(", subject={subject}"));
            }
            if let Some(serial) = &data.issuer_serial {
                detail.push_str(&format!(
                    ", issuer={}, serial={}",
                    serial.issuer_name, serial.serial_number
                ));
            }
            detail.push(')');
            parts.push(detail);
        }
        if parts.is_empty() {
            f.write_str("KeyInfo(empty)")
        } else {
            write!(f, "KeyInfo({})", parts.join(", "))
        }
    }
}

/// `ds:RSAKeyValue` with base64 `Modulus` and `Exponent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsaKeyValue {
    /// Base64 modulus as found in the document.
    pub modulus: String,
    /// Base64 exponent as found in the document.
    pub exponent: String,
}

/// `ds:X509Data`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct X509Data {
    /// `ds:X509IssuerSerial`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_serial: Option<IssuerSerial>,

    /// `ds:X509SKI`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ski: Option<String>,

    /// `ds:X509SubjectName`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,

    /// `ds:X509Certificate` values (base64 DER) in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<String>,

    /// `ds:X509CRL`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crl: Option<String>,
}

impl X509Data {
    /// Creates a block holding one base64 certificate.
    #[must_use]
    pub fn with_certificate(certificate: impl Into<String>) -> Self {
        Self {
            certificates: vec![certificate.into()],
            ..Self::default()
        }
    }
}

/// `ds:X509IssuerSerial`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerSerial {
    /// Issuer distinguished name.
    pub issuer_name: String,
    /// Serial number.
    pub serial_number: String,
}
