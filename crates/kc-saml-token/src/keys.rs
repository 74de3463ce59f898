//! Trust keys.
//!
//! A [`TrustKey`] is a caller-supplied candidate verification key. The set
//! of key shapes is closed: X.509 certificates, bare RSA keys and JSON Web
//! Keys. Each shape knows statically how to produce RSA public parameters
//! for verification and how to describe itself without revealing key
//! material.

use std::fmt;
use std::sync::Arc;

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use kc_crypto::{RsaPrivateKey, RsaPublicKey, SignatureError};
use serde::{Deserialize, Serialize};
use x509_parser::prelude::{FromDer, X509Certificate};
use x509_parser::public_key::PublicKey;

use crate::error::{SamlError, SamlResult};
use crate::types::{KeyInfo, RsaKeyValue, X509Data};

/// A candidate verification key.
#[derive(Debug, Clone)]
pub enum TrustKey {
    /// An X.509 certificate.
    X509(X509Key),
    /// An RSA key given by parameters or as a live key pair.
    Rsa(RsaKey),
    /// A JSON Web Key.
    Jwk(JsonWebKey),
}

impl TrustKey {
    /// Returns the caller-assigned key identifier.
    #[must_use]
    pub fn key_id(&self) -> Option<&str> {
        match self {
            Self::X509(key) => key.key_id.as_deref(),
            Self::Rsa(key) => key.key_id.as_deref(),
            Self::Jwk(key) => key.kid.as_deref(),
        }
    }

    /// Returns the key shape name.
    #[must_use]
    pub const fn key_type(&self) -> &'static str {
        match self {
            Self::X509(_) => "X509",
            Self::Rsa(_) => "RSA",
            Self::Jwk(_) => "JWK",
        }
    }

    /// Returns a diagnostic description: shape and key id, never key bytes.
    #[must_use]
    pub fn descriptor(&self) -> String {
        format!("{} (kid: {})", self.key_type(), self.key_id().unwrap_or("none"))
    }

    /// Returns the RSA public parameters used to verify signatures.
    pub fn public_key(&self) -> Result<RsaPublicKey, SignatureError> {
        match self {
            Self::X509(key) => key.public_key(),
            Self::Rsa(key) => key.parameters(),
            Self::Jwk(key) => key.public_key(),
        }
    }

    /// Builds the `KeyInfo` a signer embeds to identify this key.
    pub fn key_info(&self) -> Result<KeyInfo, SignatureError> {
        let key_info = match self {
            Self::X509(key) => KeyInfo {
                x509_data: vec![X509Data::with_certificate(key.certificate_base64())],
                ..KeyInfo::default()
            },
            Self::Jwk(key) if !key.x5c.is_empty() => KeyInfo {
                x509_data: vec![X509Data {
                    certificates: key.x5c.clone(),
                    ..X509Data::default()
                }],
                ..KeyInfo::default()
            },
            Self::Rsa(_) | Self::Jwk(_) => {
                let public = self.public_key()?;
                KeyInfo {
                    rsa_key_value: Some(RsaKeyValue {
                        modulus: STANDARD.encode(public.modulus()),
                        exponent: STANDARD.encode(public.exponent()),
                    }),
                    ..KeyInfo::default()
                }
            }
        };
        Ok(KeyInfo {
            key_name: self.key_id().map(str::to_string),
            ..key_info
        })
    }
}

impl fmt::Display for TrustKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

impl From<X509Key> for TrustKey {
    fn from(key: X509Key) -> Self {
        Self::X509(key)
    }
}

impl From<RsaKey> for TrustKey {
    fn from(key: RsaKey) -> Self {
        Self::Rsa(key)
    }
}

impl From<JsonWebKey> for TrustKey {
    fn from(key: JsonWebKey) -> Self {
        Self::Jwk(key)
    }
}

// ============================================================================
// X.509
// ============================================================================

/// A trusted X.509 certificate.
#[derive(Clone)]
pub struct X509Key {
    key_id: Option<String>,
    certificate_der: Vec<u8>,
}

impl X509Key {
    /// Creates a key from DER certificate bytes.
    #[must_use]
    pub fn from_der(certificate_der: impl Into<Vec<u8>>) -> Self {
        Self {
            key_id: None,
            certificate_der: certificate_der.into(),
        }
    }

    /// Creates a key from a base64 (standard alphabet) DER certificate.
    /// Embedded whitespace is ignored.
    pub fn from_base64(certificate: &str) -> SamlResult<Self> {
        let compact: String = certificate.split_whitespace().collect();
        Ok(Self::from_der(STANDARD.decode(compact)?))
    }

    /// Sets the key identifier.
    #[must_use]
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Returns the DER certificate bytes.
    #[must_use]
    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }

    /// Returns the certificate as base64 (standard alphabet).
    #[must_use]
    pub fn certificate_base64(&self) -> String {
        STANDARD.encode(&self.certificate_der)
    }

    /// Extracts the RSA public key from the certificate.
    pub fn public_key(&self) -> Result<RsaPublicKey, SignatureError> {
        rsa_key_from_certificate(&self.certificate_der)
    }
}

impl fmt::Debug for X509Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X509Key")
            .field("key_id", &self.key_id)
            .field("certificate_len", &self.certificate_der.len())
            .finish()
    }
}

pub(crate) fn rsa_key_from_certificate(der: &[u8]) -> Result<RsaPublicKey, SignatureError> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| SignatureError::InvalidKey(format!("Invalid X.509 certificate: {e}")))?;

    match cert.public_key().parsed() {
        Ok(PublicKey::RSA(rsa)) => Ok(RsaPublicKey::new(rsa.modulus, rsa.exponent)),
        Ok(_) => Err(SignatureError::UnsupportedAlgorithm(
            "certificate does not carry an RSA key".to_string(),
        )),
        Err(e) => Err(SignatureError::InvalidKey(format!(
            "Failed to parse certificate public key: {e}"
        ))),
    }
}

// ============================================================================
// RSA
// ============================================================================

/// Where an [`RsaKey`] gets its public parameters from.
#[derive(Debug, Clone)]
pub enum RsaKeyMaterial {
    /// Captured public parameters.
    Parameters(RsaPublicKey),
    /// A live key pair; public parameters are exported on demand.
    KeyPair(Arc<RsaPrivateKey>),
}

/// A trusted bare RSA key.
#[derive(Debug, Clone)]
pub struct RsaKey {
    key_id: Option<String>,
    material: RsaKeyMaterial,
}

impl RsaKey {
    /// Creates a key from public parameters.
    #[must_use]
    pub const fn from_parameters(parameters: RsaPublicKey) -> Self {
        Self {
            key_id: None,
            material: RsaKeyMaterial::Parameters(parameters),
        }
    }

    /// Creates a key backed by a live key pair.
    #[must_use]
    pub const fn from_key_pair(key_pair: Arc<RsaPrivateKey>) -> Self {
        Self {
            key_id: None,
            material: RsaKeyMaterial::KeyPair(key_pair),
        }
    }

    /// Sets the key identifier.
    #[must_use]
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Returns the key material.
    #[must_use]
    pub const fn material(&self) -> &RsaKeyMaterial {
        &self.material
    }

    /// Returns the public parameters, exporting them from a live key pair
    /// when necessary. Only the public half is ever exported.
    pub fn parameters(&self) -> Result<RsaPublicKey, SignatureError> {
        match &self.material {
            RsaKeyMaterial::Parameters(parameters) => Ok(parameters.clone()),
            RsaKeyMaterial::KeyPair(key_pair) => key_pair.public_key(),
        }
    }
}

// ============================================================================
// JWK
// ============================================================================

/// Key type of a [`JsonWebKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    /// RSA key.
    #[serde(rename = "RSA")]
    Rsa,
    /// Elliptic curve key.
    #[serde(rename = "EC")]
    Ec,
    /// Symmetric key.
    #[serde(rename = "oct")]
    Oct,
}

/// JSON Web Key as published in a JWKS document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type.
    pub kty: KeyType,

    /// Public key use ("sig" for signature, "enc" for encryption).
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    /// Algorithm intended for use with the key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Key ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// X.509 certificate chain, base64 (standard alphabet) DER.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub x5c: Vec<String>,

    /// RSA modulus (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

impl JsonWebKey {
    /// Creates an RSA JWK from public parameters.
    #[must_use]
    pub fn rsa_public(kid: impl Into<String>, public_key: &RsaPublicKey) -> Self {
        Self {
            kty: KeyType::Rsa,
            key_use: Some("sig".to_string()),
            alg: None,
            kid: Some(kid.into()),
            x5c: Vec::new(),
            n: Some(URL_SAFE_NO_PAD.encode(public_key.modulus())),
            e: Some(URL_SAFE_NO_PAD.encode(public_key.exponent())),
        }
    }

    /// Parses a JWK from JSON.
    pub fn from_json(json: &str) -> SamlResult<Self> {
        serde_json::from_str(json).map_err(|e| SamlError::InvalidConfiguration(format!("invalid JWK: {e}")))
    }

    /// Adds a certificate to the `x5c` chain.
    #[must_use]
    pub fn with_certificate(mut self, certificate_base64: impl Into<String>) -> Self {
        self.x5c.push(certificate_base64.into());
        self
    }

    /// Returns the RSA public key from `n`/`e`, or from the first `x5c`
    /// certificate when the parameters are absent.
    pub fn public_key(&self) -> Result<RsaPublicKey, SignatureError> {
        if self.kty != KeyType::Rsa {
            return Err(SignatureError::UnsupportedAlgorithm(format!(
                "JWK key type {:?} cannot verify RSA signatures",
                self.kty
            )));
        }

        if let (Some(n), Some(e)) = (&self.n, &self.e) {
            let decode = |value: &str| {
                URL_SAFE_NO_PAD
                    .decode(value.trim_end_matches('='))
                    .map_err(|err| SignatureError::InvalidKey(format!("Invalid JWK parameter: {err}")))
            };
            return Ok(RsaPublicKey::new(&decode(n)?, &decode(e)?));
        }

        let certificate = self
            .x5c
            .first()
            .ok_or_else(|| SignatureError::InvalidKey("JWK has neither n/e nor x5c".to_string()))?;
        let der = STANDARD
            .decode(certificate)
            .map_err(|err| SignatureError::InvalidKey(format!("Invalid x5c entry: {err}")))?;
        rsa_key_from_certificate(&der)
    }
}
