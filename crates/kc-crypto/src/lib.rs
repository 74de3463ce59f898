//! # kc-crypto
//!
//! Cryptographic primitives for SAML assertion processing using aws-lc-rs.
//!
//! The token crate decides *which* key to try against a signature; this
//! crate only answers whether a given key verifies a given signature, and
//! produces signatures when issuing tokens.
//!
//! ## Algorithms
//!
//! - Digests: SHA-256, SHA-384, SHA-512
//! - Signatures: RSA PKCS#1 v1.5 with SHA-256, SHA-384 or SHA-512
//!
//! SHA-256 stays available because XML-DSig deployments still sign with it.
//! SHA-1 is not offered at all.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod algorithm;
pub mod hash;
pub mod keys;
pub mod legacy;
pub mod signature;

pub use algorithm::HashAlgorithm;
pub use hash::{fixed_time_eq, hash, sha256, sha384, sha512};
pub use keys::{RsaPrivateKey, RsaPublicKey};
pub use legacy::{rsa_sign_legacy, rsa_verify_legacy, LegacyRsaAlgorithm};
pub use signature::SignatureError;
