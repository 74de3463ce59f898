//! Errors raised by key parsing and RSA signing.
//!
//! A signature that simply does not verify is not an error here:
//! [`crate::rsa_verify_legacy`] reports it as `Ok(false)`.

use thiserror::Error;

/// Error type for key and signature operations.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// The private key could not produce a signature.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Key bytes or parameters could not be decoded.
    #[error("invalid key format: {0}")]
    InvalidKey(String),

    /// The algorithm is not available for this key.
    #[error("algorithm not supported: {0}")]
    UnsupportedAlgorithm(String),
}
