//! SAML 2.0 assertion token handling for Keycloak Rust.
//!
//! This crate validates incoming SAML 2.0 assertions and turns them into a
//! [`ClaimsIdentity`]. It can also create and sign outgoing assertions.
//!
//! - **Signature resolution**: find the configured key that verifies an
//!   enveloped XML-DSig signature, and tell a missing key apart from a bad
//!   signature
//! - **Condition validation**: lifetime windows with clock skew, audience
//!   restrictions and subject confirmation data
//! - **Claims projection**: NameID, attributes, authentication statements
//!   and delegated actor chains
//! - **Token creation**: build and sign assertions from a descriptor
//!
//! # Architecture
//!
//! - [`handler`] - Validation pipeline ([`Saml2TokenHandler`])
//! - [`resolver`] - Signature resolution against trust keys
//! - [`key_matcher`] - Structural KeyInfo to key matching
//! - [`conditions`] - Lifetime, audience and subject confirmation checks
//! - [`projector`] - Assertion to claims projection
//! - [`issuance`] - Outgoing token creation
//! - [`replay`] - Replay detection cache
//! - [`keys`] - Trust key shapes
//! - [`signature`] - XML signature signing and verification
//! - [`config`] - Validation configuration and extension points
//! - [`types`] - Core SAML types and data structures
//! - [`error`] - Error types and failure classes
//!
//! # Example
//!
//! ```rust,ignore
//! use kc_saml_token::{Saml2TokenHandler, ValidationConfig, ValidationParameters, X509Key};
//!
//! let params = ValidationParameters::new(
//!     ValidationConfig::new()
//!         .valid_issuer("https://idp.example.com")
//!         .valid_audience("https://sp.example.com"),
//! )
//! .with_issuer_signing_key(X509Key::from_der(idp_certificate));
//!
//! let handler = Saml2TokenHandler::new(params)?;
//! let validated = handler.validate_token(&xml)?;
//! println!("signed in as {:?}", validated.identity.name());
//! ```
//!
//! # SAML Specifications
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [XML Signature](https://www.w3.org/TR/xmldsig-core1/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod conditions;
pub mod config;
pub mod error;
pub mod handler;
pub mod issuance;
pub mod key_matcher;
pub mod keys;
pub mod projector;
pub mod replay;
pub mod resolver;
pub mod signature;
pub mod types;

mod xml;

pub use conditions::{AudienceValidator, ConditionValidator};
pub use config::{ValidationConfig, ValidationParameters};
pub use error::{ErrorKind, SamlError, SamlResult};
pub use handler::{IssuerValidator, Saml2TokenHandler, ValidatedToken, ValidationStage};
pub use issuance::TokenDescriptor;
pub use keys::{JsonWebKey, RsaKey, TrustKey, X509Key};
pub use projector::ClaimsProjector;
pub use replay::{InMemoryReplayCache, TokenReplayCache};
pub use resolver::{
    IssuerSigningKeyResolver, KeyResolution, Saml2SecurityToken, SecurityToken, SignatureResolver,
    SignatureValidator,
};
pub use signature::{SignatureAlgorithm, SigningCredentials};
pub use types::*;
