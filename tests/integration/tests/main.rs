//! End-to-End Integration Tests
//!
//! These tests drive the SAML token handler through its public API only:
//! tokens are issued and signed with the fixture keys, then validated.

mod common;
mod delegation;
mod signature_resolution;
mod validation_pipeline;
