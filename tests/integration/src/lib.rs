//! End-to-end tests for the SAML token crates live under `tests/`.
