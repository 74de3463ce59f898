//! SAML Name ID types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{claim_properties, NameIdFormat};

/// SAML Name ID.
///
/// Identifies the subject of an assertion, or the issuer when used in the
/// `Issuer` position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameId {
    /// The identifier value.
    pub value: String,

    /// The format URI of the identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// The security or administrative domain that qualifies the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_qualifier: Option<String>,

    /// The service provider's entity ID that qualifies the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_name_qualifier: Option<String>,

    /// A provider identifier for the SP that was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_provided_id: Option<String>,
}

impl NameId {
    /// Creates a new name ID with the given value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            format: None,
            name_qualifier: None,
            sp_name_qualifier: None,
            sp_provided_id: None,
        }
    }

    /// Creates a new email name ID.
    #[must_use]
    pub fn email(email: impl Into<String>) -> Self {
        Self::new(email).with_format(NameIdFormat::Email)
    }

    /// Creates a new persistent name ID.
    #[must_use]
    pub fn persistent(value: impl Into<String>) -> Self {
        Self::new(value).with_format(NameIdFormat::Persistent)
    }

    /// Sets a well-known format.
    #[must_use]
    pub fn with_format(self, format: NameIdFormat) -> Self {
        self.with_format_uri(format.uri())
    }

    /// Sets an arbitrary format URI.
    #[must_use]
    pub fn with_format_uri(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Sets the name qualifier.
    #[must_use]
    pub fn with_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.name_qualifier = Some(qualifier.into());
        self
    }

    /// Sets the SP name qualifier.
    #[must_use]
    pub fn with_sp_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.sp_name_qualifier = Some(qualifier.into());
        self
    }

    /// Sets the SP provided ID.
    #[must_use]
    pub fn with_sp_provided_id(mut self, id: impl Into<String>) -> Self {
        self.sp_provided_id = Some(id.into());
        self
    }

    /// Returns the parsed name ID format.
    #[must_use]
    pub fn parsed_format(&self) -> NameIdFormat {
        self.format
            .as_deref()
            .and_then(NameIdFormat::from_uri)
            .unwrap_or_default()
    }

    /// Returns the format and qualifiers keyed by claim property URI.
    ///
    /// Absent fields are omitted.
    #[must_use]
    pub fn claim_properties(&self) -> BTreeMap<String, String> {
        [
            (claim_properties::SAML_NAME_ID_FORMAT, &self.format),
            (claim_properties::SAML_NAME_ID_NAME_QUALIFIER, &self.name_qualifier),
            (claim_properties::SAML_NAME_ID_SP_NAME_QUALIFIER, &self.sp_name_qualifier),
            (claim_properties::SAML_NAME_ID_SP_PROVIDED_ID, &self.sp_provided_id),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_string(), v.clone())))
        .collect()
    }

    /// Rebuilds a name ID from a claim value and its property bag.
    #[must_use]
    pub fn from_claim_properties(value: impl Into<String>, properties: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| properties.get(key).cloned();
        Self {
            value: value.into(),
            format: get(claim_properties::SAML_NAME_ID_FORMAT),
            name_qualifier: get(claim_properties::SAML_NAME_ID_NAME_QUALIFIER),
            sp_name_qualifier: get(claim_properties::SAML_NAME_ID_SP_NAME_QUALIFIER),
            sp_provided_id: get(claim_properties::SAML_NAME_ID_SP_PROVIDED_ID),
        }
    }
}
