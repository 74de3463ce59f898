//! SAML Assertion types.
//!
//! Assertions contain statements about a subject made by an issuer. These
//! types are the object graph produced by the XML reader and consumed by the
//! validation pipeline; they carry no trust decisions of their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{confirmation_methods, AuthnContextClass, NameId};
use crate::signature::Signature;

/// SAML Assertion.
///
/// A package of information that supplies one or more statements made
/// by a SAML authority (the issuer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assertion {
    /// Unique identifier for this assertion.
    pub id: String,

    /// Version of the SAML protocol (always "2.0").
    #[serde(default = "default_version")]
    pub version: String,

    /// Timestamp when this assertion was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the authority that issued this assertion.
    pub issuer: String,

    /// The subject of this assertion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,

    /// Conditions that must be evaluated for the assertion to be valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Conditions>,

    /// Additional information the issuer wishes to provide.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advice: Option<Advice>,

    /// Statements in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<Statement>,

    /// Enveloped XML signature, if the assertion is signed.
    #[serde(skip)]
    pub signature: Option<Signature>,
}

fn default_version() -> String {
    "2.0".to_string()
}

impl Assertion {
    /// Creates a new assertion with a generated ID.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            id: format!("_{}", uuid::Uuid::new_v4()),
            version: default_version(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            subject: None,
            conditions: None,
            advice: None,
            statements: Vec::new(),
            signature: None,
        }
    }

    /// Creates a new assertion with a custom ID.
    #[must_use]
    pub fn with_id(id: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::new(issuer)
        }
    }

    /// Sets the subject.
    #[must_use]
    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Sets the conditions.
    #[must_use]
    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Appends a statement.
    #[must_use]
    pub fn with_statement(mut self, statement: impl Into<Statement>) -> Self {
        self.statements.push(statement.into());
        self
    }

    /// Returns true if the assertion carries a signature.
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Returns the NotOnOrAfter of the top-level conditions.
    #[must_use]
    pub fn not_on_or_after(&self) -> Option<DateTime<Utc>> {
        self.conditions.as_ref().and_then(|c| c.not_on_or_after)
    }

    /// Iterates over the attribute statements.
    pub fn attribute_statements(&self) -> impl Iterator<Item = &AttributeStatement> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Attribute(statement) => Some(statement),
            _ => None,
        })
    }

    /// Iterates over the authentication statements.
    pub fn authn_statements(&self) -> impl Iterator<Item = &AuthnStatement> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Authentication(statement) => Some(statement),
            _ => None,
        })
    }
}

/// Advice carried alongside the assertion.
///
/// Only assertion references are retained; embedded assertions are not
/// evaluated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advice {
    /// `AssertionIDRef` values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertion_id_refs: Vec<String>,

    /// `AssertionURIRef` values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertion_uri_refs: Vec<String>,
}

/// Subject of an assertion.
///
/// Identifies the principal that is the subject of all statements in the assertion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subject {
    /// The name identifier for the subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id: Option<NameId>,

    /// Subject confirmations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_confirmations: Vec<SubjectConfirmation>,
}

impl Subject {
    /// Creates a new subject with a name ID.
    #[must_use]
    pub fn new(name_id: NameId) -> Self {
        Self {
            name_id: Some(name_id),
            subject_confirmations: Vec::new(),
        }
    }

    /// Adds a subject confirmation.
    #[must_use]
    pub fn with_confirmation(mut self, confirmation: SubjectConfirmation) -> Self {
        self.subject_confirmations.push(confirmation);
        self
    }
}

/// Subject confirmation.
///
/// Information that allows the assertion consumer to confirm the subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectConfirmation {
    /// The confirmation method URI.
    pub method: String,

    /// Identifier of the entity expected to satisfy the confirmation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id: Option<NameId>,

    /// Additional confirmation data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_confirmation_data: Option<SubjectConfirmationData>,
}

impl SubjectConfirmation {
    /// Creates a confirmation with the given method URI.
    #[must_use]
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            name_id: None,
            subject_confirmation_data: None,
        }
    }

    /// Creates a bearer confirmation.
    #[must_use]
    pub fn bearer() -> Self {
        Self::new(confirmation_methods::BEARER)
    }

    /// Sets the confirmation data.
    #[must_use]
    pub fn with_data(mut self, data: SubjectConfirmationData) -> Self {
        self.subject_confirmation_data = Some(data);
        self
    }
}

/// Subject confirmation data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectConfirmationData {
    /// The request ID that this assertion responds to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// Time before which the subject cannot be confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,

    /// Time at or after which the subject can no longer be confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// The location to which the assertion can be presented.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    /// Network address of the presenter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Conditions for assertion validity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conditions {
    /// Time before which the assertion is not valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,

    /// Time at or after which the assertion is not valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Audience restrictions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audience_restrictions: Vec<AudienceRestriction>,

    /// One-time use condition.
    #[serde(default)]
    pub one_time_use: bool,

    /// Proxy restriction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_restriction: Option<ProxyRestriction>,

    /// Element names (or `xsi:type`s) of unrecognised `Condition` elements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_conditions: Vec<String>,
}

impl Conditions {
    /// Creates conditions valid for the given window.
    #[must_use]
    pub fn between(not_before: DateTime<Utc>, not_on_or_after: DateTime<Utc>) -> Self {
        Self {
            not_before: Some(not_before),
            not_on_or_after: Some(not_on_or_after),
            ..Self::default()
        }
    }

    /// Adds an audience restriction with a single audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience_restrictions.push(AudienceRestriction {
            audiences: vec![audience.into()],
        });
        self
    }

    /// Sets the one-time use flag.
    #[must_use]
    pub const fn one_time_use(mut self) -> Self {
        self.one_time_use = true;
        self
    }
}

/// Audience restriction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudienceRestriction {
    /// Audiences; the restriction is met if any of them matches.
    pub audiences: Vec<String>,
}

/// Proxy restriction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyRestriction {
    /// Maximum number of proxies allowed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,

    /// List of allowed proxy audiences.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audiences: Vec<String>,
}

// ============================================================================
// Statements
// ============================================================================

/// An assertion statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Statement {
    /// Attributes of the subject.
    Attribute(AttributeStatement),
    /// How and when the subject authenticated.
    Authentication(AuthnStatement),
    /// An authorization decision about a resource.
    AuthorizationDecision(AuthzDecisionStatement),
    /// A statement of an extension type, kept opaque.
    Custom(CustomStatement),
}

impl From<AttributeStatement> for Statement {
    fn from(statement: AttributeStatement) -> Self {
        Self::Attribute(statement)
    }
}

impl From<AuthnStatement> for Statement {
    fn from(statement: AuthnStatement) -> Self {
        Self::Authentication(statement)
    }
}

impl From<AuthzDecisionStatement> for Statement {
    fn from(statement: AuthzDecisionStatement) -> Self {
        Self::AuthorizationDecision(statement)
    }
}

/// Authentication statement.
///
/// Describes the act of authentication performed by the subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthnStatement {
    /// The time of authentication.
    pub authn_instant: DateTime<Utc>,

    /// The session index (for session management).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_index: Option<String>,

    /// Time at which the session ends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_not_on_or_after: Option<DateTime<Utc>>,

    /// The authentication context.
    pub authn_context: AuthnContext,

    /// The subject locality information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_locality: Option<SubjectLocality>,
}

impl AuthnStatement {
    /// Creates a statement for an authentication at `authn_instant`.
    #[must_use]
    pub fn new(authn_context: AuthnContext, authn_instant: DateTime<Utc>) -> Self {
        Self {
            authn_instant,
            session_index: None,
            session_not_on_or_after: None,
            authn_context,
            subject_locality: None,
        }
    }

    /// Sets the session index.
    #[must_use]
    pub fn with_session_index(mut self, index: impl Into<String>) -> Self {
        self.session_index = Some(index.into());
        self
    }
}

/// Authentication context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthnContext {
    /// Authentication context class reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_ref: Option<String>,

    /// Authentication context declaration reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decl_ref: Option<String>,

    /// Authenticating authorities.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authenticating_authorities: Vec<String>,
}

impl AuthnContext {
    /// Creates an authentication context with a well-known class reference.
    #[must_use]
    pub fn class(class: AuthnContextClass) -> Self {
        Self::class_ref(class.uri())
    }

    /// Creates an authentication context with an arbitrary class reference.
    #[must_use]
    pub fn class_ref(uri: impl Into<String>) -> Self {
        Self {
            class_ref: Some(uri.into()),
            ..Self::default()
        }
    }
}

/// Subject locality information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectLocality {
    /// IP address of the subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// DNS name of the system from which the subject authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_name: Option<String>,
}

/// Attribute statement.
///
/// Contains attributes about the subject.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeStatement {
    /// List of attributes.
    pub attributes: Vec<Attribute>,
}

impl AttributeStatement {
    /// Creates a new empty attribute statement.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            attributes: Vec::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, attr: Attribute) -> Self {
        self.attributes.push(attr);
        self
    }
}

/// SAML Attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// The attribute name (typically a URI).
    pub name: String,

    /// The format of the attribute name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_format: Option<String>,

    /// A human-readable name for the attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    /// The authority that originally asserted the attribute, when it is
    /// not the assertion issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_issuer: Option<String>,

    /// Value type of every value, as `{namespace}#{local}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,

    /// The attribute values in document order.
    pub values: Vec<String>,
}

impl Attribute {
    /// URI name format.
    pub const NAME_FORMAT_URI: &'static str = "urn:oasis:names:tc:SAML:2.0:attrname-format:uri";

    /// Basic name format.
    pub const NAME_FORMAT_BASIC: &'static str =
        "urn:oasis:names:tc:SAML:2.0:attrname-format:basic";

    /// Unspecified name format.
    pub const NAME_FORMAT_UNSPECIFIED: &'static str =
        "urn:oasis:names:tc:SAML:2.0:attrname-format:unspecified";

    /// Creates a new attribute with a single value.
    #[must_use]
    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::multi(name, vec![value.into()])
    }

    /// Creates a new attribute with multiple values.
    #[must_use]
    pub fn multi(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            name_format: None,
            friendly_name: None,
            original_issuer: None,
            value_type: None,
            values,
        }
    }

    /// Sets the friendly name.
    #[must_use]
    pub fn with_friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = Some(name.into());
        self
    }

    /// Sets the name format.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.name_format = Some(format.into());
        self
    }

    /// Sets the original issuer.
    #[must_use]
    pub fn with_original_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.original_issuer = Some(issuer.into());
        self
    }

    /// Sets the value type.
    #[must_use]
    pub fn with_value_type(mut self, value_type: impl Into<String>) -> Self {
        self.value_type = Some(value_type.into());
        self
    }
}

/// Decision of an authorization decision statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Access permitted.
    Permit,
    /// Access denied.
    Deny,
    /// The issuer could not decide.
    Indeterminate,
}

impl Decision {
    /// Parses the `Decision` attribute value.
    #[must_use]
    pub fn from_xml(value: &str) -> Option<Self> {
        match value {
            "Permit" => Some(Self::Permit),
            "Deny" => Some(Self::Deny),
            "Indeterminate" => Some(Self::Indeterminate),
            _ => None,
        }
    }

    /// Returns the `Decision` attribute value.
    #[must_use]
    pub const fn as_xml(self) -> &'static str {
        match self {
            Self::Permit => "Permit",
            Self::Deny => "Deny",
            Self::Indeterminate => "Indeterminate",
        }
    }
}

/// Authorization decision statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthzDecisionStatement {
    /// The resource the decision applies to.
    pub resource: String,
    /// The decision.
    pub decision: Decision,
    /// Actions covered by the decision.
    pub actions: Vec<Action>,
}

/// An action within an authorization decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Namespace the action value is drawn from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// The action.
    pub value: String,
}

/// A statement of a type the handler does not interpret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomStatement {
    /// `xsi:type` of the statement, resolved to `{namespace}#{local}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}
