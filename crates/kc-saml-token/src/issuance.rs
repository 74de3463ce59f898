//! Token issuance.
//!
//! Builds an assertion from a [`TokenDescriptor`], the mirror image of
//! validation: the subject's name-identifier claim becomes the `Subject`,
//! the validity window and audience become `Conditions`, the remaining
//! claims become a consolidated attribute statement and the authentication
//! claims an authentication statement.

use chrono::{DateTime, Utc};
use url::Url;

use crate::error::{SamlError, SamlResult};
use crate::projector::consolidate_attributes;
use crate::resolver::Saml2SecurityToken;
use crate::signature::{SigningCredentials, XmlSigner};
use crate::types::{
    claim_properties, claim_types, claim_value_types, Assertion, Attribute, AttributeStatement,
    AuthnContext, AuthnStatement, Claim, ClaimsIdentity, Conditions, NameId, Subject,
    SubjectConfirmation,
};
use crate::xml::writer::{write_actor, write_assertion};

/// Everything needed to issue a token.
#[derive(Debug, Clone, Default)]
pub struct TokenDescriptor {
    /// Issuer of the assertion.
    pub issuer: String,
    /// Claims about the subject; its actor becomes an actor attribute.
    pub subject: ClaimsIdentity,
    /// Intended audience.
    pub audience: Option<String>,
    /// Start of the validity window.
    pub not_before: Option<DateTime<Utc>>,
    /// End of the validity window.
    pub expires: Option<DateTime<Utc>>,
    /// Issue instant; defaults to the creation time.
    pub issued_at: Option<DateTime<Utc>>,
    /// Credentials used when the token is written.
    pub signing_credentials: Option<SigningCredentials>,
}

impl TokenDescriptor {
    /// Creates a descriptor for an issuer and subject.
    #[must_use]
    pub fn new(issuer: impl Into<String>, subject: ClaimsIdentity) -> Self {
        Self {
            issuer: issuer.into(),
            subject,
            ..Self::default()
        }
    }

    /// Sets the audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Sets the validity window.
    #[must_use]
    pub const fn with_lifetime(mut self, not_before: DateTime<Utc>, expires: DateTime<Utc>) -> Self {
        self.not_before = Some(not_before);
        self.expires = Some(expires);
        self
    }

    /// Sets the signing credentials.
    #[must_use]
    pub fn with_signing_credentials(mut self, credentials: SigningCredentials) -> Self {
        self.signing_credentials = Some(credentials);
        self
    }
}

/// Creates an unsigned token; it is signed when written.
pub fn create_token(descriptor: &TokenDescriptor) -> SamlResult<Saml2SecurityToken> {
    create_token_at(descriptor, Utc::now())
}

/// [`create_token`] at a given time.
pub fn create_token_at(
    descriptor: &TokenDescriptor,
    now: DateTime<Utc>,
) -> SamlResult<Saml2SecurityToken> {
    if descriptor.issuer.trim().is_empty() {
        return Err(SamlError::TokenCreation("issuer is required".to_string()));
    }

    let mut assertion = Assertion::new(descriptor.issuer.clone());
    assertion.issue_instant = descriptor.issued_at.unwrap_or(now);
    assertion.subject = Some(create_subject(&descriptor.subject)?);
    assertion.conditions = create_conditions(descriptor)?;

    let attributes = create_attributes(&descriptor.subject)?;
    if !attributes.is_empty() {
        assertion.statements.push(AttributeStatement { attributes }.into());
    }
    if let Some(statement) = create_authn_statement(&descriptor.subject)? {
        assertion.statements.push(statement.into());
    }

    tracing::debug!(
        "created assertion '{}' for issuer '{}'",
        assertion.id,
        assertion.issuer
    );

    let token = Saml2SecurityToken::new(assertion);
    Ok(match &descriptor.signing_credentials {
        Some(credentials) => token.with_signing_credentials(credentials.clone()),
        None => token,
    })
}

/// Serializes a token, signing it when it carries credentials.
pub fn write_token(token: &Saml2SecurityToken) -> SamlResult<String> {
    let xml = write_assertion(token.assertion());
    match token.signing_credentials() {
        Some(credentials) => XmlSigner::new(credentials)?.sign(&xml),
        None => Ok(xml),
    }
}

fn create_subject(identity: &ClaimsIdentity) -> SamlResult<Subject> {
    let mut name_ids = identity.claims_of_type(claim_types::NAME_IDENTIFIER);
    let name_id_claim = name_ids.next();
    if name_ids.next().is_some() {
        return Err(SamlError::TokenCreation(
            "subject has more than one name identifier claim".to_string(),
        ));
    }

    Ok(Subject {
        name_id: name_id_claim.map(|c| NameId::from_claim_properties(&c.value, &c.properties)),
        subject_confirmations: vec![SubjectConfirmation::bearer()],
    })
}

fn create_conditions(descriptor: &TokenDescriptor) -> SamlResult<Option<Conditions>> {
    if let (Some(not_before), Some(expires)) = (descriptor.not_before, descriptor.expires) {
        if not_before > expires {
            return Err(SamlError::TokenCreation(format!(
                "not_before {not_before} is after expires {expires}"
            )));
        }
    }

    if descriptor.not_before.is_none() && descriptor.expires.is_none() && descriptor.audience.is_none() {
        return Ok(None);
    }

    let conditions = Conditions {
        not_before: descriptor.not_before,
        not_on_or_after: descriptor.expires,
        ..Conditions::default()
    };
    Ok(Some(match &descriptor.audience {
        Some(audience) => conditions.with_audience(audience.clone()),
        None => conditions,
    }))
}

const NON_ATTRIBUTE_CLAIMS: [&str; 3] = [
    claim_types::NAME_IDENTIFIER,
    claim_types::AUTHENTICATION_METHOD,
    claim_types::AUTHENTICATION_INSTANT,
];

fn create_attributes(identity: &ClaimsIdentity) -> SamlResult<Vec<Attribute>> {
    let mut attributes = identity
        .claims
        .iter()
        .filter(|c| !NON_ATTRIBUTE_CLAIMS.contains(&c.claim_type.as_str()))
        .map(claim_to_attribute)
        .collect::<SamlResult<Vec<_>>>()?;

    if let Some(actor) = &identity.actor {
        let actor_attributes = create_attributes(actor)?;
        attributes.push(Attribute::single(
            claim_types::ACTOR,
            write_actor(&actor_attributes),
        ));
    }

    Ok(consolidate_attributes(&attributes))
}

fn claim_to_attribute(claim: &Claim) -> SamlResult<Attribute> {
    let mut attribute = Attribute::single(&claim.claim_type, &claim.value);

    if claim.original_issuer != claim.issuer {
        attribute.original_issuer = Some(claim.original_issuer.clone());
    }
    if claim.value_type != claim_value_types::STRING {
        attribute.value_type = Some(claim.value_type.clone());
    }
    if let Some(format) = claim.properties.get(claim_properties::SAML_ATTRIBUTE_NAME_FORMAT) {
        if Url::parse(format).is_err() {
            return Err(SamlError::TokenCreation(format!(
                "attribute name format '{format}' is not an absolute URI"
            )));
        }
        attribute.name_format = Some(format.clone());
    }
    if let Some(friendly_name) = claim.properties.get(claim_properties::SAML_ATTRIBUTE_DISPLAY_NAME) {
        attribute.friendly_name = Some(friendly_name.clone());
    }

    Ok(attribute)
}

fn create_authn_statement(identity: &ClaimsIdentity) -> SamlResult<Option<AuthnStatement>> {
    let method = identity.find_first(claim_types::AUTHENTICATION_METHOD);
    let instant = identity.find_first(claim_types::AUTHENTICATION_INSTANT);

    match (method, instant) {
        (None, None) => Ok(None),
        (Some(method), Some(instant)) => {
            let authn_instant = DateTime::parse_from_rfc3339(&instant.value)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    SamlError::TokenCreation(format!(
                        "invalid authentication instant '{}': {e}",
                        instant.value
                    ))
                })?;
            Ok(Some(AuthnStatement::new(
                AuthnContext::class_ref(&method.value),
                authn_instant,
            )))
        }
        (Some(_), None) => Err(SamlError::TokenCreation(
            "authentication method claim without authentication instant".to_string(),
        )),
        (None, Some(_)) => Err(SamlError::TokenCreation(
            "authentication instant claim without authentication method".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::error::ErrorKind;
    use crate::types::{AuthnContextClass, NameIdFormat, Statement};
    use crate::xml::reader::read_assertion;

    const IDP: &str = "https://idp.example.com";

    fn subject() -> ClaimsIdentity {
        ClaimsIdentity::new("test")
            .with_claim(
                Claim::new(claim_types::NAME_IDENTIFIER, "alice@example.com", IDP)
                    .with_property(claim_properties::SAML_NAME_ID_FORMAT, NameIdFormat::Email.uri()),
            )
            .with_claim(Claim::new("role", "admin", IDP))
            .with_claim(Claim::new("role", "user", IDP))
            .with_claim(
                Claim::new("age", "42", IDP).with_value_type(claim_value_types::INTEGER),
            )
    }

    #[test]
    fn descriptor_becomes_assertion() {
        let now = Utc::now();
        let descriptor = TokenDescriptor::new(IDP, subject())
            .with_audience("https://sp.example.com")
            .with_lifetime(now, now + Duration::hours(1));

        let token = create_token_at(&descriptor, now).unwrap();
        let assertion = token.assertion();

        assert_eq!(assertion.issue_instant, now);
        let name_id = assertion.subject.as_ref().unwrap().name_id.as_ref().unwrap();
        assert_eq!(name_id.parsed_format(), NameIdFormat::Email);

        let conditions = assertion.conditions.as_ref().unwrap();
        assert_eq!(conditions.not_on_or_after, Some(now + Duration::hours(1)));

        let attributes: Vec<_> = assertion
            .attribute_statements()
            .flat_map(|s| s.attributes.iter())
            .collect();
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[0].values, vec!["admin", "user"]);
        assert_eq!(attributes[0].original_issuer, None);
        assert_eq!(attributes[1].value_type.as_deref(), Some(claim_value_types::INTEGER));
    }

    #[test]
    fn unsigned_token_writes_and_reads_back() {
        let token = create_token(&TokenDescriptor::new(IDP, subject())).unwrap();
        let xml = write_token(&token).unwrap();
        assert!(!xml.contains("ds:Signature"));
        let assertion = read_assertion(&xml).unwrap();
        assert_eq!(assertion.id, token.id());
    }

    #[test]
    fn authentication_claims_need_each_other() {
        let method_only = subject().with_claim(Claim::new(
            claim_types::AUTHENTICATION_METHOD,
            AuthnContextClass::Password.uri(),
            IDP,
        ));
        let err = create_token(&TokenDescriptor::new(IDP, method_only.clone())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TokenCreation);

        let both = method_only.with_claim(Claim::new(
            claim_types::AUTHENTICATION_INSTANT,
            "2026-01-01T10:00:00.000Z",
            IDP,
        ));
        let token = create_token(&TokenDescriptor::new(IDP, both)).unwrap();
        assert!(token
            .assertion()
            .statements
            .iter()
            .any(|s| matches!(s, Statement::Authentication(_))));
    }

    #[test]
    fn two_name_identifiers_are_rejected() {
        let identity = subject().with_claim(Claim::new(claim_types::NAME_IDENTIFIER, "bob", IDP));
        assert!(create_token(&TokenDescriptor::new(IDP, identity)).is_err());
    }

    #[test]
    fn name_format_must_be_absolute() {
        let identity = ClaimsIdentity::new("test").with_claim(
            Claim::new("mail", "alice@example.com", IDP)
                .with_property(claim_properties::SAML_ATTRIBUTE_NAME_FORMAT, "not a uri"),
        );
        assert!(create_token(&TokenDescriptor::new(IDP, identity)).is_err());
    }

    #[test]
    fn actor_is_written_as_attribute() {
        let actor = ClaimsIdentity::new("test").with_claim(Claim::new("name", "service", IDP));
        let identity = subject().with_actor(actor);
        let token = create_token(&TokenDescriptor::new(IDP, identity)).unwrap();

        let actor_attribute = token
            .assertion()
            .attribute_statements()
            .flat_map(|s| s.attributes.iter())
            .find(|a| a.name == claim_types::ACTOR)
            .unwrap();
        assert!(actor_attribute.values[0].starts_with("<Actor "));
    }

    #[test]
    fn inverted_lifetime_and_missing_issuer_are_rejected() {
        let now = Utc::now();
        let inverted = TokenDescriptor::new(IDP, subject()).with_lifetime(now, now - Duration::minutes(1));
        assert!(create_token(&inverted).is_err());
        assert!(create_token(&TokenDescriptor::new(" ", subject())).is_err());
    }
}
