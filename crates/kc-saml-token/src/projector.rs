//! Claims projection.
//!
//! Turns a validated assertion into a [`ClaimsIdentity`]: the subject's
//! name identifier first, then one claim per attribute value, then the
//! authentication statements. Attributes named as actors are not claims;
//! their values carry a serialized delegated identity that becomes the
//! identity's actor.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::config::ValidationParameters;
use crate::error::{SamlError, SamlResult};
use crate::types::{
    claim_properties, claim_types, claim_value_types, Assertion, Attribute, AuthnStatement, Claim,
    ClaimsIdentity, Statement, ACTOR_ELEMENT,
};
use crate::xml::reader::read_actor;

/// Returns true if the attribute carries a delegated actor identity.
#[must_use]
pub fn is_actor_attribute(attribute: &Attribute) -> bool {
    attribute.name == claim_types::ACTOR || attribute.name == ACTOR_ELEMENT
}

/// Merges attributes sharing (name, name format, friendly name, original
/// issuer), concatenating their values in encounter order.
///
/// The first occurrence fixes the position and value type of a group.
#[must_use]
pub fn consolidate_attributes(attributes: &[Attribute]) -> Vec<Attribute> {
    let mut consolidated: Vec<Attribute> = Vec::with_capacity(attributes.len());
    let mut index: HashMap<(&str, Option<&str>, Option<&str>, Option<&str>), usize> =
        HashMap::with_capacity(attributes.len());

    for attribute in attributes {
        let key = (
            attribute.name.as_str(),
            attribute.name_format.as_deref(),
            attribute.friendly_name.as_deref(),
            attribute.original_issuer.as_deref(),
        );
        match index.get(&key) {
            Some(&position) => consolidated[position]
                .values
                .extend(attribute.values.iter().cloned()),
            None => {
                index.insert(key, consolidated.len());
                consolidated.push(attribute.clone());
            }
        }
    }

    consolidated
}

/// Formats an instant the way authentication-instant claims carry it.
#[must_use]
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Projects assertions into identities.
pub struct ClaimsProjector<'p> {
    params: &'p ValidationParameters,
}

impl<'p> ClaimsProjector<'p> {
    /// Creates a projector over the given parameters.
    #[must_use]
    pub const fn new(params: &'p ValidationParameters) -> Self {
        Self { params }
    }

    /// Builds the identity for `assertion`, stamping claims with `issuer`.
    ///
    /// A blank issuer is replaced by the configured default issuer.
    pub fn project(&self, assertion: &Assertion, issuer: &str) -> SamlResult<ClaimsIdentity> {
        let issuer = if issuer.trim().is_empty() {
            self.params.config.default_issuer.as_str()
        } else {
            issuer
        };

        let mut identity = self.new_identity();

        if let Some(name_id) = assertion.subject.as_ref().and_then(|s| s.name_id.as_ref()) {
            let mut claim = Claim::new(claim_types::NAME_IDENTIFIER, &name_id.value, issuer);
            claim.properties = name_id.claim_properties();
            identity.add_claim(claim);
        }

        let mut authn_statements = Vec::new();
        for statement in &assertion.statements {
            match statement {
                Statement::Attribute(statement) => {
                    self.apply_attributes(&mut identity, &statement.attributes, issuer, 0)?;
                }
                Statement::Authentication(statement) => authn_statements.push(statement),
                Statement::AuthorizationDecision(_) | Statement::Custom(_) => {}
            }
        }

        for statement in authn_statements {
            project_authn_statement(&mut identity, statement, issuer)?;
        }

        Ok(identity)
    }

    fn new_identity(&self) -> ClaimsIdentity {
        ClaimsIdentity::new(self.params.config.authentication_type.clone())
    }

    fn apply_attributes(
        &self,
        identity: &mut ClaimsIdentity,
        attributes: &[Attribute],
        issuer: &str,
        depth: usize,
    ) -> SamlResult<()> {
        for attribute in attributes {
            if is_actor_attribute(attribute) {
                if identity.actor.is_some() {
                    return Err(SamlError::UnsupportedDelegation(
                        "more than one actor attribute at the same level".to_string(),
                    ));
                }
                let actor = self.project_actor(attribute, issuer, depth + 1)?;
                identity.actor = Some(Box::new(actor));
            } else {
                for claim in attribute_claims(attribute, issuer) {
                    identity.add_claim(claim);
                }
            }
        }
        Ok(())
    }

    fn project_actor(
        &self,
        attribute: &Attribute,
        issuer: &str,
        depth: usize,
    ) -> SamlResult<ClaimsIdentity> {
        if depth > self.params.config.max_actor_depth {
            return Err(SamlError::UnsupportedDelegation(format!(
                "actor nesting exceeds {} level(s)",
                self.params.config.max_actor_depth
            )));
        }

        let mut actor_attributes = Vec::new();
        for value in &attribute.values {
            let parsed = read_actor(value).map_err(|e| match e {
                SamlError::UnsupportedDelegation(_) => e,
                other => SamlError::UnsupportedDelegation(format!("malformed actor: {other}")),
            })?;
            actor_attributes.extend(parsed);
        }

        tracing::debug!(depth, "projecting actor with {} attribute(s)", actor_attributes.len());

        let mut actor = self.new_identity();
        self.apply_attributes(
            &mut actor,
            &consolidate_attributes(&actor_attributes),
            issuer,
            depth,
        )?;
        Ok(actor)
    }
}

fn attribute_claims<'a>(attribute: &'a Attribute, issuer: &'a str) -> impl Iterator<Item = Claim> + 'a {
    let original_issuer = attribute.original_issuer.as_deref().unwrap_or(issuer);
    let value_type = attribute
        .value_type
        .as_deref()
        .unwrap_or(claim_value_types::STRING);

    attribute.values.iter().map(move |value| {
        let mut claim = Claim::new(&attribute.name, value, issuer)
            .with_original_issuer(original_issuer)
            .with_value_type(value_type);
        if let Some(format) = &attribute.name_format {
            claim = claim.with_property(claim_properties::SAML_ATTRIBUTE_NAME_FORMAT, format);
        }
        if let Some(friendly_name) = &attribute.friendly_name {
            claim = claim.with_property(claim_properties::SAML_ATTRIBUTE_DISPLAY_NAME, friendly_name);
        }
        claim
    })
}

fn project_authn_statement(
    identity: &mut ClaimsIdentity,
    statement: &AuthnStatement,
    issuer: &str,
) -> SamlResult<()> {
    let context = &statement.authn_context;
    if let Some(decl_ref) = &context.decl_ref {
        return Err(SamlError::AuthnContextDeclaration(decl_ref.clone()));
    }

    if let Some(class_ref) = &context.class_ref {
        identity.add_claim(Claim::new(claim_types::AUTHENTICATION_METHOD, class_ref, issuer));
    }
    identity.add_claim(
        Claim::new(
            claim_types::AUTHENTICATION_INSTANT,
            format_instant(&statement.authn_instant),
            issuer,
        )
        .with_value_type(claim_value_types::DATE_TIME),
    );
    Ok(())
}
