//! Serializes the assertion object model to SAML 2.0 XML.
//!
//! Output uses the `saml` prefix for the assertion namespace and `ds` for
//! XML-DSig content. No XML declaration is emitted so the result can be
//! embedded or signed as is.

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::escape::escape;

use crate::types::{
    Advice, Assertion, Attribute, AttributeStatement, AuthnStatement, AuthzDecisionStatement,
    Conditions, KeyInfo, NameId, Statement, Subject, SubjectConfirmation, ACTOR_ELEMENT,
    CLAIMS_NS, SAML_NS, XSI_NS, XS_NS,
};

/// Writes an assertion element.
pub(crate) fn write_assertion(assertion: &Assertion) -> String {
    let mut out = String::with_capacity(2048);

    out.push_str(&format!(
        r#"<saml:Assertion xmlns:saml="{SAML_NS}" xmlns:xs="{XS_NS}" xmlns:xsi="{XSI_NS}"{} ID="{}" Version="{}" IssueInstant="{}">"#,
        claims_ns_declaration(assertion_attributes(assertion)),
        escape(&assertion.id),
        escape(&assertion.version),
        instant(&assertion.issue_instant),
    ));
    out.push_str(&format!(
        "<saml:Issuer>{}</saml:Issuer>",
        escape(&assertion.issuer)
    ));

    if let Some(subject) = &assertion.subject {
        write_subject(&mut out, subject);
    }
    if let Some(conditions) = &assertion.conditions {
        write_conditions(&mut out, conditions);
    }
    if let Some(advice) = &assertion.advice {
        write_advice(&mut out, advice);
    }
    for statement in &assertion.statements {
        match statement {
            Statement::Attribute(statement) => write_attribute_statement(&mut out, statement),
            Statement::Authentication(statement) => write_authn_statement(&mut out, statement),
            Statement::AuthorizationDecision(statement) => {
                write_authz_statement(&mut out, statement);
            }
            Statement::Custom(statement) => {
                out.push_str("<saml:Statement");
                if let Some(type_name) = &statement.type_name {
                    out.push_str(&type_attribute(type_name));
                }
                out.push_str("/>");
            }
        }
    }

    out.push_str("</saml:Assertion>");
    out
}

/// Writes the `Actor` element carried as the value of an actor attribute.
pub(crate) fn write_actor(attributes: &[Attribute]) -> String {
    let mut out = format!(
        r#"<{ACTOR_ELEMENT} xmlns:saml="{SAML_NS}" xmlns:xs="{XS_NS}" xmlns:xsi="{XSI_NS}"{}>"#,
        claims_ns_declaration(attributes.iter())
    );
    for attribute in attributes {
        write_attribute(&mut out, attribute);
    }
    out.push_str(&format!("</{ACTOR_ELEMENT}>"));
    out
}

/// Writes a `ds:KeyInfo` element. The `ds` prefix must be in scope.
pub(crate) fn write_key_info(key_info: &KeyInfo) -> String {
    let mut out = String::from("<ds:KeyInfo>");

    if let Some(name) = &key_info.key_name {
        out.push_str(&format!("<ds:KeyName>{}</ds:KeyName>", escape(name)));
    }
    if let Some(rsa) = &key_info.rsa_key_value {
        out.push_str(&format!(
            "<ds:KeyValue><ds:RSAKeyValue><ds:Modulus>{}</ds:Modulus><ds:Exponent>{}</ds:Exponent></ds:RSAKeyValue></ds:KeyValue>",
            escape(&rsa.modulus),
            escape(&rsa.exponent)
        ));
    }
    for data in &key_info.x509_data {
        out.push_str("<ds:X509Data>");
        if let Some(subject) = &data.subject_name {
            out.push_str(&format!(
                "<ds:X509SubjectName>{}</ds:X509SubjectName>",
                escape(subject)
            ));
        }
        for certificate in &data.certificates {
            out.push_str(&format!(
                "<ds:X509Certificate>{}</ds:X509Certificate>",
                escape(certificate)
            ));
        }
        out.push_str("</ds:X509Data>");
    }

    out.push_str("</ds:KeyInfo>");
    out
}

fn write_name_id(out: &mut String, name_id: &NameId) {
    out.push_str("<saml:NameID");
    push_attr(out, "Format", name_id.format.as_deref());
    push_attr(out, "NameQualifier", name_id.name_qualifier.as_deref());
    push_attr(out, "SPNameQualifier", name_id.sp_name_qualifier.as_deref());
    push_attr(out, "SPProvidedID", name_id.sp_provided_id.as_deref());
    out.push_str(&format!(">{}</saml:NameID>", escape(&name_id.value)));
}

fn write_subject(out: &mut String, subject: &Subject) {
    out.push_str("<saml:Subject>");
    if let Some(name_id) = &subject.name_id {
        write_name_id(out, name_id);
    }
    for confirmation in &subject.subject_confirmations {
        write_confirmation(out, confirmation);
    }
    out.push_str("</saml:Subject>");
}

fn write_confirmation(out: &mut String, confirmation: &SubjectConfirmation) {
    out.push_str(&format!(
        r#"<saml:SubjectConfirmation Method="{}">"#,
        escape(&confirmation.method)
    ));
    if let Some(name_id) = &confirmation.name_id {
        write_name_id(out, name_id);
    }
    if let Some(data) = &confirmation.subject_confirmation_data {
        out.push_str("<saml:SubjectConfirmationData");
        push_instant(out, "NotBefore", data.not_before.as_ref());
        push_instant(out, "NotOnOrAfter", data.not_on_or_after.as_ref());
        push_attr(out, "Recipient", data.recipient.as_deref());
        push_attr(out, "InResponseTo", data.in_response_to.as_deref());
        push_attr(out, "Address", data.address.as_deref());
        out.push_str("/>");
    }
    out.push_str("</saml:SubjectConfirmation>");
}

fn write_conditions(out: &mut String, conditions: &Conditions) {
    out.push_str("<saml:Conditions");
    push_instant(out, "NotBefore", conditions.not_before.as_ref());
    push_instant(out, "NotOnOrAfter", conditions.not_on_or_after.as_ref());
    out.push('>');

    for restriction in &conditions.audience_restrictions {
        out.push_str("<saml:AudienceRestriction>");
        write_audiences(out, &restriction.audiences);
        out.push_str("</saml:AudienceRestriction>");
    }
    if conditions.one_time_use {
        out.push_str("<saml:OneTimeUse/>");
    }
    if let Some(proxy) = &conditions.proxy_restriction {
        out.push_str("<saml:ProxyRestriction");
        if let Some(count) = proxy.count {
            out.push_str(&format!(r#" Count="{count}""#));
        }
        out.push('>');
        write_audiences(out, &proxy.audiences);
        out.push_str("</saml:ProxyRestriction>");
    }
    for custom in &conditions.custom_conditions {
        out.push_str(&format!("<saml:Condition{}/>", type_attribute(custom)));
    }

    out.push_str("</saml:Conditions>");
}

fn write_audiences(out: &mut String, audiences: &[String]) {
    for audience in audiences {
        out.push_str(&format!("<saml:Audience>{}</saml:Audience>", escape(audience)));
    }
}

fn write_advice(out: &mut String, advice: &Advice) {
    out.push_str("<saml:Advice>");
    for id_ref in &advice.assertion_id_refs {
        out.push_str(&format!(
            "<saml:AssertionIDRef>{}</saml:AssertionIDRef>",
            escape(id_ref)
        ));
    }
    for uri_ref in &advice.assertion_uri_refs {
        out.push_str(&format!(
            "<saml:AssertionURIRef>{}</saml:AssertionURIRef>",
            escape(uri_ref)
        ));
    }
    out.push_str("</saml:Advice>");
}

fn write_authn_statement(out: &mut String, statement: &AuthnStatement) {
    out.push_str(&format!(
        r#"<saml:AuthnStatement AuthnInstant="{}""#,
        instant(&statement.authn_instant)
    ));
    push_attr(out, "SessionIndex", statement.session_index.as_deref());
    push_instant(
        out,
        "SessionNotOnOrAfter",
        statement.session_not_on_or_after.as_ref(),
    );
    out.push('>');

    if let Some(locality) = &statement.subject_locality {
        out.push_str("<saml:SubjectLocality");
        push_attr(out, "Address", locality.address.as_deref());
        push_attr(out, "DNSName", locality.dns_name.as_deref());
        out.push_str("/>");
    }

    let context = &statement.authn_context;
    out.push_str("<saml:AuthnContext>");
    if let Some(class_ref) = &context.class_ref {
        out.push_str(&format!(
            "<saml:AuthnContextClassRef>{}</saml:AuthnContextClassRef>",
            escape(class_ref)
        ));
    }
    if let Some(decl_ref) = &context.decl_ref {
        out.push_str(&format!(
            "<saml:AuthnContextDeclRef>{}</saml:AuthnContextDeclRef>",
            escape(decl_ref)
        ));
    }
    for authority in &context.authenticating_authorities {
        out.push_str(&format!(
            "<saml:AuthenticatingAuthority>{}</saml:AuthenticatingAuthority>",
            escape(authority)
        ));
    }
    out.push_str("</saml:AuthnContext></saml:AuthnStatement>");
}

fn write_attribute_statement(out: &mut String, statement: &AttributeStatement) {
    out.push_str("<saml:AttributeStatement>");
    for attribute in &statement.attributes {
        write_attribute(out, attribute);
    }
    out.push_str("</saml:AttributeStatement>");
}

/// Writes a `saml:Attribute`. The prefixes declared on the assertion root
/// must be in scope.
pub(crate) fn write_attribute(out: &mut String, attribute: &Attribute) {
    out.push_str(&format!(
        r#"<saml:Attribute Name="{}""#,
        escape(&attribute.name)
    ));
    push_attr(out, "NameFormat", attribute.name_format.as_deref());
    push_attr(out, "FriendlyName", attribute.friendly_name.as_deref());
    if let Some(original_issuer) = &attribute.original_issuer {
        out.push_str(&format!(
            r#" ci:OriginalIssuer="{}""#,
            escape(original_issuer)
        ));
    }
    out.push('>');

    let value_type = attribute
        .value_type
        .as_deref()
        .map(type_attribute)
        .unwrap_or_default();
    for value in &attribute.values {
        out.push_str(&format!(
            "<saml:AttributeValue{value_type}>{}</saml:AttributeValue>",
            escape(value)
        ));
    }
    out.push_str("</saml:Attribute>");
}

fn write_authz_statement(out: &mut String, statement: &AuthzDecisionStatement) {
    out.push_str(&format!(
        r#"<saml:AuthzDecisionStatement Resource="{}" Decision="{}">"#,
        escape(&statement.resource),
        statement.decision.as_xml()
    ));
    for action in &statement.actions {
        out.push_str("<saml:Action");
        push_attr(out, "Namespace", action.namespace.as_deref());
        out.push_str(&format!(">{}</saml:Action>", escape(&action.value)));
    }
    out.push_str("</saml:AuthzDecisionStatement>");
}

/// Renders `xsi:type` for a `{namespace}#{local}` type name, declaring the
/// namespace inline when it is not the XML Schema namespace.
fn type_attribute(type_name: &str) -> String {
    match type_name.rsplit_once('#') {
        Some((namespace, local)) if namespace == XS_NS => {
            format!(r#" xsi:type="xs:{}""#, escape(local))
        }
        Some((namespace, local)) => format!(
            r#" xmlns:vt="{}" xsi:type="vt:{}""#,
            escape(namespace),
            escape(local)
        ),
        None => format!(r#" xsi:type="{}""#, escape(type_name)),
    }
}

fn assertion_attributes(assertion: &Assertion) -> impl Iterator<Item = &Attribute> {
    assertion
        .attribute_statements()
        .flat_map(|statement| statement.attributes.iter())
}

fn claims_ns_declaration<'a>(mut attributes: impl Iterator<Item = &'a Attribute>) -> String {
    if attributes.any(|a| a.original_issuer.is_some()) {
        format!(r#" xmlns:ci="{CLAIMS_NS}""#)
    } else {
        String::new()
    }
}

fn push_attr(out: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        out.push_str(&format!(r#" {name}="{}""#, escape(value)));
    }
}

fn push_instant(out: &mut String, name: &str, value: Option<&DateTime<Utc>>) {
    if let Some(value) = value {
        out.push_str(&format!(r#" {name}="{}""#, instant(value)));
    }
}

fn instant(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
