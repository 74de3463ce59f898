//! Reads SAML 2.0 assertions into the object model.

use chrono::{DateTime, Utc};

use super::{parse_document, XmlElement};
use crate::error::{SamlError, SamlResult};
use crate::signature::{Reference, Signature, SignedInfo};
use crate::types::{
    Action, Advice, Assertion, Attribute, AttributeStatement, AudienceRestriction, AuthnContext,
    AuthnStatement, AuthzDecisionStatement, Conditions, CustomStatement, Decision, IssuerSerial,
    KeyInfo, NameId, ProxyRestriction, RsaKeyValue, Statement, Subject, SubjectConfirmation,
    SubjectConfirmationData, SubjectLocality, X509Data, ACTOR_ELEMENT, CLAIMS_NS, SAML_NS,
    XMLDSIG_NS,
};

/// Reads a standalone `saml:Assertion` document.
pub(crate) fn read_assertion(xml: &str) -> SamlResult<Assertion> {
    let root = parse_document(xml)?;
    if !root.is(SAML_NS, "Assertion") {
        return Err(SamlError::InvalidAssertion(format!(
            "root element is '{}', expected saml:Assertion",
            root.local_name
        )));
    }

    let version = root.required_attr("Version")?;
    if version != "2.0" {
        return Err(SamlError::InvalidAssertion(format!(
            "unsupported SAML version '{version}'"
        )));
    }

    let id = root.required_attr("ID")?.to_string();
    if id.is_empty() {
        return Err(SamlError::InvalidAssertion("assertion ID is empty".to_string()));
    }

    let mut statements: Vec<Statement> = Vec::new();
    for child in root.children.iter().filter(|c| c.namespace.as_deref() == Some(SAML_NS)) {
        match child.local_name.as_str() {
            "AttributeStatement" => statements.push(read_attribute_statement(child)?.into()),
            "AuthnStatement" => statements.push(read_authn_statement(child)?.into()),
            "AuthzDecisionStatement" => statements.push(read_authz_statement(child)?.into()),
            "Statement" => statements.push(Statement::Custom(CustomStatement {
                type_name: child.xsi_type.clone(),
            })),
            _ => {}
        }
    }

    let assertion = Assertion {
        version: version.to_string(),
        issue_instant: parse_instant(root.required_attr("IssueInstant")?)?,
        issuer: root.required_child(SAML_NS, "Issuer")?.trimmed_text().to_string(),
        subject: root.child(SAML_NS, "Subject").map(read_subject).transpose()?,
        conditions: root.child(SAML_NS, "Conditions").map(read_conditions).transpose()?,
        advice: root.child(SAML_NS, "Advice").map(read_advice).transpose()?,
        statements,
        signature: read_signature(xml, &root, &id)?,
        id,
    };

    Ok(assertion)
}

/// Reads the attributes carried by an `Actor` element.
pub(crate) fn read_actor(xml: &str) -> SamlResult<Vec<Attribute>> {
    let root = parse_document(xml)?;
    if root.local_name != ACTOR_ELEMENT {
        return Err(SamlError::UnsupportedDelegation(format!(
            "actor value has root element '{}'",
            root.local_name
        )));
    }
    root.children_named(SAML_NS, "Attribute").map(read_attribute).collect()
}

fn read_signature(xml: &str, root: &XmlElement, id: &str) -> SamlResult<Option<Signature>> {
    let mut signatures = root.children_named(XMLDSIG_NS, "Signature");
    let Some(signature) = signatures.next() else {
        return Ok(None);
    };
    if signatures.next().is_some() {
        return Err(SamlError::InvalidAssertion(
            "assertion carries more than one signature".to_string(),
        ));
    }

    let signed_info_element = signature.required_child(XMLDSIG_NS, "SignedInfo")?;
    let mut references = signed_info_element.children_named(XMLDSIG_NS, "Reference");
    let reference = references
        .next()
        .ok_or_else(|| SamlError::MissingElement("SignedInfo/Reference".to_string()))?;
    if references.next().is_some() {
        return Err(SamlError::InvalidAssertion(
            "SignedInfo must contain exactly one Reference".to_string(),
        ));
    }

    let transforms = reference
        .child(XMLDSIG_NS, "Transforms")
        .map(|t| {
            t.children_named(XMLDSIG_NS, "Transform")
                .map(|t| t.required_attr("Algorithm").map(str::to_string))
                .collect::<SamlResult<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();

    let signed_info = SignedInfo {
        canonicalization_method: algorithm_of(signed_info_element, "CanonicalizationMethod")?,
        signature_method: algorithm_of(signed_info_element, "SignatureMethod")?,
        reference: Reference {
            uri: reference.attr("URI").unwrap_or_default().to_string(),
            transforms,
            digest_method: algorithm_of(reference, "DigestMethod")?,
            digest_value: reference
                .required_child(XMLDSIG_NS, "DigestValue")?
                .trimmed_text()
                .to_string(),
        },
    };

    let signature_value = signature
        .required_child(XMLDSIG_NS, "SignatureValue")?
        .trimmed_text()
        .to_string();

    let key_info = signature.child(XMLDSIG_NS, "KeyInfo").map(read_key_info);

    let signed_content = format!(
        "{}{}",
        &xml[root.span.start..signature.span.start],
        &xml[signature.span.end..root.span.end]
    );

    Ok(Some(Signature::new(
        signed_info,
        signature_value,
        key_info,
        &xml[signed_info_element.span.clone()],
        signed_content,
        id,
    )))
}

fn algorithm_of(parent: &XmlElement, name: &str) -> SamlResult<String> {
    Ok(parent
        .required_child(XMLDSIG_NS, name)?
        .required_attr("Algorithm")?
        .to_string())
}

fn read_key_info(element: &XmlElement) -> KeyInfo {
    let text_of = |parent: &XmlElement, name: &str| {
        parent
            .child(XMLDSIG_NS, name)
            .map(|e| e.trimmed_text().to_string())
    };

    let rsa_key_value = element
        .child(XMLDSIG_NS, "KeyValue")
        .and_then(|kv| kv.child(XMLDSIG_NS, "RSAKeyValue"))
        .and_then(|rsa| {
            Some(RsaKeyValue {
                modulus: text_of(rsa, "Modulus")?,
                exponent: text_of(rsa, "Exponent")?,
            })
        });

    let x509_data = element
        .children_named(XMLDSIG_NS, "X509Data")
        .map(|data| X509Data {
            issuer_serial: data.child(XMLDSIG_NS, "X509IssuerSerial").and_then(|serial| {
                Some(IssuerSerial {
                    issuer_name: text_of(serial, "X509IssuerName")?,
                    serial_number: text_of(serial, "X509SerialNumber")?,
                })
            }),
            ski: text_of(data, "X509SKI"),
            subject_name: text_of(data, "X509SubjectName"),
            certificates: data
                .children_named(XMLDSIG_NS, "X509Certificate")
                .map(|c| c.trimmed_text().to_string())
                .collect(),
            crl: text_of(data, "X509CRL"),
        })
        .collect();

    KeyInfo {
        key_name: text_of(element, "KeyName"),
        retrieval_method_uri: element
            .child(XMLDSIG_NS, "RetrievalMethod")
            .and_then(|r| r.attr("URI"))
            .map(str::to_string),
        rsa_key_value,
        x509_data,
    }
}

fn read_name_id(element: &XmlElement) -> NameId {
    NameId {
        value: element.trimmed_text().to_string(),
        format: optional_attr(element, "Format"),
        name_qualifier: optional_attr(element, "NameQualifier"),
        sp_name_qualifier: optional_attr(element, "SPNameQualifier"),
        sp_provided_id: optional_attr(element, "SPProvidedID"),
    }
}

fn reject_encrypted_id(element: &XmlElement) -> SamlResult<()> {
    if element.child(SAML_NS, "EncryptedID").is_some() {
        return Err(SamlError::EncryptedElement("EncryptedID".to_string()));
    }
    Ok(())
}

fn read_subject(element: &XmlElement) -> SamlResult<Subject> {
    reject_encrypted_id(element)?;

    let subject_confirmations = element
        .children_named(SAML_NS, "SubjectConfirmation")
        .map(|confirmation| {
            reject_encrypted_id(confirmation)?;
            Ok(SubjectConfirmation {
                method: confirmation.required_attr("Method")?.to_string(),
                name_id: confirmation.child(SAML_NS, "NameID").map(read_name_id),
                subject_confirmation_data: confirmation
                    .child(SAML_NS, "SubjectConfirmationData")
                    .map(read_confirmation_data)
                    .transpose()?,
            })
        })
        .collect::<SamlResult<Vec<_>>>()?;

    Ok(Subject {
        name_id: element.child(SAML_NS, "NameID").map(read_name_id),
        subject_confirmations,
    })
}

fn read_confirmation_data(element: &XmlElement) -> SamlResult<SubjectConfirmationData> {
    Ok(SubjectConfirmationData {
        in_response_to: optional_attr(element, "InResponseTo"),
        not_before: optional_instant(element, "NotBefore")?,
        not_on_or_after: optional_instant(element, "NotOnOrAfter")?,
        recipient: optional_attr(element, "Recipient"),
        address: optional_attr(element, "Address"),
    })
}

fn read_conditions(element: &XmlElement) -> SamlResult<Conditions> {
    let audiences_of = |parent: &XmlElement| {
        parent
            .children_named(SAML_NS, "Audience")
            .map(|a| a.trimmed_text().to_string())
            .collect::<Vec<_>>()
    };

    let mut conditions = Conditions {
        not_before: optional_instant(element, "NotBefore")?,
        not_on_or_after: optional_instant(element, "NotOnOrAfter")?,
        ..Conditions::default()
    };

    for child in &element.children {
        if child.namespace.as_deref() != Some(SAML_NS) {
            continue;
        }
        match child.local_name.as_str() {
            "AudienceRestriction" => conditions.audience_restrictions.push(AudienceRestriction {
                audiences: audiences_of(child),
            }),
            "OneTimeUse" => conditions.one_time_use = true,
            "ProxyRestriction" => {
                let count = child
                    .attr("Count")
                    .map(|c| {
                        c.parse::<u32>().map_err(|_| {
                            SamlError::InvalidAssertion(format!("invalid ProxyRestriction Count '{c}'"))
                        })
                    })
                    .transpose()?;
                conditions.proxy_restriction = Some(ProxyRestriction {
                    count,
                    audiences: audiences_of(child),
                });
            }
            "Condition" => conditions
                .custom_conditions
                .push(child.xsi_type.clone().unwrap_or_else(|| "Condition".to_string())),
            _ => {}
        }
    }

    Ok(conditions)
}

fn read_advice(element: &XmlElement) -> SamlResult<Advice> {
    if element.child(SAML_NS, "EncryptedAssertion").is_some() {
        return Err(SamlError::EncryptedElement("EncryptedAssertion".to_string()));
    }
    let texts = |name: &str| -> Vec<String> {
        element
            .children_named(SAML_NS, name)
            .map(|e| e.trimmed_text().to_string())
            .collect()
    };
    Ok(Advice {
        assertion_id_refs: texts("AssertionIDRef"),
        assertion_uri_refs: texts("AssertionURIRef"),
    })
}

fn read_attribute_statement(element: &XmlElement) -> SamlResult<AttributeStatement> {
    if element.child(SAML_NS, "EncryptedAttribute").is_some() {
        return Err(SamlError::EncryptedElement("EncryptedAttribute".to_string()));
    }
    Ok(AttributeStatement {
        attributes: element
            .children_named(SAML_NS, "Attribute")
            .map(read_attribute)
            .collect::<SamlResult<_>>()?,
    })
}

fn read_attribute(element: &XmlElement) -> SamlResult<Attribute> {
    let values: Vec<&XmlElement> = element.children_named(SAML_NS, "AttributeValue").collect();
    Ok(Attribute {
        name: element.required_attr("Name")?.to_string(),
        name_format: optional_attr(element, "NameFormat"),
        friendly_name: optional_attr(element, "FriendlyName"),
        original_issuer: element
            .attr_ns(CLAIMS_NS, "OriginalIssuer")
            .map(str::to_string),
        value_type: values.iter().find_map(|v| v.xsi_type.clone()),
        values: values.iter().map(|v| v.text.clone()).collect(),
    })
}

fn read_authn_statement(element: &XmlElement) -> SamlResult<AuthnStatement> {
    let context = element.required_child(SAML_NS, "AuthnContext")?;
    if context.child(SAML_NS, "AuthnContextDecl").is_some() {
        return Err(SamlError::AuthnContextDeclaration(
            "inline AuthnContextDecl".to_string(),
        ));
    }
    let text_of = |name: &str| {
        context
            .child(SAML_NS, name)
            .map(|e| e.trimmed_text().to_string())
    };

    Ok(AuthnStatement {
        authn_instant: parse_instant(element.required_attr("AuthnInstant")?)?,
        session_index: optional_attr(element, "SessionIndex"),
        session_not_on_or_after: optional_instant(element, "SessionNotOnOrAfter")?,
        authn_context: AuthnContext {
            class_ref: text_of("AuthnContextClassRef"),
            decl_ref: text_of("AuthnContextDeclRef"),
            authenticating_authorities: context
                .children_named(SAML_NS, "AuthenticatingAuthority")
                .map(|e| e.trimmed_text().to_string())
                .collect(),
        },
        subject_locality: element.child(SAML_NS, "SubjectLocality").map(|locality| {
            SubjectLocality {
                address: optional_attr(locality, "Address"),
                dns_name: optional_attr(locality, "DNSName"),
            }
        }),
    })
}

fn read_authz_statement(element: &XmlElement) -> SamlResult<AuthzDecisionStatement> {
    let decision = element.required_attr("Decision")?;
    Ok(AuthzDecisionStatement {
        resource: element.required_attr("Resource")?.to_string(),
        decision: Decision::from_xml(decision).ok_or_else(|| {
            SamlError::InvalidAssertion(format!("invalid authorization decision '{decision}'"))
        })?,
        actions: element
            .children_named(SAML_NS, "Action")
            .map(|action| Action {
                namespace: optional_attr(action, "Namespace"),
                value: action.trimmed_text().to_string(),
            })
            .collect(),
    })
}

fn optional_attr(element: &XmlElement, name: &str) -> Option<String> {
    element.attr(name).map(str::to_string)
}

fn optional_instant(element: &XmlElement, name: &str) -> SamlResult<Option<DateTime<Utc>>> {
    element.attr(name).map(parse_instant).transpose()
}

fn parse_instant(value: &str) -> SamlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SamlError::InvalidAssertion(format!("invalid date-time '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{claim_value_types, AuthnContextClass};

    const ASSERTION: &str = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" ID="_abc" Version="2.0" IssueInstant="2026-01-01T10:00:00.000Z">
  <saml:Issuer>https://idp.example.com</saml:Issuer>
  <saml:Subject>
    <saml:NameID Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress">alice@example.com</saml:NameID>
    <saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer">
      <saml:SubjectConfirmationData NotOnOrAfter="2026-01-01T10:05:00Z" Recipient="https://sp.example.com/acs"/>
    </saml:SubjectConfirmation>
  </saml:Subject>
  <saml:Conditions NotBefore="2026-01-01T09:59:00Z" NotOnOrAfter="2026-01-01T11:00:00Z">
    <saml:AudienceRestriction><saml:Audience>https://sp.example.com</saml:Audience></saml:AudienceRestriction>
    <saml:OneTimeUse/>
  </saml:Conditions>
  <saml:AuthnStatement AuthnInstant="2026-01-01T09:58:00Z" SessionIndex="s1">
    <saml:AuthnContext><saml:AuthnContextClassRef>urn:oasis:names:tc:SAML:2.0:ac:classes:Password</saml:AuthnContextClassRef></saml:AuthnContext>
  </saml:AuthnStatement>
  <saml:AttributeStatement>
    <saml:Attribute Name="age" FriendlyName="Age"><saml:AttributeValue xsi:type="xs:integer">42</saml:AttributeValue></saml:Attribute>
    <saml:Attribute Name="role"><saml:AttributeValue>admin</saml:AttributeValue><saml:AttributeValue>user</saml:AttributeValue></saml:Attribute>
  </saml:AttributeStatement>
</saml:Assertion>"#;

    #[test]
    fn reads_assertion_graph() {
        let assertion = read_assertion(ASSERTION).unwrap();

        assert_eq!(assertion.id, "_abc");
        assert_eq!(assertion.issuer, "https://idp.example.com");
        assert!(assertion.signature.is_none());

        let subject = assertion.subject.as_ref().unwrap();
        assert_eq!(subject.name_id.as_ref().unwrap().value, "alice@example.com");
        let data = subject.subject_confirmations[0]
            .subject_confirmation_data
            .as_ref()
            .unwrap();
        assert_eq!(data.recipient.as_deref(), Some("https://sp.example.com/acs"));

        let conditions = assertion.conditions.as_ref().unwrap();
        assert!(conditions.one_time_use);
        assert_eq!(
            conditions.audience_restrictions[0].audiences,
            vec!["https://sp.example.com".to_string()]
        );

        let authn = assertion.authn_statements().next().unwrap();
        assert_eq!(
            authn.authn_context.class_ref.as_deref(),
            Some(AuthnContextClass::Password.uri())
        );

        let attributes: Vec<_> = assertion
            .attribute_statements()
            .flat_map(|s| s.attributes.iter())
            .collect();
        assert_eq!(attributes[0].value_type.as_deref(), Some(claim_value_types::INTEGER));
        assert_eq!(attributes[0].friendly_name.as_deref(), Some("Age"));
        assert_eq!(attributes[1].values, vec!["admin", "user"]);
    }

    #[test]
    fn rejects_wrong_root_and_version() {
        let not_assertion = r#"<saml:Response xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"/>"#;
        assert!(matches!(
            read_assertion(not_assertion),
            Err(SamlError::InvalidAssertion(_))
        ));

        let old = ASSERTION.replace("Version=\"2.0\"", "Version=\"1.1\"");
        assert!(matches!(read_assertion(&old), Err(SamlError::InvalidAssertion(_))));
    }

    #[test]
    fn missing_issuer_is_reported() {
        let xml = ASSERTION.replace("<saml:Issuer>https://idp.example.com</saml:Issuer>", "");
        assert!(matches!(read_assertion(&xml), Err(SamlError::MissingElement(_))));
    }

    #[test]
    fn encrypted_attributes_are_rejected() {
        let xml = ASSERTION.replace(
            "<saml:AttributeStatement>",
            "<saml:AttributeStatement><saml:EncryptedAttribute/>",
        );
        assert!(matches!(read_assertion(&xml), Err(SamlError::EncryptedElement(_))));
    }

    #[test]
    fn reads_actor_attributes() {
        let actor = r#"<Actor xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"><saml:Attribute Name="name"><saml:AttributeValue>svc</saml:AttributeValue></saml:Attribute></Actor>"#;
        let attributes = read_actor(actor).unwrap();
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0].values, vec!["svc"]);

        assert!(matches!(
            read_actor("<NotActor/>"),
            Err(SamlError::UnsupportedDelegation(_))
        ));
    }
}
