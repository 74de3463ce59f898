//! XML reading and writing for SAML 2.0 assertions.
//!
//! Documents are parsed with `quick-xml` into a small namespace-resolved
//! element tree ([`XmlElement`]) that keeps the byte span of every element,
//! so the signature layer can reconstruct exactly what was signed.

pub(crate) mod reader;
pub(crate) mod writer;

use std::ops::Range;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{SamlError, SamlResult};
use crate::types::XSI_NS;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
const MAX_DEPTH: usize = 64;

/// A namespace-resolved attribute.
#[derive(Debug, Clone)]
pub(crate) struct XmlAttribute {
    pub namespace: Option<String>,
    pub local_name: String,
    pub value: String,
}

/// An element of a parsed document.
#[derive(Debug, Clone)]
pub(crate) struct XmlElement {
    pub namespace: Option<String>,
    pub local_name: String,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlElement>,
    /// Concatenated direct text content, unescaped.
    pub text: String,
    /// `xsi:type`, resolved to `{namespace}#{local}`.
    pub xsi_type: Option<String>,
    /// Byte range of the whole element in the source document.
    pub span: Range<usize>,
}

impl XmlElement {
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(namespace)
    }

    /// Unqualified attribute value.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.local_name == name)
            .map(|a| a.value.as_str())
    }

    pub fn attr_ns(&self, namespace: &str, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.as_deref() == Some(namespace) && a.local_name == name)
            .map(|a| a.value.as_str())
    }

    pub fn required_attr(&self, name: &str) -> SamlResult<&str> {
        self.attr(name).ok_or_else(|| {
            SamlError::MissingElement(format!("{}/@{name}", self.local_name))
        })
    }

    pub fn child(&self, namespace: &str, local_name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.is(namespace, local_name))
    }

    pub fn required_child(&self, namespace: &str, local_name: &str) -> SamlResult<&Self> {
        self.child(namespace, local_name).ok_or_else(|| {
            SamlError::MissingElement(format!("{}/{local_name}", self.local_name))
        })
    }

    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a Self> + 'a {
        self.children.iter().filter(move |c| c.is(namespace, local_name))
    }

    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }
}

type Scope = Vec<(Option<String>, String)>;

/// Parses a document into its root element.
///
/// DTDs are refused outright; nesting is capped.
pub(crate) fn parse_document(xml: &str) -> SamlResult<XmlElement> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut scopes: Vec<Scope> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let tag_start = offset(&reader);
        let event = reader.read_event()?;
        let position = offset(&reader);

        match event {
            Event::Start(start) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(SamlError::XmlParse(format!(
                        "element nesting exceeds {MAX_DEPTH} levels"
                    )));
                }
                let element = open_element(&start, tag_start..position, &mut scopes)?;
                ensure_single_root(root.as_ref(), &stack)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = open_element(&start, tag_start..position, &mut scopes)?;
                scopes.pop();
                ensure_single_root(root.as_ref(), &stack)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::End(_) => {
                let mut element = stack
                    .pop()
                    .ok_or_else(|| SamlError::XmlParse("unbalanced end tag".to_string()))?;
                scopes.pop();
                element.span.end = position;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                match stack.last_mut() {
                    Some(element) => element.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => {
                        return Err(SamlError::XmlParse(
                            "text content outside the root element".to_string(),
                        ))
                    }
                }
            }
            Event::CData(data) => {
                let data = data.into_inner();
                let text = std::str::from_utf8(&data)
                    .map_err(|e| SamlError::XmlParse(e.to_string()))?;
                if let Some(element) = stack.last_mut() {
                    element.text.push_str(text);
                }
            }
            Event::DocType(_) => {
                return Err(SamlError::XmlParse(
                    "document type declarations are not allowed".to_string(),
                ));
            }
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) => {}
        }
    }

    if !stack.is_empty() {
        return Err(SamlError::XmlParse("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| SamlError::XmlParse("document has no root element".to_string()))
}

fn ensure_single_root(root: Option<&XmlElement>, stack: &[XmlElement]) -> SamlResult<()> {
    if root.is_some() && stack.is_empty() {
        return Err(SamlError::XmlParse("multiple root elements".to_string()));
    }
    Ok(())
}

fn offset(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

/// Builds an element from the start tag occupying `span` and pushes its
/// namespace scope.
fn open_element(
    start: &BytesStart<'_>,
    span: Range<usize>,
    scopes: &mut Vec<Scope>,
) -> SamlResult<XmlElement> {
    let mut declarations: Scope = Vec::new();
    let mut raw_attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute?;
        let key = utf8(attribute.key.as_ref())?.to_string();
        if attribute.value.contains(&b'<') {
            return Err(SamlError::XmlParse(format!(
                "unescaped '<' in value of attribute '{key}'"
            )));
        }
        let value = attribute.unescape_value()?.into_owned();
        if key == "xmlns" {
            declarations.push((None, value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            declarations.push((Some(prefix.to_string()), value));
        } else {
            raw_attributes.push((key, value));
        }
    }
    scopes.push(declarations);

    let qname = start.name();
    let (prefix, local_name) = split_qname(utf8(qname.as_ref())?);
    let namespace = resolve(scopes, prefix)?;

    let mut attributes = Vec::with_capacity(raw_attributes.len());
    for (key, value) in raw_attributes {
        let (prefix, local) = split_qname(&key);
        let namespace = match prefix {
            Some(_) => resolve(scopes, prefix)?,
            None => None,
        };
        attributes.push(XmlAttribute {
            namespace,
            local_name: local.to_string(),
            value,
        });
    }

    let xsi_type = attributes
        .iter()
        .find(|a| a.namespace.as_deref() == Some(XSI_NS) && a.local_name == "type")
        .map(|a| resolve_type_name(scopes, &a.value));

    Ok(XmlElement {
        namespace,
        local_name: local_name.to_string(),
        attributes,
        children: Vec::new(),
        text: String::new(),
        xsi_type,
        span,
    })
}

fn resolve_type_name(scopes: &[Scope], value: &str) -> String {
    let (prefix, local) = split_qname(value.trim());
    match resolve(scopes, prefix) {
        Ok(Some(namespace)) => format!("{namespace}#{local}"),
        _ => value.trim().to_string(),
    }
}

fn resolve(scopes: &[Scope], prefix: Option<&str>) -> SamlResult<Option<String>> {
    if prefix == Some("xml") {
        return Ok(Some(XML_NS.to_string()));
    }
    for scope in scopes.iter().rev() {
        if let Some((_, uri)) = scope.iter().find(|(p, _)| p.as_deref() == prefix) {
            return Ok((!uri.is_empty()).then(|| uri.clone()));
        }
    }
    match prefix {
        Some(prefix) => Err(SamlError::XmlParse(format!(
            "undeclared namespace prefix '{prefix}'"
        ))),
        None => Ok(None),
    }
}

fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

fn utf8(bytes: &[u8]) -> SamlResult<&str> {
    std::str::from_utf8(bytes).map_err(|e| SamlError::XmlParse(e.to_string()))
}
