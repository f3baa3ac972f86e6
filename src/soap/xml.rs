//! Small helpers over the `xmltree` DOM.

use xmltree::{Element, EmitterConfig, XMLNode};

use crate::soap::SoapError;

/// `<prefix:name>` with no attributes or children.
pub(crate) fn element(prefix: Option<&str>, name: &str) -> Element {
    let mut el = Element::new(name);
    el.prefix = prefix.map(str::to_string);
    el
}

pub(crate) fn attr(mut el: Element, key: &str, value: &str) -> Element {
    el.attributes.insert(key.to_string(), value.to_string());
    el
}

pub(crate) fn child(mut el: Element, c: Element) -> Element {
    el.children.push(XMLNode::Element(c));
    el
}

/// Whitespace-only text goes out as CDATA; a plain text node of only
/// whitespace is dropped by the parser.
pub(crate) fn text(mut el: Element, value: &str) -> Element {
    if value.trim().is_empty() && !value.is_empty() {
        el.children.push(XMLNode::CData(value.to_string()));
    } else if !value.is_empty() {
        el.children.push(XMLNode::Text(value.to_string()));
    }
    el
}

/// Serialize with an XML prolog.
pub(crate) fn to_document(root: &Element) -> Result<String, SoapError> {
    let mut out = Vec::new();
    let config = EmitterConfig::new()
        .perform_indent(true)
        .write_document_declaration(true);
    root.write_with_config(&mut out, config)?;
    Ok(String::from_utf8(out)?)
}

/// Element children of `el`.
pub(crate) fn elements(el: &Element) -> impl Iterator<Item = &Element> {
    el.children.iter().filter_map(XMLNode::as_element)
}

/// Namespace declarations on `el`, without the predefined prefixes.
pub(crate) fn declared_namespaces(el: &Element) -> Vec<(String, String)> {
    el.namespaces
        .as_ref()
        .map(|ns| {
            ns.0.iter()
                .filter(|(prefix, _)| !matches!(prefix.as_str(), "" | "xml" | "xmlns"))
                .map(|(p, uri)| (p.clone(), uri.clone()))
                .collect()
        })
        .unwrap_or_default()
}
