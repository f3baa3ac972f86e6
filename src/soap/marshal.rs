//! SOAP 1.1 envelope marshalling against call schemas.
//!
//! # Responsibilities
//! - Parse inbound envelopes into `serde_json::Value` trees
//! - Build outbound envelopes from value trees
//! - Enforce occurrence bounds in both directions
//!
//! # Design Decisions
//! - Inbound prefixes are discovered from the root's `xmlns:*` declarations
//! - Outbound envelopes always use the `soapenv:` and `wsd:` prefixes
//! - Object nodes are namespace-qualified, primitive leaves are not
//! - Value trees are keyed by the schema root name:
//!   `{"person": {"firstName": "Ann", "age": 41}}`
//! - The SOAP Header is ignored on input and written empty on output

use serde_json::{Map, Number, Value};
use xmltree::{Element, Namespace};

use crate::soap::xml::{child, declared_namespaces, element, elements, text, to_document};
use crate::soap::{DataType, SchemaNode, SoapError, WsCall, WsInterface};

pub const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Prefix written for the envelope namespace.
pub const ENVELOPE_PREFIX: &str = "soapenv";
/// Prefix written for the interface namespace.
pub const SERVICE_PREFIX: &str = "wsd";

impl WsInterface {
    /// Parse a request envelope for `call` into a value tree.
    pub fn parse_request(&self, call: &str, xml: &str) -> Result<Value, SoapError> {
        let call = self.resolve(call)?;
        let root = Element::parse(xml.as_bytes())?;
        let (body, wsdlns) = self.open_envelope(&root)?;
        read_root(&call.request, body, &wsdlns)
    }

    /// Build a response envelope for `call` from a value tree.
    pub fn create_response(&self, call: &str, result: &Value) -> Result<String, SoapError> {
        let call = self.resolve(call)?;
        self.build_envelope(&call.response, result)
    }

    /// Build a request envelope for `call`, the client side of `parse_request`.
    pub fn create_request(&self, call: &str, request: &Value) -> Result<String, SoapError> {
        let call = self.resolve(call)?;
        self.build_envelope(&call.request, request)
    }

    /// Parse a response envelope for `call`, the client side of `create_response`.
    pub fn parse_response(&self, call: &str, xml: &str) -> Result<Value, SoapError> {
        let call = self.resolve(call)?;
        let root = Element::parse(xml.as_bytes())?;
        let (body, wsdlns) = self.open_envelope(&root)?;
        read_root(&call.response, body, &wsdlns)
    }

    /// Resolve the call from the first body element and parse its request.
    pub fn dispatch_request(&self, xml: &str) -> Result<(&WsCall, Value), SoapError> {
        let root = Element::parse(xml.as_bytes())?;
        let (body, wsdlns) = self.open_envelope(&root)?;
        let payload = elements(body).next().ok_or(SoapError::BodyNotFound)?;
        let call = self
            .calls()
            .iter()
            .find(|c| c.request.name == payload.name && qualified_as(payload, &c.request, &wsdlns))
            .ok_or_else(|| SoapError::CallNotFound(payload.name.clone()))?;
        let value = read_root(&call.request, body, &wsdlns)?;
        Ok((call, value))
    }

    /// Check the envelope and return its Body with the service prefix.
    fn open_envelope<'a>(&self, root: &'a Element) -> Result<(&'a Element, String), SoapError> {
        let declared = declared_namespaces(root);
        if declared.is_empty() {
            return Err(SoapError::MissingAttributes);
        }
        let soapns = unique_prefix(&declared, SOAP_ENVELOPE_NS.trim_end_matches('/'), "the SOAP envelope")?;
        let wsdlns = unique_prefix(&declared, &self.host, &format!("'{}'", self.host))?;

        let body = elements(root)
            .find(|e| e.name == "Body" && e.prefix.as_deref() == Some(soapns.as_str()))
            .ok_or(SoapError::BodyNotFound)?;
        Ok((body, wsdlns))
    }

    fn build_envelope(&self, schema: &SchemaNode, value: &Value) -> Result<String, SoapError> {
        let mut namespaces = Namespace::empty();
        namespaces.put(ENVELOPE_PREFIX, SOAP_ENVELOPE_NS);
        namespaces.put(SERVICE_PREFIX, self.host.as_str());

        let mut envelope = element(Some(ENVELOPE_PREFIX), "Envelope");
        envelope.namespaces = Some(namespaces);

        let mut body = element(Some(ENVELOPE_PREFIX), "Body");
        let root = match value {
            Value::Object(map) => map,
            _ => {
                return Err(SoapError::TypeMismatch {
                    node: schema.name.clone(),
                    expected: "an object keyed by the schema root",
                })
            }
        };
        for el in write_node(schema, root)? {
            body = child(body, el);
        }

        let envelope = child(child(envelope, element(Some(ENVELOPE_PREFIX), "Header")), body);
        to_document(&envelope)
    }
}

/// Prefix whose URI starts with `uri`; exactly one must exist.
fn unique_prefix(declared: &[(String, String)], uri: &str, what: &str) -> Result<String, SoapError> {
    let mut matches = declared.iter().filter(|(_, u)| !uri.is_empty() && u.starts_with(uri));
    match (matches.next(), matches.next()) {
        (Some((prefix, _)), None) if !prefix.trim().is_empty() => Ok(prefix.clone()),
        (Some(_), Some(_)) => Err(SoapError::AmbiguousNamespace(what.to_string())),
        _ => Err(SoapError::MissingNamespace(what.to_string())),
    }
}

fn qualified_as(el: &Element, node: &SchemaNode, wsdlns: &str) -> bool {
    if node.is_object() {
        el.prefix.as_deref() == Some(wsdlns)
    } else {
        el.prefix.is_none()
    }
}

fn read_root(schema: &SchemaNode, body: &Element, wsdlns: &str) -> Result<Value, SoapError> {
    let mut out = Map::new();
    read_node(schema, body, wsdlns, &mut out)?;
    Ok(Value::Object(out))
}

fn occurrence_error(node: &SchemaNode, found: usize) -> SoapError {
    SoapError::Occurrence {
        node: node.name.clone(),
        min: node.effective_min(),
        max: node
            .effective_max()
            .map_or_else(|| "unbounded".to_string(), |m| m.to_string()),
        found,
    }
}

fn check_occurrences(node: &SchemaNode, found: usize) -> Result<(), SoapError> {
    let too_few = found < node.effective_min() as usize;
    let too_many = node.effective_max().is_some_and(|max| found > max as usize);
    if too_few || too_many {
        Err(occurrence_error(node, found))
    } else {
        Ok(())
    }
}

/// Match `node` against the children of `parent` and store the result in `out`.
fn read_node(node: &SchemaNode, parent: &Element, wsdlns: &str, out: &mut Map<String, Value>) -> Result<(), SoapError> {
    let found: Vec<&Element> = elements(parent)
        .filter(|e| e.name == node.name && qualified_as(e, node, wsdlns))
        .collect();
    check_occurrences(node, found.len())?;

    let mut values = found
        .into_iter()
        .map(|el| read_value(node, el, wsdlns))
        .collect::<Result<Vec<_>, _>>()?;

    if node.is_repeated() {
        out.insert(node.name.clone(), Value::Array(values));
    } else if let Some(value) = values.pop() {
        out.insert(node.name.clone(), value);
    }
    Ok(())
}

fn read_value(node: &SchemaNode, el: &Element, wsdlns: &str) -> Result<Value, SoapError> {
    if node.is_object() {
        let mut fields = Map::new();
        for c in &node.children {
            read_node(c, el, wsdlns, &mut fields)?;
        }
        return Ok(Value::Object(fields));
    }

    // String and buffer text is kept byte for byte; only typed leaves are trimmed.
    let raw = el.get_text().map(|t| t.into_owned()).unwrap_or_default();
    match node.data_type {
        DataType::String | DataType::Buffer | DataType::Array | DataType::Object => Ok(Value::String(raw)),
        _ => typed_leaf(node, raw.trim()),
    }
}

/// Parse the text of a `long`, `double` or `boolean` leaf.
fn typed_leaf(node: &SchemaNode, raw: &str) -> Result<Value, SoapError> {
    let invalid = |expected| SoapError::InvalidValue {
        node: node.name.clone(),
        value: raw.to_string(),
        expected,
    };
    match node.data_type {
        DataType::Long => raw.parse::<i64>().map(Value::from).map_err(|_| invalid("long")),
        DataType::Double => raw
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| invalid("double")),
        DataType::Boolean => match raw {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(invalid("boolean")),
        },
        DataType::String | DataType::Buffer | DataType::Array | DataType::Object => Ok(Value::String(raw.to_string())),
    }
}

/// Build the elements for `node` from its entry in `parent`.
fn write_node(node: &SchemaNode, parent: &Map<String, Value>) -> Result<Vec<Element>, SoapError> {
    let items: Vec<&Value> = match parent.get(&node.name) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(list)) if node.is_repeated() => list.iter().collect(),
        Some(Value::Array(_)) => {
            return Err(SoapError::TypeMismatch {
                node: node.name.clone(),
                expected: "a single value",
            })
        }
        Some(value) => vec![value],
    };
    check_occurrences(node, items.len())?;
    items.into_iter().map(|v| write_value(node, v)).collect()
}

fn write_value(node: &SchemaNode, value: &Value) -> Result<Element, SoapError> {
    if node.is_object() {
        let fields = value.as_object().ok_or_else(|| SoapError::TypeMismatch {
            node: node.name.clone(),
            expected: "an object",
        })?;
        let mut el = element(Some(SERVICE_PREFIX), &node.name);
        for c in &node.children {
            for built in write_node(c, fields)? {
                el = child(el, built);
            }
        }
        return Ok(el);
    }

    let scalar = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => {
            return Err(SoapError::TypeMismatch {
                node: node.name.clone(),
                expected: "a scalar",
            })
        }
    };
    // Typed leaves must read back as their type, so reject anything the
    // receiving side would refuse.
    if !matches!(node.data_type, DataType::String | DataType::Buffer | DataType::Array) {
        typed_leaf(node, &scalar)?;
    }
    Ok(text(element(None, &node.name), &scalar))
}
