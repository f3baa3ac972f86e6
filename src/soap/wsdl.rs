//! WSDL 1.1 generation (SOAP 1.1 binding, document/literal).
//!
//! # Output Shape
//! ```text
//! definitions (tns, xsd, soap, wsdl namespaces)
//!     → types/schema: one element per request and response schema
//!     → per call: <call>Input/<call>Output messages, <call>PortType,
//!       <call>Binding
//!     → service: one <call>Port per call
//! ```

use xmltree::{Element, Namespace};

use crate::soap::xml::{attr, child, element, to_document};
use crate::soap::{MaxOccurs, SchemaNode, SoapError, WsInterface};

pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
pub const WSDL_NS: &str = "http://schemas.xmlsoap.org/wsdl/";
pub const WSDL_SOAP_NS: &str = "http://schemas.xmlsoap.org/wsdl/soap/";
pub const SOAP_HTTP_TRANSPORT: &str = "http://schemas.xmlsoap.org/soap/http";

impl WsInterface {
    /// Render the interface as a WSDL document.
    pub fn to_wsdl(&self) -> Result<String, SoapError> {
        let wsdl = Some("wsdl");

        let mut namespaces = Namespace::empty();
        namespaces.put("tns", self.host.as_str());
        namespaces.put("xsd", XSD_NS);
        namespaces.put("soap", WSDL_SOAP_NS);
        namespaces.put("wsdl", WSDL_NS);

        let mut definitions = attr(
            attr(element(wsdl, "definitions"), "name", &self.name),
            "targetNamespace",
            &self.host,
        );
        definitions.namespaces = Some(namespaces);

        let mut schema = attr(element(Some("xsd"), "schema"), "targetNamespace", &self.host);
        for call in self.calls() {
            schema = child(schema, schema_element(&call.request));
            schema = child(schema, schema_element(&call.response));
        }
        definitions = child(definitions, child(element(wsdl, "types"), schema));

        for call in self.calls() {
            let input = format!("{}Input", call.name);
            let output = format!("{}Output", call.name);
            let port_type = format!("{}PortType", call.name);
            let binding = format!("{}Binding", call.name);

            definitions = child(definitions, message(&input, &call.request.name));
            definitions = child(definitions, message(&output, &call.response.name));

            let operation = child(
                child(
                    attr(element(wsdl, "operation"), "name", &call.name),
                    attr(element(wsdl, "input"), "message", &format!("tns:{input}")),
                ),
                attr(element(wsdl, "output"), "message", &format!("tns:{output}")),
            );
            definitions = child(
                definitions,
                child(attr(element(wsdl, "portType"), "name", &port_type), operation),
            );

            let soap_binding = attr(
                attr(element(Some("soap"), "binding"), "style", "document"),
                "transport",
                SOAP_HTTP_TRANSPORT,
            );
            let literal = || attr(element(Some("soap"), "body"), "use", "literal");
            let operation = child(
                child(
                    child(
                        attr(element(wsdl, "operation"), "name", &call.name),
                        attr(element(Some("soap"), "operation"), "soapAction", &self.host),
                    ),
                    child(element(wsdl, "input"), literal()),
                ),
                child(element(wsdl, "output"), literal()),
            );
            definitions = child(
                definitions,
                child(
                    child(
                        attr(
                            attr(element(wsdl, "binding"), "name", &binding),
                            "type",
                            &format!("tns:{port_type}"),
                        ),
                        soap_binding,
                    ),
                    operation,
                ),
            );
        }

        let mut service = attr(element(wsdl, "service"), "name", &self.name);
        service = child(
            service,
            crate::soap::xml::text(element(wsdl, "documentation"), &self.description),
        );
        for call in self.calls() {
            let port = attr(
                attr(element(wsdl, "port"), "name", &format!("{}Port", call.name)),
                "binding",
                &format!("tns:{}Binding", call.name),
            );
            let address = attr(element(Some("soap"), "address"), "location", &self.host);
            service = child(service, child(port, address));
        }
        definitions = child(definitions, service);

        to_document(&definitions)
    }
}

fn message(name: &str, part: &str) -> Element {
    let part = attr(
        attr(element(Some("wsdl"), "part"), "name", part),
        "element",
        &format!("tns:{part}"),
    );
    child(attr(element(Some("wsdl"), "message"), "name", name), part)
}

/// `xsd:element` for a node; objects recurse into a complexType sequence.
fn schema_element(node: &SchemaNode) -> Element {
    let mut el = attr(element(Some("xsd"), "element"), "name", &node.name);

    if let Some(min) = node.min_occurs {
        el = attr(el, "minOccurs", &min.to_string());
    }
    match node.max_occurs {
        MaxOccurs::Exactly(n) => el = attr(el, "maxOccurs", &n.to_string()),
        MaxOccurs::Unbounded => el = attr(el, "maxOccurs", "unbounded"),
        MaxOccurs::Unspecified if node.is_repeated() => el = attr(el, "maxOccurs", "unbounded"),
        MaxOccurs::Unspecified => {}
    }

    if node.is_object() {
        let sequence = node
            .children
            .iter()
            .fold(element(Some("xsd"), "sequence"), |seq, c| child(seq, schema_element(c)));
        child(el, child(element(Some("xsd"), "complexType"), sequence))
    } else {
        attr(el, "type", &format!("xsd:{}", node.data_type.xsd_type()))
    }
}
